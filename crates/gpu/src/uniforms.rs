use foundation::math::{OriginRelative, Vec2};

/// Camera matrices for one frame, column-major.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FrameUniforms {
    pub model_view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub world_origin: [f64; 2],
}

impl FrameUniforms {
    pub fn from_columns(model_view: [f32; 16], projection: [f32; 16], world_origin: [f64; 2]) -> Self {
        Self {
            model_view: columns(model_view),
            projection: columns(projection),
            world_origin,
        }
    }
}

impl Default for FrameUniforms {
    fn default() -> Self {
        let identity = columns([
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ]);
        Self {
            model_view: identity,
            projection: identity,
            world_origin: [0.0, 0.0],
        }
    }
}

fn columns(m: [f32; 16]) -> [[f32; 4]; 4] {
    [
        [m[0], m[1], m[2], m[3]],
        [m[4], m[5], m[6], m[7]],
        [m[8], m[9], m[10], m[11]],
        [m[12], m[13], m[14], m[15]],
    ]
}

/// Uniform block shared by every program. Matches `Uniforms` in the WGSL
/// sources: mat4, mat4, vec2, f32, f32, vec4 (160 bytes).
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct UniformBlock {
    pub model_view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    /// Layer centroid minus camera world origin.
    pub origin_shift: [f32; 2],
    pub z_order: f32,
    pub point_size: f32,
    pub color: [f32; 4],
}

impl UniformBlock {
    /// `centroid` is the value subtracted from the layer's mesh on load.
    pub fn new(frame: &FrameUniforms, centroid: [f64; 2]) -> Self {
        Self {
            model_view: frame.model_view,
            projection: frame.projection,
            origin_shift: OriginRelative::new(Vec2::new(frame.world_origin[0], frame.world_origin[1]))
                .to_f32(Vec2::new(centroid[0], centroid[1])),
            z_order: 0.0,
            point_size: 1.0,
            color: [1.0, 1.0, 1.0, 1.0],
        }
    }

    pub fn with_color(mut self, rgb: [f32; 3]) -> Self {
        self.color = [rgb[0], rgb[1], rgb[2], 1.0];
        self
    }

    pub fn with_z_order(mut self, z_order: u32) -> Self {
        self.z_order = z_order as f32;
        self
    }
}
