use foundation::Result;
use scene::mesh::Mesh;

use super::{Geometry, PassContext, create_program, normals, wgsl};
use crate::device::{ProgramDesc, ProgramId, RenderDevice, VertexAttribute};
use crate::state::GpuBuffer;
use crate::stencil::{RasterState, StencilState};

const ATTRIBUTES: &[VertexAttribute] = &[
    VertexAttribute {
        name: "position",
        location: 0,
        components: 3,
    },
    VertexAttribute {
        name: "normal",
        location: 1,
        components: 3,
    },
];

pub const SMOOTH_COLOR_DESC: ProgramDesc = ProgramDesc {
    label: "smooth-color",
    source: wgsl::SMOOTH_COLOR,
    attributes: ATTRIBUTES,
    textured: false,
};

/// Global color shaded by vertex normals.
#[derive(Debug, Clone)]
pub struct SmoothColor {
    program: ProgramId,
    geometry: Geometry,
    normals: GpuBuffer<f32>,
    color: [f32; 3],
}

impl SmoothColor {
    pub fn new<D: RenderDevice + ?Sized>(device: &mut D) -> Result<Self> {
        Ok(Self {
            program: create_program(device, &SMOOTH_COLOR_DESC)?,
            geometry: Geometry::new(),
            normals: GpuBuffer::vertex("normals"),
            color: [0.0, 0.0, 0.0],
        })
    }

    pub fn set_color(&mut self, rgb: [f32; 3]) {
        self.color = rgb;
    }

    pub fn update_geometry(&mut self, mesh: &Mesh) {
        self.geometry.update(mesh);
        self.normals.set(normals(mesh));
    }

    pub fn render_pass<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        ctx: &PassContext<'_>,
    ) -> Result<()> {
        device.use_program(self.program);
        device.set_raster_state(RasterState::default());
        device.set_stencil(Some(StencilState::layer_order(ctx.z_order)));
        device.set_uniforms(&ctx.uniforms().with_color(self.color));
        self.geometry.bind(device)?;
        let normals = self.normals.sync(device)?;
        device.bind_vertex_buffer(1, normals);
        self.geometry.draw(device, ctx.primitive)
    }
}
