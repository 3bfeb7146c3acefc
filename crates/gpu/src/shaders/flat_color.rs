use foundation::Result;
use scene::mesh::Mesh;

use super::{Geometry, PassContext, create_program, wgsl};
use crate::device::{Primitive, ProgramDesc, ProgramId, RenderDevice, VertexAttribute};
use crate::stencil::{RasterState, StencilState};

const ATTRIBUTES: &[VertexAttribute] = &[VertexAttribute {
    name: "position",
    location: 0,
    components: 3,
}];

pub const FLAT_COLOR_DESC: ProgramDesc = ProgramDesc {
    label: "flat-color",
    source: wgsl::FLAT_COLOR,
    attributes: ATTRIBUTES,
    textured: false,
};

/// One global color. With `points` set the layer's primitive is ignored and
/// every vertex is drawn as a point.
#[derive(Debug, Clone)]
pub struct FlatColor {
    program: ProgramId,
    geometry: Geometry,
    color: [f32; 3],
    points: bool,
}

impl FlatColor {
    pub fn new<D: RenderDevice + ?Sized>(device: &mut D, points: bool) -> Result<Self> {
        Ok(Self {
            program: create_program(device, &FLAT_COLOR_DESC)?,
            geometry: Geometry::new(),
            color: [0.0, 0.0, 0.0],
            points,
        })
    }

    pub fn is_points(&self) -> bool {
        self.points
    }

    pub fn color(&self) -> [f32; 3] {
        self.color
    }

    pub fn set_color(&mut self, rgb: [f32; 3]) {
        self.color = rgb;
    }

    pub fn update_geometry(&mut self, mesh: &Mesh) {
        self.geometry.update(mesh);
    }

    pub fn render_pass<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        ctx: &PassContext<'_>,
    ) -> Result<()> {
        let primitive = if self.points {
            Primitive::Points
        } else {
            ctx.primitive
        };

        device.use_program(self.program);
        device.set_raster_state(RasterState::default());
        device.set_stencil(match primitive {
            Primitive::Points => None,
            _ => Some(StencilState::layer_order(ctx.z_order)),
        });
        device.set_uniforms(&ctx.uniforms().with_color(self.color));
        self.geometry.bind(device)?;
        self.geometry.draw(device, primitive)
    }
}
