use foundation::Result;
use scene::mesh::Mesh;

use super::{Geometry, PassContext, create_program, wgsl};
use crate::colormap::{color_at, normalize_min_max};
use crate::device::{Primitive, ProgramDesc, ProgramId, RenderDevice, VertexAttribute};
use crate::state::{ColorMapTexture, GpuBuffer};
use crate::stencil::RasterState;

pub const COLOR_POINTS_DESC: ProgramDesc = ProgramDesc {
    label: "color-points",
    source: wgsl::COLOR_POINTS,
    attributes: &[
        VertexAttribute {
            name: "position",
            location: 0,
            components: 3,
        },
        VertexAttribute {
            name: "function",
            location: 2,
            components: 1,
        },
    ],
    textured: true,
};

/// Points colored by a knot through a color scale.
#[derive(Debug, Clone)]
pub struct ColorPoints {
    program: ProgramId,
    geometry: Geometry,
    function: GpuBuffer<f32>,
    texture: ColorMapTexture,
}

impl ColorPoints {
    pub fn new<D: RenderDevice + ?Sized>(device: &mut D, color_map: &str, reverse: bool) -> Result<Self> {
        color_at(color_map, 0.0)?;
        Ok(Self {
            program: create_program(device, &COLOR_POINTS_DESC)?,
            geometry: Geometry::new(),
            function: GpuBuffer::vertex("point-function"),
            texture: ColorMapTexture::new(color_map, reverse),
        })
    }

    pub fn function_values(&self) -> &[f32] {
        self.function.data()
    }

    pub fn update_geometry(&mut self, mesh: &Mesh) {
        self.geometry.update(mesh);
        self.function.set(vec![0.0; mesh.total_number_of_coords()]);
    }

    pub fn update_function(&mut self, mesh: &Mesh, knot: &str) -> Result<()> {
        let mut values = mesh.function(knot)?.into_iter().next().unwrap_or_default();
        values.resize(mesh.total_number_of_coords(), f64::NAN);
        self.function.set(normalize_min_max(&values));
        Ok(())
    }

    pub fn render_pass<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        ctx: &PassContext<'_>,
    ) -> Result<()> {
        device.use_program(self.program);
        device.set_raster_state(RasterState::default());
        device.set_stencil(None);
        device.set_uniforms(&ctx.uniforms());
        self.geometry.bind(device)?;
        let function = self.function.sync(device)?;
        device.bind_vertex_buffer(2, function);
        let texture = self.texture.sync(device)?;
        device.bind_texture(texture);
        self.geometry.draw(device, Primitive::Points)
    }
}
