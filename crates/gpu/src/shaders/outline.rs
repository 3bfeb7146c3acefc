use foundation::Result;
use foundation::math::narrow_f32;
use scene::mesh::Mesh;

use super::{Geometry, PassContext, create_program, wgsl};
use crate::device::{ProgramDesc, ProgramId, RenderDevice, VertexAttribute};
use crate::state::GpuBuffer;
use crate::stencil::{RasterState, StencilState};

pub const OUTLINE_DESC: ProgramDesc = ProgramDesc {
    label: "outline",
    source: wgsl::OUTLINE,
    attributes: &[
        VertexAttribute {
            name: "position",
            location: 0,
            components: 3,
        },
        VertexAttribute {
            name: "uv",
            location: 1,
            components: 2,
        },
        VertexAttribute {
            name: "width",
            location: 2,
            components: 1,
        },
        VertexAttribute {
            name: "filtered",
            location: 3,
            components: 1,
        },
    ],
    textured: false,
};

const DEFAULT_WIDTH: f32 = 0.02;

/// Edges of wall quads, drawn where `uv` is within `width` of the border.
#[derive(Debug, Clone)]
pub struct Outline {
    program: ProgramId,
    geometry: Geometry,
    uv: GpuBuffer<f32>,
    width: GpuBuffer<f32>,
    filtered: GpuBuffer<f32>,
    color: [f32; 3],
}

impl Outline {
    pub fn new<D: RenderDevice + ?Sized>(device: &mut D) -> Result<Self> {
        Ok(Self {
            program: create_program(device, &OUTLINE_DESC)?,
            geometry: Geometry::new(),
            uv: GpuBuffer::vertex("outline-uv"),
            width: GpuBuffer::vertex("outline-width"),
            filtered: GpuBuffer::vertex("outline-filtered"),
            color: [0.0, 0.0, 0.0],
        })
    }

    pub fn update_geometry(&mut self, mesh: &Mesh) {
        let n = mesh.total_number_of_coords();
        self.geometry.update(mesh);

        let mut uv = narrow_f32(&mesh.uv());
        uv.resize(n * 2, 0.0);
        self.uv.set(uv);

        let mut width = narrow_f32(&mesh.width());
        width.resize(n, DEFAULT_WIDTH);
        self.width.set(width);

        self.filtered.set(vec![1.0; n]);
    }

    pub fn set_filtered(&mut self, filtered: &[f32]) {
        let n = self.geometry.n_vertex();
        let mut f = filtered.to_vec();
        f.resize(n, 1.0);
        self.filtered.set(f);
    }

    pub fn render_pass<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        ctx: &PassContext<'_>,
    ) -> Result<()> {
        device.use_program(self.program);
        device.set_raster_state(RasterState::no_cull());
        device.set_stencil(Some(StencilState::outline()));
        device.set_uniforms(&ctx.uniforms().with_color(self.color));

        self.geometry.bind(device)?;
        let uv = self.uv.sync(device)?;
        device.bind_vertex_buffer(1, uv);
        let width = self.width.sync(device)?;
        device.bind_vertex_buffer(2, width);
        let filtered = self.filtered.sync(device)?;
        device.bind_vertex_buffer(3, filtered);

        self.geometry.draw(device, ctx.primitive)?;
        device.set_raster_state(RasterState::default());
        Ok(())
    }
}
