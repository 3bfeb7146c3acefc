use foundation::{EngineError, Result};
use tracing::debug;

use super::{PassContext, create_program, wgsl};
use crate::device::{Primitive, ProgramDesc, ProgramId, RenderDevice, TextureId, VertexAttribute};
use crate::state::{GpuBuffer, ResourceState};
use crate::stencil::{RasterState, StencilState};

pub const ABSTRACT_SURFACE_DESC: ProgramDesc = ProgramDesc {
    label: "abstract-surface",
    source: wgsl::ABSTRACT_SURFACE,
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
    ],
    textured: true,
};

/// Indices per surface: one quad as two triangles.
pub const SURFACE_INDICES: usize = 6;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SurfaceKind {
    /// Plot drawn on a building footprint; always drawn and marks the stencil.
    Footprint,
    /// Drawn everywhere except over footprint pixels.
    Abstract,
}

/// RGBA image in linear floats, row-major from the top-left.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct Surface {
    pub code: u32,
    pub kind: SurfaceKind,
    image: SurfaceImage,
    coords: GpuBuffer<f32>,
    uv: GpuBuffer<f32>,
    indices: GpuBuffer<u32>,
    texture: Option<TextureId>,
    texture_state: ResourceState,
}

impl Surface {
    /// `coords` holds 3 floats per corner, `uv` 2 per corner.
    pub fn new(
        code: u32,
        kind: SurfaceKind,
        image: SurfaceImage,
        coords: Vec<f32>,
        indices: Vec<u32>,
        uv: Vec<f32>,
    ) -> Result<Self> {
        if indices.len() != SURFACE_INDICES {
            return Err(EngineError::config(format!(
                "surface {code} has {} indices, expected {SURFACE_INDICES}",
                indices.len()
            )));
        }
        let corners = coords.len() / 3;
        if coords.len() % 3 != 0 || uv.len() != corners * 2 {
            return Err(EngineError::config(format!(
                "surface {code}: {} coords do not match {} uv values",
                coords.len(),
                uv.len()
            )));
        }
        if let Some(bad) = indices.iter().find(|i| **i as usize >= corners) {
            return Err(EngineError::config(format!(
                "surface {code}: index {bad} out of range"
            )));
        }
        if image.rgba.len() != (image.width * image.height * 4) as usize {
            return Err(EngineError::config(format!(
                "surface {code}: image data does not match {}x{}",
                image.width, image.height
            )));
        }

        let mut s = Self {
            code,
            kind,
            image,
            coords: GpuBuffer::vertex("surface-coords"),
            uv: GpuBuffer::vertex("surface-uv"),
            indices: GpuBuffer::index("surface-indices"),
            texture: None,
            texture_state: ResourceState::NeedsRecreate,
        };
        s.coords.set(coords);
        s.uv.set(uv);
        s.indices.set(indices);
        Ok(s)
    }

    fn render<D: RenderDevice + ?Sized>(&mut self, device: &mut D) -> Result<()> {
        let coords = self.coords.sync(device)?;
        device.bind_vertex_buffer(0, coords);
        let uv = self.uv.sync(device)?;
        device.bind_vertex_buffer(1, uv);
        let indices = self.indices.sync(device)?;
        device.bind_index_buffer(indices);

        let texture = match (self.texture_state, self.texture) {
            (ResourceState::Clean, Some(t)) => t,
            _ => {
                let t = device.create_texture("surface-image", self.image.width, self.image.height)?;
                device.write_texture(t, self.image.width, self.image.height, &self.image.rgba)?;
                self.texture = Some(t);
                self.texture_state = ResourceState::Clean;
                t
            }
        };
        device.bind_texture(texture);
        device.draw_indexed(Primitive::Triangles, 0, SURFACE_INDICES as u32)
    }
}

/// Textured quads attached to a layer. Footprint plots render before abstract
/// surfaces so the latter can test against the stencil they leave.
#[derive(Debug, Clone)]
pub struct AbstractSurface {
    program: ProgramId,
    surfaces: Vec<Surface>,
}

impl AbstractSurface {
    pub fn new<D: RenderDevice + ?Sized>(device: &mut D) -> Result<Self> {
        Ok(Self {
            program: create_program(device, &ABSTRACT_SURFACE_DESC)?,
            surfaces: Vec::new(),
        })
    }

    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    pub fn add_surface(&mut self, surface: Surface) {
        debug!(code = surface.code, kind = ?surface.kind, "surface added");
        self.surfaces.push(surface);
    }

    /// Replace every surface of the same kind carrying `surface.code`.
    /// Returns whether anything was replaced.
    pub fn update_surface(&mut self, surface: Surface) -> bool {
        let mut replaced = false;
        for s in &mut self.surfaces {
            if s.code == surface.code && s.kind == surface.kind {
                *s = surface.clone();
                replaced = true;
            }
        }
        replaced
    }

    pub fn clear_surfaces(&mut self) {
        self.surfaces.clear();
    }

    pub fn clear_kind(&mut self, kind: SurfaceKind) {
        self.surfaces.retain(|s| s.kind != kind);
    }

    pub fn render_pass<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        ctx: &PassContext<'_>,
    ) -> Result<()> {
        if self.surfaces.is_empty() {
            return Ok(());
        }
        device.use_program(self.program);
        device.set_raster_state(RasterState::no_cull());
        device.set_uniforms(&ctx.uniforms());

        for (kind, stencil) in [
            (SurfaceKind::Footprint, StencilState::footprint()),
            (SurfaceKind::Abstract, StencilState::abstract_surface()),
        ] {
            device.set_stencil(Some(stencil));
            for surface in self.surfaces.iter_mut().filter(|s| s.kind == kind) {
                surface.render(device)?;
            }
        }
        device.set_raster_state(RasterState::default());
        Ok(())
    }
}
