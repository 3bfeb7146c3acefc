//! Backend-agnostic GPU seam.
//!
//! Shaders only talk to a [`RenderDevice`]. The native viewer implements it on
//! top of wgpu; tests use [`crate::recording::RecordingDevice`].

use foundation::Result;
use scene::picking::PickRect;

use crate::stencil::{RasterState, StencilState};
use crate::uniforms::UniformBlock;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Primitive {
    Triangles,
    LineStrip,
    Points,
}

/// One float vertex attribute; every attribute lives in its own buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VertexAttribute {
    pub name: &'static str,
    pub location: u32,
    pub components: u32,
}

/// A WGSL program with `vs_main`/`fs_main`, uniforms at group 0 and an
/// optional RGBA32F texture at group 1.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProgramDesc {
    pub label: &'static str,
    pub source: &'static str,
    pub attributes: &'static [VertexAttribute],
    pub textured: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct ClearRequest {
    pub color: Option<[f32; 4]>,
    pub depth: Option<f32>,
    pub stencil: Option<u32>,
}

impl ClearRequest {
    pub fn all(color: [f32; 4]) -> Self {
        Self {
            color: Some(color),
            depth: Some(1.0),
            stencil: Some(0),
        }
    }

    pub fn stencil(value: u32) -> Self {
        Self {
            stencil: Some(value),
            ..Self::default()
        }
    }
}

pub trait RenderDevice {
    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId>;

    fn create_buffer(&mut self, kind: BufferKind, label: &str) -> Result<BufferId>;
    fn upload_f32(&mut self, buffer: BufferId, data: &[f32]) -> Result<()>;
    fn upload_u32(&mut self, buffer: BufferId, data: &[u32]) -> Result<()>;

    /// RGBA32F texture, `data.len() == width * height * 4`.
    fn create_texture(&mut self, label: &str, width: u32, height: u32) -> Result<TextureId>;
    fn write_texture(&mut self, texture: TextureId, width: u32, height: u32, data: &[f32])
    -> Result<()>;

    fn use_program(&mut self, program: ProgramId);
    fn set_uniforms(&mut self, uniforms: &UniformBlock);
    fn bind_vertex_buffer(&mut self, location: u32, buffer: BufferId);
    fn bind_index_buffer(&mut self, buffer: BufferId);
    fn bind_texture(&mut self, texture: TextureId);
    fn set_raster_state(&mut self, raster: RasterState);
    fn set_stencil(&mut self, stencil: Option<StencilState>);

    fn draw_indexed(&mut self, primitive: Primitive, first: u32, count: u32) -> Result<()>;
    fn draw_arrays(&mut self, primitive: Primitive, first: u32, count: u32) -> Result<()>;
    fn clear(&mut self, request: ClearRequest);

    /// Offscreen RGBA8 target with its own depth/stencil attachment.
    fn create_render_target(&mut self, label: &str, width: u32, height: u32) -> Result<TargetId>;
    fn resize_render_target(&mut self, target: TargetId, width: u32, height: u32) -> Result<()>;
    /// `None` binds the main frame.
    fn bind_render_target(&mut self, target: Option<TargetId>);
    /// RGBA8 pixels of the bound target, rows bottom-up from `rect.y`.
    fn read_pixels(&mut self, rect: PickRect) -> Result<Vec<u8>>;

    fn set_viewport(&mut self, width: u32, height: u32);
    fn viewport(&self) -> (u32, u32);
    fn finish_frame(&mut self) -> Result<()>;
}
