//! Rendering abstraction for map layers.
//!
//! [`RenderDevice`] is the seam between the engine and a concrete backend.
//! Programs, buffers and offscreen targets live behind opaque ids so the
//! headless [`RecordingDevice`] and the wgpu backend in the viewer share every
//! code path above it.

pub mod colormap;
pub mod device;
pub mod recording;
pub mod shaders;
pub mod state;
pub mod stencil;
pub mod uniforms;

pub use device::{
    BufferId, BufferKind, ClearRequest, Primitive, ProgramDesc, ProgramId, RenderDevice, TargetId,
    TextureId, VertexAttribute,
};
pub use recording::{Command, Draw, RecordingDevice};
pub use shaders::{Auxiliary, PassContext, PassOutput, RenderStyle, Shader};
pub use state::{GpuBuffer, OffscreenTarget, ResourceState};
pub use stencil::{CompareFunction, RasterState, StencilOp, StencilState};
pub use uniforms::{FrameUniforms, UniformBlock};
