//! Lifecycle of GPU-side copies of CPU data.
//!
//! Content changes mark a resource `Dirty` (re-upload into the existing
//! handle); size changes and first use mark it `NeedsRecreate`. `sync` brings
//! the GPU copy up to date and only reports `Clean` once the device accepted it.

use foundation::Result;
use tracing::error;

use crate::colormap::{COLOR_MAP_RES, color_map_texels};
use crate::device::{BufferId, BufferKind, RenderDevice, TargetId, TextureId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ResourceState {
    Clean,
    Dirty,
    #[default]
    NeedsRecreate,
}

pub trait BufferElement: Copy {
    fn upload<D: RenderDevice + ?Sized>(device: &mut D, buffer: BufferId, data: &[Self])
    -> Result<()>;
}

impl BufferElement for f32 {
    fn upload<D: RenderDevice + ?Sized>(device: &mut D, buffer: BufferId, data: &[f32]) -> Result<()> {
        device.upload_f32(buffer, data)
    }
}

impl BufferElement for u32 {
    fn upload<D: RenderDevice + ?Sized>(device: &mut D, buffer: BufferId, data: &[u32]) -> Result<()> {
        device.upload_u32(buffer, data)
    }
}

#[derive(Debug, Clone)]
pub struct GpuBuffer<T> {
    label: &'static str,
    kind: BufferKind,
    data: Vec<T>,
    handle: Option<BufferId>,
    state: ResourceState,
}

impl<T: BufferElement> GpuBuffer<T> {
    pub fn new(label: &'static str, kind: BufferKind) -> Self {
        Self {
            label,
            kind,
            data: Vec::new(),
            handle: None,
            state: ResourceState::NeedsRecreate,
        }
    }

    pub fn vertex(label: &'static str) -> Self {
        Self::new(label, BufferKind::Vertex)
    }

    pub fn index(label: &'static str) -> Self {
        Self::new(label, BufferKind::Index)
    }

    pub fn set(&mut self, data: Vec<T>) {
        self.data = data;
        self.mark_dirty();
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Mutable access marks the buffer for re-upload.
    pub fn data_mut(&mut self) -> &mut Vec<T> {
        self.mark_dirty();
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    pub fn handle(&self) -> Option<BufferId> {
        self.handle
    }

    fn mark_dirty(&mut self) {
        if self.state == ResourceState::Clean {
            self.state = ResourceState::Dirty;
        }
    }

    pub fn sync<D: RenderDevice + ?Sized>(&mut self, device: &mut D) -> Result<BufferId> {
        let handle = match (self.state, self.handle) {
            (ResourceState::Clean, Some(h)) => return Ok(h),
            (ResourceState::Dirty, Some(h)) => h,
            _ => device.create_buffer(self.kind, self.label)?,
        };
        self.handle = Some(handle);
        if let Err(e) = T::upload(device, handle, &self.data) {
            error!(buffer = self.label, error = %e, "buffer upload failed");
            self.state = ResourceState::Dirty;
            return Err(e);
        }
        self.state = ResourceState::Clean;
        Ok(handle)
    }
}

/// Offscreen color target sized to the viewport.
#[derive(Debug, Clone)]
pub struct OffscreenTarget {
    label: &'static str,
    handle: Option<TargetId>,
    size: (u32, u32),
    state: ResourceState,
}

impl OffscreenTarget {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            handle: None,
            size: (0, 0),
            state: ResourceState::NeedsRecreate,
        }
    }

    pub fn mark_resized(&mut self) {
        self.state = ResourceState::NeedsRecreate;
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Ensure the target matches the device viewport.
    pub fn sync<D: RenderDevice + ?Sized>(&mut self, device: &mut D) -> Result<TargetId> {
        let (w, h) = device.viewport();
        let (w, h) = (w.max(1), h.max(1));
        if self.size != (w, h) {
            self.state = ResourceState::NeedsRecreate;
        }
        let handle = match (self.state, self.handle) {
            (ResourceState::Clean, Some(t)) => return Ok(t),
            (_, Some(t)) => {
                device.resize_render_target(t, w, h)?;
                t
            }
            (_, None) => device.create_render_target(self.label, w, h)?,
        };
        self.handle = Some(handle);
        self.size = (w, h);
        self.state = ResourceState::Clean;
        Ok(handle)
    }
}

/// 256x1 lookup texture of a named color scale.
#[derive(Debug, Clone)]
pub struct ColorMapTexture {
    name: String,
    reverse: bool,
    handle: Option<TextureId>,
    state: ResourceState,
}

impl ColorMapTexture {
    pub fn new(name: impl Into<String>, reverse: bool) -> Self {
        Self {
            name: name.into(),
            reverse,
            handle: None,
            state: ResourceState::NeedsRecreate,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_scale(&mut self, name: impl Into<String>, reverse: bool) {
        self.name = name.into();
        self.reverse = reverse;
        if self.state == ResourceState::Clean {
            self.state = ResourceState::Dirty;
        }
    }

    pub fn sync<D: RenderDevice + ?Sized>(&mut self, device: &mut D) -> Result<TextureId> {
        let handle = match (self.state, self.handle) {
            (ResourceState::Clean, Some(t)) => return Ok(t),
            (ResourceState::Dirty, Some(t)) => t,
            _ => device.create_texture("color-map", COLOR_MAP_RES as u32, 1)?,
        };
        self.handle = Some(handle);
        let texels = color_map_texels(&self.name, self.reverse)?;
        device.write_texture(handle, COLOR_MAP_RES as u32, 1, &texels)?;
        self.state = ResourceState::Clean;
        Ok(handle)
    }
}
