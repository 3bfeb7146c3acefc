//! Headless device that records every call.
//!
//! Offscreen read-backs are served from a scripted pixel grid so picking can be
//! exercised without a GPU.

use std::collections::HashMap;

use foundation::{EngineError, Result};
use scene::picking::{NO_OBJECT, PickRect, encode_object_id};

use crate::device::{
    BufferId, BufferKind, ClearRequest, Primitive, ProgramDesc, ProgramId, RenderDevice, TargetId,
    TextureId,
};
use crate::stencil::{RasterState, StencilState};
use crate::uniforms::UniformBlock;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateProgram { id: ProgramId, label: &'static str },
    CreateBuffer { id: BufferId, kind: BufferKind },
    UploadF32 { buffer: BufferId, len: usize },
    UploadU32 { buffer: BufferId, len: usize },
    CreateTexture { id: TextureId, width: u32, height: u32 },
    WriteTexture { texture: TextureId, len: usize },
    UseProgram(ProgramId),
    SetUniforms(UniformBlock),
    BindVertexBuffer { location: u32, buffer: BufferId },
    BindIndexBuffer(BufferId),
    BindTexture(TextureId),
    SetRaster(RasterState),
    SetStencil(Option<StencilState>),
    DrawIndexed(Draw),
    DrawArrays(Draw),
    Clear(ClearRequest),
    CreateTarget { id: TargetId, width: u32, height: u32 },
    ResizeTarget { id: TargetId, width: u32, height: u32 },
    BindTarget(Option<TargetId>),
    ReadPixels { rect: PickRect, target: Option<TargetId> },
    SetViewport { width: u32, height: u32 },
    FinishFrame,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Draw {
    pub program: Option<ProgramId>,
    pub label: Option<&'static str>,
    pub primitive: Primitive,
    pub first: u32,
    pub count: u32,
    pub stencil: Option<StencilState>,
    pub target: Option<TargetId>,
}

#[derive(Debug, Default)]
pub struct RecordingDevice {
    commands: Vec<Command>,
    programs: Vec<&'static str>,
    next_buffer: u32,
    next_texture: u32,
    next_target: u32,
    f32_data: HashMap<BufferId, Vec<f32>>,
    u32_data: HashMap<BufferId, Vec<u32>>,
    viewport: (u32, u32),
    program: Option<ProgramId>,
    stencil: Option<StencilState>,
    target: Option<TargetId>,
    pixels: HashMap<(u32, u32), [u8; 4]>,
    fail_program: Option<&'static str>,
    fail_uploads: bool,
}

impl RecordingDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            viewport: (width, height),
            ..Self::default()
        }
    }

    /// Make `create_program` fail for the program with this label.
    pub fn fail_program(&mut self, label: &'static str) {
        self.fail_program = Some(label);
    }

    pub fn fail_uploads(&mut self, fail: bool) {
        self.fail_uploads = fail;
    }

    /// Script the offscreen pixel at device coordinates `(x, y)` to hold `id`.
    pub fn paint_id(&mut self, x: u32, y: u32, id: u32) {
        self.pixels.insert((x, y), encode_object_id(id));
    }

    pub fn paint_rect(&mut self, rect: PickRect, id: u32) {
        for y in rect.y..rect.y + rect.height {
            for x in rect.x..rect.x + rect.width {
                self.paint_id(x, y, id);
            }
        }
    }

    pub fn clear_pixels(&mut self) {
        self.pixels.clear();
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn count(&self, pred: impl Fn(&Command) -> bool) -> usize {
        self.commands.iter().filter(|c| pred(c)).count()
    }

    pub fn draws(&self) -> Vec<&Draw> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawIndexed(d) | Command::DrawArrays(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    pub fn program_label(&self, id: ProgramId) -> Option<&'static str> {
        self.programs.get(id.0 as usize).copied()
    }

    pub fn buffer_f32(&self, id: BufferId) -> Option<&[f32]> {
        self.f32_data.get(&id).map(Vec::as_slice)
    }

    pub fn buffer_u32(&self, id: BufferId) -> Option<&[u32]> {
        self.u32_data.get(&id).map(Vec::as_slice)
    }

    fn record_draw(&mut self, primitive: Primitive, first: u32, count: u32) -> Result<Draw> {
        let Some(program) = self.program else {
            return Err(EngineError::resource("draw without a program"));
        };
        Ok(Draw {
            program: Some(program),
            label: self.program_label(program),
            primitive,
            first,
            count,
            stencil: self.stencil,
            target: self.target,
        })
    }
}

impl RenderDevice for RecordingDevice {
    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId> {
        if self.fail_program == Some(desc.label) {
            return Err(EngineError::resource(format!(
                "program {} failed to compile",
                desc.label
            )));
        }
        let id = ProgramId(self.programs.len() as u32);
        self.programs.push(desc.label);
        self.commands.push(Command::CreateProgram {
            id,
            label: desc.label,
        });
        Ok(id)
    }

    fn create_buffer(&mut self, kind: BufferKind, _label: &str) -> Result<BufferId> {
        let id = BufferId(self.next_buffer);
        self.next_buffer += 1;
        self.commands.push(Command::CreateBuffer { id, kind });
        Ok(id)
    }

    fn upload_f32(&mut self, buffer: BufferId, data: &[f32]) -> Result<()> {
        if self.fail_uploads {
            return Err(EngineError::resource("upload rejected"));
        }
        self.f32_data.insert(buffer, data.to_vec());
        self.commands.push(Command::UploadF32 {
            buffer,
            len: data.len(),
        });
        Ok(())
    }

    fn upload_u32(&mut self, buffer: BufferId, data: &[u32]) -> Result<()> {
        if self.fail_uploads {
            return Err(EngineError::resource("upload rejected"));
        }
        self.u32_data.insert(buffer, data.to_vec());
        self.commands.push(Command::UploadU32 {
            buffer,
            len: data.len(),
        });
        Ok(())
    }

    fn create_texture(&mut self, _label: &str, width: u32, height: u32) -> Result<TextureId> {
        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        self.commands.push(Command::CreateTexture { id, width, height });
        Ok(id)
    }

    fn write_texture(&mut self, texture: TextureId, width: u32, height: u32, data: &[f32]) -> Result<()> {
        if data.len() != (width * height * 4) as usize {
            return Err(EngineError::resource(format!(
                "texture data has {} floats for {width}x{height}",
                data.len()
            )));
        }
        self.commands.push(Command::WriteTexture {
            texture,
            len: data.len(),
        });
        Ok(())
    }

    fn use_program(&mut self, program: ProgramId) {
        self.program = Some(program);
        self.commands.push(Command::UseProgram(program));
    }

    fn set_uniforms(&mut self, uniforms: &UniformBlock) {
        self.commands.push(Command::SetUniforms(*uniforms));
    }

    fn bind_vertex_buffer(&mut self, location: u32, buffer: BufferId) {
        self.commands
            .push(Command::BindVertexBuffer { location, buffer });
    }

    fn bind_index_buffer(&mut self, buffer: BufferId) {
        self.commands.push(Command::BindIndexBuffer(buffer));
    }

    fn bind_texture(&mut self, texture: TextureId) {
        self.commands.push(Command::BindTexture(texture));
    }

    fn set_raster_state(&mut self, raster: RasterState) {
        self.commands.push(Command::SetRaster(raster));
    }

    fn set_stencil(&mut self, stencil: Option<StencilState>) {
        self.stencil = stencil;
        self.commands.push(Command::SetStencil(stencil));
    }

    fn draw_indexed(&mut self, primitive: Primitive, first: u32, count: u32) -> Result<()> {
        let draw = self.record_draw(primitive, first, count)?;
        self.commands.push(Command::DrawIndexed(draw));
        Ok(())
    }

    fn draw_arrays(&mut self, primitive: Primitive, first: u32, count: u32) -> Result<()> {
        let draw = self.record_draw(primitive, first, count)?;
        self.commands.push(Command::DrawArrays(draw));
        Ok(())
    }

    fn clear(&mut self, request: ClearRequest) {
        self.commands.push(Command::Clear(request));
    }

    fn create_render_target(&mut self, _label: &str, width: u32, height: u32) -> Result<TargetId> {
        let id = TargetId(self.next_target);
        self.next_target += 1;
        self.commands.push(Command::CreateTarget { id, width, height });
        Ok(id)
    }

    fn resize_render_target(&mut self, target: TargetId, width: u32, height: u32) -> Result<()> {
        self.commands.push(Command::ResizeTarget {
            id: target,
            width,
            height,
        });
        Ok(())
    }

    fn bind_render_target(&mut self, target: Option<TargetId>) {
        self.target = target;
        self.commands.push(Command::BindTarget(target));
    }

    fn read_pixels(&mut self, rect: PickRect) -> Result<Vec<u8>> {
        self.commands.push(Command::ReadPixels {
            rect,
            target: self.target,
        });
        let mut out = Vec::with_capacity(rect.area() * 4);
        for y in rect.y..rect.y + rect.height {
            for x in rect.x..rect.x + rect.width {
                out.extend(self.pixels.get(&(x, y)).copied().unwrap_or(NO_OBJECT));
            }
        }
        Ok(out)
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        self.commands.push(Command::SetViewport { width, height });
    }

    fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    fn finish_frame(&mut self) -> Result<()> {
        self.commands.push(Command::FinishFrame);
        Ok(())
    }
}
