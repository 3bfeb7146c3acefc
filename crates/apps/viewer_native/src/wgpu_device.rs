//! Headless wgpu backend for [`RenderDevice`].
//!
//! The main frame is an offscreen RGBA8 texture sized to the viewport, so the
//! viewer runs without a window. Each draw is recorded in its own render pass
//! and submitted immediately; pipelines are cached per program, primitive and
//! depth/stencil state.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc;

use ::wgpu::util::DeviceExt;
use foundation::{EngineError, Result};
use gpu::{
    BufferId, BufferKind, ClearRequest, CompareFunction, Primitive, ProgramDesc, ProgramId,
    RasterState, RenderDevice, StencilOp, StencilState, TargetId, TextureId, UniformBlock,
};
use scene::picking::PickRect;
use tracing::{debug, error, info};

const COLOR_FORMAT: ::wgpu::TextureFormat = ::wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: ::wgpu::TextureFormat = ::wgpu::TextureFormat::Depth24PlusStencil8;

struct Program {
    desc: ProgramDesc,
    module: ::wgpu::ShaderModule,
    layout: ::wgpu::PipelineLayout,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    primitive: Primitive,
    raster: RasterState,
    stencil: Option<StencilState>,
}

struct Buffer {
    kind: BufferKind,
    label: String,
    buffer: Option<::wgpu::Buffer>,
}

struct Texture {
    width: u32,
    height: u32,
    texture: ::wgpu::Texture,
    bind_group: ::wgpu::BindGroup,
}

struct Target {
    width: u32,
    height: u32,
    color: ::wgpu::Texture,
    depth: ::wgpu::Texture,
}

impl Target {
    fn new(device: &::wgpu::Device, label: &str, width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let size = ::wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let color = device.create_texture(&::wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: ::wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: ::wgpu::TextureUsages::RENDER_ATTACHMENT | ::wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth = device.create_texture(&::wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: ::wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: ::wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        Self {
            width,
            height,
            color,
            depth,
        }
    }
}

pub struct WgpuDevice {
    device: ::wgpu::Device,
    queue: ::wgpu::Queue,
    uniform_layout: ::wgpu::BindGroupLayout,
    texture_layout: ::wgpu::BindGroupLayout,

    programs: Vec<Program>,
    pipelines: HashMap<PipelineKey, ::wgpu::RenderPipeline>,
    buffers: Vec<Buffer>,
    textures: Vec<Texture>,
    targets: Vec<Target>,
    frame: Target,

    program: Option<ProgramId>,
    uniforms: UniformBlock,
    vertex_buffers: BTreeMap<u32, BufferId>,
    index_buffer: Option<BufferId>,
    texture: Option<TextureId>,
    raster: RasterState,
    stencil: Option<StencilState>,
    target: Option<TargetId>,
    draws: u64,
    frames: u64,
}

impl WgpuDevice {
    /// Open the default adapter without a surface.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        pollster::block_on(Self::new_async(width, height))
    }

    async fn new_async(width: u32, height: u32) -> Result<Self> {
        let instance = ::wgpu::Instance::new(&::wgpu::InstanceDescriptor {
            backends: ::wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&::wgpu::RequestAdapterOptions {
                power_preference: ::wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| EngineError::resource(format!("adapter error: {e}")))?;
        let (device, queue) = adapter
            .request_device(&::wgpu::DeviceDescriptor {
                label: Some("mapview-device"),
                required_features: ::wgpu::Features::empty(),
                required_limits: ::wgpu::Limits::default(),
                ..Default::default()
            })
            .await
            .map_err(|e| EngineError::resource(format!("device error: {e}")))?;
        info!(adapter = %adapter.get_info().name, width, height, "wgpu device ready");

        let uniform_layout = device.create_bind_group_layout(&::wgpu::BindGroupLayoutDescriptor {
            label: Some("mapview-uniforms-bgl"),
            entries: &[::wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: ::wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: ::wgpu::BindingType::Buffer {
                    ty: ::wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let texture_layout = device.create_bind_group_layout(&::wgpu::BindGroupLayoutDescriptor {
            label: Some("mapview-texture-bgl"),
            entries: &[::wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: ::wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: ::wgpu::BindingType::Texture {
                    sample_type: ::wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: ::wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }],
        });

        let frame = Target::new(&device, "mapview-frame", width, height);
        Ok(Self {
            device,
            queue,
            uniform_layout,
            texture_layout,
            programs: Vec::new(),
            pipelines: HashMap::new(),
            buffers: Vec::new(),
            textures: Vec::new(),
            targets: Vec::new(),
            frame,
            program: None,
            uniforms: UniformBlock::new(&gpu::FrameUniforms::default(), [0.0, 0.0]),
            vertex_buffers: BTreeMap::new(),
            index_buffer: None,
            texture: None,
            raster: RasterState::default(),
            stencil: None,
            target: None,
            draws: 0,
            frames: 0,
        })
    }

    pub fn draw_count(&self) -> u64 {
        self.draws
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    fn bound_target(&self) -> Result<&Target> {
        match self.target {
            None => Ok(&self.frame),
            Some(id) => self
                .targets
                .get(id.0 as usize)
                .ok_or_else(|| EngineError::resource(format!("unknown render target {}", id.0))),
        }
    }

    fn buffer(&self, id: BufferId) -> Result<&::wgpu::Buffer> {
        self.buffers
            .get(id.0 as usize)
            .and_then(|b| b.buffer.as_ref())
            .ok_or_else(|| EngineError::resource(format!("buffer {} has no data", id.0)))
    }

    fn upload(&mut self, id: BufferId, bytes: &[u8]) -> Result<()> {
        let slot = self
            .buffers
            .get_mut(id.0 as usize)
            .ok_or_else(|| EngineError::resource(format!("unknown buffer {}", id.0)))?;
        if bytes.is_empty() {
            slot.buffer = None;
            return Ok(());
        }
        let usage = match slot.kind {
            BufferKind::Vertex => ::wgpu::BufferUsages::VERTEX,
            BufferKind::Index => ::wgpu::BufferUsages::INDEX,
        };
        slot.buffer = Some(self.device.create_buffer_init(&::wgpu::util::BufferInitDescriptor {
            label: Some(&slot.label),
            contents: bytes,
            usage,
        }));
        Ok(())
    }

    fn pipeline(&mut self, primitive: Primitive) -> Result<PipelineKey> {
        let program = self
            .program
            .ok_or_else(|| EngineError::resource("draw without a program"))?;
        let key = PipelineKey {
            program,
            primitive,
            raster: self.raster,
            stencil: self.stencil,
        };
        if self.pipelines.contains_key(&key) {
            return Ok(key);
        }
        let program = self
            .programs
            .get(program.0 as usize)
            .ok_or_else(|| EngineError::resource(format!("unknown program {}", program.0)))?;

        let attributes: Vec<[::wgpu::VertexAttribute; 1]> = program
            .desc
            .attributes
            .iter()
            .map(|a| {
                [::wgpu::VertexAttribute {
                    format: vertex_format(a.components),
                    offset: 0,
                    shader_location: a.location,
                }]
            })
            .collect();
        let buffers: Vec<::wgpu::VertexBufferLayout> = program
            .desc
            .attributes
            .iter()
            .zip(&attributes)
            .map(|(a, attrs)| ::wgpu::VertexBufferLayout {
                array_stride: (a.components as u64) * 4,
                step_mode: ::wgpu::VertexStepMode::Vertex,
                attributes: attrs,
            })
            .collect();

        let (topology, strip_index_format) = match primitive {
            Primitive::Triangles => (::wgpu::PrimitiveTopology::TriangleList, None),
            Primitive::LineStrip => (
                ::wgpu::PrimitiveTopology::LineStrip,
                Some(::wgpu::IndexFormat::Uint32),
            ),
            Primitive::Points => (::wgpu::PrimitiveTopology::PointList, None),
        };

        let stencil = match self.stencil {
            None => ::wgpu::StencilState::default(),
            Some(s) => {
                let face = ::wgpu::StencilFaceState {
                    compare: compare_function(s.compare),
                    fail_op: stencil_operation(s.fail),
                    depth_fail_op: stencil_operation(s.depth_fail),
                    pass_op: stencil_operation(s.pass),
                };
                ::wgpu::StencilState {
                    front: face,
                    back: face,
                    read_mask: s.read_mask,
                    write_mask: 0xFF,
                }
            }
        };

        let pipeline = self.device.create_render_pipeline(&::wgpu::RenderPipelineDescriptor {
            label: Some(program.desc.label),
            layout: Some(&program.layout),
            vertex: ::wgpu::VertexState {
                module: &program.module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &buffers,
            },
            fragment: Some(::wgpu::FragmentState {
                module: &program.module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(::wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: Some(::wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: ::wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: ::wgpu::PrimitiveState {
                topology,
                strip_index_format,
                front_face: ::wgpu::FrontFace::Ccw,
                cull_mode: self.raster.cull_back.then_some(::wgpu::Face::Back),
                polygon_mode: ::wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(::wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: self.raster.depth_test,
                depth_compare: if self.raster.depth_test {
                    compare_function(self.raster.depth_compare)
                } else {
                    ::wgpu::CompareFunction::Always
                },
                stencil,
                bias: ::wgpu::DepthBiasState::default(),
            }),
            multisample: ::wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });
        debug!(label = program.desc.label, ?primitive, "pipeline created");
        self.pipelines.insert(key, pipeline);
        Ok(key)
    }

    fn draw(&mut self, primitive: Primitive, first: u32, count: u32, indexed: bool) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let key = self.pipeline(primitive)?;
        let pipeline = self
            .pipelines
            .get(&key)
            .ok_or_else(|| EngineError::resource("pipeline cache miss"))?;
        let program = self
            .programs
            .get(key.program.0 as usize)
            .ok_or_else(|| EngineError::resource(format!("unknown program {}", key.program.0)))?;

        let uniform_buffer = self.device.create_buffer_init(&::wgpu::util::BufferInitDescriptor {
            label: Some("mapview-uniforms"),
            contents: bytemuck::bytes_of(&self.uniforms),
            usage: ::wgpu::BufferUsages::UNIFORM,
        });
        let uniform_group = self.device.create_bind_group(&::wgpu::BindGroupDescriptor {
            label: Some("mapview-uniforms-bg"),
            layout: &self.uniform_layout,
            entries: &[::wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let texture_group = if program.desc.textured {
            let id = self
                .texture
                .ok_or_else(|| EngineError::resource(format!("{} needs a texture", program.desc.label)))?;
            let texture = self
                .textures
                .get(id.0 as usize)
                .ok_or_else(|| EngineError::resource(format!("unknown texture {}", id.0)))?;
            Some(&texture.bind_group)
        } else {
            None
        };

        let mut vertex_buffers = Vec::with_capacity(program.desc.attributes.len());
        for attribute in program.desc.attributes {
            let id = self.vertex_buffers.get(&attribute.location).ok_or_else(|| {
                EngineError::resource(format!(
                    "{}: nothing bound to {}",
                    program.desc.label, attribute.name
                ))
            })?;
            vertex_buffers.push(self.buffer(*id)?);
        }
        let index_buffer = if indexed {
            let id = self
                .index_buffer
                .ok_or_else(|| EngineError::resource("indexed draw without an index buffer"))?;
            Some(self.buffer(id)?)
        } else {
            None
        };

        let target = self.bound_target()?;
        let color_view = target.color.create_view(&::wgpu::TextureViewDescriptor::default());
        let depth_view = target.depth.create_view(&::wgpu::TextureViewDescriptor::default());

        let mut encoder = self.device.create_command_encoder(&::wgpu::CommandEncoderDescriptor {
            label: Some("mapview-draw"),
        });
        {
            let mut rpass = encoder.begin_render_pass(&::wgpu::RenderPassDescriptor {
                label: Some(program.desc.label),
                color_attachments: &[Some(::wgpu::RenderPassColorAttachment {
                    view: &color_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: ::wgpu::Operations {
                        load: ::wgpu::LoadOp::Load,
                        store: ::wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(::wgpu::RenderPassDepthStencilAttachment {
                    view: &depth_view,
                    depth_ops: Some(::wgpu::Operations {
                        load: ::wgpu::LoadOp::Load,
                        store: ::wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(::wgpu::Operations {
                        load: ::wgpu::LoadOp::Load,
                        store: ::wgpu::StoreOp::Store,
                    }),
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
                multiview_mask: None,
            });
            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, &uniform_group, &[]);
            if let Some(group) = texture_group {
                rpass.set_bind_group(1, group, &[]);
            }
            if let Some(stencil) = key.stencil {
                rpass.set_stencil_reference(stencil.reference);
            }
            for (slot, buffer) in vertex_buffers.into_iter().enumerate() {
                rpass.set_vertex_buffer(slot as u32, buffer.slice(..));
            }
            match index_buffer {
                Some(index) => {
                    rpass.set_index_buffer(index.slice(..), ::wgpu::IndexFormat::Uint32);
                    rpass.draw_indexed(first..first + count, 0, 0..1);
                }
                None => rpass.draw(first..first + count, 0..1),
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        self.draws += 1;
        Ok(())
    }
}

fn vertex_format(components: u32) -> ::wgpu::VertexFormat {
    match components {
        1 => ::wgpu::VertexFormat::Float32,
        2 => ::wgpu::VertexFormat::Float32x2,
        3 => ::wgpu::VertexFormat::Float32x3,
        _ => ::wgpu::VertexFormat::Float32x4,
    }
}

fn compare_function(compare: CompareFunction) -> ::wgpu::CompareFunction {
    match compare {
        CompareFunction::Never => ::wgpu::CompareFunction::Never,
        CompareFunction::Less => ::wgpu::CompareFunction::Less,
        CompareFunction::Equal => ::wgpu::CompareFunction::Equal,
        CompareFunction::NotEqual => ::wgpu::CompareFunction::NotEqual,
        CompareFunction::LessEqual => ::wgpu::CompareFunction::LessEqual,
        CompareFunction::GreaterEqual => ::wgpu::CompareFunction::GreaterEqual,
        CompareFunction::Always => ::wgpu::CompareFunction::Always,
    }
}

fn stencil_operation(op: StencilOp) -> ::wgpu::StencilOperation {
    match op {
        StencilOp::Keep => ::wgpu::StencilOperation::Keep,
        StencilOp::Zero => ::wgpu::StencilOperation::Zero,
        StencilOp::Replace => ::wgpu::StencilOperation::Replace,
    }
}

/// Copies must start rows on 256-byte boundaries.
fn aligned_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = ::wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

impl RenderDevice for WgpuDevice {
    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId> {
        let module = self.device.create_shader_module(::wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: ::wgpu::ShaderSource::Wgsl(Cow::Borrowed(desc.source)),
        });
        let groups: Vec<&::wgpu::BindGroupLayout> = if desc.textured {
            vec![&self.uniform_layout, &self.texture_layout]
        } else {
            vec![&self.uniform_layout]
        };
        let layout = self.device.create_pipeline_layout(&::wgpu::PipelineLayoutDescriptor {
            label: Some(desc.label),
            bind_group_layouts: &groups,
            immediate_size: 0,
        });
        let id = ProgramId(self.programs.len() as u32);
        self.programs.push(Program {
            desc: *desc,
            module,
            layout,
        });
        debug!(label = desc.label, "program created");
        Ok(id)
    }

    fn create_buffer(&mut self, kind: BufferKind, label: &str) -> Result<BufferId> {
        let id = BufferId(self.buffers.len() as u32);
        self.buffers.push(Buffer {
            kind,
            label: label.to_string(),
            buffer: None,
        });
        Ok(id)
    }

    fn upload_f32(&mut self, buffer: BufferId, data: &[f32]) -> Result<()> {
        self.upload(buffer, bytemuck::cast_slice(data))
    }

    fn upload_u32(&mut self, buffer: BufferId, data: &[u32]) -> Result<()> {
        self.upload(buffer, bytemuck::cast_slice(data))
    }

    fn create_texture(&mut self, label: &str, width: u32, height: u32) -> Result<TextureId> {
        let (width, height) = (width.max(1), height.max(1));
        let texture = self.device.create_texture(&::wgpu::TextureDescriptor {
            label: Some(label),
            size: ::wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: ::wgpu::TextureDimension::D2,
            format: ::wgpu::TextureFormat::Rgba32Float,
            usage: ::wgpu::TextureUsages::TEXTURE_BINDING | ::wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&::wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&::wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.texture_layout,
            entries: &[::wgpu::BindGroupEntry {
                binding: 0,
                resource: ::wgpu::BindingResource::TextureView(&view),
            }],
        });
        let id = TextureId(self.textures.len() as u32);
        self.textures.push(Texture {
            width,
            height,
            texture,
            bind_group,
        });
        Ok(id)
    }

    fn write_texture(&mut self, texture: TextureId, width: u32, height: u32, data: &[f32]) -> Result<()> {
        if data.len() != (width * height * 4) as usize {
            return Err(EngineError::resource(format!(
                "texture data has {} floats, expected {}",
                data.len(),
                width * height * 4
            )));
        }
        let slot = self
            .textures
            .get(texture.0 as usize)
            .ok_or_else(|| EngineError::resource(format!("unknown texture {}", texture.0)))?;
        if slot.width != width || slot.height != height {
            return Err(EngineError::resource(format!(
                "texture {} is {}x{}, got {width}x{height}",
                texture.0, slot.width, slot.height
            )));
        }
        self.queue.write_texture(
            ::wgpu::TexelCopyTextureInfo {
                texture: &slot.texture,
                mip_level: 0,
                origin: ::wgpu::Origin3d::ZERO,
                aspect: ::wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(data),
            ::wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 16),
                rows_per_image: Some(height),
            },
            ::wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn use_program(&mut self, program: ProgramId) {
        self.program = Some(program);
        self.vertex_buffers.clear();
        self.index_buffer = None;
        self.texture = None;
    }

    fn set_uniforms(&mut self, uniforms: &UniformBlock) {
        self.uniforms = *uniforms;
    }

    fn bind_vertex_buffer(&mut self, location: u32, buffer: BufferId) {
        self.vertex_buffers.insert(location, buffer);
    }

    fn bind_index_buffer(&mut self, buffer: BufferId) {
        self.index_buffer = Some(buffer);
    }

    fn bind_texture(&mut self, texture: TextureId) {
        self.texture = Some(texture);
    }

    fn set_raster_state(&mut self, raster: RasterState) {
        self.raster = raster;
    }

    fn set_stencil(&mut self, stencil: Option<StencilState>) {
        self.stencil = stencil;
    }

    fn draw_indexed(&mut self, primitive: Primitive, first: u32, count: u32) -> Result<()> {
        self.draw(primitive, first, count, true)
    }

    fn draw_arrays(&mut self, primitive: Primitive, first: u32, count: u32) -> Result<()> {
        self.draw(primitive, first, count, false)
    }

    fn clear(&mut self, request: ClearRequest) {
        let target = match self.bound_target() {
            Ok(target) => target,
            Err(e) => {
                error!(error = %e, "clear skipped");
                return;
            }
        };
        let color_view = target.color.create_view(&::wgpu::TextureViewDescriptor::default());
        let depth_view = target.depth.create_view(&::wgpu::TextureViewDescriptor::default());
        let color = match request.color {
            Some([r, g, b, a]) => ::wgpu::LoadOp::Clear(::wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
            None => ::wgpu::LoadOp::Load,
        };
        let depth = request.depth.map_or(::wgpu::LoadOp::Load, ::wgpu::LoadOp::Clear);
        let stencil = request.stencil.map_or(::wgpu::LoadOp::Load, ::wgpu::LoadOp::Clear);

        let mut encoder = self.device.create_command_encoder(&::wgpu::CommandEncoderDescriptor {
            label: Some("mapview-clear"),
        });
        // the pass only applies its load ops
        let _ = encoder.begin_render_pass(&::wgpu::RenderPassDescriptor {
            label: Some("mapview-clear"),
            color_attachments: &[Some(::wgpu::RenderPassColorAttachment {
                view: &color_view,
                resolve_target: None,
                depth_slice: None,
                ops: ::wgpu::Operations {
                    load: color,
                    store: ::wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(::wgpu::RenderPassDepthStencilAttachment {
                view: &depth_view,
                depth_ops: Some(::wgpu::Operations {
                    load: depth,
                    store: ::wgpu::StoreOp::Store,
                }),
                stencil_ops: Some(::wgpu::Operations {
                    load: stencil,
                    store: ::wgpu::StoreOp::Store,
                }),
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
            multiview_mask: None,
        });
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn create_render_target(&mut self, label: &str, width: u32, height: u32) -> Result<TargetId> {
        let id = TargetId(self.targets.len() as u32);
        self.targets.push(Target::new(&self.device, label, width, height));
        debug!(label, width, height, "render target created");
        Ok(id)
    }

    fn resize_render_target(&mut self, target: TargetId, width: u32, height: u32) -> Result<()> {
        let target = self
            .targets
            .get_mut(target.0 as usize)
            .ok_or_else(|| EngineError::resource(format!("unknown render target {}", target.0)))?;
        *target = Target::new(&self.device, "mapview-target", width, height);
        Ok(())
    }

    fn bind_render_target(&mut self, target: Option<TargetId>) {
        self.target = target;
    }

    fn read_pixels(&mut self, rect: PickRect) -> Result<Vec<u8>> {
        if rect.width == 0 || rect.height == 0 {
            return Ok(Vec::new());
        }
        let target = self.bound_target()?;
        if rect.x + rect.width > target.width || rect.y + rect.height > target.height {
            return Err(EngineError::resource(format!(
                "read of {rect:?} outside a {}x{} target",
                target.width, target.height
            )));
        }

        let bytes_per_row = aligned_bytes_per_row(rect.width);
        let readback = self.device.create_buffer(&::wgpu::BufferDescriptor {
            label: Some("mapview-readback"),
            size: (bytes_per_row * rect.height) as u64,
            usage: ::wgpu::BufferUsages::MAP_READ | ::wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // texture rows run top-down, read-back rows bottom-up
        let top = target.height - (rect.y + rect.height);
        let mut encoder = self.device.create_command_encoder(&::wgpu::CommandEncoderDescriptor {
            label: Some("mapview-readback"),
        });
        encoder.copy_texture_to_buffer(
            ::wgpu::TexelCopyTextureInfo {
                texture: &target.color,
                mip_level: 0,
                origin: ::wgpu::Origin3d {
                    x: rect.x,
                    y: top,
                    z: 0,
                },
                aspect: ::wgpu::TextureAspect::All,
            },
            ::wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: ::wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(rect.height),
                },
            },
            ::wgpu::Extent3d {
                width: rect.width,
                height: rect.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(::wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(::wgpu::PollType::wait_indefinitely())
            .map_err(|e| EngineError::resource(format!("device poll failed: {e}")))?;
        rx.recv()
            .map_err(|_| EngineError::resource("read-back channel closed"))?
            .map_err(|e| EngineError::resource(format!("read-back map failed: {e}")))?;

        let data = slice.get_mapped_range();
        let row_bytes = (rect.width * 4) as usize;
        let mut out = Vec::with_capacity(row_bytes * rect.height as usize);
        for row in (0..rect.height).rev() {
            let start = (row * bytes_per_row) as usize;
            out.extend_from_slice(&data[start..start + row_bytes]);
        }
        drop(data);
        readback.unmap();
        Ok(out)
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        if (self.frame.width, self.frame.height) != (width.max(1), height.max(1)) {
            self.frame = Target::new(&self.device, "mapview-frame", width, height);
        }
    }

    fn viewport(&self) -> (u32, u32) {
        (self.frame.width, self.frame.height)
    }

    fn finish_frame(&mut self) -> Result<()> {
        self.device
            .poll(::wgpu::PollType::wait_indefinitely())
            .map_err(|e| EngineError::resource(format!("device poll failed: {e}")))?;
        self.frames += 1;
        debug!(frame = self.frames, draws = self.draws, "frame finished");
        Ok(())
    }
}
