//! wgpu backend
//!
//! Runs headless (no surface) or on a device/queue pair adopted from the host
//! application. Uncaptured wgpu errors are collected in a FIFO queue which the
//! compositor drains after every labeled batch of work.
//!
//! Pass commands are buffered and replayed into a real `wgpu::RenderPass` in
//! `end_render_pass`, because a wgpu pass borrows every resource it binds.

mod convert;

use crate::backend::traits::*;
use crate::backend::types::*;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use wgpu::util::DeviceExt;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

fn fresh_context() -> ContextId {
    ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// Live objects of one kind, keyed by handle id
struct Registry<T> {
    kind: &'static str,
    slots: HashMap<u64, T>,
    next_id: u64,
}

impl<T> Registry<T> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            slots: HashMap::new(),
            next_id: 1,
        }
    }

    fn insert(&mut self, value: T) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.slots.insert(id, value);
        id
    }

    fn get(&self, id: u64) -> BackendResult<&T> {
        self.slots
            .get(&id)
            .ok_or_else(|| BackendError::dead(self.kind, id))
    }

    fn remove(&mut self, id: u64) -> Option<T> {
        self.slots.remove(&id)
    }

    fn clear(&mut self) {
        self.slots.clear();
    }
}

enum PassCommand {
    Pipeline(RenderPipelineHandle),
    BindGroup(u32, BindGroupHandle),
    VertexBuffer(u32, BufferHandle, u64),
    IndexBuffer(BufferHandle, u64, IndexFormat),
    DrawIndexed(Range<u32>, i32, Range<u32>),
}

struct OpenPass {
    descriptor: RenderPassDescriptor,
    commands: Vec<PassCommand>,
}

/// Backend rendering through a wgpu device
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    context: ContextId,
    errors: Arc<Mutex<VecDeque<GpuErrorCode>>>,

    buffers: Registry<wgpu::Buffer>,
    textures: Registry<wgpu::Texture>,
    views: Registry<wgpu::TextureView>,
    samplers: Registry<wgpu::Sampler>,
    layouts: Registry<wgpu::BindGroupLayout>,
    bind_groups: Registry<wgpu::BindGroup>,
    pipelines: Registry<wgpu::RenderPipeline>,

    // Finished passes waiting for submit
    encoder: Option<wgpu::CommandEncoder>,
    open_pass: Option<OpenPass>,
}

impl WgpuBackend {
    /// Create a headless backend on the best available adapter.
    pub async fn new_headless_async() -> BackendResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::NoAdapter("no adapter without a surface".into()))?;

        let info = adapter.get_info();
        log::info!("Selected GPU: {} ({:?} backend)", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Overlay Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceRequest(e.to_string()))?;

        Ok(Self::from_device(device, queue))
    }

    /// Blocking wrapper around [`WgpuBackend::new_headless_async`].
    pub fn new_headless() -> BackendResult<Self> {
        pollster::block_on(Self::new_headless_async())
    }

    /// Adopt a device and queue owned by the host application.
    ///
    /// Installs the uncaptured error handler that feeds [`GraphicsBackend::next_error`].
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let errors = Arc::new(Mutex::new(VecDeque::new()));
        let sink = Arc::clone(&errors);
        device.on_uncaptured_error(Box::new(move |error: wgpu::Error| {
            let code = convert::error_code(&error);
            log::warn!("wgpu error ({}): {}", code, error);
            sink.lock().push_back(code);
        }));

        Self {
            device,
            queue,
            context: fresh_context(),
            errors,
            buffers: Registry::new("buffer"),
            textures: Registry::new("texture"),
            views: Registry::new("texture view"),
            samplers: Registry::new("sampler"),
            layouts: Registry::new("bind group layout"),
            bind_groups: Registry::new("bind group"),
            pipelines: Registry::new("render pipeline"),
            encoder: None,
            open_pass: None,
        }
    }

    /// Record that the underlying device or surface was lost and recreated.
    ///
    /// Objects created before this call belong to the old context and are
    /// dropped here. Their owners see a different [`ContextId`] and skip
    /// deletion.
    pub fn mark_context_lost(&mut self) {
        let previous = self.context;
        self.context = fresh_context();
        self.open_pass = None;
        self.encoder = None;
        self.buffers.clear();
        self.textures.clear();
        self.views.clear();
        self.samplers.clear();
        self.layouts.clear();
        self.bind_groups.clear();
        self.pipelines.clear();
        log::warn!("GPU context {:?} lost, now rendering with {:?}", previous, self.context);
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn report(&self, code: GpuErrorCode, what: impl std::fmt::Display) {
        log::warn!("{}", what);
        self.errors.lock().push_back(code);
    }

    fn record(&mut self, command: PassCommand) {
        match self.open_pass.as_mut() {
            Some(pass) => pass.commands.push(command),
            None => self.report(GpuErrorCode::Validation, "pass command recorded outside a pass"),
        }
    }

    fn shader_module(&self, label: Option<&str>, source: &str) -> wgpu::ShaderModule {
        self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label,
            source: wgpu::ShaderSource::Wgsl(source.into()),
        })
    }

    /// Replay `pass` into `encoder`; returns the first dead handle it referenced.
    fn replay(&self, encoder: &mut wgpu::CommandEncoder, pass: &OpenPass) -> BackendResult<()> {
        let desc = &pass.descriptor;
        let color_attachments = [Some(wgpu::RenderPassColorAttachment {
            view: self.views.get(desc.color.0)?,
            resolve_target: None,
            ops: convert::color_ops(desc.color_load),
        })];

        let depth_stencil_attachment = match desc.depth {
            Some(depth) => Some(wgpu::RenderPassDepthStencilAttachment {
                view: self.views.get(depth.view.0)?,
                depth_ops: Some(convert::depth_ops(depth.load)),
                stencil_ops: None,
            }),
            None => None,
        };

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: desc.label.as_deref(),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for command in &pass.commands {
            match command {
                PassCommand::Pipeline(handle) => {
                    render_pass.set_pipeline(self.pipelines.get(handle.0)?);
                }
                PassCommand::BindGroup(index, handle) => {
                    render_pass.set_bind_group(*index, self.bind_groups.get(handle.0)?, &[]);
                }
                PassCommand::VertexBuffer(slot, handle, offset) => {
                    let buffer = self.buffers.get(handle.0)?;
                    render_pass.set_vertex_buffer(*slot, buffer.slice(*offset..));
                }
                PassCommand::IndexBuffer(handle, offset, format) => {
                    let buffer = self.buffers.get(handle.0)?;
                    render_pass.set_index_buffer(buffer.slice(*offset..), (*format).into());
                }
                PassCommand::DrawIndexed(indices, base_vertex, instances) => {
                    render_pass.draw_indexed(indices.clone(), *base_vertex, instances.clone());
                }
            }
        }
        Ok(())
    }
}

impl GraphicsBackend for WgpuBackend {
    fn current_context(&self) -> ContextId {
        self.context
    }

    fn next_error(&mut self) -> Option<GpuErrorCode> {
        self.errors.lock().pop_front()
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label.as_deref(),
            size: desc.size,
            usage: desc.usage.into(),
            mapped_at_creation: false,
        });
        Ok(BufferHandle(self.buffers.insert(buffer)))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: desc.label.as_deref(),
            contents: data,
            usage: desc.usage.into(),
        });
        Ok(BufferHandle(self.buffers.insert(buffer)))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        match self.buffers.get(buffer.0) {
            Ok(target) => self.queue.write_buffer(target, offset, data),
            Err(error) => self.report(error.code(), error),
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        let max_size = self.device.limits().max_texture_dimension_2d;
        if desc.width > max_size || desc.height > max_size {
            return Err(BackendError::TextureRejected(format!(
                "{}x{} exceeds the device limit of {}",
                desc.width, desc.height, max_size
            )));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: desc.mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format.into(),
            usage: desc.usage.into(),
            view_formats: &[],
        });
        Ok(TextureHandle(self.textures.insert(texture)))
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle> {
        let view = self
            .textures
            .get(texture.0)?
            .create_view(&wgpu::TextureViewDescriptor::default());
        Ok(TextureViewHandle(self.views.insert(view)))
    }

    fn write_texture(
        &mut self,
        texture: TextureHandle,
        mip_level: u32,
        data: &[u8],
        width: u32,
        height: u32,
    ) {
        let target = match self.textures.get(texture.0) {
            Ok(target) => target,
            Err(error) => return self.report(error.code(), error),
        };
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: target,
                mip_level,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: desc.label.as_deref(),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Ok(SamplerHandle(self.samplers.insert(sampler)))
    }

    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        let entries: Vec<_> = entries
            .iter()
            .map(|entry| wgpu::BindGroupLayoutEntry {
                binding: entry.binding,
                visibility: entry.visibility.into(),
                ty: convert::binding_type(entry.ty),
                count: None,
            })
            .collect();

        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: None,
                entries: &entries,
            });
        Ok(BindGroupLayoutHandle(self.layouts.insert(layout)))
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        let layout = self.layouts.get(layout.0)?;
        let mut resolved = Vec::with_capacity(entries.len());
        for (binding, entry) in entries {
            let resource = match entry {
                BindGroupEntry::Buffer { buffer, offset, size } => {
                    wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: self.buffers.get(buffer.0)?,
                        offset: *offset,
                        size: size.and_then(wgpu::BufferSize::new),
                    })
                }
                BindGroupEntry::Texture(view) => {
                    wgpu::BindingResource::TextureView(self.views.get(view.0)?)
                }
                BindGroupEntry::Sampler(sampler) => {
                    wgpu::BindingResource::Sampler(self.samplers.get(sampler.0)?)
                }
            };
            resolved.push(wgpu::BindGroupEntry {
                binding: *binding,
                resource,
            });
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout,
            entries: &resolved,
        });
        Ok(BindGroupHandle(self.bind_groups.insert(bind_group)))
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle> {
        let label = desc.label.as_deref();
        let vertex_module = self.shader_module(label, &desc.vertex_shader);
        let fragment_module = self.shader_module(label, &desc.fragment_shader);

        let layouts = desc
            .bind_group_layouts
            .iter()
            .map(|handle| self.layouts.get(handle.0))
            .collect::<BackendResult<Vec<_>>>()?;
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label,
                bind_group_layouts: &layouts,
                push_constant_ranges: &[],
            });

        // Owned attribute lists; the wgpu layouts below borrow them
        let attributes: Vec<Vec<wgpu::VertexAttribute>> = desc
            .vertex_layouts
            .iter()
            .map(|layout| {
                layout
                    .attributes
                    .iter()
                    .map(|a| wgpu::VertexAttribute {
                        format: a.format.into(),
                        offset: a.offset,
                        shader_location: a.location,
                    })
                    .collect()
            })
            .collect();
        let vertex_buffers: Vec<_> = desc
            .vertex_layouts
            .iter()
            .zip(&attributes)
            .map(|(layout, attributes)| wgpu::VertexBufferLayout {
                array_stride: layout.array_stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();

        let color_targets: Vec<_> = desc
            .color_targets
            .iter()
            .map(|target| {
                Some(wgpu::ColorTargetState {
                    format: target.format.into(),
                    blend: Some(convert::straight_alpha()),
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label,
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex_module,
                    entry_point: "vs_main",
                    buffers: &vertex_buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fragment_module,
                    entry_point: "fs_main",
                    targets: &color_targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: desc.depth_stencil.map(|ds| wgpu::DepthStencilState {
                    format: ds.format.into(),
                    depth_write_enabled: ds.depth_write_enabled,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });
        Ok(RenderPipelineHandle(self.pipelines.insert(pipeline)))
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        if self.open_pass.is_some() {
            self.report(GpuErrorCode::Validation, "render pass begun inside another pass");
        }
        self.open_pass = Some(OpenPass {
            descriptor: desc.clone(),
            commands: Vec::new(),
        });
    }

    fn end_render_pass(&mut self) {
        let Some(pass) = self.open_pass.take() else {
            return self.report(GpuErrorCode::Validation, "no render pass to end");
        };

        let mut encoder = self.encoder.take().unwrap_or_else(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Overlay Encoder"),
                })
        });
        if let Err(error) = self.replay(&mut encoder, &pass) {
            self.report(error.code(), error);
        }
        self.encoder = Some(encoder);
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.record(PassCommand::Pipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle) {
        self.record(PassCommand::BindGroup(index, bind_group));
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64) {
        self.record(PassCommand::VertexBuffer(slot, buffer, offset));
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat) {
        self.record(PassCommand::IndexBuffer(buffer, offset, format));
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.record(PassCommand::DrawIndexed(indices, base_vertex, instances));
    }

    fn submit(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        match self.buffers.remove(buffer.0) {
            Some(buffer) => buffer.destroy(),
            None => self.report(GpuErrorCode::Validation, BackendError::dead("buffer", buffer.0)),
        }
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        match self.textures.remove(texture.0) {
            Some(texture) => texture.destroy(),
            None => self.report(GpuErrorCode::Validation, BackendError::dead("texture", texture.0)),
        }
    }

    fn destroy_texture_view(&mut self, view: TextureViewHandle) {
        if self.views.remove(view.0).is_none() {
            self.report(GpuErrorCode::Validation, BackendError::dead("texture view", view.0));
        }
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        if self.samplers.remove(sampler.0).is_none() {
            self.report(GpuErrorCode::Validation, BackendError::dead("sampler", sampler.0));
        }
    }

    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle) {
        if self.bind_groups.remove(bind_group.0).is_none() {
            self.report(GpuErrorCode::Validation, BackendError::dead("bind group", bind_group.0));
        }
    }

    fn destroy_bind_group_layout(&mut self, layout: BindGroupLayoutHandle) {
        if self.layouts.remove(layout.0).is_none() {
            self.report(
                GpuErrorCode::Validation,
                BackendError::dead("bind group layout", layout.0),
            );
        }
    }

    fn destroy_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        if self.pipelines.remove(pipeline.0).is_none() {
            self.report(
                GpuErrorCode::Validation,
                BackendError::dead("render pipeline", pipeline.0),
            );
        }
    }
}

// Offscreen targets and readback for previews and pixel tests
impl WgpuBackend {
    /// Create a render target texture and a view of it.
    ///
    /// The texture is created with `COPY_SRC` so it can be read back.
    pub fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> BackendResult<(TextureHandle, TextureViewHandle)> {
        let texture = self.create_texture(&TextureDescriptor {
            label: Some("Overlay Target".into()),
            width,
            height,
            mip_levels: 1,
            format,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
        })?;
        let view = self.create_texture_view(texture)?;
        Ok((texture, view))
    }

    /// Copy an RGBA8 texture back to the CPU, blocking until the copy lands.
    ///
    /// Returns tightly packed rows of `width * 4` bytes.
    pub fn read_texture_rgba8(
        &mut self,
        texture: TextureHandle,
        width: u32,
        height: u32,
    ) -> BackendResult<Vec<u8>> {
        let source = self.textures.get(texture.0)?;

        let row_bytes = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_row_bytes = row_bytes.div_ceil(align) * align;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (padded_row_bytes * height) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            source.as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row_bytes),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|e| BackendError::Readback(e.to_string()))?
            .map_err(|e| BackendError::Readback(e.to_string()))?;

        let pixels = slice
            .get_mapped_range()
            .chunks(padded_row_bytes as usize)
            .flat_map(|row| &row[..row_bytes as usize])
            .copied()
            .collect();
        staging.unmap();

        Ok(pixels)
    }
}
