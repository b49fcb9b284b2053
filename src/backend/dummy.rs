//! Recording backend with no GPU behind it.
//!
//! Hands out handles, logs every call with the bytes written to buffers and
//! tracks which resources are alive. Misuse that a real device would reject
//! is pushed onto the error queue as `VALIDATION`. Hooks let tests inject
//! errors and simulate context loss.

use std::collections::{HashSet, VecDeque};
use std::ops::Range;

use crate::backend::traits::*;
use crate::backend::types::*;

/// One call observed by [`DummyBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    CreateBuffer { buffer: BufferHandle, size: u64 },
    CreateBufferInit { buffer: BufferHandle, data: Vec<u8> },
    WriteBuffer { buffer: BufferHandle, offset: u64, data: Vec<u8> },
    CreateTexture { texture: TextureHandle, width: u32, height: u32, mip_levels: u32 },
    CreateTextureView { view: TextureViewHandle, texture: TextureHandle },
    WriteTexture { texture: TextureHandle, mip_level: u32, width: u32, height: u32 },
    CreateSampler { sampler: SamplerHandle },
    CreateBindGroupLayout { layout: BindGroupLayoutHandle },
    CreateBindGroup { bind_group: BindGroupHandle },
    CreateRenderPipeline { pipeline: RenderPipelineHandle },
    BeginRenderPass { color_load: LoadOp<[f32; 4]>, depth_load: Option<LoadOp<f32>> },
    EndRenderPass,
    SetRenderPipeline(RenderPipelineHandle),
    SetBindGroup { index: u32, bind_group: BindGroupHandle },
    SetVertexBuffer { slot: u32, buffer: BufferHandle },
    SetIndexBuffer { buffer: BufferHandle, format: IndexFormat },
    DrawIndexed { indices: Range<u32>, instances: Range<u32> },
    Submit,
    Destroy(GpuResource),
}

impl RecordedCall {
    /// Whether this call created a GPU object.
    pub fn is_create(&self) -> bool {
        matches!(
            self,
            RecordedCall::CreateBuffer { .. }
                | RecordedCall::CreateBufferInit { .. }
                | RecordedCall::CreateTexture { .. }
                | RecordedCall::CreateTextureView { .. }
                | RecordedCall::CreateSampler { .. }
                | RecordedCall::CreateBindGroupLayout { .. }
                | RecordedCall::CreateBindGroup { .. }
                | RecordedCall::CreateRenderPipeline { .. }
        )
    }
}

/// Backend that records instead of rendering.
#[derive(Debug)]
pub struct DummyBackend {
    context: ContextId,
    next_id: u64,
    calls: Vec<RecordedCall>,
    live: HashSet<GpuResource>,
    errors: VecDeque<GpuErrorCode>,
    fail_next_pipeline: Option<GpuErrorCode>,
    fail_next_submit: Option<GpuErrorCode>,
    in_render_pass: bool,
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyBackend {
    pub fn new() -> Self {
        Self {
            context: ContextId(1),
            next_id: 1,
            calls: Vec::new(),
            live: HashSet::new(),
            errors: VecDeque::new(),
            fail_next_pipeline: None,
            fail_next_submit: None,
            in_render_pass: false,
        }
    }

    /// Every call recorded since creation or the last [`clear_calls`](Self::clear_calls).
    pub fn calls(&self) -> &[RecordedCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Payloads written through `write_buffer`, in call order.
    pub fn buffer_writes(&self) -> Vec<(BufferHandle, Vec<u8>)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                RecordedCall::WriteBuffer { buffer, data, .. } => Some((*buffer, data.clone())),
                _ => None,
            })
            .collect()
    }

    /// Number of destroy calls recorded.
    pub fn destroy_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, RecordedCall::Destroy(_)))
            .count()
    }

    /// Resources created and not yet destroyed.
    pub fn live_resources(&self) -> &HashSet<GpuResource> {
        &self.live
    }

    /// Push an entry onto the error queue, as if the GPU had reported it.
    pub fn inject_error(&mut self, code: GpuErrorCode) {
        self.errors.push_back(code);
    }

    /// Make the next pipeline creation report `code` through the error queue.
    pub fn fail_next_pipeline(&mut self, code: GpuErrorCode) {
        self.fail_next_pipeline = Some(code);
    }

    /// Make the next submit report `code` through the error queue.
    pub fn fail_next_submit(&mut self, code: GpuErrorCode) {
        self.fail_next_submit = Some(code);
    }

    /// Simulate the context being destroyed and recreated.
    pub fn lose_context(&mut self) {
        self.context = ContextId(self.context.0 + 1);
        self.live.clear();
        self.in_render_pass = false;
        log::trace!("DummyBackend: context lost, now {:?}", self.context);
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn track(&mut self, resource: GpuResource, call: RecordedCall) {
        self.live.insert(resource);
        self.calls.push(call);
    }

    fn destroy(&mut self, resource: GpuResource) {
        log::trace!("DummyBackend: destroying {:?}", resource);
        if !self.live.remove(&resource) {
            self.errors.push_back(GpuErrorCode::Validation);
        }
        self.calls.push(RecordedCall::Destroy(resource));
    }

    fn require_live(&mut self, resource: GpuResource) {
        if !self.live.contains(&resource) {
            log::trace!("DummyBackend: {:?} is not alive", resource);
            self.errors.push_back(GpuErrorCode::Validation);
        }
    }

    fn record_pass_command(&mut self, call: RecordedCall) {
        if !self.in_render_pass {
            self.errors.push_back(GpuErrorCode::Validation);
        }
        self.calls.push(call);
    }
}

impl GraphicsBackend for DummyBackend {
    fn current_context(&self) -> ContextId {
        self.context
    }

    fn next_error(&mut self) -> Option<GpuErrorCode> {
        self.errors.pop_front()
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        let buffer = BufferHandle(self.allocate());
        self.track(
            GpuResource::Buffer(buffer),
            RecordedCall::CreateBuffer {
                buffer,
                size: desc.size,
            },
        );
        Ok(buffer)
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        log::trace!(
            "DummyBackend: creating buffer {:?} with {} bytes",
            desc.label,
            data.len()
        );
        let buffer = BufferHandle(self.allocate());
        self.track(
            GpuResource::Buffer(buffer),
            RecordedCall::CreateBufferInit {
                buffer,
                data: data.to_vec(),
            },
        );
        Ok(buffer)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        self.require_live(GpuResource::Buffer(buffer));
        self.calls.push(RecordedCall::WriteBuffer {
            buffer,
            offset,
            data: data.to_vec(),
        });
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}, {} mips)",
            desc.label,
            desc.width,
            desc.height,
            desc.mip_levels
        );
        let texture = TextureHandle(self.allocate());
        self.track(
            GpuResource::Texture(texture),
            RecordedCall::CreateTexture {
                texture,
                width: desc.width,
                height: desc.height,
                mip_levels: desc.mip_levels,
            },
        );
        Ok(texture)
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle> {
        if !self.live.contains(&GpuResource::Texture(texture)) {
            return Err(BackendError::dead("texture", texture.0));
        }
        let view = TextureViewHandle(self.allocate());
        self.track(
            GpuResource::TextureView(view),
            RecordedCall::CreateTextureView { view, texture },
        );
        Ok(view)
    }

    fn write_texture(
        &mut self,
        texture: TextureHandle,
        mip_level: u32,
        data: &[u8],
        width: u32,
        height: u32,
    ) {
        self.require_live(GpuResource::Texture(texture));
        if data.len() != (width * height * 4) as usize {
            self.errors.push_back(GpuErrorCode::Validation);
        }
        self.calls.push(RecordedCall::WriteTexture {
            texture,
            mip_level,
            width,
            height,
        });
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        log::trace!("DummyBackend: creating sampler {:?}", desc.label);
        let sampler = SamplerHandle(self.allocate());
        self.track(
            GpuResource::Sampler(sampler),
            RecordedCall::CreateSampler { sampler },
        );
        Ok(sampler)
    }

    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        log::trace!("DummyBackend: creating bind group layout ({} entries)", entries.len());
        let layout = BindGroupLayoutHandle(self.allocate());
        self.track(
            GpuResource::BindGroupLayout(layout),
            RecordedCall::CreateBindGroupLayout { layout },
        );
        Ok(layout)
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        if !self.live.contains(&GpuResource::BindGroupLayout(layout)) {
            return Err(BackendError::dead("bind group layout", layout.0));
        }
        log::trace!("DummyBackend: creating bind group ({} entries)", entries.len());
        let bind_group = BindGroupHandle(self.allocate());
        self.track(
            GpuResource::BindGroup(bind_group),
            RecordedCall::CreateBindGroup { bind_group },
        );
        Ok(bind_group)
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle> {
        log::trace!("DummyBackend: creating render pipeline {:?}", desc.label);
        let pipeline = RenderPipelineHandle(self.allocate());
        self.track(
            GpuResource::RenderPipeline(pipeline),
            RecordedCall::CreateRenderPipeline { pipeline },
        );
        if let Some(code) = self.fail_next_pipeline.take() {
            self.errors.push_back(code);
        }
        Ok(pipeline)
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        if self.in_render_pass {
            self.errors.push_back(GpuErrorCode::Validation);
        }
        self.in_render_pass = true;
        self.calls.push(RecordedCall::BeginRenderPass {
            color_load: desc.color_load,
            depth_load: desc.depth.map(|depth| depth.load),
        });
    }

    fn end_render_pass(&mut self) {
        if !self.in_render_pass {
            self.errors.push_back(GpuErrorCode::Validation);
        }
        self.in_render_pass = false;
        self.calls.push(RecordedCall::EndRenderPass);
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.require_live(GpuResource::RenderPipeline(pipeline));
        self.record_pass_command(RecordedCall::SetRenderPipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle) {
        self.require_live(GpuResource::BindGroup(bind_group));
        self.record_pass_command(RecordedCall::SetBindGroup { index, bind_group });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, _offset: u64) {
        self.require_live(GpuResource::Buffer(buffer));
        self.record_pass_command(RecordedCall::SetVertexBuffer { slot, buffer });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, _offset: u64, format: IndexFormat) {
        self.require_live(GpuResource::Buffer(buffer));
        self.record_pass_command(RecordedCall::SetIndexBuffer { buffer, format });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, _base_vertex: i32, instances: Range<u32>) {
        self.record_pass_command(RecordedCall::DrawIndexed { indices, instances });
    }

    fn submit(&mut self) {
        self.calls.push(RecordedCall::Submit);
        if let Some(code) = self.fail_next_submit.take() {
            self.errors.push_back(code);
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.destroy(GpuResource::Buffer(buffer));
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.destroy(GpuResource::Texture(texture));
    }

    fn destroy_texture_view(&mut self, view: TextureViewHandle) {
        self.destroy(GpuResource::TextureView(view));
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        self.destroy(GpuResource::Sampler(sampler));
    }

    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle) {
        self.destroy(GpuResource::BindGroup(bind_group));
    }

    fn destroy_bind_group_layout(&mut self, layout: BindGroupLayoutHandle) {
        self.destroy(GpuResource::BindGroupLayout(layout));
    }

    fn destroy_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.destroy(GpuResource::RenderPipeline(pipeline));
    }
}
