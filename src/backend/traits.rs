//! The interface the compositor renders through.
//!
//! Resources are addressed by small integer handles. GPU-side failures are
//! reported through an error queue, and the backend exposes the identity of
//! the context it currently renders with so owners can tell whether their
//! handles are still meaningful.

use crate::backend::types::*;
use std::fmt;
use std::ops::Range;
use thiserror::Error;

/// Failure of a backend call that could be detected synchronously
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("no usable GPU adapter: {0}")]
    NoAdapter(String),
    #[error("device request failed: {0}")]
    DeviceRequest(String),
    #[error("{kind} {id} is not a live handle")]
    DeadHandle { kind: &'static str, id: u64 },
    #[error("texture rejected: {0}")]
    TextureRejected(String),
    #[error("texture readback failed: {0}")]
    Readback(String),
}

impl BackendError {
    pub(crate) fn dead(kind: &'static str, id: u64) -> Self {
        BackendError::DeadHandle { kind, id }
    }

    /// The queue code this failure is reported under.
    pub fn code(&self) -> GpuErrorCode {
        match self {
            BackendError::DeadHandle { .. } | BackendError::TextureRejected(_) => {
                GpuErrorCode::Validation
            }
            BackendError::NoAdapter(_)
            | BackendError::DeviceRequest(_)
            | BackendError::Readback(_) => GpuErrorCode::Internal,
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Code of an entry in the backend's GPU error queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuErrorCode {
    /// A command or resource was rejected by validation
    Validation,
    OutOfMemory,
    /// Any other driver-side failure
    Internal,
}

impl fmt::Display for GpuErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GpuErrorCode::Validation => "VALIDATION",
            GpuErrorCode::OutOfMemory => "OUT_OF_MEMORY",
            GpuErrorCode::Internal => "INTERNAL",
        })
    }
}

/// Identity of the GPU context a backend currently renders with.
///
/// Two values compare equal only if they were observed on the same context.
/// A lost and recreated context always yields a new identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub(crate) u64);

macro_rules! handles {
    ($($(#[$meta:meta])* $name:ident;)+) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub struct $name(pub(crate) u64);
        )+
    };
}

handles! {
    BufferHandle;
    TextureHandle;
    /// View over every mip level of a texture
    TextureViewHandle;
    SamplerHandle;
    RenderPipelineHandle;
    BindGroupHandle;
    BindGroupLayoutHandle;
}

/// Any GPU object that has to be released explicitly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuResource {
    Buffer(BufferHandle),
    Texture(TextureHandle),
    TextureView(TextureViewHandle),
    Sampler(SamplerHandle),
    BindGroup(BindGroupHandle),
    BindGroupLayout(BindGroupLayoutHandle),
    RenderPipeline(RenderPipelineHandle),
}

impl GpuResource {
    /// Issue the matching destroy call on `backend`.
    pub fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        match self {
            GpuResource::Buffer(h) => backend.destroy_buffer(h),
            GpuResource::Texture(h) => backend.destroy_texture(h),
            GpuResource::TextureView(h) => backend.destroy_texture_view(h),
            GpuResource::Sampler(h) => backend.destroy_sampler(h),
            GpuResource::BindGroup(h) => backend.destroy_bind_group(h),
            GpuResource::BindGroupLayout(h) => backend.destroy_bind_group_layout(h),
            GpuResource::RenderPipeline(h) => backend.destroy_render_pipeline(h),
        }
    }
}

/// What gets bound at one slot of a bind group
#[derive(Debug, Clone)]
pub enum BindGroupEntry {
    Buffer {
        buffer: BufferHandle,
        offset: u64,
        size: Option<u64>,
    },
    Texture(TextureViewHandle),
    Sampler(SamplerHandle),
}

#[derive(Debug, Clone)]
pub struct BindGroupLayoutEntry {
    pub binding: u32,
    pub visibility: ShaderStageFlags,
    pub ty: BindingType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingType {
    UniformBuffer,
    /// Filterable float 2D texture
    Texture,
    /// Filtering sampler
    Sampler,
}

/// A render pipeline built from two WGSL modules.
///
/// The vertex and fragment stages use the entry points `vs_main` and
/// `fs_main`. Indices form a triangle list and no faces are culled.
#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor {
    pub label: Option<String>,
    pub vertex_shader: String,
    pub fragment_shader: String,
    pub vertex_layouts: Vec<VertexBufferLayout>,
    pub bind_group_layouts: Vec<BindGroupLayoutHandle>,
    pub depth_stencil: Option<DepthStencilState>,
    pub color_targets: Vec<ColorTargetState>,
}

/// Depth testing with `Less`
#[derive(Debug, Clone, Copy)]
pub struct DepthStencilState {
    pub format: TextureFormat,
    pub depth_write_enabled: bool,
}

/// A color target blended with straight alpha.
///
/// `src * src.a + dst * (1 - src.a)` for color and alpha alike.
#[derive(Debug, Clone, Copy)]
pub struct ColorTargetState {
    pub format: TextureFormat,
}

/// What an attachment holds when a pass begins
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp<T> {
    Clear(T),
    /// Keep the current contents
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAttachment {
    pub view: TextureViewHandle,
    pub load: LoadOp<f32>,
}

/// A pass over one color view with an optional depth buffer.
///
/// Both attachments are stored when the pass ends.
#[derive(Debug, Clone)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub color: TextureViewHandle,
    pub color_load: LoadOp<[f32; 4]>,
    pub depth: Option<DepthAttachment>,
}

/// GPU access used by the compositor.
///
/// Creation calls report synchronous failures as [`BackendError`]. Everything
/// else, including writes and pass commands referring to dead handles, is
/// reported through [`GraphicsBackend::next_error`].
pub trait GraphicsBackend {
    /// Identity of the context the backend is currently bound to
    fn current_context(&self) -> ContextId;

    /// Pop the oldest entry of the GPU error queue
    fn next_error(&mut self) -> Option<GpuErrorCode>;

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle>;

    fn create_buffer_init(&mut self, desc: &BufferDescriptor, data: &[u8])
        -> BackendResult<BufferHandle>;

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Create a view covering every mip level of a texture
    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle>;

    /// Write tightly packed RGBA8 data into one mip level of a texture
    fn write_texture(
        &mut self,
        texture: TextureHandle,
        mip_level: u32,
        data: &[u8],
        width: u32,
        height: u32,
    );

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle>;

    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle>;

    /// Bind resources to a layout; entries are `(binding, resource)` pairs
    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle>;

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle>;

    // Pass recording. Commands between begin and end belong to that pass.

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor);

    fn end_render_pass(&mut self);

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle);

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle);

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64);

    fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat);

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);

    /// Submit all ended passes to the GPU queue
    fn submit(&mut self);

    // Destroying a handle that is not alive queues a validation error.

    fn destroy_buffer(&mut self, buffer: BufferHandle);

    fn destroy_texture(&mut self, texture: TextureHandle);

    fn destroy_texture_view(&mut self, view: TextureViewHandle);

    fn destroy_sampler(&mut self, sampler: SamplerHandle);

    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle);

    fn destroy_bind_group_layout(&mut self, layout: BindGroupLayoutHandle);

    fn destroy_render_pipeline(&mut self, pipeline: RenderPipelineHandle);
}
