//! The overlay pass: one textured, faded quad per tracked frame

use crate::backend::*;
use crate::error::{check_gpu_error, OverlayError, OverlayResult};
use crate::lifecycle::ResourceLifecycleGuard;
use crate::pipeline::blend::{FADE_RADIUS, MARKER_RADIUS, SKIN_TINT};
use crate::pipeline::scope::RenderPassScope;
use crate::resources::geometry::QUAD_INDEX_COUNT;
use crate::resources::{DesignBitmap, DesignTexture, GeometryBufferSet};
use crate::shader::{ShaderProgram, UniformBlock};
use crate::tracking::{Matrix44, TargetSize};
use crate::RendererConfig;

pub const CREATE_GEOMETRY_LABEL: &str = "Create quad buffers";
pub const CREATE_TEXTURE_LABEL: &str = "Create texture";
pub const BIND_RESOURCES_LABEL: &str = "Bind overlay resources";
pub const UPDATE_GEOMETRY_LABEL: &str = "Update quad vertices";
pub const UPLOAD_UNIFORMS_LABEL: &str = "Upload overlay uniforms";
pub const DRAW_LABEL: &str = "Draw overlay";

const POSITION_SLOT: u32 = 0;
const TEX_COORD_SLOT: u32 = 1;

/// Where a frame's overlay is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayTarget {
    pub color: TextureViewHandle,
    /// Required exactly when the renderer was configured with a depth format.
    pub depth: Option<TextureViewHandle>,
    /// Clear color and depth before drawing. `None` draws over the camera image.
    pub clear: Option<[f32; 4]>,
}

impl OverlayTarget {
    pub fn new(color: TextureViewHandle) -> Self {
        Self {
            color,
            depth: None,
            clear: None,
        }
    }

    pub fn with_depth(mut self, depth: TextureViewHandle) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_clear(mut self, color: [f32; 4]) -> Self {
        self.clear = Some(color);
        self
    }
}

/// Draws the tattoo design over the tracked target.
///
/// Owns the program, quad buffers, texture and bind group it created. They
/// are released by [`dispose`](Self::dispose), and only if the context they
/// were created on is still current.
pub struct OverlayRenderer {
    guard: ResourceLifecycleGuard,
    program: ShaderProgram,
    geometry: GeometryBufferSet,
    texture: DesignTexture,
    bind_group: BindGroupHandle,
    uniforms: UniformBlock,
    config: RendererConfig,
}

impl OverlayRenderer {
    /// Build the overlay with the built-in shaders.
    pub fn new<B: GraphicsBackend>(
        backend: &mut B,
        design: &DesignBitmap,
        config: RendererConfig,
    ) -> OverlayResult<Self> {
        Self::with_shaders(
            backend,
            design,
            config,
            OVERLAY_VERTEX_SHADER,
            OVERLAY_FRAGMENT_SHADER,
        )
    }

    /// Build the overlay with custom WGSL stages.
    ///
    /// The stages must declare the same inputs, uniforms and bindings as the
    /// built-in ones. On failure nothing created here stays alive.
    pub fn with_shaders<B: GraphicsBackend>(
        backend: &mut B,
        design: &DesignBitmap,
        config: RendererConfig,
        vertex_source: &str,
        fragment_source: &str,
    ) -> OverlayResult<Self> {
        if config.color_format.is_depth() {
            return Err(OverlayError::InvalidInput(format!(
                "color format {:?} is a depth format",
                config.color_format
            )));
        }
        if let Some(format) = config.depth_format.filter(|f| !f.is_depth()) {
            return Err(OverlayError::InvalidInput(format!(
                "depth format {:?} has no depth aspect",
                format
            )));
        }

        let guard = ResourceLifecycleGuard::capture(backend);
        log::info!(
            "Creating overlay '{}' for a {}x{} design",
            config.label,
            design.width(),
            design.height()
        );

        let program = ShaderProgram::build(backend, vertex_source, fragment_source, &config)?;
        let mut created: Vec<GpuResource> = program.resources().to_vec();

        let result = Self::create_resources(backend, design, &program, &mut created);
        let (geometry, texture, bind_group) = match result {
            Ok(parts) => parts,
            Err(error) => {
                for resource in created.iter().rev() {
                    resource.destroy(backend);
                }
                return Err(error);
            }
        };

        let uniforms = UniformBlock::new(program.locations.uniforms);
        log::debug!(
            "Overlay ready: {} mip levels, {} byte uniform block",
            texture.mip_levels,
            uniforms.layout().size
        );

        Ok(Self {
            guard,
            program,
            geometry,
            texture,
            bind_group,
            uniforms,
            config,
        })
    }

    fn create_resources<B: GraphicsBackend>(
        backend: &mut B,
        design: &DesignBitmap,
        program: &ShaderProgram,
        created: &mut Vec<GpuResource>,
    ) -> OverlayResult<(GeometryBufferSet, DesignTexture, BindGroupHandle)> {
        let geometry = GeometryBufferSet::create_static(backend, CREATE_GEOMETRY_LABEL)?;
        created.extend(geometry.resources());
        check_gpu_error(backend, CREATE_GEOMETRY_LABEL)?;

        let texture = DesignTexture::upload(backend, design, CREATE_TEXTURE_LABEL)?;
        created.extend(texture.resources());
        check_gpu_error(backend, CREATE_TEXTURE_LABEL)?;

        let locations = &program.locations;
        let bind_group = backend
            .create_bind_group(
                program.bind_group_layout,
                &[
                    (
                        locations.uniforms.binding,
                        BindGroupEntry::Buffer {
                            buffer: program.uniform_buffer,
                            offset: 0,
                            size: None,
                        },
                    ),
                    (locations.texture_binding, BindGroupEntry::Texture(texture.view)),
                    (locations.sampler_binding, BindGroupEntry::Sampler(texture.sampler)),
                ],
            )
            .map_err(|e| OverlayError::from_backend(BIND_RESOURCES_LABEL, &e))?;
        created.push(GpuResource::BindGroup(bind_group));
        check_gpu_error(backend, BIND_RESOURCES_LABEL)?;

        Ok((geometry, texture, bind_group))
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// The context the overlay's resources belong to.
    pub fn guard(&self) -> &ResourceLifecycleGuard {
        &self.guard
    }

    /// Draw one frame.
    ///
    /// `projection` and `pose` are in the tracker's element order. Every
    /// labeled group of GPU work is followed by an error check, and the first
    /// failing group aborts the frame with [`OverlayError::Gpu`].
    pub fn render<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        target: &OverlayTarget,
        projection: &Matrix44,
        pose: &Matrix44,
        size: TargetSize,
    ) -> OverlayResult<()> {
        self.validate(target, size)?;
        log::trace!(
            "Rendering overlay '{}' for a {}x{} target",
            self.config.label,
            size.width,
            size.height
        );

        self.geometry.update_dynamic(backend, size);
        check_gpu_error(backend, UPDATE_GEOMETRY_LABEL)?;

        self.fill_uniforms(projection, pose);
        backend.write_buffer(self.program.uniform_buffer, 0, self.uniforms.as_bytes());
        check_gpu_error(backend, UPLOAD_UNIFORMS_LABEL)?;

        {
            let mut pass = RenderPassScope::begin(backend, &self.pass_descriptor(target));
            pass.set_render_pipeline(self.program.pipeline);
            pass.set_vertex_buffer(POSITION_SLOT, self.geometry.position_buffer, 0);
            pass.set_vertex_buffer(TEX_COORD_SLOT, self.geometry.tex_coord_buffer, 0);
            pass.set_bind_group(0, self.bind_group);
            pass.set_index_buffer(self.geometry.index_buffer, 0, IndexFormat::Uint16);
            pass.draw_indexed(0..QUAD_INDEX_COUNT, 0, 0..1);
        }
        backend.submit();
        check_gpu_error(backend, DRAW_LABEL)
    }

    fn validate(&self, target: &OverlayTarget, size: TargetSize) -> OverlayResult<()> {
        match (self.config.depth_format, target.depth) {
            (Some(format), None) => {
                return Err(OverlayError::InvalidInput(format!(
                    "overlay uses a {:?} depth buffer but the target has none",
                    format
                )))
            }
            (None, Some(_)) => {
                return Err(OverlayError::InvalidInput(
                    "target has a depth view but the overlay was built without depth".into(),
                ))
            }
            _ => {}
        }
        if !size.width.is_finite() || !size.height.is_finite() {
            return Err(OverlayError::InvalidInput(format!(
                "target size must be finite, got {}x{}",
                size.width, size.height
            )));
        }
        Ok(())
    }

    fn fill_uniforms(&mut self, projection: &Matrix44, pose: &Matrix44) {
        let layout = *self.uniforms.layout();
        self.uniforms
            .write_mat4(layout.view_transform, &pose.to_gpu_layout());
        self.uniforms
            .write_mat4(layout.projection, &projection.to_gpu_layout());
        self.uniforms.write_vec3(layout.tint, &SKIN_TINT);
        self.uniforms.write_f32(layout.marker_radius, MARKER_RADIUS);
        self.uniforms.write_f32(layout.fade_radius, FADE_RADIUS);
    }

    fn pass_descriptor(&self, target: &OverlayTarget) -> RenderPassDescriptor {
        let (color_load, depth_load) = match target.clear {
            Some(color) => (LoadOp::Clear(color), LoadOp::Clear(1.0)),
            None => (LoadOp::Load, LoadOp::Load),
        };
        RenderPassDescriptor {
            label: Some(self.config.label.clone()),
            color: target.color,
            color_load,
            depth: target.depth.map(|view| DepthAttachment {
                view,
                load: depth_load,
            }),
        }
    }

    /// Every GPU object owned by the overlay, in creation order.
    pub fn resources(&self) -> Vec<GpuResource> {
        let mut resources = Vec::with_capacity(10);
        resources.extend(self.program.resources());
        resources.extend(self.geometry.resources());
        resources.extend(self.texture.resources());
        resources.push(GpuResource::BindGroup(self.bind_group));
        resources
    }

    /// Release the overlay's GPU objects.
    ///
    /// If the creating context was lost in the meantime the objects died with
    /// it and no GPU call is made. Returns whether anything was destroyed.
    pub fn dispose<B: GraphicsBackend>(self, backend: &mut B) -> bool {
        let released = self.guard.release(backend, &self.resources());
        if released {
            log::info!("Disposed overlay '{}'", self.config.label);
        } else {
            log::info!(
                "Overlay '{}' outlived its context, nothing to release",
                self.config.label
            );
        }
        released
    }
}

/// Vertex stage: places the quad with the tracker's pose and projection.
pub const OVERLAY_VERTEX_SHADER: &str = r#"
struct OverlayUniforms {
    view_transform: mat4x4<f32>,
    projection: mat4x4<f32>,
    tint: vec3<f32>,
    marker_radius: f32,
    fade_radius: f32,
}

@group(0) @binding(0) var<uniform> overlay: OverlayUniforms;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
}

@vertex
fn vs_main(@location(0) position: vec4<f32>, @location(1) tex_coord: vec2<f32>) -> VertexOutput {
    var clip = overlay.projection * overlay.view_transform * position;
    // Tracker projections map depth to [-w, w]
    clip.z = 0.5 * (clip.z + clip.w);

    var out: VertexOutput;
    out.clip_position = clip;
    out.tex_coord = tex_coord;
    return out;
}
"#;

/// Fragment stage: tints and radially fades the stencil background, keeps ink as is.
pub const OVERLAY_FRAGMENT_SHADER: &str = r#"
struct OverlayUniforms {
    view_transform: mat4x4<f32>,
    projection: mat4x4<f32>,
    tint: vec3<f32>,
    marker_radius: f32,
    fade_radius: f32,
}

@group(0) @binding(0) var<uniform> overlay: OverlayUniforms;
@group(0) @binding(1) var design_texture: texture_2d<f32>;
@group(0) @binding(2) var design_sampler: sampler;

const STENCIL_THRESHOLD: f32 = 0.8;
const DESIGN_CENTER: vec2<f32> = vec2<f32>(0.5, 0.5);

@fragment
fn fs_main(@location(0) tex_coord: vec2<f32>) -> @location(0) vec4<f32> {
    let color = textureSample(design_texture, design_sampler, tex_coord);
    let value = sign(length(color.rgb));
    if value <= STENCIL_THRESHOLD {
        return color;
    }

    let dist = distance(tex_coord, DESIGN_CENTER);
    var alpha: f32;
    if dist < overlay.marker_radius {
        alpha = 1.0;
    } else if dist > overlay.fade_radius {
        alpha = 0.0;
    } else {
        let t = (dist - overlay.fade_radius) / (overlay.marker_radius - overlay.fade_radius);
        alpha = 1.0 - value * (1.0 - t);
    }
    return vec4<f32>(color.rgb * overlay.tint, alpha);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer(backend: &mut DummyBackend) -> OverlayRenderer {
        let design = DesignBitmap::solid_color(16, 16, [255, 255, 255, 255]).unwrap();
        OverlayRenderer::new(backend, &design, RendererConfig::default()).unwrap()
    }

    fn target() -> OverlayTarget {
        OverlayTarget::new(TextureViewHandle(900)).with_depth(TextureViewHandle(901))
    }

    #[test]
    fn test_construction_creates_everything_once() {
        let mut backend = DummyBackend::new();
        let overlay = renderer(&mut backend);

        let live = backend.live_resources();
        assert_eq!(live.len(), 10);
        for resource in overlay.resources() {
            assert!(live.contains(&resource), "{:?}", resource);
        }
        assert_eq!(backend.next_error(), None);
    }

    #[test]
    fn test_render_records_one_draw() {
        let mut backend = DummyBackend::new();
        let mut overlay = renderer(&mut backend);
        backend.clear_calls();

        overlay
            .render(
                &mut backend,
                &target(),
                &Matrix44::IDENTITY,
                &Matrix44::IDENTITY,
                TargetSize::new(1.0, 1.0),
            )
            .unwrap();

        let pass: Vec<_> = backend
            .calls()
            .iter()
            .skip_while(|call| !matches!(call, RecordedCall::BeginRenderPass { .. }))
            .cloned()
            .collect();
        assert_eq!(
            pass,
            vec![
                RecordedCall::BeginRenderPass {
                    color_load: LoadOp::Load,
                    depth_load: Some(LoadOp::Load),
                },
                RecordedCall::SetRenderPipeline(overlay.program.pipeline),
                RecordedCall::SetVertexBuffer {
                    slot: 0,
                    buffer: overlay.geometry.position_buffer,
                },
                RecordedCall::SetVertexBuffer {
                    slot: 1,
                    buffer: overlay.geometry.tex_coord_buffer,
                },
                RecordedCall::SetBindGroup {
                    index: 0,
                    bind_group: overlay.bind_group,
                },
                RecordedCall::SetIndexBuffer {
                    buffer: overlay.geometry.index_buffer,
                    format: IndexFormat::Uint16,
                },
                RecordedCall::DrawIndexed {
                    indices: 0..6,
                    instances: 0..1,
                },
                RecordedCall::EndRenderPass,
                RecordedCall::Submit,
            ]
        );
    }

    #[test]
    fn test_uniforms_are_transposed_and_constant() {
        let mut backend = DummyBackend::new();
        let mut overlay = renderer(&mut backend);
        backend.clear_calls();

        let mut elements = [0.0; 16];
        for (i, e) in elements.iter_mut().enumerate() {
            *e = i as f32;
        }
        let pose = Matrix44::new(elements);
        overlay
            .render(
                &mut backend,
                &target(),
                &Matrix44::IDENTITY,
                &pose,
                TargetSize::new(1.0, 1.0),
            )
            .unwrap();

        let (buffer, bytes) = backend.buffer_writes().pop().unwrap();
        assert_eq!(buffer, overlay.program.uniform_buffer);
        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(floats.len(), 40);
        assert_eq!(&floats[..16], &pose.to_gpu_layout());
        assert_eq!(&floats[16..32], Matrix44::IDENTITY.elements());
        assert_eq!(&floats[32..35], &SKIN_TINT);
        assert_eq!(floats[35], MARKER_RADIUS);
        assert_eq!(floats[36], FADE_RADIUS);
    }

    #[test]
    fn test_clear_target_clears_depth() {
        let mut backend = DummyBackend::new();
        let overlay = renderer(&mut backend);
        let desc = overlay.pass_descriptor(&target().with_clear([0.0, 0.0, 0.0, 1.0]));
        assert_eq!(desc.color_load, LoadOp::Clear([0.0, 0.0, 0.0, 1.0]));
        assert_eq!(desc.depth.unwrap().load, LoadOp::Clear(1.0));
    }

    #[test]
    fn test_rejects_target_without_depth() {
        let mut backend = DummyBackend::new();
        let mut overlay = renderer(&mut backend);
        backend.clear_calls();

        let err = overlay
            .render(
                &mut backend,
                &OverlayTarget::new(TextureViewHandle(900)),
                &Matrix44::IDENTITY,
                &Matrix44::IDENTITY,
                TargetSize::new(1.0, 1.0),
            )
            .unwrap_err();
        assert!(matches!(err, OverlayError::InvalidInput(_)));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_dispose_releases_everything() {
        let mut backend = DummyBackend::new();
        let overlay = renderer(&mut backend);
        backend.clear_calls();

        assert!(overlay.dispose(&mut backend));
        assert_eq!(backend.destroy_count(), 10);
        assert!(backend.live_resources().is_empty());
        assert_eq!(backend.next_error(), None);
    }

    #[test]
    fn test_failed_step_reports_what_it_created() {
        let mut backend = DummyBackend::new();
        let design = DesignBitmap::solid_color(4, 4, [0, 0, 0, 255]).unwrap();
        let program = ShaderProgram::build(
            &mut backend,
            OVERLAY_VERTEX_SHADER,
            OVERLAY_FRAGMENT_SHADER,
            &RendererConfig::default(),
        )
        .unwrap();
        let mut created = program.resources().to_vec();

        backend.inject_error(GpuErrorCode::OutOfMemory);
        let err = OverlayRenderer::create_resources(&mut backend, &design, &program, &mut created)
            .err()
            .unwrap();
        assert_eq!(err.label(), Some(CREATE_GEOMETRY_LABEL));
        assert_eq!(created.len(), 6);
    }

    #[test]
    fn test_rejects_color_format_as_depth() {
        let mut backend = DummyBackend::new();
        let design = DesignBitmap::solid_color(4, 4, [0, 0, 0, 255]).unwrap();
        let config = RendererConfig {
            depth_format: Some(TextureFormat::Rgba8Unorm),
            ..Default::default()
        };
        let err = OverlayRenderer::new(&mut backend, &design, config).err().unwrap();
        assert!(matches!(err, OverlayError::InvalidInput(_)));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_shaders_share_the_threshold() {
        assert!(OVERLAY_FRAGMENT_SHADER.contains("STENCIL_THRESHOLD: f32 = 0.8;"));
        assert_eq!(crate::pipeline::blend::STENCIL_THRESHOLD, 0.8);
    }
}
