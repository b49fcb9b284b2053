//! Overlay shader program: compile, link and resolve locations.
//!
//! Building a [`ShaderProgram`] runs three labeled steps:
//!
//! 1. **Compile** each WGSL stage with naga and validate it.
//! 2. **Resolve** attribute locations, uniform member offsets and texture
//!    bindings by name.
//! 3. **Link** by checking the stage interface and creating the bind group
//!    layout, uniform buffer and render pipeline on the backend, then
//!    draining the GPU error queue.
//!
//! Any failure is reported as [`OverlayError::ShaderCompile`] and leaves no
//! backend object alive.

pub mod reflect;
pub mod uniforms;

pub use uniforms::UniformBlock;

use naga::{Scalar, ShaderStage, TypeInner, VectorSize};

use crate::backend::*;
use crate::error::{drain_gpu_errors, OverlayError, OverlayResult};
use crate::RendererConfig;

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

pub const COMPILE_VERTEX_LABEL: &str = "Compile vertex shader";
pub const COMPILE_FRAGMENT_LABEL: &str = "Compile fragment shader";
pub const RESOLVE_LABEL: &str = "Resolve program locations";
pub const LINK_LABEL: &str = "Link overlay program";

// Names the overlay shaders must declare
pub const POSITION_ATTRIBUTE: &str = "position";
pub const TEX_COORD_ATTRIBUTE: &str = "tex_coord";
pub const VIEW_TRANSFORM_UNIFORM: &str = "view_transform";
pub const PROJECTION_UNIFORM: &str = "projection";
pub const TINT_UNIFORM: &str = "tint";
pub const MARKER_RADIUS_UNIFORM: &str = "marker_radius";
pub const FADE_RADIUS_UNIFORM: &str = "fade_radius";
pub const TEXTURE_BINDING_NAME: &str = "design_texture";
pub const SAMPLER_BINDING_NAME: &str = "design_sampler";

/// A vertex attribute resolved from the vertex stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeLocation {
    pub location: u32,
    pub format: VertexFormat,
}

/// Byte offsets of every overlay uniform inside the uniform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLayout {
    pub binding: u32,
    pub size: u32,
    pub view_transform: u32,
    pub projection: u32,
    pub tint: u32,
    pub marker_radius: u32,
    pub fade_radius: u32,
}

/// Everything the renderer needs to address the program's inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramLocations {
    pub position: AttributeLocation,
    pub tex_coord: AttributeLocation,
    pub uniforms: UniformLayout,
    pub texture_binding: u32,
    pub sampler_binding: u32,
}

impl ProgramLocations {
    /// Look up every overlay input by name in the compiled stages.
    pub fn resolve(vertex: &naga::Module, fragment: &naga::Module) -> Result<Self, String> {
        let inputs = reflect::entry_inputs(vertex, ShaderStage::Vertex, VERTEX_ENTRY);
        let attribute = |name: &str, expected: VertexFormat| -> Result<AttributeLocation, String> {
            let input = inputs
                .iter()
                .find(|input| input.name.as_deref() == Some(name))
                .ok_or_else(|| format!("attribute `{}` not found", name))?;
            let format = input
                .vertex_format()
                .ok_or_else(|| format!("attribute `{}` has unsupported type {:?}", name, input.ty))?;
            if format != expected {
                return Err(format!(
                    "attribute `{}` must be {:?}, found {:?}",
                    name, expected, format
                ));
            }
            Ok(AttributeLocation {
                location: input.location,
                format,
            })
        };
        // Vertex buffers are laid out for exactly these formats.
        let position = attribute(POSITION_ATTRIBUTE, VertexFormat::Float32x4)?;
        let tex_coord = attribute(TEX_COORD_ATTRIBUTE, VertexFormat::Float32x2)?;

        let block = reflect::uniform_block(vertex)
            .or_else(|| reflect::uniform_block(fragment))
            .ok_or_else(|| "uniform block not found".to_string())?;
        if block.group != 0 {
            return Err(format!("uniform block must be in group 0, found {}", block.group));
        }
        let offset = |name: &str, expected: TypeInner, wgsl: &str| -> Result<u32, String> {
            let member = block
                .member(name)
                .ok_or_else(|| format!("uniform `{}` not found", name))?;
            if member.ty != expected {
                return Err(format!(
                    "uniform `{}` must be {}, found {:?}",
                    name, wgsl, member.ty
                ));
            }
            Ok(member.offset)
        };
        let mat4 = || TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            scalar: Scalar::F32,
        };
        let vec3 = TypeInner::Vector {
            size: VectorSize::Tri,
            scalar: Scalar::F32,
        };
        let float = || TypeInner::Scalar(Scalar::F32);
        let uniforms = UniformLayout {
            binding: block.binding,
            size: block.size,
            view_transform: offset(VIEW_TRANSFORM_UNIFORM, mat4(), "mat4x4<f32>")?,
            projection: offset(PROJECTION_UNIFORM, mat4(), "mat4x4<f32>")?,
            tint: offset(TINT_UNIFORM, vec3, "vec3<f32>")?,
            marker_radius: offset(MARKER_RADIUS_UNIFORM, float(), "f32")?,
            fade_radius: offset(FADE_RADIUS_UNIFORM, float(), "f32")?,
        };

        let binding = |name: &str| -> Result<u32, String> {
            let rb = reflect::resource_binding(fragment, name)
                .ok_or_else(|| format!("binding `{}` not found", name))?;
            if rb.group != 0 {
                return Err(format!("binding `{}` must be in group 0", name));
            }
            Ok(rb.binding)
        };

        Ok(Self {
            position,
            tex_coord,
            uniforms,
            texture_binding: binding(TEXTURE_BINDING_NAME)?,
            sampler_binding: binding(SAMPLER_BINDING_NAME)?,
        })
    }

    /// Vertex buffer slot 0 feeds positions, slot 1 texture coordinates.
    pub fn vertex_layouts(&self) -> Vec<VertexBufferLayout> {
        vec![
            VertexBufferLayout::single(self.position.location, self.position.format),
            VertexBufferLayout::single(self.tex_coord.location, self.tex_coord.format),
        ]
    }

    pub fn bind_group_layout_entries(&self) -> Vec<BindGroupLayoutEntry> {
        vec![
            BindGroupLayoutEntry {
                binding: self.uniforms.binding,
                visibility: ShaderStageFlags::VERTEX_FRAGMENT,
                ty: BindingType::UniformBuffer,
            },
            BindGroupLayoutEntry {
                binding: self.texture_binding,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Texture,
            },
            BindGroupLayoutEntry {
                binding: self.sampler_binding,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Sampler,
            },
        ]
    }
}

fn shader_error(label: &str, code: GpuErrorCode, detail: String) -> OverlayError {
    log::error!("{}: {}", label, detail);
    OverlayError::ShaderCompile {
        label: label.to_string(),
        code,
        detail,
    }
}

/// The linked overlay program and the objects it owns.
#[derive(Debug)]
pub struct ShaderProgram {
    pub pipeline: RenderPipelineHandle,
    pub bind_group_layout: BindGroupLayoutHandle,
    pub uniform_buffer: BufferHandle,
    pub locations: ProgramLocations,
}

impl ShaderProgram {
    /// Compile both stages, resolve their inputs and link them into a pipeline.
    pub fn build<B: GraphicsBackend>(
        backend: &mut B,
        vertex_source: &str,
        fragment_source: &str,
        config: &RendererConfig,
    ) -> OverlayResult<Self> {
        let vertex = reflect::compile_stage(vertex_source, ShaderStage::Vertex, VERTEX_ENTRY)
            .map_err(|detail| shader_error(COMPILE_VERTEX_LABEL, GpuErrorCode::Validation, detail))?;
        let fragment =
            reflect::compile_stage(fragment_source, ShaderStage::Fragment, FRAGMENT_ENTRY).map_err(
                |detail| shader_error(COMPILE_FRAGMENT_LABEL, GpuErrorCode::Validation, detail),
            )?;

        let locations = ProgramLocations::resolve(&vertex, &fragment)
            .map_err(|detail| shader_error(RESOLVE_LABEL, GpuErrorCode::Validation, detail))?;
        log::debug!("Resolved overlay program locations: {:?}", locations);

        reflect::check_interface(&vertex, VERTEX_ENTRY, &fragment, FRAGMENT_ENTRY)
            .map_err(|detail| shader_error(LINK_LABEL, GpuErrorCode::Validation, detail))?;

        let descriptor = RenderPipelineDescriptor {
            label: Some(config.label.clone()),
            vertex_shader: vertex_source.to_string(),
            fragment_shader: fragment_source.to_string(),
            vertex_layouts: locations.vertex_layouts(),
            bind_group_layouts: Vec::new(),
            depth_stencil: config.depth_format.map(|format| DepthStencilState {
                format,
                depth_write_enabled: true,
            }),
            color_targets: vec![ColorTargetState {
                format: config.color_format,
            }],
        };

        Self::link(backend, descriptor, locations)
    }

    fn link<B: GraphicsBackend>(
        backend: &mut B,
        mut descriptor: RenderPipelineDescriptor,
        locations: ProgramLocations,
    ) -> OverlayResult<Self> {
        let mut created = Vec::with_capacity(3);

        let result = (|| -> BackendResult<Self> {
            let bind_group_layout =
                backend.create_bind_group_layout(&locations.bind_group_layout_entries())?;
            created.push(GpuResource::BindGroupLayout(bind_group_layout));

            let uniform_buffer = backend.create_buffer(&BufferDescriptor {
                label: Some("Overlay Uniforms".into()),
                size: locations.uniforms.size as u64,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            })?;
            created.push(GpuResource::Buffer(uniform_buffer));

            descriptor.bind_group_layouts = vec![bind_group_layout];
            let pipeline = backend.create_render_pipeline(&descriptor)?;
            created.push(GpuResource::RenderPipeline(pipeline));

            Ok(Self {
                pipeline,
                bind_group_layout,
                uniform_buffer,
                locations,
            })
        })();

        let failure = match result {
            Ok(program) => match drain_gpu_errors(backend, LINK_LABEL) {
                None => return Ok(program),
                Some(code) => shader_error(
                    LINK_LABEL,
                    code,
                    "pipeline creation reported a GPU error".into(),
                ),
            },
            Err(error) => shader_error(LINK_LABEL, error.code(), error.to_string()),
        };

        for resource in created.iter().rev() {
            resource.destroy(backend);
        }
        Err(failure)
    }

    pub fn resources(&self) -> [GpuResource; 3] {
        [
            GpuResource::BindGroupLayout(self.bind_group_layout),
            GpuResource::Buffer(self.uniform_buffer),
            GpuResource::RenderPipeline(self.pipeline),
        ]
    }
}
