//! WGSL compilation and introspection with naga.
//!
//! The GPU API resolves nothing by name, so attribute locations, uniform
//! member offsets and resource bindings are looked up here in the parsed
//! module instead.

use naga::{AddressSpace, Binding, Handle, Module, ResourceBinding, Scalar, ShaderStage, Type, TypeInner, VectorSize};

use crate::backend::VertexFormat;

/// A value passed between stages or from vertex buffers at a `@location`.
#[derive(Debug, Clone, PartialEq)]
pub struct StageVariable {
    pub name: Option<String>,
    pub location: u32,
    pub ty: TypeInner,
}

impl StageVariable {
    /// The vertex buffer format feeding this variable, if it has one.
    pub fn vertex_format(&self) -> Option<VertexFormat> {
        match self.ty {
            TypeInner::Scalar(scalar) if scalar == Scalar::F32 => Some(VertexFormat::Float32),
            TypeInner::Vector { size, scalar } if scalar == Scalar::F32 => Some(match size {
                VectorSize::Bi => VertexFormat::Float32x2,
                VectorSize::Tri => VertexFormat::Float32x3,
                VectorSize::Quad => VertexFormat::Float32x4,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniformMember {
    pub name: String,
    pub offset: u32,
    pub ty: TypeInner,
}

/// Members of a uniform buffer struct with their byte offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformBlockLayout {
    pub group: u32,
    pub binding: u32,
    pub size: u32,
    pub members: Vec<UniformMember>,
}

impl UniformBlockLayout {
    pub fn member(&self, name: &str) -> Option<&UniformMember> {
        self.members.iter().find(|m| m.name == name)
    }

    pub fn offset_of(&self, name: &str) -> Option<u32> {
        self.member(name).map(|m| m.offset)
    }
}

/// Parse and validate one WGSL stage, checking that `entry_point` exists.
pub fn compile_stage(source: &str, stage: ShaderStage, entry_point: &str) -> Result<Module, String> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| format!("WGSL parse error: {}", e.emit_to_string(source)))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|e| format!("Validation error: {e}"))?;

    if !module
        .entry_points
        .iter()
        .any(|ep| ep.name == entry_point && ep.stage == stage)
    {
        return Err(format!(
            "Entry point '{}' not found for stage {:?}",
            entry_point, stage
        ));
    }

    Ok(module)
}

fn collect_locations(
    module: &Module,
    ty: Handle<Type>,
    binding: Option<&Binding>,
    name: Option<&str>,
    out: &mut Vec<StageVariable>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => out.push(StageVariable {
            name: name.map(str::to_string),
            location: *location,
            ty: module.types[ty].inner.clone(),
        }),
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(
                        module,
                        member.ty,
                        member.binding.as_ref(),
                        member.name.as_deref(),
                        out,
                    );
                }
            }
        }
    }
}

fn find_entry<'a>(module: &'a Module, stage: ShaderStage, entry_point: &str) -> Option<&'a naga::EntryPoint> {
    module
        .entry_points
        .iter()
        .find(|ep| ep.name == entry_point && ep.stage == stage)
}

/// Location-bound inputs of an entry point, flattening struct arguments.
pub fn entry_inputs(module: &Module, stage: ShaderStage, entry_point: &str) -> Vec<StageVariable> {
    let mut out = Vec::new();
    if let Some(ep) = find_entry(module, stage, entry_point) {
        for arg in &ep.function.arguments {
            collect_locations(module, arg.ty, arg.binding.as_ref(), arg.name.as_deref(), &mut out);
        }
    }
    out
}

/// Location-bound outputs of an entry point, flattening a struct result.
pub fn entry_outputs(module: &Module, stage: ShaderStage, entry_point: &str) -> Vec<StageVariable> {
    let mut out = Vec::new();
    if let Some(result) = find_entry(module, stage, entry_point).and_then(|ep| ep.function.result.as_ref()) {
        collect_locations(module, result.ty, result.binding.as_ref(), None, &mut out);
    }
    out
}

/// The first uniform-buffer global whose type is a struct.
pub fn uniform_block(module: &Module) -> Option<UniformBlockLayout> {
    module.global_variables.iter().find_map(|(_, global)| {
        if global.space != AddressSpace::Uniform {
            return None;
        }
        let ResourceBinding { group, binding } = global.binding.clone()?;
        let ty = &module.types[global.ty];
        match &ty.inner {
            TypeInner::Struct { members, span } => Some(UniformBlockLayout {
                group,
                binding,
                size: *span,
                members: members
                    .iter()
                    .filter_map(|m| {
                        Some(UniformMember {
                            name: m.name.clone()?,
                            offset: m.offset,
                            ty: module.types[m.ty].inner.clone(),
                        })
                    })
                    .collect(),
            }),
            _ => None,
        }
    })
}

/// Binding of the resource global called `name`.
pub fn resource_binding(module: &Module, name: &str) -> Option<ResourceBinding> {
    module
        .global_variables
        .iter()
        .find(|(_, global)| global.name.as_deref() == Some(name))
        .and_then(|(_, global)| global.binding.clone())
}

/// Check that the fragment stage only reads what the vertex stage writes and
/// that both stages agree on the uniform block.
pub fn check_interface(
    vertex: &Module,
    vertex_entry: &str,
    fragment: &Module,
    fragment_entry: &str,
) -> Result<(), String> {
    let outputs = entry_outputs(vertex, ShaderStage::Vertex, vertex_entry);
    for input in entry_inputs(fragment, ShaderStage::Fragment, fragment_entry) {
        match outputs.iter().find(|o| o.location == input.location) {
            None => {
                return Err(format!(
                    "fragment input @location({}) is not written by the vertex stage",
                    input.location
                ))
            }
            Some(output) if output.ty != input.ty => {
                return Err(format!(
                    "@location({}) is {:?} in the vertex stage but {:?} in the fragment stage",
                    input.location, output.ty, input.ty
                ))
            }
            Some(_) => {}
        }
    }

    if let (Some(v), Some(f)) = (uniform_block(vertex), uniform_block(fragment)) {
        if v != f {
            return Err("uniform block layouts differ between stages".into());
        }
    }
    Ok(())
}
