use std::collections::BTreeMap;

use naga::{AddressSpace, ArraySize, Binding, ImageClass, ImageDimension, TypeInner};

use crate::error::{CompileStage, EffectError, Result};

use super::uniform::{ScalarKind, UniformLocation, UniformType};

/// Highest bind group index a program may use (wgpu's default limit is 4 groups).
pub const MAX_BIND_GROUPS: u32 = 4;

/// Kind of resource occupying a binding slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BindingKind {
    UniformBuffer { size: u32 },
    Texture,
    Sampler,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSlot {
    pub group: u32,
    pub binding: u32,
    pub name: String,
    pub kind: BindingKind,
    pub visibility: wgpu::ShaderStages,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexInput {
    pub name: String,
    pub location: u32,
}

/// What one compiled stage declares.
#[derive(Debug, Clone)]
pub struct StageReflection {
    pub stage: CompileStage,
    pub entry_point: String,
    pub bindings: Vec<BindingSlot>,
    pub uniforms: BTreeMap<String, UniformLocation>,
    pub vertex_inputs: Vec<VertexInput>,
}

/// Parses and validates one WGSL stage, then reflects its interface.
///
/// Every failure comes back as [`EffectError::ShaderCompile`] carrying the
/// compiler diagnostic for `stage`.
pub fn compile(stage: CompileStage, source: &str) -> Result<StageReflection> {
    let naga_stage = match stage {
        CompileStage::Vertex => naga::ShaderStage::Vertex,
        CompileStage::Fragment => naga::ShaderStage::Fragment,
        CompileStage::Link => {
            return Err(EffectError::compile(stage, "link is not a compilable stage"));
        }
    };

    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| EffectError::compile(stage, e.emit_to_string(source)))?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    )
    .validate(&module)
    .map_err(|e| EffectError::compile(stage, e.emit_to_string(source)))?;

    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == naga_stage)
        .ok_or_else(|| EffectError::compile(stage, format!("no @{stage} entry point")))?;

    let visibility = match stage {
        CompileStage::Vertex => wgpu::ShaderStages::VERTEX,
        _ => wgpu::ShaderStages::FRAGMENT,
    };

    let mut reflection = StageReflection {
        stage,
        entry_point: entry.name.clone(),
        bindings: Vec::new(),
        uniforms: BTreeMap::new(),
        vertex_inputs: Vec::new(),
    };

    for (_, var) in module.global_variables.iter() {
        let Some(rb) = &var.binding else {
            continue;
        };
        let name = var.name.clone().unwrap_or_default();
        let inner = &module.types[var.ty].inner;

        let kind = match (var.space, inner) {
            (AddressSpace::Uniform, _) => {
                let size = inner.size(module.to_ctx());
                if let TypeInner::Struct { members, .. } = inner {
                    for member in members {
                        let Some(member_name) = &member.name else {
                            continue;
                        };
                        let loc = UniformLocation {
                            group: rb.group,
                            binding: rb.binding,
                            offset: member.offset,
                            size: module.types[member.ty].inner.size(module.to_ctx()),
                            ty: uniform_type(&module, member.ty),
                        };
                        insert_uniform(&mut reflection.uniforms, stage, member_name, loc)?;
                    }
                }
                if !name.is_empty() {
                    let loc = UniformLocation {
                        group: rb.group,
                        binding: rb.binding,
                        offset: 0,
                        size,
                        ty: uniform_type(&module, var.ty),
                    };
                    insert_uniform(&mut reflection.uniforms, stage, &name, loc)?;
                }
                BindingKind::UniformBuffer { size }
            }
            (
                AddressSpace::Handle,
                TypeInner::Image {
                    dim: ImageDimension::D2,
                    arrayed: false,
                    class:
                        ImageClass::Sampled {
                            kind: naga::ScalarKind::Float,
                            multi: false,
                        },
                },
            ) => BindingKind::Texture,
            (AddressSpace::Handle, TypeInner::Sampler { comparison: false }) => BindingKind::Sampler,
            _ => {
                return Err(EffectError::compile(
                    stage,
                    format!(
                        "`{name}` at @group({}) @binding({}): only uniform buffers, \
                         filterable texture_2d<f32> and sampler are supported",
                        rb.group, rb.binding
                    ),
                ));
            }
        };

        reflection.bindings.push(BindingSlot {
            group: rb.group,
            binding: rb.binding,
            name,
            kind,
            visibility,
        });
    }

    if stage == CompileStage::Vertex {
        for arg in &entry.function.arguments {
            match &arg.binding {
                Some(Binding::Location { location, .. }) => reflection.vertex_inputs.push(VertexInput {
                    name: arg.name.clone().unwrap_or_default(),
                    location: *location,
                }),
                Some(Binding::BuiltIn(_)) => {}
                None => {
                    if let TypeInner::Struct { members, .. } = &module.types[arg.ty].inner {
                        for member in members {
                            if let Some(Binding::Location { location, .. }) = &member.binding {
                                reflection.vertex_inputs.push(VertexInput {
                                    name: member.name.clone().unwrap_or_default(),
                                    location: *location,
                                });
                            }
                        }
                    }
                }
            }
        }
    }

    Ok(reflection)
}

fn insert_uniform(
    uniforms: &mut BTreeMap<String, UniformLocation>,
    stage: CompileStage,
    name: &str,
    loc: UniformLocation,
) -> Result<()> {
    match uniforms.get(name) {
        Some(existing) if *existing != loc => Err(EffectError::compile(
            stage,
            format!("uniform `{name}` is declared at two different locations"),
        )),
        Some(_) => Ok(()),
        None => {
            uniforms.insert(name.to_owned(), loc);
            Ok(())
        }
    }
}

fn uniform_type(module: &naga::Module, ty: naga::Handle<naga::Type>) -> UniformType {
    match &module.types[ty].inner {
        TypeInner::Scalar(scalar) => UniformType::Scalar(scalar_kind(scalar.kind)),
        TypeInner::Vector { size, scalar } => UniformType::Vector {
            kind: scalar_kind(scalar.kind),
            size: *size as u8,
        },
        TypeInner::Matrix { columns, rows, .. } => UniformType::Matrix {
            columns: *columns as u8,
            rows: *rows as u8,
        },
        TypeInner::Array {
            base,
            size: ArraySize::Constant(count),
            stride,
        } => UniformType::Array {
            element: Box::new(uniform_type(module, *base)),
            count: count.get(),
            stride: *stride,
        },
        TypeInner::Struct { .. } => UniformType::Struct,
        _ => UniformType::Opaque,
    }
}

#[allow(unreachable_patterns)]
fn scalar_kind(kind: naga::ScalarKind) -> ScalarKind {
    match kind {
        naga::ScalarKind::Float | naga::ScalarKind::AbstractFloat => ScalarKind::Float,
        naga::ScalarKind::Sint | naga::ScalarKind::AbstractInt => ScalarKind::Sint,
        naga::ScalarKind::Uint => ScalarKind::Uint,
        naga::ScalarKind::Bool => ScalarKind::Bool,
        _ => ScalarKind::Float,
    }
}

/// Interface of a linked vertex + fragment pair.
#[derive(Debug, Clone)]
pub struct ProgramLayout {
    pub vertex_entry: String,
    pub fragment_entry: String,
    /// Sorted by `(group, binding)`.
    pub bindings: Vec<BindingSlot>,
    pub uniforms: BTreeMap<String, UniformLocation>,
    pub vertex_inputs: Vec<VertexInput>,
}

impl ProgramLayout {
    /// Merges two stage interfaces. Bindings shared between stages must
    /// declare the same resource; their visibility is combined.
    pub fn link(vertex: &StageReflection, fragment: &StageReflection) -> Result<Self> {
        let mut bindings: BTreeMap<(u32, u32), BindingSlot> = BTreeMap::new();
        for slot in vertex.bindings.iter().chain(&fragment.bindings) {
            if slot.group >= MAX_BIND_GROUPS {
                return Err(EffectError::compile(
                    CompileStage::Link,
                    format!(
                        "`{}` uses bind group {}; at most {MAX_BIND_GROUPS} groups are available",
                        slot.name, slot.group
                    ),
                ));
            }
            match bindings.get_mut(&(slot.group, slot.binding)) {
                Some(existing) if existing.kind != slot.kind => {
                    return Err(EffectError::compile(
                        CompileStage::Link,
                        format!(
                            "@group({}) @binding({}) is declared differently by the vertex and fragment stages",
                            slot.group, slot.binding
                        ),
                    ));
                }
                Some(existing) => existing.visibility |= slot.visibility,
                None => {
                    bindings.insert((slot.group, slot.binding), slot.clone());
                }
            }
        }

        let mut uniforms = vertex.uniforms.clone();
        for (name, loc) in &fragment.uniforms {
            insert_uniform(&mut uniforms, CompileStage::Link, name, loc.clone())?;
        }

        Ok(Self {
            vertex_entry: vertex.entry_point.clone(),
            fragment_entry: fragment.entry_point.clone(),
            bindings: bindings.into_values().collect(),
            uniforms,
            vertex_inputs: vertex.vertex_inputs.clone(),
        })
    }

    /// Number of bind group layouts the pipeline layout needs.
    pub fn group_count(&self) -> u32 {
        self.bindings.iter().map(|b| b.group + 1).max().unwrap_or(0)
    }

    pub fn bindings_in(&self, group: u32) -> impl Iterator<Item = &BindingSlot> {
        self.bindings.iter().filter(move |b| b.group == group)
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformLocation> {
        self.uniforms.get(name)
    }

    /// Texture slots in binding order; the input texture goes to the one at
    /// the active texture index.
    pub fn textures(&self) -> impl Iterator<Item = &BindingSlot> {
        self.bindings.iter().filter(|b| b.kind == BindingKind::Texture)
    }

    pub fn uniform_buffers(&self) -> impl Iterator<Item = (&BindingSlot, u32)> {
        self.bindings.iter().filter_map(|b| match b.kind {
            BindingKind::UniformBuffer { size } => Some((b, size)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::builtin;

    #[test]
    fn builtin_vertex_stage_reflects_transform_and_inputs() {
        let vs = compile(CompileStage::Vertex, builtin::EFFECT_VERT).unwrap();
        assert_eq!(vs.entry_point, "vs_main");

        let mvp = &vs.uniforms["mvp"];
        assert_eq!((mvp.group, mvp.binding, mvp.offset, mvp.size), (0, 0, 0, 64));
        assert_eq!(vs.uniforms["model_view"].offset, 64);
        assert_eq!(vs.uniforms["normal_matrix"].offset, 128);
        assert_eq!(vs.uniforms["normal_matrix"].size, 48);

        let names: Vec<_> = vs.vertex_inputs.iter().map(|i| (i.name.as_str(), i.location)).collect();
        assert_eq!(names, vec![("position", 0), ("tex_coord", 1)]);
    }

    #[test]
    fn blur_stage_reflects_array_uniform() {
        let fs = compile(CompileStage::Fragment, builtin::BLUR_FRAG).unwrap();
        let weights = &fs.uniforms["weights"];
        assert_eq!(
            weights.ty,
            UniformType::Array {
                element: Box::new(UniformType::Vector {
                    kind: ScalarKind::Float,
                    size: 4
                }),
                count: 8,
                stride: 16,
            }
        );
        assert_eq!(fs.uniforms["radius"].ty, UniformType::Scalar(ScalarKind::Sint));
    }

    #[test]
    fn syntax_error_reports_fragment_stage() {
        let err = compile(CompileStage::Fragment, "fn fs_main( -> {").unwrap_err();
        match err {
            EffectError::ShaderCompile { stage, log } => {
                assert_eq!(stage, CompileStage::Fragment);
                assert!(!log.is_empty());
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_entry_point_is_a_compile_error() {
        let err = compile(CompileStage::Vertex, builtin::PASSTHROUGH_FRAG).unwrap_err();
        assert!(matches!(
            err,
            EffectError::ShaderCompile {
                stage: CompileStage::Vertex,
                ..
            }
        ));
    }

    #[test]
    fn link_merges_shared_bindings() {
        let vs = compile(CompileStage::Vertex, builtin::CLOTH_VERT).unwrap();
        let fs = compile(CompileStage::Fragment, builtin::CLOTH_FRAG).unwrap();
        let layout = ProgramLayout::link(&vs, &fs).unwrap();

        assert_eq!(layout.group_count(), 2);
        let cloth = layout.bindings_in(0).find(|b| b.binding == 1).unwrap();
        assert_eq!(
            cloth.visibility,
            wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT
        );
        assert_eq!(layout.textures().count(), 1);
        assert!(layout.uniform("wave_amplitude").is_some());
    }

    #[test]
    fn link_rejects_conflicting_bindings() {
        let vs = compile(CompileStage::Vertex, builtin::EFFECT_VERT).unwrap();
        let fs_src = "
            @group(0) @binding(0) var t: texture_2d<f32>;
            @group(0) @binding(1) var s: sampler;
            @fragment
            fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
                return textureSample(t, s, uv);
            }
        ";
        let fs = compile(CompileStage::Fragment, fs_src).unwrap();
        let err = ProgramLayout::link(&vs, &fs).unwrap_err();
        assert!(matches!(
            err,
            EffectError::ShaderCompile {
                stage: CompileStage::Link,
                ..
            }
        ));
    }

    #[test]
    fn storage_buffers_are_rejected() {
        let src = "
            @group(0) @binding(0) var<storage, read> data: array<f32>;
            @fragment
            fn fs_main() -> @location(0) vec4<f32> {
                return vec4<f32>(data[0]);
            }
        ";
        assert!(compile(CompileStage::Fragment, src).is_err());
    }
}
