//! Interface reflection over validated naga modules.

use crate::backend::{ResourceBindingKind, ResourceBindingLayout, TextureSampleType, VertexFormat};
use crate::shader::uniform::UniformKind;
use naga::{AddressSpace, Binding, Handle, ImageClass, ImageDimension, Module, ScalarKind, Type, TypeInner, VectorSize};
use std::collections::BTreeMap;

/// A member of the uniform block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformMember {
    pub offset: u32,
    pub kind: UniformKind,
}

/// The `@group(0) @binding(0)` uniform struct of one stage
#[derive(Debug, Clone, PartialEq)]
pub struct UniformBlock {
    pub size: u64,
    pub members: BTreeMap<String, UniformMember>,
}

/// User-defined stage inputs or outputs keyed by `@location`
pub type Interface = BTreeMap<u32, (String, TypeInner)>;

fn collect_locations(
    module: &Module,
    name: Option<&String>,
    ty: Handle<Type>,
    binding: Option<&Binding>,
    out: &mut Interface,
) {
    match binding {
        Some(Binding::Location { location, .. }) => {
            out.insert(
                *location,
                (name.cloned().unwrap_or_default(), module.types[ty].inner.clone()),
            );
        }
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.name.as_ref(), member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

pub fn entry_inputs(module: &Module, entry: &naga::EntryPoint) -> Interface {
    let mut out = Interface::new();
    for argument in &entry.function.arguments {
        collect_locations(module, argument.name.as_ref(), argument.ty, argument.binding.as_ref(), &mut out);
    }
    out
}

pub fn entry_outputs(module: &Module, entry: &naga::EntryPoint) -> Interface {
    let mut out = Interface::new();
    if let Some(result) = &entry.function.result {
        collect_locations(module, None, result.ty, result.binding.as_ref(), &mut out);
    }
    out
}

/// Vertex buffer format for a `f32` scalar or vector input
pub fn vertex_format(inner: &TypeInner) -> Option<VertexFormat> {
    match *inner {
        TypeInner::Scalar(scalar) if scalar == naga::Scalar::F32 => Some(VertexFormat::Float32),
        TypeInner::Vector { size, scalar } if scalar == naga::Scalar::F32 => Some(match size {
            VectorSize::Bi => VertexFormat::Float32x2,
            VectorSize::Tri => VertexFormat::Float32x3,
            VectorSize::Quad => VertexFormat::Float32x4,
        }),
        _ => None,
    }
}

fn uniform_kind(module: &Module, inner: &TypeInner) -> Option<UniformKind> {
    match *inner {
        TypeInner::Scalar(scalar) if scalar == naga::Scalar::F32 => Some(UniformKind::Float),
        TypeInner::Vector { size, scalar } if scalar == naga::Scalar::F32 => Some(match size {
            VectorSize::Bi => UniformKind::Vec2,
            VectorSize::Tri => UniformKind::Vec3,
            VectorSize::Quad => UniformKind::Vec4,
        }),
        TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            scalar,
        } if scalar == naga::Scalar::F32 => Some(UniformKind::Mat4),
        TypeInner::Array {
            base,
            size: naga::ArraySize::Constant(count),
            ..
        } => match uniform_kind(module, &module.types[base].inner)? {
            UniformKind::Vec4 => Some(UniformKind::Vec4Array(count.get())),
            _ => None,
        },
        _ => None,
    }
}

/// Reflect the uniform block, if the module declares one.
pub fn uniform_block(module: &Module) -> Result<Option<UniformBlock>, String> {
    let mut block = None;

    for (_, var) in module.global_variables.iter() {
        if var.space != AddressSpace::Uniform {
            continue;
        }
        let name = var.name.clone().unwrap_or_default();
        match &var.binding {
            Some(rb) if rb.group == 0 && rb.binding == 0 => {}
            other => {
                return Err(format!(
                    "uniform '{name}' must be bound at @group(0) @binding(0), found {other:?}"
                ))
            }
        }
        if block.is_some() {
            return Err(format!("uniform '{name}': only one uniform block is supported"));
        }
        let TypeInner::Struct { members, span } = &module.types[var.ty].inner else {
            return Err(format!("uniform '{name}' must be a struct"));
        };

        let mut reflected = BTreeMap::new();
        for member in members {
            let member_name = member.name.clone().unwrap_or_default();
            let kind = uniform_kind(module, &module.types[member.ty].inner).ok_or_else(|| {
                format!("uniform member '{name}.{member_name}' has an unsupported type")
            })?;
            reflected.insert(
                member_name,
                UniformMember {
                    offset: member.offset,
                    kind,
                },
            );
        }

        block = Some(UniformBlock {
            size: *span as u64,
            members: reflected,
        });
    }

    Ok(block)
}

/// Reflect the `@group(1)` textures and samplers, sorted by binding.
pub fn resource_bindings(module: &Module) -> Result<Vec<ResourceBindingLayout>, String> {
    let mut bindings = Vec::new();

    for (_, var) in module.global_variables.iter() {
        if var.space != AddressSpace::Handle {
            continue;
        }
        let name = var.name.clone().unwrap_or_default();
        let Some(rb) = &var.binding else {
            continue;
        };
        if rb.group != 1 {
            return Err(format!(
                "'{name}' is bound in group {}; textures and samplers belong to group 1",
                rb.group
            ));
        }

        let kind = match &module.types[var.ty].inner {
            TypeInner::Image {
                dim: ImageDimension::D2,
                arrayed: false,
                class,
            } => match class {
                ImageClass::Depth { multi: false } => ResourceBindingKind::Texture {
                    sample_type: TextureSampleType::Depth,
                },
                ImageClass::Sampled { kind, multi: false } => ResourceBindingKind::Texture {
                    sample_type: match kind {
                        ScalarKind::Float => TextureSampleType::Float { filterable: false },
                        ScalarKind::Sint => TextureSampleType::Sint,
                        ScalarKind::Uint => TextureSampleType::Uint,
                        _ => return Err(format!("texture '{name}' has an unsupported sample type")),
                    },
                },
                _ => return Err(format!("texture '{name}' has an unsupported class")),
            },
            TypeInner::Sampler { comparison: false } => ResourceBindingKind::Sampler,
            _ => return Err(format!("'{name}' is not a 2D texture or a filtering sampler")),
        };

        bindings.push(ResourceBindingLayout {
            name,
            binding: rb.binding,
            kind,
        });
    }

    bindings.sort_by_key(|b| b.binding);
    Ok(bindings)
}
