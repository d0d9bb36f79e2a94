//! Shader program registry
//!
//! Programs are built from a pair of WGSL files. Each stage is parsed and
//! validated with naga, the two stages are linked against each other and the
//! reflected interface drives both the backend program layout and uniform
//! access by name.

pub mod reflect;
pub mod uniform;

pub use uniform::{UniformKind, UniformValue};

use crate::backend::{
    BackendError, GraphicsBackend, ProgramDescriptor, ProgramHandle, ResourceBindingKind,
    ResourceBindingLayout, ShaderStage, VertexInput,
};
use reflect::{UniformBlock, UniformMember};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while building a program. All of them are fatal at startup.
#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("Failed to read shader {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to compile {stage} shader of {label}:\n{diagnostic}")]
    Compile {
        label: String,
        stage: ShaderStage,
        diagnostic: String,
    },
    #[error("Validation failed for {stage} shader of {label}:\n{diagnostic}")]
    Validation {
        label: String,
        stage: ShaderStage,
        diagnostic: String,
    },
    #[error("{label}: no {stage} entry point")]
    MissingEntryPoint { label: String, stage: ShaderStage },
    #[error("Failed to link {label}: {reason}")]
    Link { label: String, reason: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Misuse of [`ShaderRegistry::set_uniform`]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum UniformError {
    #[error("Unknown program {0:?}")]
    UnknownProgram(ProgramHandle),
    #[error("Program {program} has no uniform named '{name}'")]
    UnknownUniform { program: String, name: String },
    #[error("Uniform '{name}' is {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: UniformKind,
        found: UniformKind,
    },
}

/// A linked program and its reflection data
#[derive(Debug)]
pub struct ShaderProgram {
    label: String,
    vertex_path: Option<PathBuf>,
    fragment_path: Option<PathBuf>,
    uniforms: BTreeMap<String, UniformMember>,
    attribute_slots: HashMap<String, u32>,
    texture_units: Vec<String>,
    block: Vec<u8>,
}

impl ShaderProgram {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn vertex_path(&self) -> Option<&Path> {
        self.vertex_path.as_deref()
    }

    pub fn fragment_path(&self) -> Option<&Path> {
        self.fragment_path.as_deref()
    }

    /// Offset and kind of a uniform block member
    pub fn uniform(&self, name: &str) -> Option<(u32, UniformKind)> {
        self.uniforms.get(name).map(|m| (m.offset, m.kind))
    }

    /// Vertex buffer slot consuming the named attribute
    pub fn attribute_slot(&self, name: &str) -> Option<u32> {
        self.attribute_slots.get(name).copied()
    }

    /// Texture unit of the named texture binding
    pub fn texture_unit(&self, name: &str) -> Option<u32> {
        self.texture_units
            .iter()
            .position(|n| n == name)
            .map(|unit| unit as u32)
    }

    /// CPU copy of the uniform block
    pub fn uniform_data(&self) -> &[u8] {
        &self.block
    }
}

/// Owns every linked program for the process lifetime.
#[derive(Debug, Default)]
pub struct ShaderRegistry {
    programs: BTreeMap<ProgramHandle, ShaderProgram>,
}

impl ShaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn program(&self, handle: ProgramHandle) -> Option<&ShaderProgram> {
        self.programs.get(&handle)
    }

    /// Read, compile, validate and link a program from two WGSL files.
    pub fn compile(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        vertex_path: &Path,
        fragment_path: &Path,
    ) -> Result<ProgramHandle, ShaderError> {
        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|source| ShaderError::Read {
                path: path.to_path_buf(),
                source,
            })
        };
        let vertex_source = read(vertex_path)?;
        let fragment_source = read(fragment_path)?;

        let file_name = |path: &Path| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        let label = format!("{} + {}", file_name(vertex_path), file_name(fragment_path));

        let handle = self.compile_source(backend, &label, &vertex_source, &fragment_source)?;
        if let Some(program) = self.programs.get_mut(&handle) {
            program.vertex_path = Some(vertex_path.to_path_buf());
            program.fragment_path = Some(fragment_path.to_path_buf());
        }
        Ok(handle)
    }

    /// Compile and link a program from in-memory WGSL sources.
    pub fn compile_source(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        label: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<ProgramHandle, ShaderError> {
        let vertex_module = parse_stage(label, ShaderStage::Vertex, vertex_source)?;
        let fragment_module = parse_stage(label, ShaderStage::Fragment, fragment_source)?;

        let link_error = |reason: String| ShaderError::Link {
            label: label.to_string(),
            reason,
        };

        let vertex_entry = vertex_module
            .entry_points
            .iter()
            .find(|ep| ep.stage == naga::ShaderStage::Vertex)
            .ok_or_else(|| ShaderError::MissingEntryPoint {
                label: label.to_string(),
                stage: ShaderStage::Vertex,
            })?;
        let fragment_entry = fragment_module
            .entry_points
            .iter()
            .find(|ep| ep.stage == naga::ShaderStage::Fragment)
            .ok_or_else(|| ShaderError::MissingEntryPoint {
                label: label.to_string(),
                stage: ShaderStage::Fragment,
            })?;

        // Stage interface
        let varyings = reflect::entry_outputs(&vertex_module, vertex_entry);
        for (location, (name, ty)) in reflect::entry_inputs(&fragment_module, fragment_entry) {
            match varyings.get(&location) {
                None => {
                    return Err(link_error(format!(
                        "fragment input '{name}' at location {location} is not written by the vertex stage"
                    )))
                }
                Some((vertex_name, vertex_ty)) if *vertex_ty != ty => {
                    return Err(link_error(format!(
                        "fragment input '{name}' and vertex output '{vertex_name}' at location {location} differ in type"
                    )))
                }
                Some(_) => {}
            }
        }

        let mut vertex_inputs = Vec::new();
        for (location, (name, ty)) in reflect::entry_inputs(&vertex_module, vertex_entry) {
            let format = reflect::vertex_format(&ty).ok_or_else(|| {
                link_error(format!("vertex input '{name}' must be f32 or a vector of f32"))
            })?;
            vertex_inputs.push(VertexInput {
                name,
                location,
                format,
            });
        }

        let block = merge_uniform_blocks(
            reflect::uniform_block(&vertex_module).map_err(link_error)?,
            reflect::uniform_block(&fragment_module).map_err(link_error)?,
        )
        .map_err(link_error)?;

        let resource_bindings = merge_resource_bindings(
            reflect::resource_bindings(&vertex_module).map_err(link_error)?,
            reflect::resource_bindings(&fragment_module).map_err(link_error)?,
        )
        .map_err(link_error)?;

        let descriptor = ProgramDescriptor {
            label: Some(label.to_string()),
            vertex_source: vertex_source.to_string(),
            vertex_entry: vertex_entry.name.clone(),
            fragment_source: fragment_source.to_string(),
            fragment_entry: fragment_entry.name.clone(),
            uniform_block_size: block.as_ref().map(|b| b.size),
            vertex_inputs,
            resource_bindings,
        };

        let handle = backend.create_program(&descriptor)?;

        // Buffer slots follow location order
        let attribute_slots = descriptor
            .vertex_inputs
            .iter()
            .enumerate()
            .map(|(slot, input)| (input.name.clone(), slot as u32))
            .collect();
        let texture_units = descriptor
            .texture_bindings()
            .map(|b| b.name.clone())
            .collect();
        let (uniforms, block) = match block {
            Some(block) => (block.members, vec![0u8; block.size as usize]),
            None => (BTreeMap::new(), Vec::new()),
        };

        log::debug!(
            "Linked program {label}: {} attributes, {} uniforms, {} texture units",
            descriptor.vertex_inputs.len(),
            uniforms.len(),
            descriptor.texture_bindings().count()
        );

        self.programs.insert(
            handle,
            ShaderProgram {
                label: label.to_string(),
                vertex_path: None,
                fragment_path: None,
                uniforms,
                attribute_slots,
                texture_units,
                block,
            },
        );

        Ok(handle)
    }

    /// Write a uniform by name into the program's CPU block.
    ///
    /// The block reaches the GPU on the next [`ShaderRegistry::flush_uniforms`].
    pub fn set_uniform(
        &mut self,
        handle: ProgramHandle,
        name: &str,
        value: impl UniformValue,
    ) -> Result<(), UniformError> {
        let program = self
            .programs
            .get_mut(&handle)
            .ok_or(UniformError::UnknownProgram(handle))?;
        let member = *program
            .uniforms
            .get(name)
            .ok_or_else(|| UniformError::UnknownUniform {
                program: program.label.clone(),
                name: name.to_string(),
            })?;
        if member.kind != value.kind() {
            return Err(UniformError::TypeMismatch {
                name: name.to_string(),
                expected: member.kind,
                found: value.kind(),
            });
        }

        let start = member.offset as usize;
        let bytes = value.bytes();
        program.block[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Make the program current on the backend.
    pub fn use_program(&self, backend: &mut dyn GraphicsBackend, handle: ProgramHandle) {
        backend.set_program(handle);
    }

    /// Snapshot the program's uniform block for the following draws.
    pub fn flush_uniforms(&self, backend: &mut dyn GraphicsBackend, handle: ProgramHandle) {
        if let Some(program) = self.programs.get(&handle) {
            if !program.block.is_empty() {
                backend.set_uniforms(&program.block);
            }
        }
    }

    pub fn attribute_slot(&self, handle: ProgramHandle, name: &str) -> Option<u32> {
        self.programs.get(&handle)?.attribute_slot(name)
    }
}

fn parse_stage(label: &str, stage: ShaderStage, source: &str) -> Result<naga::Module, ShaderError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| ShaderError::Compile {
        label: label.to_string(),
        stage,
        diagnostic: e.emit_to_string(source),
    })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|e| ShaderError::Validation {
            label: label.to_string(),
            stage,
            diagnostic: e.emit_to_string(source),
        })?;

    Ok(module)
}

fn merge_uniform_blocks(
    vertex: Option<UniformBlock>,
    fragment: Option<UniformBlock>,
) -> Result<Option<UniformBlock>, String> {
    match (vertex, fragment) {
        (Some(mut vertex), Some(fragment)) => {
            for (name, member) in fragment.members {
                match vertex.members.get(&name) {
                    Some(existing) if *existing != member => {
                        return Err(format!(
                            "uniform '{name}' is declared differently by the vertex and fragment stages"
                        ))
                    }
                    Some(_) => {}
                    None => {
                        vertex.members.insert(name, member);
                    }
                }
            }
            vertex.size = vertex.size.max(fragment.size);
            Ok(Some(vertex))
        }
        (vertex, fragment) => Ok(vertex.or(fragment)),
    }
}

fn merge_resource_bindings(
    vertex: Vec<ResourceBindingLayout>,
    fragment: Vec<ResourceBindingLayout>,
) -> Result<Vec<ResourceBindingLayout>, String> {
    let mut merged: BTreeMap<u32, ResourceBindingLayout> = BTreeMap::new();
    for binding in vertex.into_iter().chain(fragment) {
        match merged.get(&binding.binding) {
            Some(existing) if existing.kind != binding.kind => {
                return Err(format!(
                    "@group(1) @binding({}) is '{}' in one stage and '{}' in the other",
                    binding.binding, existing.name, binding.name
                ))
            }
            Some(_) => {}
            None => {
                merged.insert(binding.binding, binding);
            }
        }
    }

    let bindings: Vec<_> = merged.into_values().collect();
    let textures = bindings
        .iter()
        .filter(|b| matches!(b.kind, ResourceBindingKind::Texture { .. }))
        .count();
    let samplers = bindings.len() - textures;
    if samplers > textures {
        return Err(format!("{samplers} samplers for {textures} textures"));
    }
    Ok(bindings)
}
