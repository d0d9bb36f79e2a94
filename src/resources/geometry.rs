//! GPU vertex buffers for meshes
//!
//! Each mesh is uploaded once, one buffer per non-empty channel. Binding is
//! per program: attribute slots are looked up by name, so the same buffers
//! feed programs whose inputs are declared in different orders.

use crate::backend::*;
use crate::resources::mesh::{MeshId, MeshLibrary, VertexChannel};
use crate::shader::ShaderRegistry;
use std::collections::HashMap;

/// GPU resources for a mesh
#[derive(Debug, Clone)]
pub struct GpuMesh {
    channels: [Option<BufferHandle>; 5],
    point_count: u32,
}

impl GpuMesh {
    pub fn buffer(&self, channel: VertexChannel) -> Option<BufferHandle> {
        self.channels[channel.index()]
    }

    pub fn point_count(&self) -> u32 {
        self.point_count
    }
}

#[derive(Debug, Default)]
pub struct GeometryCache {
    meshes: HashMap<MeshId, GpuMesh>,
}

impl GeometryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_uploaded(&self, mesh: MeshId) -> bool {
        self.meshes.contains_key(&mesh)
    }

    /// Upload a mesh's channels unless already resident.
    pub fn upload(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        library: &MeshLibrary,
        id: MeshId,
    ) -> BackendResult<Option<&GpuMesh>> {
        if !self.meshes.contains_key(&id) {
            let Some(mesh) = library.get(id) else {
                return Ok(None);
            };

            let mut channels = [None; 5];
            for channel in VertexChannel::ALL {
                let bytes = mesh.channel_bytes(channel);
                if bytes.is_empty() {
                    continue;
                }
                channels[channel.index()] = Some(backend.create_buffer_init(
                    &BufferDescriptor {
                        label: Some(format!("{} {}", mesh.name, channel.attribute_name())),
                        size: bytes.len() as u64,
                        usage: BufferUsage::VERTEX,
                    },
                    bytes,
                )?);
            }

            log::debug!(
                "Uploaded mesh {} ({} points)",
                mesh.name,
                mesh.point_count()
            );
            self.meshes.insert(
                id,
                GpuMesh {
                    channels,
                    point_count: mesh.point_count() as u32,
                },
            );
        }

        Ok(self.meshes.get(&id))
    }

    /// Bind a mesh's buffers to the attribute slots of `program`.
    ///
    /// Channels the program does not consume are skipped. A consumed channel
    /// the mesh lacks is fed a constant zero. Returns the point count to draw.
    pub fn bind_mesh_for_program(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        shaders: &ShaderRegistry,
        program: ProgramHandle,
        library: &MeshLibrary,
        id: MeshId,
    ) -> BackendResult<u32> {
        let Some(gpu_mesh) = self.upload(backend, library, id)?.cloned() else {
            log::warn!("Unknown mesh {id:?}");
            return Ok(0);
        };

        for channel in VertexChannel::ALL {
            let Some(slot) = shaders.attribute_slot(program, channel.attribute_name()) else {
                continue;
            };
            match gpu_mesh.buffer(channel) {
                Some(buffer) => backend.set_vertex_buffer(slot, buffer, 0),
                None => backend.disable_vertex_attribute(slot),
            }
        }

        Ok(gpu_mesh.point_count())
    }

    /// Release every uploaded buffer.
    pub fn clear(&mut self, backend: &mut dyn GraphicsBackend) {
        for (_, mesh) in self.meshes.drain() {
            for buffer in mesh.channels.into_iter().flatten() {
                backend.destroy_buffer(buffer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::{DummyBackend, RecordedCommand};
    use crate::resources::mesh::Mesh;
    use glam::{Vec2, Vec3};

    const FRAGMENT: &str = r#"
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0);
}
"#;

    fn vertex_source(inputs: &str) -> String {
        format!(
            r#"
struct VertexInput {{
{inputs}
}}

@vertex
fn vs_main(in: VertexInput) -> @builtin(position) vec4<f32> {{
    return vec4<f32>(in.vertex_position + vec3<f32>(in.vertex_texture, 0.0), 1.0);
}}
"#
        )
    }

    const POSITION_FIRST: &str = "    @location(0) vertex_position: vec3<f32>,\n    @location(1) vertex_texture: vec2<f32>,";
    const TEXTURE_FIRST: &str = "    @location(0) vertex_texture: vec2<f32>,\n    @location(1) vertex_position: vec3<f32>,";

    fn triangle(with_uvs: bool) -> Mesh {
        let mut mesh = Mesh::new("triangle");
        mesh.positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        mesh.normals = vec![Vec3::Z; 3];
        if with_uvs {
            mesh.uvs = vec![Vec2::ZERO, Vec2::X, Vec2::Y];
        }
        mesh
    }

    fn begin_pass(backend: &mut DummyBackend) {
        backend.begin_frame().unwrap();
        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("test".into()),
            color_attachments: vec![],
            depth_stencil_attachment: None,
        });
    }

    #[test]
    fn test_mesh_without_uvs_disables_texture_slot() {
        let mut backend = DummyBackend::new(4, 4);
        let mut shaders = ShaderRegistry::new();
        let program = shaders
            .compile_source(
                &mut backend,
                "p",
                &vertex_source(POSITION_FIRST),
                FRAGMENT,
            )
            .unwrap();
        let mut library = MeshLibrary::new();
        let mesh = library.add(triangle(false));
        let mut cache = GeometryCache::new();

        begin_pass(&mut backend);
        let count = cache
            .bind_mesh_for_program(&mut backend, &shaders, program, &library, mesh)
            .unwrap();
        backend.end_render_pass();
        backend.end_frame().unwrap();

        assert_eq!(count, 3);
        let commands = &backend.last_frame()[0].commands;
        assert!(commands.contains(&RecordedCommand::DisableVertexAttribute { slot: 1 }));
        assert!(!commands
            .iter()
            .any(|c| matches!(c, RecordedCommand::SetVertexBuffer { slot: 1, .. })));
        // Positions and normals uploaded, nothing for the empty channels
        assert_eq!(backend.buffers_created(), 2);
    }

    #[test]
    fn test_upload_once_and_slots_follow_program() {
        let mut backend = DummyBackend::new(4, 4);
        let mut shaders = ShaderRegistry::new();
        let forward = shaders
            .compile_source(
                &mut backend,
                "forward",
                &vertex_source(POSITION_FIRST),
                FRAGMENT,
            )
            .unwrap();
        let swapped = shaders
            .compile_source(
                &mut backend,
                "swapped",
                &vertex_source(TEXTURE_FIRST),
                FRAGMENT,
            )
            .unwrap();
        let mut library = MeshLibrary::new();
        let mesh = library.add(triangle(true));
        let mut cache = GeometryCache::new();

        begin_pass(&mut backend);
        cache
            .bind_mesh_for_program(&mut backend, &shaders, forward, &library, mesh)
            .unwrap();
        cache
            .bind_mesh_for_program(&mut backend, &shaders, swapped, &library, mesh)
            .unwrap();
        backend.end_render_pass();
        backend.end_frame().unwrap();

        assert_eq!(backend.buffers_created(), 3);

        let gpu = cache.upload(&mut backend, &library, mesh).unwrap().unwrap();
        let positions = gpu.buffer(VertexChannel::Position).unwrap();
        let bound: Vec<(u32, BufferHandle)> = backend.last_frame()[0]
            .commands
            .iter()
            .filter_map(|c| match c {
                RecordedCommand::SetVertexBuffer { slot, buffer } if *buffer == positions => {
                    Some((*slot, *buffer))
                }
                _ => None,
            })
            .collect();
        assert_eq!(bound, vec![(0, positions), (1, positions)]);
    }

    #[test]
    fn test_clear_releases_buffers() {
        let mut backend = DummyBackend::new(4, 4);
        let mut library = MeshLibrary::new();
        let mesh = library.add(triangle(true));
        let mut cache = GeometryCache::new();

        cache.upload(&mut backend, &library, mesh).unwrap();
        assert!(cache.is_uploaded(mesh));
        assert_eq!(backend.live_buffers(), 3);

        cache.clear(&mut backend);
        assert!(!cache.is_uploaded(mesh));
        assert_eq!(backend.live_buffers(), 0);
    }
}
