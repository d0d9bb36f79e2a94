//! Mesh data structures
//!
//! Meshes are flat triangle lists stored as one array per vertex channel.
//! A channel is either empty or exactly `point_count` long.

use glam::{Vec2, Vec3};

/// Vertex attribute channels a mesh can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexChannel {
    Position,
    Normal,
    Texture,
    Tangent,
    Bitangent,
}

impl VertexChannel {
    pub const ALL: [VertexChannel; 5] = [
        VertexChannel::Position,
        VertexChannel::Normal,
        VertexChannel::Texture,
        VertexChannel::Tangent,
        VertexChannel::Bitangent,
    ];

    /// Name of the shader input consuming this channel
    pub fn attribute_name(&self) -> &'static str {
        match self {
            VertexChannel::Position => "vertex_position",
            VertexChannel::Normal => "vertex_normal",
            VertexChannel::Texture => "vertex_texture",
            VertexChannel::Tangent => "vertex_tangent",
            VertexChannel::Bitangent => "vertex_bitangent",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// A static mesh as parallel attribute arrays
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub tangents: Vec<Vec3>,
    pub bitangents: Vec<Vec3>,
}

impl Mesh {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Number of vertices drawn
    pub fn point_count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Raw bytes of a channel, empty when the mesh lacks it
    pub fn channel_bytes(&self, channel: VertexChannel) -> &[u8] {
        match channel {
            VertexChannel::Position => bytemuck::cast_slice(&self.positions),
            VertexChannel::Normal => bytemuck::cast_slice(&self.normals),
            VertexChannel::Texture => bytemuck::cast_slice(&self.uvs),
            VertexChannel::Tangent => bytemuck::cast_slice(&self.tangents),
            VertexChannel::Bitangent => bytemuck::cast_slice(&self.bitangents),
        }
    }

    pub fn channel_len(&self, channel: VertexChannel) -> usize {
        match channel {
            VertexChannel::Position => self.positions.len(),
            VertexChannel::Normal => self.normals.len(),
            VertexChannel::Texture => self.uvs.len(),
            VertexChannel::Tangent => self.tangents.len(),
            VertexChannel::Bitangent => self.bitangents.len(),
        }
    }

    /// Check that every channel is empty or matches the point count
    pub fn channels_consistent(&self) -> bool {
        VertexChannel::ALL.iter().all(|channel| {
            let len = self.channel_len(*channel);
            len == 0 || len == self.point_count()
        })
    }

    /// Two triangles covering clip space, UV origin at the top left
    pub fn fullscreen_quad() -> Self {
        let corners = [
            Vec2::new(-1.0, -1.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(-1.0, -1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(-1.0, 1.0),
        ];

        let mut mesh = Mesh::new("fullscreen_quad");
        for corner in corners {
            mesh.positions.push(corner.extend(0.0));
            mesh.uvs
                .push(Vec2::new(corner.x * 0.5 + 0.5, 0.5 - corner.y * 0.5));
        }
        mesh
    }
}

/// Stable identifier of a mesh in a [`MeshLibrary`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(usize);

/// Arena owning every mesh for the lifetime of the demo
#[derive(Debug, Default)]
pub struct MeshLibrary {
    meshes: Vec<Mesh>,
}

impl MeshLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, mesh: Mesh) -> MeshId {
        self.meshes.push(mesh);
        MeshId(self.meshes.len() - 1)
    }

    pub fn get(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MeshId, &Mesh)> {
        self.meshes.iter().enumerate().map(|(i, m)| (MeshId(i), m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fullscreen_quad_covers_clip_space() {
        let quad = Mesh::fullscreen_quad();
        assert_eq!(quad.point_count(), 6);
        assert!(quad.channels_consistent());
        assert!(quad.normals.is_empty());

        let min = quad.positions.iter().fold(Vec3::MAX, |a, p| a.min(*p));
        let max = quad.positions.iter().fold(Vec3::MIN, |a, p| a.max(*p));
        assert_eq!(min.truncate(), Vec2::splat(-1.0));
        assert_eq!(max.truncate(), Vec2::splat(1.0));

        // Top-left corner of clip space samples the first texel row
        let top_left = quad
            .positions
            .iter()
            .position(|p| p.x == -1.0 && p.y == 1.0)
            .unwrap();
        assert_eq!(quad.uvs[top_left], Vec2::new(0.0, 0.0));
    }

    #[test]
    fn test_channel_bytes() {
        let mut mesh = Mesh::new("tri");
        mesh.positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        assert_eq!(mesh.channel_bytes(VertexChannel::Position).len(), 36);
        assert!(mesh.channel_bytes(VertexChannel::Texture).is_empty());
        assert!(mesh.channels_consistent());

        mesh.normals = vec![Vec3::Z];
        assert!(!mesh.channels_consistent());
    }

    #[test]
    fn test_library_ids_are_stable() {
        let mut library = MeshLibrary::new();
        let a = library.add(Mesh::new("a"));
        let b = library.add(Mesh::new("b"));
        assert_ne!(a, b);
        assert_eq!(library.get(a).unwrap().name, "a");
        assert_eq!(library.get(b).unwrap().name, "b");
        assert_eq!(library.len(), 2);
    }
}
