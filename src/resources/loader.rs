//! glTF mesh import
//!
//! Every triangle primitive reachable from the default scene is flattened
//! into one de-indexed [`Mesh`] with node transforms applied. Missing normals
//! are generated, and tangent frames are derived from UVs when the file
//! carries none.

use crate::resources::mesh::Mesh;
use crate::resources::AssetError;
use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use std::collections::HashMap;
use std::path::Path;

/// Load a mesh, logging failures and falling back to an empty mesh.
pub fn load_mesh(path: impl AsRef<Path>) -> Mesh {
    let path = path.as_ref();
    match import_mesh(path) {
        Ok(mesh) => {
            log::info!(
                "Loaded mesh {}: {} vertices, {} triangles",
                path.display(),
                mesh.point_count(),
                mesh.triangle_count()
            );
            mesh
        }
        Err(e) => {
            log::error!("{e}");
            Mesh::new(&mesh_name(path))
        }
    }
}

fn mesh_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Primitive attributes after node transforms, still indexed
struct Primitive {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    uvs: Option<Vec<Vec2>>,
    frames: Option<(Vec<Vec3>, Vec<Vec3>)>,
    indices: Vec<u32>,
}

/// Import a glTF file into a flat triangle list.
pub fn import_mesh(path: impl AsRef<Path>) -> Result<Mesh, AssetError> {
    let path = path.as_ref();
    let (document, buffers, _images) =
        gltf::import(path).map_err(|source| AssetError::Mesh {
            path: path.to_path_buf(),
            source,
        })?;

    let mut primitives = Vec::new();
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next());
    match scene {
        Some(scene) => {
            for node in scene.nodes() {
                collect_node(&node, Mat4::IDENTITY, &buffers, &mut primitives);
            }
        }
        None => {
            for mesh in document.meshes() {
                collect_mesh(&mesh, Mat4::IDENTITY, &buffers, &mut primitives);
            }
        }
    }

    if primitives.is_empty() {
        return Err(AssetError::NoTriangles {
            path: path.to_path_buf(),
        });
    }

    let with_uvs = primitives.iter().filter(|p| p.uvs.is_some()).count();
    let with_frames = primitives.iter().filter(|p| p.frames.is_some()).count();
    let keep_uvs = with_uvs == primitives.len();
    let keep_frames = with_frames == primitives.len();
    if with_uvs > 0 && !keep_uvs {
        log::warn!(
            "{}: only {with_uvs} of {} primitives have UVs; UV channel dropped",
            path.display(),
            primitives.len()
        );
    }

    let mut mesh = Mesh::new(&mesh_name(path));
    for primitive in &primitives {
        for triangle in primitive.indices.chunks_exact(3) {
            if triangle
                .iter()
                .any(|&i| i as usize >= primitive.positions.len())
            {
                log::warn!("{}: triangle index out of range; skipped", path.display());
                continue;
            }
            for &index in triangle {
                let i = index as usize;
                mesh.positions.push(primitive.positions[i]);
                mesh.normals.push(primitive.normals[i]);
                if keep_uvs {
                    if let Some(uvs) = &primitive.uvs {
                        mesh.uvs.push(uvs[i]);
                    }
                }
                if keep_frames {
                    if let Some((tangents, bitangents)) = &primitive.frames {
                        mesh.tangents.push(tangents[i]);
                        mesh.bitangents.push(bitangents[i]);
                    }
                }
            }
        }
    }

    Ok(mesh)
}

fn collect_node(
    node: &gltf::Node,
    parent: Mat4,
    buffers: &[gltf::buffer::Data],
    out: &mut Vec<Primitive>,
) {
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        collect_mesh(&mesh, world, buffers, out);
    }
    for child in node.children() {
        collect_node(&child, world, buffers, out);
    }
}

fn collect_mesh(
    mesh: &gltf::Mesh,
    world: Mat4,
    buffers: &[gltf::buffer::Data],
    out: &mut Vec<Primitive>,
) {
    let normal_matrix = Mat3::from_mat4(world).inverse().transpose();

    for prim in mesh.primitives() {
        if prim.mode() != gltf::mesh::Mode::Triangles {
            log::warn!(
                "Mesh {:?}: skipping {:?} primitive",
                mesh.name(),
                prim.mode()
            );
            continue;
        }

        let reader = prim.reader(|buffer| Some(&buffers[buffer.index()]));
        let Some(positions) = reader.read_positions() else {
            continue;
        };
        let positions: Vec<Vec3> = positions
            .map(|p| world.transform_point3(Vec3::from(p)))
            .collect();
        let indices: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..positions.len() as u32).collect(),
        };

        let normals: Vec<Vec3> = match reader.read_normals() {
            Some(normals) => normals
                .map(|n| (normal_matrix * Vec3::from(n)).normalize_or_zero())
                .collect(),
            None => smooth_normals(&positions, &indices),
        };
        if normals.len() != positions.len() {
            log::warn!("Mesh {:?}: normal count mismatch; primitive skipped", mesh.name());
            continue;
        }

        let uvs: Option<Vec<Vec2>> = reader
            .read_tex_coords(0)
            .map(|uvs| uvs.into_f32().map(Vec2::from).collect::<Vec<_>>())
            .filter(|uvs| uvs.len() == positions.len());

        let frames = match reader.read_tangents() {
            Some(tangents) => {
                let (tangents, bitangents): (Vec<Vec3>, Vec<Vec3>) = tangents
                    .map(Vec4::from)
                    .zip(normals.iter())
                    .map(|(t, n)| {
                        let tangent = world.transform_vector3(t.truncate()).normalize_or_zero();
                        (tangent, n.cross(tangent) * t.w)
                    })
                    .unzip();
                (tangents.len() == positions.len()).then_some((tangents, bitangents))
            }
            None => uvs
                .as_ref()
                .map(|uvs| tangent_frames(&positions, &normals, uvs, &indices)),
        };

        out.push(Primitive {
            positions,
            normals,
            uvs,
            frames,
            indices,
        });
    }
}

/// Area-weighted vertex normals, shared between vertices at the same position
pub fn smooth_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let key = |p: Vec3| [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()];
    let mut accumulated: HashMap<[u32; 3], Vec3> = HashMap::new();

    for triangle in indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        if a >= positions.len() || b >= positions.len() || c >= positions.len() {
            continue;
        }
        let face = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
        for i in [a, b, c] {
            *accumulated.entry(key(positions[i])).or_insert(Vec3::ZERO) += face;
        }
    }

    positions
        .iter()
        .map(|p| {
            accumulated
                .get(&key(*p))
                .copied()
                .unwrap_or(Vec3::ZERO)
                .normalize_or_zero()
        })
        .collect()
}

/// Per-vertex tangent and bitangent from UV derivatives
pub fn tangent_frames(
    positions: &[Vec3],
    normals: &[Vec3],
    uvs: &[Vec2],
    indices: &[u32],
) -> (Vec<Vec3>, Vec<Vec3>) {
    let mut tangents = vec![Vec3::ZERO; positions.len()];
    let mut bitangents = vec![Vec3::ZERO; positions.len()];

    for triangle in indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        if a >= positions.len() || b >= positions.len() || c >= positions.len() {
            continue;
        }
        let edge1 = positions[b] - positions[a];
        let edge2 = positions[c] - positions[a];
        let duv1 = uvs[b] - uvs[a];
        let duv2 = uvs[c] - uvs[a];
        let det = duv1.x * duv2.y - duv2.x * duv1.y;
        if det.abs() < f32::EPSILON {
            continue;
        }
        let r = 1.0 / det;
        let tangent = (edge1 * duv2.y - edge2 * duv1.y) * r;
        let bitangent = (edge2 * duv1.x - edge1 * duv2.x) * r;
        for i in [a, b, c] {
            tangents[i] += tangent;
            bitangents[i] += bitangent;
        }
    }

    for ((tangent, bitangent), normal) in tangents
        .iter_mut()
        .zip(bitangents.iter_mut())
        .zip(normals.iter())
    {
        *tangent = (*tangent - *normal * normal.dot(*tangent)).normalize_or_zero();
        *bitangent = bitangent.normalize_or_zero();
    }

    (tangents, bitangents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_gltf(name: &str, json: &str, bin: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join("shadow_lab_loader_tests");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{name}.bin")), bin).unwrap();
        let path = dir.join(format!("{name}.gltf"));
        std::fs::write(&path, json.replace("BIN_URI", &format!("{name}.bin"))).unwrap();
        path
    }

    fn triangle_bytes() -> Vec<u8> {
        let positions = [Vec3::ZERO, Vec3::X, Vec3::Y];
        bytemuck::cast_slice(&positions).to_vec()
    }

    #[test]
    fn test_import_applies_node_transform_and_generates_normals() {
        let json = r#"{
            "asset": {"version": "2.0"},
            "scene": 0,
            "scenes": [{"nodes": [0]}],
            "nodes": [{"mesh": 0, "translation": [1.0, 2.0, 3.0]}],
            "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}],
            "buffers": [{"uri": "BIN_URI", "byteLength": 36}],
            "bufferViews": [{"buffer": 0, "byteOffset": 0, "byteLength": 36}],
            "accessors": [{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                           "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]}]
        }"#;
        let path = write_gltf("translated_triangle", json, &triangle_bytes());

        let mesh = import_mesh(&path).unwrap();
        assert_eq!(mesh.name, "translated_triangle");
        assert_eq!(mesh.point_count(), 3);
        assert_eq!(mesh.positions[0], Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(mesh.positions[1], Vec3::new(2.0, 2.0, 3.0));
        assert!(mesh.normals.iter().all(|n| (*n - Vec3::Z).length() < 1e-6));
        assert!(mesh.uvs.is_empty());
        assert!(mesh.tangents.is_empty());
        assert!(mesh.channels_consistent());
    }

    #[test]
    fn test_partial_uv_channel_is_dropped() {
        let mut bin = triangle_bytes();
        let uvs = [Vec2::ZERO, Vec2::X, Vec2::Y];
        bin.extend_from_slice(bytemuck::cast_slice(&uvs));
        let json = r#"{
            "asset": {"version": "2.0"},
            "scene": 0,
            "scenes": [{"nodes": [0]}],
            "nodes": [{"mesh": 0}],
            "meshes": [{"primitives": [
                {"attributes": {"POSITION": 0}},
                {"attributes": {"POSITION": 0, "TEXCOORD_0": 1}}
            ]}],
            "buffers": [{"uri": "BIN_URI", "byteLength": 60}],
            "bufferViews": [
                {"buffer": 0, "byteOffset": 0, "byteLength": 36},
                {"buffer": 0, "byteOffset": 36, "byteLength": 24}
            ],
            "accessors": [
                {"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                 "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]},
                {"bufferView": 1, "componentType": 5126, "count": 3, "type": "VEC2"}
            ]
        }"#;
        let path = write_gltf("partial_uvs", json, &bin);

        let mesh = import_mesh(&path).unwrap();
        assert_eq!(mesh.point_count(), 6);
        assert_eq!(mesh.normals.len(), 6);
        assert!(mesh.uvs.is_empty());
        assert!(mesh.tangents.is_empty());
        assert!(mesh.bitangents.is_empty());
    }

    #[test]
    fn test_missing_file_yields_empty_mesh() {
        let path = std::env::temp_dir().join("shadow_lab_does_not_exist.gltf");
        assert!(matches!(import_mesh(&path), Err(AssetError::Mesh { .. })));

        let mesh = load_mesh(&path);
        assert!(mesh.is_empty());
        assert_eq!(mesh.point_count(), 0);
        assert_eq!(mesh.name, "shadow_lab_does_not_exist");
    }

    #[test]
    fn test_tangent_frames_follow_uv_axes() {
        let positions = [Vec3::ZERO, Vec3::X, Vec3::Y];
        let normals = [Vec3::Z; 3];
        let uvs = [Vec2::ZERO, Vec2::X, Vec2::Y];
        let (tangents, bitangents) = tangent_frames(&positions, &normals, &uvs, &[0, 1, 2]);
        for (t, b) in tangents.iter().zip(bitangents.iter()) {
            assert!((*t - Vec3::X).length() < 1e-6);
            assert!((*b - Vec3::Y).length() < 1e-6);
        }
    }

    #[test]
    fn test_smooth_normals_average_shared_positions() {
        // Two triangles folded along the Y axis, with duplicated edge vertices
        let positions = [
            Vec3::ZERO,
            Vec3::Y,
            Vec3::new(-1.0, 0.0, 1.0),
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::Y,
        ];
        let normals = smooth_normals(&positions, &[0, 1, 2, 3, 4, 5]);
        assert_eq!(normals[0], normals[3]);
        assert!((normals[0] - Vec3::Z).length() < 1e-5);
    }
}
