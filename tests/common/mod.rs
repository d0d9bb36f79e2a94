//! Shared setup for the headless pipeline tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use shadow_lab::backend::dummy::{DummyBackend, RecordedPass};
use shadow_lab::{DemoConfig, ShadowAlgorithm, ShadowDemo};

pub const WIDTH: u32 = 800;
pub const HEIGHT: u32 = 600;

/// Asset directory shipped with the crate
pub fn asset_root() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/assets"))
}

pub fn config(algorithm: ShadowAlgorithm) -> DemoConfig {
    DemoConfig {
        width: WIDTH,
        height: HEIGHT,
        asset_root: asset_root(),
        algorithm,
        ..DemoConfig::default()
    }
}

/// A started demo on a fresh dummy backend
pub fn start(algorithm: ShadowAlgorithm) -> (DummyBackend, ShadowDemo) {
    let mut backend = DummyBackend::new(WIDTH, HEIGHT);
    let demo = ShadowDemo::new(&mut backend, &config(algorithm)).unwrap();
    (backend, demo)
}

/// Find a pass of the last presented frame by label
pub fn pass<'a>(backend: &'a DummyBackend, label: &str) -> &'a RecordedPass {
    backend
        .last_frame()
        .iter()
        .find(|p| p.label() == label)
        .unwrap_or_else(|| panic!("no pass labelled {label}"))
}

pub fn pass_labels(backend: &DummyBackend) -> Vec<String> {
    backend
        .last_frame()
        .iter()
        .map(|p| p.label().to_string())
        .collect()
}

/// Fresh scratch directory under the system temp dir
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join("shadow_lab_tests")
        .join(format!("{name}_{}", std::process::id()));
    if dir.exists() {
        std::fs::remove_dir_all(&dir).unwrap();
    }
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Copy the shipped assets into a scratch directory so a test can break them
pub fn copy_assets(name: &str) -> PathBuf {
    let dir = scratch_dir(name);
    copy_dir(&asset_root(), &dir);
    dir
}

fn copy_dir(from: &Path, to: &Path) {
    std::fs::create_dir_all(to).unwrap();
    for entry in std::fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            std::fs::copy(entry.path(), &target).unwrap();
        }
    }
}

/// Write a one-triangle glTF with positions only
pub fn write_position_only_triangle(dir: &Path, name: &str) -> PathBuf {
    let positions: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    let bytes: Vec<u8> = positions.iter().flat_map(|v| v.to_le_bytes()).collect();
    std::fs::write(dir.join(format!("{name}.bin")), &bytes).unwrap();

    let json = format!(
        r#"{{
            "asset": {{"version": "2.0"}},
            "scene": 0,
            "scenes": [{{"nodes": [0]}}],
            "nodes": [{{"mesh": 0}}],
            "meshes": [{{"primitives": [{{"attributes": {{"POSITION": 0}}}}]}}],
            "buffers": [{{"uri": "{name}.bin", "byteLength": 36}}],
            "bufferViews": [{{"buffer": 0, "byteOffset": 0, "byteLength": 36}}],
            "accessors": [{{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                           "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]}}]
        }}"#
    );
    let path = dir.join(format!("{name}.gltf"));
    std::fs::write(&path, json).unwrap();
    path
}
