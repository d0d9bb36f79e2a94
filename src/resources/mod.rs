//! Resource management
//!
//! Handles loading of meshes and textures and their GPU residency.

mod geometry;
mod loader;
mod mesh;
mod texture;

pub use geometry::*;
pub use loader::*;
pub use mesh::*;
pub use texture::*;

use crate::backend::BackendError;
use std::path::PathBuf;
use thiserror::Error;

/// Asset loading errors. Recoverable: callers log them and carry on.
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Failed to import mesh {path}: {source}")]
    Mesh {
        path: PathBuf,
        #[source]
        source: gltf::Error,
    },
    #[error("Mesh {path} contains no triangle primitives")]
    NoTriangles { path: PathBuf },
    #[error("Failed to load texture {path}: {source}")]
    Texture {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
}
