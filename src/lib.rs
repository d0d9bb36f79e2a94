//! Shadow Lab - side-by-side comparison of shadow mapping algorithms
//!
//! A fixed scene (two teapots, a bunny and a floor board) lit by one
//! directional light is rendered with one of six techniques, selectable at
//! runtime with the keys `1`..`6`:
//! - **Basic**: hard depth comparison
//! - **Biased**: depth comparison with a slope-scaled bias
//! - **PCF**: percentage-closer filtering
//! - **PCSS**: percentage-closer soft shadows
//! - **VSSM**: variance shadow maps over a blurred moment target
//! - **MSM**: four-moment shadow maps
//!
//! Each technique is a compiled render graph of depth, blur and shading
//! passes recorded through the [`backend::GraphicsBackend`] trait, which is
//! implemented by a wgpu backend and a recording dummy backend for headless
//! runs and tests.

pub mod app;
pub mod backend;
pub mod overlay;
pub mod pipeline;
pub mod render_graph;
pub mod render_target;
pub mod resources;
pub mod scene;
pub mod shader;
pub mod state;
pub mod window;

pub use app::ShadowDemo;
pub use backend::dummy::DummyBackend;
pub use backend::wgpu_backend::WgpuBackend;
pub use pipeline::ShadowAlgorithm;
pub use window::Window;

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Backend selection for the demo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendType {
    /// wgpu backend rendering into a window
    #[default]
    Wgpu,
    /// Recording backend, no window and no GPU
    Dummy,
}

/// Configuration for initializing the demo
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Which backend to use
    pub backend: BackendType,
    /// Enable vsync
    pub vsync: bool,
    /// Edge length of the shadow targets
    pub shadow_map_size: u32,
    /// Standard deviation of the VSSM moment blur, in texels
    pub blur_sigma: f32,
    /// Directory holding `shaders/`, `models/` and `textures/`
    pub asset_root: PathBuf,
    /// Bytes reserved per frame for uniform snapshots
    pub uniform_arena_size: u64,
    /// Algorithm shown on the first frame
    pub algorithm: ShadowAlgorithm,
    /// Stop after this many frames
    pub max_frames: Option<u64>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            title: "shadow".to_string(),
            width: 1600,
            height: 1200,
            backend: BackendType::Wgpu,
            vsync: true,
            shadow_map_size: render_target::SHADOW_MAP_SIZE,
            blur_sigma: 3.0,
            asset_root: PathBuf::from("assets"),
            uniform_arena_size: backend::wgpu_backend::DEFAULT_UNIFORM_ARENA_SIZE,
            algorithm: ShadowAlgorithm::Basic,
            max_frames: None,
        }
    }
}

impl DemoConfig {
    pub fn assets(&self) -> AssetManifest {
        AssetManifest::new(&self.asset_root)
    }

    pub fn pipeline(&self) -> pipeline::PipelineConfig {
        pipeline::PipelineConfig {
            shadow_map_size: self.shadow_map_size,
            blur_sigma: self.blur_sigma,
        }
    }
}

/// Resolves asset file names against the asset root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetManifest {
    root: PathBuf,
}

impl AssetManifest {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn shader(&self, file: &str) -> PathBuf {
        self.root.join("shaders").join(file)
    }

    /// glTF file of a model, by name without extension
    pub fn model(&self, name: &str) -> PathBuf {
        self.root.join("models").join(format!("{name}.gltf"))
    }

    pub fn texture(&self, file: &str) -> PathBuf {
        self.root.join("textures").join(file)
    }
}

/// Fatal errors of the demo
#[derive(Error, Debug)]
pub enum DemoError {
    #[error(transparent)]
    Shader(#[from] shader::ShaderError),
    #[error(transparent)]
    Pipeline(#[from] pipeline::PipelineError),
    #[error(transparent)]
    Backend(#[from] backend::BackendError),
    #[error("Failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
    #[error("Event loop failed: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
}
