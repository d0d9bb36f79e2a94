//! Shadow pipeline
//!
//! Every algorithm renders the scene in up to four passes:
//! 1. Depth (or moment) pass from the light into a shadow target
//! 2. VSSM only: horizontal then vertical blur of the moment target
//! 3. Shading pass from the camera into the window, sampling the shadow target
//!
//! Each algorithm's passes are compiled into a render graph once at startup;
//! switching algorithms picks another graph on the next frame.

pub mod algorithm;
pub mod blur_pass;
pub mod depth_pass;
pub mod shading_pass;

pub use algorithm::ShadowAlgorithm;
pub use blur_pass::{BlurKernel, BlurPass};
pub use depth_pass::DepthPass;
pub use shading_pass::ShadingPass;

use crate::backend::*;
use crate::render_graph::*;
use crate::render_target::{ShadowTargets, WindowTargets, SHADOW_MAP_SIZE};
use crate::resources::{Mesh, MeshId, MeshLibrary};
use crate::shader::{ShaderError, ShaderRegistry, UniformError};
use crate::AssetManifest;
use thiserror::Error;

/// Errors raised while building or rendering a frame
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Uniform(#[from] UniformError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("No target bound to render graph resource {0:?}")]
    UnboundResource(ResourceId),
}

/// Shader file pairs (vertex, fragment)
pub const SKYBOX_SHADERS: (&str, &str) = ("skybox.vert.wgsl", "skybox.frag.wgsl");
pub const DEPTH_SHADERS: (&str, &str) = ("shadow_depth.vert.wgsl", "shadow_depth.frag.wgsl");
pub const BLUR_SHADERS: (&str, &str) = ("moment_blur.vert.wgsl", "moment_blur.frag.wgsl");
/// Vertex stage shared by every shading program
pub const SHADING_VERTEX_SHADER: &str = "shadow.vert.wgsl";

/// Every program the demo uses, compiled at startup
#[derive(Debug, Clone, Copy)]
pub struct ProgramTable {
    /// Compiled for parity with the asset set, never drawn
    pub skybox: ProgramHandle,
    pub depth: ProgramHandle,
    pub blur: ProgramHandle,
    shading: [ProgramHandle; 6],
}

impl ProgramTable {
    pub fn compile(
        shaders: &mut ShaderRegistry,
        backend: &mut dyn GraphicsBackend,
        assets: &AssetManifest,
    ) -> Result<Self, ShaderError> {
        let mut pair = |(vertex, fragment): (&str, &str)| {
            shaders.compile(backend, &assets.shader(vertex), &assets.shader(fragment))
        };

        let skybox = pair(SKYBOX_SHADERS)?;
        let depth = pair(DEPTH_SHADERS)?;
        let mut shading = [depth; 6];
        for algorithm in ShadowAlgorithm::ALL {
            shading[algorithm as usize] =
                pair((SHADING_VERTEX_SHADER, algorithm.fragment_shader()))?;
        }
        let blur = pair(BLUR_SHADERS)?;

        log::info!("Compiled {} shader programs", shaders.len());
        Ok(Self {
            skybox,
            depth,
            blur,
            shading,
        })
    }

    /// Shading program of an algorithm
    pub fn shading(&self, algorithm: ShadowAlgorithm) -> ProgramHandle {
        self.shading[algorithm as usize]
    }
}

/// Tunables of the pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Edge length of every shadow target
    pub shadow_map_size: u32,
    /// Standard deviation of the moment blur, in texels
    pub blur_sigma: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            shadow_map_size: SHADOW_MAP_SIZE,
            blur_sigma: 3.0,
        }
    }
}

/// One algorithm's compiled pass sequence
pub struct AlgorithmGraph {
    pub algorithm: ShadowAlgorithm,
    pub graph: RenderGraph,
    pub compiled: CompiledGraph,
    executor: RenderGraphExecutor,
    screen: ResourceId,
}

impl AlgorithmGraph {
    fn build(
        algorithm: ShadowAlgorithm,
        programs: &ProgramTable,
        targets: &ShadowTargets,
        quad: MeshId,
        kernel: BlurKernel,
    ) -> Result<Self, GraphError> {
        let mut graph = RenderGraph::new();
        let mut executor = RenderGraphExecutor::new();
        let screen = graph.register_external("screen");

        let shadow_map = if algorithm.uses_moments() {
            let moments = graph.import(&targets.moments.name);
            let blur0 = graph.import(&targets.blur[0].name);
            let blur1 = graph.import(&targets.blur[1].name);
            executor.set_view(moments, targets.moments.view());
            executor.set_view(blur0, targets.blur[0].view());
            executor.set_view(blur1, targets.blur[1].view());

            graph.add_pass(DepthPass::moments(programs.depth, moments));
            graph.add_pass(BlurPass::horizontal(programs.blur, quad, moments, blur0, kernel));
            graph.add_pass(BlurPass::vertical(programs.blur, quad, blur0, blur1, kernel));
            blur1
        } else {
            let depth = graph.import(&targets.depth.name);
            executor.set_view(depth, targets.depth.view());
            graph.add_pass(DepthPass::depth(programs.depth, depth));
            depth
        };
        graph.add_pass(ShadingPass::new(
            programs.shading(algorithm),
            shadow_map,
            screen,
        ));

        let compiled = graph.compile()?;
        log::debug!(
            "{} graph: {}",
            algorithm,
            compiled.pass_names(&graph).join(" -> ")
        );

        Ok(Self {
            algorithm,
            graph,
            compiled,
            executor,
            screen,
        })
    }

    /// Pass names in execution order
    pub fn pass_names(&self) -> Vec<&str> {
        self.compiled.pass_names(&self.graph)
    }
}

/// Owns the shadow targets and the per-algorithm graphs
pub struct ShadowPipeline {
    programs: ProgramTable,
    shadow_targets: ShadowTargets,
    window_targets: WindowTargets,
    quad: MeshId,
    graphs: Vec<AlgorithmGraph>,
}

impl ShadowPipeline {
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        programs: ProgramTable,
        meshes: &mut MeshLibrary,
        config: &PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let shadow_targets = ShadowTargets::create(backend, config.shadow_map_size)?;
        let (width, height) = backend.surface_size();
        let window_targets = WindowTargets::create(backend, width, height)?;
        let quad = meshes.add(Mesh::fullscreen_quad());
        let kernel = BlurKernel::gaussian(config.blur_sigma);

        let graphs = ShadowAlgorithm::ALL
            .into_iter()
            .map(|algorithm| {
                AlgorithmGraph::build(algorithm, &programs, &shadow_targets, quad, kernel)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            programs,
            shadow_targets,
            window_targets,
            quad,
            graphs,
        })
    }

    pub fn programs(&self) -> &ProgramTable {
        &self.programs
    }

    pub fn shadow_targets(&self) -> &ShadowTargets {
        &self.shadow_targets
    }

    pub fn window_targets(&self) -> &WindowTargets {
        &self.window_targets
    }

    /// Mesh used by the blur passes
    pub fn fullscreen_quad(&self) -> MeshId {
        self.quad
    }

    pub fn graph(&self, algorithm: ShadowAlgorithm) -> &AlgorithmGraph {
        &self.graphs[algorithm as usize]
    }

    /// Follow a window resize. Shadow targets keep their size.
    pub fn resize(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        width: u32,
        height: u32,
    ) -> BackendResult<bool> {
        let resized = self.window_targets.resize(backend, width, height)?;
        if resized {
            log::debug!("Window depth buffer resized to {}x{}", width, height);
        }
        Ok(resized)
    }

    /// Record every pass of `algorithm` for the frame in flight
    pub fn render_frame(
        &mut self,
        algorithm: ShadowAlgorithm,
        frame: &FrameContext,
        inputs: FrameInputs<'_>,
    ) -> Result<(), PipelineError> {
        self.window_targets
            .resize(inputs.backend, frame.width, frame.height)?;

        let screen_view = self.window_targets.screen_view(frame);
        let graph = &mut self.graphs[algorithm as usize];
        graph.executor.set_view(graph.screen, screen_view);
        graph.executor.execute(&graph.graph, &graph.compiled, inputs)
    }
}
