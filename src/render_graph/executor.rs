//! Render graph executor

use crate::backend::traits::*;
use crate::pipeline::PipelineError;
use crate::render_graph::graph::*;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::render_target::TargetView;
use crate::resources::{GeometryCache, MeshLibrary};
use crate::scene::{FrameMatrices, Scene};
use crate::shader::ShaderRegistry;
use std::collections::HashMap;

/// Everything a frame's passes draw with
pub struct FrameInputs<'a> {
    pub backend: &'a mut dyn GraphicsBackend,
    pub shaders: &'a mut ShaderRegistry,
    pub geometry: &'a mut GeometryCache,
    pub meshes: &'a MeshLibrary,
    pub scene: &'a Scene,
    pub frame: &'a FrameMatrices,
}

/// Executor for running the compiled render graph
pub struct RenderGraphExecutor {
    /// Concrete views bound to graph resources
    views: HashMap<ResourceId, TargetView>,
}

impl RenderGraphExecutor {
    pub fn new() -> Self {
        Self {
            views: HashMap::new(),
        }
    }

    /// Bind views to a resource. External resources are rebound every frame.
    pub fn set_view(&mut self, resource: ResourceId, view: TargetView) {
        self.views.insert(resource, view);
    }

    pub fn view(&self, resource: ResourceId) -> Option<TargetView> {
        self.views.get(&resource).copied()
    }

    /// Execute the render graph
    pub fn execute(
        &self,
        graph: &RenderGraph,
        compiled: &CompiledGraph,
        inputs: FrameInputs<'_>,
    ) -> Result<(), PipelineError> {
        let FrameInputs {
            backend,
            shaders,
            geometry,
            meshes,
            scene,
            frame,
        } = inputs;

        let mut ctx = PassExecuteContext {
            backend,
            shaders,
            geometry,
            meshes,
            scene,
            frame,
            targets: &self.views,
        };

        for &pass_id in &compiled.pass_order {
            if let Some(pass) = graph.get_pass(pass_id) {
                log::trace!("Executing pass '{}'", pass.name());
                pass.execute(&mut ctx)?;
            }
        }

        Ok(())
    }

    /// Forget every bound view
    pub fn clear(&mut self) {
        self.views.clear();
    }
}

impl Default for RenderGraphExecutor {
    fn default() -> Self {
        Self::new()
    }
}
