//! Render pass definitions for the render graph

use crate::backend::*;
use crate::pipeline::PipelineError;
use crate::render_graph::resource::*;
use crate::render_target::TargetView;
use crate::resources::{GeometryCache, MeshId, MeshLibrary};
use crate::scene::{FrameMatrices, Scene};
use crate::shader::ShaderRegistry;
use std::collections::HashMap;

/// Unique identifier for a render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(pub(crate) u32);

/// Context for declaring pass dependencies
pub struct PassSetupContext<'a> {
    pub(crate) inputs: &'a mut Vec<ResourceAccess>,
    pub(crate) outputs: &'a mut Vec<ResourceAccess>,
}

impl<'a> PassSetupContext<'a> {
    /// Declare that this pass reads from a resource
    pub fn read(&mut self, resource: ResourceId, usage: ResourceUsage) {
        self.inputs.push(ResourceAccess { resource, usage });
    }

    /// Declare that this pass writes to a resource
    pub fn write(&mut self, resource: ResourceId, usage: ResourceUsage) {
        self.outputs.push(ResourceAccess { resource, usage });
    }
}

/// Context for executing a render pass
pub struct PassExecuteContext<'a> {
    pub backend: &'a mut dyn GraphicsBackend,
    pub shaders: &'a mut ShaderRegistry,
    pub geometry: &'a mut GeometryCache,
    pub meshes: &'a MeshLibrary,
    pub scene: &'a Scene,
    pub frame: &'a FrameMatrices,
    pub(crate) targets: &'a HashMap<ResourceId, TargetView>,
}

impl<'a> PassExecuteContext<'a> {
    /// Views bound to a graph resource for this frame
    pub fn target(&self, resource: ResourceId) -> Result<TargetView, PipelineError> {
        self.targets
            .get(&resource)
            .copied()
            .ok_or(PipelineError::UnboundResource(resource))
    }

    /// Begin a render pass writing `resource`, clearing color and depth.
    pub fn begin_target_pass(
        &mut self,
        label: &str,
        resource: ResourceId,
        clear_color: [f32; 4],
    ) -> Result<TargetView, PipelineError> {
        let target = self.target(resource)?;
        self.backend.begin_render_pass(&RenderPassDescriptor {
            label: Some(label.to_string()),
            color_attachments: target
                .color
                .map(|view| ColorAttachment {
                    view,
                    load_op: LoadOp::Clear(clear_color),
                    store_op: StoreOp::Store,
                })
                .into_iter()
                .collect(),
            depth_stencil_attachment: target.depth.map(|view| DepthStencilAttachment {
                view,
                depth_load_op: LoadOp::Clear([1.0; 4]),
                depth_store_op: StoreOp::Store,
                depth_clear_value: 1.0,
            }),
        });
        self.backend.set_viewport(
            0.0,
            0.0,
            target.width as f32,
            target.height as f32,
            0.0,
            1.0,
        );
        Ok(target)
    }

    /// Bind a mesh for `program`, snapshot its uniforms and draw it.
    pub fn draw_mesh(&mut self, program: ProgramHandle, mesh: MeshId) -> Result<(), PipelineError> {
        let count = self.geometry.bind_mesh_for_program(
            self.backend,
            self.shaders,
            program,
            self.meshes,
            mesh,
        )?;
        if count > 0 {
            self.shaders.flush_uniforms(self.backend, program);
            self.backend.draw(0..count, 0..1);
        }
        Ok(())
    }
}

/// Trait for render passes
pub trait RenderPass {
    /// Get the pass name for debugging
    fn name(&self) -> &str;

    /// Setup phase - declare dependencies
    fn setup(&mut self, ctx: &mut PassSetupContext);

    /// Execute phase - record commands
    fn execute(&self, ctx: &mut PassExecuteContext) -> Result<(), PipelineError>;
}

/// Metadata about a pass in the graph
#[derive(Debug)]
pub struct PassNode {
    pub id: PassId,
    pub name: String,
    pub inputs: Vec<ResourceAccess>,
    pub outputs: Vec<ResourceAccess>,
}

impl PassNode {
    pub fn reads_resource(&self, resource: ResourceId) -> bool {
        self.inputs.iter().any(|a| a.resource == resource)
    }

    pub fn writes_resource(&self, resource: ResourceId) -> bool {
        self.outputs.iter().any(|a| a.resource == resource)
    }
}
