//! Scene depth rendered from the light

use crate::backend::ProgramHandle;
use crate::pipeline::PipelineError;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;

/// Clear color of the shadow depth target
pub const DEPTH_CLEAR_COLOR: [f32; 4] = [0.5, 0.5, 0.5, 1.0];

/// Clear color of the moment target: the farthest possible moments, so
/// texels no occluder covers never shadow
pub const MOMENT_CLEAR_COLOR: [f32; 4] = [1.0, 1.0, 0.0, 0.0];

/// Draws every instance into a shadow target with the light-space transform.
///
/// The same pass writes either the plain depth target or the moment target;
/// only the clear color differs.
pub struct DepthPass {
    name: &'static str,
    program: ProgramHandle,
    target: ResourceId,
    clear_color: [f32; 4],
    writes_color: bool,
}

impl DepthPass {
    /// Depth-only pass into the shadow depth target
    pub fn depth(program: ProgramHandle, target: ResourceId) -> Self {
        Self {
            name: "Shadow Depth",
            program,
            target,
            clear_color: DEPTH_CLEAR_COLOR,
            writes_color: false,
        }
    }

    /// Pass writing (depth, depth²) into the moment target
    pub fn moments(program: ProgramHandle, target: ResourceId) -> Self {
        Self {
            name: "Shadow Moments",
            program,
            target,
            clear_color: MOMENT_CLEAR_COLOR,
            writes_color: true,
        }
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }
}

impl RenderPass for DepthPass {
    fn name(&self) -> &str {
        self.name
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        if self.writes_color {
            ctx.write(self.target, ResourceUsage::RenderTarget);
        } else {
            ctx.write(self.target, ResourceUsage::DepthStencilWrite);
        }
    }

    fn execute(&self, ctx: &mut PassExecuteContext) -> Result<(), PipelineError> {
        ctx.begin_target_pass(self.name, self.target, self.clear_color)?;
        ctx.shaders.use_program(ctx.backend, self.program);

        let scene = ctx.scene;
        let result = ctx
            .shaders
            .set_uniform(self.program, "light_space_matrix", ctx.frame.light_space_matrix)
            .map_err(PipelineError::from)
            .and_then(|()| {
                scene.for_each_instance(|instance, model| {
                    ctx.shaders.set_uniform(self.program, "model", model)?;
                    ctx.draw_mesh(self.program, instance.mesh)
                })
            });

        ctx.backend.end_render_pass();
        result
    }
}
