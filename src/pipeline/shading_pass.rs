//! Final camera-space shading into the window

use crate::backend::ProgramHandle;
use crate::pipeline::PipelineError;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;

/// Shades the scene from the camera, sampling the shadow map on unit 0
pub struct ShadingPass {
    program: ProgramHandle,
    shadow_map: ResourceId,
    screen: ResourceId,
}

impl ShadingPass {
    pub fn new(program: ProgramHandle, shadow_map: ResourceId, screen: ResourceId) -> Self {
        Self {
            program,
            shadow_map,
            screen,
        }
    }

    fn upload_frame_uniforms(&self, ctx: &mut PassExecuteContext) -> Result<(), PipelineError> {
        let frame = *ctx.frame;
        let shaders = &mut *ctx.shaders;
        shaders.set_uniform(self.program, "proj", frame.proj)?;
        shaders.set_uniform(self.program, "view", frame.view)?;
        shaders.set_uniform(self.program, "view_pos", frame.view_pos)?;
        shaders.set_uniform(self.program, "light_pos", frame.light_pos)?;
        shaders.set_uniform(self.program, "light_space_matrix", frame.light_space_matrix)?;
        Ok(())
    }
}

impl RenderPass for ShadingPass {
    fn name(&self) -> &str {
        "Shadow Shading"
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.read(self.shadow_map, ResourceUsage::TextureRead);
        ctx.write(self.screen, ResourceUsage::RenderTarget);
    }

    fn execute(&self, ctx: &mut PassExecuteContext) -> Result<(), PipelineError> {
        let (view, sampler) = ctx
            .target(self.shadow_map)?
            .sampled
            .ok_or(PipelineError::UnboundResource(self.shadow_map))?;

        ctx.begin_target_pass(self.name(), self.screen, [0.5, 0.5, 0.5, 1.0])?;
        ctx.shaders.use_program(ctx.backend, self.program);
        ctx.backend.set_texture(0, view, sampler);

        let scene = ctx.scene;
        let result = self.upload_frame_uniforms(ctx).and_then(|()| {
            scene.for_each_instance(|instance, model| {
                ctx.shaders.set_uniform(self.program, "model", model)?;
                ctx.draw_mesh(self.program, instance.mesh)
            })
        });

        ctx.backend.end_render_pass();
        result
    }
}
