//! Separable Gaussian blur over the moment texture

use crate::backend::ProgramHandle;
use crate::pipeline::PipelineError;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::resources::MeshId;
use glam::Vec4;

/// Taps on each side of the centre texel
pub const BLUR_RADIUS: usize = 7;

/// Normalized one-dimensional Gaussian weights.
///
/// `weights[0]` is the centre tap; `weights[i]` is used for both offsets
/// `+i` and `-i`, so the centre plus twice the rest sums to one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurKernel {
    weights: [f32; BLUR_RADIUS + 1],
}

impl BlurKernel {
    pub fn gaussian(sigma: f32) -> Self {
        let sigma = sigma.max(f32::EPSILON);
        let mut weights = [0.0; BLUR_RADIUS + 1];
        for (i, w) in weights.iter_mut().enumerate() {
            let x = i as f32;
            *w = (-(x * x) / (2.0 * sigma * sigma)).exp();
        }
        let total = weights[0] + 2.0 * weights[1..].iter().sum::<f32>();
        for w in &mut weights {
            *w /= total;
        }
        Self { weights }
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Weights packed the way the blur program's uniform array expects them
    pub fn packed(&self) -> [Vec4; 2] {
        let w = &self.weights;
        [
            Vec4::new(w[0], w[1], w[2], w[3]),
            Vec4::new(w[4], w[5], w[6], w[7]),
        ]
    }

    /// Blur one row with repeat wrapping, as the GPU pass does per texel
    pub fn apply(&self, row: &[[f32; 2]]) -> Vec<[f32; 2]> {
        let n = row.len() as isize;
        (0..n)
            .map(|i| {
                let mut acc = [0.0f32; 2];
                for offset in -(BLUR_RADIUS as isize)..=BLUR_RADIUS as isize {
                    let w = self.weights[offset.unsigned_abs()];
                    let texel = row[(i + offset).rem_euclid(n) as usize];
                    acc[0] += w * texel[0];
                    acc[1] += w * texel[1];
                }
                acc
            })
            .collect()
    }
}

impl Default for BlurKernel {
    fn default() -> Self {
        Self::gaussian(3.0)
    }
}

/// One direction of the moment blur: samples `source`, writes `target`
pub struct BlurPass {
    name: &'static str,
    program: ProgramHandle,
    quad: MeshId,
    source: ResourceId,
    target: ResourceId,
    vertical: bool,
    kernel: BlurKernel,
}

impl BlurPass {
    pub fn horizontal(
        program: ProgramHandle,
        quad: MeshId,
        source: ResourceId,
        target: ResourceId,
        kernel: BlurKernel,
    ) -> Self {
        Self {
            name: "Moment Blur Horizontal",
            program,
            quad,
            source,
            target,
            vertical: false,
            kernel,
        }
    }

    pub fn vertical(
        program: ProgramHandle,
        quad: MeshId,
        source: ResourceId,
        target: ResourceId,
        kernel: BlurKernel,
    ) -> Self {
        Self {
            name: "Moment Blur Vertical",
            vertical: true,
            ..Self::horizontal(program, quad, source, target, kernel)
        }
    }
}

impl RenderPass for BlurPass {
    fn name(&self) -> &str {
        self.name
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.read(self.source, ResourceUsage::TextureRead);
        ctx.write(self.target, ResourceUsage::RenderTarget);
    }

    fn execute(&self, ctx: &mut PassExecuteContext) -> Result<(), PipelineError> {
        let (view, sampler) = ctx
            .target(self.source)?
            .sampled
            .ok_or(PipelineError::UnboundResource(self.source))?;

        ctx.begin_target_pass(self.name, self.target, [0.5, 0.5, 0.5, 1.0])?;
        ctx.shaders.use_program(ctx.backend, self.program);
        ctx.backend.set_texture(0, view, sampler);
        ctx.shaders
            .set_uniform(self.program, "weights", self.kernel.packed())?;
        ctx.shaders.set_uniform(
            self.program,
            "vertical",
            if self.vertical { 1.0f32 } else { 0.0 },
        )?;
        let result = ctx.draw_mesh(self.program, self.quad);
        ctx.backend.end_render_pass();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_is_normalized() {
        for sigma in [0.5, 1.0, 3.0, 10.0] {
            let kernel = BlurKernel::gaussian(sigma);
            let w = kernel.weights();
            let total = w[0] + 2.0 * w[1..].iter().sum::<f32>();
            assert!((total - 1.0).abs() < 1e-6, "sigma {sigma}: {total}");
            assert!(w.windows(2).all(|pair| pair[0] >= pair[1]));
        }
    }

    #[test]
    fn test_constant_field_is_unchanged() {
        let kernel = BlurKernel::default();
        let field = vec![[0.37f32, 0.37 * 0.37]; 32];
        let horizontal = kernel.apply(&field);
        let both = kernel.apply(&horizontal);
        for texel in both {
            assert!((texel[0] - 0.37).abs() < 1e-5);
            assert!((texel[1] - 0.1369).abs() < 1e-5);
        }
    }

    #[test]
    fn test_blur_spreads_a_spike() {
        let kernel = BlurKernel::gaussian(1.0);
        let mut row = vec![[0.0f32; 2]; 16];
        row[8] = [1.0, 1.0];
        let out = kernel.apply(&row);
        assert!((out[8][0] - kernel.weights()[0]).abs() < 1e-6);
        assert!((out[7][0] - out[9][0]).abs() < 1e-6);
        let total: f32 = out.iter().map(|t| t[0]).sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_packed_layout() {
        let kernel = BlurKernel::default();
        let packed = kernel.packed();
        assert_eq!(packed[0].x, kernel.weights()[0]);
        assert_eq!(packed[1].w, kernel.weights()[7]);
    }
}
