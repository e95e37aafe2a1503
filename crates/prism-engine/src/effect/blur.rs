use glam::{Mat3, Mat4, Vec2, Vec4};

use crate::coords::Extent;
use crate::error::Result;
use crate::shader::builtin;

use super::composite::{CompositeEffect, Stage};
use super::shader_effect::ShaderEffect;
use super::Effect;

/// Largest accepted standard deviation, in texels.
pub const MAX_SIGMA: f32 = 10.0;
/// Kernel radius at [`MAX_SIGMA`]: `ceil(3 * MAX_SIGMA)`.
pub const MAX_RADIUS: u32 = 30;

const WEIGHT_SLOTS: usize = (MAX_RADIUS as usize + 1).div_ceil(4);

/// One-sided Gaussian kernel: `weights[0]` is the center tap.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKernel {
    pub radius: u32,
    pub weights: Vec<f32>,
}

impl GaussianKernel {
    /// Kernel for `sigma` (clamped into `[0, MAX_SIGMA]`). Weights are
    /// normalized so the full two-sided kernel sums to one; sigma 0 is the
    /// identity.
    pub fn new(sigma: f32) -> Self {
        let sigma = clamp_sigma(sigma);
        if sigma == 0.0 {
            return Self {
                radius: 0,
                weights: vec![1.0],
            };
        }

        let radius = (3.0 * sigma).ceil() as u32;
        let denom = 2.0 * sigma * sigma;
        let mut weights: Vec<f32> = (0..=radius)
            .map(|i| (-((i * i) as f32) / denom).exp())
            .collect();

        let total = weights[0] + 2.0 * weights[1..].iter().sum::<f32>();
        weights.iter_mut().for_each(|w| *w /= total);
        Self { radius, weights }
    }

    /// Weights packed four per `vec4`, zero-padded to the shader's array size.
    pub fn packed(&self) -> Vec<Vec4> {
        let mut padded = [0.0f32; WEIGHT_SLOTS * 4];
        padded[..self.weights.len()].copy_from_slice(&self.weights);
        padded.chunks_exact(4).map(Vec4::from_slice).collect()
    }
}

fn clamp_sigma(sigma: f32) -> f32 {
    if sigma.is_nan() {
        0.0
    } else {
        sigma.clamp(0.0, MAX_SIGMA)
    }
}

/// Separable Gaussian blur: a horizontal pass into an intermediate target,
/// then a vertical pass into the output.
#[derive(Debug, Clone)]
pub struct BlurEffect {
    sigma: f32,
    kernel: GaussianKernel,
    composite: CompositeEffect,
}

impl BlurEffect {
    pub fn new(sigma: f32) -> Result<Self> {
        let mut horizontal = ShaderEffect::image(builtin::BLUR_FRAG).with_label("blur horizontal");
        horizontal.set_uniform("direction", Vec2::X)?;
        let mut vertical = ShaderEffect::image(builtin::BLUR_FRAG).with_label("blur vertical");
        vertical.set_uniform("direction", Vec2::Y)?;

        let mut blur = Self {
            sigma: 0.0,
            kernel: GaussianKernel::new(0.0),
            composite: CompositeEffect::new(horizontal, vertical).with_label("blur"),
        };
        blur.set_sigma(sigma)?;
        Ok(blur)
    }

    pub fn sigma(&self) -> f32 {
        self.sigma
    }

    pub fn kernel(&self) -> &GaussianKernel {
        &self.kernel
    }

    /// Recomputes the kernel; both passes pick it up on their next prepare
    /// without relinking.
    pub fn set_sigma(&mut self, sigma: f32) -> Result<()> {
        self.sigma = clamp_sigma(sigma);
        self.kernel = GaussianKernel::new(self.sigma);

        let radius = self.kernel.radius as i32;
        let packed = self.kernel.packed();
        for stage in [Stage::First, Stage::Second] {
            if let Some(pass) = self.composite.child_mut(stage).as_shader_mut() {
                pass.set_uniform("radius", radius)?;
                pass.set_uniform("weights", packed.clone())?;
            }
        }
        Ok(())
    }

    pub fn composite(&self) -> &CompositeEffect {
        &self.composite
    }

    pub(crate) fn composite_mut(&mut self) -> &mut CompositeEffect {
        &mut self.composite
    }

    pub fn is_linked(&self) -> bool {
        self.composite.is_linked()
    }

    pub fn link(&mut self) -> Result<()> {
        self.composite.link()
    }

    pub fn downsample_level(&self) -> u32 {
        self.composite.downsample_level()
    }

    /// Downsamples the intermediate (horizontally blurred) target.
    pub fn set_downsample_level(&mut self, level: u32) {
        self.composite.set_downsample_level(level);
    }

    pub fn set_resolution(&mut self, resolution: Option<Extent>) {
        self.composite.set_resolution(resolution);
    }

    pub fn target_allocations(&self) -> u64 {
        self.composite.target_allocations()
    }

    pub fn set_projection_matrix(&mut self, m: Mat4) {
        self.composite.set_projection_matrix(m);
    }

    pub fn set_model_view_matrix(&mut self, m: Mat4) {
        self.composite.set_model_view_matrix(m);
    }

    pub fn set_normal_matrix(&mut self, m: Mat3) {
        self.composite.set_normal_matrix(m);
    }

    pub fn release_gpu(&mut self) {
        self.composite.release_gpu();
    }
}

impl From<BlurEffect> for Effect {
    fn from(blur: BlurEffect) -> Self {
        Effect::Blur(Box::new(blur))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::UniformValue;

    #[test]
    fn zero_sigma_is_identity() {
        let kernel = GaussianKernel::new(0.0);
        assert_eq!(kernel.radius, 0);
        assert_eq!(kernel.weights, vec![1.0]);
    }

    #[test]
    fn kernel_is_normalized() {
        for sigma in [0.5, 2.0, 7.3, MAX_SIGMA] {
            let kernel = GaussianKernel::new(sigma);
            let total = kernel.weights[0] + 2.0 * kernel.weights[1..].iter().sum::<f32>();
            assert!((total - 1.0).abs() < 1e-5, "sigma {sigma}: {total}");
            assert!(kernel.weights.windows(2).all(|w| w[0] >= w[1]));
        }
    }

    #[test]
    fn radius_is_three_sigma() {
        assert_eq!(GaussianKernel::new(2.0).radius, 6);
        assert_eq!(GaussianKernel::new(1.2).radius, 4);
        assert_eq!(GaussianKernel::new(MAX_SIGMA).radius, 30);
        assert_eq!(GaussianKernel::new(MAX_SIGMA * 4.0).radius, MAX_RADIUS);
    }

    #[test]
    fn widest_kernel_fits_shader_array() {
        let kernel = GaussianKernel::new(MAX_SIGMA);
        let packed = kernel.packed();
        assert_eq!(packed.len(), 8);
        assert_eq!(packed[7].z, kernel.weights[MAX_RADIUS as usize]);
        assert_eq!(packed[7].w, 0.0);
    }

    #[test]
    fn sigma_is_clamped() {
        let mut blur = BlurEffect::new(-3.0).unwrap();
        assert_eq!(blur.sigma(), 0.0);
        blur.set_sigma(55.0).unwrap();
        assert_eq!(blur.sigma(), MAX_SIGMA);
        blur.set_sigma(f32::NAN).unwrap();
        assert_eq!(blur.sigma(), 0.0);
    }

    #[test]
    fn packed_weights_fill_shader_array() {
        let packed = GaussianKernel::new(2.0).packed();
        assert_eq!(packed.len(), 8);
        assert_eq!(packed[7], Vec4::ZERO);
    }

    #[test]
    fn set_sigma_after_link_updates_both_passes() {
        let mut blur = BlurEffect::new(1.0).unwrap();
        blur.link().unwrap();
        blur.set_sigma(2.0).unwrap();
        for stage in [Stage::First, Stage::Second] {
            let pass = blur.composite().child(stage).as_shader().unwrap();
            assert!(pass.is_linked());
            assert_eq!(pass.uniform("radius"), Some(&UniformValue::Int(6)));
        }
    }
}
