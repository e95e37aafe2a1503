//! Ready-made effects over the built-in shaders.

use crate::shader::builtin;

use super::ShaderEffect;

pub use super::blur::BlurEffect;
pub use super::cloth::ClothEffect;

/// Copies its input unchanged.
pub fn passthrough() -> ShaderEffect {
    ShaderEffect::image(builtin::PASSTHROUGH_FRAG).with_label("passthrough")
}

/// Rec. 709 luminance at full intensity. Lower `intensity` blends back toward
/// the source colors.
pub fn grayscale() -> ShaderEffect {
    let mut effect = ShaderEffect::image(builtin::GRAYSCALE_FRAG).with_label("grayscale");
    if let Err(e) = effect.set_uniform("intensity", 1.0f32) {
        log::error!("grayscale: {e}");
    }
    effect
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::UniformValue;

    #[test]
    fn presets_link() {
        let mut a = passthrough();
        a.link().unwrap();
        let mut b = grayscale();
        b.link().unwrap();
        assert_eq!(b.uniform("intensity"), Some(&UniformValue::Float(1.0)));
    }
}
