use glam::{Vec2, Vec3};

use crate::core::Updateable;
use crate::error::Result;
use crate::shader::builtin;

use super::shader_effect::ShaderEffect;
use super::Effect;

/// Tessellation level the cloth prefers at full resolution (64 segments per side).
pub const CLOTH_LEVEL_OF_DETAIL: u32 = 6;

/// Parameters of [`ClothEffect`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ClothParams {
    /// Texture-space x where the wave starts and where it reaches full amplitude.
    pub anchors: Vec2,
    pub wave_count: f32,
    pub wave_amplitude: f32,
    pub wave_velocity: f32,
    pub light_offset: Vec3,
    pub ambient_light: Vec3,
    pub diffuse_light: Vec3,
    pub specular_light: Vec3,
}

impl Default for ClothParams {
    fn default() -> Self {
        Self {
            anchors: Vec2::new(0.0, 1.0),
            wave_count: 1.5,
            wave_amplitude: 0.05,
            wave_velocity: 4.0,
            light_offset: Vec3::new(0.0, 0.5, 1.5),
            ambient_light: Vec3::splat(0.35),
            diffuse_light: Vec3::splat(0.65),
            specular_light: Vec3::splat(0.25),
        }
    }
}

/// Waving flag: displaces a subdivided quad with a travelling sine wave and
/// shades it with Phong lighting.
///
/// Draw it over an adaptive [`QuadMesh`](crate::mesh::QuadMesh) so the wave
/// has vertices to move. [`Updateable::update`] advances the wave.
#[derive(Debug, Clone)]
pub struct ClothEffect {
    params: ClothParams,
    time: f32,
    shader: ShaderEffect,
}

impl ClothEffect {
    pub fn new() -> Result<Self> {
        Self::with_params(ClothParams::default())
    }

    pub fn with_params(params: ClothParams) -> Result<Self> {
        let shader = ShaderEffect::new(builtin::CLOTH_VERT, builtin::CLOTH_FRAG)
            .with_label("cloth")
            .with_level_of_detail(CLOTH_LEVEL_OF_DETAIL);
        let mut cloth = Self {
            params,
            time: 0.0,
            shader,
        };
        cloth.push_params()?;
        cloth.shader.set_uniform("time", 0.0f32)?;
        Ok(cloth)
    }

    pub fn params(&self) -> &ClothParams {
        &self.params
    }

    pub fn set_params(&mut self, params: ClothParams) -> Result<()> {
        self.params = params;
        self.push_params()
    }

    /// Seconds of wave animation accumulated so far.
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn shader(&self) -> &ShaderEffect {
        &self.shader
    }

    pub fn shader_mut(&mut self) -> &mut ShaderEffect {
        &mut self.shader
    }

    fn push_params(&mut self) -> Result<()> {
        let p = self.params;
        let s = &mut self.shader;
        s.set_uniform("anchors", p.anchors)?;
        s.set_uniform("wave_count", p.wave_count)?;
        s.set_uniform("wave_amplitude", p.wave_amplitude)?;
        s.set_uniform("wave_velocity", p.wave_velocity)?;
        s.set_uniform("light_offset", p.light_offset)?;
        s.set_uniform("ambient_light", p.ambient_light)?;
        s.set_uniform("diffuse_light", p.diffuse_light)?;
        s.set_uniform("specular_light", p.specular_light)?;
        Ok(())
    }
}

impl Updateable for ClothEffect {
    fn update(&mut self, dt: f64) {
        self.time += dt as f32;
        if let Err(e) = self.shader.set_uniform("time", self.time) {
            log::warn!("cloth: {e}");
        }
    }
}

impl From<ClothEffect> for Effect {
    fn from(cloth: ClothEffect) -> Self {
        Effect::Cloth(cloth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::UniformValue;

    #[test]
    fn links_and_prefers_dense_mesh() {
        let mut cloth = ClothEffect::new().unwrap();
        cloth.shader_mut().link().unwrap();
        assert_eq!(cloth.shader().preferred_level_of_detail(), CLOTH_LEVEL_OF_DETAIL);
        assert!(cloth.shader().uniform_loc("wave_amplitude").is_some());
        assert!(cloth.shader().uniform_loc("normal_matrix").is_some());
    }

    #[test]
    fn update_advances_time_uniform() {
        let mut cloth = ClothEffect::new().unwrap();
        cloth.update(0.0);
        cloth.update(0.25);
        cloth.update(0.25);
        assert_eq!(cloth.time(), 0.5);
        assert_eq!(cloth.shader().uniform("time"), Some(&UniformValue::Float(0.5)));
    }

    #[test]
    fn downsampling_lowers_tessellation() {
        let mut cloth = ClothEffect::new().unwrap();
        cloth.shader_mut().set_downsample_level(2);
        assert_eq!(cloth.shader().preferred_level_of_detail(), CLOTH_LEVEL_OF_DETAIL - 2);
    }
}
