//! Effect trees: shader programs, composites and the pass executor.
//!
//! An [`Effect`] is either a leaf program ([`ShaderEffect`], [`ClothEffect`])
//! or a two-stage chain ([`CompositeEffect`], [`BlurEffect`]). Trees are
//! flattened into a [`FramePlan`] and executed by [`render_effect`] inside a
//! context's work item.

mod blur;
pub mod builtin;
mod cloth;
mod composite;
mod plan;
mod program;
mod renderer;
mod shader_effect;
mod target_slot;

use glam::{Mat3, Mat4};

use crate::core::Updateable;
use crate::error::Result;

pub use blur::{BlurEffect, GaussianKernel, MAX_RADIUS, MAX_SIGMA};
pub use cloth::{ClothEffect, ClothParams, CLOTH_LEVEL_OF_DETAIL};
pub use composite::{CompositeEffect, Stage};
pub use plan::{FramePlan, NodePath, PassInput, PassOutput, PassStep, TargetRequest};
pub use renderer::{render_effect, render_to_renderbuffer};
pub use shader_effect::{
    PassBinding, ShaderEffect, DOWNSAMPLE_UNIFORM, MAX_DOWNSAMPLE, RESOLUTION_UNIFORM, TEXEL_SIZE_UNIFORM,
};

/// A node of an effect tree.
#[derive(Debug, Clone)]
pub enum Effect {
    Shader(ShaderEffect),
    Composite(Box<CompositeEffect>),
    Blur(Box<BlurEffect>),
    Cloth(ClothEffect),
}

impl From<ShaderEffect> for Effect {
    fn from(effect: ShaderEffect) -> Self {
        Effect::Shader(effect)
    }
}

impl From<CompositeEffect> for Effect {
    fn from(effect: CompositeEffect) -> Self {
        Effect::Composite(Box::new(effect))
    }
}

impl Effect {
    pub fn is_linked(&self) -> bool {
        match self {
            Effect::Shader(s) => s.is_linked(),
            Effect::Composite(c) => c.is_linked(),
            Effect::Blur(b) => b.is_linked(),
            Effect::Cloth(c) => c.shader().is_linked(),
        }
    }

    pub fn link(&mut self) -> Result<()> {
        match self {
            Effect::Shader(s) => s.link(),
            Effect::Composite(c) => c.link(),
            Effect::Blur(b) => b.link(),
            Effect::Cloth(c) => c.shader_mut().link(),
        }
    }

    /// The leaf program, for shader and cloth nodes.
    pub fn as_shader(&self) -> Option<&ShaderEffect> {
        match self {
            Effect::Shader(s) => Some(s),
            Effect::Cloth(c) => Some(c.shader()),
            Effect::Composite(_) | Effect::Blur(_) => None,
        }
    }

    pub fn as_shader_mut(&mut self) -> Option<&mut ShaderEffect> {
        match self {
            Effect::Shader(s) => Some(s),
            Effect::Cloth(c) => Some(c.shader_mut()),
            Effect::Composite(_) | Effect::Blur(_) => None,
        }
    }

    /// The two-stage chain, for composite and blur nodes.
    pub fn as_composite(&self) -> Option<&CompositeEffect> {
        match self {
            Effect::Composite(c) => Some(&**c),
            Effect::Blur(b) => Some(b.composite()),
            Effect::Shader(_) | Effect::Cloth(_) => None,
        }
    }

    pub fn as_composite_mut(&mut self) -> Option<&mut CompositeEffect> {
        match self {
            Effect::Composite(c) => Some(&mut **c),
            Effect::Blur(b) => Some(b.composite_mut()),
            Effect::Shader(_) | Effect::Cloth(_) => None,
        }
    }

    pub fn node(&self, path: &[Stage]) -> Option<&Effect> {
        match path.split_first() {
            None => Some(self),
            Some((stage, rest)) => self.as_composite()?.child(*stage).node(rest),
        }
    }

    pub fn node_mut(&mut self, path: &[Stage]) -> Option<&mut Effect> {
        match path.split_first() {
            None => Some(self),
            Some((stage, rest)) => self.as_composite_mut()?.child_mut(*stage).node_mut(rest),
        }
    }

    /// Marks the composites along `path` as executing the branch it takes.
    pub(crate) fn enter_path(&mut self, path: &[Stage]) {
        let Some((stage, rest)) = path.split_first() else {
            return;
        };
        if let Some(composite) = self.as_composite_mut() {
            composite.set_current(*stage);
            composite.child_mut(*stage).enter_path(rest);
        }
    }

    /// Puts every composite back on its first stage.
    pub(crate) fn reset_stages(&mut self) {
        if let Some(composite) = self.as_composite_mut() {
            composite.set_current(Stage::First);
            composite.first_mut().reset_stages();
            composite.second_mut().reset_stages();
        }
    }

    pub fn set_projection_matrix(&mut self, m: Mat4) {
        match self {
            Effect::Shader(s) => s.set_projection_matrix(m),
            Effect::Composite(c) => c.set_projection_matrix(m),
            Effect::Blur(b) => b.set_projection_matrix(m),
            Effect::Cloth(c) => c.shader_mut().set_projection_matrix(m),
        }
    }

    pub fn set_model_view_matrix(&mut self, m: Mat4) {
        match self {
            Effect::Shader(s) => s.set_model_view_matrix(m),
            Effect::Composite(c) => c.set_model_view_matrix(m),
            Effect::Blur(b) => b.set_model_view_matrix(m),
            Effect::Cloth(c) => c.shader_mut().set_model_view_matrix(m),
        }
    }

    pub fn set_normal_matrix(&mut self, m: Mat3) {
        match self {
            Effect::Shader(s) => s.set_normal_matrix(m),
            Effect::Composite(c) => c.set_normal_matrix(m),
            Effect::Blur(b) => b.set_normal_matrix(m),
            Effect::Cloth(c) => c.shader_mut().set_normal_matrix(m),
        }
    }

    /// Drops every GPU object in the tree; they are recreated on next use.
    pub fn release_gpu(&mut self) {
        match self {
            Effect::Shader(s) => s.release_gpu(),
            Effect::Composite(c) => c.release_gpu(),
            Effect::Blur(b) => b.release_gpu(),
            Effect::Cloth(c) => c.shader_mut().release_gpu(),
        }
    }
}

impl Updateable for Effect {
    fn update(&mut self, dt: f64) {
        match self {
            Effect::Cloth(c) => c.update(dt),
            Effect::Composite(c) => {
                c.first_mut().update(dt);
                c.second_mut().update(dt);
            }
            Effect::Shader(_) | Effect::Blur(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Effect {
        CompositeEffect::new(
            builtin::grayscale(),
            CompositeEffect::new(BlurEffect::new(1.0).unwrap(), ClothEffect::new().unwrap()),
        )
        .into()
    }

    #[test]
    fn node_walks_composites_and_blurs() {
        use Stage::{First, Second};
        let tree = tree();
        assert!(tree.node(&[First]).unwrap().as_shader().is_some());
        assert!(tree.node(&[Second, First, Second]).unwrap().as_shader().is_some());
        assert!(matches!(tree.node(&[Second, Second]), Some(Effect::Cloth(_))));
        assert!(tree.node(&[First, First]).is_none());
    }

    #[test]
    fn enter_path_then_reset() {
        use Stage::{First, Second};
        let mut tree = tree();
        tree.enter_path(&[Second, Second]);
        let root = tree.as_composite().unwrap();
        assert_eq!(root.current_effect(), Second);
        assert_eq!(root.second().as_composite().unwrap().current_effect(), Second);

        tree.reset_stages();
        let root = tree.as_composite().unwrap();
        assert_eq!(root.current_effect(), First);
        assert_eq!(root.second().as_composite().unwrap().current_effect(), First);
    }

    #[test]
    fn link_covers_whole_tree() {
        let mut tree = tree();
        tree.link().unwrap();
        assert!(tree.is_linked());
    }

    #[test]
    fn update_reaches_nested_cloth() {
        let mut tree = tree();
        tree.update(0.5);
        let Some(Effect::Cloth(cloth)) = tree.node(&[Stage::Second, Stage::Second]) else {
            panic!("cloth node missing");
        };
        assert_eq!(cloth.time(), 0.5);
    }
}
