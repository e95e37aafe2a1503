use std::fmt;

use glam::{Mat3, Mat4};

use crate::coords::Extent;
use crate::device::{Current, OffscreenTarget};
use crate::error::{EffectError, Result};

use super::shader_effect::MAX_DOWNSAMPLE;
use super::target_slot::TargetSlot;
use super::Effect;

/// Branch of a composite.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Renders the composite's input into its intermediate target.
    #[default]
    First,
    /// Renders the intermediate target into the composite's output.
    Second,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::First => "first",
            Stage::Second => "second",
        })
    }
}

/// Two effects chained through one offscreen target.
///
/// `first` renders the composite's input into the target; `second` samples
/// the target through a full-screen quad into the composite's output. Either
/// child may itself be a composite.
pub struct CompositeEffect {
    label: String,
    first: Effect,
    second: Effect,
    current: Stage,
    resolution: Option<Extent>,
    downsample: u32,
    target: TargetSlot<OffscreenTarget>,
}

impl CompositeEffect {
    pub fn new(first: impl Into<Effect>, second: impl Into<Effect>) -> Self {
        Self {
            label: "composite".to_owned(),
            first: first.into(),
            second: second.into(),
            current: Stage::First,
            resolution: None,
            downsample: 0,
            target: TargetSlot::default(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn first(&self) -> &Effect {
        &self.first
    }

    pub fn first_mut(&mut self) -> &mut Effect {
        &mut self.first
    }

    pub fn second(&self) -> &Effect {
        &self.second
    }

    pub fn second_mut(&mut self) -> &mut Effect {
        &mut self.second
    }

    pub fn child(&self, stage: Stage) -> &Effect {
        match stage {
            Stage::First => &self.first,
            Stage::Second => &self.second,
        }
    }

    pub fn child_mut(&mut self, stage: Stage) -> &mut Effect {
        match stage {
            Stage::First => &mut self.first,
            Stage::Second => &mut self.second,
        }
    }

    /// Stage currently executing; `First` outside of a pass.
    pub fn current_effect(&self) -> Stage {
        self.current
    }

    pub fn active_effect(&self) -> &Effect {
        self.child(self.current)
    }

    pub(crate) fn set_current(&mut self, stage: Stage) {
        self.current = stage;
    }

    pub fn is_linked(&self) -> bool {
        self.first.is_linked() && self.second.is_linked()
    }

    /// Links whichever children are not linked yet. Errors name the failing
    /// branch.
    pub fn link(&mut self) -> Result<()> {
        if self.is_linked() {
            return Err(EffectError::AlreadyLinked);
        }
        for stage in [Stage::First, Stage::Second] {
            let child = self.child_mut(stage);
            if !child.is_linked() {
                child.link().map_err(|e| in_branch(e, stage))?;
            }
        }
        log::debug!("{}: linked", self.label);
        Ok(())
    }

    // ---- sizing ----

    pub fn resolution(&self) -> Option<Extent> {
        self.resolution
    }

    /// Extent of the intermediate target before downsampling; `None` follows
    /// the destination (or the enclosing composite's target).
    pub fn set_resolution(&mut self, resolution: Option<Extent>) {
        self.resolution = resolution;
    }

    pub fn downsample_level(&self) -> u32 {
        self.downsample
    }

    pub fn set_downsample_level(&mut self, level: u32) {
        self.downsample = level.min(MAX_DOWNSAMPLE);
    }

    /// Extent of the intermediate target when the composite renders inside
    /// `outer`.
    pub fn internal_extent(&self, outer: Extent) -> Extent {
        self.resolution.unwrap_or(outer).downsampled(self.downsample)
    }

    pub fn target_allocations(&self) -> u64 {
        self.target.allocations()
    }

    pub(crate) fn ensure_target(
        &mut self,
        cx: &Current<'_>,
        extent: Extent,
        format: wgpu::TextureFormat,
    ) -> Result<&OffscreenTarget> {
        let label = &self.label;
        self.target.ensure(extent, format, |extent, format| {
            log::debug!("{label}: allocating {}x{} target", extent.width, extent.height);
            cx.allocate_target(label, extent, format)
        })
    }

    pub(crate) fn target(&self) -> Option<&OffscreenTarget> {
        self.target.get()
    }

    // ---- transforms (forwarded to `first`) ----

    pub fn set_projection_matrix(&mut self, m: Mat4) {
        self.first.set_projection_matrix(m);
    }

    pub fn set_model_view_matrix(&mut self, m: Mat4) {
        self.first.set_model_view_matrix(m);
    }

    pub fn set_normal_matrix(&mut self, m: Mat3) {
        self.first.set_normal_matrix(m);
    }

    /// Drops the intermediate target and the children's GPU objects.
    pub fn release_gpu(&mut self) {
        self.target.release();
        self.first.release_gpu();
        self.second.release_gpu();
    }
}

impl Clone for CompositeEffect {
    /// The copy allocates its own target on first use.
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            first: self.first.clone(),
            second: self.second.clone(),
            current: Stage::First,
            resolution: self.resolution,
            downsample: self.downsample,
            target: TargetSlot::default(),
        }
    }
}

impl fmt::Debug for CompositeEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeEffect")
            .field("label", &self.label)
            .field("first", &self.first)
            .field("second", &self.second)
            .field("downsample", &self.downsample)
            .field("target", &self.target.extent())
            .finish()
    }
}

fn in_branch(err: EffectError, stage: Stage) -> EffectError {
    match err {
        EffectError::ShaderCompile { stage: compile_stage, log } => EffectError::ShaderCompile {
            stage: compile_stage,
            log: format!("{stage} effect: {log}"),
        },
        EffectError::Uniform { name, reason } => EffectError::Uniform {
            name,
            reason: format!("{reason} (in {stage} effect)"),
        },
        other => other,
    }
}
