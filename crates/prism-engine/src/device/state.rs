use crate::coords::Viewport;
use crate::paint::Color;

/// Face culling mode.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum CullFace {
    #[default]
    None,
    Front,
    Back,
}

impl CullFace {
    pub fn to_wgpu(self) -> Option<wgpu::Face> {
        match self {
            CullFace::None => None,
            CullFace::Front => Some(wgpu::Face::Front),
            CullFace::Back => Some(wgpu::Face::Back),
        }
    }
}

/// Global render state of a context.
///
/// `viewport: None` means "cover the whole destination".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderState {
    pub viewport: Option<Viewport>,
    pub clear_color: Color,
    pub depth_test: bool,
    pub stencil_test: bool,
    pub cull_face: CullFace,
    pub active_texture: u32,
}

impl RenderState {
    pub fn needs_depth_attachment(&self) -> bool {
        self.depth_test || self.stencil_test
    }
}

/// What changed between two flushes.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct StateDelta {
    pub viewport: bool,
    pub clear_color: bool,
    /// Depth, stencil or cull changed; pipelines must be re-selected.
    pub pipeline: bool,
    pub active_texture: bool,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        *self == StateDelta::default()
    }
}

/// Setters record into `pending`; [`flush`](Self::flush) promotes it to
/// `applied` and reports the difference.
#[derive(Debug, Default)]
pub struct StateTracker {
    pending: RenderState,
    applied: RenderState,
}

impl StateTracker {
    pub fn pending(&self) -> &RenderState {
        &self.pending
    }

    pub fn pending_mut(&mut self) -> &mut RenderState {
        &mut self.pending
    }

    pub fn applied(&self) -> &RenderState {
        &self.applied
    }

    pub fn flush(&mut self) -> StateDelta {
        let (p, a) = (&self.pending, &self.applied);
        let delta = StateDelta {
            viewport: p.viewport != a.viewport,
            clear_color: p.clear_color != a.clear_color,
            pipeline: p.depth_test != a.depth_test
                || p.stencil_test != a.stencil_test
                || p.cull_face != a.cull_face,
            active_texture: p.active_texture != a.active_texture,
        };
        if !delta.is_empty() {
            self.applied = self.pending.clone();
        }
        delta
    }
}

/// Everything a render pipeline depends on besides the program itself.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PipelineKey {
    pub color_format: wgpu::TextureFormat,
    pub depth_stencil: bool,
    pub depth_test: bool,
    pub stencil_test: bool,
    pub cull_face: CullFace,
    /// Premultiplied-alpha blending for content passes; blits replace.
    pub blend: bool,
}

impl PipelineKey {
    pub fn new(state: &RenderState, color_format: wgpu::TextureFormat, blend: bool) -> Self {
        Self {
            color_format,
            depth_stencil: state.needs_depth_attachment(),
            depth_test: state.depth_test,
            stencil_test: state.stencil_test,
            cull_face: state.cull_face,
            blend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_flush_of_defaults_is_empty() {
        let mut tracker = StateTracker::default();
        assert!(tracker.flush().is_empty());
    }

    #[test]
    fn setters_are_deferred_until_flush() {
        let mut tracker = StateTracker::default();
        tracker.pending_mut().cull_face = CullFace::Back;
        assert_eq!(tracker.applied().cull_face, CullFace::None);

        let delta = tracker.flush();
        assert!(delta.pipeline);
        assert!(!delta.viewport);
        assert_eq!(tracker.applied().cull_face, CullFace::Back);

        assert!(tracker.flush().is_empty());
    }

    #[test]
    fn setting_same_value_produces_no_delta() {
        let mut tracker = StateTracker::default();
        tracker.pending_mut().clear_color = Color::OPAQUE_BLACK;
        tracker.pending_mut().active_texture = 0;
        assert!(tracker.flush().is_empty());
    }

    #[test]
    fn viewport_and_texture_changes_are_reported_separately() {
        let mut tracker = StateTracker::default();
        tracker.pending_mut().viewport = Some(Viewport::new(0.0, 0.0, 10.0, 10.0));
        tracker.pending_mut().active_texture = 1;
        let delta = tracker.flush();
        assert!(delta.viewport && delta.active_texture);
        assert!(!delta.pipeline && !delta.clear_color);
    }

    #[test]
    fn depth_or_stencil_needs_attachment() {
        let mut state = RenderState::default();
        assert!(!state.needs_depth_attachment());
        state.stencil_test = true;
        assert!(state.needs_depth_attachment());
        assert!(PipelineKey::new(&state, wgpu::TextureFormat::Rgba8Unorm, false).depth_stencil);
    }
}
