use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

use crate::core::{Displayable, Renderable, Updateable};
use crate::device::{Current, GraphicsContext, PixelBuffer, RenderbufferId};
use crate::effect::{self, Effect};
use crate::mesh::QuadMesh;
use crate::scheduler::{lock, DisplaySource, RenderScheduler, SchedulerConfig};

type UpdateHook = Box<dyn FnMut(&mut Effect, f64) + Send>;
type SourceProvider = Box<dyn FnMut() -> Option<PixelBuffer> + Send>;

/// What an [`EffectView`] shows: an effect tree, the content drawn through
/// it and the texture that content samples.
///
/// The source is either fixed ([`with_source`](Self::with_source)) or
/// captured again for every frame ([`with_dynamic_source`](Self::with_dynamic_source)).
pub struct EffectScene {
    pub effect: Effect,
    pub model: Box<dyn Renderable + Send>,
    pub source: Option<PixelBuffer>,
    on_update: Option<UpdateHook>,
    provider: Option<SourceProvider>,
}

impl EffectScene {
    /// Scene drawing an adaptive full-screen quad through `effect`.
    pub fn new(effect: impl Into<Effect>) -> Self {
        Self {
            effect: effect.into(),
            model: Box::new(QuadMesh::adaptive()),
            source: None,
            on_update: None,
            provider: None,
        }
    }

    pub fn with_model(mut self, model: impl Renderable + Send + 'static) -> Self {
        self.model = Box::new(model);
        self
    }

    /// Pixels bound as the content texture.
    pub fn with_source(mut self, source: PixelBuffer) -> Self {
        self.source = Some(source);
        self
    }

    /// Polled once per rendered frame; a returned buffer replaces the
    /// current source, `None` keeps the previous one. Replaced buffers drop
    /// out of the context's texture cache.
    pub fn with_dynamic_source(mut self, provider: impl FnMut() -> Option<PixelBuffer> + Send + 'static) -> Self {
        self.provider = Some(Box::new(provider));
        self
    }

    pub fn is_dynamic(&self) -> bool {
        self.provider.is_some()
    }

    /// Called on every tick before the effect tree's own update.
    pub fn on_update(mut self, hook: impl FnMut(&mut Effect, f64) + Send + 'static) -> Self {
        self.on_update = Some(Box::new(hook));
        self
    }

    fn update(&mut self, dt: f64) {
        if let Some(hook) = self.on_update.as_mut() {
            hook(&mut self.effect, dt);
        }
        self.effect.update(dt);
    }

    /// Source for the next frame, capturing a new one when dynamic.
    fn frame_source(&mut self) -> Option<&PixelBuffer> {
        if let Some(captured) = self.provider.as_mut().and_then(|capture| capture()) {
            self.source = Some(captured);
        }
        self.source.as_ref()
    }

    fn render(&mut self, cx: &mut Current<'_>) {
        let texture = match self.frame_source() {
            Some(buffer) => match cx.texture_with_pixel_buffer(buffer) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    log::warn!("content texture unavailable: {e}");
                    None
                }
            },
            None => None,
        };

        let result = effect::render_to_renderbuffer(
            cx,
            RenderbufferId::MAIN,
            &mut self.effect,
            self.model.as_mut(),
            texture.as_ref(),
        );
        match result {
            Ok(true) => {}
            Ok(false) => log::trace!("frame skipped: no drawable frame"),
            Err(e) if e.is_transient() => log::warn!("frame skipped: {e}"),
            Err(e) => log::error!("frame failed: {e}"),
        }
    }
}

/// Clears the in-flight flag when a frame's work item ends, even by panic.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Binds a scene to a context's main renderbuffer and a render scheduler.
///
/// The scheduler holds the view weakly; every tick updates the scene on the
/// scheduler's thread, then renders it through the context's worker.
pub struct EffectView {
    context: GraphicsContext,
    scene: Arc<Mutex<EffectScene>>,
    scheduler: RenderScheduler,
    synchronous_update: bool,
    in_flight: Arc<AtomicBool>,
}

impl EffectView {
    /// Links the scene's effect tree and starts ticking from `display`.
    ///
    /// The context must already have a drawable bound to
    /// [`RenderbufferId::MAIN`].
    pub fn new(
        context: GraphicsContext,
        mut scene: EffectScene,
        display: impl DisplaySource + 'static,
        config: SchedulerConfig,
    ) -> Result<Arc<Mutex<Self>>> {
        if !scene.effect.is_linked() {
            scene.effect.link().context("failed to link the scene's effect tree")?;
        }

        let view = Arc::new(Mutex::new(Self {
            context,
            scene: Arc::new(Mutex::new(scene)),
            scheduler: RenderScheduler::new(display, config),
            synchronous_update: false,
            in_flight: Arc::new(AtomicBool::new(false)),
        }));

        let scheduler = lock(&view).scheduler.clone();
        scheduler.set_update_target(&view);
        scheduler.set_render_target(&view);
        scheduler.run();
        Ok(view)
    }

    pub fn context(&self) -> &GraphicsContext {
        &self.context
    }

    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    pub fn scene(&self) -> &Arc<Mutex<EffectScene>> {
        &self.scene
    }

    pub fn frames_per_second(&self) -> u32 {
        self.scheduler.preferred_fps()
    }

    pub fn set_frames_per_second(&self, fps: u32) {
        self.scheduler.set_preferred_fps(fps);
    }

    pub fn is_paused(&self) -> bool {
        self.scheduler.is_paused()
    }

    pub fn set_paused(&self, paused: bool) {
        if paused {
            self.scheduler.pause();
        } else {
            self.scheduler.resume();
        }
    }

    pub fn synchronous_update(&self) -> bool {
        self.synchronous_update
    }

    /// Wait for each frame's GPU work before returning from `display`.
    pub fn set_synchronous_update(&mut self, synchronous: bool) {
        self.synchronous_update = synchronous;
    }
}

impl Updateable for EffectView {
    fn update(&mut self, dt: f64) {
        lock(&self.scene).update(dt);
    }
}

impl Displayable for EffectView {
    fn display(&mut self) {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            log::trace!("previous frame still in flight; skipping");
            return;
        }
        let guard = InFlight(self.in_flight.clone());
        let scene = self.scene.clone();

        let submitted = self.context.run_block(
            move |cx| {
                let _guard = guard;
                lock(&scene).render(cx);
            },
            self.synchronous_update,
        );

        if let Err(e) = submitted {
            // The work item was dropped unrun, which released the guard.
            log::warn!("frame not submitted: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Extent;
    use crate::effect::builtin;

    fn buffer(rgba: [u8; 4]) -> PixelBuffer {
        PixelBuffer::solid(Extent::new(2, 2), rgba).unwrap()
    }

    #[test]
    fn fixed_source_is_reused() {
        let source = buffer([1, 2, 3, 255]);
        let mut scene = EffectScene::new(builtin::passthrough()).with_source(source.clone());
        assert!(!scene.is_dynamic());
        assert_eq!(scene.frame_source().map(PixelBuffer::id), Some(source.id()));
        assert_eq!(scene.frame_source().map(PixelBuffer::id), Some(source.id()));
    }

    #[test]
    fn dynamic_source_is_captured_every_frame() {
        let mut frame = 0u8;
        let mut scene = EffectScene::new(builtin::passthrough()).with_dynamic_source(move || {
            frame += 1;
            (frame != 3).then(|| buffer([frame, 0, 0, 255]))
        });
        assert!(scene.is_dynamic());

        let first = scene.frame_source().map(|b| b.bytes()[0]);
        let second = scene.frame_source().map(|b| b.bytes()[0]);
        // No capture this frame: the previous one stays.
        let third = scene.frame_source().map(|b| b.bytes()[0]);
        let fourth = scene.frame_source().map(|b| b.bytes()[0]);

        assert_eq!([first, second, third, fourth], [Some(1), Some(2), Some(2), Some(4)]);
    }

    #[test]
    fn dynamic_source_replaces_fixed_source() {
        let mut scene = EffectScene::new(builtin::passthrough())
            .with_source(buffer([9, 9, 9, 255]))
            .with_dynamic_source(|| Some(buffer([7, 7, 7, 255])));
        assert_eq!(scene.frame_source().map(|b| b.bytes()[0]), Some(7));
    }
}
