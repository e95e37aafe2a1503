use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, Result};

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::coords::Extent;
use crate::device::{ContextConfig, GraphicsContext, RenderbufferId};
use crate::scheduler::{ManualDisplaySource, RenderScheduler, SchedulerConfig};

use super::view::{EffectScene, EffectView};

/// Refresh rate assumed when the monitor does not report one.
const FALLBACK_REFRESH_HZ: f64 = 60.0;

/// Window/view configuration.
#[derive(Debug, Clone)]
pub struct ViewConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    pub frames_per_second: u32,
    pub synchronous_update: bool,
    pub context: ContextConfig,
    pub scheduler: SchedulerConfig,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            title: "prism".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
            frames_per_second: 60,
            synchronous_update: false,
            context: ContextConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Entry point for the effect view host.
pub struct Runtime;

impl Runtime {
    /// Opens one window showing `scene` and runs until it is closed.
    pub fn run(config: ViewConfig, scene: EffectScene) -> Result<()> {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut host = ViewHost::new(config, scene);

        event_loop
            .run_app(&mut host)
            .context("winit event loop terminated with error")?;

        host.result
    }
}

struct ViewEntry {
    window: Arc<Window>,
    context: GraphicsContext,
    // Kept alive here; the scheduler only holds it weakly.
    _view: Arc<Mutex<EffectView>>,
    scheduler: RenderScheduler,
    display: ManualDisplaySource,
}

struct ViewHost {
    config: ViewConfig,
    scene: Option<EffectScene>,
    entry: Option<ViewEntry>,
    result: Result<()>,
}

impl ViewHost {
    fn new(config: ViewConfig, scene: EffectScene) -> Self {
        Self {
            config,
            scene: Some(scene),
            entry: None,
            result: Ok(()),
        }
    }

    fn create_entry(&mut self, event_loop: &ActiveEventLoop, scene: EffectScene) -> Result<ViewEntry> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);

        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let context = GraphicsContext::new(self.config.context.clone()).context("failed to create graphics context")?;
        let drawable = context
            .create_drawable(window.clone())
            .context("failed to create drawable")?;
        context
            .run_sync(move |cx| cx.renderbuffer_storage(RenderbufferId::MAIN, drawable))?
            .context("failed to bind drawable")?;

        let refresh_hz = window
            .current_monitor()
            .and_then(|m| m.refresh_rate_millihertz())
            .map(|mhz| mhz as f64 / 1000.0)
            .unwrap_or(FALLBACK_REFRESH_HZ);
        let display = ManualDisplaySource::new(refresh_hz);

        let scheduler_config = SchedulerConfig {
            preferred_fps: self.config.frames_per_second,
            ..self.config.scheduler.clone()
        };
        let view = EffectView::new(context.clone(), scene, display.clone(), scheduler_config)?;
        let scheduler = {
            let mut guard = crate::scheduler::lock(&view);
            guard.set_synchronous_update(self.config.synchronous_update);
            guard.scheduler().clone()
        };

        log::info!(
            "view ready: {} at {refresh_hz:.1} Hz on {}",
            self.config.title,
            context.adapter_info().name
        );

        Ok(ViewEntry {
            window,
            context,
            _view: view,
            scheduler,
            display,
        })
    }

    fn shut_down(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(entry) = self.entry.take() {
            entry.scheduler.stop();
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for ViewHost {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(entry) = &self.entry {
            entry.scheduler.host_did_become_active();
            entry.window.request_redraw();
            return;
        }

        let Some(scene) = self.scene.take() else {
            return;
        };

        match self.create_entry(event_loop, scene) {
            Ok(entry) => {
                entry.window.request_redraw();
                self.entry = Some(entry);
            }
            Err(e) => {
                log::error!("failed to create effect view: {e:#}");
                self.result = Err(e);
                event_loop.exit();
            }
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(entry) = &self.entry {
            entry.scheduler.host_did_enter_background();
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);

        // The display source is driven by redraws, so keep them coming.
        if let Some(entry) = &self.entry {
            entry.window.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(entry) = &self.entry else {
            return;
        };
        if entry.window.id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => self.shut_down(event_loop),

            WindowEvent::Resized(size) => {
                let extent = Extent::from(size);
                let resized = entry.context.run_block(
                    move |cx| {
                        if let Err(e) = cx.resize_renderbuffer(RenderbufferId::MAIN, extent) {
                            log::warn!("resize failed: {e}");
                        }
                    },
                    false,
                );
                if let Err(e) = resized {
                    log::warn!("resize not submitted: {e}");
                }
                entry.window.request_redraw();
            }

            WindowEvent::Occluded(occluded) => {
                if occluded {
                    entry.scheduler.host_did_enter_background();
                } else {
                    entry.scheduler.host_did_become_active();
                }
            }

            WindowEvent::RedrawRequested => {
                entry.display.fire(Instant::now());
            }

            _ => {}
        }
    }
}
