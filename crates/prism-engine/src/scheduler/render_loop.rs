use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use crate::core::{Displayable, Updateable};
use crate::time::FrameClock;

use super::display::{DisplaySource, RefreshCallback};
use super::lock;

type UpdateTarget = Weak<Mutex<dyn Updateable + Send>>;
type RenderTarget = Weak<Mutex<dyn Displayable + Send>>;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Target tick rate; 0 ticks on every display refresh.
    pub preferred_fps: u32,
    /// Resume automatically when the host returns to the foreground.
    pub automatically_resume_when_foregrounded: bool,
    /// Upper clamp for the `dt` passed to the update target.
    pub max_dt: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            preferred_fps: 60,
            automatically_resume_when_foregrounded: true,
            max_dt: FrameClock::DEFAULT_MAX_DT,
        }
    }
}

/// Number of display refreshes per tick.
pub fn refreshes_per_tick(refresh_rate: f64, fps: u32) -> u32 {
    if fps == 0 || refresh_rate.is_nan() || refresh_rate <= 0.0 {
        return 1;
    }
    ((refresh_rate / fps as f64).ceil() as u32).max(1)
}

struct State {
    config: SchedulerConfig,
    update_target: Option<UpdateTarget>,
    render_target: Option<RenderTarget>,

    running: bool,
    paused_by_host: bool,
    clock: FrameClock,

    refresh_rate: f64,
    phase: u32,
    tick_count: u64,
    last_render: Option<Instant>,
}

struct Inner {
    state: Mutex<State>,
    source: Mutex<Box<dyn DisplaySource>>,
}

impl Inner {
    fn on_refresh(&self, now: Instant) {
        let (dt, update_target, render_target) = {
            let mut state = lock(&self.state);
            if !state.running || state.clock.is_paused() {
                return;
            }

            let per_tick = refreshes_per_tick(state.refresh_rate, state.config.preferred_fps);
            let phase = state.phase;
            state.phase = (phase + 1) % per_tick;
            if phase != 0 {
                return;
            }

            let Some(frame) = state.clock.tick(now) else {
                return;
            };
            state.tick_count += 1;
            (frame.dt, state.update_target.clone(), state.render_target.clone())
        };

        // Targets run without the state lock so they may stop or pause the loop.
        if let Some(target) = update_target.as_ref().and_then(Weak::upgrade) {
            lock(&target).update(dt);
        }
        if let Some(target) = render_target.as_ref().and_then(Weak::upgrade) {
            lock(&target).display();
        }

        lock(&self.state).last_render = Some(now);
    }
}

/// Display-synchronized loop calling an update target, then a render target,
/// once per tick.
///
/// Idle until [`run`](Self::run); [`stop`](Self::stop) returns it to idle.
/// While paused no ticks happen and the clock is frozen, so the first tick
/// after resuming reports `dt = 0`. Targets are held weakly: a dropped target
/// is skipped while the loop keeps ticking.
///
/// Handles are cheap to clone and share one loop.
#[derive(Clone)]
pub struct RenderScheduler {
    inner: Arc<Inner>,
}

impl RenderScheduler {
    pub fn new(source: impl DisplaySource + 'static, config: SchedulerConfig) -> Self {
        let clock = FrameClock::with_max_dt(config.max_dt);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    config,
                    update_target: None,
                    render_target: None,
                    running: false,
                    paused_by_host: false,
                    clock,
                    refresh_rate: source.refresh_rate(),
                    phase: 0,
                    tick_count: 0,
                    last_render: None,
                }),
                source: Mutex::new(Box::new(source)),
            }),
        }
    }

    pub fn set_update_target<T>(&self, target: &Arc<Mutex<T>>)
    where
        T: Updateable + Send + 'static,
    {
        let weak: UpdateTarget = Arc::downgrade(target) as Weak<Mutex<dyn Updateable + Send>>;
        lock(&self.inner.state).update_target = Some(weak);
    }

    pub fn set_render_target<T>(&self, target: &Arc<Mutex<T>>)
    where
        T: Displayable + Send + 'static,
    {
        let weak: RenderTarget = Arc::downgrade(target) as Weak<Mutex<dyn Displayable + Send>>;
        lock(&self.inner.state).render_target = Some(weak);
    }

    pub fn clear_targets(&self) {
        let mut state = lock(&self.inner.state);
        state.update_target = None;
        state.render_target = None;
    }

    // ---- configuration ----

    pub fn preferred_fps(&self) -> u32 {
        lock(&self.inner.state).config.preferred_fps
    }

    /// Takes effect at the next refresh.
    pub fn set_preferred_fps(&self, fps: u32) {
        let mut state = lock(&self.inner.state);
        state.config.preferred_fps = fps;
        state.phase = 0;
    }

    pub fn automatically_resume_when_foregrounded(&self) -> bool {
        lock(&self.inner.state).config.automatically_resume_when_foregrounded
    }

    pub fn set_automatically_resume_when_foregrounded(&self, enabled: bool) {
        lock(&self.inner.state).config.automatically_resume_when_foregrounded = enabled;
    }

    // ---- state ----

    pub fn is_running(&self) -> bool {
        lock(&self.inner.state).running
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.inner.state).clock.is_paused()
    }

    /// Ticks since the last `run` from idle.
    pub fn tick_count(&self) -> u64 {
        lock(&self.inner.state).tick_count
    }

    /// Timestamp of the most recent completed tick.
    pub fn last_render(&self) -> Option<Instant> {
        lock(&self.inner.state).last_render
    }

    // ---- control ----

    /// Starts the loop from idle, or resumes it when paused.
    pub fn run(&self) {
        {
            let mut state = lock(&self.inner.state);
            if state.running {
                if state.clock.is_paused() {
                    state.paused_by_host = false;
                    state.clock.resume();
                    state.phase = 0;
                    log::debug!("render loop resumed");
                }
                return;
            }
            state.running = true;
            state.paused_by_host = false;
            state.clock.restart();
            state.phase = 0;
            state.tick_count = 0;
        }

        let weak = Arc::downgrade(&self.inner);
        let callback: RefreshCallback = Arc::new(move |now| {
            if let Some(inner) = weak.upgrade() {
                inner.on_refresh(now);
            }
        });

        let mut source = lock(&self.inner.source);
        lock(&self.inner.state).refresh_rate = source.refresh_rate();
        source.attach(callback);
        log::debug!("render loop started at {:.1} Hz", source.refresh_rate());
    }

    /// Detaches from the display source. No further ticks happen; a tick in
    /// progress completes.
    pub fn stop(&self) {
        {
            let mut state = lock(&self.inner.state);
            if !state.running {
                return;
            }
            state.running = false;
            state.paused_by_host = false;
            state.clock.resume();
        }
        lock(&self.inner.source).detach();
        log::debug!("render loop stopped");
    }

    /// Freezes the loop; no-op when idle.
    pub fn pause(&self) {
        let mut state = lock(&self.inner.state);
        if state.running {
            state.clock.pause();
        }
    }

    /// Resumes a paused loop; no-op when idle.
    pub fn resume(&self) {
        let mut state = lock(&self.inner.state);
        if state.running && state.clock.is_paused() {
            state.paused_by_host = false;
            state.clock.resume();
            state.phase = 0;
        }
    }

    pub fn host_did_enter_background(&self) {
        let mut state = lock(&self.inner.state);
        if state.running && !state.clock.is_paused() {
            state.clock.pause();
            state.paused_by_host = true;
            log::debug!("render loop paused (background)");
        }
    }

    /// Resumes a loop paused by [`host_did_enter_background`](Self::host_did_enter_background)
    /// when `automatically_resume_when_foregrounded` is set; otherwise the
    /// loop stays paused until [`run`](Self::run).
    pub fn host_did_become_active(&self) {
        let mut state = lock(&self.inner.state);
        if state.paused_by_host && state.config.automatically_resume_when_foregrounded {
            state.paused_by_host = false;
            state.clock.resume();
            state.phase = 0;
            log::debug!("render loop resumed (foreground)");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        lock(&self.source).detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualDisplaySource;

    #[derive(Default)]
    struct Recorder {
        dts: Vec<f64>,
        displays: usize,
        log: Vec<&'static str>,
    }

    impl Updateable for Recorder {
        fn update(&mut self, dt: f64) {
            self.dts.push(dt);
            self.log.push("update");
        }
    }

    impl Displayable for Recorder {
        fn display(&mut self) {
            self.displays += 1;
            self.log.push("display");
        }
    }

    struct Harness {
        host: ManualDisplaySource,
        scheduler: RenderScheduler,
        target: Arc<Mutex<Recorder>>,
        t0: Instant,
        refreshes: u32,
    }

    impl Harness {
        fn new(fps: u32) -> Self {
            let host = ManualDisplaySource::new(60.0);
            let scheduler = RenderScheduler::new(
                host.clone(),
                SchedulerConfig {
                    preferred_fps: fps,
                    ..SchedulerConfig::default()
                },
            );
            let target = Arc::new(Mutex::new(Recorder::default()));
            scheduler.set_update_target(&target);
            scheduler.set_render_target(&target);
            Self {
                host,
                scheduler,
                target,
                t0: Instant::now(),
                refreshes: 0,
            }
        }

        fn now(&self) -> Instant {
            self.t0 + Duration::from_secs_f64(self.refreshes as f64 / 60.0)
        }

        fn refresh(&mut self, count: u32) {
            for _ in 0..count {
                self.host.fire(self.now());
                self.refreshes += 1;
            }
        }

        fn displays(&self) -> usize {
            self.target.lock().unwrap().displays
        }
    }

    #[test]
    fn cadence_follows_preferred_fps() {
        assert_eq!(refreshes_per_tick(60.0, 30), 2);
        assert_eq!(refreshes_per_tick(60.0, 60), 1);
        assert_eq!(refreshes_per_tick(60.0, 0), 1);
        assert_eq!(refreshes_per_tick(60.0, 120), 1);
        assert_eq!(refreshes_per_tick(60.0, 24), 3);
        assert_eq!(refreshes_per_tick(120.0, 50), 3);
    }

    #[test]
    fn thirty_fps_at_sixty_hz_ticks_thirty_times_per_second() {
        let mut h = Harness::new(30);
        h.scheduler.run();
        h.refresh(60 * 3);
        assert_eq!(h.scheduler.tick_count(), 90);
        assert_eq!(h.displays(), 90);
    }

    #[test]
    fn no_ticks_before_run() {
        let mut h = Harness::new(60);
        h.refresh(10);
        assert_eq!(h.displays(), 0);
        assert!(!h.scheduler.is_running());
    }

    #[test]
    fn update_precedes_display_and_first_dt_is_zero() {
        let mut h = Harness::new(30);
        h.scheduler.run();
        h.refresh(4);
        let rec = h.target.lock().unwrap();
        assert_eq!(rec.log, ["update", "display", "update", "display"]);
        assert_eq!(rec.dts[0], 0.0);
        assert!((rec.dts[1] - 2.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn stop_prevents_further_ticks() {
        let mut h = Harness::new(60);
        h.scheduler.run();
        h.refresh(5);
        h.scheduler.stop();
        h.refresh(5);
        assert_eq!(h.displays(), 5);
        assert!(!h.host.is_attached());
    }

    #[test]
    fn rerun_resets_count_but_keeps_last_render_until_next_tick() {
        let mut h = Harness::new(60);
        h.scheduler.run();
        h.refresh(3);
        let last = h.scheduler.last_render();
        assert!(last.is_some());

        h.scheduler.stop();
        h.scheduler.run();
        assert_eq!(h.scheduler.tick_count(), 0);
        assert_eq!(h.scheduler.last_render(), last);

        h.refresh(1);
        assert_eq!(h.scheduler.tick_count(), 1);
        assert!(h.scheduler.last_render() > last);
        assert_eq!(h.target.lock().unwrap().dts.last(), Some(&0.0));
    }

    #[test]
    fn background_freezes_last_render() {
        let mut h = Harness::new(60);
        h.scheduler.run();
        h.refresh(2);
        let frozen = h.scheduler.last_render();

        h.scheduler.host_did_enter_background();
        assert!(h.scheduler.is_paused());
        h.refresh(10);
        assert_eq!(h.scheduler.last_render(), frozen);
        assert_eq!(h.displays(), 2);
    }

    #[test]
    fn foreground_resumes_only_with_flag() {
        let mut h = Harness::new(60);
        h.scheduler.set_automatically_resume_when_foregrounded(false);
        h.scheduler.run();
        h.scheduler.host_did_enter_background();
        h.scheduler.host_did_become_active();
        h.refresh(3);
        assert!(h.scheduler.is_paused());
        assert_eq!(h.displays(), 0);

        h.scheduler.run();
        h.refresh(3);
        assert_eq!(h.displays(), 3);

        h.scheduler.set_automatically_resume_when_foregrounded(true);
        h.scheduler.host_did_enter_background();
        h.scheduler.host_did_become_active();
        assert!(!h.scheduler.is_paused());
        h.refresh(1);
        assert_eq!(h.displays(), 4);
        assert_eq!(h.target.lock().unwrap().dts.last(), Some(&0.0));
    }

    #[test]
    fn foreground_does_not_undo_explicit_pause() {
        let h = Harness::new(60);
        h.scheduler.run();
        h.scheduler.pause();
        h.scheduler.host_did_enter_background();
        h.scheduler.host_did_become_active();
        assert!(h.scheduler.is_paused());
        h.scheduler.resume();
        assert!(!h.scheduler.is_paused());
    }

    #[test]
    fn dropped_target_is_skipped() {
        let mut h = Harness::new(60);
        h.scheduler.run();
        let other = Arc::new(Mutex::new(Recorder::default()));
        h.scheduler.set_render_target(&other);
        drop(other);
        h.refresh(3);
        assert_eq!(h.scheduler.tick_count(), 3);
        assert_eq!(h.target.lock().unwrap().dts.len(), 3);
        assert!(h.scheduler.last_render().is_some());
    }

    struct Stopper {
        scheduler: Option<RenderScheduler>,
        ticks: usize,
    }

    impl Displayable for Stopper {
        fn display(&mut self) {
            self.ticks += 1;
            if let Some(s) = &self.scheduler {
                s.stop();
            }
        }
    }

    #[test]
    fn target_may_stop_the_loop() {
        let host = ManualDisplaySource::new(60.0);
        let scheduler = RenderScheduler::new(host.clone(), SchedulerConfig::default());
        let stopper = Arc::new(Mutex::new(Stopper {
            scheduler: Some(scheduler.clone()),
            ticks: 0,
        }));
        scheduler.set_render_target(&stopper);
        scheduler.run();

        let t0 = Instant::now();
        host.fire(t0);
        host.fire(t0 + Duration::from_millis(16));
        assert!(!scheduler.is_running());
        assert_eq!(stopper.lock().unwrap().ticks, 1);
        // Break the handle cycle.
        stopper.lock().unwrap().scheduler = None;
    }
}
