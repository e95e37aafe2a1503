use std::time::{Duration, Instant};

/// Frame timing snapshot.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Time elapsed since the previous tick, in seconds. Zero on the first
    /// tick after a start or resume.
    pub dt: f64,

    /// Monotonic timestamp of the tick.
    pub now: Instant,

    /// Monotonic tick counter since the last `restart`.
    pub frame_index: u64,
}

/// Tick clock producing `FrameTime` snapshots from externally supplied
/// timestamps (display refresh times).
///
/// Delta time is clamped to avoid pathological values when the host stalls,
/// and forced to zero after `restart`/`resume` so the first tick never sees
/// the time spent stopped or in the background.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Option<Instant>,
    frame_index: u64,
    paused: bool,
    dt_max: Duration,
}

impl FrameClock {
    /// Default upper clamp for delta time.
    pub const DEFAULT_MAX_DT: Duration = Duration::from_millis(250);

    /// Creates a new clock with the default clamp.
    pub fn new() -> Self {
        Self::with_max_dt(Self::DEFAULT_MAX_DT)
    }

    /// Creates a clock with a custom delta-time clamp.
    pub fn with_max_dt(dt_max: Duration) -> Self {
        Self {
            last: None,
            frame_index: 0,
            paused: false,
            dt_max,
        }
    }

    /// Forgets the previous tick and resets the counter.
    pub fn restart(&mut self) {
        self.last = None;
        self.frame_index = 0;
        self.paused = false;
    }

    /// Freezes the clock; `tick` returns `None` until `resume`.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Unfreezes the clock. The next tick reports `dt = 0`.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.last = None;
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Advances the clock to `now`.
    pub fn tick(&mut self, now: Instant) -> Option<FrameTime> {
        if self.paused {
            return None;
        }

        let dt = match self.last {
            Some(last) => now.saturating_duration_since(last).min(self.dt_max),
            None => Duration::ZERO,
        };

        self.last = Some(now);

        let ft = FrameTime {
            dt: dt.as_secs_f64(),
            now,
            frame_index: self.frame_index,
        };

        self.frame_index = self.frame_index.wrapping_add(1);

        Some(ft)
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn first_tick_has_zero_dt() {
        let mut clock = FrameClock::new();
        let t0 = Instant::now();
        let ft = clock.tick(t0).unwrap();
        assert_eq!(ft.dt, 0.0);
        assert_eq!(ft.frame_index, 0);
    }

    #[test]
    fn dt_is_elapsed_between_ticks() {
        let mut clock = FrameClock::new();
        let t0 = Instant::now();
        clock.tick(t0);
        let ft = clock.tick(t0 + ms(16)).unwrap();
        assert!((ft.dt - 0.016).abs() < 1e-9);
        assert_eq!(ft.frame_index, 1);
    }

    #[test]
    fn large_gaps_are_clamped() {
        let mut clock = FrameClock::with_max_dt(ms(100));
        let t0 = Instant::now();
        clock.tick(t0);
        let ft = clock.tick(t0 + Duration::from_secs(5)).unwrap();
        assert!((ft.dt - 0.1).abs() < 1e-9);
    }

    #[test]
    fn paused_clock_does_not_tick_and_resumes_at_zero_dt() {
        let mut clock = FrameClock::new();
        let t0 = Instant::now();
        clock.tick(t0);
        clock.pause();
        assert!(clock.tick(t0 + ms(16)).is_none());
        clock.resume();
        let ft = clock.tick(t0 + ms(3000)).unwrap();
        assert_eq!(ft.dt, 0.0);
    }

    #[test]
    fn restart_resets_frame_index() {
        let mut clock = FrameClock::new();
        let t0 = Instant::now();
        clock.tick(t0);
        clock.tick(t0 + ms(16));
        clock.restart();
        assert_eq!(clock.tick(t0 + ms(32)).unwrap().frame_index, 0);
    }
}
