use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::lock;

/// Called once per display refresh with the refresh timestamp.
pub type RefreshCallback = Arc<dyn Fn(Instant) + Send + Sync>;

/// Source of display-refresh notifications driving a
/// [`RenderScheduler`](super::RenderScheduler).
///
/// Refreshes are delivered sequentially; a source never invokes the callback
/// concurrently with itself.
pub trait DisplaySource: Send {
    /// Nominal refresh rate in Hz.
    fn refresh_rate(&self) -> f64;

    /// Starts delivering refreshes to `on_refresh`, replacing any previous callback.
    fn attach(&mut self, on_refresh: RefreshCallback);

    /// Stops delivering refreshes. A refresh already in progress completes.
    fn detach(&mut self);

    fn is_attached(&self) -> bool;
}

/// Refreshes fired explicitly by the host, e.g. on every redraw of a window
/// or by a test stepping simulated time.
///
/// Clones share the attached callback, so the host keeps one clone to fire
/// while the scheduler owns another.
#[derive(Clone)]
pub struct ManualDisplaySource {
    refresh_rate: f64,
    callback: Arc<Mutex<Option<RefreshCallback>>>,
}

impl ManualDisplaySource {
    pub fn new(refresh_rate: f64) -> Self {
        Self {
            refresh_rate,
            callback: Arc::new(Mutex::new(None)),
        }
    }

    /// Delivers one refresh at `now`. Returns false when nothing is attached.
    pub fn fire(&self, now: Instant) -> bool {
        // Clone out so the callback may detach without deadlocking.
        let callback = lock(&self.callback).clone();
        match callback {
            Some(callback) => {
                callback(now);
                true
            }
            None => false,
        }
    }
}

impl DisplaySource for ManualDisplaySource {
    fn refresh_rate(&self) -> f64 {
        self.refresh_rate
    }

    fn attach(&mut self, on_refresh: RefreshCallback) {
        *lock(&self.callback) = Some(on_refresh);
    }

    fn detach(&mut self) {
        lock(&self.callback).take();
    }

    fn is_attached(&self) -> bool {
        lock(&self.callback).is_some()
    }
}

struct TimerThread {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Refreshes generated by a background thread at a fixed nominal rate.
///
/// For hosts without a display link (headless rendering, tools).
pub struct TimerDisplaySource {
    refresh_rate: f64,
    timer: Option<TimerThread>,
}

impl TimerDisplaySource {
    /// `refresh_rate` must be positive; non-positive rates fall back to 60 Hz.
    pub fn new(refresh_rate: f64) -> Self {
        let refresh_rate = if refresh_rate > 0.0 && refresh_rate.is_finite() {
            refresh_rate
        } else {
            log::warn!("invalid refresh rate {refresh_rate}; using 60 Hz");
            60.0
        };
        Self {
            refresh_rate,
            timer: None,
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.refresh_rate)
    }
}

impl DisplaySource for TimerDisplaySource {
    fn refresh_rate(&self) -> f64 {
        self.refresh_rate
    }

    fn attach(&mut self, on_refresh: RefreshCallback) {
        self.detach();

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let period = self.period();

        let spawned = thread::Builder::new()
            .name("prism-display-timer".to_owned())
            .spawn(move || {
                let start = Instant::now();
                let mut frame: u32 = 0;
                while !thread_stop.load(Ordering::Acquire) {
                    frame = frame.wrapping_add(1);
                    let deadline = start + period * frame;
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    }
                    if thread_stop.load(Ordering::Acquire) {
                        break;
                    }
                    on_refresh(Instant::now());
                }
            });

        match spawned {
            Ok(handle) => self.timer = Some(TimerThread { stop, handle }),
            Err(e) => log::error!("failed to spawn display timer: {e}"),
        }
    }

    fn detach(&mut self) {
        let Some(timer) = self.timer.take() else {
            return;
        };
        timer.stop.store(true, Ordering::Release);
        // Detaching from inside a refresh must not join the calling thread.
        if timer.handle.thread().id() == thread::current().id() {
            return;
        }
        if timer.handle.join().is_err() {
            log::error!("display timer thread panicked");
        }
    }

    fn is_attached(&self) -> bool {
        self.timer.is_some()
    }
}

impl Drop for TimerDisplaySource {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    #[test]
    fn manual_source_fires_only_when_attached() {
        let mut source = ManualDisplaySource::new(60.0);
        let host = source.clone();
        let hits = Arc::new(AtomicUsize::new(0));

        assert!(!host.fire(Instant::now()));

        let counter = hits.clone();
        source.attach(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(host.is_attached());
        assert!(host.fire(Instant::now()));
        assert!(host.fire(Instant::now()));

        source.detach();
        assert!(!host.fire(Instant::now()));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn timer_source_delivers_refreshes_until_detached() {
        let mut source = TimerDisplaySource::new(240.0);
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        source.attach(Arc::new(move |now| {
            let _ = lock(&tx).send(now);
        }));

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(second > first);

        source.detach();
        assert!(!source.is_attached());
        while rx.try_recv().is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn invalid_rate_falls_back() {
        assert_eq!(TimerDisplaySource::new(0.0).refresh_rate(), 60.0);
    }
}
