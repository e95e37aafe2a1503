//! Render-loop scheduling.
//!
//! A [`RenderScheduler`] turns display refreshes from a [`DisplaySource`]
//! into ticks: `Updateable::update(dt)` on the update target, then
//! `Displayable::display()` on the render target.

mod display;
mod render_loop;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use display::{DisplaySource, ManualDisplaySource, RefreshCallback, TimerDisplaySource};
pub use render_loop::{refreshes_per_tick, RenderScheduler, SchedulerConfig};

/// Locks `mutex`, recovering the data if a target panicked while holding it.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
