//! Time subsystem.
//!
//! Provides stable, testable tick timing without coupling to the runtime.
//! Timestamps are supplied by the caller (display refresh times), so the
//! clock can be driven deterministically in tests.

mod frame_clock;

pub use frame_clock::{FrameClock, FrameTime};
