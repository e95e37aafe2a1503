//! Prism engine crate.
//!
//! GPU effect composition (shader programs chained into composites and
//! rendered through intermediate targets) plus the display-synchronized
//! scheduler that drives update and render callbacks.

pub mod core;
pub mod coords;
pub mod device;
pub mod effect;
pub mod error;
pub mod logging;
pub mod mesh;
pub mod paint;
pub mod scheduler;
pub mod shader;
pub mod time;
pub mod window;

pub use effect::builtin as effects;
pub use effect::{BlurEffect, ClothEffect, CompositeEffect, Effect, ShaderEffect};
pub use error::{EffectError, Result};
