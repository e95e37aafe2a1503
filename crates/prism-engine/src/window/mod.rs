//! Window host for effect views.
//!
//! Owns the `winit` EventLoop and Window, binds the window's surface to a
//! [`GraphicsContext`](crate::device::GraphicsContext) and drives an
//! [`EffectView`] from window redraws.

mod runtime;
mod view;

pub use runtime::{Runtime, ViewConfig};
pub use view::{EffectScene, EffectView};
