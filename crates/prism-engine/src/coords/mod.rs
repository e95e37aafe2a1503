//! Pixel-space geometry shared by the context and the effect engine.
//!
//! All sizes are physical pixels. Texture space follows wgpu: origin
//! top-left, +Y down.

mod extent;
mod viewport;

pub use extent::Extent;
pub use viewport::Viewport;
