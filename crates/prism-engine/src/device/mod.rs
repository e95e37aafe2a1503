//! GPU context, drawables and render state.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue (one per share group)
//! - running GPU work on the context's worker thread with the context current
//! - creating & configuring drawables (swapchains) and acquiring frames
//! - lazy render state, offscreen targets and the pixel-buffer texture cache

mod context;
mod current;
mod frame;
mod init;
mod state;
mod surface;
mod target;
mod texture_cache;

pub use context::GraphicsContext;
pub use current::{CompiledShader, Current};
pub use frame::Destination;
pub use init::ContextConfig;
pub use state::{CullFace, PipelineKey, RenderState, StateDelta, StateTracker};
pub use surface::{Drawable, RenderbufferId, SurfaceErrorAction};
pub use target::{OffscreenTarget, DEPTH_FORMAT, INTERMEDIATE_FORMAT};
pub use texture_cache::{GpuTexture, PixelBuffer, PixelFormat, TextureCache, TextureHandle};
