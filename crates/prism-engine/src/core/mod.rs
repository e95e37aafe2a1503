//! Core capability contracts.
//!
//! These traits are the stable interface between scene content, the effect
//! engine and the scheduler. Scene types implement the small capabilities
//! they need instead of inheriting from a base type.

mod capabilities;
mod draw;

pub use capabilities::{Displayable, GpuObject, Renderable, Updateable};
pub use draw::DrawContext;
