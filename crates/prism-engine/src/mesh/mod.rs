//! Geometry fed to effects.
//!
//! Only the full-screen quad lives here; general mesh loading is left to
//! callers, who implement [`Renderable`](crate::core::Renderable) over the
//! standard [`Vertex`] layout.

mod quad;
mod vertex;

pub use quad::{QuadMesh, MAX_SUBDIVISIONS};
pub use vertex::{Vertex, VertexAttrib};
