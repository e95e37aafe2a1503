//! WGSL compilation, reflection and uniform encoding.
//!
//! Compilation runs on the CPU through naga, so shader errors surface when an
//! effect is linked rather than on the first draw.

pub mod builtin;
mod reflect;
mod source;
mod uniform;

pub use reflect::{
    compile, BindingKind, BindingSlot, ProgramLayout, StageReflection, VertexInput, MAX_BIND_GROUPS,
};
pub use source::ShaderLibrary;
pub use uniform::{ScalarKind, UniformLocation, UniformType, UniformValue};

pub(crate) use uniform::UniformBlock;
