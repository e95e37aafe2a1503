//! WGSL sources compiled into the crate.
//!
//! Effects share [`EFFECT_VERT`]: `@group(0) @binding(0)` holds the
//! `Transform` block (`mvp`, `model_view`, `normal_matrix`), and fragment
//! stages read their input from `@group(1) @binding(0)` with the sampler at
//! `@binding(1)`. Effect parameters live in `@group(0) @binding(1)`.

pub const EFFECT_VERT: &str = include_str!("shaders/effect.vert.wgsl");
pub const PASSTHROUGH_FRAG: &str = include_str!("shaders/passthrough.frag.wgsl");
pub const GRAYSCALE_FRAG: &str = include_str!("shaders/grayscale.frag.wgsl");
pub const BLUR_FRAG: &str = include_str!("shaders/blur.frag.wgsl");
pub const CLOTH_VERT: &str = include_str!("shaders/cloth.vert.wgsl");
pub const CLOTH_FRAG: &str = include_str!("shaders/cloth.frag.wgsl");

/// Library names of the built-in sources.
pub const ALL: [(&str, &str); 6] = [
    ("effect.vert", EFFECT_VERT),
    ("passthrough.frag", PASSTHROUGH_FRAG),
    ("grayscale.frag", GRAYSCALE_FRAG),
    ("blur.frag", BLUR_FRAG),
    ("cloth.vert", CLOTH_VERT),
    ("cloth.frag", CLOTH_FRAG),
];
