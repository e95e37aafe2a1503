/// Size of a render target or texture in physical pixels.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Halves both dimensions `level` times, never going below 1x1.
    ///
    /// A zero extent stays zero so allocation can reject it.
    pub fn downsampled(self, level: u32) -> Self {
        if self.is_empty() {
            return self;
        }
        let level = level.min(31);
        Self {
            width: (self.width >> level).max(1),
            height: (self.height >> level).max(1),
        }
    }

    /// Size of one texel in normalized texture coordinates.
    pub fn texel_size(self) -> [f32; 2] {
        [
            1.0 / self.width.max(1) as f32,
            1.0 / self.height.max(1) as f32,
        ]
    }

    #[inline]
    pub fn as_vec2(self) -> [f32; 2] {
        [self.width as f32, self.height as f32]
    }

    pub fn to_wgpu(self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

impl From<winit::dpi::PhysicalSize<u32>> for Extent {
    fn from(size: winit::dpi::PhysicalSize<u32>) -> Self {
        Self::new(size.width, size.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downsample_level_zero_is_identity() {
        assert_eq!(Extent::new(256, 128).downsampled(0), Extent::new(256, 128));
    }

    #[test]
    fn downsample_halves_per_level() {
        assert_eq!(Extent::new(256, 256).downsampled(1), Extent::new(128, 128));
        assert_eq!(Extent::new(256, 100).downsampled(2), Extent::new(64, 25));
    }

    #[test]
    fn downsample_never_collapses_to_zero() {
        assert_eq!(Extent::new(3, 1).downsampled(4), Extent::new(1, 1));
    }

    #[test]
    fn empty_extent_stays_empty() {
        assert!(Extent::new(0, 64).downsampled(1).is_empty());
    }

    #[test]
    fn texel_size_is_reciprocal() {
        assert_eq!(Extent::new(4, 2).texel_size(), [0.25, 0.5]);
    }
}
