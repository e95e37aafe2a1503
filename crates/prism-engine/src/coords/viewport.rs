use super::Extent;

/// Viewport rectangle in physical pixels, origin top-left.
///
/// Applied to the pass that renders into the final destination. Intermediate
/// effect targets always cover their full extent.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Viewport covering all of `extent`.
    #[inline]
    pub fn full(extent: Extent) -> Self {
        Self::new(0.0, 0.0, extent.width as f32, extent.height as f32)
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.width > 0.0 && self.height > 0.0 && self.width.is_finite() && self.height.is_finite()
    }

    /// Clips the viewport to `extent`; wgpu rejects viewports outside the attachment.
    ///
    /// Returns `None` when nothing of the viewport remains.
    pub fn clipped_to(self, extent: Extent) -> Option<Self> {
        if !self.is_valid() {
            return None;
        }
        let max_w = extent.width as f32;
        let max_h = extent.height as f32;
        let x0 = self.x.clamp(0.0, max_w);
        let y0 = self.y.clamp(0.0, max_h);
        let x1 = (self.x + self.width).clamp(0.0, max_w);
        let y1 = (self.y + self.height).clamp(0.0, max_h);
        let clipped = Self::new(x0, y0, x1 - x0, y1 - y0);
        clipped.is_valid().then_some(clipped)
    }
}
