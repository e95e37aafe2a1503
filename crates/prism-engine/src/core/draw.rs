use crate::coords::Extent;

/// Per-pass context handed to [`Renderable::render`](super::Renderable::render).
///
/// Lifetimes:
/// - `'a` is the duration of the render callback
/// - `'p` is the render-pass lifetime (borrow of the frame's command encoder)
pub struct DrawContext<'a, 'p> {
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    pass: &'a mut wgpu::RenderPass<'p>,
    level_of_detail: u32,
    extent: Extent,
}

impl<'a, 'p> DrawContext<'a, 'p> {
    pub(crate) fn new(
        device: &'a wgpu::Device,
        queue: &'a wgpu::Queue,
        pass: &'a mut wgpu::RenderPass<'p>,
        level_of_detail: u32,
        extent: Extent,
    ) -> Self {
        Self {
            device,
            queue,
            pass,
            level_of_detail,
            extent,
        }
    }

    #[inline]
    pub fn device(&self) -> &wgpu::Device {
        self.device
    }

    #[inline]
    pub fn queue(&self) -> &wgpu::Queue {
        self.queue
    }

    /// The render pass with the active effect's pipeline and bind groups set.
    #[inline]
    pub fn pass(&mut self) -> &mut wgpu::RenderPass<'p> {
        self.pass
    }

    /// The active effect's preferred tessellation level.
    #[inline]
    pub fn level_of_detail(&self) -> u32 {
        self.level_of_detail
    }

    /// Extent of the target being rendered into.
    #[inline]
    pub fn extent(&self) -> Extent {
        self.extent
    }
}
