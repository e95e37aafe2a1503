use super::DrawContext;

/// Content that can be drawn through an effect chain.
///
/// The effect engine binds the active effect's program before calling
/// `render`; implementors only bind geometry and issue draw calls. A
/// renderable that cannot draw must no-op.
pub trait Renderable {
    fn render(&mut self, cx: &mut DrawContext<'_, '_>);
}

impl<F> Renderable for F
where
    F: FnMut(&mut DrawContext<'_, '_>),
{
    fn render(&mut self, cx: &mut DrawContext<'_, '_>) {
        self(cx)
    }
}

/// Receives the scheduler's update callback once per tick, before rendering.
pub trait Updateable {
    /// `dt` is the elapsed time in seconds since the previous tick, or 0 on the
    /// first tick after the loop was started or resumed.
    fn update(&mut self, dt: f64);
}

/// Receives the scheduler's render callback once per tick.
///
/// Context-free on purpose: implementors (typically a view) hand the actual
/// GPU work to their `GraphicsContext`.
pub trait Displayable {
    fn display(&mut self);
}

/// GPU resource lifecycle for objects that own device resources.
pub trait GpuObject {
    /// Creates device resources. Idempotent.
    fn setup_gpu(&mut self, device: &wgpu::Device);

    /// Releases device resources. The object may be set up again later.
    fn teardown_gpu(&mut self);
}
