use crate::coords::Extent;

use super::target::OffscreenTarget;

/// Where the root of an effect tree renders: an acquired drawable frame or an
/// offscreen target.
///
/// A surface-backed destination is short-lived and must be presented (or
/// dropped) promptly. Holding the surface texture prevents acquisition of
/// subsequent frames.
pub struct Destination {
    view: wgpu::TextureView,
    extent: Extent,
    format: wgpu::TextureFormat,
    surface_texture: Option<wgpu::SurfaceTexture>,
}

impl Destination {
    pub(crate) fn from_surface(
        surface_texture: wgpu::SurfaceTexture,
        extent: Extent,
        format: wgpu::TextureFormat,
    ) -> Self {
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            view,
            extent,
            format,
            surface_texture: Some(surface_texture),
        }
    }

    pub fn offscreen(target: &OffscreenTarget) -> Self {
        Self {
            view: target.view().clone(),
            extent: target.extent(),
            format: target.format(),
            surface_texture: None,
        }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn is_presentable(&self) -> bool {
        self.surface_texture.is_some()
    }

    /// Presents a surface frame. Offscreen destinations are simply released.
    pub(crate) fn present(self) {
        if let Some(surface_texture) = self.surface_texture {
            surface_texture.present();
        }
    }
}
