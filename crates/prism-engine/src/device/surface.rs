use crate::coords::Extent;
use crate::error::{EffectError, Result};

use super::frame::Destination;

/// Slot a [`Drawable`] is bound to on its context.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct RenderbufferId(pub u32);

impl RenderbufferId {
    pub const MAIN: RenderbufferId = RenderbufferId(0);
}

/// High-level response after a surface error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; rendering may resume next frame.
    Reconfigured,
    /// Transient error; skip the current frame.
    SkipFrame,
    /// Fatal error (commonly OOM); terminate gracefully.
    Fatal,
}

/// A presentable surface plus its configuration.
///
/// Created on the window's thread by
/// [`GraphicsContext::create_drawable`](super::GraphicsContext::create_drawable),
/// then handed to the context with `renderbuffer_storage`, which configures it.
pub struct Drawable {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    extent: Extent,
    share_group: u64,
    configured: bool,
}

impl Drawable {
    pub(crate) fn new(
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
        extent: Extent,
        share_group: u64,
    ) -> Self {
        Self {
            surface,
            config,
            extent,
            share_group,
            configured: false,
        }
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub(crate) fn share_group(&self) -> u64 {
        self.share_group
    }

    /// wgpu does not support configuring a surface with a 0x0 size; in that
    /// case configuration is deferred until the next non-empty resize.
    pub(crate) fn configure(&mut self, device: &wgpu::Device) {
        if self.extent.is_empty() {
            self.configured = false;
            return;
        }
        self.config.width = self.extent.width;
        self.config.height = self.extent.height;
        self.surface.configure(device, &self.config);
        self.configured = true;
    }

    pub(crate) fn resize(&mut self, device: &wgpu::Device, extent: Extent) {
        if extent == self.extent && self.configured {
            return;
        }
        self.extent = extent;
        self.configure(device);
    }

    /// Acquires the next frame. `Ok(None)` means skip this frame.
    pub(crate) fn acquire(&mut self, device: &wgpu::Device) -> Result<Option<Destination>> {
        if !self.configured {
            return Ok(None);
        }

        match self.surface.get_current_texture() {
            Ok(surface_texture) => Ok(Some(Destination::from_surface(
                surface_texture,
                self.extent,
                self.config.format,
            ))),
            Err(err) => match map_surface_error(&self.surface, device, &self.config, self.extent, &err) {
                SurfaceErrorAction::Reconfigured | SurfaceErrorAction::SkipFrame => {
                    log::debug!("skipping frame: {err}");
                    Ok(None)
                }
                SurfaceErrorAction::Fatal => Err(EffectError::resource(format!("surface failed: {err}"))),
            },
        }
    }
}

pub(crate) fn surface_config(
    caps: &wgpu::SurfaceCapabilities,
    extent: Extent,
    config: &super::ContextConfig,
) -> Result<wgpu::SurfaceConfiguration> {
    let format = choose_surface_format(caps, config.prefer_srgb)
        .ok_or_else(|| EffectError::resource("no supported surface formats"))?;

    Ok(wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: extent.width.max(1),
        height: extent.height.max(1),
        present_mode: config.present_mode,
        alpha_mode: choose_alpha_mode(caps, config.alpha_mode),
        view_formats: vec![],
        desired_maximum_frame_latency: config.desired_maximum_frame_latency,
    })
}

pub(crate) fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    if caps.formats.is_empty() {
        return None;
    }

    if prefer_srgb {
        let preferred = [
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ];
        if let Some(f) = preferred.into_iter().find(|f| caps.formats.contains(f)) {
            return Some(f);
        }
    }

    Some(caps.formats[0])
}

pub(crate) fn choose_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

fn map_surface_error(
    surface: &wgpu::Surface,
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
    extent: Extent,
    err: &wgpu::SurfaceError,
) -> SurfaceErrorAction {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
            if !extent.is_empty() {
                surface.configure(device, config);
            }
            SurfaceErrorAction::Reconfigured
        }
        wgpu::SurfaceError::OutOfMemory => SurfaceErrorAction::Fatal,
        wgpu::SurfaceError::Timeout => SurfaceErrorAction::SkipFrame,
        wgpu::SurfaceError::Other => SurfaceErrorAction::SkipFrame,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(formats: Vec<wgpu::TextureFormat>, alpha_modes: Vec<wgpu::CompositeAlphaMode>) -> wgpu::SurfaceCapabilities {
        wgpu::SurfaceCapabilities {
            formats,
            alpha_modes,
            ..Default::default()
        }
    }

    #[test]
    fn srgb_format_preferred_when_available() {
        let c = caps(
            vec![wgpu::TextureFormat::Bgra8Unorm, wgpu::TextureFormat::Rgba8UnormSrgb],
            vec![],
        );
        assert_eq!(choose_surface_format(&c, true), Some(wgpu::TextureFormat::Rgba8UnormSrgb));
        assert_eq!(choose_surface_format(&c, false), Some(wgpu::TextureFormat::Bgra8Unorm));
    }

    #[test]
    fn no_formats_means_no_choice() {
        assert_eq!(choose_surface_format(&caps(vec![], vec![]), true), None);
    }

    #[test]
    fn unsupported_alpha_mode_falls_back() {
        let c = caps(vec![], vec![wgpu::CompositeAlphaMode::Opaque]);
        assert_eq!(
            choose_alpha_mode(&c, Some(wgpu::CompositeAlphaMode::PreMultiplied)),
            wgpu::CompositeAlphaMode::Opaque
        );
        assert_eq!(choose_alpha_mode(&caps(vec![], vec![]), None), wgpu::CompositeAlphaMode::Auto);
    }
}
