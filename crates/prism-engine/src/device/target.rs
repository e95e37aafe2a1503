use std::collections::HashMap;

use crate::coords::Extent;

/// Color format of composite intermediates.
pub const INTERMEDIATE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Depth attachment format used when depth or stencil testing is enabled.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

/// A color texture that can be rendered into, sampled and read back.
#[derive(Debug)]
pub struct OffscreenTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    extent: Extent,
    format: wgpu::TextureFormat,
}

impl OffscreenTarget {
    pub(crate) fn new(device: &wgpu::Device, label: &str, extent: Extent, format: wgpu::TextureFormat) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent.to_wgpu(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            extent,
            format,
        }
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
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
}

/// Per-extent attachments that live only while frames keep using them.
///
/// Entries not requested since the previous [`end_frame`](Self::end_frame)
/// are dropped there, so resizes do not accumulate stale textures.
pub(crate) struct FramePool<V> {
    entries: HashMap<Extent, (V, bool)>,
}

impl<V> Default for FramePool<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<V: Clone> FramePool<V> {
    pub fn get_or_insert_with(&mut self, extent: Extent, create: impl FnOnce() -> V) -> V {
        let (value, used) = self.entries.entry(extent).or_insert_with(|| (create(), false));
        *used = true;
        value.clone()
    }

    pub fn end_frame(&mut self) {
        self.entries.retain(|_, (_, used)| std::mem::take(used));
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Row pitch for texture-to-buffer copies (wgpu requires 256-byte alignment).
pub(crate) fn padded_bytes_per_row(width: u32, bytes_per_pixel: u32) -> u32 {
    let unpadded = width * bytes_per_pixel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Strips row padding from a mapped readback buffer.
pub(crate) fn unpad_rows(mapped: &[u8], extent: Extent, bytes_per_pixel: u32, padded_row: u32) -> Vec<u8> {
    let row_bytes = (extent.width * bytes_per_pixel) as usize;
    let padded_row = padded_row as usize;
    let mut out = Vec::with_capacity(row_bytes * extent.height as usize);
    for row in 0..extent.height as usize {
        let start = row * padded_row;
        out.extend_from_slice(&mapped[start..start + row_bytes]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_pool_keeps_only_extents_in_use() {
        let mut pool = FramePool::default();
        let mut created = 0;
        for width in 100..150 {
            pool.get_or_insert_with(Extent::new(width, 100), || {
                created += 1;
                width
            });
            pool.end_frame();
        }
        assert_eq!(created, 50);
        assert_eq!(pool.len(), 1);

        // Two extents in one frame both survive; a later frame reuses them.
        pool.get_or_insert_with(Extent::new(64, 64), || 1);
        pool.get_or_insert_with(Extent::new(32, 32), || 2);
        pool.end_frame();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get_or_insert_with(Extent::new(32, 32), || 99), 2);
        pool.end_frame();
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn rows_pad_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(1, 4), 256);
        assert_eq!(padded_bytes_per_row(64, 4), 256);
        assert_eq!(padded_bytes_per_row(65, 4), 512);
    }

    #[test]
    fn unpad_keeps_only_pixel_bytes() {
        let extent = Extent::new(2, 2);
        let mut mapped = vec![0u8; 512];
        mapped[..8].copy_from_slice(&[1; 8]);
        mapped[256..264].copy_from_slice(&[2; 8]);
        let out = unpad_rows(&mapped, extent, 4, 256);
        assert_eq!(out.len(), 16);
        assert!(out[..8].iter().all(|&b| b == 1));
        assert!(out[8..].iter().all(|&b| b == 2));
    }
}
