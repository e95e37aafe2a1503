use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::coords::Extent;
use crate::error::{EffectError, Result};

static NEXT_PIXEL_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Channel layout of a [`PixelBuffer`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PixelFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
}

impl PixelFormat {
    pub const BYTES_PER_PIXEL: u32 = 4;

    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            PixelFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            PixelFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        }
    }
}

#[derive(Debug)]
struct PixelData {
    id: u64,
    extent: Extent,
    format: PixelFormat,
    bytes: Vec<u8>,
}

/// Immutable CPU image shared between the producer and the texture cache.
///
/// Clones share storage and identity; the cache keys on that identity and
/// drops its GPU copy once every clone is gone.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    data: Arc<PixelData>,
}

impl PixelBuffer {
    /// `bytes` must hold exactly `width * height` tightly packed pixels.
    pub fn new(extent: Extent, format: PixelFormat, bytes: Vec<u8>) -> Result<Self> {
        if extent.is_empty() {
            return Err(EffectError::resource("pixel buffer has zero size"));
        }
        let expected = extent.width as usize * extent.height as usize * PixelFormat::BYTES_PER_PIXEL as usize;
        if bytes.len() != expected {
            return Err(EffectError::resource(format!(
                "pixel buffer of {}x{} needs {expected} bytes, got {}",
                extent.width,
                extent.height,
                bytes.len()
            )));
        }
        Ok(Self {
            data: Arc::new(PixelData {
                id: NEXT_PIXEL_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
                extent,
                format,
                bytes,
            }),
        })
    }

    /// Buffer filled with one RGBA8 color.
    pub fn solid(extent: Extent, rgba: [u8; 4]) -> Result<Self> {
        let count = extent.width as usize * extent.height as usize;
        Self::new(extent, PixelFormat::Rgba8Unorm, rgba.repeat(count))
    }

    pub fn id(&self) -> u64 {
        self.data.id
    }

    pub fn extent(&self) -> Extent {
        self.data.extent
    }

    pub fn format(&self) -> PixelFormat {
        self.data.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data.bytes
    }

    fn downgrade(&self) -> Weak<PixelData> {
        Arc::downgrade(&self.data)
    }
}

struct Entry<T> {
    source: Weak<PixelData>,
    value: Arc<T>,
}

/// Maps pixel buffers to values derived from them (GPU textures in practice).
///
/// Holds the source weakly and hands out weak references to the value, so a
/// handle dies with either the buffer or a [`flush`](Self::flush).
pub struct TextureCache<T> {
    entries: HashMap<u64, Entry<T>>,
}

impl<T> Default for TextureCache<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> TextureCache<T> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the cached value for `buffer`, creating it with `create` on a miss.
    pub fn get_or_insert_with(
        &mut self,
        buffer: &PixelBuffer,
        create: impl FnOnce(&PixelBuffer) -> Result<T>,
    ) -> Result<Weak<T>> {
        self.prune();
        if let Some(entry) = self.entries.get(&buffer.id()) {
            return Ok(Arc::downgrade(&entry.value));
        }

        let value = Arc::new(create(buffer)?);
        let weak = Arc::downgrade(&value);
        self.entries.insert(
            buffer.id(),
            Entry {
                source: buffer.downgrade(),
                value,
            },
        );
        Ok(weak)
    }

    /// Drops entries whose pixel buffer no longer exists.
    pub fn prune(&mut self) {
        self.entries.retain(|_, e| e.source.strong_count() > 0);
    }

    pub fn flush(&mut self) {
        self.entries.clear();
    }
}

/// GPU copy of a pixel buffer.
#[derive(Debug)]
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub extent: Extent,
}

/// Weak handle returned by `texture_with_pixel_buffer`.
#[derive(Debug, Clone)]
pub struct TextureHandle {
    texture: Weak<GpuTexture>,
    source: Weak<PixelData>,
    extent: Extent,
}

impl TextureHandle {
    pub(crate) fn new(texture: Weak<GpuTexture>, buffer: &PixelBuffer) -> Self {
        Self {
            texture,
            source: buffer.downgrade(),
            extent: buffer.extent(),
        }
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// False once the cache was flushed or the pixel buffer dropped.
    pub fn is_valid(&self) -> bool {
        self.source.strong_count() > 0 && self.texture.strong_count() > 0
    }

    pub fn upgrade(&self) -> Option<Arc<GpuTexture>> {
        if self.source.strong_count() == 0 {
            return None;
        }
        self.texture.upgrade()
    }
}

pub(crate) fn upload(device: &wgpu::Device, queue: &wgpu::Queue, buffer: &PixelBuffer) -> GpuTexture {
    upload_bytes(
        device,
        queue,
        "prism pixel buffer",
        buffer.extent(),
        buffer.format().to_wgpu(),
        buffer.bytes(),
    )
}

pub(crate) fn upload_bytes(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    extent: Extent,
    format: wgpu::TextureFormat,
    bytes: &[u8],
) -> GpuTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: extent.to_wgpu(),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        bytes,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(extent.width * PixelFormat::BYTES_PER_PIXEL),
            rows_per_image: Some(extent.height),
        },
        extent.to_wgpu(),
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture { texture, view, extent }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> PixelBuffer {
        PixelBuffer::solid(Extent::new(2, 2), [255, 0, 0, 255]).unwrap()
    }

    #[test]
    fn wrong_byte_count_is_rejected() {
        let err = PixelBuffer::new(Extent::new(2, 2), PixelFormat::Rgba8Unorm, vec![0; 3]).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn clones_share_identity() {
        let a = buffer();
        let b = a.clone();
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), buffer().id());
    }

    #[test]
    fn second_lookup_hits_cache() {
        let mut cache = TextureCache::default();
        let buf = buffer();
        let mut creations = 0;
        for _ in 0..3 {
            cache
                .get_or_insert_with(&buf, |_| {
                    creations += 1;
                    Ok("texture")
                })
                .unwrap();
        }
        assert_eq!(creations, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn flush_invalidates_handles() {
        let mut cache = TextureCache::default();
        let buf = buffer();
        let weak = cache.get_or_insert_with(&buf, |_| Ok(1u32)).unwrap();
        assert!(weak.upgrade().is_some());
        cache.flush();
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn dropping_buffer_invalidates_after_prune() {
        let mut cache = TextureCache::default();
        let buf = buffer();
        let weak = cache.get_or_insert_with(&buf, |_| Ok(1u32)).unwrap();
        drop(buf);
        cache.prune();
        assert!(cache.is_empty());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn failed_creation_caches_nothing() {
        let mut cache: TextureCache<u32> = TextureCache::default();
        let buf = buffer();
        assert!(cache
            .get_or_insert_with(&buf, |_| Err(EffectError::resource("no memory")))
            .is_err());
        assert!(cache.is_empty());
    }
}
