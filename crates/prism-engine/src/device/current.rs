use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::mpsc;

use crate::coords::{Extent, Viewport};
use crate::core::{DrawContext, Renderable};
use crate::error::{CompileStage, EffectError, Result};
use crate::mesh::QuadMesh;
use crate::paint::Color;
use crate::shader::{self, StageReflection};

use super::context::DeviceShared;
use super::frame::Destination;
use super::state::{CullFace, RenderState, StateDelta, StateTracker};
use super::surface::{Drawable, RenderbufferId};
use super::target::{self, FramePool, OffscreenTarget, DEPTH_FORMAT};
use super::texture_cache::{self, GpuTexture, PixelBuffer, TextureCache, TextureHandle};

thread_local! {
    static CURRENT: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Id of the context current on the calling thread.
pub(crate) fn current_context() -> Option<u64> {
    CURRENT.get()
}

/// Marks a context current for its lifetime and restores the previous marker
/// on drop, including during unwinding.
struct CurrentGuard {
    previous: Option<u64>,
}

impl CurrentGuard {
    fn enter(context_id: u64) -> Self {
        Self {
            previous: CURRENT.replace(Some(context_id)),
        }
    }
}

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        CURRENT.set(self.previous);
    }
}

/// State owned by a context's worker thread.
#[derive(Default)]
pub(crate) struct WorkerState {
    state: StateTracker,
    textures: TextureCache<GpuTexture>,
    renderbuffers: HashMap<RenderbufferId, Drawable>,
    sampler: Option<wgpu::Sampler>,
    placeholder: Option<wgpu::TextureView>,
    blit_quads: BTreeMap<u32, QuadMesh>,
    depth_buffers: FramePool<wgpu::TextureView>,
}

/// A shader stage that passed compilation, with its GPU module.
#[derive(Debug, Clone)]
pub struct CompiledShader {
    reflection: StageReflection,
    module: wgpu::ShaderModule,
}

impl CompiledShader {
    pub fn reflection(&self) -> &StageReflection {
        &self.reflection
    }

    pub fn module(&self) -> &wgpu::ShaderModule {
        &self.module
    }
}

/// Scoped proof that a [`GraphicsContext`](super::GraphicsContext) is current.
///
/// Only handed out to work items running on the context's worker thread and
/// cannot leave it. Every GPU operation re-checks current-ness and fails with
/// [`EffectError::ContextState`] otherwise.
pub struct Current<'a> {
    context_id: u64,
    shared: &'a DeviceShared,
    local: &'a mut WorkerState,
    _guard: CurrentGuard,
    _not_send: PhantomData<*const ()>,
}

impl<'a> Current<'a> {
    pub(crate) fn enter(context_id: u64, shared: &'a DeviceShared, local: &'a mut WorkerState) -> Self {
        Self {
            context_id,
            shared,
            local,
            _guard: CurrentGuard::enter(context_id),
            _not_send: PhantomData,
        }
    }

    pub fn is_current(&self) -> bool {
        current_context() == Some(self.context_id)
    }

    pub(crate) fn ensure_current(&self) -> Result<()> {
        if self.is_current() {
            Ok(())
        } else {
            Err(EffectError::context_state(format!(
                "context {} is not current on this thread",
                self.context_id
            )))
        }
    }

    /// Fails when GPU objects created in `share_group` are used here.
    pub(crate) fn ensure_share_group(&self, share_group: u64) -> Result<()> {
        self.ensure_current()?;
        if share_group != self.shared.share_group {
            return Err(EffectError::context_state(format!(
                "objects from share group {share_group} used on a context of share group {}",
                self.shared.share_group
            )));
        }
        Ok(())
    }

    pub fn context_id(&self) -> u64 {
        self.context_id
    }

    pub fn share_group(&self) -> u64 {
        self.shared.share_group
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.shared.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.shared.queue
    }

    // ---- lazy render state ----

    /// Pending state, as the next draw will see it.
    pub fn render_state(&self) -> &RenderState {
        self.local.state.pending()
    }

    /// Restricts drawing into the destination; `None` covers all of it.
    pub fn set_viewport(&mut self, viewport: Option<Viewport>) -> Result<()> {
        self.ensure_current()?;
        self.local.state.pending_mut().viewport = viewport;
        Ok(())
    }

    pub fn set_clear_color(&mut self, color: Color) -> Result<()> {
        self.ensure_current()?;
        self.local.state.pending_mut().clear_color = color;
        Ok(())
    }

    pub fn set_depth_test_enabled(&mut self, enabled: bool) -> Result<()> {
        self.ensure_current()?;
        self.local.state.pending_mut().depth_test = enabled;
        Ok(())
    }

    pub fn set_stencil_test_enabled(&mut self, enabled: bool) -> Result<()> {
        self.ensure_current()?;
        self.local.state.pending_mut().stencil_test = enabled;
        Ok(())
    }

    pub fn set_cull_face(&mut self, cull: CullFace) -> Result<()> {
        self.ensure_current()?;
        self.local.state.pending_mut().cull_face = cull;
        Ok(())
    }

    /// Selects which texture binding of an effect receives its input.
    pub fn set_active_texture(&mut self, unit: u32) -> Result<()> {
        self.ensure_current()?;
        self.local.state.pending_mut().active_texture = unit;
        Ok(())
    }

    /// Applies pending state and reports what changed since the last flush.
    pub(crate) fn flush_state(&mut self) -> Result<StateDelta> {
        self.ensure_current()?;
        let delta = self.local.state.flush();
        if !delta.is_empty() {
            log::trace!("render state changed: {delta:?}");
        }
        Ok(delta)
    }

    pub(crate) fn applied_state(&self) -> &RenderState {
        self.local.state.applied()
    }

    // ---- shaders ----

    pub fn vertex_shader_with_source(&self, source: &str) -> Result<CompiledShader> {
        self.shader_with_source(CompileStage::Vertex, source)
    }

    pub fn fragment_shader_with_source(&self, source: &str) -> Result<CompiledShader> {
        self.shader_with_source(CompileStage::Fragment, source)
    }

    fn shader_with_source(&self, stage: CompileStage, source: &str) -> Result<CompiledShader> {
        self.ensure_current()?;
        let reflection = shader::compile(stage, source)?;
        let label = format!("prism {stage} shader");
        let module = self.shared.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        Ok(CompiledShader { reflection, module })
    }

    // ---- textures ----

    /// GPU texture for `buffer`, uploaded on first use and cached afterwards.
    pub fn texture_with_pixel_buffer(&mut self, buffer: &PixelBuffer) -> Result<TextureHandle> {
        self.ensure_current()?;
        self.ensure_texture_fits(buffer.extent())?;
        let (device, queue) = (&self.shared.device, &self.shared.queue);
        let texture = self
            .local
            .textures
            .get_or_insert_with(buffer, |b| Ok(texture_cache::upload(device, queue, b)))?;
        Ok(TextureHandle::new(texture, buffer))
    }

    /// Drops every cached texture; outstanding handles become invalid.
    pub fn flush_texture_cache(&mut self) -> Result<()> {
        self.ensure_current()?;
        log::debug!("flushing {} cached textures", self.local.textures.len());
        self.local.textures.flush();
        Ok(())
    }

    fn ensure_texture_fits(&self, extent: Extent) -> Result<()> {
        let max = self.shared.device.limits().max_texture_dimension_2d;
        if extent.is_empty() {
            return Err(EffectError::resource(format!(
                "cannot allocate a {}x{} texture",
                extent.width, extent.height
            )));
        }
        if extent.width > max || extent.height > max {
            return Err(EffectError::resource(format!(
                "{}x{} exceeds the device limit of {max}",
                extent.width, extent.height
            )));
        }
        Ok(())
    }

    // ---- drawables ----

    /// Binds `drawable` to `id` and configures it for presentation.
    pub fn renderbuffer_storage(&mut self, id: RenderbufferId, mut drawable: Drawable) -> Result<()> {
        self.ensure_share_group(drawable.share_group())?;
        drawable.configure(&self.shared.device);
        log::debug!(
            "renderbuffer {id:?} bound: {}x{} {:?}",
            drawable.extent().width,
            drawable.extent().height,
            drawable.format()
        );
        self.local.renderbuffers.insert(id, drawable);
        Ok(())
    }

    pub fn resize_renderbuffer(&mut self, id: RenderbufferId, extent: Extent) -> Result<()> {
        self.ensure_current()?;
        let shared = self.shared;
        let drawable = self
            .local
            .renderbuffers
            .get_mut(&id)
            .ok_or_else(|| EffectError::resource(format!("no drawable bound to {id:?}")))?;
        drawable.resize(&shared.device, extent);
        Ok(())
    }

    pub fn renderbuffer_extent(&self, id: RenderbufferId) -> Option<Extent> {
        self.local.renderbuffers.get(&id).map(Drawable::extent)
    }

    /// Acquires the next frame of a bound drawable. `Ok(None)` means the frame
    /// should be skipped (minimized, outdated or timed out).
    pub fn acquire_renderbuffer(&mut self, id: RenderbufferId) -> Result<Option<Destination>> {
        self.ensure_current()?;
        let device = &self.shared.device;
        let drawable = self
            .local
            .renderbuffers
            .get_mut(&id)
            .ok_or_else(|| EffectError::resource(format!("no drawable bound to {id:?}")))?;
        drawable.acquire(device)
    }

    pub fn present_renderbuffer(&mut self, destination: Destination) -> Result<()> {
        self.ensure_current()?;
        destination.present();
        Ok(())
    }

    pub fn release_renderbuffer(&mut self, id: RenderbufferId) -> Result<Option<Drawable>> {
        self.ensure_current()?;
        Ok(self.local.renderbuffers.remove(&id))
    }

    // ---- offscreen ----

    pub fn create_offscreen_target(&self, extent: Extent, format: wgpu::TextureFormat) -> Result<OffscreenTarget> {
        self.ensure_current()?;
        self.ensure_texture_fits(extent)?;
        Ok(OffscreenTarget::new(&self.shared.device, "prism offscreen target", extent, format))
    }

    pub(crate) fn allocate_target(&self, label: &str, extent: Extent, format: wgpu::TextureFormat) -> Result<OffscreenTarget> {
        self.ensure_current()?;
        self.ensure_texture_fits(extent)?;
        log::debug!("allocating {label}: {}x{}", extent.width, extent.height);
        Ok(OffscreenTarget::new(&self.shared.device, label, extent, format))
    }

    /// Copies a target back to the CPU as tightly packed rows.
    ///
    /// Blocks until the GPU finished all submitted work.
    pub fn read_pixels(&self, target: &OffscreenTarget) -> Result<Vec<u8>> {
        self.ensure_current()?;
        let (device, queue) = (&self.shared.device, &self.shared.queue);
        let extent = target.extent();
        let bytes_per_pixel = target.format().block_copy_size(None).unwrap_or(4);
        let padded_row = target::padded_bytes_per_row(extent.width, bytes_per_pixel);

        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("prism readback"),
            size: padded_row as u64 * extent.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("prism readback encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: target.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(extent.height),
                },
            },
            extent.to_wgpu(),
        );
        queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| EffectError::resource(format!("device poll failed: {e:?}")))?;
        rx.recv()
            .map_err(|_| EffectError::resource("readback channel closed"))?
            .map_err(|e| EffectError::resource(format!("readback map failed: {e:?}")))?;

        let mapped = slice.get_mapped_range();
        let pixels = target::unpad_rows(&mapped, extent, bytes_per_pixel, padded_row);
        drop(mapped);
        readback.unmap();
        Ok(pixels)
    }

    // ---- shared pass resources ----

    pub(crate) fn linear_sampler(&mut self) -> wgpu::Sampler {
        let device = &self.shared.device;
        self.local
            .sampler
            .get_or_insert_with(|| {
                device.create_sampler(&wgpu::SamplerDescriptor {
                    label: Some("prism linear sampler"),
                    address_mode_u: wgpu::AddressMode::ClampToEdge,
                    address_mode_v: wgpu::AddressMode::ClampToEdge,
                    address_mode_w: wgpu::AddressMode::ClampToEdge,
                    mag_filter: wgpu::FilterMode::Linear,
                    min_filter: wgpu::FilterMode::Linear,
                    ..Default::default()
                })
            })
            .clone()
    }

    /// 1x1 transparent texture bound to texture slots that get no input.
    pub(crate) fn placeholder_view(&mut self) -> wgpu::TextureView {
        let (device, queue) = (&self.shared.device, &self.shared.queue);
        self.local
            .placeholder
            .get_or_insert_with(|| {
                texture_cache::upload_bytes(
                    device,
                    queue,
                    "prism placeholder texture",
                    Extent::new(1, 1),
                    wgpu::TextureFormat::Rgba8Unorm,
                    &[0, 0, 0, 0],
                )
                .view
            })
            .clone()
    }

    pub(crate) fn depth_view(&mut self, extent: Extent) -> wgpu::TextureView {
        let device = &self.shared.device;
        self.local.depth_buffers.get_or_insert_with(extent, || {
            log::debug!("allocating depth buffer {}x{}", extent.width, extent.height);
            device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some("prism depth buffer"),
                    size: extent.to_wgpu(),
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: DEPTH_FORMAT,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        })
    }

    /// Drops depth buffers the finished frame did not use.
    pub(crate) fn end_frame(&mut self) {
        self.local.depth_buffers.end_frame();
    }

    /// Draws a full-screen quad tessellated for `lod`.
    pub(crate) fn draw_blit(&mut self, pass: &mut wgpu::RenderPass<'_>, lod: u32, extent: Extent) {
        let quad = self
            .local
            .blit_quads
            .entry(lod)
            .or_insert_with(|| QuadMesh::with_subdivisions(lod));
        let mut cx = DrawContext::new(&self.shared.device, &self.shared.queue, pass, lod, extent);
        quad.render(&mut cx);
    }

    pub(crate) fn draw_content(
        &self,
        content: &mut dyn Renderable,
        pass: &mut wgpu::RenderPass<'_>,
        lod: u32,
        extent: Extent,
    ) {
        let mut cx = DrawContext::new(&self.shared.device, &self.shared.queue, pass, lod, extent);
        content.render(&mut cx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_restores_previous_marker() {
        assert_eq!(current_context(), None);
        {
            let _outer = CurrentGuard::enter(1);
            assert_eq!(current_context(), Some(1));
            {
                let _inner = CurrentGuard::enter(2);
                assert_eq!(current_context(), Some(2));
            }
            assert_eq!(current_context(), Some(1));
        }
        assert_eq!(current_context(), None);
    }

    #[test]
    fn guard_clears_marker_on_unwind() {
        let result = std::panic::catch_unwind(|| {
            let _guard = CurrentGuard::enter(7);
            panic!("work item failed");
        });
        assert!(result.is_err());
        assert_eq!(current_context(), None);
    }

    #[test]
    fn marker_is_per_thread() {
        let _guard = CurrentGuard::enter(3);
        let other = std::thread::spawn(current_context).join().unwrap();
        assert_eq!(other, None);
        assert_eq!(current_context(), Some(3));
    }
}
