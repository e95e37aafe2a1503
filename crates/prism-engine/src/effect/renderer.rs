use crate::coords::Extent;
use crate::core::Renderable;
use crate::device::{Current, Destination, RenderbufferId, TextureHandle, INTERMEDIATE_FORMAT};
use crate::error::{EffectError, Result};

use super::composite::Stage;
use super::plan::{FramePlan, PassInput, PassOutput, PassStep};
use super::shader_effect::PassBinding;
use super::Effect;

/// Renders `content` through `effect` into `destination`.
///
/// Executes the tree's [`FramePlan`] in one command encoder and one queue
/// submission. `content_texture` is bound as the input of the pass that draws
/// the content; without it that pass samples a transparent placeholder.
/// Intermediate targets are (re)allocated as the plan requires.
pub fn render_effect(
    cx: &mut Current<'_>,
    effect: &mut Effect,
    content: &mut dyn Renderable,
    content_texture: Option<&TextureHandle>,
    destination: &Destination,
) -> Result<()> {
    cx.ensure_current()?;
    if !effect.is_linked() {
        return Err(EffectError::NotLinked);
    }
    if destination.extent().is_empty() {
        return Err(EffectError::resource("destination has zero size"));
    }

    let result = execute(cx, effect, content, content_texture, destination);
    effect.reset_stages();
    result
}

/// Acquires the drawable bound to `id`, renders into it and presents.
///
/// Returns `Ok(false)` when no frame could be acquired and the frame was skipped.
pub fn render_to_renderbuffer(
    cx: &mut Current<'_>,
    id: RenderbufferId,
    effect: &mut Effect,
    content: &mut dyn Renderable,
    content_texture: Option<&TextureHandle>,
) -> Result<bool> {
    let Some(destination) = cx.acquire_renderbuffer(id)? else {
        return Ok(false);
    };
    render_effect(cx, effect, content, content_texture, &destination)?;
    cx.present_renderbuffer(destination)?;
    Ok(true)
}

struct PassIo {
    input: Option<wgpu::TextureView>,
    input_extent: Extent,
    output: wgpu::TextureView,
    output_format: wgpu::TextureFormat,
    clear: wgpu::Color,
}

fn execute(
    cx: &mut Current<'_>,
    effect: &mut Effect,
    content: &mut dyn Renderable,
    content_texture: Option<&TextureHandle>,
    destination: &Destination,
) -> Result<()> {
    let content_input = match content_texture {
        Some(handle) => {
            let texture = handle
                .upgrade()
                .ok_or_else(|| EffectError::resource("content texture is no longer cached"))?;
            Some((texture.view.clone(), texture.extent))
        }
        None => None,
    };

    cx.flush_state()?;
    let state = cx.applied_state().clone();

    let plan = FramePlan::build(effect, destination.extent());
    for request in &plan.targets {
        let composite = effect
            .node_mut(&request.node)
            .and_then(Effect::as_composite_mut)
            .ok_or_else(|| EffectError::context_state("effect tree does not match its plan"))?;
        composite.ensure_target(cx, request.extent, INTERMEDIATE_FORMAT)?;
    }

    effect.reset_stages();
    let mut encoder = cx
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("prism effect encoder"),
        });

    for step in &plan.steps {
        let io = pass_io(effect, step, content_input.as_ref(), destination, state.clear_color.to_wgpu())?;
        let depth = state
            .needs_depth_attachment()
            .then(|| cx.depth_view(step.output_extent));

        effect.enter_path(&step.node);
        let leaf = effect
            .node_mut(&step.node)
            .and_then(Effect::as_shader_mut)
            .ok_or_else(|| EffectError::context_state("effect tree does not match its plan"))?;
        let lod = leaf.preferred_level_of_detail();

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("prism effect pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &io.output,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(io.clear),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: depth.as_ref().map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(0),
                    store: wgpu::StoreOp::Store,
                }),
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        let binding = PassBinding {
            input: io.input.as_ref(),
            input_extent: io.input_extent,
            output_extent: step.output_extent,
            output_format: io.output_format,
            to_destination: step.renders_to_destination(),
            blend: step.draws_content(),
        };
        leaf.prepare_to_draw(cx, &mut pass, &binding)?;

        if step.draws_content() {
            cx.draw_content(content, &mut pass, lod, step.output_extent);
        } else {
            cx.draw_blit(&mut pass, lod, step.output_extent);
        }
    }

    cx.queue().submit([encoder.finish()]);
    cx.end_frame();
    log::trace!("effect frame: {} passes", plan.steps.len());
    Ok(())
}

fn pass_io(
    effect: &Effect,
    step: &PassStep,
    content: Option<&(wgpu::TextureView, Extent)>,
    destination: &Destination,
    clear_color: wgpu::Color,
) -> Result<PassIo> {
    let target_of = |node: &[Stage]| {
        effect
            .node(node)
            .and_then(Effect::as_composite)
            .and_then(|c| c.target())
            .ok_or_else(|| EffectError::resource("intermediate target was not allocated"))
    };

    let (input, input_extent) = match &step.input {
        PassInput::Content => match content {
            Some((view, extent)) => (Some(view.clone()), *extent),
            None => (None, step.output_extent),
        },
        PassInput::Target(node) => {
            let target = target_of(node.as_slice())?;
            (Some(target.view().clone()), target.extent())
        }
    };

    let (output, output_format, clear) = match &step.output {
        PassOutput::Destination => (destination.view().clone(), destination.format(), clear_color),
        PassOutput::Target(node) => {
            let target = target_of(node.as_slice())?;
            (target.view().clone(), target.format(), wgpu::Color::TRANSPARENT)
        }
    };

    Ok(PassIo {
        input,
        input_extent,
        output,
        output_format,
        clear,
    })
}
