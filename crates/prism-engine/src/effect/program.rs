//! GPU-side objects of a linked effect program.

use std::collections::HashMap;
use std::num::NonZeroU64;

use crate::device::{CompiledShader, Current, PipelineKey, DEPTH_FORMAT};
use crate::error::Result;
use crate::mesh::{Vertex, VertexAttrib};
use crate::shader::{BindingKind, ProgramLayout, UniformBlock};

// ── blend ─────────────────────────────────────────────────────────────────

pub(crate) fn premul_alpha_blend() -> wgpu::BlendState {
    wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
    }
}

// ── program ───────────────────────────────────────────────────────────────

/// Texture resources of one pass.
pub(crate) struct PassTextures {
    pub input: wgpu::TextureView,
    pub placeholder: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub active_texture: u32,
}

pub(crate) struct ProgramGpu {
    pub share_group: u64,
    vertex: CompiledShader,
    fragment: CompiledShader,
    bind_group_layouts: Vec<wgpu::BindGroupLayout>,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_buffers: HashMap<(u32, u32), wgpu::Buffer>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl ProgramGpu {
    pub fn new(
        cx: &Current<'_>,
        label: &str,
        vertex_source: &str,
        fragment_source: &str,
        layout: &ProgramLayout,
    ) -> Result<Self> {
        let vertex = cx.vertex_shader_with_source(vertex_source)?;
        let fragment = cx.fragment_shader_with_source(fragment_source)?;
        let device = cx.device();

        let bind_group_layouts: Vec<_> = (0..layout.group_count())
            .map(|group| {
                let entries: Vec<_> = layout
                    .bindings_in(group)
                    .map(|slot| wgpu::BindGroupLayoutEntry {
                        binding: slot.binding,
                        visibility: slot.visibility,
                        ty: match slot.kind {
                            BindingKind::UniformBuffer { size } => wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: NonZeroU64::new(size as u64),
                            },
                            BindingKind::Texture => wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            BindingKind::Sampler => {
                                wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
                            }
                        },
                        count: None,
                    })
                    .collect();
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&format!("{label} bgl {group}")),
                    entries: &entries,
                })
            })
            .collect();

        let bgl_refs: Vec<_> = bind_group_layouts.iter().collect();
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{label} pipeline layout")),
            bind_group_layouts: &bgl_refs,
            immediate_size: 0,
        });

        let uniform_buffers = layout
            .uniform_buffers()
            .map(|(slot, size)| {
                let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("{label} uniforms {}:{}", slot.group, slot.binding)),
                    size: size as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                ((slot.group, slot.binding), buffer)
            })
            .collect();

        log::debug!("{label}: realized {} bind groups", bind_group_layouts.len());

        Ok(Self {
            share_group: cx.share_group(),
            vertex,
            fragment,
            bind_group_layouts,
            pipeline_layout,
            uniform_buffers,
            pipelines: HashMap::new(),
        })
    }

    /// Uploads staging blocks whose bytes changed since their last upload.
    pub fn upload_uniforms(&self, queue: &wgpu::Queue, blocks: &mut [UniformBlock]) {
        for block in blocks {
            let Some(buffer) = self.uniform_buffers.get(&(block.group, block.binding)) else {
                continue;
            };
            if let Some(bytes) = block.take_dirty() {
                queue.write_buffer(buffer, 0, bytes);
            }
        }
    }

    /// Builds one bind group per group index. The input goes to the texture
    /// slot at `active_texture`; other texture slots get the placeholder.
    pub fn bind_groups(
        &self,
        device: &wgpu::Device,
        layout: &ProgramLayout,
        textures: &PassTextures,
    ) -> Vec<wgpu::BindGroup> {
        let mut texture_index = 0u32;
        self.bind_group_layouts
            .iter()
            .enumerate()
            .map(|(group, bgl)| {
                let entries: Vec<_> = layout
                    .bindings_in(group as u32)
                    .filter_map(|slot| {
                        let resource = match slot.kind {
                            BindingKind::UniformBuffer { .. } => self
                                .uniform_buffers
                                .get(&(slot.group, slot.binding))?
                                .as_entire_binding(),
                            BindingKind::Texture => {
                                let view = if texture_index == textures.active_texture {
                                    &textures.input
                                } else {
                                    &textures.placeholder
                                };
                                texture_index += 1;
                                wgpu::BindingResource::TextureView(view)
                            }
                            BindingKind::Sampler => wgpu::BindingResource::Sampler(&textures.sampler),
                        };
                        Some(wgpu::BindGroupEntry {
                            binding: slot.binding,
                            resource,
                        })
                    })
                    .collect();
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("prism effect bind group"),
                    layout: bgl,
                    entries: &entries,
                })
            })
            .collect()
    }

    pub fn pipeline(
        &mut self,
        device: &wgpu::Device,
        key: PipelineKey,
        layout: &ProgramLayout,
        attributes: &[(VertexAttrib, u32)],
    ) -> &wgpu::RenderPipeline {
        let Self {
            vertex,
            fragment,
            pipeline_layout,
            pipelines,
            ..
        } = self;

        pipelines.entry(key).or_insert_with(|| {
            log::debug!("building pipeline for {key:?}");

            let vertex_attributes: Vec<_> = attributes
                .iter()
                .map(|&(attrib, location)| wgpu::VertexAttribute {
                    format: attrib.format(),
                    offset: attrib.offset(),
                    shader_location: location,
                })
                .collect();

            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("prism effect pipeline"),
                layout: Some(&*pipeline_layout),

                vertex: wgpu::VertexState {
                    module: vertex.module(),
                    entry_point: Some(&layout.vertex_entry),
                    compilation_options: Default::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: Vertex::STRIDE,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &vertex_attributes,
                    }],
                },

                fragment: Some(wgpu::FragmentState {
                    module: fragment.module(),
                    entry_point: Some(&layout.fragment_entry),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: key.color_format,
                        blend: Some(if key.blend {
                            premul_alpha_blend()
                        } else {
                            wgpu::BlendState::REPLACE
                        }),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),

                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: key.cull_face.to_wgpu(),
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },

                depth_stencil: key.depth_stencil.then(|| depth_stencil_state(&key)),
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        })
    }
}

fn depth_stencil_state(key: &PipelineKey) -> wgpu::DepthStencilState {
    let stencil = if key.stencil_test {
        let face = wgpu::StencilFaceState {
            compare: wgpu::CompareFunction::Always,
            fail_op: wgpu::StencilOperation::Keep,
            depth_fail_op: wgpu::StencilOperation::Keep,
            pass_op: wgpu::StencilOperation::IncrementClamp,
        };
        wgpu::StencilState {
            front: face,
            back: face,
            read_mask: 0xff,
            write_mask: 0xff,
        }
    } else {
        wgpu::StencilState::default()
    };

    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: key.depth_test,
        depth_compare: if key.depth_test {
            wgpu::CompareFunction::LessEqual
        } else {
            wgpu::CompareFunction::Always
        },
        stencil,
        bias: wgpu::DepthBiasState::default(),
    }
}
