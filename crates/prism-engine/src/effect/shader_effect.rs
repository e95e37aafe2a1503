use std::collections::BTreeMap;
use std::sync::Arc;

use glam::{Mat3, Mat4, Vec2};

use crate::coords::{Extent, Viewport};
use crate::device::{Current, PipelineKey};
use crate::error::{CompileStage, EffectError, Result};
use crate::mesh::VertexAttrib;
use crate::shader::{self, builtin, ProgramLayout, ShaderLibrary, UniformBlock, UniformLocation, UniformValue};

use super::program::{PassTextures, ProgramGpu};

/// Highest accepted downsample level; each level halves both dimensions.
pub const MAX_DOWNSAMPLE: u32 = 4;

/// Output extent of the pass, in pixels (`vec2<f32>`).
pub const RESOLUTION_UNIFORM: &str = "resolution";
/// Size of one input texel in texture coordinates (`vec2<f32>`).
pub const TEXEL_SIZE_UNIFORM: &str = "texel_size";
/// The effect's downsample level.
pub const DOWNSAMPLE_UNIFORM: &str = "downsample";

/// How one pass feeds and consumes an effect.
pub struct PassBinding<'b> {
    /// Texture bound at the active texture unit; `None` binds a transparent placeholder.
    pub input: Option<&'b wgpu::TextureView>,
    pub input_extent: Extent,
    pub output_extent: Extent,
    pub output_format: wgpu::TextureFormat,
    /// The pass renders into the final destination, so the viewport applies.
    pub to_destination: bool,
    /// Premultiplied-alpha blending (content passes) instead of replace (blits).
    pub blend: bool,
}

struct LinkedProgram {
    layout: ProgramLayout,
    /// Attribute slot and shader location of every vertex input.
    attributes: Vec<(VertexAttrib, u32)>,
    blocks: Vec<UniformBlock>,
}

/// A vertex + fragment WGSL program with named uniforms and transforms.
///
/// Linking compiles both stages on the CPU and reflects their interface; GPU
/// objects are created lazily by the first [`prepare_to_draw`](Self::prepare_to_draw)
/// on a context. Matrices and uniform names can be set before or after
/// linking.
pub struct ShaderEffect {
    label: String,
    vertex_source: Arc<str>,
    fragment_source: Arc<str>,
    attribute_bindings: BTreeMap<String, VertexAttrib>,
    program: Option<LinkedProgram>,
    uniforms: BTreeMap<String, UniformValue>,

    projection: Mat4,
    model_view: Mat4,
    normal: Mat3,
    mvp_uniform: String,
    mv_uniform: String,
    normal_uniform: String,

    resolution: Option<Extent>,
    downsample: u32,
    base_lod: u32,

    gpu: Option<ProgramGpu>,
}

impl ShaderEffect {
    pub fn new(vertex_source: impl Into<String>, fragment_source: impl Into<String>) -> Self {
        Self {
            label: "shader effect".to_owned(),
            vertex_source: Arc::from(vertex_source.into()),
            fragment_source: Arc::from(fragment_source.into()),
            attribute_bindings: BTreeMap::new(),
            program: None,
            uniforms: BTreeMap::new(),
            projection: Mat4::IDENTITY,
            model_view: Mat4::IDENTITY,
            normal: Mat3::IDENTITY,
            mvp_uniform: "mvp".to_owned(),
            mv_uniform: "model_view".to_owned(),
            normal_uniform: "normal_matrix".to_owned(),
            resolution: None,
            downsample: 0,
            base_lod: 0,
            gpu: None,
        }
    }

    /// Image effect: the shared full-screen vertex stage plus `fragment_source`.
    pub fn image(fragment_source: impl Into<String>) -> Self {
        Self::new(builtin::EFFECT_VERT, fragment_source)
    }

    /// Resolves both stages through `library`; unknown names fail here.
    pub fn from_named(library: &ShaderLibrary, vertex: &str, fragment: &str) -> Result<Self> {
        let vertex_source = library.resolve(vertex)?;
        let fragment_source = library.resolve(fragment)?;
        Ok(Self::new(vertex_source, fragment_source).with_label(format!("{vertex} + {fragment}")))
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Base tessellation level the effect prefers at full resolution.
    pub fn with_level_of_detail(mut self, level: u32) -> Self {
        self.base_lod = level;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    // ---- linking ----

    pub fn is_linked(&self) -> bool {
        self.program.is_some()
    }

    /// Maps a vertex-shader input to a vertex attribute slot.
    ///
    /// Only effective before [`link`](Self::link).
    pub fn bind_attribute(&mut self, name: impl Into<String>, attrib: VertexAttrib) {
        let name = name.into();
        if self.is_linked() {
            log::warn!("{}: ignoring bind_attribute(`{name}`) after link", self.label);
            return;
        }
        self.attribute_bindings.insert(name, attrib);
    }

    /// Compiles and links both stages. On failure the effect stays unlinked.
    pub fn link(&mut self) -> Result<()> {
        if self.is_linked() {
            return Err(EffectError::AlreadyLinked);
        }

        let vertex = shader::compile(CompileStage::Vertex, &self.vertex_source)?;
        let fragment = shader::compile(CompileStage::Fragment, &self.fragment_source)?;
        let layout = ProgramLayout::link(&vertex, &fragment)?;

        let attributes = layout
            .vertex_inputs
            .iter()
            .map(|input| {
                self.attribute_bindings
                    .get(&input.name)
                    .copied()
                    .or_else(|| VertexAttrib::from_default_name(&input.name))
                    .map(|attrib| (attrib, input.location))
                    .ok_or_else(|| {
                        EffectError::compile(
                            CompileStage::Link,
                            format!("vertex input `{}` is not bound to an attribute", input.name),
                        )
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        for (name, value) in &self.uniforms {
            match layout.uniform(name) {
                Some(loc) => check_value(name, loc, value)?,
                None => log::warn!("{}: uniform `{name}` is not declared by the program", self.label),
            }
        }

        let blocks = layout
            .uniform_buffers()
            .map(|(slot, size)| UniformBlock::new(slot.group, slot.binding, size))
            .collect();

        log::debug!(
            "{}: linked ({} uniforms, {} bindings)",
            self.label,
            layout.uniforms.len(),
            layout.bindings.len()
        );

        self.program = Some(LinkedProgram {
            layout,
            attributes,
            blocks,
        });
        Ok(())
    }

    pub fn layout(&self) -> Option<&ProgramLayout> {
        self.program.as_ref().map(|p| &p.layout)
    }

    /// Location of a uniform, or `None` when the program does not declare it
    /// (or is not linked yet).
    pub fn uniform_loc(&self, name: &str) -> Option<UniformLocation> {
        self.layout()?.uniform(name).cloned()
    }

    /// Stores a uniform value; it is pushed on the next prepare. Once linked,
    /// unknown names and mismatched types are rejected.
    pub fn set_uniform(&mut self, name: impl Into<String>, value: impl Into<UniformValue>) -> Result<()> {
        let name = name.into();
        let value = value.into();
        if let Some(layout) = self.layout() {
            let loc = layout
                .uniform(&name)
                .ok_or_else(|| EffectError::uniform(&name, "not declared by the program"))?;
            check_value(&name, loc, &value)?;
        }
        self.uniforms.insert(name, value);
        Ok(())
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.get(name)
    }

    // ---- transforms ----

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn set_projection_matrix(&mut self, m: Mat4) {
        self.projection = m;
    }

    pub fn model_view_matrix(&self) -> Mat4 {
        self.model_view
    }

    pub fn set_model_view_matrix(&mut self, m: Mat4) {
        self.model_view = m;
    }

    pub fn normal_matrix(&self) -> Mat3 {
        self.normal
    }

    pub fn set_normal_matrix(&mut self, m: Mat3) {
        self.normal = m;
    }

    pub fn set_mvp_uniform_name(&mut self, name: impl Into<String>) {
        self.mvp_uniform = name.into();
    }

    pub fn set_mv_uniform_name(&mut self, name: impl Into<String>) {
        self.mv_uniform = name.into();
    }

    pub fn set_normal_uniform_name(&mut self, name: impl Into<String>) {
        self.normal_uniform = name.into();
    }

    // ---- sizing ----

    pub fn resolution(&self) -> Option<Extent> {
        self.resolution
    }

    /// Value of the `resolution` builtin; `None` follows the pass output.
    pub fn set_resolution(&mut self, resolution: Option<Extent>) {
        self.resolution = resolution;
    }

    pub fn downsample_level(&self) -> u32 {
        self.downsample
    }

    /// Clamped into `[0, MAX_DOWNSAMPLE]`.
    pub fn set_downsample_level(&mut self, level: u32) {
        self.downsample = level.min(MAX_DOWNSAMPLE);
    }

    pub fn preferred_level_of_detail(&self) -> u32 {
        self.base_lod.saturating_sub(self.downsample)
    }

    // ---- drawing ----

    /// Writes transforms, builtins and user uniforms into the staging blocks.
    pub(crate) fn stage_uniforms(&mut self, output_extent: Extent, input_extent: Extent) -> Result<()> {
        let program = self.program.as_mut().ok_or(EffectError::NotLinked)?;
        let resolution = self.resolution.unwrap_or(output_extent);

        let builtins = [
            (self.mvp_uniform.as_str(), UniformValue::Mat4(self.projection * self.model_view)),
            (self.mv_uniform.as_str(), UniformValue::Mat4(self.model_view)),
            (self.normal_uniform.as_str(), UniformValue::Mat3(self.normal)),
            (RESOLUTION_UNIFORM, UniformValue::Vec2(Vec2::from_array(resolution.as_vec2()))),
            (TEXEL_SIZE_UNIFORM, UniformValue::Vec2(Vec2::from_array(input_extent.texel_size()))),
            (DOWNSAMPLE_UNIFORM, UniformValue::Int(self.downsample as i32)),
        ];

        let user = self.uniforms.iter().map(|(name, value)| (name.as_str(), value.clone()));
        for (name, value) in builtins.into_iter().chain(user) {
            let Some(loc) = program.layout.uniform(name) else {
                continue;
            };
            let Some(block) = program
                .blocks
                .iter_mut()
                .find(|b| b.group == loc.group && b.binding == loc.binding)
            else {
                continue;
            };
            block
                .write(loc, &value)
                .map_err(|reason| EffectError::uniform(name, reason))?;
        }
        Ok(())
    }

    /// Binds the program for a draw into `pass`.
    ///
    /// Fails with [`EffectError::NotLinked`] before a successful link, without
    /// touching the context or the pass.
    pub fn prepare_to_draw(
        &mut self,
        cx: &mut Current<'_>,
        pass: &mut wgpu::RenderPass<'_>,
        binding: &PassBinding<'_>,
    ) -> Result<()> {
        if !self.is_linked() {
            return Err(EffectError::NotLinked);
        }
        cx.ensure_current()?;
        if let Some(gpu) = &self.gpu {
            cx.ensure_share_group(gpu.share_group)?;
        }

        cx.flush_state()?;
        let state = cx.applied_state().clone();

        self.stage_uniforms(binding.output_extent, binding.input_extent)?;

        let Some(program) = self.program.as_mut() else {
            return Err(EffectError::NotLinked);
        };

        if self.gpu.is_none() {
            let gpu = ProgramGpu::new(
                cx,
                &self.label,
                &self.vertex_source,
                &self.fragment_source,
                &program.layout,
            )?;
            program.blocks.iter_mut().for_each(UniformBlock::invalidate);
            self.gpu = Some(gpu);
        }
        let Some(gpu) = self.gpu.as_mut() else {
            return Err(EffectError::NotLinked);
        };

        gpu.upload_uniforms(cx.queue(), &mut program.blocks);

        let placeholder = cx.placeholder_view();
        let textures = PassTextures {
            input: binding.input.cloned().unwrap_or_else(|| placeholder.clone()),
            placeholder,
            sampler: cx.linear_sampler(),
            active_texture: state.active_texture,
        };
        let bind_groups = gpu.bind_groups(cx.device(), &program.layout, &textures);

        let key = PipelineKey::new(&state, binding.output_format, binding.blend);
        let pipeline = gpu.pipeline(cx.device(), key, &program.layout, &program.attributes);
        pass.set_pipeline(pipeline);
        for (index, group) in bind_groups.iter().enumerate() {
            pass.set_bind_group(index as u32, group, &[]);
        }

        if binding.to_destination {
            let viewport = state
                .viewport
                .unwrap_or_else(|| Viewport::full(binding.output_extent))
                .clipped_to(binding.output_extent);
            match viewport {
                Some(vp) => pass.set_viewport(vp.x, vp.y, vp.width, vp.height, 0.0, 1.0),
                None => log::warn!("{}: viewport lies outside the destination", self.label),
            }
        }

        Ok(())
    }

    /// Releases GPU objects; they are recreated on the next prepare.
    pub fn release_gpu(&mut self) {
        self.gpu = None;
    }
}

impl Clone for ShaderEffect {
    /// Copies program state; the copy creates its own GPU objects lazily.
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            vertex_source: self.vertex_source.clone(),
            fragment_source: self.fragment_source.clone(),
            attribute_bindings: self.attribute_bindings.clone(),
            program: self.program.as_ref().map(|p| LinkedProgram {
                layout: p.layout.clone(),
                attributes: p.attributes.clone(),
                blocks: p.blocks.clone(),
            }),
            uniforms: self.uniforms.clone(),
            projection: self.projection,
            model_view: self.model_view,
            normal: self.normal,
            mvp_uniform: self.mvp_uniform.clone(),
            mv_uniform: self.mv_uniform.clone(),
            normal_uniform: self.normal_uniform.clone(),
            resolution: self.resolution,
            downsample: self.downsample,
            base_lod: self.base_lod,
            gpu: None,
        }
    }
}

impl std::fmt::Debug for ShaderEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderEffect")
            .field("label", &self.label)
            .field("linked", &self.is_linked())
            .field("downsample", &self.downsample)
            .field("resolution", &self.resolution)
            .finish_non_exhaustive()
    }
}

fn check_value(name: &str, loc: &UniformLocation, value: &UniformValue) -> Result<()> {
    let mut scratch = vec![0u8; loc.size as usize];
    value
        .encode(&loc.ty, &mut scratch)
        .map_err(|reason| EffectError::uniform(name, reason))
}
