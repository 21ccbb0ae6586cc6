//! Graphics and compute pipeline management.
//!
//! Pipelines are built in two steps. A [`GraphicsPipelineBuilder`] accumulates
//! fixed-function state and hands out an immutable [`GraphicsPipelineConfig`]
//! snapshot; [`Pipeline::graphics`] compiles that snapshot. Compute pipelines
//! take a [`ComputePipelineConfig`] the same way.
//!
//! Every graphics pipeline built here:
//! - declares no vertex input bindings or attributes (shaders pull vertices)
//! - declares one viewport and one scissor, both dynamic, set while recording
//! - targets dynamic rendering via the color/depth formats in its config
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use ash::vk;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::pipeline::{
//!     CullMode, FrontFace, GraphicsPipelineBuilder, Pipeline, PipelineLayout, PolygonMode,
//!     PrimitiveTopology,
//! };
//! use renderer_rhi::shader::{load_shader_module, ShaderStage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), renderer_rhi::RhiError> {
//! let vert = load_shader_module(device.clone(), Path::new("shaders/tri.vert.spv"), ShaderStage::Vertex)?;
//! let frag = load_shader_module(device.clone(), Path::new("shaders/tri.frag.spv"), ShaderStage::Fragment)?;
//! let layout = PipelineLayout::new(device.clone(), &[])?;
//!
//! let mut builder = GraphicsPipelineBuilder::new();
//! builder
//!     .set_pipeline_layout(layout.handle())
//!     .set_shaders(&vert, &frag)
//!     .set_input_topology(PrimitiveTopology::TriangleList)
//!     .set_polygon_mode(PolygonMode::Fill)
//!     .set_cull_mode(CullMode::None, FrontFace::Clockwise)
//!     .set_multisampling_none()
//!     .set_blending_none()
//!     .disable_depth_test()
//!     .set_color_attachment_format(vk::Format::R16G16B16A16_SFLOAT)
//!     .set_depth_attachment_format(vk::Format::UNDEFINED);
//!
//! let pipeline = Pipeline::graphics(device.clone(), &builder.build())?;
//! # Ok(())
//! # }
//! ```

use std::ffi::CString;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use crate::deletion_queue::DeletionEntry;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::Shader;

// =============================================================================
// PipelineLayout
// =============================================================================

/// Vulkan pipeline layout wrapper.
///
/// The layout is the resource-binding contract between a pipeline and the
/// descriptor sets bound while recording.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a layout over `descriptor_set_layouts` with no push constants.
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Self> {
        let create_info =
            vk::PipelineLayoutCreateInfo::default().set_layouts(descriptor_set_layouts);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!(
            "Created pipeline layout with {} descriptor set layout(s)",
            descriptor_set_layouts.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Gives up ownership so the layout is released by a deletion queue.
    pub fn into_deletion(mut self) -> DeletionEntry {
        DeletionEntry::PipelineLayout(std::mem::take(&mut self.layout))
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        if self.layout == vk::PipelineLayout::null() {
            return;
        }
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Pipeline layout destroyed");
    }
}

// =============================================================================
// Fixed-function enums
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

impl PrimitiveTopology {
    pub fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
            PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
            PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
            PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
    Point,
}

impl PolygonMode {
    pub fn to_vk(self) -> vk::PolygonMode {
        match self {
            PolygonMode::Fill => vk::PolygonMode::FILL,
            PolygonMode::Line => vk::PolygonMode::LINE,
            PolygonMode::Point => vk::PolygonMode::POINT,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
    FrontAndBack,
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
            CullMode::FrontAndBack => vk::CullModeFlags::FRONT_AND_BACK,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

impl FrontFace {
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompareOp {
    #[default]
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Always,
}

impl CompareOp {
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Never => vk::CompareOp::NEVER,
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::Equal => vk::CompareOp::EQUAL,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Greater => vk::CompareOp::GREATER,
            CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
}

impl BlendFactor {
    pub fn to_vk(self) -> vk::BlendFactor {
        match self {
            BlendFactor::Zero => vk::BlendFactor::ZERO,
            BlendFactor::One => vk::BlendFactor::ONE,
            BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
            BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
        }
    }
}

/// Blend state of the single color attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorBlendAttachment {
    pub blend_enable: bool,
    pub src_color_blend_factor: BlendFactor,
    pub dst_color_blend_factor: BlendFactor,
    pub src_alpha_blend_factor: BlendFactor,
    pub dst_alpha_blend_factor: BlendFactor,
    pub color_write_mask: vk::ColorComponentFlags,
}

impl Default for ColorBlendAttachment {
    /// Nothing written and nothing blended, the "not set" state.
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_color_blend_factor: BlendFactor::Zero,
            dst_color_blend_factor: BlendFactor::Zero,
            src_alpha_blend_factor: BlendFactor::Zero,
            dst_alpha_blend_factor: BlendFactor::Zero,
            color_write_mask: vk::ColorComponentFlags::empty(),
        }
    }
}

impl ColorBlendAttachment {
    /// Writes RGBA without blending.
    pub fn disabled() -> Self {
        Self {
            color_write_mask: vk::ColorComponentFlags::RGBA,
            ..Self::default()
        }
    }

    /// `src * src.a + dst * (1 - src.a)`
    pub fn alpha_blend() -> Self {
        Self {
            blend_enable: true,
            src_color_blend_factor: BlendFactor::SrcAlpha,
            dst_color_blend_factor: BlendFactor::OneMinusSrcAlpha,
            src_alpha_blend_factor: BlendFactor::One,
            dst_alpha_blend_factor: BlendFactor::Zero,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        }
    }

    /// `src * src.a + dst`
    pub fn additive() -> Self {
        Self {
            dst_color_blend_factor: BlendFactor::One,
            ..Self::alpha_blend()
        }
    }

    pub fn to_vk(&self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(self.blend_enable)
            .src_color_blend_factor(self.src_color_blend_factor.to_vk())
            .dst_color_blend_factor(self.dst_color_blend_factor.to_vk())
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(self.src_alpha_blend_factor.to_vk())
            .dst_alpha_blend_factor(self.dst_alpha_blend_factor.to_vk())
            .alpha_blend_op(vk::BlendOp::ADD)
            .color_write_mask(self.color_write_mask)
    }
}

/// Depth test state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DepthState {
    pub test_enable: bool,
    pub write_enable: bool,
    pub compare_op: CompareOp,
}

// =============================================================================
// Configs
// =============================================================================

/// One programmable stage of a pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderStageDesc {
    pub stage: vk::ShaderStageFlags,
    pub module: vk::ShaderModule,
    pub entry_point: CString,
}

impl ShaderStageDesc {
    fn to_vk(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage)
            .module(self.module)
            .name(&self.entry_point)
    }
}

/// Complete, immutable description of a graphics pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphicsPipelineConfig {
    pub layout: vk::PipelineLayout,
    pub stages: Vec<ShaderStageDesc>,
    pub topology: PrimitiveTopology,
    pub polygon_mode: PolygonMode,
    pub line_width: f32,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub samples: vk::SampleCountFlags,
    pub blend: ColorBlendAttachment,
    pub depth: DepthState,
    pub color_attachment_format: Option<vk::Format>,
    pub depth_attachment_format: vk::Format,
}

impl Default for GraphicsPipelineConfig {
    fn default() -> Self {
        Self {
            layout: vk::PipelineLayout::null(),
            stages: Vec::new(),
            topology: PrimitiveTopology::default(),
            polygon_mode: PolygonMode::default(),
            line_width: 1.0,
            cull_mode: CullMode::default(),
            front_face: FrontFace::default(),
            samples: vk::SampleCountFlags::TYPE_1,
            blend: ColorBlendAttachment::default(),
            depth: DepthState::default(),
            color_attachment_format: None,
            depth_attachment_format: vk::Format::UNDEFINED,
        }
    }
}

impl GraphicsPipelineConfig {
    /// Number of viewports. Always one; the viewport itself is dynamic.
    #[inline]
    pub fn viewport_count(&self) -> u32 {
        1
    }

    /// Number of scissors. Always one; the scissor itself is dynamic.
    #[inline]
    pub fn scissor_count(&self) -> u32 {
        1
    }

    /// States supplied while recording instead of baked into the pipeline.
    #[inline]
    pub fn dynamic_states(&self) -> [vk::DynamicState; 2] {
        [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
    }

    /// Color formats for dynamic rendering; empty when none was set.
    pub fn color_attachment_formats(&self) -> Vec<vk::Format> {
        self.color_attachment_format.into_iter().collect()
    }
}

/// Complete, immutable description of a compute pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComputePipelineConfig {
    pub layout: vk::PipelineLayout,
    pub stage: ShaderStageDesc,
}

// =============================================================================
// Builder
// =============================================================================

/// Accumulates graphics pipeline state.
///
/// Setters mutate one field group each and return `&mut Self` for chaining.
/// [`build`](Self::build) copies the state out, so the builder can keep
/// going (or be cleared) without affecting configs it already produced.
#[derive(Clone, Debug, Default)]
pub struct GraphicsPipelineBuilder {
    config: GraphicsPipelineConfig,
}

impl GraphicsPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets every field to its "not set" default.
    pub fn clear(&mut self) -> &mut Self {
        self.config = GraphicsPipelineConfig::default();
        self
    }

    pub fn set_pipeline_layout(&mut self, layout: vk::PipelineLayout) -> &mut Self {
        self.config.layout = layout;
        self
    }

    /// Replaces the stage list with a vertex and a fragment stage.
    pub fn set_shaders(&mut self, vertex: &Shader, fragment: &Shader) -> &mut Self {
        self.config.stages = vec![vertex.stage_desc(), fragment.stage_desc()];
        self
    }

    pub fn set_input_topology(&mut self, topology: PrimitiveTopology) -> &mut Self {
        self.config.topology = topology;
        self
    }

    /// Sets the fill mode and resets the line width to 1.0.
    pub fn set_polygon_mode(&mut self, mode: PolygonMode) -> &mut Self {
        self.config.polygon_mode = mode;
        self.config.line_width = 1.0;
        self
    }

    pub fn set_line_width(&mut self, width: f32) -> &mut Self {
        self.config.line_width = width;
        self
    }

    pub fn set_cull_mode(&mut self, cull_mode: CullMode, front_face: FrontFace) -> &mut Self {
        self.config.cull_mode = cull_mode;
        self.config.front_face = front_face;
        self
    }

    /// One sample per pixel, no sample shading.
    pub fn set_multisampling_none(&mut self) -> &mut Self {
        self.config.samples = vk::SampleCountFlags::TYPE_1;
        self
    }

    pub fn set_blending_none(&mut self) -> &mut Self {
        self.config.blend = ColorBlendAttachment::disabled();
        self
    }

    pub fn enable_blending_alpha(&mut self) -> &mut Self {
        self.config.blend = ColorBlendAttachment::alpha_blend();
        self
    }

    pub fn enable_blending_additive(&mut self) -> &mut Self {
        self.config.blend = ColorBlendAttachment::additive();
        self
    }

    pub fn set_color_attachment_format(&mut self, format: vk::Format) -> &mut Self {
        self.config.color_attachment_format = Some(format);
        self
    }

    pub fn set_depth_attachment_format(&mut self, format: vk::Format) -> &mut Self {
        self.config.depth_attachment_format = format;
        self
    }

    pub fn disable_depth_test(&mut self) -> &mut Self {
        self.config.depth = DepthState {
            test_enable: false,
            write_enable: false,
            compare_op: CompareOp::Never,
        };
        self
    }

    pub fn enable_depth_test(&mut self, write_enable: bool, compare_op: CompareOp) -> &mut Self {
        self.config.depth = DepthState {
            test_enable: true,
            write_enable,
            compare_op,
        };
        self
    }

    /// Snapshot of the accumulated state.
    pub fn build(&self) -> GraphicsPipelineConfig {
        self.config.clone()
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Compiled Vulkan pipeline.
pub struct Pipeline {
    device: Arc<Device>,
    /// Null once handed to a deletion queue.
    pipeline: vk::Pipeline,
    bind_point: vk::PipelineBindPoint,
}

impl Pipeline {
    /// Compiles a graphics pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] if the config has no layout or no
    /// stages, or the Vulkan error if compilation fails.
    pub fn graphics(device: Arc<Device>, config: &GraphicsPipelineConfig) -> RhiResult<Self> {
        if config.layout == vk::PipelineLayout::null() {
            return Err(RhiError::PipelineError(
                "graphics pipeline has no layout".to_string(),
            ));
        }
        if config.stages.is_empty() {
            return Err(RhiError::PipelineError(
                "graphics pipeline has no shader stages".to_string(),
            ));
        }

        let stages: Vec<vk::PipelineShaderStageCreateInfo> =
            config.stages.iter().map(ShaderStageDesc::to_vk).collect();

        // Vertices are fetched by the shader
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(config.topology.to_vk())
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(config.viewport_count())
            .scissor_count(config.scissor_count());

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(config.polygon_mode.to_vk())
            .line_width(config.line_width)
            .cull_mode(config.cull_mode.to_vk())
            .front_face(config.front_face.to_vk());

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(config.samples)
            .sample_shading_enable(false)
            .min_sample_shading(1.0)
            .alpha_to_coverage_enable(false)
            .alpha_to_one_enable(false);

        let blend_attachments = [config.blend.to_vk()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&blend_attachments);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(config.depth.test_enable)
            .depth_write_enable(config.depth.write_enable)
            .depth_compare_op(config.depth.compare_op.to_vk())
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        let dynamic_states = config.dynamic_states();
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_formats = config.color_attachment_formats();
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(config.depth_attachment_format);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .depth_stencil_state(&depth_stencil)
            .dynamic_state(&dynamic_state)
            .layout(config.layout)
            .push_next(&mut rendering_info);

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, result)| {
                    error!("Failed to create graphics pipeline: {:?}", result);
                    result
                })?
        };

        Self::from_created(device, pipelines, vk::PipelineBindPoint::GRAPHICS)
    }

    /// Compiles a compute pipeline.
    ///
    /// # Errors
    ///
    /// Returns the Vulkan error if compilation fails.
    pub fn compute(device: Arc<Device>, config: &ComputePipelineConfig) -> RhiResult<Self> {
        let create_info = vk::ComputePipelineCreateInfo::default()
            .stage(config.stage.to_vk())
            .layout(config.layout);

        let pipelines = unsafe {
            device
                .handle()
                .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, result)| {
                    error!("Failed to create compute pipeline: {:?}", result);
                    result
                })?
        };

        Self::from_created(device, pipelines, vk::PipelineBindPoint::COMPUTE)
    }

    fn from_created(
        device: Arc<Device>,
        pipelines: Vec<vk::Pipeline>,
        bind_point: vk::PipelineBindPoint,
    ) -> RhiResult<Self> {
        let pipeline = pipelines.first().copied().ok_or_else(|| {
            RhiError::PipelineError("driver returned no pipeline".to_string())
        })?;

        info!("{:?} pipeline created", bind_point);

        Ok(Self {
            device,
            pipeline,
            bind_point,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }

    /// Gives up ownership so the pipeline is released by a deletion queue.
    pub fn into_deletion(mut self) -> DeletionEntry {
        DeletionEntry::Pipeline(std::mem::take(&mut self.pipeline))
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.pipeline == vk::Pipeline::null() {
            return;
        }
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        info!("{:?} pipeline destroyed", self.bind_point);
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    fn stage(flags: vk::ShaderStageFlags, raw: u64) -> ShaderStageDesc {
        ShaderStageDesc {
            stage: flags,
            module: vk::ShaderModule::from_raw(raw),
            entry_point: CString::new("main").unwrap(),
        }
    }

    #[test]
    fn test_attachment_formats_are_reported() {
        let mut builder = GraphicsPipelineBuilder::new();
        builder
            .set_color_attachment_format(vk::Format::R16G16B16A16_SFLOAT)
            .set_depth_attachment_format(vk::Format::D32_SFLOAT);

        let config = builder.build();

        assert_eq!(
            config.color_attachment_format,
            Some(vk::Format::R16G16B16A16_SFLOAT)
        );
        assert_eq!(config.depth_attachment_format, vk::Format::D32_SFLOAT);
        assert_eq!(
            config.color_attachment_formats(),
            vec![vk::Format::R16G16B16A16_SFLOAT]
        );
    }

    #[test]
    fn test_viewport_and_scissor_counts_stay_one() {
        let mut builder = GraphicsPipelineBuilder::new();
        for _ in 0..3 {
            builder
                .set_input_topology(PrimitiveTopology::LineStrip)
                .set_polygon_mode(PolygonMode::Line)
                .set_cull_mode(CullMode::Back, FrontFace::Clockwise)
                .set_multisampling_none()
                .enable_blending_additive()
                .enable_depth_test(true, CompareOp::GreaterOrEqual);
        }

        let config = builder.build();

        assert_eq!(config.viewport_count(), 1);
        assert_eq!(config.scissor_count(), 1);
        assert_eq!(
            config.dynamic_states(),
            [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
        );
    }

    #[test]
    fn test_clear_restores_defaults() {
        let mut builder = GraphicsPipelineBuilder::new();
        builder
            .set_pipeline_layout(vk::PipelineLayout::from_raw(5))
            .set_input_topology(PrimitiveTopology::PointList)
            .set_color_attachment_format(vk::Format::B8G8R8A8_UNORM)
            .enable_blending_alpha();
        let before = builder.build();

        builder.clear();
        let after = builder.build();

        assert_eq!(after, GraphicsPipelineConfig::default());
        assert_eq!(after.color_attachment_format, None);
        assert_eq!(after.layout, vk::PipelineLayout::null());
        // Snapshot taken before clear is unchanged
        assert_eq!(before.topology, PrimitiveTopology::PointList);
        assert_eq!(before.color_attachment_format, Some(vk::Format::B8G8R8A8_UNORM));
    }

    #[test]
    fn test_polygon_mode_resets_line_width() {
        let mut builder = GraphicsPipelineBuilder::new();
        builder.set_line_width(4.0);
        assert_eq!(builder.build().line_width, 4.0);

        builder.set_polygon_mode(PolygonMode::Line);
        let config = builder.build();
        assert_eq!(config.polygon_mode, PolygonMode::Line);
        assert_eq!(config.line_width, 1.0);
    }

    #[test]
    fn test_depth_test_toggles() {
        let mut builder = GraphicsPipelineBuilder::new();
        builder.enable_depth_test(true, CompareOp::LessOrEqual);
        let enabled = builder.build().depth;
        assert!(enabled.test_enable);
        assert!(enabled.write_enable);
        assert_eq!(enabled.compare_op, CompareOp::LessOrEqual);

        builder.disable_depth_test();
        let disabled = builder.build().depth;
        assert!(!disabled.test_enable);
        assert!(!disabled.write_enable);
        assert_eq!(disabled.compare_op, CompareOp::Never);
    }

    #[test]
    fn test_blend_presets() {
        let none = ColorBlendAttachment::disabled().to_vk();
        assert_eq!(none.blend_enable, vk::FALSE);
        assert_eq!(none.color_write_mask, vk::ColorComponentFlags::RGBA);

        let alpha = ColorBlendAttachment::alpha_blend().to_vk();
        assert_eq!(alpha.blend_enable, vk::TRUE);
        assert_eq!(alpha.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            alpha.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );

        let additive = ColorBlendAttachment::additive().to_vk();
        assert_eq!(additive.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(additive.dst_color_blend_factor, vk::BlendFactor::ONE);
    }

    #[test]
    fn test_default_blend_writes_nothing() {
        let blend = GraphicsPipelineConfig::default().blend;
        assert!(!blend.blend_enable);
        assert!(blend.color_write_mask.is_empty());
    }

    #[test]
    fn test_config_stage_list_is_value() {
        let mut config = GraphicsPipelineConfig::default();
        config.stages = vec![
            stage(vk::ShaderStageFlags::VERTEX, 1),
            stage(vk::ShaderStageFlags::FRAGMENT, 2),
        ];
        let copy = config.clone();
        config.stages.clear();

        assert_eq!(copy.stages.len(), 2);
        assert_eq!(copy.stages[1].stage, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_enum_mappings() {
        assert_eq!(
            PrimitiveTopology::TriangleList.to_vk(),
            vk::PrimitiveTopology::TRIANGLE_LIST
        );
        assert_eq!(PolygonMode::Line.to_vk(), vk::PolygonMode::LINE);
        assert_eq!(CullMode::None.to_vk(), vk::CullModeFlags::NONE);
        assert_eq!(FrontFace::Clockwise.to_vk(), vk::FrontFace::CLOCKWISE);
        assert_eq!(CompareOp::GreaterOrEqual.to_vk(), vk::CompareOp::GREATER_OR_EQUAL);
    }

    #[test]
    fn test_pipeline_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Pipeline>();
        assert_send_sync::<PipelineLayout>();
    }
}
