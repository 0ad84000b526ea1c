//! Record tags and record payloads
//!
//! A log is a sequence of records, each a `u32` tag followed by the payload of
//! that resource type. Composite records refer to earlier records of their
//! constituent types by per-type sequence index.

use std::fmt;

use crate::error::MalformedLog;
use crate::record::codec::{Decode, Encode, LogReader, LogWriter};
use crate::resources::{
    Attachment, ColorBlendAttachmentState, ColorBlendState, DepthStencilState, InputAssemblyState, LoadStoreInfo,
    MultisampleState, PipelineState, RasterizationState, RenderPassKey, ShaderModuleKey, ShaderSource, ShaderVariant,
    SpecializationConstantState, StencilOpState, SubpassInfo, VertexInputAttribute, VertexInputBinding,
    VertexInputState, ViewportState,
};

/// Kind of pipeline object, also the tag of its log records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum ResourceType {
    /// Shader module
    ShaderModule = 0,
    /// Pipeline layout
    PipelineLayout = 1,
    /// Render pass
    RenderPass = 2,
    /// Graphics pipeline
    GraphicsPipeline = 3,
}

impl ResourceType {
    /// Every resource type, in tag order
    pub const ALL: [Self; 4] = [
        Self::ShaderModule,
        Self::PipelineLayout,
        Self::RenderPass,
        Self::GraphicsPipeline,
    ];

    /// Tag written in front of records of this type
    pub const fn tag(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for ResourceType {
    type Error = u32;

    fn try_from(tag: u32) -> Result<Self, Self::Error> {
        Self::ALL.get(tag as usize).copied().ok_or(tag)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ShaderModule => "ShaderModule",
            Self::PipelineLayout => "PipelineLayout",
            Self::RenderPass => "RenderPass",
            Self::GraphicsPipeline => "GraphicsPipeline",
        };
        f.write_str(name)
    }
}

/// Payload of a graphics pipeline record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsPipelineRecord {
    /// Sequence index of the pipeline layout record
    pub pipeline_layout: u64,
    /// Sequence index of the render pass record
    pub render_pass: u64,
    /// Subpass the pipeline is built for
    pub subpass_index: u32,
    /// Fixed-function state
    pub state: PipelineState,
}

/// One log record
///
/// The set of resource types is closed; adding a type means adding a variant
/// here and handling it wherever records are matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// A shader module and everything identifying it
    ShaderModule(ShaderModuleKey),
    /// Sequence indices of the shader modules of a pipeline layout
    PipelineLayout(Vec<u64>),
    /// A render pass description
    RenderPass(RenderPassKey),
    /// A graphics pipeline
    GraphicsPipeline(GraphicsPipelineRecord),
}

impl Record {
    /// Resource type this record creates
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Self::ShaderModule(_) => ResourceType::ShaderModule,
            Self::PipelineLayout(_) => ResourceType::PipelineLayout,
            Self::RenderPass(_) => ResourceType::RenderPass,
            Self::GraphicsPipeline(_) => ResourceType::GraphicsPipeline,
        }
    }

    /// Read the payload following a tag of `resource_type`
    pub fn decode_payload(resource_type: ResourceType, reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        Ok(match resource_type {
            ResourceType::ShaderModule => Self::ShaderModule(reader.read()?),
            ResourceType::PipelineLayout => Self::PipelineLayout(reader.read()?),
            ResourceType::RenderPass => Self::RenderPass(reader.read()?),
            ResourceType::GraphicsPipeline => Self::GraphicsPipeline(reader.read()?),
        })
    }
}

impl Encode for Record {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write_u32(self.resource_type().tag());
        match self {
            Self::ShaderModule(key) => key.encode(writer),
            Self::PipelineLayout(indices) => indices.encode(writer),
            Self::RenderPass(key) => key.encode(writer),
            Self::GraphicsPipeline(record) => record.encode(writer),
        }
    }
}

impl Encode for ShaderModuleKey {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write(&self.stage);
        writer.write_bytes(self.source.data());
        writer.write_str(&self.entry_point);
        writer.write_str(self.variant.preamble());
        writer.write(self.variant.processes());
    }
}

impl Decode for ShaderModuleKey {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        let stage = reader.read()?;
        let source = ShaderSource::new(reader.read_bytes()?);
        let entry_point = reader.read_string()?;
        let preamble = reader.read_string()?;
        let processes = reader.read()?;
        Ok(Self {
            stage,
            source,
            entry_point,
            variant: ShaderVariant::new(preamble, processes),
        })
    }
}

impl Encode for Attachment {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write(&self.format);
        writer.write(&self.samples);
        writer.write(&self.usage);
    }
}

impl Decode for Attachment {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        Ok(Self {
            format: reader.read()?,
            samples: reader.read()?,
            usage: reader.read()?,
        })
    }
}

impl Encode for LoadStoreInfo {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write(&self.load_op);
        writer.write(&self.store_op);
    }
}

impl Decode for LoadStoreInfo {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        Ok(Self {
            load_op: reader.read()?,
            store_op: reader.read()?,
        })
    }
}

impl Encode for SubpassInfo {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write(&self.input_attachments);
        writer.write(&self.output_attachments);
    }
}

impl Decode for SubpassInfo {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        Ok(Self {
            input_attachments: reader.read()?,
            output_attachments: reader.read()?,
        })
    }
}

impl Encode for RenderPassKey {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write(&self.attachments);
        writer.write(&self.load_store_infos);
        writer.write(&self.subpasses);
    }
}

impl Decode for RenderPassKey {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        Ok(Self {
            attachments: reader.read()?,
            load_store_infos: reader.read()?,
            subpasses: reader.read()?,
        })
    }
}

impl Encode for SpecializationConstantState {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write_len(self.len());
        for (constant_id, data) in self.iter() {
            writer.write_u32(constant_id);
            writer.write_bytes(data);
        }
    }
}

impl Decode for SpecializationConstantState {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        let mut state = Self::default();
        for _ in 0..reader.read_len()? {
            let constant_id = reader.read_u32()?;
            state.set_raw(constant_id, reader.read_bytes()?);
        }
        Ok(state)
    }
}

impl Encode for VertexInputAttribute {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write_u32(self.location);
        writer.write_u32(self.binding);
        writer.write(&self.format);
        writer.write_u32(self.offset);
    }
}

impl Decode for VertexInputAttribute {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        Ok(Self {
            location: reader.read_u32()?,
            binding: reader.read_u32()?,
            format: reader.read()?,
            offset: reader.read_u32()?,
        })
    }
}

impl Encode for VertexInputBinding {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write_u32(self.binding);
        writer.write_u32(self.stride);
        writer.write(&self.input_rate);
    }
}

impl Decode for VertexInputBinding {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        Ok(Self {
            binding: reader.read_u32()?,
            stride: reader.read_u32()?,
            input_rate: reader.read()?,
        })
    }
}

impl Encode for InputAssemblyState {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write(&self.topology);
        writer.write_bool(self.primitive_restart_enable);
    }
}

impl Decode for InputAssemblyState {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        Ok(Self {
            topology: reader.read()?,
            primitive_restart_enable: reader.read_bool()?,
        })
    }
}

impl Encode for RasterizationState {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write_bool(self.depth_clamp_enable);
        writer.write_bool(self.rasterizer_discard_enable);
        writer.write(&self.polygon_mode);
        writer.write(&self.cull_mode);
        writer.write(&self.front_face);
        writer.write_bool(self.depth_bias_enable);
    }
}

impl Decode for RasterizationState {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        Ok(Self {
            depth_clamp_enable: reader.read_bool()?,
            rasterizer_discard_enable: reader.read_bool()?,
            polygon_mode: reader.read()?,
            cull_mode: reader.read()?,
            front_face: reader.read()?,
            depth_bias_enable: reader.read_bool()?,
        })
    }
}

impl Encode for ViewportState {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write_u32(self.viewport_count);
        writer.write_u32(self.scissor_count);
    }
}

impl Decode for ViewportState {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        Ok(Self {
            viewport_count: reader.read_u32()?,
            scissor_count: reader.read_u32()?,
        })
    }
}

impl Encode for MultisampleState {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write(&self.rasterization_samples);
        writer.write_bool(self.sample_shading_enable);
        writer.write_f32(self.min_sample_shading);
        writer.write_u32(self.sample_mask);
        writer.write_bool(self.alpha_to_coverage_enable);
        writer.write_bool(self.alpha_to_one_enable);
    }
}

impl Decode for MultisampleState {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        Ok(Self {
            rasterization_samples: reader.read()?,
            sample_shading_enable: reader.read_bool()?,
            min_sample_shading: reader.read_f32()?,
            sample_mask: reader.read_u32()?,
            alpha_to_coverage_enable: reader.read_bool()?,
            alpha_to_one_enable: reader.read_bool()?,
        })
    }
}

impl Encode for StencilOpState {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write(&self.fail_op);
        writer.write(&self.pass_op);
        writer.write(&self.depth_fail_op);
        writer.write(&self.compare_op);
    }
}

impl Decode for StencilOpState {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        Ok(Self {
            fail_op: reader.read()?,
            pass_op: reader.read()?,
            depth_fail_op: reader.read()?,
            compare_op: reader.read()?,
        })
    }
}

impl Encode for DepthStencilState {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write_bool(self.depth_test_enable);
        writer.write_bool(self.depth_write_enable);
        writer.write(&self.depth_compare_op);
        writer.write_bool(self.depth_bounds_test_enable);
        writer.write_bool(self.stencil_test_enable);
        writer.write(&self.front);
        writer.write(&self.back);
    }
}

impl Decode for DepthStencilState {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        Ok(Self {
            depth_test_enable: reader.read_bool()?,
            depth_write_enable: reader.read_bool()?,
            depth_compare_op: reader.read()?,
            depth_bounds_test_enable: reader.read_bool()?,
            stencil_test_enable: reader.read_bool()?,
            front: reader.read()?,
            back: reader.read()?,
        })
    }
}

impl Encode for ColorBlendAttachmentState {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write_bool(self.blend_enable);
        writer.write(&self.src_color_blend_factor);
        writer.write(&self.dst_color_blend_factor);
        writer.write(&self.color_blend_op);
        writer.write(&self.src_alpha_blend_factor);
        writer.write(&self.dst_alpha_blend_factor);
        writer.write(&self.alpha_blend_op);
        writer.write(&self.color_write_mask);
    }
}

impl Decode for ColorBlendAttachmentState {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        Ok(Self {
            blend_enable: reader.read_bool()?,
            src_color_blend_factor: reader.read()?,
            dst_color_blend_factor: reader.read()?,
            color_blend_op: reader.read()?,
            src_alpha_blend_factor: reader.read()?,
            dst_alpha_blend_factor: reader.read()?,
            alpha_blend_op: reader.read()?,
            color_write_mask: reader.read()?,
        })
    }
}

impl Encode for ColorBlendState {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write(&self.logic_op);
        writer.write_bool(self.logic_op_enable);
        writer.write(&self.attachments);
    }
}

impl Decode for ColorBlendState {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        let logic_op = reader.read()?;
        let logic_op_enable = reader.read_bool()?;
        Ok(Self {
            logic_op_enable,
            logic_op,
            attachments: reader.read()?,
        })
    }
}

impl Encode for PipelineState {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write(&self.specialization_constants);
        writer.write(&self.vertex_input.attributes);
        writer.write(&self.vertex_input.bindings);
        writer.write(&self.input_assembly);
        writer.write(&self.rasterization);
        writer.write(&self.viewport);
        writer.write(&self.multisample);
        writer.write(&self.depth_stencil);
        writer.write(&self.color_blend);
    }
}

impl Decode for PipelineState {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        Ok(Self {
            specialization_constants: reader.read()?,
            vertex_input: VertexInputState {
                attributes: reader.read()?,
                bindings: reader.read()?,
            },
            input_assembly: reader.read()?,
            rasterization: reader.read()?,
            viewport: reader.read()?,
            multisample: reader.read()?,
            depth_stencil: reader.read()?,
            color_blend: reader.read()?,
        })
    }
}

impl Encode for GraphicsPipelineRecord {
    fn encode(&self, writer: &mut LogWriter) {
        writer.write_u64(self.pipeline_layout);
        writer.write_u64(self.render_pass);
        writer.write_u32(self.subpass_index);
        writer.write(&self.state);
    }
}

impl Decode for GraphicsPipelineRecord {
    fn decode(reader: &mut LogReader<'_>) -> Result<Self, MalformedLog> {
        Ok(Self {
            pipeline_layout: reader.read_u64()?,
            render_pass: reader.read_u64()?,
            subpass_index: reader.read_u32()?,
            state: reader.read()?,
        })
    }
}
