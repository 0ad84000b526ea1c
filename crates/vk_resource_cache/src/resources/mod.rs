//! Pipeline objects and the descriptions they are built from
//!
//! Every object here is immutable once built and releases its native handle
//! through the backend that created it when the last reference goes away.

pub mod attachment;
pub mod graphics_pipeline;
pub mod id;
pub mod pipeline_layout;
pub mod pipeline_state;
pub mod render_pass;
pub mod shader;

pub use attachment::{is_depth_stencil_format, Attachment, LoadStoreInfo, SubpassInfo};
pub use graphics_pipeline::{GraphicsPipeline, GraphicsPipelineKey};
pub use id::ResourceId;
pub use pipeline_layout::{PipelineLayout, PipelineLayoutKey};
pub use pipeline_state::{
    ColorBlendAttachmentState, ColorBlendState, DepthStencilState, InputAssemblyState, MultisampleState,
    PipelineState, RasterizationState, SpecializationConstantState, StencilOpState, VertexInputAttribute,
    VertexInputBinding, VertexInputState, ViewportState,
};
pub use render_pass::{RenderPass, RenderPassDescription, RenderPassKey, SubpassDescription};
pub use shader::{ShaderModule, ShaderModuleKey, ShaderSource, ShaderVariant};
