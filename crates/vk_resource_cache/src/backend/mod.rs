//! # Backend Module
//!
//! The cache and its builders never talk to a device directly. Everything that
//! creates or destroys a native object goes through the [`Backend`] trait.
//!
//! ## Implementations
//!
//! - **Vulkan**: [`VulkanBackend`], built on `ash` for a live `VkDevice`
//! - **Headless**: [`HeadlessBackend`], synthetic handles for tests and offline
//!   log validation

pub mod headless;
pub mod vulkan;

use std::sync::Arc;

use ash::vk;

pub use crate::error::{BackendError, BackendResult};
use crate::resources::{PipelineLayout, PipelineState, RenderPass, RenderPassDescription, ShaderModule, ShaderModuleKey};

pub use headless::HeadlessBackend;
pub use vulkan::{CompiledSpirv, ShaderCompiler, SpirvPassthrough, VulkanBackend};

/// A shader module as produced by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompiledShaderModule {
    /// Native handle
    pub handle: vk::ShaderModule,
    /// Size in bytes of the module's push constant block, 0 if it has none
    pub push_constant_size: u32,
}

/// Parameters of a graphics pipeline creation
#[derive(Debug, Clone, Copy)]
pub struct GraphicsPipelineRequest<'a> {
    /// Layout the pipeline uses; also provides the shader stages
    pub pipeline_layout: &'a PipelineLayout,
    /// Render pass the pipeline is compatible with
    pub render_pass: &'a RenderPass,
    /// Subpass of `render_pass`
    pub subpass_index: u32,
    /// Fixed-function state
    pub state: &'a PipelineState,
}

/// Creates and destroys native pipeline objects
///
/// Implementations must be callable from several threads at once; the cache
/// serializes builds per key, not globally.
pub trait Backend: Send + Sync {
    /// Compile and create a shader module
    fn create_shader_module(&self, key: &ShaderModuleKey) -> BackendResult<CompiledShaderModule>;

    /// Create a pipeline layout covering the given modules
    fn create_pipeline_layout(&self, shader_modules: &[Arc<ShaderModule>]) -> BackendResult<vk::PipelineLayout>;

    /// Create a render pass from a fully inferred description
    fn create_render_pass(&self, description: &RenderPassDescription) -> BackendResult<vk::RenderPass>;

    /// Create a graphics pipeline
    fn create_graphics_pipeline(&self, request: &GraphicsPipelineRequest<'_>) -> BackendResult<vk::Pipeline>;

    /// Destroy a shader module created by this backend
    fn destroy_shader_module(&self, handle: vk::ShaderModule);

    /// Destroy a pipeline layout created by this backend
    fn destroy_pipeline_layout(&self, handle: vk::PipelineLayout);

    /// Destroy a render pass created by this backend
    fn destroy_render_pass(&self, handle: vk::RenderPass);

    /// Destroy a pipeline created by this backend
    fn destroy_pipeline(&self, handle: vk::Pipeline);
}
