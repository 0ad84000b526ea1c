//! # Vulkan Resource Cache
//!
//! Builds immutable Vulkan pipeline objects (shader modules, pipeline layouts,
//! render passes and graphics pipelines) from declarative descriptions and
//! deduplicates identical descriptions through content-addressed caching.
//!
//! ## Features
//!
//! - **Caching**: one object per distinct description, built at most once even
//!   under concurrent requests
//! - **Render pass inference**: attachment layouts, subpass references and
//!   dependencies derived from attachments and subpass usage
//! - **Record/replay**: the sequence of built objects can be recorded into a
//!   compact binary log and replayed later into an equivalent object graph
//! - **Backends**: an `ash` backend for real devices and a headless backend for
//!   tests and offline log validation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use vk_resource_cache::prelude::*;
//!
//! fn build(backend: Arc<dyn Backend>, vertex_spirv: Vec<u8>) -> ResourceResult<Vec<u8>> {
//!     vk_resource_cache::foundation::logging::init();
//!
//!     let config = ResourceCacheConfig { recording: true, ..ResourceCacheConfig::default() };
//!     let cache = ResourceCache::new(backend, &config);
//!
//!     let vertex = cache.request_shader_module(ShaderModuleKey::new(
//!         vk::ShaderStageFlags::VERTEX,
//!         ShaderSource::new(vertex_spirv),
//!         "main",
//!         ShaderVariant::default(),
//!     )?)?;
//!     let layout = cache.request_pipeline_layout(&[vertex])?;
//!     let render_pass = cache.request_render_pass(RenderPassKey::new(
//!         vec![Attachment::color(vk::Format::B8G8R8A8_SRGB), Attachment::depth(vk::Format::D32_SFLOAT)],
//!         vec![LoadStoreInfo::clear_store(), LoadStoreInfo::clear_discard()],
//!         Vec::new(),
//!     )?)?;
//!     cache.request_graphics_pipeline(&layout, &render_pass, 0, PipelineState::default())?;
//!
//!     Ok(cache.recorded_data().unwrap_or_default())
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod foundation;
pub mod record;
pub mod resources;

pub use error::{BackendError, MalformedLog, ResourceError, ResourceResult};

/// Common imports for cache users
pub mod prelude {
    pub use crate::{
        backend::{Backend, HeadlessBackend, ShaderCompiler, SpirvPassthrough, VulkanBackend},
        cache::{CacheStats, ResourceCache},
        config::{Config, ResourceCacheConfig},
        error::{BackendError, MalformedLog, ResourceError, ResourceResult},
        record::{ReplayReport, ResourceRecord, ResourceReplay, ResourceType, UnsupportedRecord},
        resources::{
            Attachment, ColorBlendAttachmentState, ColorBlendState, DepthStencilState, GraphicsPipeline,
            InputAssemblyState, LoadStoreInfo, MultisampleState, PipelineLayout, PipelineState, RasterizationState,
            RenderPass, RenderPassKey, ShaderModule, ShaderModuleKey, ShaderSource, ShaderVariant, SubpassInfo,
            VertexInputAttribute, VertexInputBinding, VertexInputState, ViewportState,
        },
    };

    pub use ash::vk;
}
