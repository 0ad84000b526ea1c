//! Device-less backend
//!
//! Hands out synthetic, never-repeating handles and counts every creation and
//! destruction per resource type. Used to exercise the cache and to validate or
//! replay recorded logs on machines without a GPU. Failures can be injected per
//! resource type.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use ash::vk::{self, Handle};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::{Backend, CompiledShaderModule, GraphicsPipelineRequest};
use crate::error::{BackendError, BackendResult};
use crate::record::ResourceType;
use crate::resources::{RenderPassDescription, ShaderModule, ShaderModuleKey};

const RESOURCE_TYPE_COUNT: usize = ResourceType::ALL.len();

/// Backend producing synthetic handles
#[derive(Debug)]
pub struct HeadlessBackend {
    next_handle: AtomicU64,
    created: [AtomicUsize; RESOURCE_TYPE_COUNT],
    destroyed: [AtomicUsize; RESOURCE_TYPE_COUNT],
    pending_failures: Mutex<FxHashMap<ResourceType, usize>>,
    push_constant_size: u32,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    /// Create a backend with all counters at zero
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            created: Default::default(),
            destroyed: Default::default(),
            pending_failures: Mutex::new(FxHashMap::default()),
            push_constant_size: 0,
        }
    }

    /// Report this push constant size for every shader module
    pub fn with_push_constant_size(mut self, push_constant_size: u32) -> Self {
        self.push_constant_size = push_constant_size;
        self
    }

    /// Make the next `count` creations of `resource_type` fail
    pub fn fail_next(&self, resource_type: ResourceType, count: usize) {
        *self.pending_failures.lock().entry(resource_type).or_insert(0) += count;
    }

    /// Number of objects of a type created so far
    pub fn created(&self, resource_type: ResourceType) -> usize {
        self.created[resource_type as usize].load(Ordering::Acquire)
    }

    /// Number of objects of a type destroyed so far
    pub fn destroyed(&self, resource_type: ResourceType) -> usize {
        self.destroyed[resource_type as usize].load(Ordering::Acquire)
    }

    /// Objects of a type created and not yet destroyed
    pub fn live(&self, resource_type: ResourceType) -> usize {
        self.created(resource_type) - self.destroyed(resource_type)
    }

    fn create<H: Handle>(&self, resource_type: ResourceType) -> BackendResult<H> {
        {
            let mut failures = self.pending_failures.lock();
            if let Some(remaining) = failures.get_mut(&resource_type) {
                if *remaining > 0 {
                    *remaining -= 1;
                    log::debug!("[HEADLESS] Injected failure for {}", resource_type);
                    return Err(BackendError::from(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
                }
            }
        }

        let raw = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.created[resource_type as usize].fetch_add(1, Ordering::AcqRel);
        log::trace!("[HEADLESS] Created {} 0x{:x}", resource_type, raw);
        Ok(H::from_raw(raw))
    }

    fn destroy(&self, resource_type: ResourceType, raw: u64) {
        self.destroyed[resource_type as usize].fetch_add(1, Ordering::AcqRel);
        log::trace!("[HEADLESS] Destroyed {} 0x{:x}", resource_type, raw);
    }
}

impl Backend for HeadlessBackend {
    fn create_shader_module(&self, _key: &ShaderModuleKey) -> BackendResult<CompiledShaderModule> {
        Ok(CompiledShaderModule {
            handle: self.create(ResourceType::ShaderModule)?,
            push_constant_size: self.push_constant_size,
        })
    }

    fn create_pipeline_layout(&self, _shader_modules: &[Arc<ShaderModule>]) -> BackendResult<vk::PipelineLayout> {
        self.create(ResourceType::PipelineLayout)
    }

    fn create_render_pass(&self, _description: &RenderPassDescription) -> BackendResult<vk::RenderPass> {
        self.create(ResourceType::RenderPass)
    }

    fn create_graphics_pipeline(&self, _request: &GraphicsPipelineRequest<'_>) -> BackendResult<vk::Pipeline> {
        self.create(ResourceType::GraphicsPipeline)
    }

    fn destroy_shader_module(&self, handle: vk::ShaderModule) {
        self.destroy(ResourceType::ShaderModule, handle.as_raw());
    }

    fn destroy_pipeline_layout(&self, handle: vk::PipelineLayout) {
        self.destroy(ResourceType::PipelineLayout, handle.as_raw());
    }

    fn destroy_render_pass(&self, handle: vk::RenderPass) {
        self.destroy(ResourceType::RenderPass, handle.as_raw());
    }

    fn destroy_pipeline(&self, handle: vk::Pipeline) {
        self.destroy(ResourceType::GraphicsPipeline, handle.as_raw());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{ShaderSource, ShaderVariant};

    fn key() -> ShaderModuleKey {
        ShaderModuleKey::new(
            vk::ShaderStageFlags::VERTEX,
            ShaderSource::new(vec![1, 2, 3, 4]),
            "main",
            ShaderVariant::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_handles_are_distinct_and_counted() {
        let backend = HeadlessBackend::new();
        let first = backend.create_shader_module(&key()).unwrap();
        let second = backend.create_shader_module(&key()).unwrap();

        assert_ne!(first.handle, second.handle);
        assert_eq!(backend.created(ResourceType::ShaderModule), 2);
        assert_eq!(backend.created(ResourceType::RenderPass), 0);

        backend.destroy_shader_module(first.handle);
        assert_eq!(backend.live(ResourceType::ShaderModule), 1);
    }

    #[test]
    fn test_injected_failures_are_consumed() {
        let backend = HeadlessBackend::new();
        backend.fail_next(ResourceType::ShaderModule, 1);

        let failed = backend.create_shader_module(&key()).unwrap_err();
        assert_eq!(failed, BackendError::from(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        assert!(backend.create_shader_module(&key()).is_ok());
        assert_eq!(backend.created(ResourceType::ShaderModule), 1);
    }
}
