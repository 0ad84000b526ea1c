//! Pipeline object cache
//!
//! [`ResourceCache`] keeps one [`KeyedCache`] per resource type, so the key
//! spaces of shader modules, pipeline layouts, render passes and graphics
//! pipelines never interact. When recording is enabled every newly built
//! object is appended to a [`ResourceRecord`] before it becomes visible in the
//! cache; if recording fails the object is discarded.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::Backend;
use crate::cache::keyed_cache::{Builder, KeyedCache};
use crate::config::ResourceCacheConfig;
use crate::error::ResourceResult;
use crate::record::ResourceRecord;
use crate::resources::{
    GraphicsPipeline, GraphicsPipelineKey, PipelineLayout, PipelineLayoutKey, PipelineState, RenderPass,
    RenderPassKey, ResourceId, ShaderModule, ShaderModuleKey,
};

/// Number of cached objects per resource type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Cached shader modules
    pub shader_modules: usize,
    /// Cached pipeline layouts
    pub pipeline_layouts: usize,
    /// Cached render passes
    pub render_passes: usize,
    /// Cached graphics pipelines
    pub graphics_pipelines: usize,
}

impl CacheStats {
    /// Total number of cached objects
    pub fn total(&self) -> usize {
        self.shader_modules + self.pipeline_layouts + self.render_passes + self.graphics_pipelines
    }
}

/// Cache of every pipeline object built through one backend
pub struct ResourceCache {
    backend: Arc<dyn Backend>,
    shader_modules: KeyedCache<ShaderModuleKey, ShaderModule>,
    pipeline_layouts: KeyedCache<PipelineLayoutKey, PipelineLayout>,
    render_passes: KeyedCache<RenderPassKey, RenderPass>,
    graphics_pipelines: KeyedCache<GraphicsPipelineKey, GraphicsPipeline>,
    recorder: Option<Mutex<ResourceRecord>>,
}

impl ResourceCache {
    /// Create a cache building through `backend`
    pub fn new(backend: Arc<dyn Backend>, config: &ResourceCacheConfig) -> Self {
        let recorder = config
            .recording
            .then(|| Mutex::new(ResourceRecord::with_capacity(config.record_capacity)));

        log::info!("[CACHE] Resource cache created (recording: {})", config.recording);
        Self {
            backend,
            shader_modules: KeyedCache::new(),
            pipeline_layouts: KeyedCache::new(),
            render_passes: KeyedCache::new(),
            graphics_pipelines: KeyedCache::new(),
            recorder,
        }
    }

    /// Backend objects are built with
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    fn record(&self, register: impl FnOnce(&mut ResourceRecord) -> ResourceResult<u64>) -> ResourceResult<()> {
        if let Some(recorder) = &self.recorder {
            register(&mut recorder.lock())?;
        }
        Ok(())
    }

    /// Shader module for `key`, built on first request
    pub fn request_shader_module(&self, key: ShaderModuleKey) -> ResourceResult<Arc<ShaderModule>> {
        let (shader_module, built) = self.shader_modules.get_or_build(&key, ShaderModuleBuilder { cache: self })?;
        log_request("shader module", shader_module.id(), built);
        Ok(shader_module)
    }

    /// Pipeline layout for an ordered list of shader modules, built on first request
    pub fn request_pipeline_layout(&self, shader_modules: &[Arc<ShaderModule>]) -> ResourceResult<Arc<PipelineLayout>> {
        let key = PipelineLayoutKey::from_modules(shader_modules);
        let (pipeline_layout, built) = self.pipeline_layouts.get_or_build(
            &key,
            PipelineLayoutBuilder {
                cache: self,
                shader_modules,
            },
        )?;
        log_request("pipeline layout", pipeline_layout.id(), built);
        Ok(pipeline_layout)
    }

    /// Render pass for `key`, built on first request
    pub fn request_render_pass(&self, key: RenderPassKey) -> ResourceResult<Arc<RenderPass>> {
        let (render_pass, built) = self.render_passes.get_or_build(&key, RenderPassBuilder { cache: self })?;
        log_request("render pass", render_pass.id(), built);
        Ok(render_pass)
    }

    /// Graphics pipeline for a layout, a render pass subpass and a state block, built on first request
    pub fn request_graphics_pipeline(
        &self,
        pipeline_layout: &Arc<PipelineLayout>,
        render_pass: &Arc<RenderPass>,
        subpass_index: u32,
        state: PipelineState,
    ) -> ResourceResult<Arc<GraphicsPipeline>> {
        let key = GraphicsPipelineKey {
            pipeline_layout: pipeline_layout.id(),
            render_pass: render_pass.id(),
            subpass_index,
            state,
        };
        let (graphics_pipeline, built) = self.graphics_pipelines.get_or_build(
            &key,
            GraphicsPipelineBuilder {
                cache: self,
                pipeline_layout,
                render_pass,
            },
        )?;
        log_request("graphics pipeline", graphics_pipeline.id(), built);
        Ok(graphics_pipeline)
    }

    /// Number of cached objects per type
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            shader_modules: self.shader_modules.len(),
            pipeline_layouts: self.pipeline_layouts.len(),
            render_passes: self.render_passes.len(),
            graphics_pipelines: self.graphics_pipelines.len(),
        }
    }

    /// Drop every cached object
    ///
    /// Pipelines go first so that layouts and render passes held only by the
    /// cache are destroyed after the pipelines using them. The recording is
    /// kept.
    pub fn clear(&self) {
        log::info!("[CACHE] Clearing {} cached objects", self.stats().total());
        self.graphics_pipelines.clear();
        self.pipeline_layouts.clear();
        self.render_passes.clear();
        self.shader_modules.clear();
    }

    /// Whether new objects are being recorded
    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }

    /// Run `f` on the recording, if recording is enabled
    pub fn with_recorder<R>(&self, f: impl FnOnce(&mut ResourceRecord) -> R) -> Option<R> {
        self.recorder.as_ref().map(|recorder| f(&mut recorder.lock()))
    }

    /// Copy of the log recorded so far, if recording is enabled
    pub fn recorded_data(&self) -> Option<Vec<u8>> {
        self.with_recorder(|record| record.data().to_vec())
    }
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("stats", &self.stats())
            .field("recording", &self.is_recording())
            .finish()
    }
}

fn log_request(kind: &str, id: ResourceId, built: bool) {
    if built {
        log::debug!("[CACHE] Built {} {}", kind, id);
    } else {
        log::trace!("[CACHE] Reusing {} {}", kind, id);
    }
}

struct ShaderModuleBuilder<'a> {
    cache: &'a ResourceCache,
}

impl Builder<ShaderModuleKey, ShaderModule> for ShaderModuleBuilder<'_> {
    fn build(self, key: &ShaderModuleKey) -> ResourceResult<ShaderModule> {
        let shader_module = ShaderModule::new(Arc::clone(&self.cache.backend), key.clone())?;
        self.cache
            .record(|record| Ok(record.register_shader_module(&shader_module)))?;
        Ok(shader_module)
    }
}

struct PipelineLayoutBuilder<'a> {
    cache: &'a ResourceCache,
    shader_modules: &'a [Arc<ShaderModule>],
}

impl Builder<PipelineLayoutKey, PipelineLayout> for PipelineLayoutBuilder<'_> {
    fn build(self, _key: &PipelineLayoutKey) -> ResourceResult<PipelineLayout> {
        let pipeline_layout = PipelineLayout::new(Arc::clone(&self.cache.backend), self.shader_modules.to_vec())?;
        self.cache
            .record(|record| record.register_pipeline_layout(&pipeline_layout))?;
        Ok(pipeline_layout)
    }
}

struct RenderPassBuilder<'a> {
    cache: &'a ResourceCache,
}

impl Builder<RenderPassKey, RenderPass> for RenderPassBuilder<'_> {
    fn build(self, key: &RenderPassKey) -> ResourceResult<RenderPass> {
        let render_pass = RenderPass::new(Arc::clone(&self.cache.backend), key.clone())?;
        self.cache
            .record(|record| Ok(record.register_render_pass(&render_pass)))?;
        Ok(render_pass)
    }
}

struct GraphicsPipelineBuilder<'a> {
    cache: &'a ResourceCache,
    pipeline_layout: &'a Arc<PipelineLayout>,
    render_pass: &'a Arc<RenderPass>,
}

impl Builder<GraphicsPipelineKey, GraphicsPipeline> for GraphicsPipelineBuilder<'_> {
    fn build(self, key: &GraphicsPipelineKey) -> ResourceResult<GraphicsPipeline> {
        let graphics_pipeline = GraphicsPipeline::new(
            Arc::clone(&self.cache.backend),
            Arc::clone(self.pipeline_layout),
            Arc::clone(self.render_pass),
            key.subpass_index,
            key.state.clone(),
        )?;
        self.cache
            .record(|record| record.register_graphics_pipeline(&graphics_pipeline))?;
        Ok(graphics_pipeline)
    }
}

#[cfg(test)]
mod tests {
    use ash::vk;

    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::error::ResourceError;
    use crate::record::{ResourceReplay, ResourceType};
    use crate::resources::{Attachment, LoadStoreInfo, RasterizationState, ShaderSource, ShaderVariant, SubpassInfo};

    fn headless_cache(config: &ResourceCacheConfig) -> (Arc<HeadlessBackend>, ResourceCache) {
        let backend = Arc::new(HeadlessBackend::new());
        let cache = ResourceCache::new(backend.clone(), config);
        (backend, cache)
    }

    fn vertex_key() -> ShaderModuleKey {
        ShaderModuleKey::new(
            vk::ShaderStageFlags::VERTEX,
            ShaderSource::new(vec![3, 2, 35, 7]),
            "main",
            ShaderVariant::default(),
        )
        .unwrap()
    }

    fn fragment_key() -> ShaderModuleKey {
        ShaderModuleKey::new(
            vk::ShaderStageFlags::FRAGMENT,
            ShaderSource::new(vec![3, 2, 35, 7, 0, 0, 1, 0]),
            "main",
            ShaderVariant::default(),
        )
        .unwrap()
    }

    fn forward_pass_key() -> RenderPassKey {
        RenderPassKey::new(
            vec![Attachment::color(vk::Format::B8G8R8A8_SRGB), Attachment::depth(vk::Format::D32_SFLOAT)],
            vec![LoadStoreInfo::clear_store(), LoadStoreInfo::clear_discard()],
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_identical_requests_share_one_object() {
        let (backend, cache) = headless_cache(&ResourceCacheConfig::default());

        let first = cache.request_shader_module(vertex_key()).unwrap();
        let second = cache.request_shader_module(vertex_key()).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.created(ResourceType::ShaderModule), 1);
    }

    #[test]
    fn test_variants_produce_distinct_modules() {
        let (backend, cache) = headless_cache(&ResourceCacheConfig::default());
        let mut key = vertex_key();
        key.variant.add_define("INSTANCED");

        let plain = cache.request_shader_module(vertex_key()).unwrap();
        let instanced = cache.request_shader_module(key).unwrap();

        assert!(!Arc::ptr_eq(&plain, &instanced));
        assert_ne!(plain.id(), instanced.id());
        assert_eq!(backend.created(ResourceType::ShaderModule), 2);
    }

    #[test]
    fn test_pipeline_layout_key_depends_on_module_order() {
        let (backend, cache) = headless_cache(&ResourceCacheConfig::default());
        let vertex = cache.request_shader_module(vertex_key()).unwrap();
        let fragment = cache.request_shader_module(fragment_key()).unwrap();

        let layout = cache.request_pipeline_layout(&[vertex.clone(), fragment.clone()]).unwrap();
        let same = cache.request_pipeline_layout(&[vertex.clone(), fragment.clone()]).unwrap();
        let reversed = cache.request_pipeline_layout(&[fragment, vertex]).unwrap();

        assert!(Arc::ptr_eq(&layout, &same));
        assert!(!Arc::ptr_eq(&layout, &reversed));
        assert_eq!(backend.created(ResourceType::PipelineLayout), 2);
    }

    #[test]
    fn test_graphics_pipeline_state_is_part_of_the_key() {
        let (backend, cache) = headless_cache(&ResourceCacheConfig::default());
        let vertex = cache.request_shader_module(vertex_key()).unwrap();
        let layout = cache.request_pipeline_layout(&[vertex]).unwrap();
        let render_pass = cache.request_render_pass(forward_pass_key()).unwrap();

        let opaque = PipelineState::default();
        let mut wireframe = PipelineState::default();
        wireframe.set_rasterization_state(RasterizationState {
            polygon_mode: vk::PolygonMode::LINE,
            ..RasterizationState::default()
        });

        let a = cache.request_graphics_pipeline(&layout, &render_pass, 0, opaque.clone()).unwrap();
        let b = cache.request_graphics_pipeline(&layout, &render_pass, 0, opaque).unwrap();
        let c = cache.request_graphics_pipeline(&layout, &render_pass, 0, wireframe).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(backend.created(ResourceType::GraphicsPipeline), 2);
    }

    #[test]
    fn test_invalid_subpass_is_not_cached() {
        let (backend, cache) = headless_cache(&ResourceCacheConfig::default());
        let layout = cache
            .request_pipeline_layout(&[cache.request_shader_module(vertex_key()).unwrap()])
            .unwrap();
        let render_pass = cache.request_render_pass(forward_pass_key()).unwrap();

        let result = cache.request_graphics_pipeline(&layout, &render_pass, 3, PipelineState::default());

        assert!(matches!(result, Err(ResourceError::InvalidDescription { .. })));
        assert_eq!(backend.created(ResourceType::GraphicsPipeline), 0);
        assert_eq!(cache.stats().graphics_pipelines, 0);
    }

    #[test]
    fn test_backend_failure_is_retried_on_next_request() {
        let (backend, cache) = headless_cache(&ResourceCacheConfig::default());
        backend.fail_next(ResourceType::RenderPass, 1);

        let failed = cache.request_render_pass(forward_pass_key());
        match failed {
            Err(ResourceError::BuildFailure { operation, .. }) => assert_eq!(operation, "Cannot create RenderPass"),
            other => panic!("expected a build failure, got {other:?}"),
        }
        assert_eq!(cache.stats().render_passes, 0);

        cache.request_render_pass(forward_pass_key()).unwrap();
        assert_eq!(cache.stats().render_passes, 1);
    }

    #[test]
    fn test_out_of_range_render_pass_key_is_rejected() {
        let (backend, cache) = headless_cache(&ResourceCacheConfig::default());
        let key = RenderPassKey {
            attachments: vec![Attachment::color(vk::Format::R8G8B8A8_UNORM)],
            load_store_infos: Vec::new(),
            subpasses: vec![SubpassInfo::outputs(vec![4])],
        };

        assert!(matches!(
            cache.request_render_pass(key),
            Err(ResourceError::InvalidDescription { .. })
        ));
        assert_eq!(backend.created(ResourceType::RenderPass), 0);
    }

    #[test]
    fn test_recording_only_registers_misses() {
        let config = ResourceCacheConfig {
            recording: true,
            ..ResourceCacheConfig::default()
        };
        let (_backend, cache) = headless_cache(&config);

        cache.request_shader_module(vertex_key()).unwrap();
        let after_first = cache.recorded_data().unwrap();
        cache.request_shader_module(vertex_key()).unwrap();

        assert_eq!(cache.recorded_data().unwrap(), after_first);
        assert_eq!(cache.with_recorder(|record| record.len(ResourceType::ShaderModule)), Some(1));
    }

    #[test]
    fn test_recording_disabled_by_default() {
        let (_backend, cache) = headless_cache(&ResourceCacheConfig::default());
        cache.request_shader_module(vertex_key()).unwrap();

        assert!(!cache.is_recording());
        assert!(cache.recorded_data().is_none());
    }

    #[test]
    fn test_clear_releases_objects_in_dependency_order() {
        let (backend, cache) = headless_cache(&ResourceCacheConfig::default());
        let vertex = cache.request_shader_module(vertex_key()).unwrap();
        let layout = cache.request_pipeline_layout(&[vertex.clone()]).unwrap();
        let render_pass = cache.request_render_pass(forward_pass_key()).unwrap();
        cache
            .request_graphics_pipeline(&layout, &render_pass, 0, PipelineState::default())
            .unwrap();
        drop((vertex, layout, render_pass));

        cache.clear();

        assert_eq!(cache.stats(), CacheStats::default());
        for resource_type in ResourceType::ALL {
            assert_eq!(backend.live(resource_type), 0, "{resource_type} still alive");
        }
    }

    #[test]
    fn test_concurrent_requests_build_one_pipeline() {
        const THREADS: usize = 8;
        let (backend, cache) = headless_cache(&ResourceCacheConfig {
            recording: true,
            ..ResourceCacheConfig::default()
        });
        let barrier = std::sync::Barrier::new(THREADS);

        let pipelines: Vec<Arc<GraphicsPipeline>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        let vertex = cache.request_shader_module(vertex_key()).unwrap();
                        let fragment = cache.request_shader_module(fragment_key()).unwrap();
                        let layout = cache.request_pipeline_layout(&[vertex, fragment]).unwrap();
                        let render_pass = cache.request_render_pass(forward_pass_key()).unwrap();
                        cache
                            .request_graphics_pipeline(&layout, &render_pass, 0, PipelineState::default())
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        assert!(pipelines.iter().all(|pipeline| Arc::ptr_eq(pipeline, &pipelines[0])));
        assert_eq!(backend.created(ResourceType::ShaderModule), 2);
        assert_eq!(backend.created(ResourceType::PipelineLayout), 1);
        assert_eq!(backend.created(ResourceType::RenderPass), 1);
        assert_eq!(backend.created(ResourceType::GraphicsPipeline), 1);

        let recorded = cache.recorded_data().unwrap();
        let replay_cache = ResourceCache::new(Arc::new(HeadlessBackend::new()), &ResourceCacheConfig::default());
        let report = ResourceReplay::new().play(&replay_cache, &recorded).unwrap();
        assert_eq!(report.records, 5);
    }
}
