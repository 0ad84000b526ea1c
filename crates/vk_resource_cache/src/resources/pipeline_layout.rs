//! Pipeline layouts derived from a set of shader modules

use std::fmt;
use std::sync::Arc;

use ash::vk;

use crate::backend::Backend;
use crate::error::{ResourceError, ResourceResult};
use crate::resources::{ResourceId, ShaderModule};

/// Identity of a pipeline layout: the ordered ids of its shader modules
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PipelineLayoutKey {
    /// Ids of the constituent shader modules, in declared order
    pub shader_modules: Vec<ResourceId>,
}

impl PipelineLayoutKey {
    /// Key for a list of shader modules
    pub fn from_modules(shader_modules: &[Arc<ShaderModule>]) -> Self {
        Self {
            shader_modules: shader_modules.iter().map(|module| module.id()).collect(),
        }
    }
}

/// Pipeline layout built by a backend
///
/// Keeps its shader modules alive for as long as the layout exists.
pub struct PipelineLayout {
    id: ResourceId,
    shader_modules: Vec<Arc<ShaderModule>>,
    handle: vk::PipelineLayout,
    backend: Arc<dyn Backend>,
}

impl PipelineLayout {
    /// Build a layout for the given modules
    pub fn new(backend: Arc<dyn Backend>, shader_modules: Vec<Arc<ShaderModule>>) -> ResourceResult<Self> {
        if shader_modules.is_empty() {
            return Err(ResourceError::invalid("a pipeline layout needs at least one shader module"));
        }

        let handle = backend
            .create_pipeline_layout(&shader_modules)
            .map_err(|source| ResourceError::BuildFailure {
                operation: "Cannot create PipelineLayout",
                source,
            })?;

        let id = ResourceId::next();
        log::debug!(
            "[PIPELINE_LAYOUT] Created pipeline layout {} from {} shader modules",
            id,
            shader_modules.len()
        );

        Ok(Self {
            id,
            shader_modules,
            handle,
            backend,
        })
    }

    /// Identity of this layout
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Native handle
    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }

    /// Shader modules, in declared order
    pub fn shader_modules(&self) -> &[Arc<ShaderModule>] {
        &self.shader_modules
    }

    /// Key this layout is cached under
    pub fn key(&self) -> PipelineLayoutKey {
        PipelineLayoutKey::from_modules(&self.shader_modules)
    }

    /// Union of the stages of all modules
    pub fn stages(&self) -> vk::ShaderStageFlags {
        self.shader_modules
            .iter()
            .fold(vk::ShaderStageFlags::empty(), |stages, module| stages | module.stage())
    }
}

impl fmt::Debug for PipelineLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineLayout")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("shader_modules", &self.key().shader_modules)
            .finish()
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        log::debug!("[PIPELINE_LAYOUT] Dropping pipeline layout {}", self.id);
        self.backend.destroy_pipeline_layout(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::resources::{ShaderModuleKey, ShaderSource, ShaderVariant};

    fn shader_module(backend: &Arc<HeadlessBackend>, stage: vk::ShaderStageFlags) -> Arc<ShaderModule> {
        let key = ShaderModuleKey::new(stage, ShaderSource::new(vec![1, 2, 3, 4]), "main", ShaderVariant::default())
            .unwrap();
        Arc::new(ShaderModule::new(backend.clone(), key).unwrap())
    }

    #[test]
    fn test_stages_cover_every_module() {
        let backend = Arc::new(HeadlessBackend::new());
        let vertex = shader_module(&backend, vk::ShaderStageFlags::VERTEX);
        let fragment = shader_module(&backend, vk::ShaderStageFlags::FRAGMENT);

        let layout = PipelineLayout::new(backend.clone(), vec![vertex.clone(), fragment.clone()]).unwrap();

        assert_eq!(layout.stages(), vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(layout.key().shader_modules, vec![vertex.id(), fragment.id()]);
    }

    #[test]
    fn test_empty_layout_is_rejected() {
        let backend = Arc::new(HeadlessBackend::new());

        let result = PipelineLayout::new(backend.clone(), Vec::new());

        assert!(matches!(result, Err(ResourceError::InvalidDescription { .. })));
        assert_eq!(backend.live(crate::record::ResourceType::PipelineLayout), 0);
    }
}
