//! Recording of object creation
//!
//! [`ResourceRecord`] appends one record per registered object. Each object
//! receives the next sequence index of its resource type; composite records
//! refer to their constituents through these indices. Recording never affects
//! the cache.

use rustc_hash::FxHashMap;

use crate::error::{ResourceError, ResourceResult};
use crate::record::codec::LogWriter;
use crate::record::resource_type::{GraphicsPipelineRecord, Record, ResourceType};
use crate::resources::{GraphicsPipeline, PipelineLayout, RenderPass, ResourceId, ShaderModule};

/// Identity to sequence index table for one resource type
#[derive(Debug, Default)]
struct IndexTable {
    indices: FxHashMap<ResourceId, u64>,
    next: u64,
}

impl IndexTable {
    fn push(&mut self, id: ResourceId) -> u64 {
        let index = self.next;
        self.indices.insert(id, index);
        self.next += 1;
        index
    }

    fn set(&mut self, id: ResourceId, index: u64) {
        self.indices.insert(id, index);
    }

    fn resolve(&self, resource_type: ResourceType, id: ResourceId) -> ResourceResult<u64> {
        self.indices
            .get(&id)
            .copied()
            .ok_or(ResourceError::UnrecordedResource { resource_type, id })
    }
}

/// Encoder producing a replayable log
#[derive(Debug)]
pub struct ResourceRecord {
    writer: LogWriter,
    tables: [IndexTable; ResourceType::ALL.len()],
}

impl Default for ResourceRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceRecord {
    /// Empty recording
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Empty recording with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            writer: LogWriter::with_capacity(capacity),
            tables: Default::default(),
        }
    }

    fn table(&self, resource_type: ResourceType) -> &IndexTable {
        &self.tables[resource_type as usize]
    }

    fn table_mut(&mut self, resource_type: ResourceType) -> &mut IndexTable {
        &mut self.tables[resource_type as usize]
    }

    fn append(&mut self, record: &Record, id: ResourceId) -> u64 {
        let resource_type = record.resource_type();
        let offset = self.writer.len();
        self.writer.write(record);
        let index = self.table_mut(resource_type).push(id);
        log::debug!(
            "[RECORD] {} {} recorded as index {} at byte {}",
            resource_type,
            id,
            index,
            offset
        );
        index
    }

    /// Record a shader module, returning its sequence index
    pub fn register_shader_module(&mut self, shader_module: &ShaderModule) -> u64 {
        let record = Record::ShaderModule(shader_module.key().clone());
        self.append(&record, shader_module.id())
    }

    /// Record a pipeline layout, returning its sequence index
    ///
    /// Every shader module of the layout must have been recorded or registered
    /// with [`Self::set_shader_module`]; otherwise nothing is written.
    pub fn register_pipeline_layout(&mut self, pipeline_layout: &PipelineLayout) -> ResourceResult<u64> {
        let modules = self.table(ResourceType::ShaderModule);
        let indices = pipeline_layout
            .shader_modules()
            .iter()
            .map(|module| modules.resolve(ResourceType::ShaderModule, module.id()))
            .collect::<ResourceResult<Vec<_>>>()?;

        Ok(self.append(&Record::PipelineLayout(indices), pipeline_layout.id()))
    }

    /// Record a render pass, returning its sequence index
    pub fn register_render_pass(&mut self, render_pass: &RenderPass) -> u64 {
        let record = Record::RenderPass(render_pass.key().clone());
        self.append(&record, render_pass.id())
    }

    /// Record a graphics pipeline, returning its sequence index
    ///
    /// Its pipeline layout and render pass must already be known to this
    /// recording; otherwise nothing is written.
    pub fn register_graphics_pipeline(&mut self, graphics_pipeline: &GraphicsPipeline) -> ResourceResult<u64> {
        let pipeline_layout = self
            .table(ResourceType::PipelineLayout)
            .resolve(ResourceType::PipelineLayout, graphics_pipeline.pipeline_layout().id())?;
        let render_pass = self
            .table(ResourceType::RenderPass)
            .resolve(ResourceType::RenderPass, graphics_pipeline.render_pass().id())?;

        let record = Record::GraphicsPipeline(GraphicsPipelineRecord {
            pipeline_layout,
            render_pass,
            subpass_index: graphics_pipeline.subpass_index(),
            state: graphics_pipeline.state().clone(),
        });
        Ok(self.append(&record, graphics_pipeline.id()))
    }

    /// Associate a shader module with an index of a log recorded elsewhere
    pub fn set_shader_module(&mut self, index: u64, shader_module: &ShaderModule) {
        self.table_mut(ResourceType::ShaderModule).set(shader_module.id(), index);
    }

    /// Associate a pipeline layout with an index of a log recorded elsewhere
    pub fn set_pipeline_layout(&mut self, index: u64, pipeline_layout: &PipelineLayout) {
        self.table_mut(ResourceType::PipelineLayout).set(pipeline_layout.id(), index);
    }

    /// Associate a render pass with an index of a log recorded elsewhere
    pub fn set_render_pass(&mut self, index: u64, render_pass: &RenderPass) {
        self.table_mut(ResourceType::RenderPass).set(render_pass.id(), index);
    }

    /// Associate a graphics pipeline with an index of a log recorded elsewhere
    pub fn set_graphics_pipeline(&mut self, index: u64, graphics_pipeline: &GraphicsPipeline) {
        self.table_mut(ResourceType::GraphicsPipeline).set(graphics_pipeline.id(), index);
    }

    /// Index an object was recorded or registered under
    pub fn index_of(&self, resource_type: ResourceType, id: ResourceId) -> Option<u64> {
        self.table(resource_type).indices.get(&id).copied()
    }

    /// Number of records of a type appended so far
    pub fn len(&self, resource_type: ResourceType) -> u64 {
        self.table(resource_type).next
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.writer.is_empty()
    }

    /// The log recorded so far
    pub fn data(&self) -> &[u8] {
        self.writer.as_bytes()
    }

    /// Consume the recording, returning the log
    pub fn into_data(self) -> Vec<u8> {
        self.writer.into_bytes()
    }
}
