//! Replay of recorded logs
//!
//! [`ResourceReplay`] decodes a log record by record and requests every object
//! from a [`ResourceCache`]. Objects already present in the cache are reused.
//! Back-references are resolved against the objects replayed so far, per
//! resource type, so a log can be played in several consecutive chunks.

use std::sync::Arc;

use crate::cache::ResourceCache;
use crate::config::ResourceCacheConfig;
use crate::error::{MalformedLog, ResourceResult};
use crate::record::codec::LogReader;
use crate::record::resource_type::{GraphicsPipelineRecord, Record, ResourceType};
use crate::resources::{GraphicsPipeline, PipelineLayout, RenderPass, ShaderModule};

/// A record skipped because its tag is unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedRecord {
    /// The unknown tag
    pub tag: u32,
    /// Byte offset of the tag
    pub offset: usize,
}

/// Outcome of one [`ResourceReplay::play`] call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Records replayed successfully
    pub records: usize,
    /// Records skipped, in stream order
    pub unsupported: Vec<UnsupportedRecord>,
}

impl ReplayReport {
    /// Whether every record was understood
    pub fn is_complete(&self) -> bool {
        self.unsupported.is_empty()
    }
}

/// Decoder rebuilding the objects of a log
#[derive(Debug, Default)]
pub struct ResourceReplay {
    strict: bool,
    shader_modules: Vec<Arc<ShaderModule>>,
    pipeline_layouts: Vec<Arc<PipelineLayout>>,
    render_passes: Vec<Arc<RenderPass>>,
    graphics_pipelines: Vec<Arc<GraphicsPipeline>>,
}

fn resolve<T>(table: &[Arc<T>], resource_type: ResourceType, index: u64) -> Result<Arc<T>, MalformedLog> {
    usize::try_from(index)
        .ok()
        .and_then(|i| table.get(i))
        .cloned()
        .ok_or(MalformedLog::IndexOutOfRange {
            resource_type,
            index,
            len: table.len(),
        })
}

impl ResourceReplay {
    /// Replay skipping unsupported records
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay using the strictness of a cache configuration
    pub fn from_config(config: &ResourceCacheConfig) -> Self {
        Self {
            strict: config.strict_replay,
            ..Self::default()
        }
    }

    /// Whether unsupported records fail the replay
    pub fn set_strict(&mut self, strict: bool) -> &mut Self {
        self.strict = strict;
        self
    }

    /// Replay a whole log against `cache`
    ///
    /// Stops at the first malformed record; objects replayed before it stay in
    /// the cache and in this replay's tables.
    pub fn play(&mut self, cache: &ResourceCache, data: &[u8]) -> ResourceResult<ReplayReport> {
        let mut reader = LogReader::new(data);
        let mut report = ReplayReport::default();

        while !reader.is_empty() {
            let offset = reader.offset();
            let tag = reader.read_u32()?;

            match ResourceType::try_from(tag) {
                Ok(resource_type) => {
                    let record = Record::decode_payload(resource_type, &mut reader)?;
                    self.apply(cache, record)?;
                    report.records += 1;
                }
                Err(tag) if self.strict => {
                    return Err(MalformedLog::UnsupportedTag { tag, offset }.into());
                }
                Err(tag) => {
                    log::warn!("[REPLAY] Skipping unsupported record tag {} at byte {}", tag, offset);
                    report.unsupported.push(UnsupportedRecord { tag, offset });
                }
            }
        }

        log::debug!(
            "[REPLAY] Replayed {} records, skipped {}",
            report.records,
            report.unsupported.len()
        );
        Ok(report)
    }

    fn apply(&mut self, cache: &ResourceCache, record: Record) -> ResourceResult<()> {
        match record {
            Record::ShaderModule(key) => {
                let shader_module = cache.request_shader_module(key)?;
                self.shader_modules.push(shader_module);
            }
            Record::PipelineLayout(indices) => {
                let shader_modules = indices
                    .into_iter()
                    .map(|index| resolve(&self.shader_modules, ResourceType::ShaderModule, index))
                    .collect::<Result<Vec<_>, _>>()?;
                let pipeline_layout = cache.request_pipeline_layout(&shader_modules)?;
                self.pipeline_layouts.push(pipeline_layout);
            }
            Record::RenderPass(key) => {
                let render_pass = cache.request_render_pass(key)?;
                self.render_passes.push(render_pass);
            }
            Record::GraphicsPipeline(GraphicsPipelineRecord {
                pipeline_layout,
                render_pass,
                subpass_index,
                state,
            }) => {
                let pipeline_layout = resolve(&self.pipeline_layouts, ResourceType::PipelineLayout, pipeline_layout)?;
                let render_pass = resolve(&self.render_passes, ResourceType::RenderPass, render_pass)?;
                let graphics_pipeline =
                    cache.request_graphics_pipeline(&pipeline_layout, &render_pass, subpass_index, state)?;
                self.graphics_pipelines.push(graphics_pipeline);
            }
        }
        Ok(())
    }

    /// Shader modules in replay order
    pub fn shader_modules(&self) -> &[Arc<ShaderModule>] {
        &self.shader_modules
    }

    /// Pipeline layouts in replay order
    pub fn pipeline_layouts(&self) -> &[Arc<PipelineLayout>] {
        &self.pipeline_layouts
    }

    /// Render passes in replay order
    pub fn render_passes(&self) -> &[Arc<RenderPass>] {
        &self.render_passes
    }

    /// Graphics pipelines in replay order
    pub fn graphics_pipelines(&self) -> &[Arc<GraphicsPipeline>] {
        &self.graphics_pipelines
    }
}
