//! Graphics pipelines
//!
//! A graphics pipeline combines a pipeline layout, a render pass subpass and
//! the complete fixed-function state block. The pipeline keeps both the
//! layout and the render pass alive.

use std::fmt;
use std::sync::Arc;

use ash::vk;

use crate::backend::{Backend, GraphicsPipelineRequest};
use crate::error::{ResourceError, ResourceResult};
use crate::resources::{PipelineLayout, PipelineState, RenderPass, ResourceId};

/// Everything that identifies a graphics pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphicsPipelineKey {
    /// Id of the pipeline layout
    pub pipeline_layout: ResourceId,
    /// Id of the render pass
    pub render_pass: ResourceId,
    /// Subpass of the render pass the pipeline is used in
    pub subpass_index: u32,
    /// Fixed-function state
    pub state: PipelineState,
}

/// Graphics pipeline built by a backend
pub struct GraphicsPipeline {
    id: ResourceId,
    pipeline_layout: Arc<PipelineLayout>,
    render_pass: Arc<RenderPass>,
    subpass_index: u32,
    state: PipelineState,
    handle: vk::Pipeline,
    backend: Arc<dyn Backend>,
}

impl GraphicsPipeline {
    /// Check that a pipeline can be built for this subpass with this state
    pub fn validate(render_pass: &RenderPass, subpass_index: u32, state: &PipelineState) -> ResourceResult<()> {
        let Some(color_outputs) = render_pass.color_output_count(subpass_index) else {
            return Err(ResourceError::invalid(format!(
                "subpass {subpass_index} is out of range for render pass {} with {} subpasses",
                render_pass.id(),
                render_pass.subpass_count()
            )));
        };

        let blend_attachments = state.color_blend.attachments.len();
        if blend_attachments > color_outputs {
            return Err(ResourceError::invalid(format!(
                "{blend_attachments} color blend attachments exceed the {color_outputs} \
                 color outputs of subpass {subpass_index}"
            )));
        }

        Ok(())
    }

    /// Build a graphics pipeline through the backend
    pub fn new(
        backend: Arc<dyn Backend>,
        pipeline_layout: Arc<PipelineLayout>,
        render_pass: Arc<RenderPass>,
        subpass_index: u32,
        state: PipelineState,
    ) -> ResourceResult<Self> {
        Self::validate(&render_pass, subpass_index, &state)?;

        let request = GraphicsPipelineRequest {
            pipeline_layout: &pipeline_layout,
            render_pass: &render_pass,
            subpass_index,
            state: &state,
        };

        let handle = backend.create_graphics_pipeline(&request).map_err(|source| {
            log::error!("[PIPELINE] Backend rejected graphics pipeline: {}", source);
            ResourceError::BuildFailure {
                operation: "Cannot create GraphicsPipeline",
                source,
            }
        })?;

        let id = ResourceId::next();
        log::debug!(
            "[PIPELINE] Created graphics pipeline {} (layout {}, render pass {}, subpass {})",
            id,
            pipeline_layout.id(),
            render_pass.id(),
            subpass_index
        );

        Ok(Self {
            id,
            pipeline_layout,
            render_pass,
            subpass_index,
            state,
            handle,
            backend,
        })
    }

    /// Identity of this pipeline
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Native handle
    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    /// Layout the pipeline was built with
    pub fn pipeline_layout(&self) -> &Arc<PipelineLayout> {
        &self.pipeline_layout
    }

    /// Render pass the pipeline was built for
    pub fn render_pass(&self) -> &Arc<RenderPass> {
        &self.render_pass
    }

    /// Subpass the pipeline was built for
    pub fn subpass_index(&self) -> u32 {
        self.subpass_index
    }

    /// Fixed-function state
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Key this pipeline is cached under
    pub fn key(&self) -> GraphicsPipelineKey {
        GraphicsPipelineKey {
            pipeline_layout: self.pipeline_layout.id(),
            render_pass: self.render_pass.id(),
            subpass_index: self.subpass_index,
            state: self.state.clone(),
        }
    }
}

impl fmt::Debug for GraphicsPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphicsPipeline")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("pipeline_layout", &self.pipeline_layout.id())
            .field("render_pass", &self.render_pass.id())
            .field("subpass_index", &self.subpass_index)
            .finish()
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        log::debug!("[PIPELINE] Dropping graphics pipeline {}", self.id);
        self.backend.destroy_pipeline(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::resources::{Attachment, ColorBlendAttachmentState, ColorBlendState, RenderPassKey, SubpassInfo};

    fn render_pass(backend: &Arc<HeadlessBackend>) -> RenderPass {
        let key = RenderPassKey::new(
            vec![Attachment::color(vk::Format::R8G8B8A8_UNORM), Attachment::depth(vk::Format::D32_SFLOAT)],
            Vec::new(),
            vec![SubpassInfo::outputs(vec![0, 1])],
        )
        .unwrap();
        RenderPass::new(backend.clone(), key).unwrap()
    }

    #[test]
    fn test_subpass_out_of_range_is_rejected() {
        let backend = Arc::new(HeadlessBackend::new());
        let pass = render_pass(&backend);

        assert!(GraphicsPipeline::validate(&pass, 0, &PipelineState::default()).is_ok());
        assert!(matches!(
            GraphicsPipeline::validate(&pass, 1, &PipelineState::default()),
            Err(ResourceError::InvalidDescription { .. })
        ));
    }

    #[test]
    fn test_blend_attachments_must_fit_color_outputs() {
        let backend = Arc::new(HeadlessBackend::new());
        let pass = render_pass(&backend);

        let mut state = PipelineState::default();
        state.set_color_blend_state(ColorBlendState {
            attachments: vec![ColorBlendAttachmentState::default(); 2],
            ..ColorBlendState::default()
        });

        assert!(matches!(
            GraphicsPipeline::validate(&pass, 0, &state),
            Err(ResourceError::InvalidDescription { .. })
        ));
    }
}
