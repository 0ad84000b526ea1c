//! Render pass construction
//!
//! A render pass is described by its attachments, their load/store policies and
//! the subpasses using them. Everything else Vulkan wants, the attachment
//! references, the initial and final layout of every attachment and the
//! dependencies between subpasses, is inferred here:
//!
//! 1. The depth/stencil attachment is found by format (the last one wins).
//! 2. With no subpasses declared, one subpass writing every color attachment
//!    (layout `GENERAL`) and the depth attachment is synthesized.
//! 3. Declared outputs become color references unless they are the depth
//!    attachment; inputs get a read-only layout matching their format; every
//!    subpass writes the depth attachment if the pass has one.
//! 4. Initial layouts come from the first reference to each attachment,
//!    scanning subpasses in order (color, then input, then depth).
//! 5. Final layouts come from the last subpass only. If that subpass reads the
//!    depth attachment as an input, its depth output is dropped.
//! 6. Consecutive subpasses are chained by a by-region dependency from color
//!    output writes to fragment shader input attachment reads.
//!
//! [`RenderPassDescription::infer`] performs all of this without a device so
//! the result can be inspected; [`RenderPass::new`] hands it to the backend.

use std::fmt;
use std::sync::Arc;

use ash::vk;

use crate::backend::Backend;
use crate::error::{ResourceError, ResourceResult};
use crate::resources::attachment::{is_depth_stencil_format, Attachment, LoadStoreInfo, SubpassInfo};
use crate::resources::ResourceId;

/// Everything that identifies a render pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RenderPassKey {
    /// Attachments, in framebuffer order
    pub attachments: Vec<Attachment>,
    /// Load/store policy per attachment; may be shorter than `attachments`
    pub load_store_infos: Vec<LoadStoreInfo>,
    /// Subpasses; may be empty
    pub subpasses: Vec<SubpassInfo>,
}

impl RenderPassKey {
    /// Create a key, checking every subpass reference against the attachment list
    pub fn new(
        attachments: Vec<Attachment>,
        load_store_infos: Vec<LoadStoreInfo>,
        subpasses: Vec<SubpassInfo>,
    ) -> ResourceResult<Self> {
        let key = Self {
            attachments,
            load_store_infos,
            subpasses,
        };
        key.validate()?;
        Ok(key)
    }

    /// Check every subpass reference against the attachment list
    pub fn validate(&self) -> ResourceResult<()> {
        let attachment_count = self.attachments.len();
        for (subpass_index, subpass) in self.subpasses.iter().enumerate() {
            if let Some(max_index) = subpass.max_attachment_index() {
                if max_index as usize >= attachment_count {
                    return Err(ResourceError::invalid(format!(
                        "subpass {subpass_index} references attachment {max_index} \
                         but the render pass has {attachment_count} attachments"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Attachment references of one subpass
#[derive(Debug, Clone, Default)]
pub struct SubpassDescription {
    /// Input attachment references, in declared order
    pub input_attachments: Vec<vk::AttachmentReference>,
    /// Color attachment references, in declared order
    pub color_attachments: Vec<vk::AttachmentReference>,
    /// Depth/stencil reference, if the subpass writes depth
    pub depth_stencil_attachment: Option<vk::AttachmentReference>,
}

/// Fully specified render pass, ready to be handed to a backend
#[derive(Debug, Clone, Default)]
pub struct RenderPassDescription {
    /// Attachment descriptions with inferred layouts
    pub attachments: Vec<vk::AttachmentDescription>,
    /// Subpass descriptions; never empty
    pub subpasses: Vec<SubpassDescription>,
    /// One dependency per consecutive pair of subpasses
    pub dependencies: Vec<vk::SubpassDependency>,
    /// Index of the depth/stencil attachment, if any
    pub depth_stencil_attachment: Option<u32>,
}

fn reference(attachment: u32, layout: vk::ImageLayout) -> vk::AttachmentReference {
    vk::AttachmentReference { attachment, layout }
}

fn set_initial_layout(attachments: &mut [vk::AttachmentDescription], reference: &vk::AttachmentReference) {
    let description = &mut attachments[reference.attachment as usize];
    if description.initial_layout == vk::ImageLayout::UNDEFINED {
        description.initial_layout = reference.layout;
    }
}

impl RenderPassDescription {
    /// Infer layouts, references and dependencies for a render pass key
    pub fn infer(key: &RenderPassKey) -> ResourceResult<Self> {
        key.validate()?;

        let mut depth_stencil_attachment = None;

        let mut attachments: Vec<vk::AttachmentDescription> = key
            .attachments
            .iter()
            .enumerate()
            .map(|(index, attachment)| {
                let load_store = key.load_store_infos.get(index).copied().unwrap_or_default();

                if attachment.is_depth_stencil() {
                    depth_stencil_attachment = Some(index as u32);
                }

                vk::AttachmentDescription::builder()
                    .format(attachment.format)
                    .samples(attachment.samples)
                    .load_op(load_store.load_op)
                    .store_op(load_store.store_op)
                    .stencil_load_op(load_store.load_op)
                    .stencil_store_op(load_store.store_op)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(vk::ImageLayout::UNDEFINED)
                    .build()
            })
            .collect();

        let depth_reference =
            depth_stencil_attachment.map(|index| reference(index, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL));

        let mut subpasses: Vec<SubpassDescription> = key
            .subpasses
            .iter()
            .map(|subpass| {
                let color_attachments = subpass
                    .output_attachments
                    .iter()
                    .filter(|&&output| Some(output) != depth_stencil_attachment)
                    .map(|&output| reference(output, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL))
                    .collect();

                let input_attachments = subpass
                    .input_attachments
                    .iter()
                    .map(|&input| {
                        let layout = if is_depth_stencil_format(attachments[input as usize].format) {
                            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
                        } else {
                            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                        };
                        reference(input, layout)
                    })
                    .collect();

                SubpassDescription {
                    input_attachments,
                    color_attachments,
                    depth_stencil_attachment: depth_reference,
                }
            })
            .collect();

        if subpasses.is_empty() {
            let color_attachments = (0..attachments.len() as u32)
                .filter(|&index| Some(index) != depth_stencil_attachment)
                .map(|index| reference(index, vk::ImageLayout::GENERAL))
                .collect();

            subpasses.push(SubpassDescription {
                input_attachments: Vec::new(),
                color_attachments,
                depth_stencil_attachment: depth_reference,
            });
        }

        for subpass in &subpasses {
            for color in &subpass.color_attachments {
                set_initial_layout(&mut attachments, color);
            }
            for input in &subpass.input_attachments {
                set_initial_layout(&mut attachments, input);
            }
            if let Some(depth) = &subpass.depth_stencil_attachment {
                set_initial_layout(&mut attachments, depth);
            }
        }

        if let Some(last) = subpasses.last_mut() {
            for color in &last.color_attachments {
                attachments[color.attachment as usize].final_layout = color.layout;
            }
            for input in &last.input_attachments {
                attachments[input.attachment as usize].final_layout = input.layout;

                if Some(input.attachment) == depth_stencil_attachment {
                    last.depth_stencil_attachment = None;
                }
            }
            if let Some(depth) = &last.depth_stencil_attachment {
                attachments[depth.attachment as usize].final_layout = depth.layout;
            }
        }

        let dependencies = (1..subpasses.len() as u32)
            .map(|dst_subpass| {
                vk::SubpassDependency::builder()
                    .src_subpass(dst_subpass - 1)
                    .dst_subpass(dst_subpass)
                    .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                    .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
                    .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                    .dst_access_mask(vk::AccessFlags::INPUT_ATTACHMENT_READ)
                    .dependency_flags(vk::DependencyFlags::BY_REGION)
                    .build()
            })
            .collect();

        Ok(Self {
            attachments,
            subpasses,
            dependencies,
            depth_stencil_attachment,
        })
    }

    /// Run `f` with a `vk::RenderPassCreateInfo` pointing into this description
    ///
    /// The create info borrows temporary arrays and must not escape `f`.
    pub fn with_create_info<R>(&self, f: impl FnOnce(&vk::RenderPassCreateInfo) -> R) -> R {
        let subpasses: Vec<vk::SubpassDescription> = self
            .subpasses
            .iter()
            .map(|subpass| {
                let mut builder = vk::SubpassDescription::builder()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .input_attachments(&subpass.input_attachments)
                    .color_attachments(&subpass.color_attachments);
                if let Some(depth) = &subpass.depth_stencil_attachment {
                    builder = builder.depth_stencil_attachment(depth);
                }
                builder.build()
            })
            .collect();

        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&self.attachments)
            .subpasses(&subpasses)
            .dependencies(&self.dependencies);

        f(&create_info)
    }
}

/// Render pass built by a backend
pub struct RenderPass {
    id: ResourceId,
    key: RenderPassKey,
    description: RenderPassDescription,
    handle: vk::RenderPass,
    backend: Arc<dyn Backend>,
}

impl RenderPass {
    /// Infer the full description and build it through the backend
    pub fn new(backend: Arc<dyn Backend>, key: RenderPassKey) -> ResourceResult<Self> {
        let description = RenderPassDescription::infer(&key)?;

        let handle = backend
            .create_render_pass(&description)
            .map_err(|source| {
                log::error!("[RENDER_PASS] Backend rejected render pass: {}", source);
                ResourceError::BuildFailure {
                    operation: "Cannot create RenderPass",
                    source,
                }
            })?;

        let id = ResourceId::next();
        log::debug!(
            "[RENDER_PASS] Created render pass {} ({} attachments, {} subpasses)",
            id,
            description.attachments.len(),
            description.subpasses.len()
        );

        Ok(Self {
            id,
            key,
            description,
            handle,
            backend,
        })
    }

    /// Identity of this render pass
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Native handle
    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }

    /// Inferred description the pass was built from
    pub fn description(&self) -> &RenderPassDescription {
        &self.description
    }

    /// Declared parameters the pass was built from
    pub fn key(&self) -> &RenderPassKey {
        &self.key
    }

    /// Number of subpasses, including a synthesized default subpass
    pub fn subpass_count(&self) -> u32 {
        self.description.subpasses.len() as u32
    }

    /// Number of color attachments written by a subpass
    pub fn color_output_count(&self, subpass_index: u32) -> Option<usize> {
        self.description
            .subpasses
            .get(subpass_index as usize)
            .map(|subpass| subpass.color_attachments.len())
    }
}

impl fmt::Debug for RenderPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderPass")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("attachments", &self.key.attachments.len())
            .field("subpasses", &self.description.subpasses.len())
            .finish()
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        log::debug!("[RENDER_PASS] Dropping render pass {}", self.id);
        self.backend.destroy_render_pass(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color(format: vk::Format) -> Attachment {
        Attachment::color(format)
    }

    fn infer(attachments: Vec<Attachment>, load_store: Vec<LoadStoreInfo>, subpasses: Vec<SubpassInfo>) -> RenderPassDescription {
        RenderPassDescription::infer(&RenderPassKey::new(attachments, load_store, subpasses).unwrap()).unwrap()
    }

    #[test]
    fn test_default_subpass_uses_general_layout() {
        let description = infer(
            vec![color(vk::Format::R8G8B8A8_UNORM), color(vk::Format::R16G16B16A16_SFLOAT)],
            Vec::new(),
            Vec::new(),
        );

        assert_eq!(description.subpasses.len(), 1);
        let subpass = &description.subpasses[0];
        let outputs: Vec<u32> = subpass.color_attachments.iter().map(|r| r.attachment).collect();
        assert_eq!(outputs, vec![0, 1]);
        assert!(subpass.color_attachments.iter().all(|r| r.layout == vk::ImageLayout::GENERAL));
        assert!(subpass.depth_stencil_attachment.is_none());

        for attachment in &description.attachments {
            assert_eq!(attachment.initial_layout, vk::ImageLayout::GENERAL);
            assert_eq!(attachment.final_layout, vk::ImageLayout::GENERAL);
        }
        assert!(description.dependencies.is_empty());
    }

    #[test]
    fn test_default_subpass_writes_depth() {
        let description = infer(
            vec![color(vk::Format::B8G8R8A8_SRGB), Attachment::depth(vk::Format::D32_SFLOAT)],
            Vec::new(),
            Vec::new(),
        );

        let subpass = &description.subpasses[0];
        assert_eq!(subpass.color_attachments.len(), 1);
        let depth = subpass.depth_stencil_attachment.unwrap();
        assert_eq!(depth.attachment, 1);
        assert_eq!(depth.layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        assert_eq!(description.depth_stencil_attachment, Some(1));
    }

    #[test]
    fn test_explicit_subpass_separates_depth_output() {
        let description = infer(
            vec![color(vk::Format::R8G8B8A8_UNORM), Attachment::depth(vk::Format::D24_UNORM_S8_UINT)],
            Vec::new(),
            vec![SubpassInfo::outputs(vec![0, 1])],
        );

        let subpass = &description.subpasses[0];
        assert_eq!(subpass.color_attachments.len(), 1);
        assert_eq!(subpass.color_attachments[0].attachment, 0);
        assert_eq!(subpass.color_attachments[0].layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let depth = subpass.depth_stencil_attachment.unwrap();
        assert_eq!(depth.attachment, 1);
        assert_eq!(depth.layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let depth_description = &description.attachments[1];
        assert_eq!(depth_description.initial_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        assert_eq!(depth_description.final_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_missing_load_store_defaults_to_dont_care() {
        let description = infer(
            vec![color(vk::Format::R8G8B8A8_UNORM), color(vk::Format::R8G8B8A8_UNORM)],
            vec![LoadStoreInfo::clear_store()],
            Vec::new(),
        );

        assert_eq!(description.attachments[0].load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(description.attachments[0].store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(description.attachments[0].stencil_load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(description.attachments[1].load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(description.attachments[1].store_op, vk::AttachmentStoreOp::DONT_CARE);
    }

    #[test]
    fn test_multi_subpass_dependencies_chain_consecutive_pairs() {
        let attachments = vec![
            color(vk::Format::R8G8B8A8_UNORM),
            color(vk::Format::R16G16B16A16_SFLOAT),
            color(vk::Format::R8G8B8A8_UNORM),
            Attachment::depth(vk::Format::D32_SFLOAT),
        ];
        let subpasses = vec![
            SubpassInfo::outputs(vec![1, 3]),
            SubpassInfo::new(vec![1], vec![2]),
            SubpassInfo::new(vec![2], vec![0]),
        ];
        let description = infer(attachments, Vec::new(), subpasses);

        assert_eq!(description.dependencies.len(), 2);
        for (i, dependency) in description.dependencies.iter().enumerate() {
            assert_eq!(dependency.src_subpass, i as u32);
            assert_eq!(dependency.dst_subpass, i as u32 + 1);
            assert_eq!(dependency.src_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
            assert_eq!(dependency.dst_stage_mask, vk::PipelineStageFlags::FRAGMENT_SHADER);
            assert_eq!(dependency.src_access_mask, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
            assert_eq!(dependency.dst_access_mask, vk::AccessFlags::INPUT_ATTACHMENT_READ);
            assert_eq!(dependency.dependency_flags, vk::DependencyFlags::BY_REGION);
        }
    }

    #[test]
    fn test_initial_layout_comes_from_first_reference() {
        let attachments = vec![color(vk::Format::R8G8B8A8_UNORM), color(vk::Format::R16G16B16A16_SFLOAT)];
        let subpasses = vec![SubpassInfo::outputs(vec![1]), SubpassInfo::new(vec![1], vec![0])];
        let description = infer(attachments, Vec::new(), subpasses);

        assert_eq!(description.attachments[1].initial_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(description.attachments[1].final_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(description.attachments[0].initial_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(description.attachments[0].final_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_final_layout_only_from_last_subpass() {
        let attachments = vec![color(vk::Format::R8G8B8A8_UNORM), color(vk::Format::R8G8B8A8_UNORM)];
        let subpasses = vec![SubpassInfo::outputs(vec![0]), SubpassInfo::outputs(vec![1])];
        let description = infer(attachments, Vec::new(), subpasses);

        assert_eq!(description.attachments[0].initial_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(description.attachments[0].final_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(description.attachments[1].final_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_depth_input_in_last_subpass_drops_depth_output() {
        let attachments = vec![color(vk::Format::R8G8B8A8_UNORM), Attachment::depth(vk::Format::D32_SFLOAT)];
        let subpasses = vec![SubpassInfo::outputs(vec![1]), SubpassInfo::new(vec![1], vec![0])];
        let description = infer(attachments, Vec::new(), subpasses);

        assert!(description.subpasses[0].depth_stencil_attachment.is_some());
        assert!(description.subpasses[1].depth_stencil_attachment.is_none());

        let input = description.subpasses[1].input_attachments[0];
        assert_eq!(input.layout, vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);

        let depth = &description.attachments[1];
        assert_eq!(depth.initial_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        assert_eq!(depth.final_layout, vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_unreferenced_attachment_stays_undefined() {
        let attachments = vec![color(vk::Format::R8G8B8A8_UNORM), color(vk::Format::R8G8B8A8_UNORM)];
        let description = infer(attachments, Vec::new(), vec![SubpassInfo::outputs(vec![0])]);

        assert_eq!(description.attachments[1].initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(description.attachments[1].final_layout, vk::ImageLayout::UNDEFINED);
    }

    #[test]
    fn test_out_of_range_subpass_reference_is_rejected() {
        let result = RenderPassKey::new(
            vec![color(vk::Format::R8G8B8A8_UNORM)],
            Vec::new(),
            vec![SubpassInfo::new(vec![1], vec![0])],
        );

        assert!(matches!(result, Err(ResourceError::InvalidDescription { .. })));

        let key = RenderPassKey {
            attachments: vec![color(vk::Format::R8G8B8A8_UNORM)],
            load_store_infos: Vec::new(),
            subpasses: vec![SubpassInfo::outputs(vec![0, 2])],
        };
        assert!(matches!(
            RenderPassDescription::infer(&key),
            Err(ResourceError::InvalidDescription { .. })
        ));
    }

    #[test]
    fn test_create_info_points_at_description() {
        let description = infer(
            vec![color(vk::Format::R8G8B8A8_UNORM), Attachment::depth(vk::Format::D32_SFLOAT)],
            Vec::new(),
            vec![SubpassInfo::outputs(vec![0]), SubpassInfo::new(vec![0], vec![0])],
        );

        description.with_create_info(|info| {
            assert_eq!(info.attachment_count, 2);
            assert_eq!(info.subpass_count, 2);
            assert_eq!(info.dependency_count, 1);
        });
    }
}
