//! Render target descriptors
//!
//! Plain value types describing the attachments of a render pass and how its
//! subpasses use them. Render pass creation only needs these descriptions, not
//! the images themselves.

use ash::vk;

/// Pixel format, sample count and intended usage of one render target slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Attachment {
    /// Pixel format of the attachment
    pub format: vk::Format,
    /// Multisample configuration
    pub samples: vk::SampleCountFlags,
    /// Intended access patterns
    pub usage: vk::ImageUsageFlags,
}

impl Attachment {
    /// Create an attachment description
    pub const fn new(format: vk::Format, samples: vk::SampleCountFlags, usage: vk::ImageUsageFlags) -> Self {
        Self { format, samples, usage }
    }

    /// Single-sampled color target
    pub const fn color(format: vk::Format) -> Self {
        Self::new(format, vk::SampleCountFlags::TYPE_1, vk::ImageUsageFlags::COLOR_ATTACHMENT)
    }

    /// Single-sampled depth/stencil target
    pub const fn depth(format: vk::Format) -> Self {
        Self::new(format, vk::SampleCountFlags::TYPE_1, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
    }

    /// Whether the attachment holds depth and/or stencil data
    pub fn is_depth_stencil(&self) -> bool {
        is_depth_stencil_format(self.format)
    }
}

impl Default for Attachment {
    fn default() -> Self {
        Self::new(vk::Format::UNDEFINED, vk::SampleCountFlags::TYPE_1, vk::ImageUsageFlags::SAMPLED)
    }
}

/// What happens to an attachment's contents at the start and end of a render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadStoreInfo {
    /// Whether prior contents are loaded, cleared or discarded
    pub load_op: vk::AttachmentLoadOp,
    /// Whether results are kept or discarded
    pub store_op: vk::AttachmentStoreOp,
}

impl LoadStoreInfo {
    /// Policy used for attachments past the end of the load/store list
    pub const DONT_CARE: Self = Self::new(vk::AttachmentLoadOp::DONT_CARE, vk::AttachmentStoreOp::DONT_CARE);

    /// Create a load/store policy
    pub const fn new(load_op: vk::AttachmentLoadOp, store_op: vk::AttachmentStoreOp) -> Self {
        Self { load_op, store_op }
    }

    /// Clear on load, keep the results
    pub const fn clear_store() -> Self {
        Self::new(vk::AttachmentLoadOp::CLEAR, vk::AttachmentStoreOp::STORE)
    }

    /// Clear on load, discard the results
    pub const fn clear_discard() -> Self {
        Self::new(vk::AttachmentLoadOp::CLEAR, vk::AttachmentStoreOp::DONT_CARE)
    }
}

impl Default for LoadStoreInfo {
    fn default() -> Self {
        Self::DONT_CARE
    }
}

/// Attachments read and written by one subpass
///
/// Indices refer to the attachment list of the enclosing render pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SubpassInfo {
    /// Attachments read as input attachments, in order
    pub input_attachments: Vec<u32>,
    /// Attachments written, in order; a depth/stencil index here selects depth output
    pub output_attachments: Vec<u32>,
}

impl SubpassInfo {
    /// Create a subpass description
    pub fn new(input_attachments: Vec<u32>, output_attachments: Vec<u32>) -> Self {
        Self {
            input_attachments,
            output_attachments,
        }
    }

    /// Subpass that only writes the given attachments
    pub fn outputs(output_attachments: Vec<u32>) -> Self {
        Self::new(Vec::new(), output_attachments)
    }

    /// Largest attachment index referenced, if any
    pub fn max_attachment_index(&self) -> Option<u32> {
        self.input_attachments
            .iter()
            .chain(&self.output_attachments)
            .copied()
            .max()
    }
}

/// Whether the format has a depth component, a stencil component or both
pub fn is_depth_stencil_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D32_SFLOAT
            | vk::Format::S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}
