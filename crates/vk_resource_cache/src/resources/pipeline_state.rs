//! Fixed-function state of a graphics pipeline
//!
//! `ash` create-info structs carry raw pointers and floats, so they can neither
//! be hashed nor compared. This module defines owned mirror types holding the
//! fields relevant to pipeline identity. Floats take part in `Hash`/`Eq`
//! through their bit patterns.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use ash::vk;

/// Specialization constants, ordered by constant id
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SpecializationConstantState {
    constants: BTreeMap<u32, Vec<u8>>,
}

impl SpecializationConstantState {
    /// Set a constant from any plain-old-data value
    pub fn set_constant<T: bytemuck::Pod>(&mut self, constant_id: u32, value: T) {
        self.set_raw(constant_id, bytemuck::bytes_of(&value).to_vec());
    }

    /// Set a constant from raw bytes
    pub fn set_raw(&mut self, constant_id: u32, data: Vec<u8>) {
        self.constants.insert(constant_id, data);
    }

    /// Constants in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[u8])> {
        self.constants.iter().map(|(id, data)| (*id, data.as_slice()))
    }

    /// Number of constants
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    /// Whether no constant is set
    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }
}

/// Hashable mirror of `vk::VertexInputBindingDescription`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct VertexInputBinding {
    /// Binding number
    pub binding: u32,
    /// Distance in bytes between consecutive elements
    pub stride: u32,
    /// Per-vertex or per-instance stepping
    pub input_rate: vk::VertexInputRate,
}

/// Hashable mirror of `vk::VertexInputAttributeDescription`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct VertexInputAttribute {
    /// Shader input location
    pub location: u32,
    /// Binding the attribute reads from
    pub binding: u32,
    /// Attribute format
    pub format: vk::Format,
    /// Byte offset inside the binding element
    pub offset: u32,
}

/// Vertex buffer layout
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VertexInputState {
    /// Vertex attributes
    pub attributes: Vec<VertexInputAttribute>,
    /// Vertex buffer bindings
    pub bindings: Vec<VertexInputBinding>,
}

/// Primitive assembly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputAssemblyState {
    /// Primitive topology
    pub topology: vk::PrimitiveTopology,
    /// Whether a special index restarts the primitive
    pub primitive_restart_enable: bool,
}

impl Default for InputAssemblyState {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart_enable: false,
        }
    }
}

/// Rasterization configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterizationState {
    /// Clamp fragment depth instead of clipping
    pub depth_clamp_enable: bool,
    /// Discard primitives before rasterization
    pub rasterizer_discard_enable: bool,
    /// Fill, line or point rasterization
    pub polygon_mode: vk::PolygonMode,
    /// Faces to cull
    pub cull_mode: vk::CullModeFlags,
    /// Winding considered front-facing
    pub front_face: vk::FrontFace,
    /// Whether depth bias is applied
    pub depth_bias_enable: bool,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            depth_clamp_enable: false,
            rasterizer_discard_enable: false,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_bias_enable: false,
        }
    }
}

/// Number of viewports and scissors; their values are dynamic state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewportState {
    /// Number of viewports
    pub viewport_count: u32,
    /// Number of scissor rectangles
    pub scissor_count: u32,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            viewport_count: 1,
            scissor_count: 1,
        }
    }
}

/// Multisample configuration
#[derive(Debug, Clone, Copy)]
pub struct MultisampleState {
    /// Samples used during rasterization
    pub rasterization_samples: vk::SampleCountFlags,
    /// Whether sample shading is enabled
    pub sample_shading_enable: bool,
    /// Minimum fraction of sample shading
    pub min_sample_shading: f32,
    /// Sample coverage mask, applied as given; 0 masks out every sample
    pub sample_mask: u32,
    /// Alpha to coverage
    pub alpha_to_coverage_enable: bool,
    /// Alpha to one
    pub alpha_to_one_enable: bool,
}

impl Default for MultisampleState {
    fn default() -> Self {
        Self {
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            sample_shading_enable: false,
            min_sample_shading: 0.0,
            sample_mask: u32::MAX,
            alpha_to_coverage_enable: false,
            alpha_to_one_enable: false,
        }
    }
}

impl PartialEq for MultisampleState {
    fn eq(&self, other: &Self) -> bool {
        self.rasterization_samples == other.rasterization_samples
            && self.sample_shading_enable == other.sample_shading_enable
            && self.min_sample_shading.to_bits() == other.min_sample_shading.to_bits()
            && self.sample_mask == other.sample_mask
            && self.alpha_to_coverage_enable == other.alpha_to_coverage_enable
            && self.alpha_to_one_enable == other.alpha_to_one_enable
    }
}

impl Eq for MultisampleState {}

impl Hash for MultisampleState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rasterization_samples.hash(state);
        self.sample_shading_enable.hash(state);
        self.min_sample_shading.to_bits().hash(state);
        self.sample_mask.hash(state);
        self.alpha_to_coverage_enable.hash(state);
        self.alpha_to_one_enable.hash(state);
    }
}

/// Stencil operations for one face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilOpState {
    /// Action when the stencil test fails
    pub fail_op: vk::StencilOp,
    /// Action when both tests pass
    pub pass_op: vk::StencilOp,
    /// Action when the stencil test passes but the depth test fails
    pub depth_fail_op: vk::StencilOp,
    /// Stencil comparison
    pub compare_op: vk::CompareOp,
}

impl Default for StencilOpState {
    fn default() -> Self {
        Self {
            fail_op: vk::StencilOp::REPLACE,
            pass_op: vk::StencilOp::REPLACE,
            depth_fail_op: vk::StencilOp::REPLACE,
            compare_op: vk::CompareOp::NEVER,
        }
    }
}

/// Depth and stencil testing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    /// Depth test
    pub depth_test_enable: bool,
    /// Depth writes
    pub depth_write_enable: bool,
    /// Depth comparison; reversed-Z by default
    pub depth_compare_op: vk::CompareOp,
    /// Depth bounds test
    pub depth_bounds_test_enable: bool,
    /// Stencil test
    pub stencil_test_enable: bool,
    /// Front face stencil state
    pub front: StencilOpState,
    /// Back face stencil state
    pub back: StencilOpState,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: vk::CompareOp::GREATER,
            depth_bounds_test_enable: false,
            stencil_test_enable: false,
            front: StencilOpState::default(),
            back: StencilOpState::default(),
        }
    }
}

/// Blending of one color attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorBlendAttachmentState {
    /// Whether blending is enabled
    pub blend_enable: bool,
    /// Source color factor
    pub src_color_blend_factor: vk::BlendFactor,
    /// Destination color factor
    pub dst_color_blend_factor: vk::BlendFactor,
    /// Color blend operation
    pub color_blend_op: vk::BlendOp,
    /// Source alpha factor
    pub src_alpha_blend_factor: vk::BlendFactor,
    /// Destination alpha factor
    pub dst_alpha_blend_factor: vk::BlendFactor,
    /// Alpha blend operation
    pub alpha_blend_op: vk::BlendOp,
    /// Components written
    pub color_write_mask: vk::ColorComponentFlags,
}

impl ColorBlendAttachmentState {
    /// Standard `src_alpha, one_minus_src_alpha` blending
    pub fn alpha_blend() -> Self {
        Self {
            blend_enable: true,
            src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
            dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ZERO,
            ..Self::default()
        }
    }

    pub(crate) fn to_vk(self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState::builder()
            .blend_enable(self.blend_enable)
            .src_color_blend_factor(self.src_color_blend_factor)
            .dst_color_blend_factor(self.dst_color_blend_factor)
            .color_blend_op(self.color_blend_op)
            .src_alpha_blend_factor(self.src_alpha_blend_factor)
            .dst_alpha_blend_factor(self.dst_alpha_blend_factor)
            .alpha_blend_op(self.alpha_blend_op)
            .color_write_mask(self.color_write_mask)
            .build()
    }
}

impl Default for ColorBlendAttachmentState {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_color_blend_factor: vk::BlendFactor::ONE,
            dst_color_blend_factor: vk::BlendFactor::ZERO,
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ZERO,
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        }
    }
}

/// Color blending for all attachments of a subpass
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColorBlendState {
    /// Whether the logic op replaces blending
    pub logic_op_enable: bool,
    /// Logic operation
    pub logic_op: vk::LogicOp,
    /// Per-attachment blending, one entry per color attachment
    pub attachments: Vec<ColorBlendAttachmentState>,
}

impl Default for ColorBlendState {
    fn default() -> Self {
        Self {
            logic_op_enable: false,
            logic_op: vk::LogicOp::CLEAR,
            attachments: Vec::new(),
        }
    }
}

/// Complete fixed-function state block of a graphics pipeline
///
/// Each setter replaces one sub-state; a pipeline needing different state is a
/// different cache key, never a mutation of an existing pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PipelineState {
    /// Specialization constants applied to every stage
    pub specialization_constants: SpecializationConstantState,
    /// Vertex buffer layout
    pub vertex_input: VertexInputState,
    /// Primitive assembly
    pub input_assembly: InputAssemblyState,
    /// Rasterization
    pub rasterization: RasterizationState,
    /// Viewport and scissor counts
    pub viewport: ViewportState,
    /// Multisampling
    pub multisample: MultisampleState,
    /// Depth and stencil testing
    pub depth_stencil: DepthStencilState,
    /// Color blending
    pub color_blend: ColorBlendState,
}

impl PipelineState {
    /// Set one specialization constant
    pub fn set_specialization_constant<T: bytemuck::Pod>(&mut self, constant_id: u32, value: T) -> &mut Self {
        self.specialization_constants.set_constant(constant_id, value);
        self
    }

    /// Replace the vertex input state
    pub fn set_vertex_input_state(&mut self, state: VertexInputState) -> &mut Self {
        self.vertex_input = state;
        self
    }

    /// Replace the input assembly state
    pub fn set_input_assembly_state(&mut self, state: InputAssemblyState) -> &mut Self {
        self.input_assembly = state;
        self
    }

    /// Replace the rasterization state
    pub fn set_rasterization_state(&mut self, state: RasterizationState) -> &mut Self {
        self.rasterization = state;
        self
    }

    /// Replace the viewport state
    pub fn set_viewport_state(&mut self, state: ViewportState) -> &mut Self {
        self.viewport = state;
        self
    }

    /// Replace the multisample state
    pub fn set_multisample_state(&mut self, state: MultisampleState) -> &mut Self {
        self.multisample = state;
        self
    }

    /// Replace the depth/stencil state
    pub fn set_depth_stencil_state(&mut self, state: DepthStencilState) -> &mut Self {
        self.depth_stencil = state;
        self
    }

    /// Replace the color blend state
    pub fn set_color_blend_state(&mut self, state: ColorBlendState) -> &mut Self {
        self.color_blend = state;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_specialization_constants_are_ordered_by_id() {
        let mut constants = SpecializationConstantState::default();
        constants.set_constant(7, 1.5f32);
        constants.set_constant(2, 3u32);

        let ids: Vec<u32> = constants.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![2, 7]);
        assert_eq!(constants.iter().next().unwrap().1, 3u32.to_ne_bytes());
    }

    #[test]
    fn test_float_fields_hash_by_bits() {
        let mut a = MultisampleState::default();
        a.min_sample_shading = 0.25;
        let mut b = a;
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        b.min_sample_shading = 0.5;
        assert_ne!(a, b);
    }

    #[test]
    fn test_default_sample_mask_covers_every_sample() {
        let default = MultisampleState::default();
        assert_eq!(default.sample_mask, u32::MAX);

        let masked = MultisampleState {
            sample_mask: 0,
            ..default
        };
        assert_ne!(default, masked);
    }

    #[test]
    fn test_changing_state_changes_identity() {
        let base = PipelineState::default();
        let mut culled_front = base.clone();
        culled_front.set_rasterization_state(RasterizationState {
            cull_mode: vk::CullModeFlags::FRONT,
            ..RasterizationState::default()
        });

        assert_ne!(base, culled_front);
        assert_ne!(hash_of(&base), hash_of(&culled_front));
    }
}
