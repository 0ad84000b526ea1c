//! Vulkan backend
//!
//! Creates pipeline objects on a live `ash::Device`. The device is owned by the
//! caller and must outlive the backend and every object built through it.

#![allow(unsafe_code)]

pub mod shader_compiler;

use std::ffi::CString;
use std::sync::Arc;

use ash::{vk, Device};

pub use shader_compiler::{CompiledSpirv, ShaderCompiler, SpirvPassthrough};

use super::{Backend, CompiledShaderModule, GraphicsPipelineRequest};
use crate::error::{BackendError, BackendResult};
use crate::resources::{PipelineState, RenderPassDescription, ShaderModule, ShaderModuleKey};

/// Backend creating real Vulkan objects
pub struct VulkanBackend {
    device: Device,
    pipeline_cache: vk::PipelineCache,
    compiler: Box<dyn ShaderCompiler>,
}

impl VulkanBackend {
    /// Create a backend treating shader sources as precompiled SPIR-V
    pub fn new(device: Device) -> BackendResult<Self> {
        Self::with_compiler(device, Box::new(SpirvPassthrough::new()))
    }

    /// Create a backend with a custom shader compiler
    pub fn with_compiler(device: Device, compiler: Box<dyn ShaderCompiler>) -> BackendResult<Self> {
        let create_info = vk::PipelineCacheCreateInfo::builder();
        let pipeline_cache = unsafe {
            device.create_pipeline_cache(&create_info, None).map_err(|e| {
                log::error!("[VULKAN] vkCreatePipelineCache failed: {:?}", e);
                BackendError::new(e, "Cannot create pipeline cache")
            })?
        };

        log::info!("[VULKAN] Backend ready (pipeline cache {:?})", pipeline_cache);
        Ok(Self {
            device,
            pipeline_cache,
            compiler,
        })
    }
}

/// Owned specialization data shared by every stage of a pipeline
struct SpecializationData {
    entries: Vec<vk::SpecializationMapEntry>,
    data: Vec<u8>,
}

impl SpecializationData {
    fn new(state: &PipelineState) -> Self {
        let mut entries = Vec::with_capacity(state.specialization_constants.len());
        let mut data = Vec::new();
        for (constant_id, bytes) in state.specialization_constants.iter() {
            entries.push(vk::SpecializationMapEntry {
                constant_id,
                offset: data.len() as u32,
                size: bytes.len(),
            });
            data.extend_from_slice(bytes);
        }
        Self { entries, data }
    }
}

impl Backend for VulkanBackend {
    fn create_shader_module(&self, key: &ShaderModuleKey) -> BackendResult<CompiledShaderModule> {
        let compiled = self.compiler.compile(key)?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&compiled.code);
        let handle = unsafe {
            self.device.create_shader_module(&create_info, None).map_err(|e| {
                log::error!("[VULKAN] vkCreateShaderModule failed: {:?}", e);
                BackendError::new(e, "vkCreateShaderModule failed")
            })?
        };

        Ok(CompiledShaderModule {
            handle,
            push_constant_size: compiled.push_constant_size,
        })
    }

    fn create_pipeline_layout(&self, shader_modules: &[Arc<ShaderModule>]) -> BackendResult<vk::PipelineLayout> {
        let (stage_flags, size) = shader_modules
            .iter()
            .filter(|module| module.push_constant_size() > 0)
            .fold((vk::ShaderStageFlags::empty(), 0), |(stages, size), module| {
                (stages | module.stage(), size.max(module.push_constant_size()))
            });

        let push_constant_ranges: Vec<vk::PushConstantRange> = if size > 0 {
            vec![vk::PushConstantRange {
                stage_flags,
                offset: 0,
                size,
            }]
        } else {
            Vec::new()
        };

        let layout_info = vk::PipelineLayoutCreateInfo::builder().push_constant_ranges(&push_constant_ranges);
        unsafe {
            self.device.create_pipeline_layout(&layout_info, None).map_err(|e| {
                log::error!("[VULKAN] vkCreatePipelineLayout failed: {:?}", e);
                BackendError::new(e, "vkCreatePipelineLayout failed")
            })
        }
    }

    fn create_render_pass(&self, description: &RenderPassDescription) -> BackendResult<vk::RenderPass> {
        description.with_create_info(|create_info| unsafe {
            self.device.create_render_pass(create_info, None).map_err(|e| {
                log::error!("[VULKAN] vkCreateRenderPass failed: {:?}", e);
                BackendError::new(e, "vkCreateRenderPass failed")
            })
        })
    }

    fn create_graphics_pipeline(&self, request: &GraphicsPipelineRequest<'_>) -> BackendResult<vk::Pipeline> {
        let state = request.state;
        let shader_modules = request.pipeline_layout.shader_modules();

        let entry_points = shader_modules
            .iter()
            .map(|module| {
                CString::new(module.entry_point()).map_err(|_| {
                    BackendError::new(vk::Result::ERROR_INITIALIZATION_FAILED, "entry point contains a NUL byte")
                })
            })
            .collect::<BackendResult<Vec<_>>>()?;

        let specialization = SpecializationData::new(state);
        let specialization_info = vk::SpecializationInfo::builder()
            .map_entries(&specialization.entries)
            .data(&specialization.data)
            .build();

        let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> = shader_modules
            .iter()
            .zip(&entry_points)
            .map(|(module, entry_point)| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(module.stage())
                    .module(module.handle())
                    .name(entry_point)
                    .specialization_info(&specialization_info)
                    .build()
            })
            .collect();

        let vertex_bindings: Vec<vk::VertexInputBindingDescription> = state
            .vertex_input
            .bindings
            .iter()
            .map(|binding| vk::VertexInputBindingDescription {
                binding: binding.binding,
                stride: binding.stride,
                input_rate: binding.input_rate,
            })
            .collect();
        let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = state
            .vertex_input
            .attributes
            .iter()
            .map(|attribute| vk::VertexInputAttributeDescription {
                location: attribute.location,
                binding: attribute.binding,
                format: attribute.format,
                offset: attribute.offset,
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(state.input_assembly.topology)
            .primitive_restart_enable(state.input_assembly.primitive_restart_enable);

        // Viewports and scissors are dynamic; only the counts are baked in.
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(state.viewport.viewport_count)
            .scissor_count(state.viewport.scissor_count);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterization = &state.rasterization;
        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(rasterization.depth_clamp_enable)
            .rasterizer_discard_enable(rasterization.rasterizer_discard_enable)
            .polygon_mode(rasterization.polygon_mode)
            .line_width(1.0)
            .cull_mode(rasterization.cull_mode)
            .front_face(rasterization.front_face)
            .depth_bias_enable(rasterization.depth_bias_enable);

        let multisample = &state.multisample;
        // Two words cover up to 64 samples; the second repeats the recorded mask.
        let sample_mask = [multisample.sample_mask; 2];
        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(multisample.rasterization_samples)
            .sample_shading_enable(multisample.sample_shading_enable)
            .min_sample_shading(multisample.min_sample_shading)
            .sample_mask(&sample_mask)
            .alpha_to_coverage_enable(multisample.alpha_to_coverage_enable)
            .alpha_to_one_enable(multisample.alpha_to_one_enable);

        let depth = &state.depth_stencil;
        let stencil_op = |face: &crate::resources::StencilOpState| {
            vk::StencilOpState::builder()
                .fail_op(face.fail_op)
                .pass_op(face.pass_op)
                .depth_fail_op(face.depth_fail_op)
                .compare_op(face.compare_op)
                .build()
        };
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(depth.depth_test_enable)
            .depth_write_enable(depth.depth_write_enable)
            .depth_compare_op(depth.depth_compare_op)
            .depth_bounds_test_enable(depth.depth_bounds_test_enable)
            .stencil_test_enable(depth.stencil_test_enable)
            .front(stencil_op(&depth.front))
            .back(stencil_op(&depth.back));

        let color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = state
            .color_blend
            .attachments
            .iter()
            .map(|attachment| attachment.to_vk())
            .collect();
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(state.color_blend.logic_op_enable)
            .logic_op(state.color_blend.logic_op)
            .attachments(&color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(request.pipeline_layout.handle())
            .render_pass(request.render_pass.handle())
            .subpass(request.subpass_index);

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(self.pipeline_cache, &[pipeline_info.build()], None)
                .map_err(|(_, e)| {
                    log::error!("[VULKAN] vkCreateGraphicsPipelines failed: {:?}", e);
                    BackendError::new(e, "vkCreateGraphicsPipelines failed")
                })?
        };

        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::new(vk::Result::ERROR_UNKNOWN, "vkCreateGraphicsPipelines returned no pipeline"))
    }

    fn destroy_shader_module(&self, handle: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(handle, None) }
    }

    fn destroy_pipeline_layout(&self, handle: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(handle, None) }
    }

    fn destroy_render_pass(&self, handle: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(handle, None) }
    }

    fn destroy_pipeline(&self, handle: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(handle, None) }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        log::debug!("[VULKAN] Destroying pipeline cache {:?}", self.pipeline_cache);
        unsafe {
            self.device.destroy_pipeline_cache(self.pipeline_cache, None);
        }
    }
}
