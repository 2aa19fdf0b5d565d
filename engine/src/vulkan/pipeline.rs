use std::path::PathBuf;

use anyhow::Result;
use log::*;
use vulkanalia::bytecode::Bytecode;
use vulkanalia::prelude::v1_0::*;

use super::device::VulkanDevice;
use crate::assets::ShaderSource;
use crate::config;
use crate::error::EngineError;
use crate::scene::Vertex;

/// Binding 0: transforms for the vertex stage. Binding 1: the texture.
pub fn descriptor_bindings() -> [vk::DescriptorSetLayoutBinding; 2] {
    let ubo_binding = vk::DescriptorSetLayoutBinding::builder()
        .binding(0)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::VERTEX)
        .build();

    let sampler_binding = vk::DescriptorSetLayoutBinding::builder()
        .binding(1)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::FRAGMENT)
        .build();

    [ubo_binding, sampler_binding]
}

pub unsafe fn create_descriptor_set_layout(
    device: &VulkanDevice,
) -> Result<vk::DescriptorSetLayout> {
    let bindings = descriptor_bindings();
    let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

    Ok(device.vk_device.create_descriptor_set_layout(&info, None)?)
}

/// Validates a SPIR-V blob; misaligned or empty input is a shader load failure.
pub fn parse_bytecode(name: &str, bytes: &[u8]) -> Result<Bytecode> {
    Bytecode::new(bytes).map_err(|e| {
        EngineError::ShaderLoad {
            path: PathBuf::from(name),
            reason: format!("invalid SPIR-V bytecode ({:?})", e),
        }
        .into()
    })
}

pub fn depth_stencil_state() -> vk::PipelineDepthStencilStateCreateInfo {
    vk::PipelineDepthStencilStateCreateInfo::builder()
        .depth_test_enable(true)
        .depth_write_enable(true)
        .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false)
        .build()
}

pub fn color_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::all())
        .blend_enable(false)
        .src_color_blend_factor(vk::BlendFactor::ONE)
        .dst_color_blend_factor(vk::BlendFactor::ZERO)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
        .alpha_blend_op(vk::BlendOp::ADD)
        .build()
}

pub const DYNAMIC_STATES: [vk::DynamicState; 2] =
    [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

#[derive(Debug, Default)]
pub struct VulkanPipeline {
    pub handle: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl VulkanPipeline {
    pub unsafe fn new(
        device: &VulkanDevice,
        render_pass: vk::RenderPass,
        set_layout: vk::DescriptorSetLayout,
        extent: vk::Extent2D,
        shaders: &dyn ShaderSource,
    ) -> Result<VulkanPipeline> {
        let vert = shaders.load(config::VERTEX_SHADER)?;
        let frag = shaders.load(config::FRAGMENT_SHADER)?;

        let vert = parse_bytecode(config::VERTEX_SHADER, &vert)?;
        let frag = parse_bytecode(config::FRAGMENT_SHADER, &frag)?;

        let vertex_shader_module = VulkanPipeline::create_shader_module(device, &vert)?;
        let fragment_shader_module = match VulkanPipeline::create_shader_module(device, &frag) {
            Ok(module) => module,
            Err(error) => {
                device
                    .vk_device
                    .destroy_shader_module(vertex_shader_module, None);
                return Err(error);
            }
        };

        let built = VulkanPipeline::build(
            device,
            render_pass,
            set_layout,
            extent,
            vertex_shader_module,
            fragment_shader_module,
        );

        device
            .vk_device
            .destroy_shader_module(vertex_shader_module, None);
        device
            .vk_device
            .destroy_shader_module(fragment_shader_module, None);

        built
    }

    unsafe fn build(
        device: &VulkanDevice,
        render_pass: vk::RenderPass,
        set_layout: vk::DescriptorSetLayout,
        extent: vk::Extent2D,
        vertex_shader_module: vk::ShaderModule,
        fragment_shader_module: vk::ShaderModule,
    ) -> Result<VulkanPipeline> {
        let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_shader_module)
            .name(b"main\0");

        let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment_shader_module)
            .name(b"main\0");

        let binding_descriptions = &[Vertex::binding_description()];
        let attribute_descriptions = Vertex::attribute_descriptions();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(binding_descriptions)
            .vertex_attribute_descriptions(&attribute_descriptions);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Overwritten per frame by the dynamic state.
        let viewports = &[super::command_buffer::full_viewport(extent)];
        let scissors = &[super::command_buffer::full_scissor(extent)];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(viewports)
            .scissors(scissors);

        // rasterizer
        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        // multisampling
        let multisample_state = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::_1);

        let depth_stencil_state = depth_stencil_state();

        // color blending
        let attachments = &[color_blend_attachment()];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(attachments)
            .blend_constants([0.0, 0.0, 0.0, 0.0]);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&DYNAMIC_STATES);

        // layout
        let set_layouts = &[set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts);
        let layout = device
            .vk_device
            .create_pipeline_layout(&layout_info, None)?;

        let stages = &[vert_stage, frag_stage];
        let info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let handle = match device.vk_device.create_graphics_pipelines(
            vk::PipelineCache::null(),
            &[info],
            None,
        ) {
            Ok((pipelines, _)) => pipelines[0],
            Err(code) => {
                device.vk_device.destroy_pipeline_layout(layout, None);
                return Err(EngineError::PipelineCreation(code).into());
            }
        };

        debug!("Graphics pipeline built for {}x{}.", extent.width, extent.height);

        Ok(VulkanPipeline { handle, layout })
    }

    unsafe fn create_shader_module(
        device: &VulkanDevice,
        bytecode: &Bytecode,
    ) -> Result<vk::ShaderModule> {
        let info = vk::ShaderModuleCreateInfo::builder()
            .code_size(bytecode.code_size())
            .code(bytecode.code());

        Ok(device.vk_device.create_shader_module(&info, None)?)
    }

    pub unsafe fn destroy(&mut self, device: &VulkanDevice) {
        device.vk_device.destroy_pipeline(self.handle, None);
        device.vk_device.destroy_pipeline_layout(self.layout, None);
        *self = VulkanPipeline::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_split_uniforms_and_texture_by_stage() {
        let [ubo, sampler] = descriptor_bindings();

        assert_eq!(ubo.binding, 0);
        assert_eq!(ubo.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(ubo.stage_flags, vk::ShaderStageFlags::VERTEX);

        assert_eq!(sampler.binding, 1);
        assert_eq!(
            sampler.descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(sampler.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn depth_and_blend_state() {
        let depth = depth_stencil_state();
        assert_eq!(depth.depth_test_enable, vk::TRUE);
        assert_eq!(depth.depth_write_enable, vk::TRUE);
        assert_eq!(depth.depth_compare_op, vk::CompareOp::LESS_OR_EQUAL);
        assert_eq!(depth.stencil_test_enable, vk::FALSE);

        let blend = color_blend_attachment();
        assert_eq!(blend.blend_enable, vk::FALSE);
        assert_eq!(blend.color_write_mask, vk::ColorComponentFlags::all());
    }

    #[test]
    fn misaligned_bytecode_is_a_shader_load_error() {
        let error = parse_bytecode("vert.spv", &[0x03, 0x02, 0x23]).err().unwrap();

        match error.downcast_ref::<EngineError>() {
            Some(EngineError::ShaderLoad { path, .. }) => {
                assert_eq!(path, &PathBuf::from("vert.spv"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn aligned_bytecode_parses() {
        let magic = 0x0723_0203u32.to_le_bytes();
        let bytecode = parse_bytecode("frag.spv", &magic).unwrap();

        assert_eq!(bytecode.code_size(), 4);
        assert_eq!(bytecode.code(), &[0x0723_0203]);
    }
}
