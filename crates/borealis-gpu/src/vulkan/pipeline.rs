//! Shader modules, render passes and pipelines.
//!
//! Pipelines are immutable state bundles built from the semantic parameter
//! types in [`crate::params`]; viewport and scissor are always dynamic so a
//! swapchain resize never invalidates a pipeline.

use std::io::Cursor;

use ash::vk;
use tracing::info;

use crate::error::{RenderError, Result};
use crate::handle::{PipelineId, RenderPassId, ShaderId};
use crate::params::{
    ColorAttachmentParams, ComputePipelineParams, CullMode, DataFormat, FrontFace,
    GraphicsPipelineParams, InputRate, LoadOp, PrimitiveTopology, RenderPassParams, ShaderStage,
};

use super::VulkanDriver;

pub(crate) struct ShaderRecord {
    pub handle: vk::ShaderModule,
    pub stage: ShaderStage,
}

pub(crate) struct RenderPassRecord {
    pub handle: vk::RenderPass,
}

pub(crate) struct PipelineRecord {
    pub handle: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

pub(crate) fn shader_stage_to_vk(stage: ShaderStage) -> vk::ShaderStageFlags {
    match stage {
        ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        ShaderStage::Geometry => vk::ShaderStageFlags::GEOMETRY,
        ShaderStage::TessControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
        ShaderStage::TessEval => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
        ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        ShaderStage::Mesh => vk::ShaderStageFlags::MESH_EXT,
        ShaderStage::Task => vk::ShaderStageFlags::TASK_EXT,
    }
}

pub(crate) fn topology_to_vk(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
    }
}

pub(crate) fn cull_mode_to_vk(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

pub(crate) fn front_face_to_vk(front_face: FrontFace) -> vk::FrontFace {
    match front_face {
        FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
    }
}

pub(crate) fn input_rate_to_vk(rate: InputRate) -> vk::VertexInputRate {
    match rate {
        InputRate::Vertex => vk::VertexInputRate::VERTEX,
        InputRate::Instance => vk::VertexInputRate::INSTANCE,
    }
}

pub(crate) fn data_format_to_vk(format: DataFormat) -> vk::Format {
    match format {
        DataFormat::R8Unorm => vk::Format::R8_UNORM,
        DataFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        DataFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        DataFormat::R16Sfloat => vk::Format::R16_SFLOAT,
        DataFormat::Rg16Sfloat => vk::Format::R16G16_SFLOAT,
        DataFormat::Rgba16Sfloat => vk::Format::R16G16B16A16_SFLOAT,
        DataFormat::R32Uint => vk::Format::R32_UINT,
        DataFormat::R32Sint => vk::Format::R32_SINT,
        DataFormat::R32Sfloat => vk::Format::R32_SFLOAT,
        DataFormat::Rg32Sfloat => vk::Format::R32G32_SFLOAT,
        DataFormat::Rgb32Sfloat => vk::Format::R32G32B32_SFLOAT,
        DataFormat::Rgba32Sfloat => vk::Format::R32G32B32A32_SFLOAT,
        DataFormat::Rg32Uint => vk::Format::R32G32_UINT,
        DataFormat::Rgba32Uint => vk::Format::R32G32B32A32_UINT,
    }
}

fn load_op_to_vk(load: LoadOp) -> vk::AttachmentLoadOp {
    match load {
        LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        LoadOp::Load => vk::AttachmentLoadOp::LOAD,
        LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

fn color_attachment_to_vk(params: &ColorAttachmentParams) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(data_format_to_vk(params.format))
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(load_op_to_vk(params.load))
        .store_op(if params.store {
            vk::AttachmentStoreOp::STORE
        } else {
            vk::AttachmentStoreOp::DONT_CARE
        })
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(if params.load == LoadOp::Load {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        } else {
            vk::ImageLayout::UNDEFINED
        })
        .final_layout(if params.present_after {
            vk::ImageLayout::PRESENT_SRC_KHR
        } else {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        })
}

impl VulkanDriver {
    pub(crate) fn create_shader_impl(
        &mut self,
        bytes: &[u8],
        stage: ShaderStage,
    ) -> Result<ShaderId> {
        assert!(!bytes.is_empty(), "empty shader binary");

        let code = ash::util::read_spv(&mut Cursor::new(bytes))
            .map_err(|e| RenderError::ShaderCreation(e.to_string()))?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

        let dev = self.device.as_ref().expect("no device selected");
        let handle = unsafe { dev.device.create_shader_module(&create_info, None) }
            .map_err(|e| RenderError::ShaderCreation(e.to_string()))?;

        info!("Created {stage:?} shader ({} bytes)", bytes.len());
        Ok(ShaderId(self.shaders.insert(ShaderRecord { handle, stage })))
    }

    pub(crate) fn destroy_shader_impl(&mut self, shader: ShaderId) {
        let dev = self.device.as_ref().expect("no device selected");
        let record = self.shaders.remove(shader.0);
        unsafe {
            dev.device.destroy_shader_module(record.handle, None);
        }
    }

    pub(crate) fn create_render_pass_impl(
        &mut self,
        params: &RenderPassParams,
    ) -> Result<RenderPassId> {
        assert!(
            !params.color_attachments.is_empty(),
            "render pass needs at least one attachment"
        );

        let attachments: Vec<vk::AttachmentDescription> = params
            .color_attachments
            .iter()
            .map(color_attachment_to_vk)
            .collect();

        let color_refs: Vec<vk::AttachmentReference> = (0..attachments.len() as u32)
            .map(|index| {
                vk::AttachmentReference::default()
                    .attachment(index)
                    .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            })
            .collect();

        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses);

        let dev = self.device.as_ref().expect("no device selected");
        let handle = unsafe { dev.device.create_render_pass(&create_info, None) }
            .map_err(RenderError::RenderPassCreation)?;

        Ok(RenderPassId(self.render_passes.insert(RenderPassRecord {
            handle,
        })))
    }

    pub(crate) fn destroy_render_pass_impl(&mut self, render_pass: RenderPassId) {
        let dev = self.device.as_ref().expect("no device selected");
        let record = self.render_passes.remove(render_pass.0);
        unsafe {
            dev.device.destroy_render_pass(record.handle, None);
        }
    }

    pub(crate) fn create_graphics_pipeline_impl(
        &mut self,
        params: &GraphicsPipelineParams,
    ) -> Result<PipelineId> {
        let render_pass = params.render_pass.expect("graphics pipeline needs a render pass");
        let pass_handle = self.render_passes.get(render_pass.0).handle;

        let stages: Vec<vk::PipelineShaderStageCreateInfo> = params
            .shaders
            .iter()
            .map(|&shader| {
                let record = self.shaders.get(shader.0);
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(shader_stage_to_vk(record.stage))
                    .module(record.handle)
                    .name(c"main")
            })
            .collect();

        let bindings: Vec<vk::VertexInputBindingDescription> = params
            .bindings
            .iter()
            .map(|binding| {
                vk::VertexInputBindingDescription::default()
                    .binding(binding.binding)
                    .stride(binding.stride)
                    .input_rate(input_rate_to_vk(binding.rate))
            })
            .collect();

        let attributes: Vec<vk::VertexInputAttributeDescription> = params
            .attributes
            .iter()
            .map(|attribute| {
                vk::VertexInputAttributeDescription::default()
                    .binding(attribute.binding)
                    .location(attribute.location)
                    .offset(attribute.offset)
                    .format(data_format_to_vk(attribute.format))
            })
            .collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(topology_to_vk(params.topology))
            .primitive_restart_enable(false);

        // Counts only; the actual rects are dynamic state set at record time.
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(params.enable_depth_clamp)
            .rasterizer_discard_enable(params.discard_primitives)
            .polygon_mode(if params.wireframe {
                vk::PolygonMode::LINE
            } else {
                vk::PolygonMode::FILL
            })
            .cull_mode(cull_mode_to_vk(params.cull_mode))
            .front_face(front_face_to_vk(params.front_face))
            .depth_bias_enable(params.enable_depth_bias)
            .depth_bias_constant_factor(params.depth_bias_constant)
            .depth_bias_clamp(params.depth_bias_clamp)
            .depth_bias_slope_factor(params.depth_bias_slope)
            .line_width(params.line_width);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA)];
        let color_blend =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let dev = self.device.as_ref().expect("no device selected");

        // No descriptors or push constants yet, so the layout is empty.
        let layout_info = vk::PipelineLayoutCreateInfo::default();
        let layout = unsafe { dev.device.create_pipeline_layout(&layout_info, None) }
            .map_err(|e| RenderError::PipelineCreation(e.to_string()))?;

        let create_infos = [vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(pass_handle)
            .subpass(params.subpass)];

        let pipelines = unsafe {
            dev.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &create_infos, None)
        };
        let handle = match pipelines {
            Ok(pipelines) => pipelines[0],
            Err((_, e)) => {
                unsafe {
                    dev.device.destroy_pipeline_layout(layout, None);
                }
                return Err(RenderError::PipelineCreation(e.to_string()));
            }
        };

        info!("Created graphics pipeline ({} stages)", stages.len());
        Ok(PipelineId(self.pipelines.insert(PipelineRecord {
            handle,
            layout,
        })))
    }

    pub(crate) fn create_compute_pipeline_impl(
        &mut self,
        _params: &ComputePipelineParams,
    ) -> Result<PipelineId> {
        let dev = self.device.as_ref().expect("no device selected");

        let layout_info = vk::PipelineLayoutCreateInfo::default();
        let layout = unsafe { dev.device.create_pipeline_layout(&layout_info, None) }
            .map_err(|e| RenderError::PipelineCreation(e.to_string()))?;

        let create_infos = [vk::ComputePipelineCreateInfo::default().layout(layout)];
        let pipelines = unsafe {
            dev.device
                .create_compute_pipelines(vk::PipelineCache::null(), &create_infos, None)
        };
        let handle = match pipelines {
            Ok(pipelines) => pipelines[0],
            Err((_, e)) => {
                unsafe {
                    dev.device.destroy_pipeline_layout(layout, None);
                }
                return Err(RenderError::PipelineCreation(e.to_string()));
            }
        };

        Ok(PipelineId(self.pipelines.insert(PipelineRecord {
            handle,
            layout,
        })))
    }

    pub(crate) fn destroy_pipeline_impl(&mut self, pipeline: PipelineId) {
        let dev = self.device.as_ref().expect("no device selected");
        let record = self.pipelines.remove(pipeline.0);
        unsafe {
            if record.layout != vk::PipelineLayout::null() {
                dev.device.destroy_pipeline_layout(record.layout, None);
            }
            if record.handle != vk::Pipeline::null() {
                dev.device.destroy_pipeline(record.handle, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_stages_map_to_native() {
        assert_eq!(
            shader_stage_to_vk(ShaderStage::Vertex),
            vk::ShaderStageFlags::VERTEX
        );
        assert_eq!(
            shader_stage_to_vk(ShaderStage::Fragment),
            vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(
            shader_stage_to_vk(ShaderStage::Compute),
            vk::ShaderStageFlags::COMPUTE
        );
    }

    #[test]
    fn data_formats_map_to_native() {
        assert_eq!(
            data_format_to_vk(DataFormat::Bgra8Unorm),
            vk::Format::B8G8R8A8_UNORM
        );
        assert_eq!(
            data_format_to_vk(DataFormat::Rgb32Sfloat),
            vk::Format::R32G32B32_SFLOAT
        );
        assert_eq!(
            data_format_to_vk(DataFormat::Rgba32Uint),
            vk::Format::R32G32B32A32_UINT
        );
    }

    #[test]
    fn topologies_and_rasterizer_enums_map_to_native() {
        assert_eq!(
            topology_to_vk(PrimitiveTopology::TriangleStrip),
            vk::PrimitiveTopology::TRIANGLE_STRIP
        );
        assert_eq!(cull_mode_to_vk(CullMode::Back), vk::CullModeFlags::BACK);
        assert_eq!(
            front_face_to_vk(FrontFace::Clockwise),
            vk::FrontFace::CLOCKWISE
        );
        assert_eq!(
            input_rate_to_vk(InputRate::Instance),
            vk::VertexInputRate::INSTANCE
        );
    }

    #[test]
    fn present_attachments_end_in_present_layout() {
        let attachment = color_attachment_to_vk(&ColorAttachmentParams {
            format: DataFormat::Bgra8Unorm,
            load: LoadOp::Clear,
            store: true,
            present_after: true,
        });
        assert_eq!(attachment.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(attachment.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
    }

    #[test]
    fn load_preserving_attachments_keep_their_contents() {
        let attachment = color_attachment_to_vk(&ColorAttachmentParams {
            format: DataFormat::Rgba16Sfloat,
            load: LoadOp::Load,
            store: false,
            present_after: false,
        });
        assert_eq!(
            attachment.initial_layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
        assert_eq!(
            attachment.final_layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::DONT_CARE);
    }
}
