//! The fixed forward graphics pipeline.
//!
//! One vertex stream (position, uv, normal), triangle lists, back-face
//! culling, depth test and write, and alpha blending. Viewport and scissor are
//! baked in at the swapchain extent since the swapchain is never recreated.

use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;

use ash::vk;

use crate::error::{RendererError, RendererResult};
use crate::resources::Vertex;

const SHADER_ENTRY_POINT: &CStr = c"main";

/// SPIR-V words read from disk.
#[derive(Debug, Clone)]
pub struct ShaderBinary {
    pub words: Vec<u32>,
}

impl ShaderBinary {
    pub fn read(path: &Path) -> RendererResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| RendererError::ShaderLoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_bytes(&bytes, &path.display().to_string())
    }

    /// Parse SPIR-V bytes. `label` names the source in errors.
    pub fn from_bytes(bytes: &[u8], label: &str) -> RendererResult<Self> {
        let words =
            ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| RendererError::ShaderLoadFailed {
                path: label.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { words })
    }

    pub fn create_module(&self, device: &ash::Device) -> RendererResult<vk::ShaderModule> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(&self.words);

        unsafe { device.create_shader_module(&create_info, None) }.map_err(|e| {
            RendererError::PipelineCreationFailed(format!(
                "Failed to create shader module: {:?}",
                e
            ))
        })
    }
}

pub fn vertex_binding_description() -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription::default()
        .binding(0)
        .stride(std::mem::size_of::<Vertex>() as u32)
        .input_rate(vk::VertexInputRate::VERTEX)
}

/// Position, uv and normal at locations 0, 1 and 2.
pub fn vertex_attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
    [
        vk::VertexInputAttributeDescription::default()
            .location(0)
            .binding(0)
            .format(vk::Format::R32G32B32_SFLOAT)
            .offset(std::mem::offset_of!(Vertex, position) as u32),
        vk::VertexInputAttributeDescription::default()
            .location(1)
            .binding(0)
            .format(vk::Format::R32G32_SFLOAT)
            .offset(std::mem::offset_of!(Vertex, uv) as u32),
        vk::VertexInputAttributeDescription::default()
            .location(2)
            .binding(0)
            .format(vk::Format::R32G32B32_SFLOAT)
            .offset(std::mem::offset_of!(Vertex, normal) as u32),
    ]
}

/// Source-over color blending. Alpha uses a subtractive op.
pub fn blend_attachment_state() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .alpha_blend_op(vk::BlendOp::SUBTRACT)
        .color_write_mask(vk::ColorComponentFlags::RGBA)
}

/// Depth test and write with LESS; the stencil test stays off.
pub fn depth_stencil_state() -> vk::PipelineDepthStencilStateCreateInfo<'static> {
    vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(true)
        .depth_write_enable(true)
        .depth_compare_op(vk::CompareOp::LESS)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false)
}

pub fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo<'static> {
    vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false)
}

/// Pipeline plus the layout holding the single descriptor set layout.
pub struct ForwardPipeline {
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
}

impl ForwardPipeline {
    pub fn new(
        device: &ash::Device,
        render_pass: vk::RenderPass,
        set_layout: vk::DescriptorSetLayout,
        extent: vk::Extent2D,
        vertex_shader: &ShaderBinary,
        fragment_shader: &ShaderBinary,
    ) -> RendererResult<Self> {
        let set_layouts = [set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }.map_err(|e| {
            RendererError::PipelineCreationFailed(format!(
                "Failed to create pipeline layout: {:?}",
                e
            ))
        })?;

        let vertex_module = vertex_shader.create_module(device)?;
        let fragment_module = match fragment_shader.create_module(device) {
            Ok(module) => module,
            Err(e) => {
                unsafe { device.destroy_shader_module(vertex_module, None) };
                return Err(e);
            }
        };

        let pipeline = create_graphics_pipeline(
            device,
            render_pass,
            layout,
            extent,
            vertex_module,
            fragment_module,
        );

        // Modules are no longer needed once the pipeline exists
        unsafe {
            device.destroy_shader_module(vertex_module, None);
            device.destroy_shader_module(fragment_module, None);
        }

        Ok(Self {
            layout,
            pipeline: pipeline?,
        })
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
        self.pipeline = vk::Pipeline::null();
        self.layout = vk::PipelineLayout::null();
    }
}

fn create_graphics_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    extent: vk::Extent2D,
    vertex_module: vk::ShaderModule,
    fragment_module: vk::ShaderModule,
) -> RendererResult<vk::Pipeline> {
    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_module)
            .name(SHADER_ENTRY_POINT),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment_module)
            .name(SHADER_ENTRY_POINT),
    ];

    let binding_descriptions = [vertex_binding_description()];
    let attribute_descriptions = vertex_attribute_descriptions();
    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&binding_descriptions)
        .vertex_attribute_descriptions(&attribute_descriptions);

    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    let viewports = [vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }];
    let scissors = [vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }];
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewports(&viewports)
        .scissors(&scissors);

    let rasterization_state = rasterization_state();

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let depth_stencil_state = depth_stencil_state();

    let color_blend_attachments = [blend_attachment_state()];
    let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&color_blend_attachments);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .depth_stencil_state(&depth_stencil_state)
        .color_blend_state(&color_blend_state)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0);

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, e)| {
        RendererError::PipelineCreationFailed(format!(
            "Failed to create graphics pipeline: {:?}",
            e
        ))
    })?;

    pipelines.into_iter().next().ok_or_else(|| {
        RendererError::PipelineCreationFailed("Driver returned no pipeline".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_input_matches_vertex_layout() {
        let binding = vertex_binding_description();
        assert_eq!(binding.stride, 32);

        let attributes = vertex_attribute_descriptions();
        let summary: Vec<(u32, vk::Format, u32)> = attributes
            .iter()
            .map(|a| (a.location, a.format, a.offset))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, vk::Format::R32G32B32_SFLOAT, 0),
                (1, vk::Format::R32G32_SFLOAT, 12),
                (2, vk::Format::R32G32B32_SFLOAT, 20),
            ]
        );
    }

    #[test]
    fn test_alpha_blend_is_subtractive() {
        let blend = blend_attachment_state();
        assert_eq!(blend.blend_enable, vk::TRUE);
        assert_eq!(blend.color_blend_op, vk::BlendOp::ADD);
        assert_eq!(blend.alpha_blend_op, vk::BlendOp::SUBTRACT);
        assert_eq!(blend.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
        assert_eq!(blend.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn test_depth_state_ignores_stencil() {
        let state = depth_stencil_state();
        assert_eq!(state.depth_test_enable, vk::TRUE);
        assert_eq!(state.depth_write_enable, vk::TRUE);
        assert_eq!(state.depth_compare_op, vk::CompareOp::LESS);
        assert_eq!(state.stencil_test_enable, vk::FALSE);
    }

    #[test]
    fn test_back_faces_are_culled() {
        let state = rasterization_state();
        assert_eq!(state.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(state.front_face, vk::FrontFace::CLOCKWISE);
    }

    #[test]
    fn test_shader_binary_from_bytes() {
        let mut bytes = Vec::new();
        for word in [0x0723_0203u32, 0x0001_0000, 0, 1, 0] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        let binary = ShaderBinary::from_bytes(&bytes, "inline").unwrap();
        assert_eq!(binary.words.len(), 5);
        assert_eq!(binary.words[0], 0x0723_0203);

        let err = ShaderBinary::from_bytes(&bytes[..7], "truncated").unwrap_err();
        assert!(matches!(err, RendererError::ShaderLoadFailed { ref path, .. } if path == "truncated"));
    }

    #[test]
    fn test_missing_shader_file() {
        let err = ShaderBinary::read(Path::new("missing/vertex.spv")).unwrap_err();
        assert!(matches!(err, RendererError::ShaderLoadFailed { .. }));
    }
}
