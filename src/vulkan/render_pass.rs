//! The single forward render pass and its framebuffers.

use ash::vk;

use crate::error::{RendererError, RendererResult};

use super::swapchain::DepthFormat;

const COLOR_ATTACHMENT: u32 = 0;
const DEPTH_ATTACHMENT: u32 = 1;

/// Color then depth/stencil attachment descriptions.
///
/// Stencil is cleared only when the depth format has a stencil component.
pub fn attachment_descriptions(
    color_format: vk::Format,
    depth: DepthFormat,
) -> [vk::AttachmentDescription; 2] {
    let color = vk::AttachmentDescription::default()
        .format(color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    let stencil_load_op = if depth.stencil_available {
        vk::AttachmentLoadOp::CLEAR
    } else {
        vk::AttachmentLoadOp::DONT_CARE
    };

    let depth_stencil = vk::AttachmentDescription::default()
        .format(depth.format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(stencil_load_op)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    [color, depth_stencil]
}

/// Orders attachment writes against the previous use of the same attachments.
pub fn subpass_dependency() -> vk::SubpassDependency {
    let stages =
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;

    vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stages)
        .dst_stage_mask(stages)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
        .dependency_flags(vk::DependencyFlags::BY_REGION)
}

/// Clear values matching [`attachment_descriptions`].
pub fn clear_values(color: [f32; 4]) -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ]
}

pub fn create_render_pass(
    device: &ash::Device,
    color_format: vk::Format,
    depth: DepthFormat,
) -> RendererResult<vk::RenderPass> {
    let attachments = attachment_descriptions(color_format, depth);

    let color_refs = [vk::AttachmentReference {
        attachment: COLOR_ATTACHMENT,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let depth_ref = vk::AttachmentReference {
        attachment: DEPTH_ATTACHMENT,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)
        .depth_stencil_attachment(&depth_ref)];
    let dependencies = [subpass_dependency()];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    unsafe { device.create_render_pass(&create_info, None) }.map_err(|e| {
        RendererError::InitializationFailed(format!("Failed to create render pass: {:?}", e))
    })
}

/// One framebuffer per swapchain image, all sharing the depth view.
pub fn create_framebuffers(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    color_views: &[vk::ImageView],
    depth_view: vk::ImageView,
    extent: vk::Extent2D,
) -> RendererResult<Vec<vk::Framebuffer>> {
    color_views
        .iter()
        .map(|&color_view| {
            let attachments = [color_view, depth_view];
            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            unsafe { device.create_framebuffer(&create_info, None) }.map_err(|e| {
                RendererError::InitializationFailed(format!(
                    "Failed to create framebuffer: {:?}",
                    e
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stencil_cleared_only_when_available() {
        let with_stencil = DepthFormat {
            format: vk::Format::D24_UNORM_S8_UINT,
            stencil_available: true,
        };
        let [_, depth] = attachment_descriptions(vk::Format::B8G8R8A8_UNORM, with_stencil);
        assert_eq!(depth.stencil_load_op, vk::AttachmentLoadOp::CLEAR);

        let depth_only = DepthFormat {
            format: vk::Format::D32_SFLOAT,
            stencil_available: false,
        };
        let [_, depth] = attachment_descriptions(vk::Format::B8G8R8A8_UNORM, depth_only);
        assert_eq!(depth.format, vk::Format::D32_SFLOAT);
        assert_eq!(depth.stencil_load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(depth.stencil_store_op, vk::AttachmentStoreOp::DONT_CARE);
    }

    #[test]
    fn test_color_attachment_ends_presentable() {
        let depth = DepthFormat {
            format: vk::Format::D32_SFLOAT,
            stencil_available: false,
        };
        let [color, depth] = attachment_descriptions(vk::Format::B8G8R8A8_SRGB, depth);
        assert_eq!(color.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(color.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(color.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(
            depth.final_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn test_dependency_covers_color_and_depth_writes() {
        let dep = subpass_dependency();
        assert_eq!(dep.src_subpass, vk::SUBPASS_EXTERNAL);
        assert!(dep
            .dst_stage_mask
            .contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
        assert!(dep
            .dst_access_mask
            .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
        assert_eq!(dep.dependency_flags, vk::DependencyFlags::BY_REGION);
    }

    #[test]
    fn test_clear_values() {
        let values = clear_values([1.0, 0.0, 1.0, 1.0]);
        unsafe {
            assert_eq!(values[0].color.float32, [1.0, 0.0, 1.0, 1.0]);
            assert_eq!(values[1].depth_stencil.depth, 1.0);
            assert_eq!(values[1].depth_stencil.stencil, 0);
        }
    }
}
