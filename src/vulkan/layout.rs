//! Image layout state machine for texture uploads.
//!
//! Sampled textures only ever travel along a handful of edges:
//!
//! ```text
//! Undefined -> TransferDst -> ShaderReadOnly
//!                  |               ^
//!                  v               |
//!              TransferSrc --------+
//! ```
//!
//! The `TransferSrc` detour is taken by each mip level while the next level
//! is blitted from it. Every other pair is rejected before a barrier is
//! recorded.

use ash::vk;

use crate::error::{RendererError, RendererResult};

/// Layout states a sampled texture can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageLayoutState {
    /// Freshly created, contents undefined.
    #[default]
    Undefined,
    /// Receiving a buffer copy or blit.
    TransferDst,
    /// Blit source while generating the next mip level.
    TransferSrc,
    /// Ready to be sampled from fragment shaders.
    ShaderReadOnly,
}

impl ImageLayoutState {
    pub fn to_vk(self) -> vk::ImageLayout {
        match self {
            Self::Undefined => vk::ImageLayout::UNDEFINED,
            Self::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            Self::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            Self::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}

/// Access masks and stages for one legal layout transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Look up the barrier parameters for `from -> to`.
///
/// Returns [`RendererError::IllegalLayoutTransition`] for any pair outside the
/// upload state machine.
pub fn transition(from: ImageLayoutState, to: ImageLayoutState) -> RendererResult<LayoutTransition> {
    use ImageLayoutState::*;

    let transition = match (from, to) {
        (Undefined, TransferDst) => LayoutTransition {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        (TransferDst, ShaderReadOnly) => LayoutTransition {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        },
        (TransferDst, TransferSrc) => LayoutTransition {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::TRANSFER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        (TransferSrc, ShaderReadOnly) => LayoutTransition {
            src_access: vk::AccessFlags::TRANSFER_READ,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        },
        _ => return Err(RendererError::IllegalLayoutTransition { from, to }),
    };

    Ok(transition)
}

/// Build the color image barrier for `from -> to` over a mip range.
pub fn image_barrier(
    image: vk::Image,
    base_mip_level: u32,
    level_count: u32,
    from: ImageLayoutState,
    to: ImageLayoutState,
) -> RendererResult<(vk::ImageMemoryBarrier<'static>, LayoutTransition)> {
    let transition = transition(from, to)?;

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(from.to_vk())
        .new_layout(to.to_vk())
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level,
            level_count,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(transition.src_access)
        .dst_access_mask(transition.dst_access);

    Ok((barrier, transition))
}

/// Record a pipeline barrier moving `level_count` mips of `image` from `from` to `to`.
///
/// Nothing is recorded if the transition is illegal.
pub fn record_image_barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    base_mip_level: u32,
    level_count: u32,
    from: ImageLayoutState,
    to: ImageLayoutState,
) -> RendererResult<()> {
    let (barrier, transition) = image_barrier(image, base_mip_level, level_count, from, to)?;

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            transition.src_stage,
            transition.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use rstest::rstest;
    use ImageLayoutState::*;

    #[test]
    fn test_upload_transition_masks() {
        let t = transition(Undefined, TransferDst).unwrap();
        assert_eq!(t.src_access, vk::AccessFlags::empty());
        assert_eq!(t.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(t.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let t = transition(TransferDst, ShaderReadOnly).unwrap();
        assert_eq!(t.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(t.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(t.src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_mip_chain_transitions() {
        let t = transition(TransferDst, TransferSrc).unwrap();
        assert_eq!(t.dst_access, vk::AccessFlags::TRANSFER_READ);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let t = transition(TransferSrc, ShaderReadOnly).unwrap();
        assert_eq!(t.src_access, vk::AccessFlags::TRANSFER_READ);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[rstest]
    #[case(Undefined, ShaderReadOnly)]
    #[case(Undefined, TransferSrc)]
    #[case(ShaderReadOnly, TransferDst)]
    #[case(ShaderReadOnly, Undefined)]
    #[case(TransferDst, Undefined)]
    #[case(TransferDst, TransferDst)]
    fn test_illegal_transitions_are_rejected(
        #[case] from: ImageLayoutState,
        #[case] to: ImageLayoutState,
    ) {
        let err = transition(from, to).unwrap_err();
        assert!(matches!(
            err,
            RendererError::IllegalLayoutTransition { from: f, to: t } if f == from && t == to
        ));
    }

    #[test]
    fn test_image_barrier_covers_requested_mips() {
        let image = vk::Image::from_raw(0x1234);
        let (barrier, _) = image_barrier(image, 2, 1, TransferDst, TransferSrc).unwrap();

        assert_eq!(barrier.image, image);
        assert_eq!(barrier.old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(barrier.new_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        assert_eq!(barrier.subresource_range.base_mip_level, 2);
        assert_eq!(barrier.subresource_range.level_count, 1);
        assert_eq!(
            barrier.subresource_range.aspect_mask,
            vk::ImageAspectFlags::COLOR
        );
        assert_eq!(barrier.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
    }
}
