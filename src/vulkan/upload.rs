//! Synchronous geometry and texture uploads.
//!
//! Data is copied into a host-visible staging buffer, then a one-shot command
//! buffer copies it into device-local memory. The call blocks until the queue
//! is idle, so uploads belong to load phases and not to steady-state frames.
//!
//! Geometry goes through the transfer queue and is shared concurrently with the
//! graphics family. Textures go through the graphics queue because their layout
//! transitions target fragment-shader stages and mip generation needs blits.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;

use crate::error::{RendererError, RendererResult};
use crate::resources::{MeshData, TextureData};

use super::buffer::{AllocatedBuffer, BufferDesc};
use super::layout::{record_image_barrier, ImageLayoutState};

/// Format every texture is uploaded in.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Vertex and index buffers of one loaded mesh.
pub struct GpuGeometry {
    pub vertex_buffer: AllocatedBuffer,
    pub index_buffer: AllocatedBuffer,
    pub index_count: u32,
}

impl GpuGeometry {
    pub unsafe fn destroy(&mut self, device: &ash::Device, allocator: &Mutex<Allocator>) {
        self.vertex_buffer.destroy(device, allocator);
        self.index_buffer.destroy(device, allocator);
        self.index_count = 0;
    }
}

/// A sampled image with its full mip chain view.
pub struct GpuTexture {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    allocation: Option<Allocation>,
}

impl GpuTexture {
    pub unsafe fn destroy(&mut self, device: &ash::Device, allocator: &Mutex<Allocator>) {
        device.destroy_image_view(self.view, None);
        device.destroy_image(self.image, None);
        self.view = vk::ImageView::null();
        self.image = vk::Image::null();
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = allocator.lock().free(allocation) {
                log::warn!("Failed to free texture memory: {}", e);
            }
        }
    }
}

/// A queue and the command pool its one-shot command buffers come from.
#[derive(Debug, Clone, Copy)]
pub struct UploadQueue {
    pub queue: vk::Queue,
    pub command_pool: vk::CommandPool,
}

/// Command pool for short-lived upload command buffers.
pub fn create_transient_pool(device: &ash::Device, family: u32) -> RendererResult<vk::CommandPool> {
    let pool_info = vk::CommandPoolCreateInfo::default()
        .flags(
            vk::CommandPoolCreateFlags::TRANSIENT
                | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )
        .queue_family_index(family);

    unsafe { device.create_command_pool(&pool_info, None) }.map_err(|e| {
        RendererError::InitializationFailed(format!(
            "Failed to create transfer command pool: {:?}",
            e
        ))
    })
}

/// A primary command buffer recorded once, submitted, and waited on.
///
/// The buffer is returned to its pool on drop.
struct OneShotCommands<'a> {
    device: &'a ash::Device,
    target: UploadQueue,
    cmd: vk::CommandBuffer,
}

impl<'a> OneShotCommands<'a> {
    fn begin(device: &'a ash::Device, target: UploadQueue) -> RendererResult<Self> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(target.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let cmd = unsafe { device.allocate_command_buffers(&alloc_info) }?
            .into_iter()
            .next()
            .ok_or(RendererError::Vulkan(vk::Result::ERROR_OUT_OF_HOST_MEMORY))?;
        let commands = Self {
            device,
            target,
            cmd,
        };

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.begin_command_buffer(cmd, &begin_info) }?;

        Ok(commands)
    }

    fn submit_and_wait(self) -> RendererResult<()> {
        unsafe { self.device.end_command_buffer(self.cmd) }?;

        let command_buffers = [self.cmd];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe {
            self.device
                .queue_submit(self.target.queue, &[submit_info], vk::Fence::null())
        }
        .map_err(RendererError::SubmitFailed)?;
        unsafe { self.device.queue_wait_idle(self.target.queue) }?;

        Ok(())
    }
}

impl Drop for OneShotCommands<'_> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .free_command_buffers(self.target.command_pool, &[self.cmd]);
        }
    }
}

/// Run `f` with a staging buffer holding `data`, destroying it afterwards.
fn with_staging<T>(
    device: &ash::Device,
    allocator: &Mutex<Allocator>,
    name: &str,
    data: &[u8],
    f: impl FnOnce(vk::Buffer) -> RendererResult<T>,
) -> RendererResult<T> {
    let mut staging = AllocatedBuffer::new(
        device,
        allocator,
        &BufferDesc {
            name,
            size: data.len() as vk::DeviceSize,
            usage: vk::BufferUsageFlags::TRANSFER_SRC,
            location: MemoryLocation::CpuToGpu,
            shared_families: &[],
        },
    )?;

    let result = staging.write(0, data).and_then(|()| f(staging.buffer));
    unsafe { staging.destroy(device, allocator) };
    result
}

/// Copy `mesh` into device-local vertex and index buffers.
pub fn upload_geometry(
    device: &ash::Device,
    allocator: &Mutex<Allocator>,
    transfer: UploadQueue,
    shared_families: &[u32],
    mesh: &MeshData,
) -> RendererResult<GpuGeometry> {
    if mesh.vertices.is_empty() || mesh.indices.is_empty() {
        return Err(RendererError::BufferCreationFailed(
            "Mesh has no vertices or no indices".to_string(),
        ));
    }

    let vertex_bytes = mesh.vertex_bytes();
    let index_bytes = mesh.index_bytes();

    let mut vertex_buffer = AllocatedBuffer::new(
        device,
        allocator,
        &BufferDesc {
            name: "vertex buffer",
            size: vertex_bytes.len() as vk::DeviceSize,
            usage: vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::VERTEX_BUFFER,
            location: MemoryLocation::GpuOnly,
            shared_families,
        },
    )?;
    let mut index_buffer = match AllocatedBuffer::new(
        device,
        allocator,
        &BufferDesc {
            name: "index buffer",
            size: index_bytes.len() as vk::DeviceSize,
            usage: vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::INDEX_BUFFER,
            location: MemoryLocation::GpuOnly,
            shared_families,
        },
    ) {
        Ok(buffer) => buffer,
        Err(e) => {
            unsafe { vertex_buffer.destroy(device, allocator) };
            return Err(e);
        }
    };

    let copied = with_staging(device, allocator, "vertex staging", vertex_bytes, |vertex_src| {
        with_staging(device, allocator, "index staging", index_bytes, |index_src| {
            let commands = OneShotCommands::begin(device, transfer)?;
            unsafe {
                device.cmd_copy_buffer(
                    commands.cmd,
                    vertex_src,
                    vertex_buffer.buffer,
                    &[vk::BufferCopy::default().size(vertex_buffer.size)],
                );
                device.cmd_copy_buffer(
                    commands.cmd,
                    index_src,
                    index_buffer.buffer,
                    &[vk::BufferCopy::default().size(index_buffer.size)],
                );
            }
            commands.submit_and_wait()
        })
    });

    if let Err(e) = copied {
        unsafe {
            vertex_buffer.destroy(device, allocator);
            index_buffer.destroy(device, allocator);
        }
        return Err(e);
    }

    Ok(GpuGeometry {
        vertex_buffer,
        index_buffer,
        index_count: mesh.index_count(),
    })
}

/// Whether the texture format can be the source and target of linear blits.
pub fn supports_linear_blit(properties: &vk::FormatProperties) -> bool {
    properties
        .optimal_tiling_features
        .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
}

/// Source and destination extents of each blit in a mip chain.
///
/// Entry `i` blits level `i` into level `i + 1`.
pub fn mip_blit_extents(width: u32, height: u32, mip_levels: u32) -> Vec<([i32; 2], [i32; 2])> {
    let mut w = width as i32;
    let mut h = height as i32;
    let mut blits = Vec::with_capacity(mip_levels.saturating_sub(1) as usize);

    for _ in 1..mip_levels {
        let next = [(w / 2).max(1), (h / 2).max(1)];
        blits.push(([w, h], next));
        [w, h] = next;
    }

    blits
}

/// Record the blits and barriers that fill mip levels `1..mip_levels` from level 0.
///
/// Expects every level in `TransferDst`; leaves every level in `ShaderReadOnly`.
fn record_mipmap_generation(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    width: u32,
    height: u32,
    mip_levels: u32,
) -> RendererResult<()> {
    use ImageLayoutState::*;

    for (level, (src, dst)) in (1..).zip(mip_blit_extents(width, height, mip_levels)) {
        record_image_barrier(device, cmd, image, level - 1, 1, TransferDst, TransferSrc)?;

        let subresource = |mip_level| vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level,
            base_array_layer: 0,
            layer_count: 1,
        };
        let blit = vk::ImageBlit::default()
            .src_subresource(subresource(level - 1))
            .src_offsets([
                vk::Offset3D::default(),
                vk::Offset3D {
                    x: src[0],
                    y: src[1],
                    z: 1,
                },
            ])
            .dst_subresource(subresource(level))
            .dst_offsets([
                vk::Offset3D::default(),
                vk::Offset3D {
                    x: dst[0],
                    y: dst[1],
                    z: 1,
                },
            ]);

        unsafe {
            device.cmd_blit_image(
                cmd,
                image,
                TransferSrc.to_vk(),
                image,
                TransferDst.to_vk(),
                &[blit],
                vk::Filter::LINEAR,
            );
        }

        record_image_barrier(device, cmd, image, level - 1, 1, TransferSrc, ShaderReadOnly)?;
    }

    record_image_barrier(
        device,
        cmd,
        image,
        mip_levels - 1,
        1,
        TransferDst,
        ShaderReadOnly,
    )
}

/// Copy `texture` into a sampled image, optionally generating its mip chain.
///
/// `linear_blit_supported` comes from [`supports_linear_blit`] for
/// [`TEXTURE_FORMAT`]; mip generation fails without it.
pub fn upload_texture(
    device: &ash::Device,
    allocator: &Mutex<Allocator>,
    graphics: UploadQueue,
    texture: &TextureData,
    generate_mipmaps: bool,
    linear_blit_supported: bool,
) -> RendererResult<GpuTexture> {
    texture.validate()?;

    let mip_levels = texture.mip_level_count(generate_mipmaps);
    if mip_levels > 1 && !linear_blit_supported {
        return Err(RendererError::TextureCreationFailed(format!(
            "{:?} does not support linear blitting, cannot generate mipmaps for '{}'",
            TEXTURE_FORMAT, texture.name
        )));
    }

    let mut gpu_texture = create_texture_image(device, allocator, texture, mip_levels)?;

    let recorded = with_staging(device, allocator, "texture staging", &texture.data, |src| {
        let commands = OneShotCommands::begin(device, graphics)?;
        let cmd = commands.cmd;
        let image = gpu_texture.image;

        record_image_barrier(
            device,
            cmd,
            image,
            0,
            mip_levels,
            ImageLayoutState::Undefined,
            ImageLayoutState::TransferDst,
        )?;

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_extent(vk::Extent3D {
                width: texture.width,
                height: texture.height,
                depth: 1,
            });
        unsafe {
            device.cmd_copy_buffer_to_image(
                cmd,
                src,
                image,
                ImageLayoutState::TransferDst.to_vk(),
                &[region],
            );
        }

        if mip_levels > 1 {
            record_mipmap_generation(device, cmd, image, texture.width, texture.height, mip_levels)?;
        } else {
            record_image_barrier(
                device,
                cmd,
                image,
                0,
                1,
                ImageLayoutState::TransferDst,
                ImageLayoutState::ShaderReadOnly,
            )?;
        }

        commands.submit_and_wait()
    });

    let viewed = recorded.and_then(|()| {
        let view_info = vk::ImageViewCreateInfo::default()
            .image(gpu_texture.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            });
        unsafe { device.create_image_view(&view_info, None) }.map_err(|e| {
            RendererError::TextureCreationFailed(format!(
                "Failed to create view for '{}': {:?}",
                texture.name, e
            ))
        })
    });

    match viewed {
        Ok(view) => {
            gpu_texture.view = view;
            Ok(gpu_texture)
        }
        Err(e) => {
            unsafe { gpu_texture.destroy(device, allocator) };
            Err(e)
        }
    }
}

fn create_texture_image(
    device: &ash::Device,
    allocator: &Mutex<Allocator>,
    texture: &TextureData,
    mip_levels: u32,
) -> RendererResult<GpuTexture> {
    let image_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(TEXTURE_FORMAT)
        .extent(vk::Extent3D {
            width: texture.width,
            height: texture.height,
            depth: 1,
        })
        .mip_levels(mip_levels)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(
            vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::SAMPLED,
        )
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    let image = unsafe { device.create_image(&image_info, None) }.map_err(|e| {
        RendererError::TextureCreationFailed(format!(
            "Failed to create image for '{}': {:?}",
            texture.name, e
        ))
    })?;

    let requirements = unsafe { device.get_image_memory_requirements(image) };
    let allocation = allocator.lock().allocate(&AllocationCreateDesc {
        name: &texture.name,
        requirements,
        location: MemoryLocation::GpuOnly,
        linear: false,
        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
    });
    let allocation = match allocation {
        Ok(allocation) => allocation,
        Err(e) => {
            unsafe { device.destroy_image(image, None) };
            return Err(e.into());
        }
    };

    if let Err(e) =
        unsafe { device.bind_image_memory(image, allocation.memory(), allocation.offset()) }
    {
        unsafe { device.destroy_image(image, None) };
        if let Err(e) = allocator.lock().free(allocation) {
            log::warn!("Failed to free memory for '{}': {}", texture.name, e);
        }
        return Err(RendererError::TextureCreationFailed(format!(
            "Failed to bind memory for '{}': {:?}",
            texture.name, e
        )));
    }

    Ok(GpuTexture {
        image,
        view: vk::ImageView::null(),
        width: texture.width,
        height: texture.height,
        mip_levels,
        allocation: Some(allocation),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::mip_level_count;

    #[test]
    fn test_mip_blits_halve_each_level() {
        let blits = mip_blit_extents(8, 4, mip_level_count(8, 4, true));
        assert_eq!(
            blits,
            vec![([8, 4], [4, 2]), ([4, 2], [2, 1]), ([2, 1], [1, 1])]
        );
    }

    #[test]
    fn test_mip_blits_clamp_to_one() {
        let blits = mip_blit_extents(16, 1, mip_level_count(16, 1, true));
        assert_eq!(blits.len(), 4);
        assert!(blits.iter().all(|(_, dst)| dst[1] == 1));
        assert_eq!(blits.last().map(|(_, dst)| *dst), Some([1, 1]));
    }

    #[test]
    fn test_single_level_has_no_blits() {
        assert!(mip_blit_extents(256, 256, 1).is_empty());
        assert!(mip_blit_extents(1, 1, mip_level_count(1, 1, true)).is_empty());
    }

    #[test]
    fn test_blits_chain_from_previous_level() {
        let blits = mip_blit_extents(300, 200, mip_level_count(300, 200, true));
        for pair in blits.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
    }

    #[test]
    fn test_linear_blit_support() {
        let supported = vk::FormatProperties {
            optimal_tiling_features: vk::FormatFeatureFlags::SAMPLED_IMAGE
                | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR,
            ..Default::default()
        };
        assert!(supports_linear_blit(&supported));

        let linear_tiling_only = vk::FormatProperties {
            linear_tiling_features: vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR,
            ..Default::default()
        };
        assert!(!supports_linear_blit(&linear_tiling_only));
    }
}
