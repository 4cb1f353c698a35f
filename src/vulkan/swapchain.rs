//! Presentation surface, swapchain and the shared depth/stencil target.
//!
//! The swapchain is built once for the initial window size and never
//! recreated; an out-of-date surface surfaces as an acquire or present error.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;

use crate::config::PresentMode;
use crate::error::{RendererError, RendererResult};

use super::device::PhysicalDeviceInfo;

/// Depth/stencil formats in order of preference.
pub const DEPTH_FORMAT_PREFERENCE: [vk::Format; 5] = [
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D16_UNORM_S8_UINT,
    vk::Format::D32_SFLOAT,
    vk::Format::D16_UNORM,
];

/// Chosen depth attachment format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthFormat {
    pub format: vk::Format,
    pub stencil_available: bool,
}

impl DepthFormat {
    pub fn aspect_mask(&self) -> vk::ImageAspectFlags {
        if self.stencil_available {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    }
}

fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::S8_UINT
    )
}

/// First format in [`DEPTH_FORMAT_PREFERENCE`] for which `supports` holds.
pub fn choose_depth_format(supports: impl Fn(vk::Format) -> bool) -> RendererResult<DepthFormat> {
    DEPTH_FORMAT_PREFERENCE
        .iter()
        .copied()
        .find(|&format| supports(format))
        .map(|format| DepthFormat {
            format,
            stencil_available: has_stencil_component(format),
        })
        .ok_or(RendererError::NoDepthFormat)
}

/// Query whether `format` can be an optimally tiled depth/stencil attachment.
pub fn supports_depth_attachment(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    format: vk::Format,
) -> bool {
    let properties =
        unsafe { instance.get_physical_device_format_properties(physical_device, format) };
    properties
        .optimal_tiling_features
        .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
}

pub fn convert_present_mode(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
    }
}

/// Use `preferred` when the surface offers it, FIFO otherwise.
pub fn choose_present_mode(
    preferred: vk::PresentModeKHR,
    available: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    if available.contains(&preferred) {
        preferred
    } else {
        log::warn!(
            "Present mode {:?} not supported, falling back to FIFO",
            preferred
        );
        // Always available
        vk::PresentModeKHR::FIFO
    }
}

/// First reported format, or BGRA8 UNORM when the surface has no preference.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> RendererResult<vk::SurfaceFormatKHR> {
    let first = formats.first().copied().ok_or_else(|| {
        RendererError::SwapchainCreationFailed("Surface reports no formats".to_string())
    })?;

    if first.format == vk::Format::UNDEFINED {
        return Ok(vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        });
    }
    Ok(first)
}

/// `requested`, raised to at least `min + 1` and capped at `max` when the surface has one.
pub fn choose_image_count(requested: u32, capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = requested.max(capabilities.min_image_count + 1);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// The surface's fixed extent, or the window size clamped to the surface limits.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// Depth/stencil image shared by every framebuffer.
pub struct DepthTarget {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: DepthFormat,
    allocation: Option<Allocation>,
}

/// Swapchain settings gathered from the config.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainRequest {
    pub width: u32,
    pub height: u32,
    pub present_mode: PresentMode,
    pub image_count: u32,
}

/// Vulkan swapchain resources.
pub struct Swapchain {
    pub loader: ash::khr::swapchain::Device,
    pub swapchain: vk::SwapchainKHR,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub depth: DepthTarget,
}

impl Swapchain {
    /// Create the swapchain, its image views and the depth target.
    pub fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        allocator: &Mutex<Allocator>,
        physical: &PhysicalDeviceInfo,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        request: SwapchainRequest,
    ) -> RendererResult<Self> {
        let pd = physical.physical_device;
        let capabilities =
            unsafe { surface_loader.get_physical_device_surface_capabilities(pd, surface) }
                .map_err(|e| {
                    RendererError::SwapchainCreationFailed(format!(
                        "Failed to query surface capabilities: {:?}",
                        e
                    ))
                })?;
        let formats = unsafe { surface_loader.get_physical_device_surface_formats(pd, surface) }
            .map_err(|e| {
                RendererError::SwapchainCreationFailed(format!(
                    "Failed to query surface formats: {:?}",
                    e
                ))
            })?;
        let present_modes =
            unsafe { surface_loader.get_physical_device_surface_present_modes(pd, surface) }
                .map_err(|e| {
                    RendererError::SwapchainCreationFailed(format!(
                        "Failed to query present modes: {:?}",
                        e
                    ))
                })?;

        let surface_format = choose_surface_format(&formats)?;
        let present_mode =
            choose_present_mode(convert_present_mode(request.present_mode), &present_modes);
        let extent = choose_extent(&capabilities, request.width, request.height);
        let image_count = choose_image_count(request.image_count, &capabilities);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let loader = ash::khr::swapchain::Device::new(instance, device);
        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }.map_err(|e| {
            RendererError::SwapchainCreationFailed(format!("Failed to create swapchain: {:?}", e))
        })?;

        let images = unsafe { loader.get_swapchain_images(swapchain) }.map_err(|e| {
            RendererError::SwapchainCreationFailed(format!(
                "Failed to get swapchain images: {:?}",
                e
            ))
        })?;

        let image_views = images
            .iter()
            .map(|&image| {
                create_image_view(
                    device,
                    image,
                    surface_format.format,
                    vk::ImageAspectFlags::COLOR,
                )
            })
            .collect::<RendererResult<Vec<_>>>()?;

        let depth_format = choose_depth_format(|format| supports_depth_attachment(instance, pd, format))?;
        let depth = create_depth_target(device, allocator, depth_format, extent)?;

        log::info!(
            "Swapchain: {} images, {}x{}, {:?}, {:?}, depth {:?} (stencil: {})",
            images.len(),
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            depth_format.format,
            depth_format.stencil_available
        );

        Ok(Self {
            loader,
            swapchain,
            surface_format,
            present_mode,
            extent,
            images,
            image_views,
            depth,
        })
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Destroy views, the depth target and the swapchain itself.
    pub unsafe fn destroy(&mut self, device: &ash::Device, allocator: &Mutex<Allocator>) {
        device.destroy_image_view(self.depth.view, None);
        device.destroy_image(self.depth.image, None);
        if let Some(allocation) = self.depth.allocation.take() {
            if let Err(e) = allocator.lock().free(allocation) {
                log::error!("Failed to free depth image memory: {}", e);
            }
        }

        for &view in &self.image_views {
            device.destroy_image_view(view, None);
        }
        self.image_views.clear();

        self.loader.destroy_swapchain(self.swapchain, None);
        self.swapchain = vk::SwapchainKHR::null();
    }
}

/// Create a single-mip 2D view.
pub fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
) -> RendererResult<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&view_info, None) }.map_err(|e| {
        RendererError::SwapchainCreationFailed(format!("Failed to create image view: {:?}", e))
    })
}

fn create_depth_target(
    device: &ash::Device,
    allocator: &Mutex<Allocator>,
    format: DepthFormat,
    extent: vk::Extent2D,
) -> RendererResult<DepthTarget> {
    let image_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format.format)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    let image = unsafe { device.create_image(&image_info, None) }.map_err(|e| {
        RendererError::SwapchainCreationFailed(format!("Failed to create depth image: {:?}", e))
    })?;

    let requirements = unsafe { device.get_image_memory_requirements(image) };
    let allocation = allocator.lock().allocate(&AllocationCreateDesc {
        name: "depth_stencil",
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

    let view = unsafe { device.bind_image_memory(image, allocation.memory(), allocation.offset()) }
        .map_err(|e| {
            RendererError::SwapchainCreationFailed(format!("Failed to bind depth memory: {:?}", e))
        })
        .and_then(|()| create_image_view(device, image, format.format, format.aspect_mask()));
    let view = match view {
        Ok(view) => view,
        Err(e) => {
            unsafe { device.destroy_image(image, None) };
            if let Err(free_error) = allocator.lock().free(allocation) {
                log::warn!("Failed to free depth memory: {}", free_error);
            }
            return Err(e);
        }
    };

    Ok(DepthTarget {
        image,
        view,
        format,
        allocation: Some(allocation),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2048,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_depth_format_prefers_stencil() {
        let depth = choose_depth_format(|_| true).unwrap();
        assert_eq!(depth.format, vk::Format::D32_SFLOAT_S8_UINT);
        assert!(depth.stencil_available);
        assert_eq!(
            depth.aspect_mask(),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn test_depth_only_device_disables_stencil() {
        let depth = choose_depth_format(|f| f == vk::Format::D32_SFLOAT).unwrap();
        assert_eq!(depth.format, vk::Format::D32_SFLOAT);
        assert!(!depth.stencil_available);
        assert_eq!(depth.aspect_mask(), vk::ImageAspectFlags::DEPTH);
    }

    #[test]
    fn test_depth_format_follows_preference_order() {
        let depth = choose_depth_format(|f| {
            f == vk::Format::D16_UNORM || f == vk::Format::D24_UNORM_S8_UINT
        })
        .unwrap();
        assert_eq!(depth.format, vk::Format::D24_UNORM_S8_UINT);
    }

    #[test]
    fn test_no_depth_format() {
        assert!(matches!(
            choose_depth_format(|_| false),
            Err(RendererError::NoDepthFormat)
        ));
    }

    #[rstest]
    #[case(vk::PresentModeKHR::MAILBOX, &[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX], vk::PresentModeKHR::MAILBOX)]
    #[case(vk::PresentModeKHR::MAILBOX, &[vk::PresentModeKHR::FIFO], vk::PresentModeKHR::FIFO)]
    #[case(vk::PresentModeKHR::IMMEDIATE, &[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX], vk::PresentModeKHR::FIFO)]
    #[case(vk::PresentModeKHR::FIFO, &[vk::PresentModeKHR::FIFO], vk::PresentModeKHR::FIFO)]
    fn test_present_mode_falls_back_to_fifo(
        #[case] preferred: vk::PresentModeKHR,
        #[case] available: &[vk::PresentModeKHR],
        #[case] expected: vk::PresentModeKHR,
    ) {
        assert_eq!(choose_present_mode(preferred, available), expected);
    }

    #[test]
    fn test_surface_format_without_preference() {
        let undefined = vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let chosen = choose_surface_format(&[undefined]).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);

        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(
            choose_surface_format(&[srgb, undefined]).unwrap().format,
            vk::Format::R8G8B8A8_SRGB
        );
        assert!(choose_surface_format(&[]).is_err());
    }

    #[rstest]
    #[case(3, 2, 0, 3)]
    #[case(3, 3, 0, 4)]
    #[case(3, 1, 2, 2)]
    #[case(3, 2, 8, 3)]
    fn test_image_count(
        #[case] requested: u32,
        #[case] min: u32,
        #[case] max: u32,
        #[case] expected: u32,
    ) {
        assert_eq!(choose_image_count(requested, &capabilities(min, max)), expected);
    }

    #[test]
    fn test_extent_clamps_to_surface_limits() {
        let caps = capabilities(2, 0);
        assert_eq!(
            choose_extent(&caps, 8000, 600),
            vk::Extent2D {
                width: 4096,
                height: 600
            }
        );

        let fixed = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            ..caps
        };
        assert_eq!(choose_extent(&fixed, 1, 1), fixed.current_extent);
    }
}
