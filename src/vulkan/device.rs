//! Vulkan physical and logical device management.

use std::ffi::CStr;

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};

use crate::error::{RendererError, RendererResult};

/// Queue family indices chosen on the physical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub compute: u32,
    pub transfer: u32,
}

impl QueueFamilyIndices {
    /// Classify families by their strongest capability.
    ///
    /// A family with the graphics bit counts as graphics only; one with compute
    /// but no graphics counts as compute; one with transfer alone counts as
    /// transfer. The first family of each class wins. All three classes must
    /// be present, so the chosen indices are always distinct.
    pub fn find(families: &[vk::QueueFlags]) -> RendererResult<Self> {
        let mut graphics = None;
        let mut compute = None;
        let mut transfer = None;

        for (index, flags) in families.iter().enumerate() {
            let index = index as u32;
            if flags.contains(vk::QueueFlags::GRAPHICS) {
                graphics.get_or_insert(index);
            } else if flags.contains(vk::QueueFlags::COMPUTE) {
                compute.get_or_insert(index);
            } else if flags.contains(vk::QueueFlags::TRANSFER) {
                transfer.get_or_insert(index);
            }
        }

        Ok(Self {
            graphics: graphics.ok_or(RendererError::MissingQueueFamily("graphics"))?,
            compute: compute.ok_or(RendererError::MissingQueueFamily("compute"))?,
            transfer: transfer.ok_or(RendererError::MissingQueueFamily("transfer"))?,
        })
    }

    /// Families that share geometry buffers.
    pub fn graphics_and_transfer(&self) -> [u32; 2] {
        [self.graphics, self.transfer]
    }
}

/// The facts device selection looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCandidate {
    pub device_type: vk::PhysicalDeviceType,
    /// Size of memory heap 0, `None` if the device reports no heaps.
    pub primary_heap_size: Option<vk::DeviceSize>,
}

/// Index of the discrete GPU with the largest primary heap.
///
/// Ties keep the earlier device.
pub fn select_discrete_device(candidates: &[DeviceCandidate]) -> Option<usize> {
    let mut best: Option<(usize, vk::DeviceSize)> = None;

    for (index, candidate) in candidates.iter().enumerate() {
        if candidate.device_type != vk::PhysicalDeviceType::DISCRETE_GPU {
            continue;
        }
        let Some(heap_size) = candidate.primary_heap_size else {
            continue;
        };
        if best.map_or(heap_size > 0, |(_, size)| heap_size > size) {
            best = Some((index, heap_size));
        }
    }

    best.map(|(index, _)| index)
}

/// Selected physical device and the properties the renderer depends on.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub physical_device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Stride between dynamically offset uniform records.
    pub fn min_uniform_buffer_offset_alignment(&self) -> vk::DeviceSize {
        self.properties.limits.min_uniform_buffer_offset_alignment
    }

    pub fn anisotropy_supported(&self) -> bool {
        self.features.sampler_anisotropy == vk::TRUE
    }

    pub fn max_sampler_anisotropy(&self) -> f32 {
        self.properties.limits.max_sampler_anisotropy
    }

    pub fn name(&self) -> String {
        // SAFETY: device_name is a null-terminated array filled by the driver
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

/// Select the discrete GPU with the most video memory.
///
/// The device must expose graphics, compute and transfer queue families and
/// its graphics family must be able to present to `surface`.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> RendererResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(|e| {
        RendererError::InitializationFailed(format!(
            "Failed to enumerate physical devices: {:?}",
            e
        ))
    })?;

    let candidates: Vec<DeviceCandidate> = devices
        .iter()
        .map(|&device| {
            let properties = unsafe { instance.get_physical_device_properties(device) };
            let memory = unsafe { instance.get_physical_device_memory_properties(device) };
            log::info!(
                "Found GPU: {:?} (type: {:?})",
                unsafe { CStr::from_ptr(properties.device_name.as_ptr()) },
                properties.device_type
            );
            DeviceCandidate {
                device_type: properties.device_type,
                primary_heap_size: (memory.memory_heap_count > 0)
                    .then(|| memory.memory_heaps[0].size),
            }
        })
        .collect();

    let index = select_discrete_device(&candidates).ok_or(RendererError::NoSuitableDevice)?;
    let physical_device = devices[index];

    let properties = unsafe { instance.get_physical_device_properties(physical_device) };
    let features = unsafe { instance.get_physical_device_features(physical_device) };
    let family_flags: Vec<vk::QueueFlags> =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) }
            .iter()
            .map(|family| family.queue_flags)
            .collect();
    let queue_families = QueueFamilyIndices::find(&family_flags)?;

    let presentable = unsafe {
        surface_loader.get_physical_device_surface_support(
            physical_device,
            queue_families.graphics,
            surface,
        )
    }?;
    if !presentable {
        return Err(RendererError::InitializationFailed(
            "Graphics queue family cannot present to the window surface".to_string(),
        ));
    }

    check_descriptor_features(instance, physical_device)?;

    let info = PhysicalDeviceInfo {
        physical_device,
        properties,
        features,
        queue_families,
    };

    log::info!(
        "Selected GPU: {} (uniform alignment {}, queues {:?})",
        info.name(),
        info.min_uniform_buffer_offset_alignment(),
        queue_families
    );

    Ok(info)
}

/// Partially bound texture arrays need both features below.
fn check_descriptor_features(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> RendererResult<()> {
    let mut indexing = vk::PhysicalDeviceDescriptorIndexingFeatures::default();
    let mut robustness2 = vk::PhysicalDeviceRobustness2FeaturesEXT::default();
    let mut features2 = vk::PhysicalDeviceFeatures2::default()
        .push_next(&mut indexing)
        .push_next(&mut robustness2);

    unsafe { instance.get_physical_device_features2(physical_device, &mut features2) };

    if indexing.descriptor_binding_partially_bound == vk::FALSE {
        return Err(RendererError::InitializationFailed(
            "descriptorBindingPartiallyBound is not supported".to_string(),
        ));
    }
    if robustness2.null_descriptor == vk::FALSE {
        return Err(RendererError::InitializationFailed(
            "robustness2 nullDescriptor is not supported".to_string(),
        ));
    }
    Ok(())
}

/// Create the logical device with one graphics queue and one transfer queue.
pub fn create_logical_device(
    instance: &ash::Instance,
    info: &PhysicalDeviceInfo,
) -> RendererResult<ash::Device> {
    let queue_priorities = [1.0f32];
    let queue_create_infos = [
        vk::DeviceQueueCreateInfo::default()
            .queue_family_index(info.queue_families.graphics)
            .queue_priorities(&queue_priorities),
        vk::DeviceQueueCreateInfo::default()
            .queue_family_index(info.queue_families.transfer)
            .queue_priorities(&queue_priorities),
    ];

    let device_extensions = [
        ash::khr::swapchain::NAME.as_ptr(),
        ash::ext::robustness2::NAME.as_ptr(),
    ];

    let features = vk::PhysicalDeviceFeatures::default()
        .sampler_anisotropy(info.anisotropy_supported());

    // Unloaded texture slots stay null inside the bindless array
    let mut indexing_features =
        vk::PhysicalDeviceDescriptorIndexingFeatures::default().descriptor_binding_partially_bound(true);
    let mut robustness2_features =
        vk::PhysicalDeviceRobustness2FeaturesEXT::default().null_descriptor(true);

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&device_extensions)
        .enabled_features(&features)
        .push_next(&mut indexing_features)
        .push_next(&mut robustness2_features);

    let device = unsafe { instance.create_device(info.physical_device, &create_info, None) }
        .map_err(|e| {
            RendererError::InitializationFailed(format!("Failed to create logical device: {:?}", e))
        })?;

    Ok(device)
}

/// Create a memory allocator for the Vulkan device.
pub fn create_allocator(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: &ash::Device,
) -> RendererResult<Allocator> {
    let allocator = Allocator::new(&AllocatorCreateDesc {
        instance: instance.clone(),
        device: device.clone(),
        physical_device,
        debug_settings: Default::default(),
        buffer_device_address: false,
        allocation_sizes: gpu_allocator::AllocationSizes::default(),
    })
    .map_err(|e| {
        RendererError::InitializationFailed(format!("Failed to create memory allocator: {}", e))
    })?;

    Ok(allocator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vk::PhysicalDeviceType as Type;
    use vk::QueueFlags as Q;

    fn candidate(device_type: Type, heap: Option<u64>) -> DeviceCandidate {
        DeviceCandidate {
            device_type,
            primary_heap_size: heap,
        }
    }

    #[test]
    fn test_queue_families_are_classified_exclusively() {
        let families = [
            Q::GRAPHICS | Q::COMPUTE | Q::TRANSFER,
            Q::COMPUTE | Q::TRANSFER,
            Q::TRANSFER | Q::SPARSE_BINDING,
        ];
        let indices = QueueFamilyIndices::find(&families).unwrap();
        assert_eq!(
            indices,
            QueueFamilyIndices {
                graphics: 0,
                compute: 1,
                transfer: 2
            }
        );
        assert_eq!(indices.graphics_and_transfer(), [0, 2]);
    }

    #[test]
    fn test_first_family_of_each_class_wins() {
        let families = [Q::TRANSFER, Q::GRAPHICS, Q::COMPUTE, Q::GRAPHICS, Q::TRANSFER];
        let indices = QueueFamilyIndices::find(&families).unwrap();
        assert_eq!((indices.graphics, indices.compute, indices.transfer), (1, 2, 0));
    }

    #[test]
    fn test_missing_dedicated_transfer_family_fails() {
        // Integrated-style device exposing only a universal queue
        let families = [Q::GRAPHICS | Q::COMPUTE | Q::TRANSFER, Q::COMPUTE];
        assert!(matches!(
            QueueFamilyIndices::find(&families),
            Err(RendererError::MissingQueueFamily("transfer"))
        ));
        assert!(matches!(
            QueueFamilyIndices::find(&[Q::COMPUTE, Q::TRANSFER]),
            Err(RendererError::MissingQueueFamily("graphics"))
        ));
    }

    #[test]
    fn test_discrete_device_with_largest_heap_is_selected() {
        let candidates = [
            candidate(Type::INTEGRATED_GPU, Some(32 << 30)),
            candidate(Type::DISCRETE_GPU, Some(4 << 30)),
            candidate(Type::DISCRETE_GPU, Some(8 << 30)),
            candidate(Type::DISCRETE_GPU, None),
            candidate(Type::CPU, Some(64 << 30)),
        ];
        assert_eq!(select_discrete_device(&candidates), Some(2));
    }

    #[test]
    fn test_no_discrete_device() {
        let candidates = [
            candidate(Type::INTEGRATED_GPU, Some(1 << 30)),
            candidate(Type::VIRTUAL_GPU, Some(1 << 30)),
        ];
        assert_eq!(select_discrete_device(&candidates), None);
        assert_eq!(select_discrete_device(&[]), None);
    }
}
