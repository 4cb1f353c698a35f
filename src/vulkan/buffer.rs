//! Buffers backed by gpu-allocator memory.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;

use crate::error::{RendererError, RendererResult};

/// Description of a buffer to create.
#[derive(Debug, Clone, Copy)]
pub struct BufferDesc<'a> {
    pub name: &'a str,
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub location: MemoryLocation,
    /// Queue families sharing the buffer concurrently. Empty means exclusive.
    pub shared_families: &'a [u32],
}

pub struct AllocatedBuffer {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
    allocation: Option<Allocation>,
}

impl AllocatedBuffer {
    pub fn new(
        device: &ash::Device,
        allocator: &Mutex<Allocator>,
        desc: &BufferDesc<'_>,
    ) -> RendererResult<Self> {
        let mut buffer_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(desc.usage);
        buffer_info = if desc.shared_families.len() > 1 {
            buffer_info
                .sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(desc.shared_families)
        } else {
            buffer_info.sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let buffer = unsafe { device.create_buffer(&buffer_info, None) }.map_err(|e| {
            RendererError::BufferCreationFailed(format!(
                "Failed to create buffer '{}': {:?}",
                desc.name, e
            ))
        })?;

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let allocation = allocator.lock().allocate(&AllocationCreateDesc {
            name: desc.name,
            requirements,
            location: desc.location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        if let Err(e) =
            unsafe { device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) }
        {
            unsafe { device.destroy_buffer(buffer, None) };
            if let Err(e) = allocator.lock().free(allocation) {
                log::warn!("Failed to free memory for '{}': {}", desc.name, e);
            }
            return Err(RendererError::BufferCreationFailed(format!(
                "Failed to bind memory for '{}': {:?}",
                desc.name, e
            )));
        }

        Ok(Self {
            buffer,
            size: desc.size,
            allocation: Some(allocation),
        })
    }

    /// Copy `data` into the mapped memory at `offset`.
    ///
    /// Only valid for host-visible buffers.
    pub fn write(&mut self, offset: vk::DeviceSize, data: &[u8]) -> RendererResult<()> {
        let end = offset as usize + data.len();
        if end as vk::DeviceSize > self.size {
            return Err(RendererError::BufferCreationFailed(format!(
                "Write of {} bytes at offset {} overflows buffer of {} bytes",
                data.len(),
                offset,
                self.size
            )));
        }

        let mapped = self
            .allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .ok_or_else(|| {
                RendererError::BufferCreationFailed("Buffer memory is not host visible".to_string())
            })?;
        mapped[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    /// Destroy the buffer and return its memory to the allocator.
    pub unsafe fn destroy(&mut self, device: &ash::Device, allocator: &Mutex<Allocator>) {
        device.destroy_buffer(self.buffer, None);
        self.buffer = vk::Buffer::null();
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = allocator.lock().free(allocation) {
                log::warn!("Failed to free buffer memory: {}", e);
            }
        }
    }
}
