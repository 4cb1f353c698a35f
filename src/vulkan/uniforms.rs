//! Uniform record layouts and the per-image uniform buffers they live in.
//!
//! Per-object and per-render-pass records are addressed with dynamic offsets,
//! so each record occupies a stride that is its size rounded up to the
//! device's `minUniformBufferOffsetAlignment`.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use gpu_allocator::vulkan::Allocator;
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;

use crate::draw::DrawItem;
use crate::error::RendererResult;
use crate::limits::{MAX_DRAW_ITEMS_PER_FRAME, MAX_RENDER_PASS_COUNT};
use crate::scene::{normal_matrix, DirectionalLight};

use super::buffer::{AllocatedBuffer, BufferDesc};

/// Per-draw record at descriptor binding 0.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PerObjectUniforms {
    pub world: Mat4,
    pub normal: Mat4,
    /// xy: texture scale.
    pub data1: Vec4,
    pub sampler: u32,
    pub texture: u32,
    pub _padding: [u32; 2],
}

impl PerObjectUniforms {
    pub fn from_draw_item(item: &DrawItem) -> Self {
        Self {
            world: item.world,
            normal: normal_matrix(&item.world),
            data1: Vec4::new(item.texture_scale.x, item.texture_scale.y, 0.0, 0.0),
            sampler: item.sampler.index(),
            texture: item.texture.index(),
            _padding: [0; 2],
        }
    }
}

/// Lighting record at descriptor binding 1.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PerFrameUniforms {
    pub light_color: Vec4,
    pub light_direction: Vec4,
}

impl PerFrameUniforms {
    pub fn from_light(light: &DirectionalLight) -> Self {
        Self {
            light_color: light.radiance().extend(1.0),
            light_direction: light.direction.extend(0.0),
        }
    }
}

/// Camera record at descriptor binding 2.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PerRenderPassUniforms {
    pub view: Mat4,
    pub proj: Mat4,
    pub camera_position: Vec4,
}

impl PerRenderPassUniforms {
    pub fn new(view: Mat4, proj: Mat4, camera_position: Vec3) -> Self {
        Self {
            view,
            proj,
            camera_position: camera_position.extend(1.0),
        }
    }
}

/// Spacing between consecutive dynamically-offset records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformStride {
    pub stride: vk::DeviceSize,
}

impl UniformStride {
    /// Stride for records of `T` under the given offset alignment.
    pub fn of<T>(min_offset_alignment: vk::DeviceSize) -> Self {
        let size = std::mem::size_of::<T>() as vk::DeviceSize;
        let alignment = min_offset_alignment.max(1);
        Self {
            stride: size.div_ceil(alignment) * alignment,
        }
    }

    /// Byte offset of record `index`.
    pub fn offset(&self, index: u32) -> vk::DeviceSize {
        index as vk::DeviceSize * self.stride
    }

    /// Bytes needed for `count` records.
    pub fn size_for(&self, count: u32) -> vk::DeviceSize {
        self.offset(count)
    }
}

/// Strides for both dynamically-offset bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLayout {
    pub per_object: UniformStride,
    pub per_render_pass: UniformStride,
}

impl UniformLayout {
    pub fn new(min_offset_alignment: vk::DeviceSize) -> Self {
        Self {
            per_object: UniformStride::of::<PerObjectUniforms>(min_offset_alignment),
            per_render_pass: UniformStride::of::<PerRenderPassUniforms>(min_offset_alignment),
        }
    }

    pub fn per_object_size(&self) -> vk::DeviceSize {
        self.per_object.size_for(MAX_DRAW_ITEMS_PER_FRAME)
    }

    pub fn per_frame_size(&self) -> vk::DeviceSize {
        std::mem::size_of::<PerFrameUniforms>() as vk::DeviceSize
    }

    pub fn per_render_pass_size(&self) -> vk::DeviceSize {
        self.per_render_pass.size_for(MAX_RENDER_PASS_COUNT)
    }
}

/// The three uniform buffers replicated for one swapchain image.
pub struct UniformSet {
    pub per_object: AllocatedBuffer,
    pub per_frame: AllocatedBuffer,
    pub per_render_pass: AllocatedBuffer,
}

impl UniformSet {
    pub fn new(
        device: &ash::Device,
        allocator: &Mutex<Allocator>,
        layout: &UniformLayout,
    ) -> RendererResult<Self> {
        let create = |name: &str, size: vk::DeviceSize| {
            AllocatedBuffer::new(
                device,
                allocator,
                &BufferDesc {
                    name,
                    size,
                    usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
                    location: MemoryLocation::CpuToGpu,
                    shared_families: &[],
                },
            )
        };

        let mut per_object = create("per-object uniforms", layout.per_object_size())?;
        let mut per_frame = match create("per-frame uniforms", layout.per_frame_size()) {
            Ok(buffer) => buffer,
            Err(e) => {
                unsafe { per_object.destroy(device, allocator) };
                return Err(e);
            }
        };
        let per_render_pass =
            match create("per-render-pass uniforms", layout.per_render_pass_size()) {
                Ok(buffer) => buffer,
                Err(e) => {
                    unsafe {
                        per_object.destroy(device, allocator);
                        per_frame.destroy(device, allocator);
                    }
                    return Err(e);
                }
            };

        Ok(Self {
            per_object,
            per_frame,
            per_render_pass,
        })
    }

    pub fn write_per_object(
        &mut self,
        layout: &UniformLayout,
        slot: u32,
        record: &PerObjectUniforms,
    ) -> RendererResult<()> {
        self.per_object
            .write(layout.per_object.offset(slot), bytemuck::bytes_of(record))
    }

    pub fn write_per_frame(&mut self, record: &PerFrameUniforms) -> RendererResult<()> {
        self.per_frame.write(0, bytemuck::bytes_of(record))
    }

    pub fn write_per_render_pass(
        &mut self,
        layout: &UniformLayout,
        pass: u32,
        record: &PerRenderPassUniforms,
    ) -> RendererResult<()> {
        self.per_render_pass
            .write(layout.per_render_pass.offset(pass), bytemuck::bytes_of(record))
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device, allocator: &Mutex<Allocator>) {
        self.per_object.destroy(device, allocator);
        self.per_frame.destroy(device, allocator);
        self.per_render_pass.destroy(device, allocator);
    }
}
