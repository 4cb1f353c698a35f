//! Descriptor set layout, pool, per-image sets and the immutable samplers.
//!
//! Binding table:
//!
//! | binding | type                    | count | stage    |
//! |---------|-------------------------|-------|----------|
//! | 0       | dynamic uniform buffer  | 1     | vertex   |
//! | 1       | uniform buffer          | 1     | vertex   |
//! | 2       | dynamic uniform buffer  | 1     | vertex   |
//! | 3       | sampler                 | 2     | fragment |
//! | 4       | sampled image (partial) | 32    | fragment |

use ash::vk;

use crate::draw::SamplerKind;
use crate::error::{RendererError, RendererResult};
use crate::limits::{MAX_LOADED_TEXTURE_COUNT, SAMPLER_COUNT};

use super::device::PhysicalDeviceInfo;
use super::uniforms::{UniformLayout, UniformSet};

pub const PER_OBJECT_BINDING: u32 = 0;
pub const PER_FRAME_BINDING: u32 = 1;
pub const PER_RENDER_PASS_BINDING: u32 = 2;
pub const SAMPLER_BINDING: u32 = 3;
pub const TEXTURE_BINDING: u32 = 4;

const BINDING_COUNT: usize = 5;

pub fn layout_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; BINDING_COUNT] {
    let binding = |binding: u32, ty: vk::DescriptorType, count: usize, stage| {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(ty)
            .descriptor_count(count as u32)
            .stage_flags(stage)
    };

    [
        binding(
            PER_OBJECT_BINDING,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            1,
            vk::ShaderStageFlags::VERTEX,
        ),
        binding(
            PER_FRAME_BINDING,
            vk::DescriptorType::UNIFORM_BUFFER,
            1,
            vk::ShaderStageFlags::VERTEX,
        ),
        binding(
            PER_RENDER_PASS_BINDING,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            1,
            vk::ShaderStageFlags::VERTEX,
        ),
        binding(
            SAMPLER_BINDING,
            vk::DescriptorType::SAMPLER,
            SAMPLER_COUNT,
            vk::ShaderStageFlags::FRAGMENT,
        ),
        binding(
            TEXTURE_BINDING,
            vk::DescriptorType::SAMPLED_IMAGE,
            MAX_LOADED_TEXTURE_COUNT,
            vk::ShaderStageFlags::FRAGMENT,
        ),
    ]
}

/// Only the texture array may contain unwritten slots.
pub fn binding_flags() -> [vk::DescriptorBindingFlags; BINDING_COUNT] {
    let mut flags = [vk::DescriptorBindingFlags::empty(); BINDING_COUNT];
    flags[TEXTURE_BINDING as usize] = vk::DescriptorBindingFlags::PARTIALLY_BOUND;
    flags
}

/// Pool sizes for one set per swapchain image.
pub fn pool_sizes(image_count: u32) -> [vk::DescriptorPoolSize; 4] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            descriptor_count: 2 * image_count,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: image_count,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::SAMPLER,
            descriptor_count: SAMPLER_COUNT as u32 * image_count,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::SAMPLED_IMAGE,
            descriptor_count: MAX_LOADED_TEXTURE_COUNT as u32 * image_count,
        },
    ]
}

/// Sampler parameters for `kind`. `anisotropy` is the device maximum, if supported.
pub fn sampler_create_info(
    kind: SamplerKind,
    anisotropy: Option<f32>,
) -> vk::SamplerCreateInfo<'static> {
    let filter = match kind {
        SamplerKind::Linear => vk::Filter::LINEAR,
        SamplerKind::Nearest => vk::Filter::NEAREST,
    };

    vk::SamplerCreateInfo::default()
        .mag_filter(filter)
        .min_filter(filter)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(anisotropy.is_some())
        .max_anisotropy(anisotropy.unwrap_or(1.0))
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(vk::LOD_CLAMP_NONE)
}

/// Create one sampler per [`SamplerKind`], in index order.
pub fn create_samplers(
    device: &ash::Device,
    physical: &PhysicalDeviceInfo,
) -> RendererResult<[vk::Sampler; SAMPLER_COUNT]> {
    let anisotropy = physical
        .anisotropy_supported()
        .then(|| physical.max_sampler_anisotropy());

    let mut samplers = [vk::Sampler::null(); SAMPLER_COUNT];
    for kind in SamplerKind::ALL {
        let create_info = sampler_create_info(kind, anisotropy);
        match unsafe { device.create_sampler(&create_info, None) } {
            Ok(sampler) => samplers[kind.index() as usize] = sampler,
            Err(e) => {
                for sampler in samplers.iter().filter(|s| **s != vk::Sampler::null()) {
                    unsafe { device.destroy_sampler(*sampler, None) };
                }
                return Err(RendererError::InitializationFailed(format!(
                    "Failed to create {:?} sampler: {:?}",
                    kind, e
                )));
            }
        }
    }

    Ok(samplers)
}

/// Layout, pool and one descriptor set per swapchain image.
pub struct DescriptorSets {
    pub layout: vk::DescriptorSetLayout,
    pub pool: vk::DescriptorPool,
    pub sets: Vec<vk::DescriptorSet>,
}

impl DescriptorSets {
    pub fn new(device: &ash::Device, image_count: u32) -> RendererResult<Self> {
        let bindings = layout_bindings();
        let flags = binding_flags();
        let mut flags_info =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&flags);
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&bindings)
            .push_next(&mut flags_info);

        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(|e| {
                RendererError::PipelineCreationFailed(format!(
                    "Failed to create descriptor set layout: {:?}",
                    e
                ))
            })?;

        let sizes = pool_sizes(image_count);
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&sizes)
            .max_sets(image_count);
        let pool = match unsafe { device.create_descriptor_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_descriptor_set_layout(layout, None) };
                return Err(RendererError::PipelineCreationFailed(format!(
                    "Failed to create descriptor pool: {:?}",
                    e
                )));
            }
        };

        let layouts = vec![layout; image_count as usize];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let sets = match unsafe { device.allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => sets,
            Err(e) => {
                unsafe {
                    device.destroy_descriptor_pool(pool, None);
                    device.destroy_descriptor_set_layout(layout, None);
                }
                return Err(RendererError::PipelineCreationFailed(format!(
                    "Failed to allocate descriptor sets: {:?}",
                    e
                )));
            }
        };

        Ok(Self { layout, pool, sets })
    }

    /// Rewrite every set from the uniform buffers, samplers and texture views.
    ///
    /// `uniforms[i]` backs `sets[i]`. A `None` texture slot is written as a
    /// null view. Sets must not be in use by pending command buffers.
    pub fn refresh(
        &self,
        device: &ash::Device,
        uniforms: &[UniformSet],
        uniform_layout: &UniformLayout,
        samplers: &[vk::Sampler; SAMPLER_COUNT],
        textures: &[Option<vk::ImageView>; MAX_LOADED_TEXTURE_COUNT],
    ) {
        let sampler_infos = samplers.map(|sampler| vk::DescriptorImageInfo::default().sampler(sampler));
        let texture_infos = textures.map(|view| {
            vk::DescriptorImageInfo::default()
                .image_view(view.unwrap_or(vk::ImageView::null()))
                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        });

        for (&set, uniform_set) in self.sets.iter().zip(uniforms) {
            let per_object = [vk::DescriptorBufferInfo::default()
                .buffer(uniform_set.per_object.buffer)
                .offset(0)
                .range(uniform_layout.per_object.stride)];
            let per_frame = [vk::DescriptorBufferInfo::default()
                .buffer(uniform_set.per_frame.buffer)
                .offset(0)
                .range(uniform_layout.per_frame_size())];
            let per_render_pass = [vk::DescriptorBufferInfo::default()
                .buffer(uniform_set.per_render_pass.buffer)
                .offset(0)
                .range(uniform_layout.per_render_pass.stride)];

            let writes = [
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(PER_OBJECT_BINDING)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                    .buffer_info(&per_object),
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(PER_FRAME_BINDING)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&per_frame),
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(PER_RENDER_PASS_BINDING)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                    .buffer_info(&per_render_pass),
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(SAMPLER_BINDING)
                    .descriptor_type(vk::DescriptorType::SAMPLER)
                    .image_info(&sampler_infos),
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(TEXTURE_BINDING)
                    .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
                    .image_info(&texture_infos),
            ];

            unsafe { device.update_descriptor_sets(&writes, &[]) };
        }

        log::debug!(
            "Refreshed {} descriptor sets ({} textures bound)",
            self.sets.len(),
            textures.iter().filter(|view| view.is_some()).count()
        );
    }

    /// Destroying the pool frees the sets.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        device.destroy_descriptor_pool(self.pool, None);
        device.destroy_descriptor_set_layout(self.layout, None);
        self.sets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_layout_binding_table() {
        let bindings = layout_bindings();
        let table: Vec<(u32, vk::DescriptorType, u32, vk::ShaderStageFlags)> = bindings
            .iter()
            .map(|b| (b.binding, b.descriptor_type, b.descriptor_count, b.stage_flags))
            .collect();

        assert_eq!(
            table,
            vec![
                (0, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1, vk::ShaderStageFlags::VERTEX),
                (1, vk::DescriptorType::UNIFORM_BUFFER, 1, vk::ShaderStageFlags::VERTEX),
                (2, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1, vk::ShaderStageFlags::VERTEX),
                (3, vk::DescriptorType::SAMPLER, 2, vk::ShaderStageFlags::FRAGMENT),
                (4, vk::DescriptorType::SAMPLED_IMAGE, 32, vk::ShaderStageFlags::FRAGMENT),
            ]
        );
    }

    #[test]
    fn test_only_texture_array_is_partially_bound() {
        let flags = binding_flags();
        for (binding, flag) in flags.iter().enumerate() {
            assert_eq!(
                flag.contains(vk::DescriptorBindingFlags::PARTIALLY_BOUND),
                binding == TEXTURE_BINDING as usize
            );
        }
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(4)]
    fn test_pool_sizes_scale_with_image_count(#[case] images: u32) {
        let sizes = pool_sizes(images);
        let count = |ty| {
            sizes
                .iter()
                .find(|size| size.ty == ty)
                .map(|size| size.descriptor_count)
        };
        assert_eq!(count(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC), Some(2 * images));
        assert_eq!(count(vk::DescriptorType::UNIFORM_BUFFER), Some(images));
        assert_eq!(count(vk::DescriptorType::SAMPLER), Some(2 * images));
        assert_eq!(count(vk::DescriptorType::SAMPLED_IMAGE), Some(32 * images));
    }

    #[test]
    fn test_sampler_filters() {
        let linear = sampler_create_info(SamplerKind::Linear, None);
        assert_eq!(linear.mag_filter, vk::Filter::LINEAR);
        assert_eq!(linear.anisotropy_enable, vk::FALSE);
        assert_eq!(linear.address_mode_u, vk::SamplerAddressMode::REPEAT);
        assert_eq!(linear.max_lod, vk::LOD_CLAMP_NONE);

        let nearest = sampler_create_info(SamplerKind::Nearest, Some(16.0));
        assert_eq!(nearest.min_filter, vk::Filter::NEAREST);
        assert_eq!(nearest.mipmap_mode, vk::SamplerMipmapMode::LINEAR);
        assert_eq!(nearest.anisotropy_enable, vk::TRUE);
        assert_eq!(nearest.max_anisotropy, 16.0);
    }
}
