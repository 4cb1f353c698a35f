//! The render device: one explicit context owning every GPU object.
//!
//! # Frame protocol
//!
//! ```text
//! begin_frame(light)
//!     begin_render_pass(camera)      up to 2 per frame (scene, HUD)
//!         submit(items)              any number of batches, 64 items total
//! end_frame()
//! ```
//!
//! Loading, destroying and descriptor refreshes happen between frames.

use std::mem::ManuallyDrop;
use std::path::Path;

use ash::vk;
use glam::Vec3;
use gpu_allocator::vulkan::Allocator;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::config::RendererConfig;
use crate::draw::{build_draw_items, DrawItem, GeometryHandle, Renderable, TextureHandle};
use crate::error::{RendererError, RendererResult};
use crate::limits::{
    MAX_DRAW_ITEMS_PER_FRAME, MAX_FRAMES_IN_FLIGHT, MAX_LOADED_GEOMETRY_COUNT,
    MAX_LOADED_TEXTURE_COUNT, MAX_SYNCHRONIZATION_TIMEOUT,
};
use crate::pool::SlotPool;
use crate::resources::{MeshData, TextureData};
use crate::scene::{view_matrix, CameraSettings, DirectionalLight};
use crate::vulkan::debug::DebugMessenger;
use crate::vulkan::descriptors::{create_samplers, DescriptorSets};
use crate::vulkan::device::{self, PhysicalDeviceInfo};
use crate::vulkan::frame::{dynamic_offsets, FrameRing, FrameSyncObjects};
use crate::vulkan::instance::create_instance;
use crate::vulkan::pipeline::{ForwardPipeline, ShaderBinary};
use crate::vulkan::render_pass::{clear_values, create_framebuffers, create_render_pass};
use crate::vulkan::swapchain::{Swapchain, SwapchainRequest};
use crate::vulkan::uniforms::{
    PerFrameUniforms, PerObjectUniforms, PerRenderPassUniforms, UniformLayout, UniformSet,
};
use crate::vulkan::upload::{
    create_transient_pool, supports_linear_blit, upload_geometry, upload_texture, GpuGeometry,
    GpuTexture, UploadQueue, TEXTURE_FORMAT,
};

/// Instance, surface, logical device and allocator.
///
/// Dropped after everything created from it.
struct GpuContext {
    _entry: ash::Entry,
    instance: ash::Instance,
    debug_messenger: Option<DebugMessenger>,
    surface_loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    physical: PhysicalDeviceInfo,
    device: ash::Device,
    graphics_queue: vk::Queue,
    transfer_queue: vk::Queue,
    allocator: ManuallyDrop<Mutex<Allocator>>,
}

impl GpuContext {
    fn new(
        window: &(impl HasDisplayHandle + HasWindowHandle),
        config: &RendererConfig,
    ) -> RendererResult<Self> {
        let display_handle = window
            .display_handle()
            .map_err(|e| {
                RendererError::InitializationFailed(format!("Failed to get display handle: {}", e))
            })?
            .as_raw();
        let window_handle = window
            .window_handle()
            .map_err(|e| {
                RendererError::InitializationFailed(format!("Failed to get window handle: {}", e))
            })?
            .as_raw();

        let entry = unsafe { ash::Entry::load() }.map_err(|e| {
            RendererError::InitializationFailed(format!("Failed to load Vulkan: {}", e))
        })?;

        let (instance, mut debug_messenger) = create_instance(
            &entry,
            &config.application_name,
            display_handle,
            config.validation,
            config.validation_level,
        )?;

        let destroy_instance = |instance: &ash::Instance, messenger: &mut Option<DebugMessenger>| unsafe {
            if let Some(messenger) = messenger.as_mut() {
                messenger.destroy();
            }
            instance.destroy_instance(None);
        };

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
        let surface = match unsafe {
            ash_window::create_surface(&entry, &instance, display_handle, window_handle, None)
        } {
            Ok(surface) => surface,
            Err(e) => {
                destroy_instance(&instance, &mut debug_messenger);
                return Err(RendererError::InitializationFailed(format!(
                    "Failed to create window surface: {:?}",
                    e
                )));
            }
        };

        let device_and_info = device::select_physical_device(&instance, &surface_loader, surface)
            .and_then(|physical| {
                let device = device::create_logical_device(&instance, &physical)?;
                Ok((physical, device))
            });
        let (physical, device) = match device_and_info {
            Ok(pair) => pair,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                destroy_instance(&instance, &mut debug_messenger);
                return Err(e);
            }
        };

        let allocator =
            match device::create_allocator(&instance, physical.physical_device, &device) {
                Ok(allocator) => allocator,
                Err(e) => {
                    unsafe {
                        device.destroy_device(None);
                        surface_loader.destroy_surface(surface, None);
                    }
                    destroy_instance(&instance, &mut debug_messenger);
                    return Err(e);
                }
            };

        let graphics_queue = unsafe { device.get_device_queue(physical.queue_families.graphics, 0) };
        let transfer_queue = unsafe { device.get_device_queue(physical.queue_families.transfer, 0) };

        Ok(Self {
            _entry: entry,
            instance,
            debug_messenger,
            surface_loader,
            surface,
            physical,
            device,
            graphics_queue,
            transfer_queue,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
        })
    }

    fn wait_for_queues(&self) -> RendererResult<()> {
        unsafe {
            self.device.queue_wait_idle(self.graphics_queue)?;
            self.device.queue_wait_idle(self.transfer_queue)?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            // The allocator frees its memory blocks through the device
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some(messenger) = self.debug_messenger.as_mut() {
                messenger.destroy();
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Owns the device, the swapchain, the forward pipeline, the frame ring and
/// the geometry and texture pools.
pub struct RenderDevice {
    config: RendererConfig,
    swapchain: Swapchain,
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    descriptors: DescriptorSets,
    pipeline: ForwardPipeline,
    samplers: [vk::Sampler; 2],
    uniform_layout: UniformLayout,
    uniforms: Vec<UniformSet>,
    sync: FrameSyncObjects,
    transfer_pool: vk::CommandPool,
    ring: FrameRing,
    geometries: SlotPool<GpuGeometry>,
    textures: SlotPool<GpuTexture>,
    linear_blit_supported: bool,
    // Declared last so it drops after the fields above are destroyed
    ctx: GpuContext,
}

impl RenderDevice {
    /// Bring up the device and every fixed GPU object for `window`.
    ///
    /// `width` and `height` are the window's client size in pixels.
    pub fn new(
        window: &(impl HasDisplayHandle + HasWindowHandle),
        width: u32,
        height: u32,
        config: RendererConfig,
    ) -> RendererResult<Self> {
        let vertex_shader = ShaderBinary::read(&config.vertex_shader_path)?;
        let fragment_shader = ShaderBinary::read(&config.fragment_shader_path)?;

        let ctx = GpuContext::new(window, &config)?;
        let device = &ctx.device;
        let allocator: &Mutex<Allocator> = &ctx.allocator;

        let swapchain = Swapchain::new(
            &ctx.instance,
            device,
            allocator,
            &ctx.physical,
            &ctx.surface_loader,
            ctx.surface,
            SwapchainRequest {
                width,
                height,
                present_mode: config.present_mode,
                image_count: config.swapchain_image_count,
            },
        )?;
        let image_count = swapchain.image_count();

        let render_pass =
            create_render_pass(device, swapchain.surface_format.format, swapchain.depth.format)?;
        let framebuffers = create_framebuffers(
            device,
            render_pass,
            &swapchain.image_views,
            swapchain.depth.view,
            swapchain.extent,
        )?;

        let descriptors = DescriptorSets::new(device, image_count as u32)?;
        let pipeline = ForwardPipeline::new(
            device,
            render_pass,
            descriptors.layout,
            swapchain.extent,
            &vertex_shader,
            &fragment_shader,
        )?;
        let samplers = create_samplers(device, &ctx.physical)?;

        let uniform_layout = UniformLayout::new(ctx.physical.min_uniform_buffer_offset_alignment());
        let uniforms = (0..image_count)
            .map(|_| UniformSet::new(device, allocator, &uniform_layout))
            .collect::<RendererResult<Vec<_>>>()?;

        let sync = FrameSyncObjects::new(
            device,
            ctx.physical.queue_families.graphics,
            MAX_FRAMES_IN_FLIGHT,
            image_count,
        )?;
        let transfer_pool = create_transient_pool(device, ctx.physical.queue_families.transfer)?;

        let format_properties = unsafe {
            ctx.instance
                .get_physical_device_format_properties(ctx.physical.physical_device, TEXTURE_FORMAT)
        };
        let linear_blit_supported = supports_linear_blit(&format_properties);

        log::info!(
            "Render device ready: {} swapchain images, {} frames in flight, uniform strides {}/{}",
            image_count,
            MAX_FRAMES_IN_FLIGHT,
            uniform_layout.per_object.stride,
            uniform_layout.per_render_pass.stride
        );

        let render_device = Self {
            config,
            swapchain,
            render_pass,
            framebuffers,
            descriptors,
            pipeline,
            samplers,
            uniform_layout,
            uniforms,
            sync,
            transfer_pool,
            ring: FrameRing::new(MAX_FRAMES_IN_FLIGHT, image_count),
            geometries: SlotPool::new("geometry", MAX_LOADED_GEOMETRY_COUNT),
            textures: SlotPool::new("texture", MAX_LOADED_TEXTURE_COUNT),
            linear_blit_supported,
            ctx,
        };
        render_device.write_descriptor_sets();

        Ok(render_device)
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    pub fn is_recording(&self) -> bool {
        self.ring.is_recording()
    }

    pub fn loaded_geometry_count(&self) -> usize {
        self.geometries.len()
    }

    pub fn loaded_texture_count(&self) -> usize {
        self.textures.len()
    }

    // ---- frame API ----

    /// Wait for this ring slot, acquire an image and start the render pass.
    pub fn begin_frame(&mut self, light: &DirectionalLight) -> RendererResult<()> {
        let begin = self.ring.begin()?;
        let device = &self.ctx.device;

        let fence = self.sync.in_flight_fences[begin.slot];
        if let Err(e) =
            unsafe { device.wait_for_fences(&[fence], true, MAX_SYNCHRONIZATION_TIMEOUT) }
        {
            self.ring.abandon();
            return Err(e.into());
        }

        let acquired = match begin.held_image {
            Some(index) => Ok((index, false)),
            None => unsafe {
                self.swapchain.loader.acquire_next_image(
                    self.swapchain.swapchain,
                    MAX_SYNCHRONIZATION_TIMEOUT,
                    self.sync.image_available[begin.slot],
                    vk::Fence::null(),
                )
            },
        };
        let image_index = match acquired {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    log::warn!("Swapchain no longer matches the surface; resizing is not supported");
                }
                index
            }
            Err(e) => {
                self.ring.abandon();
                return Err(RendererError::AcquireFailed(e));
            }
        };

        let result = self
            .ring
            .acquired(image_index)
            .and_then(|owner| self.start_recording(begin.slot, image_index, owner, light));
        if result.is_err() {
            self.ring.abandon();
        }
        result
    }

    fn start_recording(
        &mut self,
        slot: usize,
        image_index: u32,
        image_owner: Option<usize>,
        light: &DirectionalLight,
    ) -> RendererResult<()> {
        let device = &self.ctx.device;

        if let Some(owner) = image_owner {
            let fence = self.sync.in_flight_fences[owner];
            unsafe { device.wait_for_fences(&[fence], true, MAX_SYNCHRONIZATION_TIMEOUT) }?;
            self.ring.retire(owner);
        }

        let cmd = self.sync.command_buffers[slot];
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.begin_command_buffer(cmd, &begin_info) }?;

        let clear = clear_values(self.config.clear_color.to_array());
        let render_pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(self.framebuffers[image_index as usize])
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.swapchain.extent,
            })
            .clear_values(&clear);

        unsafe {
            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);
        }

        self.uniforms[image_index as usize].write_per_frame(&PerFrameUniforms::from_light(light))
    }

    /// Set the camera for the draws that follow.
    ///
    /// `rotation` is in degrees.
    pub fn begin_render_pass(
        &mut self,
        position: Vec3,
        rotation: Vec3,
        settings: &CameraSettings,
    ) -> RendererResult<()> {
        let pass = self.ring.begin_render_pass()?;
        let image_index = self
            .ring
            .active()
            .map(|frame| frame.image_index)
            .ok_or(RendererError::FrameNotStarted)?;

        let extent = self.swapchain.extent;
        let record = PerRenderPassUniforms::new(
            view_matrix(position, rotation),
            settings.projection_matrix(extent.width as f32, extent.height as f32),
            position,
        );

        self.uniforms[image_index as usize].write_per_render_pass(&self.uniform_layout, pass, &record)
    }

    /// Record one indexed draw per item under the current render pass.
    ///
    /// Every geometry handle is checked before anything is written, so a bad
    /// batch leaves the frame untouched.
    pub fn submit(&mut self, items: &[DrawItem]) -> RendererResult<()> {
        let frame = *self.ring.active().ok_or(RendererError::FrameNotStarted)?;
        let pass = frame
            .current_pass()
            .ok_or(RendererError::RenderPassNotStarted)?;

        let draws = items
            .iter()
            .map(|item| {
                if item.texture.index() as usize >= MAX_LOADED_TEXTURE_COUNT {
                    return Err(RendererError::InvalidHandle {
                        pool: self.textures.name(),
                        index: item.texture.index(),
                    });
                }
                let geometry = self.geometries.try_get(item.geometry)?;
                Ok((
                    geometry.vertex_buffer.buffer,
                    geometry.index_buffer.buffer,
                    geometry.index_count,
                ))
            })
            .collect::<RendererResult<Vec<_>>>()?;

        let count = u32::try_from(items.len()).map_err(|_| RendererError::DrawItemLimitExceeded {
            limit: MAX_DRAW_ITEMS_PER_FRAME,
        })?;
        let slots = self.ring.reserve_draws(count)?;

        let image = frame.image_index as usize;
        for (slot, item) in slots.clone().zip(items) {
            self.uniforms[image].write_per_object(
                &self.uniform_layout,
                slot,
                &PerObjectUniforms::from_draw_item(item),
            )?;
        }

        let device = &self.ctx.device;
        let cmd = self.sync.command_buffers[frame.slot];
        let set = self.descriptors.sets[image];
        for (slot, (vertex_buffer, index_buffer, index_count)) in slots.zip(draws) {
            let offsets = dynamic_offsets(&self.uniform_layout, slot, pass);
            unsafe {
                device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    self.pipeline.layout,
                    0,
                    &[set],
                    &offsets,
                );
                device.cmd_bind_vertex_buffers(cmd, 0, &[vertex_buffer], &[0]);
                device.cmd_bind_index_buffer(cmd, index_buffer, 0, vk::IndexType::UINT32);
                device.cmd_draw_indexed(cmd, index_count, 1, 0, 0, 0);
            }
        }

        Ok(())
    }

    /// Batch `renderables` (hidden dropped, blended last) and submit them.
    pub fn submit_renderables<'a, I>(&mut self, renderables: I) -> RendererResult<()>
    where
        I: IntoIterator<Item = &'a Renderable>,
    {
        let items = build_draw_items(renderables);
        self.submit(&items)
    }

    /// Close the frame, submit it and present.
    ///
    /// A failed submit abandons the frame and keeps its image for the next
    /// attempt. Once submitted, the ring advances even if presenting fails.
    pub fn end_frame(&mut self) -> RendererResult<()> {
        let frame = *self.ring.active().ok_or(RendererError::FrameNotStarted)?;
        let device = &self.ctx.device;
        let cmd = self.sync.command_buffers[frame.slot];

        let recorded = unsafe {
            device.cmd_end_render_pass(cmd);
            device.end_command_buffer(cmd)
        };
        if let Err(e) = recorded {
            self.ring.abandon();
            return Err(e.into());
        }

        let fence = self.sync.in_flight_fences[frame.slot];
        let wait_semaphores = [self.sync.image_available[frame.slot]];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.sync.render_finished[frame.image_index as usize]];
        let command_buffers = [cmd];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe { device.reset_fences(&[fence]) }.map_err(|e| {
            self.ring.abandon();
            RendererError::SubmitFailed(e)
        })?;
        if let Err(e) =
            unsafe { device.queue_submit(self.ctx.graphics_queue, &[submit_info], fence) }
        {
            self.ring.abandon();
            if let Err(fence_error) = self.sync.replace_fence(device, frame.slot) {
                log::error!("Failed to replace frame fence: {}", fence_error);
            }
            return Err(RendererError::SubmitFailed(e));
        }
        self.ring.end()?;

        let swapchains = [self.swapchain.swapchain];
        let image_indices = [frame.image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe {
            self.swapchain
                .loader
                .queue_present(self.ctx.graphics_queue, &present_info)
        } {
            Ok(false) => Ok(()),
            Ok(true) => Err(RendererError::PresentFailed(vk::Result::SUBOPTIMAL_KHR)),
            Err(e) => Err(RendererError::PresentFailed(e)),
        }
    }

    // ---- resources ----

    /// Rewrite every descriptor set with the currently loaded textures.
    ///
    /// Call after a load phase. Waits for the GPU to go idle first.
    pub fn refresh_descriptor_sets(&mut self) -> RendererResult<()> {
        self.ensure_between_frames()?;
        self.wait_for_idle()?;
        self.write_descriptor_sets();
        Ok(())
    }

    fn write_descriptor_sets(&self) {
        let mut views = [None; MAX_LOADED_TEXTURE_COUNT];
        for (view, texture) in views.iter_mut().zip(self.textures.slots()) {
            *view = texture.map(|texture| texture.view);
        }

        self.descriptors.refresh(
            &self.ctx.device,
            &self.uniforms,
            &self.uniform_layout,
            &self.samplers,
            &views,
        );
    }

    /// Upload vertex and index data into a new geometry slot.
    pub fn load_geometry(&mut self, mesh: &MeshData) -> RendererResult<GeometryHandle> {
        self.ensure_between_frames()?;
        self.geometries.ensure_available()?;

        let transfer = UploadQueue {
            queue: self.ctx.transfer_queue,
            command_pool: self.transfer_pool,
        };
        let shared_families = self.ctx.physical.queue_families.graphics_and_transfer();
        let geometry = upload_geometry(
            &self.ctx.device,
            &self.ctx.allocator,
            transfer,
            &shared_families,
            mesh,
        )?;

        let handle = self.geometries.acquire(geometry)?;
        log::debug!(
            "Loaded geometry {} ({} vertices, {} indices)",
            handle.index(),
            mesh.vertices.len(),
            mesh.indices.len()
        );
        Ok(handle)
    }

    pub fn load_plane(&mut self, width: f32) -> RendererResult<GeometryHandle> {
        self.load_geometry(&MeshData::plane(width))
    }

    pub fn load_cube(&mut self, width: f32) -> RendererResult<GeometryHandle> {
        self.load_geometry(&MeshData::cube(width))
    }

    pub fn load_sphere(
        &mut self,
        radius: f32,
        sectors: u32,
        stacks: u32,
    ) -> RendererResult<GeometryHandle> {
        self.load_geometry(&MeshData::sphere(radius, sectors, stacks))
    }

    pub fn load_cylinder(
        &mut self,
        base_radius: f32,
        top_radius: f32,
        height: f32,
        sectors: u32,
        stacks: u32,
    ) -> RendererResult<GeometryHandle> {
        self.load_geometry(&MeshData::cylinder(
            base_radius,
            top_radius,
            height,
            sectors,
            stacks,
        ))
    }

    pub fn load_cone(
        &mut self,
        base_radius: f32,
        height: f32,
        sectors: u32,
        stacks: u32,
    ) -> RendererResult<GeometryHandle> {
        self.load_geometry(&MeshData::cone(base_radius, height, sectors, stacks))
    }

    /// Decode an image file and upload it.
    pub fn load_texture(
        &mut self,
        path: impl AsRef<Path>,
        generate_mipmaps: bool,
    ) -> RendererResult<TextureHandle> {
        let texture = TextureData::from_file(path)?;
        self.load_texture_data(&texture, generate_mipmaps)
    }

    /// Upload RGBA8 pixels into a new texture slot.
    ///
    /// The texture is not visible to shaders until
    /// [`refresh_descriptor_sets`](Self::refresh_descriptor_sets) runs.
    pub fn load_texture_data(
        &mut self,
        texture: &TextureData,
        generate_mipmaps: bool,
    ) -> RendererResult<TextureHandle> {
        self.ensure_between_frames()?;
        self.textures.ensure_available()?;

        let graphics = UploadQueue {
            queue: self.ctx.graphics_queue,
            command_pool: self.sync.command_pool,
        };
        let gpu_texture = upload_texture(
            &self.ctx.device,
            &self.ctx.allocator,
            graphics,
            texture,
            generate_mipmaps,
            self.linear_blit_supported,
        )?;

        let handle = self.textures.acquire(gpu_texture)?;
        log::debug!(
            "Loaded texture '{}' into slot {} ({}x{})",
            texture.name,
            handle.index(),
            texture.width,
            texture.height
        );
        Ok(handle)
    }

    /// Wait for the queues, free the geometry and recycle its slot.
    pub fn destroy_geometry(&mut self, handle: GeometryHandle) -> RendererResult<()> {
        self.ensure_between_frames()?;
        self.geometries.try_get(handle)?;
        self.ctx.wait_for_queues()?;
        self.ring.retire_all();

        let mut geometry = self.geometries.release(handle)?;
        unsafe { geometry.destroy(&self.ctx.device, &self.ctx.allocator) };
        log::debug!("Destroyed geometry {}", handle.index());
        Ok(())
    }

    /// Wait for the queues, free the texture and recycle its slot.
    ///
    /// Descriptor sets keep the stale view until the next refresh.
    pub fn destroy_texture(&mut self, handle: TextureHandle) -> RendererResult<()> {
        self.ensure_between_frames()?;
        self.textures.try_get(handle)?;
        self.ctx.wait_for_queues()?;
        self.ring.retire_all();

        let mut texture = self.textures.release(handle)?;
        unsafe { texture.destroy(&self.ctx.device, &self.ctx.allocator) };
        log::debug!("Destroyed texture {}", handle.index());
        Ok(())
    }

    /// Block until the graphics and transfer queues are idle.
    pub fn wait_for_idle(&mut self) -> RendererResult<()> {
        self.ctx.wait_for_queues()?;
        self.ring.retire_all();
        Ok(())
    }

    fn ensure_between_frames(&self) -> RendererResult<()> {
        if self.ring.is_recording() {
            return Err(RendererError::FrameAlreadyStarted);
        }
        Ok(())
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        let device = &self.ctx.device;
        let allocator: &Mutex<Allocator> = &self.ctx.allocator;

        unsafe {
            if let Err(e) = device.device_wait_idle() {
                log::error!("Failed to wait for device idle during shutdown: {:?}", e);
            }

            for mut texture in self.textures.drain() {
                texture.destroy(device, allocator);
            }
            for mut geometry in self.geometries.drain() {
                geometry.destroy(device, allocator);
            }

            device.destroy_command_pool(self.transfer_pool, None);
            self.sync.destroy(device);
            for uniforms in &mut self.uniforms {
                uniforms.destroy(device, allocator);
            }
            for &sampler in &self.samplers {
                device.destroy_sampler(sampler, None);
            }
            self.pipeline.destroy(device);
            self.descriptors.destroy(device);
            for &framebuffer in &self.framebuffers {
                device.destroy_framebuffer(framebuffer, None);
            }
            device.destroy_render_pass(self.render_pass, None);
            self.swapchain.destroy(device, allocator);
        }

        log::info!("Render device shut down");
    }
}
