//! Frame ring bookkeeping and the synchronization objects behind it.
//!
//! ```text
//!   ring slot:   0        1        2        0        1   ...
//!   frame:       0        1        2        3        4
//!                |                          ^
//!                +--- fence wait -----------+  (frame k waits on frame k - R)
//!
//!   slot state:  Idle -> Acquiring -> Recording -> Submitted -> (fence) -> Idle
//! ```
//!
//! Each ring slot owns a command buffer, an "image available" semaphore and an
//! in-flight fence. Swapchain images may outnumber ring slots, so each image
//! also remembers which slot last rendered to it; acquiring an image that is
//! still owned by another slot waits on that slot's fence first.
//!
//! A frame abandoned after its acquire keeps the acquired image. The slot's
//! "image available" semaphore still carries that acquire's signal, so the
//! next frame on the slot renders to the held image instead of acquiring
//! again.
//!
//! [`FrameRing`] holds only the bookkeeping and is free of Vulkan calls so the
//! ordering rules can be tested without a device. [`FrameSyncObjects`] owns the
//! Vulkan objects the ring indexes into.

use std::ops::Range;

use ash::vk;

use crate::error::{RendererError, RendererResult};
use crate::limits::{DYNAMIC_OFFSET_COUNT, MAX_DRAW_ITEMS_PER_FRAME, MAX_RENDER_PASS_COUNT};

use super::uniforms::UniformLayout;

/// Lifecycle of one ring slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    #[default]
    Idle,
    /// Fence waited, swapchain image not yet acquired.
    Acquiring,
    Recording,
    /// Handed to the queue. Returns to idle once its fence is waited on.
    Submitted,
}

/// What `begin` asks the caller to wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBegin {
    pub slot: usize,
    /// Frame number previously submitted from this slot, if any.
    pub previous_frame: Option<u64>,
    /// Image acquired by an abandoned frame on this slot. Skip the acquire
    /// and render to it.
    pub held_image: Option<u32>,
}

/// The frame currently being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveFrame {
    pub number: u64,
    pub slot: usize,
    pub image_index: u32,
    pub draw_count: u32,
    pub pass_count: u32,
}

impl ActiveFrame {
    /// Render pass slot used by draws recorded now.
    pub fn current_pass(&self) -> Option<u32> {
        self.pass_count.checked_sub(1)
    }
}

/// Ring index, per-slot state and per-image ownership.
#[derive(Debug, Clone)]
pub struct FrameRing {
    current: usize,
    next_frame: u64,
    states: Vec<FrameState>,
    submitted_frames: Vec<Option<u64>>,
    images_in_flight: Vec<Option<usize>>,
    /// Image acquired this frame and its owner before the acquire.
    acquired_image: Option<(u32, Option<usize>)>,
    held_image: Option<u32>,
    active: Option<ActiveFrame>,
}

impl FrameRing {
    pub fn new(depth: usize, image_count: usize) -> Self {
        Self {
            current: 0,
            next_frame: 0,
            states: vec![FrameState::Idle; depth],
            submitted_frames: vec![None; depth],
            images_in_flight: vec![None; image_count],
            acquired_image: None,
            held_image: None,
            active: None,
        }
    }

    pub fn depth(&self) -> usize {
        self.states.len()
    }

    pub fn current_slot(&self) -> usize {
        self.current
    }

    pub fn state(&self, slot: usize) -> FrameState {
        self.states[slot]
    }

    pub fn active(&self) -> Option<&ActiveFrame> {
        self.active.as_ref()
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Start a frame on the current slot.
    ///
    /// The caller waits on the returned slot's fence before acquiring.
    pub fn begin(&mut self) -> RendererResult<FrameBegin> {
        if self.active.is_some() || self.states[self.current] == FrameState::Acquiring {
            return Err(RendererError::FrameAlreadyStarted);
        }

        let slot = self.current;
        self.states[slot] = FrameState::Acquiring;
        Ok(FrameBegin {
            slot,
            previous_frame: self.submitted_frames[slot],
            held_image: self.held_image,
        })
    }

    /// Record that `image_index` was acquired for the current slot.
    ///
    /// Returns the slot whose fence must be waited on before rendering to the
    /// image, if another slot still owns it.
    pub fn acquired(&mut self, image_index: u32) -> RendererResult<Option<usize>> {
        let slot = self.current;
        if self.states[slot] != FrameState::Acquiring {
            return Err(RendererError::FrameNotStarted);
        }

        let previous = self.images_in_flight[image_index as usize];
        let owner = previous.filter(|&owner| owner != slot);
        self.images_in_flight[image_index as usize] = Some(slot);
        self.acquired_image = Some((image_index, previous));
        self.held_image = None;
        self.states[slot] = FrameState::Recording;
        self.active = Some(ActiveFrame {
            number: self.next_frame,
            slot,
            image_index,
            draw_count: 0,
            pass_count: 0,
        });

        Ok(owner)
    }

    /// Drop the frame on the current slot without submitting it.
    ///
    /// The slot's fence is still signaled. An image already acquired goes
    /// back to its previous owner and is held for the next frame on this slot.
    pub fn abandon(&mut self) {
        if let Some((image_index, previous)) = self.acquired_image.take() {
            self.images_in_flight[image_index as usize] = previous;
            self.held_image = Some(image_index);
        }
        self.states[self.current] = FrameState::Idle;
        self.active = None;
    }

    pub fn held_image(&self) -> Option<u32> {
        self.held_image
    }

    /// Claim the next render pass slot.
    pub fn begin_render_pass(&mut self) -> RendererResult<u32> {
        let frame = self.active.as_mut().ok_or(RendererError::FrameNotStarted)?;
        if frame.pass_count >= MAX_RENDER_PASS_COUNT {
            return Err(RendererError::RenderPassLimitExceeded {
                limit: MAX_RENDER_PASS_COUNT,
            });
        }

        let pass = frame.pass_count;
        frame.pass_count += 1;
        Ok(pass)
    }

    /// Claim `count` consecutive per-object slots.
    ///
    /// Slots continue from previous claims in the same frame. Nothing is
    /// claimed if the frame limit would be exceeded.
    pub fn reserve_draws(&mut self, count: u32) -> RendererResult<Range<u32>> {
        let frame = self.active.as_mut().ok_or(RendererError::FrameNotStarted)?;
        if frame.current_pass().is_none() {
            return Err(RendererError::RenderPassNotStarted);
        }

        let start = frame.draw_count;
        let end = start
            .checked_add(count)
            .filter(|&end| end <= MAX_DRAW_ITEMS_PER_FRAME)
            .ok_or(RendererError::DrawItemLimitExceeded {
                limit: MAX_DRAW_ITEMS_PER_FRAME,
            })?;

        frame.draw_count = end;
        Ok(start..end)
    }

    /// Finish recording. Returns the submitted frame and advances the ring.
    pub fn end(&mut self) -> RendererResult<ActiveFrame> {
        let frame = self.active.take().ok_or(RendererError::FrameNotStarted)?;

        self.acquired_image = None;
        self.states[frame.slot] = FrameState::Submitted;
        self.submitted_frames[frame.slot] = Some(frame.number);
        self.next_frame += 1;
        self.current = (self.current + 1) % self.depth();

        Ok(frame)
    }

    /// Mark a slot's work as retired after its fence was waited on.
    pub fn retire(&mut self, slot: usize) {
        if self.states[slot] == FrameState::Submitted {
            self.states[slot] = FrameState::Idle;
        }
    }

    /// Mark every slot retired, after a device-wide idle wait.
    pub fn retire_all(&mut self) {
        for slot in 0..self.depth() {
            self.retire(slot);
        }
    }
}

/// Offsets for binding 0 (per-object) and binding 2 (per-render-pass).
pub fn dynamic_offsets(
    layout: &UniformLayout,
    draw_slot: u32,
    pass_slot: u32,
) -> [u32; DYNAMIC_OFFSET_COUNT] {
    [
        layout.per_object.offset(draw_slot) as u32,
        layout.per_render_pass.offset(pass_slot) as u32,
    ]
}

/// Command buffers, fences and semaphores driven by [`FrameRing`].
pub struct FrameSyncObjects {
    pub command_pool: vk::CommandPool,
    /// One per ring slot.
    pub command_buffers: Vec<vk::CommandBuffer>,
    /// One per ring slot, created signaled.
    pub in_flight_fences: Vec<vk::Fence>,
    /// One per ring slot.
    pub image_available: Vec<vk::Semaphore>,
    /// One per swapchain image.
    pub render_finished: Vec<vk::Semaphore>,
}

impl FrameSyncObjects {
    pub fn new(
        device: &ash::Device,
        graphics_family: u32,
        depth: usize,
        image_count: usize,
    ) -> RendererResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(graphics_family);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None) }.map_err(|e| {
            RendererError::InitializationFailed(format!(
                "Failed to create graphics command pool: {:?}",
                e
            ))
        })?;

        let mut objects = Self {
            command_pool,
            command_buffers: Vec::new(),
            in_flight_fences: Vec::with_capacity(depth),
            image_available: Vec::with_capacity(depth),
            render_finished: Vec::with_capacity(image_count),
        };

        if let Err(e) = objects.create_objects(device, depth, image_count) {
            unsafe { objects.destroy(device) };
            return Err(e);
        }

        Ok(objects)
    }

    fn create_objects(
        &mut self,
        device: &ash::Device,
        depth: usize,
        image_count: usize,
    ) -> RendererResult<()> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(depth as u32);
        self.command_buffers = unsafe { device.allocate_command_buffers(&alloc_info) }.map_err(|e| {
            RendererError::InitializationFailed(format!(
                "Failed to allocate frame command buffers: {:?}",
                e
            ))
        })?;

        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let sync_error = |e: vk::Result| {
            RendererError::InitializationFailed(format!(
                "Failed to create frame synchronization objects: {:?}",
                e
            ))
        };

        for _ in 0..depth {
            self.in_flight_fences
                .push(unsafe { device.create_fence(&fence_info, None) }.map_err(sync_error)?);
            self.image_available
                .push(unsafe { device.create_semaphore(&semaphore_info, None) }.map_err(sync_error)?);
        }
        for _ in 0..image_count {
            self.render_finished
                .push(unsafe { device.create_semaphore(&semaphore_info, None) }.map_err(sync_error)?);
        }

        Ok(())
    }

    /// Swap the slot's fence for a fresh signaled one.
    ///
    /// Used when a submit failed after the fence was reset, since nothing
    /// would ever signal it.
    pub fn replace_fence(&mut self, device: &ash::Device, slot: usize) -> RendererResult<()> {
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
        let fence = unsafe { device.create_fence(&fence_info, None) }?;
        let old = std::mem::replace(&mut self.in_flight_fences[slot], fence);
        unsafe { device.destroy_fence(old, None) };
        Ok(())
    }

    /// Destroying the pool frees its command buffers.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        for semaphore in self.render_finished.drain(..) {
            device.destroy_semaphore(semaphore, None);
        }
        for semaphore in self.image_available.drain(..) {
            device.destroy_semaphore(semaphore, None);
        }
        for fence in self.in_flight_fences.drain(..) {
            device.destroy_fence(fence, None);
        }
        self.command_buffers.clear();
        device.destroy_command_pool(self.command_pool, None);
        self.command_pool = vk::CommandPool::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::MAX_FRAMES_IN_FLIGHT;

    /// Run one frame acquiring `image`, with one pass and `draws` draws.
    fn run_frame(ring: &mut FrameRing, image: u32, draws: u32) -> (FrameBegin, Option<usize>) {
        let begin = ring.begin().unwrap();
        let owner = ring.acquired(image).unwrap();
        ring.begin_render_pass().unwrap();
        if draws > 0 {
            ring.reserve_draws(draws).unwrap();
        }
        ring.end().unwrap();
        (begin, owner)
    }

    #[test]
    fn test_frame_waits_on_frame_ring_depth_earlier() {
        let depth = MAX_FRAMES_IN_FLIGHT;
        let mut ring = FrameRing::new(depth, 3);

        for k in 0..20u64 {
            let (begin, _) = run_frame(&mut ring, (k % 3) as u32, 1);
            assert_eq!(begin.slot, (k as usize) % depth);
            let expected = k.checked_sub(depth as u64);
            assert_eq!(begin.previous_frame, expected, "frame {}", k);
        }
    }

    #[test]
    fn test_image_owned_by_other_slot_is_waited_on() {
        // Four images, three slots, images handed back out of order.
        let mut ring = FrameRing::new(3, 4);

        let (_, owner) = run_frame(&mut ring, 0, 0);
        assert_eq!(owner, None);
        let (_, owner) = run_frame(&mut ring, 1, 0);
        assert_eq!(owner, None);
        // Slot 2 acquires image 0, last rendered by slot 0.
        let (begin, owner) = run_frame(&mut ring, 0, 0);
        assert_eq!(begin.slot, 2);
        assert_eq!(owner, Some(0));
        // Slot 0 acquires image 1, last rendered by slot 1.
        let (begin, owner) = run_frame(&mut ring, 1, 0);
        assert_eq!(begin.slot, 0);
        assert_eq!(owner, Some(1));
    }

    #[test]
    fn test_image_owned_by_same_slot_needs_no_extra_wait() {
        let mut ring = FrameRing::new(3, 3);
        for image in 0..3 {
            run_frame(&mut ring, image, 0);
        }
        let (begin, owner) = run_frame(&mut ring, 0, 0);
        assert_eq!(begin.slot, 0);
        assert_eq!(owner, None);
    }

    #[test]
    fn test_slot_states() {
        let mut ring = FrameRing::new(3, 3);
        assert_eq!(ring.state(0), FrameState::Idle);

        ring.begin().unwrap();
        assert_eq!(ring.state(0), FrameState::Acquiring);
        ring.acquired(2).unwrap();
        assert_eq!(ring.state(0), FrameState::Recording);
        assert_eq!(ring.active().map(|f| f.image_index), Some(2));
        ring.end().unwrap();
        assert_eq!(ring.state(0), FrameState::Submitted);
        assert_eq!(ring.current_slot(), 1);

        ring.retire_all();
        assert_eq!(ring.state(0), FrameState::Idle);
    }

    #[test]
    fn test_draw_slots_accumulate_across_submits() {
        let layout = UniformLayout::new(256);
        let mut ring = FrameRing::new(3, 3);
        ring.begin().unwrap();
        ring.acquired(0).unwrap();
        ring.begin_render_pass().unwrap();

        let mut slots = Vec::new();
        for batch in [3, 1, 4, 1, 5] {
            slots.extend(ring.reserve_draws(batch).unwrap());
        }
        assert_eq!(slots, (0..14).collect::<Vec<_>>());

        for slot in slots {
            let [object, _] = dynamic_offsets(&layout, slot, 0);
            assert_eq!(object as u64, slot as u64 * layout.per_object.stride);
        }
    }

    #[test]
    fn test_counters_reset_after_end() {
        let mut ring = FrameRing::new(3, 3);
        run_frame(&mut ring, 0, 40);

        ring.begin().unwrap();
        ring.acquired(1).unwrap();
        assert_eq!(ring.begin_render_pass().unwrap(), 0);
        assert_eq!(ring.reserve_draws(64).unwrap(), 0..64);
    }

    #[test]
    fn test_draw_limit() {
        let mut ring = FrameRing::new(3, 3);
        ring.begin().unwrap();
        ring.acquired(0).unwrap();
        ring.begin_render_pass().unwrap();
        ring.reserve_draws(60).unwrap();

        let err = ring.reserve_draws(5).unwrap_err();
        assert!(matches!(err, RendererError::DrawItemLimitExceeded { limit: 64 }));
        // The failed claim took nothing.
        assert_eq!(ring.reserve_draws(4).unwrap(), 60..64);
        assert!(ring.reserve_draws(1).is_err());
    }

    #[test]
    fn test_render_pass_limit() {
        let mut ring = FrameRing::new(3, 3);
        ring.begin().unwrap();
        ring.acquired(0).unwrap();
        assert_eq!(ring.begin_render_pass().unwrap(), 0);
        assert_eq!(ring.begin_render_pass().unwrap(), 1);
        assert!(matches!(
            ring.begin_render_pass(),
            Err(RendererError::RenderPassLimitExceeded { limit: 2 })
        ));

        let layout = UniformLayout::new(64);
        let pass = ring.active().and_then(|f| f.current_pass()).unwrap();
        let [_, pass_offset] = dynamic_offsets(&layout, 0, pass);
        assert_eq!(pass_offset as u64, layout.per_render_pass.stride);
    }

    #[test]
    fn test_misuse_outside_frame() {
        let mut ring = FrameRing::new(3, 3);
        assert!(matches!(ring.begin_render_pass(), Err(RendererError::FrameNotStarted)));
        assert!(matches!(ring.reserve_draws(1), Err(RendererError::FrameNotStarted)));
        assert!(matches!(ring.end(), Err(RendererError::FrameNotStarted)));
        assert!(matches!(ring.acquired(0), Err(RendererError::FrameNotStarted)));

        ring.begin().unwrap();
        assert!(matches!(ring.begin(), Err(RendererError::FrameAlreadyStarted)));
        ring.acquired(0).unwrap();
        assert!(matches!(ring.reserve_draws(1), Err(RendererError::RenderPassNotStarted)));
        assert!(matches!(ring.begin(), Err(RendererError::FrameAlreadyStarted)));
    }

    #[test]
    fn test_abandoned_frame_keeps_slot() {
        let mut ring = FrameRing::new(3, 3);
        ring.begin().unwrap();
        ring.abandon();
        assert_eq!(ring.current_slot(), 0);
        assert_eq!(ring.state(0), FrameState::Idle);
        assert!(!ring.is_recording());

        let begin = ring.begin().unwrap();
        assert_eq!(begin.slot, 0);
        assert_eq!(begin.previous_frame, None);
        assert_eq!(begin.held_image, None);
    }

    #[test]
    fn test_abandon_after_acquire_holds_image() {
        let mut ring = FrameRing::new(3, 4);
        run_frame(&mut ring, 2, 0);

        // Slot 1 acquires image 2 (owned by slot 0), then fails before submit.
        let begin = ring.begin().unwrap();
        assert_eq!(begin.slot, 1);
        assert_eq!(ring.acquired(2).unwrap(), Some(0));
        ring.begin_render_pass().unwrap();
        ring.reserve_draws(3).unwrap();
        ring.abandon();
        assert_eq!(ring.held_image(), Some(2));
        assert_eq!(ring.current_slot(), 1);

        // The retry reuses the held image and still sees slot 0 as its owner.
        let begin = ring.begin().unwrap();
        assert_eq!(begin.slot, 1);
        assert_eq!(begin.held_image, Some(2));
        assert_eq!(ring.acquired(2).unwrap(), Some(0));
        assert_eq!(ring.held_image(), None);
        ring.begin_render_pass().unwrap();
        assert_eq!(ring.reserve_draws(1).unwrap(), 0..1);
        ring.end().unwrap();

        let begin = ring.begin().unwrap();
        assert_eq!(begin.slot, 2);
        assert_eq!(begin.held_image, None);
    }

    #[test]
    fn test_abandon_before_acquire_holds_nothing() {
        let mut ring = FrameRing::new(3, 3);
        run_frame(&mut ring, 0, 0);
        ring.begin().unwrap();
        ring.abandon();
        assert_eq!(ring.held_image(), None);

        // The next frame on slot 1 acquiring image 0 still waits on slot 0.
        ring.begin().unwrap();
        assert_eq!(ring.acquired(0).unwrap(), Some(0));
    }
}
