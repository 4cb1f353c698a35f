//! Fixed resource capacities.
//!
//! These are compile-time limits known at content-authoring time; exceeding any
//! of them is reported as an error rather than resized at runtime.

/// Depth of the frame ring.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// Per-object uniform slots available in one frame.
pub const MAX_DRAW_ITEMS_PER_FRAME: u32 = 64;

/// Render passes (main scene, HUD) that may begin in one frame.
pub const MAX_RENDER_PASS_COUNT: u32 = 2;

/// Geometry pool capacity.
pub const MAX_LOADED_GEOMETRY_COUNT: usize = 1024;

/// Texture pool capacity, also the length of the bindless texture array.
pub const MAX_LOADED_TEXTURE_COUNT: usize = 32;

/// Number of immutable samplers bound at the sampler array binding.
pub const SAMPLER_COUNT: usize = 2;

/// Dynamic offsets passed with every descriptor set bind.
pub const DYNAMIC_OFFSET_COUNT: usize = 2;

/// Fence and acquire timeout in nanoseconds.
pub const MAX_SYNCHRONIZATION_TIMEOUT: u64 = u64::MAX;

/// Swapchain images requested before clamping to surface limits.
pub const DEFAULT_SWAPCHAIN_IMAGE_COUNT: u32 = 3;
