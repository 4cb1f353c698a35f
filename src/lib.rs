//! lilium-frame - GPU resource and frame-synchronization engine for a Vulkan
//! forward renderer.
//!
//! A single [`RenderDevice`] owns the Vulkan device, a fixed forward pipeline,
//! a three-deep frame ring and bounded pools of geometry and textures.
//!
//! # Features
//! - Frames in flight with per-image ownership tracking
//! - Dynamic-offset uniform addressing for up to 64 draws and 2 passes per frame
//! - Bindless-style texture array with partially bound slots
//! - Synchronous staging uploads with optional mip chain generation
//! - Plane, cube, sphere, cylinder and cone generators
//!
//! # Example
//!
//! ```no_run
//! use lilium_frame::{
//!     CameraSettings, DirectionalLight, DrawItem, RenderDevice, RendererConfig, TextureData,
//! };
//! # fn run(window: &winit::window::Window) -> lilium_frame::RendererResult<()> {
//! let mut device = RenderDevice::new(window, 1280, 720, RendererConfig::default())?;
//! let cube = device.load_cube(1.0)?;
//! let texture = device.load_texture_data(&TextureData::white(), false)?;
//! device.refresh_descriptor_sets()?;
//!
//! device.begin_frame(&DirectionalLight::default())?;
//! device.begin_render_pass(
//!     glam::Vec3::new(0.0, 0.0, -5.0),
//!     glam::Vec3::ZERO,
//!     &CameraSettings::default(),
//! )?;
//! device.submit(&[DrawItem {
//!     geometry: cube,
//!     texture,
//!     ..Default::default()
//! }])?;
//! device.end_frame()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod draw;
pub mod error;
pub mod limits;
pub mod pool;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod vulkan;

pub use config::{PresentMode, RendererConfig, ValidationLevel};
pub use draw::{
    build_draw_items, DrawItem, GeometryHandle, Material, Renderable, SamplerKind, TextureHandle,
};
pub use error::{RendererError, RendererResult};
pub use pool::{Handle, SlotPool};
pub use renderer::RenderDevice;
pub use resources::{MeshData, TextureData, Vertex};
pub use scene::{CameraSettings, DirectionalLight, ProjectionMode, Transform};
