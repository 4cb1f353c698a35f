//! Vulkan layer of the render device.
//!
//! Bootstrap (`instance`, `debug`, `device`, `swapchain`), the fixed forward
//! pipeline (`render_pass`, `pipeline`, `descriptors`, `uniforms`), per-frame
//! synchronization (`frame`) and load-time transfers (`buffer`, `layout`,
//! `upload`). [`crate::RenderDevice`] ties them together.

pub mod buffer;
pub mod debug;
pub mod descriptors;
pub mod device;
pub mod frame;
pub mod instance;
pub mod layout;
pub mod pipeline;
pub mod render_pass;
pub mod swapchain;
pub mod uniforms;
pub mod upload;
