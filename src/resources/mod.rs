//! CPU-side geometry and image data
//!
//! Meshes and textures are built or decoded here, then handed to the render
//! device for upload.

mod mesh;
mod texture;

pub use mesh::*;
pub use texture::*;
