//! CPU-side texture data

use std::path::Path;

use image::{DynamicImage, GenericImageView};

use crate::error::{RendererError, RendererResult};

/// Decoded RGBA8 pixels, uploaded as an sRGB texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA8, `width * height * 4` bytes.
    pub data: Vec<u8>,
    pub name: String,
}

impl TextureData {
    /// Load and decode an image file, forcing four channels.
    pub fn from_file<P: AsRef<Path>>(path: P) -> RendererResult<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let img = image::open(path).map_err(|e| RendererError::TextureLoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_image(img, &name))
    }

    /// Decode an encoded image held in memory.
    pub fn from_bytes(bytes: &[u8], name: &str) -> RendererResult<Self> {
        let img =
            image::load_from_memory(bytes).map_err(|e| RendererError::TextureLoadFailed {
                path: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self::from_image(img, name))
    }

    fn from_image(img: DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.to_rgba8().into_raw(),
            name: name.to_string(),
        }
    }

    /// Single-texel texture.
    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self {
            width: 1,
            height: 1,
            data: color.to_vec(),
            name: name.to_string(),
        }
    }

    pub fn white() -> Self {
        Self::solid_color([255, 255, 255, 255], "white")
    }

    /// Square checkerboard with 8x8 texel cells.
    pub fn checkerboard(size: u32, color1: [u8; 4], color2: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity(size as usize * size as usize * 4);

        for y in 0..size {
            for x in 0..size {
                let is_even = ((x / 8) + (y / 8)) % 2 == 0;
                let color = if is_even { color1 } else { color2 };
                data.extend_from_slice(&color);
            }
        }

        Self {
            width: size,
            height: size,
            data,
            name: "checkerboard".to_string(),
        }
    }

    pub fn size_in_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    /// Bytes a `width` x `height` RGBA8 image must hold.
    pub fn expected_size_in_bytes(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * 4
    }

    /// Reject empty extents and pixel buffers that do not match them.
    pub fn validate(&self) -> RendererResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RendererError::TextureCreationFailed(format!(
                "Texture '{}' has zero size",
                self.name
            )));
        }
        if self.size_in_bytes() != self.expected_size_in_bytes() {
            return Err(RendererError::TextureCreationFailed(format!(
                "Texture '{}' is {}x{} but holds {} bytes, expected {}",
                self.name,
                self.width,
                self.height,
                self.size_in_bytes(),
                self.expected_size_in_bytes()
            )));
        }
        Ok(())
    }

    /// Number of mip levels to allocate for this image.
    pub fn mip_level_count(&self, generate_mipmaps: bool) -> u32 {
        mip_level_count(self.width, self.height, generate_mipmaps)
    }
}

/// `floor(log2(max(width, height))) + 1` when generating mipmaps, else 1.
pub fn mip_level_count(width: u32, height: u32, generate_mipmaps: bool) -> u32 {
    if !generate_mipmaps {
        return 1;
    }
    let largest = width.max(height).max(1);
    largest.ilog2() + 1
}
