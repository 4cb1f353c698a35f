//! Renderer configuration.

use std::path::PathBuf;

use glam::Vec4;

use crate::limits::DEFAULT_SWAPCHAIN_IMAGE_COUNT;

/// Swapchain presentation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentMode {
    /// Vsync, always supported.
    Fifo,
    /// Uncapped without tearing. Falls back to FIFO when unsupported.
    #[default]
    Mailbox,
    /// Uncapped, may tear. Falls back to FIFO when unsupported.
    Immediate,
}

/// Least severe validation message forwarded to `log`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ValidationLevel {
    Verbose,
    Info,
    #[default]
    Warning,
    Error,
}

/// Settings fixed at [`RenderDevice`](crate::RenderDevice) creation.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub application_name: String,
    pub present_mode: PresentMode,
    /// Swapchain images to request before clamping to the surface limits.
    pub swapchain_image_count: u32,
    /// Compiled SPIR-V vertex shader.
    pub vertex_shader_path: PathBuf,
    /// Compiled SPIR-V fragment shader.
    pub fragment_shader_path: PathBuf,
    /// Color the frame is cleared to before the first draw.
    pub clear_color: Vec4,
    /// Enable the Khronos validation layer when it is installed.
    pub validation: bool,
    /// Messages below this severity are filtered out by the messenger.
    pub validation_level: ValidationLevel,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "lilium-frame".to_string(),
            present_mode: PresentMode::Mailbox,
            swapchain_image_count: DEFAULT_SWAPCHAIN_IMAGE_COUNT,
            vertex_shader_path: PathBuf::from("shaders/vertex.spv"),
            fragment_shader_path: PathBuf::from("shaders/fragment.spv"),
            clear_color: Vec4::new(1.0, 0.0, 1.0, 1.0),
            validation: cfg!(debug_assertions),
            validation_level: ValidationLevel::Warning,
        }
    }
}

impl RendererConfig {
    pub fn with_present_mode(mut self, present_mode: PresentMode) -> Self {
        self.present_mode = present_mode;
        self
    }

    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_validation_level(mut self, level: ValidationLevel) -> Self {
        self.validation_level = level;
        self
    }

    pub fn with_shaders(
        mut self,
        vertex: impl Into<PathBuf>,
        fragment: impl Into<PathBuf>,
    ) -> Self {
        self.vertex_shader_path = vertex.into();
        self.fragment_shader_path = fragment.into();
        self
    }

    pub fn with_clear_color(mut self, clear_color: Vec4) -> Self {
        self.clear_color = clear_color;
        self
    }
}
