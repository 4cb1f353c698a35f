//! Scene-side values handed to the renderer each frame.

mod camera;
mod light;
mod transform;

pub use camera::*;
pub use light::*;
pub use transform::*;
