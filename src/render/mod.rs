pub mod common;
pub mod native;

pub use common::{CameraParams, LightParams};
pub use native::Renderer;
