//! Vulkan resource management
//!
//! GPU buffers, images with their render targets, and sampled textures.

pub mod buffer;
pub mod image;
pub mod texture;

pub use buffer::*;
pub use image::*;
pub use texture::*;
