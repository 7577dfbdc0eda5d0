//! Rendering
//!
//! API-agnostic engine types (render state descriptors, mesh layout, materials,
//! image data, shader sources) and the Vulkan backend that consumes them.

pub mod backends;
pub mod image_data;
pub mod material;
pub mod mesh;
pub mod shader_source;
pub mod state;
