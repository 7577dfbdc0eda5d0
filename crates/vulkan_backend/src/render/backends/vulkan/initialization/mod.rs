// Vulkan initialization components

pub mod ash_device;
pub mod context;
pub mod device_context;
#[cfg(feature = "window")]
pub mod window;

pub use ash_device::*;
pub use context::*;
pub use device_context::*;
#[cfg(feature = "window")]
pub use window::*;
