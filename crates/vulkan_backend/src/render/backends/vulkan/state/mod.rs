//! Vulkan state management
//!
//! Synchronization primitives, cached render state objects and the swapchain
//! with its frame targets.

pub mod render_state;
pub mod swapchain;
pub mod sync;

pub use render_state::*;
pub use swapchain::*;
pub use sync::*;
