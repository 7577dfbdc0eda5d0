//! Vulkan backend implementation
//!
//! Organized into initialization, resources, state and rendering modules. Every
//! component reaches the GPU through the [`GpuDevice`] seam, implemented by
//! [`AshDevice`] for real hardware and [`HeadlessDevice`] for tests.

/// Device seam and descriptor types
pub mod device;

/// Call-recording device without a GPU
pub mod headless;

/// Vulkan initialization types (instance, device, window)
pub mod initialization;

/// Vulkan resource management (buffers, images, textures)
pub mod resources;

/// Vulkan state management (sync, render state, swapchain)
pub mod state;

/// Shaders, reflection, pipelines and renderables
pub mod rendering;

/// Frame loop driver
pub mod renderer;

#[cfg(test)]
mod frame_loop_tests;

pub use renderer::{FrameStats, VulkanRenderer};

pub use device::{
    AcquireOutcome, Command, DescriptorWrite, DeviceRef, GpuDevice, GraphicsPipelineDesc, ImageBarrier,
    PipelineStage, PresentOutcome, QueueSetup, RenderPassDesc, SubmitDesc, SurfaceSupport, SwapchainDesc,
};
pub use headless::{DeviceEvent, HeadlessConfig, HeadlessDevice, ObjectKind};

pub use initialization::ash_device::AshDevice;
pub use initialization::context::{PhysicalDeviceInfo, SurfaceProvider, VulkanError, VulkanResult};
pub use initialization::device_context::{CommandPool, DeviceContext};
#[cfg(feature = "window")]
pub use initialization::window::Window;

pub use resources::buffer::{BufferKind, GpuBuffer};
pub use resources::image::{GpuImage, RenderTarget};
pub use resources::texture::{Texture, TextureCache};

pub use state::render_state::{
    BlendState, Cached, DepthStencilState, MultisampleState, RasterizerState, RenderStates, SamplerState,
};
pub use state::swapchain::{RenderPassId, Swapchain};
pub use state::sync::{Fence, FramePhase, FrameState, Semaphore};

pub use rendering::pipeline::{PipelineCache, PipelineKey};
pub use rendering::reflection::{ReflectedBlock, ReflectedInput, ReflectedMember, ReflectedSampler, StageReflection};
pub use rendering::renderable::Renderable;
pub use rendering::shader::{create_shader_program, CompiledStage, FrameContext, ShaderProgram, UniformType};
