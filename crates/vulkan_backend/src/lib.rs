//! # Vulkan Backend
//!
//! Vulkan rendering backend: device connection, swapchain and presentation loop,
//! per-image frame synchronization, GPU buffer and image lifetime, cached render
//! state, reflection-driven uniform packing and per-renderable pipeline caching.
//!
//! ## Architecture
//!
//! - `foundation`: logging setup
//! - `config`: configuration files and renderer settings
//! - `render`: API-agnostic render state, mesh, material and asset types
//! - `render::backends::vulkan`: the Vulkan implementation, built on top of the
//!   [`GpuDevice`](render::backends::vulkan::GpuDevice) seam so that the whole
//!   frame loop also runs against the [`HeadlessDevice`](render::backends::vulkan::HeadlessDevice)
//!
//! ## Frame loop
//!
//! ```no_run
//! # use vulkan_backend::prelude::*;
//! # fn frame(renderer: &mut VulkanRenderer, mesh: &mut Renderable,
//! #          program: &mut ShaderProgram, material: &Material) -> VulkanResult<()> {
//! if renderer.begin_frame()? {
//!     renderer.draw(mesh, program, material, &NoGlobals)?;
//!     renderer.end_frame()?;
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]

pub mod config;
pub mod foundation;
pub mod render;

/// Common imports for typical usage
pub mod prelude {
    pub use crate::config::{Config, ConfigError, RendererConfig};
    pub use crate::foundation::logging;
    pub use crate::render::backends::vulkan::{
        DeviceContext, DeviceRef, FrameStats, GpuBuffer, GpuDevice, HeadlessDevice, RenderTarget,
        Renderable, ShaderProgram, Swapchain, Texture, VulkanError, VulkanRenderer,
        VulkanResult,
    };
    pub use crate::render::material::{GlobalUniforms, Material, NoGlobals, UniformValue};
    pub use crate::render::mesh::{Topology, VertexElement, VertexFormat, VertexSemantic};
    pub use crate::render::state::{
        BlendDesc, DepthStencilDesc, MultisampleDesc, RasterizerDesc, SamplerDesc,
    };
}
