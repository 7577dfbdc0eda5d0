//! GPU device seam
//!
//! Every backend component talks to the GPU through [`GpuDevice`] instead of
//! holding an `ash::Device` directly. Two implementations exist:
//!
//! - [`AshDevice`](super::AshDevice): the real Vulkan device, created from a
//!   window surface
//! - [`HeadlessDevice`](super::HeadlessDevice): hands out fake handles and
//!   records every call, used to run the frame loop without a GPU
//!
//! Create infos that carry raw pointers (swapchain, render pass, pipeline,
//! submit, descriptor writes) are replaced by the plain descriptions below; the
//! ash implementation assembles the native structures from them.

use super::VulkanResult;
use ash::vk;
use std::sync::Arc;

/// Shared handle to the device every component is built against
pub type DeviceRef = Arc<dyn GpuDevice>;

/// Queues and queue families selected at device creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSetup {
    /// Queue used for rendering and uploads
    pub graphics_queue: vk::Queue,
    /// Queue used for presentation
    pub present_queue: vk::Queue,
    /// Graphics queue family index
    pub graphics_family: u32,
    /// Present queue family index
    pub present_family: u32,
}

impl QueueSetup {
    /// Whether graphics and presentation use the same queue family
    pub const fn shares_family(&self) -> bool {
        self.graphics_family == self.present_family
    }
}

/// Surface capabilities reported by the platform window
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    /// Extent limits and transforms
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported formats, in driver order
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// Parameters of a swapchain
#[derive(Debug, Clone)]
pub struct SwapchainDesc {
    /// Color format and color space
    pub surface_format: vk::SurfaceFormatKHR,
    /// Presentation mode
    pub present_mode: vk::PresentModeKHR,
    /// Image size
    pub extent: vk::Extent2D,
    /// Requested image count
    pub min_image_count: u32,
    /// Surface transform
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    /// Exclusive or concurrent image ownership
    pub sharing_mode: vk::SharingMode,
    /// Queue families sharing the images (concurrent mode only)
    pub queue_family_indices: Vec<u32>,
}

/// Single-subpass render pass with one color and an optional depth attachment
#[derive(Debug, Clone, Copy)]
pub struct RenderPassDesc {
    /// Color attachment format
    pub color_format: vk::Format,
    /// Depth attachment format
    pub depth_format: Option<vk::Format>,
    /// Layout the color attachment ends in
    pub color_final_layout: vk::ImageLayout,
}

/// One descriptor update
#[derive(Debug, Clone, Copy)]
pub enum DescriptorWrite {
    /// Uniform buffer range starting at offset 0
    UniformBuffer {
        /// Binding slot
        binding: u32,
        /// Buffer
        buffer: vk::Buffer,
        /// Bytes visible to the shader
        range: vk::DeviceSize,
    },
    /// Sampled image with its sampler
    CombinedImageSampler {
        /// Binding slot
        binding: u32,
        /// Image view, in `SHADER_READ_ONLY_OPTIMAL`
        view: vk::ImageView,
        /// Sampler
        sampler: vk::Sampler,
    },
}

/// Shader module bound to a pipeline stage, entry point `main`
#[derive(Debug, Clone, Copy)]
pub struct PipelineStage {
    /// Stage
    pub stage: vk::ShaderStageFlags,
    /// Module
    pub module: vk::ShaderModule,
}

/// Everything needed to build a graphics pipeline with dynamic viewport and scissor
#[derive(Debug, Clone, Copy)]
pub struct GraphicsPipelineDesc<'a> {
    /// Shader stages
    pub stages: &'a [PipelineStage],
    /// Vertex buffer bindings
    pub vertex_bindings: &'a [vk::VertexInputBindingDescription],
    /// Vertex attributes
    pub vertex_attributes: &'a [vk::VertexInputAttributeDescription],
    /// Primitive topology
    pub topology: vk::PrimitiveTopology,
    /// Rasterizer state
    pub rasterization: &'a vk::PipelineRasterizationStateCreateInfo,
    /// Depth-stencil state
    pub depth_stencil: &'a vk::PipelineDepthStencilStateCreateInfo,
    /// Multisample state
    pub multisample: &'a vk::PipelineMultisampleStateCreateInfo,
    /// Blend state of the color attachment
    pub color_blend: &'a vk::PipelineColorBlendAttachmentState,
    /// Constant blend color
    pub blend_constants: [f32; 4],
    /// Pipeline layout
    pub layout: vk::PipelineLayout,
    /// Render pass the pipeline is compatible with
    pub render_pass: vk::RenderPass,
    /// Subpass index
    pub subpass: u32,
}

/// One queue submission of a single command buffer
#[derive(Debug, Clone, Copy)]
pub struct SubmitDesc {
    /// Command buffer
    pub command_buffer: vk::CommandBuffer,
    /// Semaphore waited on, with the stage that waits
    pub wait: Option<(vk::Semaphore, vk::PipelineStageFlags)>,
    /// Semaphore signalled on completion
    pub signal: Option<vk::Semaphore>,
    /// Fence signalled on completion, may be null
    pub fence: vk::Fence,
}

/// Image layout transition
#[derive(Debug, Clone, Copy)]
pub struct ImageBarrier {
    /// Image
    pub image: vk::Image,
    /// Aspect
    pub aspect: vk::ImageAspectFlags,
    /// Mip levels covered, starting at 0
    pub mip_levels: u32,
    /// Previous layout
    pub old_layout: vk::ImageLayout,
    /// New layout
    pub new_layout: vk::ImageLayout,
    /// Accesses made available
    pub src_access: vk::AccessFlags,
    /// Accesses made visible
    pub dst_access: vk::AccessFlags,
    /// Producing stage
    pub src_stage: vk::PipelineStageFlags,
    /// Consuming stage
    pub dst_stage: vk::PipelineStageFlags,
}

/// A command recorded into a command buffer
#[derive(Debug, Clone, Copy)]
pub enum Command {
    /// Begin a render pass, clearing color and depth
    BeginRenderPass {
        /// Render pass
        render_pass: vk::RenderPass,
        /// Framebuffer
        framebuffer: vk::Framebuffer,
        /// Render area
        extent: vk::Extent2D,
        /// Color clear value
        clear_color: [f32; 4],
        /// Depth clear value
        clear_depth: f32,
    },
    /// End the current render pass
    EndRenderPass,
    /// Bind a graphics pipeline
    BindPipeline(vk::Pipeline),
    /// Bind descriptor set 0
    BindDescriptorSet {
        /// Layout the set is compatible with
        layout: vk::PipelineLayout,
        /// Set
        set: vk::DescriptorSet,
    },
    /// Set viewport 0
    SetViewport(vk::Viewport),
    /// Set scissor 0
    SetScissor(vk::Rect2D),
    /// Bind vertex buffer 0 at offset 0
    BindVertexBuffer(vk::Buffer),
    /// Bind the index buffer at offset 0
    BindIndexBuffer {
        /// Buffer
        buffer: vk::Buffer,
        /// Index width
        index_type: vk::IndexType,
    },
    /// Non-indexed draw, one instance
    Draw {
        /// Vertices
        vertex_count: u32,
        /// First vertex
        first_vertex: u32,
    },
    /// Indexed draw, one instance
    DrawIndexed {
        /// Indices
        index_count: u32,
        /// First index
        first_index: u32,
        /// Added to every index
        vertex_offset: i32,
    },
    /// Layout transition
    PipelineBarrier(ImageBarrier),
    /// Copy a tightly packed buffer into mip 0 of an image
    CopyBufferToImage {
        /// Source buffer
        buffer: vk::Buffer,
        /// Destination image, in `TRANSFER_DST_OPTIMAL`
        image: vk::Image,
        /// Copied extent
        extent: vk::Extent3D,
    },
}

/// Result of acquiring a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is available
    Acquired {
        /// Image index
        index: u32,
        /// The swapchain no longer matches the surface exactly
        suboptimal: bool,
    },
    /// The swapchain must be rebuilt before it can be used
    OutOfDate,
}

/// Result of presenting a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Presented
    Presented,
    /// Presented, but the swapchain should be rebuilt
    Suboptimal,
    /// Not presented, the swapchain must be rebuilt
    OutOfDate,
}

impl PresentOutcome {
    /// Whether the swapchain must be rebuilt
    pub const fn needs_rebuild(self) -> bool {
        !matches!(self, Self::Presented)
    }
}

/// Operations the backend needs from a Vulkan device
pub trait GpuDevice: Send + Sync {
    /// Queues chosen at device creation
    fn queue_setup(&self) -> QueueSetup;

    /// Memory heaps and types of the physical device
    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties;

    /// Current surface capabilities
    fn surface_support(&self) -> VulkanResult<SurfaceSupport>;

    /// Block until the device has finished all submitted work
    fn wait_idle(&self) -> VulkanResult<()>;

    // Buffers and memory

    /// Create a buffer
    fn create_buffer(&self, info: &vk::BufferCreateInfo) -> VulkanResult<vk::Buffer>;
    /// Destroy a buffer
    fn destroy_buffer(&self, buffer: vk::Buffer);
    /// Memory requirements of a buffer
    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements;
    /// Allocate device memory
    fn allocate_memory(&self, size: vk::DeviceSize, memory_type_index: u32) -> VulkanResult<vk::DeviceMemory>;
    /// Free device memory
    fn free_memory(&self, memory: vk::DeviceMemory);
    /// Bind memory to a buffer at offset 0
    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory) -> VulkanResult<()>;
    /// Map host-visible memory, copy `bytes` at `offset`, unmap
    fn write_memory(&self, memory: vk::DeviceMemory, offset: vk::DeviceSize, bytes: &[u8]) -> VulkanResult<()>;

    // Images

    /// Create an image
    fn create_image(&self, info: &vk::ImageCreateInfo) -> VulkanResult<vk::Image>;
    /// Destroy an image
    fn destroy_image(&self, image: vk::Image);
    /// Memory requirements of an image
    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements;
    /// Bind memory to an image at offset 0
    fn bind_image_memory(&self, image: vk::Image, memory: vk::DeviceMemory) -> VulkanResult<()>;
    /// Create an image view
    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VulkanResult<vk::ImageView>;
    /// Destroy an image view
    fn destroy_image_view(&self, view: vk::ImageView);
    /// Create a sampler
    fn create_sampler(&self, info: &vk::SamplerCreateInfo) -> VulkanResult<vk::Sampler>;
    /// Destroy a sampler
    fn destroy_sampler(&self, sampler: vk::Sampler);

    // Render passes

    /// Create a render pass
    fn create_render_pass(&self, desc: &RenderPassDesc) -> VulkanResult<vk::RenderPass>;
    /// Destroy a render pass
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    /// Create a framebuffer
    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<vk::Framebuffer>;
    /// Destroy a framebuffer
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    // Shaders, descriptors and pipelines

    /// Create a shader module
    fn create_shader_module(&self, spirv: &[u32]) -> VulkanResult<vk::ShaderModule>;
    /// Destroy a shader module
    fn destroy_shader_module(&self, module: vk::ShaderModule);
    /// Create a descriptor set layout
    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> VulkanResult<vk::DescriptorSetLayout>;
    /// Destroy a descriptor set layout
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    /// Create a pipeline layout
    fn create_pipeline_layout(&self, set_layouts: &[vk::DescriptorSetLayout]) -> VulkanResult<vk::PipelineLayout>;
    /// Destroy a pipeline layout
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    /// Create a descriptor pool
    fn create_descriptor_pool(&self, max_sets: u32, sizes: &[vk::DescriptorPoolSize]) -> VulkanResult<vk::DescriptorPool>;
    /// Destroy a descriptor pool and every set allocated from it
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    /// Allocate one descriptor set
    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VulkanResult<vk::DescriptorSet>;
    /// Write descriptors into a set
    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]);
    /// Create a graphics pipeline
    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> VulkanResult<vk::Pipeline>;
    /// Destroy a pipeline
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    // Synchronization

    /// Create a fence
    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence>;
    /// Destroy a fence
    fn destroy_fence(&self, fence: vk::Fence);
    /// Wait until a fence is signalled
    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VulkanResult<()>;
    /// Reset a fence to unsignalled
    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()>;
    /// Create a binary semaphore
    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore>;
    /// Destroy a semaphore
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    // Commands

    /// Create a command pool whose buffers can be reset individually
    fn create_command_pool(&self, queue_family: u32) -> VulkanResult<vk::CommandPool>;
    /// Destroy a command pool
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    /// Allocate primary command buffers
    fn allocate_command_buffers(&self, pool: vk::CommandPool, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>>;
    /// Free command buffers
    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);
    /// Reset and begin recording
    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer, one_time: bool) -> VulkanResult<()>;
    /// Finish recording
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()>;
    /// Record a command
    fn record(&self, command_buffer: vk::CommandBuffer, command: Command);
    /// Submit one command buffer
    fn queue_submit(&self, queue: vk::Queue, submit: &SubmitDesc) -> VulkanResult<()>;
    /// Block until a queue is idle
    fn queue_wait_idle(&self, queue: vk::Queue) -> VulkanResult<()>;

    // Presentation

    /// Create a swapchain for the device surface
    fn create_swapchain(&self, desc: &SwapchainDesc) -> VulkanResult<vk::SwapchainKHR>;
    /// Destroy a swapchain
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    /// Presentable images of a swapchain
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VulkanResult<Vec<vk::Image>>;
    /// Acquire the next presentable image, signalling `semaphore`
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VulkanResult<AcquireOutcome>;
    /// Present an image after `wait` is signalled
    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VulkanResult<PresentOutcome>;
}
