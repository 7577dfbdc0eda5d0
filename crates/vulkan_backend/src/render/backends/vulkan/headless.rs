//! Headless device
//!
//! A [`GpuDevice`] that performs no GPU work. It hands out unique fake handles,
//! tracks which objects are alive, keeps the contents of every memory
//! allocation, and records an ordered log of the calls the backend makes. The
//! GPU is treated as finishing every submission instantly: a submitted fence is
//! signalled right away.
//!
//! Used to drive swapchains, buffers, programs and whole frames in tests and
//! tools that have no Vulkan driver.

use super::device::{
    AcquireOutcome, Command, DescriptorWrite, GpuDevice, GraphicsPipelineDesc, PresentOutcome, QueueSetup,
    RenderPassDesc, SubmitDesc, SurfaceSupport, SwapchainDesc,
};
use super::{VulkanError, VulkanResult};
use ash::vk::{self, Handle};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Kind of native object tracked by the headless device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// `vk::Buffer`
    Buffer,
    /// `vk::DeviceMemory`
    Memory,
    /// `vk::Image` created by the application
    Image,
    /// `vk::ImageView`
    ImageView,
    /// `vk::Sampler`
    Sampler,
    /// `vk::RenderPass`
    RenderPass,
    /// `vk::Framebuffer`
    Framebuffer,
    /// `vk::ShaderModule`
    ShaderModule,
    /// `vk::DescriptorSetLayout`
    DescriptorSetLayout,
    /// `vk::PipelineLayout`
    PipelineLayout,
    /// `vk::DescriptorPool`
    DescriptorPool,
    /// `vk::DescriptorSet`
    DescriptorSet,
    /// `vk::Pipeline`
    Pipeline,
    /// `vk::Fence`
    Fence,
    /// `vk::Semaphore`
    Semaphore,
    /// `vk::CommandPool`
    CommandPool,
    /// `vk::CommandBuffer`
    CommandBuffer,
    /// `vk::SwapchainKHR`
    Swapchain,
}

/// One call observed by the headless device, in call order
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// An object was created
    Created(ObjectKind, u64),
    /// An object was destroyed or freed
    Destroyed(ObjectKind, u64),
    /// `device_wait_idle`
    DeviceWaitIdle,
    /// Fence wait
    WaitFence(vk::Fence),
    /// Fence reset
    ResetFence(vk::Fence),
    /// Command buffer reset and begun
    BeginCommandBuffer(vk::CommandBuffer),
    /// Command buffer ended
    EndCommandBuffer(vk::CommandBuffer),
    /// Command recorded
    Record(vk::CommandBuffer, Command),
    /// Queue submission
    Submit(vk::Queue, SubmitDesc),
    /// Queue drained
    QueueWaitIdle(vk::Queue),
    /// Host write into device memory
    WriteMemory {
        /// Memory
        memory: vk::DeviceMemory,
        /// Byte offset
        offset: u64,
        /// Byte count
        len: usize,
    },
    /// Descriptor set update
    UpdateDescriptorSet(vk::DescriptorSet, Vec<DescriptorWrite>),
    /// Swapchain created with this description
    CreateSwapchain(SwapchainDesc),
    /// Image acquisition
    Acquire {
        /// Semaphore signalled by the acquire
        semaphore: vk::Semaphore,
        /// Result
        outcome: AcquireOutcome,
    },
    /// Presentation
    Present {
        /// Image index
        image_index: u32,
        /// Semaphore waited on
        wait: vk::Semaphore,
        /// Result
        outcome: PresentOutcome,
    },
}

/// Binding of a descriptor set layout as seen by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutBinding {
    /// Binding slot
    pub binding: u32,
    /// Descriptor type
    pub descriptor_type: vk::DescriptorType,
    /// Descriptor count
    pub count: u32,
    /// Stages that read the binding
    pub stage_flags: vk::ShaderStageFlags,
}

/// Graphics pipeline parameters recorded at creation
#[derive(Debug, Clone)]
pub struct PipelineRecord {
    /// Render pass
    pub render_pass: vk::RenderPass,
    /// Pipeline layout
    pub layout: vk::PipelineLayout,
    /// Primitive topology
    pub topology: vk::PrimitiveTopology,
    /// Vertex bindings
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    /// Vertex attributes
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    /// Cull mode
    pub cull_mode: vk::CullModeFlags,
    /// Whether blending was enabled on the color attachment
    pub blend_enable: bool,
    /// Rasterization samples
    pub samples: vk::SampleCountFlags,
    /// Number of shader stages
    pub stage_count: usize,
}

/// Surface and queue setup the headless device reports
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    /// Surface current extent; `None` leaves the extent to the application
    pub surface_extent: Option<(u32, u32)>,
    /// Smallest surface extent
    pub min_extent: (u32, u32),
    /// Largest surface extent
    pub max_extent: (u32, u32),
    /// Minimum swapchain image count
    pub min_image_count: u32,
    /// Reported surface formats
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Use a present queue family distinct from the graphics family
    pub separate_present_family: bool,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            surface_extent: Some((800, 600)),
            min_extent: (1, 1),
            max_extent: (16384, 16384),
            min_image_count: 2,
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            separate_present_family: false,
        }
    }
}

impl HeadlessConfig {
    /// Report `width`×`height` as the surface extent
    pub const fn with_extent(mut self, width: u32, height: u32) -> Self {
        self.surface_extent = Some((width, height));
        self
    }

    /// Report the given minimum image count
    pub const fn with_min_image_count(mut self, count: u32) -> Self {
        self.min_image_count = count;
        self
    }

    /// Report distinct graphics and present queue families
    pub const fn with_separate_present_family(mut self) -> Self {
        self.separate_present_family = true;
        self
    }

    /// Report the given surface formats
    pub fn with_formats(mut self, formats: Vec<vk::SurfaceFormatKHR>) -> Self {
        self.formats = formats;
        self
    }
}

#[derive(Default)]
struct Failures {
    acquire_out_of_date: u32,
    acquire_suboptimal: u32,
    present_suboptimal: u32,
    present_out_of_date: u32,
    pipeline: u32,
    allocation: u32,
}

struct SwapchainRecord {
    images: Vec<vk::Image>,
    next_image: u32,
}

struct DescriptorPoolRecord {
    max_sets: u32,
    sets: Vec<u64>,
}

#[derive(Default)]
struct State {
    next_handle: u64,
    live: HashMap<u64, ObjectKind>,
    created: HashMap<ObjectKind, usize>,
    memory: HashMap<u64, Vec<u8>>,
    buffer_sizes: HashMap<u64, u64>,
    buffer_memory: HashMap<u64, u64>,
    image_sizes: HashMap<u64, u64>,
    swapchains: HashMap<u64, SwapchainRecord>,
    descriptor_pools: HashMap<u64, DescriptorPoolRecord>,
    layouts: HashMap<u64, Vec<LayoutBinding>>,
    pipelines: HashMap<u64, PipelineRecord>,
    command_buffers: HashMap<u64, u64>,
    signaled: HashMap<u64, bool>,
    surface_extent: Option<(u32, u32)>,
    failures: Failures,
    events: Vec<DeviceEvent>,
}

impl State {
    fn create(&mut self, kind: ObjectKind) -> u64 {
        self.next_handle += 1;
        let raw = self.next_handle;
        self.live.insert(raw, kind);
        *self.created.entry(kind).or_default() += 1;
        self.events.push(DeviceEvent::Created(kind, raw));
        raw
    }

    fn destroy(&mut self, kind: ObjectKind, raw: u64) {
        if raw == 0 {
            return;
        }
        match self.live.remove(&raw) {
            Some(live_kind) if live_kind == kind => {
                self.events.push(DeviceEvent::Destroyed(kind, raw));
            }
            Some(live_kind) => {
                log::error!("Destroying {:?} {:#x} as {:?}", live_kind, raw, kind);
                self.live.insert(raw, live_kind);
            }
            None => log::error!("Destroying unknown or already destroyed {:?} {:#x}", kind, raw),
        }
    }

    fn is_live(&self, kind: ObjectKind, raw: u64) -> bool {
        self.live.get(&raw) == Some(&kind)
    }
}

const HOST_MEMORY_TYPE: u32 = 1;
const GRAPHICS_FAMILY: u32 = 0;

/// Call-recording device without a GPU
pub struct HeadlessDevice {
    config: HeadlessConfig,
    state: Mutex<State>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(HeadlessConfig::default())
    }
}

impl HeadlessDevice {
    /// Create a device reporting the given surface
    pub fn new(config: HeadlessConfig) -> Self {
        let state = State {
            surface_extent: config.surface_extent,
            ..State::default()
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the extent the surface reports, as a window resize would
    pub fn set_surface_extent(&self, extent: Option<(u32, u32)>) {
        self.state().surface_extent = extent;
    }

    /// Make the next `count` acquires report out-of-date
    pub fn fail_acquire_out_of_date(&self, count: u32) {
        self.state().failures.acquire_out_of_date += count;
    }

    /// Make the next `count` acquires report suboptimal
    pub fn acquire_suboptimal(&self, count: u32) {
        self.state().failures.acquire_suboptimal += count;
    }

    /// Make the next `count` presents report suboptimal
    pub fn present_suboptimal(&self, count: u32) {
        self.state().failures.present_suboptimal += count;
    }

    /// Make the next `count` presents report out-of-date
    pub fn present_out_of_date(&self, count: u32) {
        self.state().failures.present_out_of_date += count;
    }

    /// Make the next `count` graphics pipeline creations fail
    pub fn fail_pipeline_creation(&self, count: u32) {
        self.state().failures.pipeline += count;
    }

    /// Make the next `count` memory allocations fail
    pub fn fail_allocation(&self, count: u32) {
        self.state().failures.allocation += count;
    }

    /// Number of live objects of a kind
    pub fn live_count(&self, kind: ObjectKind) -> usize {
        self.state().live.values().filter(|&&k| k == kind).count()
    }

    /// Number of objects of a kind created so far
    pub fn created_count(&self, kind: ObjectKind) -> usize {
        self.state().created.get(&kind).copied().unwrap_or(0)
    }

    /// Whether a handle is alive
    pub fn is_live<H: Handle>(&self, kind: ObjectKind, handle: H) -> bool {
        self.state().is_live(kind, handle.as_raw())
    }

    /// Copy of the event log
    pub fn events(&self) -> Vec<DeviceEvent> {
        self.state().events.clone()
    }

    /// Drop all recorded events
    pub fn clear_events(&self) {
        self.state().events.clear();
    }

    /// Commands recorded into a command buffer since it was last begun
    pub fn recorded_commands(&self, command_buffer: vk::CommandBuffer) -> Vec<Command> {
        let state = self.state();
        let begin = state
            .events
            .iter()
            .rposition(|event| matches!(event, DeviceEvent::BeginCommandBuffer(cb) if *cb == command_buffer))
            .unwrap_or(0);
        state.events[begin..]
            .iter()
            .filter_map(|event| match event {
                DeviceEvent::Record(cb, command) if *cb == command_buffer => Some(*command),
                _ => None,
            })
            .collect()
    }

    /// Contents of a memory allocation
    pub fn read_memory(&self, memory: vk::DeviceMemory) -> Option<Vec<u8>> {
        self.state().memory.get(&memory.as_raw()).cloned()
    }

    /// Contents of the memory bound to a buffer, limited to the buffer size
    pub fn buffer_contents(&self, buffer: vk::Buffer) -> Option<Vec<u8>> {
        let state = self.state();
        let raw = buffer.as_raw();
        let memory = state.buffer_memory.get(&raw)?;
        let size = *state.buffer_sizes.get(&raw)? as usize;
        state.memory.get(memory).map(|bytes| bytes[..size.min(bytes.len())].to_vec())
    }

    /// Bindings a descriptor set layout was created with
    pub fn layout_bindings(&self, layout: vk::DescriptorSetLayout) -> Option<Vec<LayoutBinding>> {
        self.state().layouts.get(&layout.as_raw()).cloned()
    }

    /// Parameters a pipeline was created with
    pub fn pipeline_record(&self, pipeline: vk::Pipeline) -> Option<PipelineRecord> {
        self.state().pipelines.get(&pipeline.as_raw()).cloned()
    }

    fn take_failure(counter: &mut u32) -> bool {
        if *counter > 0 {
            *counter -= 1;
            true
        } else {
            false
        }
    }
}

impl GpuDevice for HeadlessDevice {
    fn queue_setup(&self) -> QueueSetup {
        let present_family = if self.config.separate_present_family {
            GRAPHICS_FAMILY + 1
        } else {
            GRAPHICS_FAMILY
        };
        QueueSetup {
            graphics_queue: vk::Queue::from_raw(0x1000),
            present_queue: vk::Queue::from_raw(0x1000 + u64::from(present_family)),
            graphics_family: GRAPHICS_FAMILY,
            present_family,
        }
    }

    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            memory_heap_count: 2,
            ..Default::default()
        };
        properties.memory_types[0] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            heap_index: 0,
        };
        properties.memory_types[HOST_MEMORY_TYPE as usize] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            heap_index: 1,
        };
        properties.memory_heaps[0] = vk::MemoryHeap {
            size: 1 << 30,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        properties.memory_heaps[1] = vk::MemoryHeap {
            size: 1 << 30,
            flags: vk::MemoryHeapFlags::empty(),
        };
        properties
    }

    fn surface_support(&self) -> VulkanResult<SurfaceSupport> {
        let extent = self.state().surface_extent;
        let current_extent = extent.map_or(
            vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            |(width, height)| vk::Extent2D { width, height },
        );
        Ok(SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: self.config.min_image_count,
                max_image_count: 0,
                current_extent,
                min_image_extent: vk::Extent2D {
                    width: self.config.min_extent.0,
                    height: self.config.min_extent.1,
                },
                max_image_extent: vk::Extent2D {
                    width: self.config.max_extent.0,
                    height: self.config.max_extent.1,
                },
                max_image_array_layers: 1,
                supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            },
            formats: self.config.formats.clone(),
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        })
    }

    fn wait_idle(&self) -> VulkanResult<()> {
        self.state().events.push(DeviceEvent::DeviceWaitIdle);
        Ok(())
    }

    fn create_buffer(&self, info: &vk::BufferCreateInfo) -> VulkanResult<vk::Buffer> {
        if info.size == 0 {
            return Err(VulkanError::Api(vk::Result::ERROR_VALIDATION_FAILED_EXT));
        }
        let mut state = self.state();
        let raw = state.create(ObjectKind::Buffer);
        state.buffer_sizes.insert(raw, info.size);
        Ok(vk::Buffer::from_raw(raw))
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        let mut state = self.state();
        let raw = buffer.as_raw();
        state.buffer_sizes.remove(&raw);
        state.buffer_memory.remove(&raw);
        state.destroy(ObjectKind::Buffer, raw);
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        let size = self.state().buffer_sizes.get(&buffer.as_raw()).copied().unwrap_or(0);
        vk::MemoryRequirements {
            size: size.next_multiple_of(16),
            alignment: 16,
            memory_type_bits: 0b11,
        }
    }

    fn allocate_memory(&self, size: vk::DeviceSize, memory_type_index: u32) -> VulkanResult<vk::DeviceMemory> {
        let mut state = self.state();
        if Self::take_failure(&mut state.failures.allocation) {
            return Err(VulkanError::Api(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        }
        if memory_type_index > HOST_MEMORY_TYPE {
            return Err(VulkanError::Api(vk::Result::ERROR_VALIDATION_FAILED_EXT));
        }
        let raw = state.create(ObjectKind::Memory);
        state.memory.insert(raw, vec![0; size as usize]);
        Ok(vk::DeviceMemory::from_raw(raw))
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        let mut state = self.state();
        state.memory.remove(&memory.as_raw());
        state.destroy(ObjectKind::Memory, memory.as_raw());
    }

    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory) -> VulkanResult<()> {
        let mut state = self.state();
        if !state.is_live(ObjectKind::Buffer, buffer.as_raw()) || !state.is_live(ObjectKind::Memory, memory.as_raw()) {
            return Err(VulkanError::Api(vk::Result::ERROR_VALIDATION_FAILED_EXT));
        }
        state.buffer_memory.insert(buffer.as_raw(), memory.as_raw());
        Ok(())
    }

    fn write_memory(&self, memory: vk::DeviceMemory, offset: vk::DeviceSize, bytes: &[u8]) -> VulkanResult<()> {
        let mut state = self.state();
        let target = state
            .memory
            .get_mut(&memory.as_raw())
            .ok_or(VulkanError::Api(vk::Result::ERROR_MEMORY_MAP_FAILED))?;
        let start = offset as usize;
        let end = start + bytes.len();
        if end > target.len() {
            return Err(VulkanError::Api(vk::Result::ERROR_MEMORY_MAP_FAILED));
        }
        target[start..end].copy_from_slice(bytes);
        state.events.push(DeviceEvent::WriteMemory {
            memory,
            offset,
            len: bytes.len(),
        });
        Ok(())
    }

    fn create_image(&self, info: &vk::ImageCreateInfo) -> VulkanResult<vk::Image> {
        let mut state = self.state();
        let raw = state.create(ObjectKind::Image);
        let texels = u64::from(info.extent.width) * u64::from(info.extent.height) * u64::from(info.extent.depth.max(1));
        state.image_sizes.insert(raw, texels * 16 * u64::from(info.mip_levels.max(1)));
        Ok(vk::Image::from_raw(raw))
    }

    fn destroy_image(&self, image: vk::Image) {
        let mut state = self.state();
        state.image_sizes.remove(&image.as_raw());
        state.destroy(ObjectKind::Image, image.as_raw());
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        let size = self.state().image_sizes.get(&image.as_raw()).copied().unwrap_or(0);
        vk::MemoryRequirements {
            size,
            alignment: 256,
            memory_type_bits: 0b11,
        }
    }

    fn bind_image_memory(&self, image: vk::Image, memory: vk::DeviceMemory) -> VulkanResult<()> {
        let state = self.state();
        if state.is_live(ObjectKind::Image, image.as_raw()) && state.is_live(ObjectKind::Memory, memory.as_raw()) {
            Ok(())
        } else {
            Err(VulkanError::Api(vk::Result::ERROR_VALIDATION_FAILED_EXT))
        }
    }

    fn create_image_view(&self, _info: &vk::ImageViewCreateInfo) -> VulkanResult<vk::ImageView> {
        Ok(vk::ImageView::from_raw(self.state().create(ObjectKind::ImageView)))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state().destroy(ObjectKind::ImageView, view.as_raw());
    }

    fn create_sampler(&self, _info: &vk::SamplerCreateInfo) -> VulkanResult<vk::Sampler> {
        Ok(vk::Sampler::from_raw(self.state().create(ObjectKind::Sampler)))
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.state().destroy(ObjectKind::Sampler, sampler.as_raw());
    }

    fn create_render_pass(&self, _desc: &RenderPassDesc) -> VulkanResult<vk::RenderPass> {
        Ok(vk::RenderPass::from_raw(self.state().create(ObjectKind::RenderPass)))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state().destroy(ObjectKind::RenderPass, render_pass.as_raw());
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        _extent: vk::Extent2D,
    ) -> VulkanResult<vk::Framebuffer> {
        let mut state = self.state();
        if !state.is_live(ObjectKind::RenderPass, render_pass.as_raw())
            || attachments
                .iter()
                .any(|view| !state.is_live(ObjectKind::ImageView, view.as_raw()))
        {
            return Err(VulkanError::Api(vk::Result::ERROR_VALIDATION_FAILED_EXT));
        }
        Ok(vk::Framebuffer::from_raw(state.create(ObjectKind::Framebuffer)))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state().destroy(ObjectKind::Framebuffer, framebuffer.as_raw());
    }

    fn create_shader_module(&self, spirv: &[u32]) -> VulkanResult<vk::ShaderModule> {
        if spirv.is_empty() {
            return Err(VulkanError::Api(vk::Result::ERROR_INVALID_SHADER_NV));
        }
        Ok(vk::ShaderModule::from_raw(self.state().create(ObjectKind::ShaderModule)))
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.state().destroy(ObjectKind::ShaderModule, module.as_raw());
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> VulkanResult<vk::DescriptorSetLayout> {
        let mut state = self.state();
        let raw = state.create(ObjectKind::DescriptorSetLayout);
        let recorded = bindings
            .iter()
            .map(|b| LayoutBinding {
                binding: b.binding,
                descriptor_type: b.descriptor_type,
                count: b.descriptor_count,
                stage_flags: b.stage_flags,
            })
            .collect();
        state.layouts.insert(raw, recorded);
        Ok(vk::DescriptorSetLayout::from_raw(raw))
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        let mut state = self.state();
        state.layouts.remove(&layout.as_raw());
        state.destroy(ObjectKind::DescriptorSetLayout, layout.as_raw());
    }

    fn create_pipeline_layout(&self, _set_layouts: &[vk::DescriptorSetLayout]) -> VulkanResult<vk::PipelineLayout> {
        Ok(vk::PipelineLayout::from_raw(self.state().create(ObjectKind::PipelineLayout)))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.state().destroy(ObjectKind::PipelineLayout, layout.as_raw());
    }

    fn create_descriptor_pool(&self, max_sets: u32, _sizes: &[vk::DescriptorPoolSize]) -> VulkanResult<vk::DescriptorPool> {
        let mut state = self.state();
        let raw = state.create(ObjectKind::DescriptorPool);
        state.descriptor_pools.insert(
            raw,
            DescriptorPoolRecord {
                max_sets,
                sets: Vec::new(),
            },
        );
        Ok(vk::DescriptorPool::from_raw(raw))
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        let mut state = self.state();
        if let Some(record) = state.descriptor_pools.remove(&pool.as_raw()) {
            for set in record.sets {
                state.destroy(ObjectKind::DescriptorSet, set);
            }
        }
        state.destroy(ObjectKind::DescriptorPool, pool.as_raw());
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VulkanResult<vk::DescriptorSet> {
        let mut state = self.state();
        if !state.is_live(ObjectKind::DescriptorSetLayout, layout.as_raw()) {
            return Err(VulkanError::Api(vk::Result::ERROR_VALIDATION_FAILED_EXT));
        }
        let exhausted = state
            .descriptor_pools
            .get(&pool.as_raw())
            .map_or(true, |record| record.sets.len() >= record.max_sets as usize);
        if exhausted {
            return Err(VulkanError::Api(vk::Result::ERROR_OUT_OF_POOL_MEMORY));
        }
        let raw = state.create(ObjectKind::DescriptorSet);
        if let Some(record) = state.descriptor_pools.get_mut(&pool.as_raw()) {
            record.sets.push(raw);
        }
        Ok(vk::DescriptorSet::from_raw(raw))
    }

    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
        self.state()
            .events
            .push(DeviceEvent::UpdateDescriptorSet(set, writes.to_vec()));
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> VulkanResult<vk::Pipeline> {
        let mut state = self.state();
        if Self::take_failure(&mut state.failures.pipeline) {
            return Err(VulkanError::Api(vk::Result::ERROR_INITIALIZATION_FAILED));
        }
        if !state.is_live(ObjectKind::RenderPass, desc.render_pass.as_raw())
            || !state.is_live(ObjectKind::PipelineLayout, desc.layout.as_raw())
        {
            return Err(VulkanError::Api(vk::Result::ERROR_VALIDATION_FAILED_EXT));
        }
        let raw = state.create(ObjectKind::Pipeline);
        state.pipelines.insert(
            raw,
            PipelineRecord {
                render_pass: desc.render_pass,
                layout: desc.layout,
                topology: desc.topology,
                vertex_bindings: desc.vertex_bindings.to_vec(),
                vertex_attributes: desc.vertex_attributes.to_vec(),
                cull_mode: desc.rasterization.cull_mode,
                blend_enable: desc.color_blend.blend_enable == vk::TRUE,
                samples: desc.multisample.rasterization_samples,
                stage_count: desc.stages.len(),
            },
        );
        Ok(vk::Pipeline::from_raw(raw))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        let mut state = self.state();
        state.pipelines.remove(&pipeline.as_raw());
        state.destroy(ObjectKind::Pipeline, pipeline.as_raw());
    }

    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence> {
        let mut state = self.state();
        let raw = state.create(ObjectKind::Fence);
        state.signaled.insert(raw, signaled);
        Ok(vk::Fence::from_raw(raw))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state();
        state.signaled.remove(&fence.as_raw());
        state.destroy(ObjectKind::Fence, fence.as_raw());
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout: u64) -> VulkanResult<()> {
        let mut state = self.state();
        state.events.push(DeviceEvent::WaitFence(fence));
        match state.signaled.get(&fence.as_raw()) {
            Some(true) => Ok(()),
            // Nothing will ever signal it
            Some(false) => Err(VulkanError::Api(vk::Result::TIMEOUT)),
            None => Err(VulkanError::Api(vk::Result::ERROR_VALIDATION_FAILED_EXT)),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()> {
        let mut state = self.state();
        state.events.push(DeviceEvent::ResetFence(fence));
        match state.signaled.get_mut(&fence.as_raw()) {
            Some(signaled) => {
                *signaled = false;
                Ok(())
            }
            None => Err(VulkanError::Api(vk::Result::ERROR_VALIDATION_FAILED_EXT)),
        }
    }

    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore> {
        Ok(vk::Semaphore::from_raw(self.state().create(ObjectKind::Semaphore)))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state().destroy(ObjectKind::Semaphore, semaphore.as_raw());
    }

    fn create_command_pool(&self, _queue_family: u32) -> VulkanResult<vk::CommandPool> {
        Ok(vk::CommandPool::from_raw(self.state().create(ObjectKind::CommandPool)))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        let mut state = self.state();
        let owned: Vec<u64> = state
            .command_buffers
            .iter()
            .filter(|(_, owner)| **owner == pool.as_raw())
            .map(|(&cb, _)| cb)
            .collect();
        for cb in owned {
            state.command_buffers.remove(&cb);
            state.destroy(ObjectKind::CommandBuffer, cb);
        }
        state.destroy(ObjectKind::CommandPool, pool.as_raw());
    }

    fn allocate_command_buffers(&self, pool: vk::CommandPool, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let mut state = self.state();
        if !state.is_live(ObjectKind::CommandPool, pool.as_raw()) {
            return Err(VulkanError::Api(vk::Result::ERROR_VALIDATION_FAILED_EXT));
        }
        Ok((0..count)
            .map(|_| {
                let raw = state.create(ObjectKind::CommandBuffer);
                state.command_buffers.insert(raw, pool.as_raw());
                vk::CommandBuffer::from_raw(raw)
            })
            .collect())
    }

    fn free_command_buffers(&self, _pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        let mut state = self.state();
        for cb in buffers {
            state.command_buffers.remove(&cb.as_raw());
            state.destroy(ObjectKind::CommandBuffer, cb.as_raw());
        }
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer, _one_time: bool) -> VulkanResult<()> {
        let mut state = self.state();
        if !state.is_live(ObjectKind::CommandBuffer, command_buffer.as_raw()) {
            return Err(VulkanError::Api(vk::Result::ERROR_VALIDATION_FAILED_EXT));
        }
        state.events.push(DeviceEvent::BeginCommandBuffer(command_buffer));
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        self.state().events.push(DeviceEvent::EndCommandBuffer(command_buffer));
        Ok(())
    }

    fn record(&self, command_buffer: vk::CommandBuffer, command: Command) {
        self.state().events.push(DeviceEvent::Record(command_buffer, command));
    }

    fn queue_submit(&self, queue: vk::Queue, submit: &SubmitDesc) -> VulkanResult<()> {
        let mut state = self.state();
        if submit.fence != vk::Fence::null() {
            match state.signaled.get_mut(&submit.fence.as_raw()) {
                // Submitting with a signalled fence is invalid
                Some(signaled) if *signaled => {
                    return Err(VulkanError::Api(vk::Result::ERROR_VALIDATION_FAILED_EXT));
                }
                Some(signaled) => *signaled = true,
                None => return Err(VulkanError::Api(vk::Result::ERROR_VALIDATION_FAILED_EXT)),
            }
        }
        state.events.push(DeviceEvent::Submit(queue, *submit));
        Ok(())
    }

    fn queue_wait_idle(&self, queue: vk::Queue) -> VulkanResult<()> {
        self.state().events.push(DeviceEvent::QueueWaitIdle(queue));
        Ok(())
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VulkanResult<vk::SwapchainKHR> {
        let mut state = self.state();
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(VulkanError::Api(vk::Result::ERROR_VALIDATION_FAILED_EXT));
        }
        state.events.push(DeviceEvent::CreateSwapchain(desc.clone()));
        let raw = state.create(ObjectKind::Swapchain);
        let count = desc.min_image_count.max(1);
        let images = (0..count)
            .map(|_| {
                state.next_handle += 1;
                vk::Image::from_raw(state.next_handle)
            })
            .collect();
        state
            .swapchains
            .insert(raw, SwapchainRecord { images, next_image: 0 });
        Ok(vk::SwapchainKHR::from_raw(raw))
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state();
        state.swapchains.remove(&swapchain.as_raw());
        state.destroy(ObjectKind::Swapchain, swapchain.as_raw());
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VulkanResult<Vec<vk::Image>> {
        self.state()
            .swapchains
            .get(&swapchain.as_raw())
            .map(|record| record.images.clone())
            .ok_or(VulkanError::Api(vk::Result::ERROR_VALIDATION_FAILED_EXT))
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VulkanResult<AcquireOutcome> {
        let mut state = self.state();
        let outcome = if Self::take_failure(&mut state.failures.acquire_out_of_date) {
            AcquireOutcome::OutOfDate
        } else {
            let suboptimal = Self::take_failure(&mut state.failures.acquire_suboptimal);
            let record = state
                .swapchains
                .get_mut(&swapchain.as_raw())
                .ok_or(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR))?;
            let index = record.next_image;
            record.next_image = (index + 1) % record.images.len() as u32;
            AcquireOutcome::Acquired { index, suboptimal }
        };
        state.events.push(DeviceEvent::Acquire { semaphore, outcome });
        Ok(outcome)
    }

    fn queue_present(
        &self,
        _queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VulkanResult<PresentOutcome> {
        let mut state = self.state();
        if !state.swapchains.contains_key(&swapchain.as_raw()) {
            return Err(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR));
        }
        let outcome = if Self::take_failure(&mut state.failures.present_out_of_date) {
            PresentOutcome::OutOfDate
        } else if Self::take_failure(&mut state.failures.present_suboptimal) {
            PresentOutcome::Suboptimal
        } else {
            PresentOutcome::Presented
        };
        state.events.push(DeviceEvent::Present {
            image_index,
            wait,
            outcome,
        });
        Ok(outcome)
    }
}
