//! Device context shared by every backend component
//!
//! Holds the device, the queues chosen at creation and a command pool on the
//! graphics family. Components keep a clone of the context; native objects are
//! destroyed through the device they were created with, so the device outlives
//! all of them.

use super::context::{VulkanError, VulkanResult};
use crate::render::backends::vulkan::device::{DeviceRef, GpuDevice, QueueSetup, SubmitDesc};
use ash::vk;
use std::sync::Arc;

/// Command pool on the graphics queue family with individually resettable buffers
pub struct CommandPool {
    device: DeviceRef,
    pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool for `queue_family`
    pub fn new(device: DeviceRef, queue_family: u32) -> VulkanResult<Self> {
        let pool = device.create_command_pool(queue_family)?;
        Ok(Self { device, pool })
    }

    /// Native handle
    pub const fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Allocate primary command buffers
    pub fn allocate(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        self.device.allocate_command_buffers(self.pool, count)
    }

    /// Return command buffers to the pool
    pub fn free(&self, buffers: &[vk::CommandBuffer]) {
        self.device.free_command_buffers(self.pool, buffers);
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        self.device.destroy_command_pool(self.pool);
    }
}

/// Device, queues and command pool
#[derive(Clone)]
pub struct DeviceContext {
    device: DeviceRef,
    queues: QueueSetup,
    command_pool: Arc<CommandPool>,
}

impl DeviceContext {
    /// Wrap an already created device
    pub fn with_device(device: DeviceRef) -> VulkanResult<Self> {
        let queues = device.queue_setup();
        let command_pool = Arc::new(CommandPool::new(device.clone(), queues.graphics_family)?);

        log::debug!(
            "Device context ready (graphics family {}, present family {})",
            queues.graphics_family,
            queues.present_family
        );

        Ok(Self {
            device,
            queues,
            command_pool,
        })
    }

    /// Create the Vulkan device for a window and wrap it
    pub fn new(
        window: &mut dyn super::context::SurfaceProvider,
        config: &crate::config::RendererConfig,
    ) -> VulkanResult<Self> {
        let device = super::ash_device::AshDevice::new(
            window,
            &config.application_name,
            config.enable_validation,
        )?;
        Self::with_device(Arc::new(device))
    }

    /// The device
    pub fn device(&self) -> &DeviceRef {
        &self.device
    }

    /// Queues chosen at device creation
    pub const fn queues(&self) -> QueueSetup {
        self.queues
    }

    /// Graphics queue
    pub const fn graphics_queue(&self) -> vk::Queue {
        self.queues.graphics_queue
    }

    /// Present queue
    pub const fn present_queue(&self) -> vk::Queue {
        self.queues.present_queue
    }

    /// Shared command pool
    pub fn command_pool(&self) -> &Arc<CommandPool> {
        &self.command_pool
    }

    /// Block until the device is idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.device.wait_idle()
    }

    /// Record commands into a one-shot buffer, submit on the graphics queue and wait
    pub fn submit_one_time<F>(&self, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&dyn GpuDevice, vk::CommandBuffer),
    {
        let buffers = self.command_pool.allocate(1)?;
        let Some(&command_buffer) = buffers.first() else {
            return Err(VulkanError::InvalidOperation {
                reason: "command pool returned no buffer".to_string(),
            });
        };
        let result = self.submit_recorded(command_buffer, record);
        self.command_pool.free(&buffers);
        result
    }

    fn submit_recorded<F>(&self, command_buffer: vk::CommandBuffer, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&dyn GpuDevice, vk::CommandBuffer),
    {
        self.device.begin_command_buffer(command_buffer, true)?;
        record(self.device.as_ref(), command_buffer);
        self.device.end_command_buffer(command_buffer)?;

        self.device.queue_submit(
            self.queues.graphics_queue,
            &SubmitDesc {
                command_buffer,
                wait: None,
                signal: None,
                fence: vk::Fence::null(),
            },
        )?;
        self.device.queue_wait_idle(self.queues.graphics_queue)
    }
}

impl std::fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceContext").field("queues", &self.queues).finish_non_exhaustive()
    }
}
