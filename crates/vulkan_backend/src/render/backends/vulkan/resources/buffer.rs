//! Buffer management for vertex data, indices, uniforms and staging
//!
//! A [`GpuBuffer`] owns one buffer and the host-visible memory bound to it. The
//! pair is recreated only when the requested size changes; the stale pair is
//! destroyed before the new one is allocated, so a buffer never holds more than
//! one allocation.

use crate::render::backends::vulkan::{DeviceContext, DeviceRef, VulkanError, VulkanResult};
use ash::vk;

/// What a buffer is bound as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Vertex attributes
    Vertex,
    /// Indices
    Index,
    /// Uniform block data
    Uniform,
    /// Transfer source for image uploads
    Staging,
}

impl BufferKind {
    /// Usage flags for buffers of this kind
    pub fn usage(self) -> vk::BufferUsageFlags {
        match self {
            Self::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
            Self::Index => vk::BufferUsageFlags::INDEX_BUFFER,
            Self::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            Self::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }
}

/// Find a memory type allowed by `type_filter` that has all of `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            (type_filter & (1 << i)) != 0
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .ok_or(VulkanError::NoSuitableMemoryType)
}

/// Allocate memory with `properties` for the given requirements
pub(crate) fn allocate_for(
    device: &DeviceRef,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<vk::DeviceMemory> {
    let memory_type = find_memory_type(
        &device.memory_properties(),
        requirements.memory_type_bits,
        properties,
    )?;
    device.allocate_memory(requirements.size, memory_type)
}

/// GPU buffer with host-visible, coherent memory
pub struct GpuBuffer {
    device: DeviceRef,
    kind: BufferKind,
    size: vk::DeviceSize,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
}

impl GpuBuffer {
    /// Create an empty buffer; storage is allocated by the first `create` or `update_data`
    pub fn new(context: &DeviceContext, kind: BufferKind) -> Self {
        Self {
            device: context.device().clone(),
            kind,
            size: 0,
            buffer: vk::Buffer::null(),
            memory: vk::DeviceMemory::null(),
        }
    }

    /// Create a buffer holding `bytes`
    pub fn with_data(context: &DeviceContext, kind: BufferKind, bytes: &[u8]) -> VulkanResult<Self> {
        let mut buffer = Self::new(context, kind);
        buffer.update_data(bytes)?;
        Ok(buffer)
    }

    /// Make sure the buffer holds exactly `size` bytes of storage
    ///
    /// Does nothing when the buffer already has that size. Otherwise the
    /// current buffer and memory are destroyed first; if creation then fails
    /// the buffer is left empty.
    pub fn create(&mut self, size: vk::DeviceSize) -> VulkanResult<()> {
        if size == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!("{:?} buffer of zero size", self.kind),
            });
        }
        if self.is_allocated() && self.size == size {
            return Ok(());
        }

        self.release();

        match self.allocate(size) {
            Ok((buffer, memory)) => {
                self.buffer = buffer;
                self.memory = memory;
                self.size = size;
                log::trace!("Created {:?} buffer of {} bytes", self.kind, size);
                Ok(())
            }
            Err(err) => {
                log::error!("Failed to create {:?} buffer of {} bytes: {}", self.kind, size, err);
                Err(err)
            }
        }
    }

    fn allocate(&self, size: vk::DeviceSize) -> VulkanResult<(vk::Buffer, vk::DeviceMemory)> {
        let info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(self.kind.usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = self.device.create_buffer(&info)?;

        let requirements = self.device.buffer_memory_requirements(buffer);
        let memory = match allocate_for(
            &self.device,
            requirements,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ) {
            Ok(memory) => memory,
            Err(err) => {
                self.device.destroy_buffer(buffer);
                return Err(err);
            }
        };

        if let Err(err) = self.device.bind_buffer_memory(buffer, memory) {
            self.device.free_memory(memory);
            self.device.destroy_buffer(buffer);
            return Err(err);
        }

        Ok((buffer, memory))
    }

    /// Resize to `bytes.len()` if needed and copy `bytes` into the buffer
    pub fn update_data(&mut self, bytes: &[u8]) -> VulkanResult<()> {
        if bytes.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: format!("empty upload to {:?} buffer", self.kind),
            });
        }
        self.create(bytes.len() as vk::DeviceSize)?;
        self.device.write_memory(self.memory, 0, bytes).map_err(|err| {
            log::error!("Failed to upload {} bytes to {:?} buffer: {}", bytes.len(), self.kind, err);
            err
        })
    }

    /// Destroy the buffer and its memory, leaving it empty
    pub fn release(&mut self) {
        if self.buffer != vk::Buffer::null() {
            self.device.destroy_buffer(self.buffer);
            self.buffer = vk::Buffer::null();
        }
        if self.memory != vk::DeviceMemory::null() {
            self.device.free_memory(self.memory);
            self.memory = vk::DeviceMemory::null();
        }
        self.size = 0;
    }

    /// Whether the buffer currently owns storage
    pub fn is_allocated(&self) -> bool {
        self.buffer != vk::Buffer::null()
    }

    /// Native buffer handle, null while empty
    pub const fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Bound memory, null while empty
    pub const fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    /// Size in bytes
    pub const fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Buffer kind
    pub const fn kind(&self) -> BufferKind {
        self.kind
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuBuffer")
            .field("kind", &self.kind)
            .field("size", &self.size)
            .field("buffer", &self.buffer)
            .finish()
    }
}
