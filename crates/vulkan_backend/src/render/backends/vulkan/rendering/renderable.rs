//! Drawable mesh: GPU vertex and index buffers plus the mesh's pipeline

use super::pipeline::PipelineCache;
use super::shader::ShaderProgram;
use crate::render::backends::vulkan::{
    BufferKind, Command, DeviceContext, GpuBuffer, GpuDevice, RenderPassId, VulkanError, VulkanResult,
};
use crate::render::mesh::{vertex_stride, IndexFormat, Topology, VertexElement};
use ash::vk;

/// Mesh uploaded to the GPU, drawn with any compatible program
pub struct Renderable {
    vertices: GpuBuffer,
    indices: GpuBuffer,
    elements: Vec<VertexElement>,
    topology: Topology,
    index_format: IndexFormat,
    vertex_count: u32,
    index_count: u32,
    pipeline: PipelineCache,
}

impl Renderable {
    /// Create an empty renderable with the given vertex layout
    pub fn new(context: &DeviceContext, elements: Vec<VertexElement>, topology: Topology) -> Self {
        Self {
            vertices: GpuBuffer::new(context, BufferKind::Vertex),
            indices: GpuBuffer::new(context, BufferKind::Index),
            elements,
            topology,
            index_format: IndexFormat::U16,
            vertex_count: 0,
            index_count: 0,
            pipeline: PipelineCache::new(context.device().clone()),
        }
    }

    /// Upload interleaved vertex data
    pub fn set_vertices(&mut self, bytes: &[u8]) -> VulkanResult<()> {
        let stride = vertex_stride(&self.elements) as usize;
        if stride == 0 || bytes.len() % stride != 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!("{} vertex bytes do not match stride {}", bytes.len(), stride),
            });
        }
        // A failed upload may already have released the old buffer
        self.vertex_count = 0;
        self.vertices.update_data(bytes)?;
        self.vertex_count = (bytes.len() / stride) as u32;
        Ok(())
    }

    /// Upload 16-bit indices
    pub fn set_indices_u16(&mut self, indices: &[u16]) -> VulkanResult<()> {
        self.set_indices(bytemuck::cast_slice(indices), IndexFormat::U16.stride())
    }

    /// Upload 32-bit indices
    pub fn set_indices_u32(&mut self, indices: &[u32]) -> VulkanResult<()> {
        self.set_indices(bytemuck::cast_slice(indices), IndexFormat::U32.stride())
    }

    /// Upload raw index data; a stride of 4 means 32-bit indices, anything else 16-bit
    pub fn set_indices(&mut self, bytes: &[u8], stride: u32) -> VulkanResult<()> {
        let format = IndexFormat::from_stride(stride);
        self.index_count = 0;
        self.indices.update_data(bytes)?;
        self.index_format = format;
        self.index_count = bytes.len() as u32 / format.stride();
        Ok(())
    }

    /// Drop the index buffer and draw non-indexed
    pub fn clear_indices(&mut self) {
        self.indices.release();
        self.index_count = 0;
    }

    /// Change the primitive topology; the pipeline is rebuilt on next use
    pub fn set_topology(&mut self, topology: Topology) {
        if topology != self.topology {
            self.topology = topology;
            self.pipeline.release();
        }
    }

    /// Vertex layout
    pub fn elements(&self) -> &[VertexElement] {
        &self.elements
    }

    /// Primitive topology
    pub const fn topology(&self) -> Topology {
        self.topology
    }

    /// Width of the indices
    pub const fn index_format(&self) -> IndexFormat {
        self.index_format
    }

    /// Whether draws use the index buffer
    pub const fn is_indexed(&self) -> bool {
        self.index_count > 0
    }

    /// Number of vertices
    pub const fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Number of indices
    pub const fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Triangles submitted by one draw
    pub const fn triangle_count(&self) -> u32 {
        let count = if self.is_indexed() {
            self.index_count
        } else {
            self.vertex_count
        };
        self.topology.triangle_count(count)
    }

    /// Vertex buffer
    pub const fn vertex_buffer(&self) -> &GpuBuffer {
        &self.vertices
    }

    /// Index buffer
    pub const fn index_buffer(&self) -> &GpuBuffer {
        &self.indices
    }

    /// Pipeline cache
    pub const fn pipeline_cache(&self) -> &PipelineCache {
        &self.pipeline
    }

    /// Pipeline for `program` in the given pass, built if needed
    pub fn ensure_pipeline(
        &mut self,
        pass: RenderPassId,
        render_pass: vk::RenderPass,
        program: &mut ShaderProgram,
    ) -> VulkanResult<vk::Pipeline> {
        self.pipeline
            .ensure_pipeline(pass, render_pass, program, &self.elements, self.topology)
    }

    /// Record buffer binds and the draw call
    pub fn record_draw(&self, device: &dyn GpuDevice, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        if !self.vertices.is_allocated() || self.vertex_count == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "renderable has no vertex data".to_string(),
            });
        }

        device.record(command_buffer, Command::BindVertexBuffer(self.vertices.handle()));
        if self.is_indexed() {
            let index_type = match self.index_format {
                IndexFormat::U16 => vk::IndexType::UINT16,
                IndexFormat::U32 => vk::IndexType::UINT32,
            };
            device.record(
                command_buffer,
                Command::BindIndexBuffer {
                    buffer: self.indices.handle(),
                    index_type,
                },
            );
            device.record(
                command_buffer,
                Command::DrawIndexed {
                    index_count: self.index_count,
                    first_index: 0,
                    vertex_offset: 0,
                },
            );
        } else {
            device.record(
                command_buffer,
                Command::Draw {
                    vertex_count: self.vertex_count,
                    first_vertex: 0,
                },
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for Renderable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderable")
            .field("elements", &self.elements)
            .field("topology", &self.topology)
            .field("vertex_count", &self.vertex_count)
            .field("index_count", &self.index_count)
            .field("index_format", &self.index_format)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::{HeadlessDevice, ObjectKind};
    use crate::render::mesh::{VertexFormat, VertexSemantic};
    use std::sync::Arc;

    fn setup() -> (Arc<HeadlessDevice>, DeviceContext) {
        let device = Arc::new(HeadlessDevice::default());
        let context = DeviceContext::with_device(device.clone()).unwrap();
        (device, context)
    }

    fn triangle(context: &DeviceContext) -> Renderable {
        let mut renderable = Renderable::new(
            context,
            vec![VertexElement::new(VertexSemantic::Position, VertexFormat::Float3)],
            Topology::TriangleList,
        );
        let positions: [f32; 9] = [0.0, -0.5, 0.0, 0.5, 0.5, 0.0, -0.5, 0.5, 0.0];
        renderable.set_vertices(bytemuck::cast_slice(&positions)).unwrap();
        renderable
    }

    #[test]
    fn test_vertex_upload_counts_vertices() {
        let (device, context) = setup();
        let renderable = triangle(&context);
        assert_eq!(renderable.vertex_count(), 3);
        assert_eq!(renderable.triangle_count(), 1);
        assert!(!renderable.is_indexed());
        assert_eq!(
            device.buffer_contents(renderable.vertex_buffer().handle()).unwrap()[..4],
            0.0f32.to_ne_bytes()
        );
    }

    #[test]
    fn test_vertex_bytes_must_match_stride() {
        let (_device, context) = setup();
        let mut renderable = triangle(&context);
        assert!(renderable.set_vertices(&[0; 10]).is_err());
        assert_eq!(renderable.vertex_count(), 3);
    }

    #[test]
    fn test_index_width_follows_stride() {
        let (device, context) = setup();
        let mut renderable = triangle(&context);
        let command_buffer = context.command_pool().allocate(1).unwrap()[0];

        renderable.set_indices_u32(&[0, 1, 2, 2, 1, 0]).unwrap();
        assert_eq!(renderable.index_format(), IndexFormat::U32);
        assert_eq!(renderable.index_count(), 6);
        assert_eq!(renderable.triangle_count(), 2);

        device.begin_command_buffer(command_buffer, true).unwrap();
        renderable.record_draw(device.as_ref(), command_buffer).unwrap();
        let commands = device.recorded_commands(command_buffer);
        assert!(matches!(
            commands[1],
            Command::BindIndexBuffer {
                index_type: vk::IndexType::UINT32,
                ..
            }
        ));
        assert!(matches!(commands[2], Command::DrawIndexed { index_count: 6, .. }));

        renderable.set_indices_u16(&[0, 1, 2]).unwrap();
        assert_eq!(renderable.index_format(), IndexFormat::U16);
        renderable.clear_indices();
        assert!(!renderable.is_indexed());
        assert_eq!(device.live_count(ObjectKind::Buffer), 1);
    }

    #[test]
    fn test_failed_index_upload_draws_non_indexed() {
        let (device, context) = setup();
        let mut renderable = triangle(&context);
        let command_buffer = context.command_pool().allocate(1).unwrap()[0];
        renderable.set_indices_u16(&[0, 1, 2]).unwrap();

        device.fail_allocation(1);
        assert!(renderable.set_indices_u16(&[0, 1, 2, 2, 1, 0]).is_err());
        assert!(!renderable.index_buffer().is_allocated());
        assert!(!renderable.is_indexed());
        assert_eq!(renderable.index_count(), 0);

        device.begin_command_buffer(command_buffer, true).unwrap();
        renderable.record_draw(device.as_ref(), command_buffer).unwrap();
        let commands = device.recorded_commands(command_buffer);
        assert_eq!(commands.len(), 2);
        assert!(matches!(commands[1], Command::Draw { vertex_count: 3, .. }));
    }

    #[test]
    fn test_failed_vertex_upload_is_not_drawn() {
        let (device, context) = setup();
        let mut renderable = triangle(&context);
        let command_buffer = context.command_pool().allocate(1).unwrap()[0];

        device.fail_allocation(1);
        let positions = [0.0f32; 18];
        assert!(renderable.set_vertices(bytemuck::cast_slice(&positions)).is_err());
        assert!(!renderable.vertex_buffer().is_allocated());
        assert_eq!(renderable.vertex_count(), 0);

        device.begin_command_buffer(command_buffer, true).unwrap();
        assert!(renderable.record_draw(device.as_ref(), command_buffer).is_err());
        assert!(device.recorded_commands(command_buffer).is_empty());
    }

    #[test]
    fn test_draw_without_vertices_is_an_error() {
        let (device, context) = setup();
        let renderable = Renderable::new(&context, Vec::new(), Topology::TriangleList);
        let command_buffer = context.command_pool().allocate(1).unwrap()[0];
        assert!(renderable.record_draw(device.as_ref(), command_buffer).is_err());
    }
}
