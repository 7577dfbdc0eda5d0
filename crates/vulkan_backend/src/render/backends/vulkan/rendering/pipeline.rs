//! Per-renderable graphics pipeline cache
//!
//! A renderable keeps one pipeline, built for the render pass it was last drawn
//! into. The pipeline is rebuilt when the pass, the program link or the
//! program's render state changes.

use super::shader::ShaderProgram;
use crate::render::backends::vulkan::{DeviceRef, GraphicsPipelineDesc, RenderPassId, VulkanError, VulkanResult};
use crate::render::mesh::{vertex_stride, Topology, VertexElement, VertexFormat};
use ash::vk;

/// What a cached pipeline was built against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    /// Render pass identity
    pub pass: RenderPassId,
    /// Program link generation
    pub program: u64,
    /// Revisions of the program's four render states
    pub states: [u64; 4],
}

/// Native format of a vertex element
pub const fn vertex_format(format: VertexFormat) -> vk::Format {
    match format {
        VertexFormat::Float => vk::Format::R32_SFLOAT,
        VertexFormat::Float2 => vk::Format::R32G32_SFLOAT,
        VertexFormat::Float3 => vk::Format::R32G32B32_SFLOAT,
        VertexFormat::Float4 => vk::Format::R32G32B32A32_SFLOAT,
        VertexFormat::UByte4Norm => vk::Format::R8G8B8A8_UNORM,
        VertexFormat::UByte4 => vk::Format::R8G8B8A8_UINT,
        VertexFormat::Int4 => vk::Format::R32G32B32A32_SINT,
    }
}

/// Native primitive topology
pub const fn primitive_topology(topology: Topology) -> vk::PrimitiveTopology {
    match topology {
        Topology::PointList => vk::PrimitiveTopology::POINT_LIST,
        Topology::LineList => vk::PrimitiveTopology::LINE_LIST,
        Topology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        Topology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        Topology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        Topology::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
    }
}

/// Vertex binding 0 and the attributes the vertex stage consumes
///
/// Elements without a matching shader input still advance the offset.
pub fn vertex_input(
    elements: &[VertexElement],
    program: &ShaderProgram,
) -> (vk::VertexInputBindingDescription, Vec<vk::VertexInputAttributeDescription>) {
    let binding = vk::VertexInputBindingDescription {
        binding: 0,
        stride: vertex_stride(elements),
        input_rate: vk::VertexInputRate::VERTEX,
    };

    let inputs = program.reflection(vk::ShaderStageFlags::VERTEX);
    let mut attributes = Vec::with_capacity(elements.len());
    let mut offset = 0;
    for element in elements {
        let name = element.semantic.attribute_name();
        match inputs.and_then(|reflection| reflection.input(name)) {
            Some(input) => attributes.push(vk::VertexInputAttributeDescription {
                location: input.location,
                binding: 0,
                format: vertex_format(element.format),
                offset,
            }),
            None => log::trace!("Vertex element {} not read by the shader", name),
        }
        offset += element.format.size();
    }
    (binding, attributes)
}

/// Pipeline owned by one renderable
pub struct PipelineCache {
    device: DeviceRef,
    pipeline: vk::Pipeline,
    key: Option<PipelineKey>,
    builds: u64,
}

impl PipelineCache {
    /// Create an empty cache
    pub fn new(device: DeviceRef) -> Self {
        Self {
            device,
            pipeline: vk::Pipeline::null(),
            key: None,
            builds: 0,
        }
    }

    /// Return a pipeline matching the pass, program and state, building it if needed
    ///
    /// On failure the renderable is left without a pipeline.
    pub fn ensure_pipeline(
        &mut self,
        pass: RenderPassId,
        render_pass: vk::RenderPass,
        program: &mut ShaderProgram,
        elements: &[VertexElement],
        topology: Topology,
    ) -> VulkanResult<vk::Pipeline> {
        if !program.is_linked() {
            return Err(VulkanError::InvalidOperation {
                reason: "pipeline requested for an unlinked program".to_string(),
            });
        }

        let key = PipelineKey {
            pass,
            program: program.generation(),
            states: program.states.revisions(),
        };
        if self.key == Some(key) && self.pipeline != vk::Pipeline::null() {
            return Ok(self.pipeline);
        }

        self.release();

        let (binding, attributes) = vertex_input(elements, program);
        let bindings = if elements.is_empty() { Vec::new() } else { vec![binding] };
        let stages = program.pipeline_stages();
        let states = &mut program.states;
        let rasterization = states.rasterizer.create_info();
        let depth_stencil = states.depth_stencil.create_info();
        let multisample = states.multisample.create_info();
        let color_blend = states.blend.attachment();
        let blend_constants = states.blend.blend_constants();

        let desc = GraphicsPipelineDesc {
            stages: &stages,
            vertex_bindings: &bindings,
            vertex_attributes: &attributes,
            topology: primitive_topology(topology),
            rasterization: &rasterization,
            depth_stencil: &depth_stencil,
            multisample: &multisample,
            color_blend: &color_blend,
            blend_constants,
            layout: program.pipeline_layout(),
            render_pass,
            subpass: 0,
        };

        match self.device.create_graphics_pipeline(&desc) {
            Ok(pipeline) => {
                self.pipeline = pipeline;
                self.key = Some(key);
                self.builds += 1;
                log::debug!(
                    "Built pipeline for pass {} ({} attributes, {:?})",
                    pass.raw(),
                    attributes.len(),
                    topology
                );
                Ok(pipeline)
            }
            Err(err) => {
                log::error!("Failed to create graphics pipeline: {}", err);
                Err(err)
            }
        }
    }

    /// Cached pipeline, null when none has been built
    pub const fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Key of the cached pipeline
    pub const fn key(&self) -> Option<PipelineKey> {
        self.key
    }

    /// Number of pipelines built over the cache's life
    pub const fn build_count(&self) -> u64 {
        self.builds
    }

    /// Destroy the cached pipeline
    pub fn release(&mut self) {
        if self.pipeline != vk::Pipeline::null() {
            self.device.destroy_pipeline(self.pipeline);
            self.pipeline = vk::Pipeline::null();
        }
        self.key = None;
    }
}

impl Drop for PipelineCache {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for PipelineCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCache")
            .field("pipeline", &self.pipeline)
            .field("key", &self.key)
            .field("builds", &self.builds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::rendering::shader::tests::{fragment_stage, vertex_stage};
    use crate::render::backends::vulkan::{
        BlendState, DeviceContext, GpuDevice, HeadlessDevice, ObjectKind, RenderPassDesc,
    };
    use crate::render::mesh::VertexSemantic;
    use crate::render::state::{BlendDesc, CullMode, RasterizerDesc};
    use std::sync::Arc;

    struct Fixture {
        device: Arc<HeadlessDevice>,
        program: ShaderProgram,
        render_pass: vk::RenderPass,
        _context: DeviceContext,
    }

    fn fixture() -> Fixture {
        let device = Arc::new(HeadlessDevice::default());
        let context = DeviceContext::with_device(device.clone()).unwrap();
        let mut program = ShaderProgram::new(&context, 4);
        program.link(&[vertex_stage(), fragment_stage()]).unwrap();
        let render_pass = device
            .create_render_pass(&RenderPassDesc {
                color_format: vk::Format::B8G8R8A8_SRGB,
                depth_format: None,
                color_final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            })
            .unwrap();
        Fixture {
            device,
            program,
            render_pass,
            _context: context,
        }
    }

    fn elements() -> Vec<VertexElement> {
        vec![
            VertexElement::new(VertexSemantic::Position, VertexFormat::Float3),
            VertexElement::new(VertexSemantic::Normal, VertexFormat::Float3),
            VertexElement::new(VertexSemantic::TexCoord0, VertexFormat::Float2),
        ]
    }

    #[test]
    fn test_unmatched_elements_advance_offset() {
        let fx = fixture();
        let (binding, attributes) = vertex_input(&elements(), &fx.program);
        assert_eq!(binding.stride, 32);
        assert_eq!(attributes.len(), 2);
        assert_eq!((attributes[0].location, attributes[0].offset), (0, 0));
        assert_eq!(attributes[0].format, vk::Format::R32G32B32_SFLOAT);
        // a_Normal is skipped, a_UV starts after it
        assert_eq!((attributes[1].location, attributes[1].offset), (1, 24));
        assert_eq!(attributes[1].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn test_ensure_twice_builds_once() {
        let mut fx = fixture();
        let mut cache = PipelineCache::new(fx.device.clone());
        let pass = RenderPassId::next();

        let first = cache
            .ensure_pipeline(pass, fx.render_pass, &mut fx.program, &elements(), Topology::TriangleList)
            .unwrap();
        let second = cache
            .ensure_pipeline(pass, fx.render_pass, &mut fx.program, &elements(), Topology::TriangleList)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.build_count(), 1);
        assert_eq!(fx.device.created_count(ObjectKind::Pipeline), 1);

        let record = fx.device.pipeline_record(first).unwrap();
        assert_eq!(record.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(record.stage_count, 2);
        assert_eq!(record.layout, fx.program.pipeline_layout());
    }

    #[test]
    fn test_pass_change_rebuilds_once() {
        let mut fx = fixture();
        let mut cache = PipelineCache::new(fx.device.clone());

        let old = cache
            .ensure_pipeline(RenderPassId::next(), fx.render_pass, &mut fx.program, &elements(), Topology::TriangleList)
            .unwrap();
        let new_pass = RenderPassId::next();
        let new = cache
            .ensure_pipeline(new_pass, fx.render_pass, &mut fx.program, &elements(), Topology::TriangleList)
            .unwrap();

        assert_eq!(fx.device.created_count(ObjectKind::Pipeline), 2);
        assert_eq!(fx.device.live_count(ObjectKind::Pipeline), 1);
        assert!(!fx.device.is_live(ObjectKind::Pipeline, old));
        assert!(fx.device.is_live(ObjectKind::Pipeline, new));
        assert_eq!(cache.key().map(|k| k.pass), Some(new_pass));
    }

    #[test]
    fn test_state_change_and_relink_rebuild() {
        let mut fx = fixture();
        let mut cache = PipelineCache::new(fx.device.clone());
        let pass = RenderPassId::next();
        let build = |cache: &mut PipelineCache, fx: &mut Fixture| {
            cache
                .ensure_pipeline(pass, fx.render_pass, &mut fx.program, &elements(), Topology::TriangleList)
                .unwrap()
        };

        build(&mut cache, &mut fx);
        fx.program.states.blend.set_desc(BlendDesc::alpha_blend());
        fx.program.states.rasterizer.set_desc(RasterizerDesc {
            cull_mode: CullMode::None,
            ..RasterizerDesc::default()
        });
        let blended = build(&mut cache, &mut fx);
        let record = fx.device.pipeline_record(blended).unwrap();
        assert!(record.blend_enable);
        assert_eq!(record.cull_mode, vk::CullModeFlags::NONE);

        fx.program.link(&[vertex_stage(), fragment_stage()]).unwrap();
        build(&mut cache, &mut fx);
        assert_eq!(cache.build_count(), 3);
        assert_eq!(fx.device.live_count(ObjectKind::Pipeline), 1);
    }

    #[test]
    fn test_replacing_a_state_rebuilds() {
        let mut fx = fixture();
        let mut cache = PipelineCache::new(fx.device.clone());
        let pass = RenderPassId::next();

        cache
            .ensure_pipeline(pass, fx.render_pass, &mut fx.program, &elements(), Topology::TriangleList)
            .unwrap();
        fx.program.states.blend = BlendState::new(BlendDesc::alpha_blend());
        let blended = cache
            .ensure_pipeline(pass, fx.render_pass, &mut fx.program, &elements(), Topology::TriangleList)
            .unwrap();

        assert_eq!(cache.build_count(), 2);
        assert!(fx.device.pipeline_record(blended).unwrap().blend_enable);

        // Swapping in a copy of the current state keeps the pipeline
        fx.program.states.blend = fx.program.states.blend.clone();
        cache
            .ensure_pipeline(pass, fx.render_pass, &mut fx.program, &elements(), Topology::TriangleList)
            .unwrap();
        assert_eq!(cache.build_count(), 2);
    }

    #[test]
    fn test_creation_failure_leaves_no_pipeline() {
        let mut fx = fixture();
        let mut cache = PipelineCache::new(fx.device.clone());
        let pass = RenderPassId::next();
        cache
            .ensure_pipeline(pass, fx.render_pass, &mut fx.program, &elements(), Topology::TriangleList)
            .unwrap();

        fx.device.fail_pipeline_creation(1);
        let result = cache.ensure_pipeline(
            RenderPassId::next(),
            fx.render_pass,
            &mut fx.program,
            &elements(),
            Topology::TriangleList,
        );
        assert!(result.is_err());
        assert_eq!(cache.pipeline(), vk::Pipeline::null());
        assert_eq!(cache.key(), None);
        assert_eq!(fx.device.live_count(ObjectKind::Pipeline), 0);
    }
}
