//! End-to-end frame loop tests against the headless device

use crate::config::RendererConfig;
use crate::render::backends::vulkan::headless::DeviceEvent;
use crate::render::backends::vulkan::rendering::reflection::tests::fragment_module;
use crate::render::backends::vulkan::rendering::shader::tests::{fragment_stage, vertex_stage};
use crate::render::backends::vulkan::{
    Command, CompiledStage, DescriptorWrite, DeviceContext, HeadlessConfig, HeadlessDevice, ObjectKind,
    Renderable, ShaderProgram, VulkanRenderer,
};
use crate::render::material::{Material, NoGlobals, UniformValue};
use crate::render::mesh::{Topology, VertexElement, VertexFormat, VertexSemantic};
use approx::assert_relative_eq;
use ash::vk;
use std::sync::Arc;

struct Scene {
    device: Arc<HeadlessDevice>,
    renderer: VulkanRenderer,
    program: ShaderProgram,
    triangle: Renderable,
    material: Material,
}

fn scene(width: u32, height: u32) -> Scene {
    scene_with_fragment(width, height, fragment_stage())
}

fn scene_with_fragment(width: u32, height: u32, fragment: CompiledStage) -> Scene {
    let device = Arc::new(HeadlessDevice::new(HeadlessConfig::default().with_extent(width, height)));
    let context = DeviceContext::with_device(device.clone()).unwrap();
    let config = RendererConfig::new("frame loop").with_screen_size(width, height);
    let renderer = VulkanRenderer::new(&context, &config).unwrap();

    let mut program = ShaderProgram::new(&context, 16);
    program.link(&[vertex_stage(), fragment]).unwrap();

    let mut triangle = Renderable::new(
        &context,
        vec![VertexElement::new(VertexSemantic::Position, VertexFormat::Float3)],
        Topology::TriangleList,
    );
    let positions: [f32; 9] = [0.0, -0.5, 0.0, 0.5, 0.5, 0.0, -0.5, 0.5, 0.0];
    triangle.set_vertices(bytemuck::cast_slice(&positions)).unwrap();

    let material = Material::new("red").with_value("u_Color", &UniformValue::Vec4([1.0, 0.0, 0.0, 1.0]));

    Scene {
        device,
        renderer,
        program,
        triangle,
        material,
    }
}

fn uploaded_material_block(scene: &Scene) -> Vec<u8> {
    let uniform_buffer = scene
        .device
        .events()
        .iter()
        .find_map(|event| match event {
            DeviceEvent::UpdateDescriptorSet(_, writes) => writes.iter().find_map(|write| match write {
                DescriptorWrite::UniformBuffer { binding: 1, buffer, .. } => Some(*buffer),
                _ => None,
            }),
            _ => None,
        })
        .unwrap();
    scene.device.buffer_contents(uniform_buffer).unwrap()
}

fn render_frame(scene: &mut Scene) {
    assert!(scene.renderer.begin_frame().unwrap());
    scene
        .renderer
        .draw(&mut scene.triangle, &mut scene.program, &scene.material, &NoGlobals)
        .unwrap();
    scene.renderer.end_frame().unwrap();
}

#[test]
fn test_single_frame_at_640x480() {
    let mut scene = scene(640, 480);
    scene.device.clear_events();
    render_frame(&mut scene);

    let extent = scene.renderer.swapchain().extent();
    assert_eq!((extent.width, extent.height), (640, 480));

    // Packed into the fragment block mirror
    let mirror = scene.program.block_bytes(1).unwrap();
    let color: &[f32] = bytemuck::cast_slice(&mirror[..16]);
    assert_relative_eq!(color[0], 1.0);
    assert_relative_eq!(color[1], 0.0);
    assert_relative_eq!(color[2], 0.0);
    assert_relative_eq!(color[3], 1.0);

    // ...and uploaded into the buffer the descriptor set points at
    let uploaded = uploaded_material_block(&scene);
    assert_eq!(&uploaded[..16], &mirror[..16]);

    let events = scene.device.events();

    // Exactly one framebuffer / command buffer pair was used
    let framebuffers: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            DeviceEvent::Record(_, Command::BeginRenderPass { framebuffer, .. }) => Some(*framebuffer),
            _ => None,
        })
        .collect();
    let submitted: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            DeviceEvent::Submit(_, submit) => Some(submit.command_buffer),
            _ => None,
        })
        .collect();
    assert_eq!(framebuffers, vec![scene.renderer.swapchain().framebuffers()[0]]);
    assert_eq!(submitted, vec![scene.renderer.swapchain().command_buffers()[0]]);

    let stats = scene.renderer.frame_stats();
    assert_eq!((stats.draw_calls, stats.triangles), (1, 1));
}

#[test]
fn test_fence_wait_precedes_every_command_buffer_reuse() {
    let mut scene = scene(640, 480);
    scene.device.clear_events();
    for _ in 0..5 {
        render_frame(&mut scene);
    }

    let swapchain = scene.renderer.swapchain();
    let command_buffers = swapchain.command_buffers().to_vec();
    let fences = swapchain.fences();
    let events = scene.device.events();

    let mut begins = 0;
    for (position, event) in events.iter().enumerate() {
        let DeviceEvent::BeginCommandBuffer(command_buffer) = event else {
            continue;
        };
        let Some(slot) = command_buffers.iter().position(|cb| cb == command_buffer) else {
            continue;
        };
        begins += 1;
        assert!(
            matches!(events[position - 1], DeviceEvent::WaitFence(fence) if fence == fences[slot]),
            "command buffer {} begun without waiting its fence",
            slot
        );
    }
    assert_eq!(begins, 5);
}

#[test]
fn test_uniform_slots_are_reused_once_fences_are_waited() {
    let mut scene = scene(640, 480);
    let image_count = scene.renderer.swapchain().image_count();
    for _ in 0..image_count * 4 {
        render_frame(&mut scene);
    }

    // One slot per image, never more
    assert_eq!(
        scene.device.live_count(ObjectKind::DescriptorSet),
        image_count
    );
    assert_eq!(scene.program.descriptor_pool_count(), 1);
}

#[test]
fn test_resize_between_frames_keeps_drawing() {
    let mut scene = scene(640, 480);
    render_frame(&mut scene);
    let builds = scene.triangle.pipeline_cache().build_count();

    scene.device.set_surface_extent(Some((1024, 768)));
    scene.renderer.on_resize(1024, 768);
    render_frame(&mut scene);

    let extent = scene.renderer.swapchain().extent();
    assert_eq!((extent.width, extent.height), (1024, 768));
    // New render pass, new pipeline
    assert_eq!(scene.triangle.pipeline_cache().build_count(), builds + 1);
    assert_eq!(scene.device.live_count(ObjectKind::Pipeline), 1);
    assert_eq!(scene.renderer.frame_stats().draw_calls, 1);
}

#[test]
fn test_reflected_fragment_module_drives_uniform_layout() {
    let fragment = CompiledStage::new(vk::ShaderStageFlags::FRAGMENT, fragment_module()).unwrap();
    let mut scene = scene_with_fragment(640, 480, fragment);

    let color = scene.program.uniform("u_Color").unwrap();
    let offset = color.offset().unwrap() as usize;
    assert_eq!(color.size(), 16);
    assert_eq!(scene.program.uniform("u_Alpha").unwrap().offset(), Some(16));
    assert_eq!(scene.program.uniform("u_Albedo").unwrap().texture_unit(), Some(0));

    scene.device.clear_events();
    render_frame(&mut scene);

    let mirror = scene.program.block_bytes(1).unwrap();
    let packed: &[f32] = bytemuck::cast_slice(&mirror[offset..offset + 16]);
    assert_relative_eq!(packed[0], 1.0);
    assert_relative_eq!(packed[1], 0.0);
    assert_relative_eq!(packed[2], 0.0);
    assert_relative_eq!(packed[3], 1.0);

    let uploaded = uploaded_material_block(&scene);
    assert_eq!(&uploaded[offset..offset + 16], &mirror[offset..offset + 16]);
    assert_eq!(scene.renderer.frame_stats().draw_calls, 1);
}
