//! Spinning triangle in a GLFW window
//!
//! Run with `cargo run -p vulkan_backend --example triangle --features window`.
//! Shaders are compiled by the build script when `VULKAN_SDK` is set.

use std::time::Instant;
use vulkan_backend::prelude::*;
use vulkan_backend::render::material::GlobalUniformTable;
use vulkan_backend::render::shader_source::SpirvFileCompiler;
use vulkan_backend::render::backends::vulkan::Window;

fn rotation_z(angle: f32) -> [f32; 16] {
    let (sin, cos) = angle.sin_cos();
    [
        cos, sin, 0.0, 0.0, //
        -sin, cos, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_with_level(log::LevelFilter::Info);

    let config = RendererConfig::load_from_file("renderer.toml").unwrap_or_else(|e| {
        log::info!("Using default renderer settings ({})", e);
        RendererConfig::new("Triangle").with_screen_size(800, 600)
    });
    config.validate()?;

    let mut window = Window::new(&config.application_name, config.screen_width, config.screen_height)?;
    let context = DeviceContext::new(&mut window, &config)?;
    let mut renderer = VulkanRenderer::new(&context, &config)?;

    let shader_dir = option_env!("VULKAN_BACKEND_SHADER_DIR").map_or_else(|| config.shader_directory.clone(), str::to_string);
    let compiler = SpirvFileCompiler::new(shader_dir);
    let mut program = renderer.create_program(&compiler, "triangle.vert.spv", "triangle.frag.spv")?;

    let mut triangle = Renderable::new(
        &context,
        vec![
            VertexElement::new(VertexSemantic::Position, VertexFormat::Float3),
            VertexElement::new(VertexSemantic::Color, VertexFormat::Float4),
        ],
        Topology::TriangleList,
    );
    #[rustfmt::skip]
    let vertices: [f32; 21] = [
         0.0, -0.5, 0.0,  1.0, 0.0, 0.0, 1.0,
         0.5,  0.5, 0.0,  0.0, 1.0, 0.0, 1.0,
        -0.5,  0.5, 0.0,  0.0, 0.0, 1.0, 1.0,
    ];
    triangle.set_vertices(bytemuck::cast_slice(&vertices))?;

    let material = Material::new("tinted").with_value("u_Tint", &UniformValue::Vec4([1.0, 1.0, 1.0, 1.0]));
    let mut globals = GlobalUniformTable::new();

    let start = Instant::now();
    let mut frames = 0u64;
    while !window.should_close() {
        window.poll_events();
        if let Some((width, height)) = window.take_resize() {
            renderer.on_resize(width, height);
        }

        globals.set("u_MVP", &UniformValue::Mat4(rotation_z(start.elapsed().as_secs_f32())));

        if !renderer.begin_frame()? {
            continue;
        }
        renderer.draw(&mut triangle, &mut program, &material, &globals)?;
        renderer.end_frame()?;

        frames += 1;
        if frames % 600 == 0 {
            let stats = renderer.frame_stats();
            log::info!(
                "{} frames, {:.1} fps, {} draws / {} triangles per frame",
                frames,
                frames as f64 / start.elapsed().as_secs_f64(),
                stats.draw_calls,
                stats.triangles
            );
        }
    }

    Ok(())
}
