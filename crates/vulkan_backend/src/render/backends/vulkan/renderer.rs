//! Vulkan frame loop driver
//!
//! [`VulkanRenderer`] owns the swapchain and drives one frame at a time:
//!
//! 1. `begin_frame` applies a pending resize, acquires an image, waits for
//!    that image's previous submission and begins its command buffer
//! 2. `draw` opens the swapchain pass on first use, makes sure the renderable
//!    has a pipeline for the active pass, resolves and uploads uniforms, binds
//!    everything and records the draw
//! 3. `end_frame` closes the pass, submits, presents and drains the present
//!    queue, rebuilding the swapchain when presentation asks for it
//!
//! Off-screen passes into a [`RenderTarget`] can be recorded between
//! `begin_frame` and the first swapchain draw.

use crate::config::RendererConfig;
use crate::render::backends::vulkan::{
    create_shader_program, Command, DeviceContext, FrameContext, RenderPassId, RenderTarget, Renderable,
    ShaderProgram, Swapchain, Texture, UniformType, VulkanError, VulkanResult,
};
use crate::render::material::{GlobalUniforms, Material};
use crate::render::shader_source::ShaderCompiler;
use ash::vk;
use std::sync::Arc;

/// Work recorded during one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Draw calls recorded
    pub draw_calls: u32,
    /// Triangles submitted by those draws
    pub triangles: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActivePass {
    None,
    Swapchain,
    Offscreen {
        pass_id: RenderPassId,
        render_pass: vk::RenderPass,
    },
}

/// Swapchain renderer
pub struct VulkanRenderer {
    context: DeviceContext,
    swapchain: Swapchain,
    fallback: Arc<Texture>,
    textures: Vec<Option<Arc<Texture>>>,
    clear_color: [f32; 4],
    clear_depth: f32,
    sets_per_pool: u32,
    pending_resize: Option<(u32, u32)>,
    frame: Option<FrameContext>,
    pass: ActivePass,
    stats: FrameStats,
    last_stats: FrameStats,
}

impl VulkanRenderer {
    /// Create the swapchain and the fallback texture
    pub fn new(context: &DeviceContext, config: &RendererConfig) -> VulkanResult<Self> {
        config
            .validate()
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;

        let swapchain = Swapchain::new(
            context,
            vk::Extent2D {
                width: config.screen_width,
                height: config.screen_height,
            },
        )?;
        let fallback = Arc::new(Texture::solid_color(context, [255, 255, 255, 255])?);

        log::info!(
            "Renderer ready: {}x{}, {} swapchain images",
            swapchain.extent().width,
            swapchain.extent().height,
            swapchain.image_count()
        );

        Ok(Self {
            context: context.clone(),
            swapchain,
            fallback,
            textures: Vec::new(),
            clear_color: config.clear_color,
            clear_depth: config.clear_depth,
            sets_per_pool: config.descriptor_sets_per_pool,
            pending_resize: None,
            frame: None,
            pass: ActivePass::None,
            stats: FrameStats::default(),
            last_stats: FrameStats::default(),
        })
    }

    /// Record a new surface size; the swapchain is rebuilt at the next `begin_frame`
    pub fn on_resize(&mut self, width: u32, height: u32) {
        log::debug!("Resize to {}x{} pending", width, height);
        self.pending_resize = Some((width, height));
    }

    /// Start a frame
    ///
    /// Returns `false` when there is nothing to render into this time: the
    /// surface has zero size, or the swapchain was out of date and has just
    /// been rebuilt.
    pub fn begin_frame(&mut self) -> VulkanResult<bool> {
        if self.frame.is_some() {
            return Err(VulkanError::InvalidOperation {
                reason: "begin_frame called while a frame is being recorded".to_string(),
            });
        }

        if let Some((width, height)) = self.pending_resize.take() {
            self.swapchain.on_resize(width, height)?;
        }

        self.textures.clear();
        self.stats = FrameStats::default();

        let Some(image_index) = self.swapchain.acquire_next_image()? else {
            return Ok(false);
        };
        let command_buffer = self.swapchain.begin_recording(image_index)?;
        let serial = self
            .swapchain
            .frame_state(image_index)
            .map_or(0, |state| state.serial());

        self.frame = Some(FrameContext {
            image_index,
            serial,
            command_buffer,
        });
        self.pass = ActivePass::None;
        Ok(true)
    }

    /// Begin a pass into an off-screen target
    ///
    /// Must come before the first swapchain draw of the frame.
    pub fn begin_offscreen_pass(&mut self, target: &RenderTarget) -> VulkanResult<()> {
        let frame = self.active_frame()?;
        if self.pass != ActivePass::None {
            return Err(VulkanError::InvalidOperation {
                reason: format!("cannot begin an off-screen pass inside {:?}", self.pass),
            });
        }

        let device = self.context.device();
        device.record(
            frame.command_buffer,
            Command::BeginRenderPass {
                render_pass: target.render_pass(),
                framebuffer: target.framebuffer(),
                extent: target.extent(),
                clear_color: self.clear_color,
                clear_depth: self.clear_depth,
            },
        );
        device.record(frame.command_buffer, Command::SetViewport(target.viewport()));
        device.record(frame.command_buffer, Command::SetScissor(target.scissor()));

        self.pass = ActivePass::Offscreen {
            pass_id: target.pass_id(),
            render_pass: target.render_pass(),
        };
        Ok(())
    }

    /// End the off-screen pass
    pub fn end_offscreen_pass(&mut self) -> VulkanResult<()> {
        let frame = self.active_frame()?;
        if !matches!(self.pass, ActivePass::Offscreen { .. }) {
            return Err(VulkanError::InvalidOperation {
                reason: "no off-screen pass to end".to_string(),
            });
        }
        self.context.device().record(frame.command_buffer, Command::EndRenderPass);
        self.pass = ActivePass::None;
        Ok(())
    }

    /// Bind a texture to a texture unit for the rest of the frame
    pub fn set_texture(&mut self, unit: u32, texture: Arc<Texture>) {
        let unit = unit as usize;
        if self.textures.len() <= unit {
            self.textures.resize(unit + 1, None);
        }
        self.textures[unit] = Some(texture);
    }

    /// Draw a renderable with a program and material
    ///
    /// A renderable whose pipeline cannot be built is skipped with an error
    /// log; the frame carries on.
    pub fn draw(
        &mut self,
        renderable: &mut Renderable,
        program: &mut ShaderProgram,
        material: &Material,
        globals: &dyn GlobalUniforms,
    ) -> VulkanResult<()> {
        let frame = self.active_frame()?;
        let (pass_id, render_pass) = self.target_pass()?;

        let pipeline = match renderable.ensure_pipeline(pass_id, render_pass, program) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                log::error!("Skipping draw of '{}': {}", material.name(), err);
                return Ok(());
            }
        };

        self.resolve_uniforms(program, material, globals);
        let set = program.update_uniform_buffers(&frame, &self.textures, &self.fallback)?;

        let device = self.context.device();
        device.record(frame.command_buffer, Command::BindPipeline(pipeline));
        device.record(
            frame.command_buffer,
            Command::BindDescriptorSet {
                layout: program.pipeline_layout(),
                set,
            },
        );
        renderable.record_draw(device.as_ref(), frame.command_buffer)?;

        self.stats.draw_calls += 1;
        self.stats.triangles += renderable.triangle_count();
        Ok(())
    }

    /// Finish the frame: close the swapchain pass, submit and present
    pub fn end_frame(&mut self) -> VulkanResult<()> {
        self.active_frame()?;

        if matches!(self.pass, ActivePass::Offscreen { .. }) {
            log::warn!("Off-screen pass still open at end of frame, ending it");
            self.end_offscreen_pass()?;
        }
        if self.pass == ActivePass::None {
            // Nothing drawn to the swapchain, still clear it
            self.swapchain.begin_render_pass(self.clear_color, self.clear_depth)?;
        }

        self.frame = None;
        self.pass = ActivePass::None;
        self.last_stats = self.stats;

        self.swapchain.end_render_pass()?;
        self.swapchain.submit()?;
        self.swapchain.present()
    }

    /// Compile, reflect and link a program using the configured descriptor pool size
    pub fn create_program(
        &self,
        compiler: &dyn ShaderCompiler,
        vertex_source: &str,
        fragment_source: &str,
    ) -> VulkanResult<ShaderProgram> {
        let mut program = create_shader_program(&self.context, compiler, vertex_source, fragment_source)?;
        program.set_sets_per_pool(self.sets_per_pool);
        Ok(program)
    }

    /// Statistics of the last finished frame
    pub const fn frame_stats(&self) -> FrameStats {
        self.last_stats
    }

    /// Whether a frame is being recorded
    pub const fn is_frame_active(&self) -> bool {
        self.frame.is_some()
    }

    /// Swapchain
    pub const fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Device context
    pub const fn context(&self) -> &DeviceContext {
        &self.context
    }

    /// Texture sampled by units nothing is bound to
    pub fn fallback_texture(&self) -> &Arc<Texture> {
        &self.fallback
    }

    fn active_frame(&self) -> VulkanResult<FrameContext> {
        self.frame.ok_or_else(|| VulkanError::InvalidOperation {
            reason: "no frame is being recorded".to_string(),
        })
    }

    fn target_pass(&mut self) -> VulkanResult<(RenderPassId, vk::RenderPass)> {
        match self.pass {
            ActivePass::Offscreen { pass_id, render_pass } => Ok((pass_id, render_pass)),
            ActivePass::None | ActivePass::Swapchain => {
                if self.pass == ActivePass::None {
                    self.swapchain.begin_render_pass(self.clear_color, self.clear_depth)?;
                    self.pass = ActivePass::Swapchain;
                }
                match (self.swapchain.pass_id(), self.swapchain.render_pass()) {
                    (Some(pass_id), Some(render_pass)) => Ok((pass_id, render_pass)),
                    _ => Err(VulkanError::InvalidOperation {
                        reason: "swapchain has no render pass".to_string(),
                    }),
                }
            }
        }
    }

    fn resolve_uniforms(&mut self, program: &mut ShaderProgram, material: &Material, globals: &dyn GlobalUniforms) {
        let samplers: Vec<String> = program.sampler_names().map(str::to_string).collect();
        for name in &samplers {
            let Some(texture) = material.texture(name) else {
                continue;
            };
            if let Some(unit) = program.uniform(name).and_then(|uniform| uniform.texture_unit()) {
                self.set_texture(unit, texture.clone());
            }
        }

        let mut names: Vec<String> = program
            .uniforms()
            .filter(|uniform| uniform.uniform_type() != UniformType::Texture)
            .map(|uniform| uniform.name().to_string())
            .collect();
        names.sort_unstable();
        names.dedup();

        // Values missing from both tables fall back to their defaults so
        // nothing carries over from the previous draw
        for name in &names {
            match globals.global_uniform_value(name).or_else(|| material.value(name)) {
                Some(bytes) => program.set_uniform(name, bytes),
                None => program.reset_uniform(name),
            }
        }
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        if let Err(err) = self.context.wait_idle() {
            log::error!("Failed to wait for device idle before destroying renderer: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::headless::DeviceEvent;
    use crate::render::backends::vulkan::rendering::shader::tests::{fragment_stage, vertex_stage};
    use crate::render::backends::vulkan::{DescriptorWrite, HeadlessDevice, ObjectKind};
    use crate::render::image_data::PixelFormat;
    use crate::render::material::{GlobalUniformTable, NoGlobals, UniformValue};
    use crate::render::mesh::{Topology, VertexElement, VertexFormat, VertexSemantic};
    use approx::assert_relative_eq;

    struct Fixture {
        device: Arc<HeadlessDevice>,
        context: DeviceContext,
        renderer: VulkanRenderer,
        program: ShaderProgram,
        quad: Renderable,
    }

    fn fixture() -> Fixture {
        let device = Arc::new(HeadlessDevice::default());
        let context = DeviceContext::with_device(device.clone()).unwrap();
        let config = RendererConfig::new("renderer test").with_screen_size(800, 600);
        let renderer = VulkanRenderer::new(&context, &config).unwrap();

        let mut program = ShaderProgram::new(&context, 8);
        program.link(&[vertex_stage(), fragment_stage()]).unwrap();

        let mut quad = Renderable::new(
            &context,
            vec![
                VertexElement::new(VertexSemantic::Position, VertexFormat::Float3),
                VertexElement::new(VertexSemantic::TexCoord0, VertexFormat::Float2),
            ],
            Topology::TriangleList,
        );
        let vertices: [f32; 20] = [
            -1.0, -1.0, 0.0, 0.0, 0.0, //
            1.0, -1.0, 0.0, 1.0, 0.0, //
            1.0, 1.0, 0.0, 1.0, 1.0, //
            -1.0, 1.0, 0.0, 0.0, 1.0,
        ];
        quad.set_vertices(bytemuck::cast_slice(&vertices)).unwrap();
        quad.set_indices_u16(&[0, 1, 2, 2, 3, 0]).unwrap();

        Fixture {
            device,
            context,
            renderer,
            program,
            quad,
        }
    }

    fn red_material() -> Material {
        Material::new("red").with_value("u_Color", &UniformValue::Vec4([1.0, 0.0, 0.0, 1.0]))
    }

    #[test]
    fn test_draw_records_binds_and_indexed_draw() {
        let mut f = fixture();
        assert!(f.renderer.begin_frame().unwrap());
        f.renderer
            .draw(&mut f.quad, &mut f.program, &red_material(), &NoGlobals)
            .unwrap();

        let command_buffer = f.renderer.swapchain().command_buffers()[0];
        let commands = f.device.recorded_commands(command_buffer);
        assert!(matches!(commands[0], Command::BeginRenderPass { .. }));
        assert!(matches!(commands[1], Command::SetViewport(_)));
        assert!(matches!(commands[2], Command::SetScissor(_)));
        assert!(matches!(commands[3], Command::BindPipeline(_)));
        assert!(matches!(commands[4], Command::BindDescriptorSet { .. }));
        assert!(matches!(commands[5], Command::BindVertexBuffer(_)));
        assert!(matches!(
            commands[6],
            Command::BindIndexBuffer {
                index_type: vk::IndexType::UINT16,
                ..
            }
        ));
        assert!(matches!(commands[7], Command::DrawIndexed { index_count: 6, .. }));

        f.renderer.end_frame().unwrap();
        assert_eq!(
            f.renderer.frame_stats(),
            FrameStats {
                draw_calls: 1,
                triangles: 2
            }
        );

        let color: &[f32] = bytemuck::cast_slice(&f.program.block_bytes(1).unwrap()[..16]);
        assert_relative_eq!(color[0], 1.0);
        assert_relative_eq!(color[3], 1.0);
    }

    #[test]
    fn test_globals_win_over_material_values() {
        let mut f = fixture();
        let mut globals = GlobalUniformTable::new();
        globals.set("u_Color", &UniformValue::Vec4([0.0, 0.0, 1.0, 1.0]));

        assert!(f.renderer.begin_frame().unwrap());
        f.renderer
            .draw(&mut f.quad, &mut f.program, &red_material(), &globals)
            .unwrap();
        f.renderer.end_frame().unwrap();

        let color: &[f32] = bytemuck::cast_slice(&f.program.block_bytes(1).unwrap()[..16]);
        assert_relative_eq!(color[0], 0.0);
        assert_relative_eq!(color[2], 1.0);
    }

    #[test]
    fn test_unset_uniform_falls_back_to_default() {
        let mut f = fixture();
        assert!(f.renderer.begin_frame().unwrap());
        f.renderer
            .draw(&mut f.quad, &mut f.program, &red_material(), &NoGlobals)
            .unwrap();
        f.device.clear_events();
        f.renderer
            .draw(&mut f.quad, &mut f.program, &Material::new("plain"), &NoGlobals)
            .unwrap();
        f.renderer.end_frame().unwrap();

        let color: &[f32] = bytemuck::cast_slice(&f.program.block_bytes(1).unwrap()[..16]);
        for channel in color {
            assert_relative_eq!(*channel, 0.0);
        }

        // The second draw's slot holds zeros too
        let uniform_buffer = f
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
        let uploaded = f.device.buffer_contents(uniform_buffer).unwrap();
        assert!(uploaded[..16].iter().all(|&byte| byte == 0));

        // Texture units survive the reset
        assert_eq!(f.program.uniform("u_Albedo").unwrap().texture_unit(), Some(0));
    }

    #[test]
    fn test_empty_frame_still_clears_and_presents() {
        let mut f = fixture();
        f.device.clear_events();
        assert!(f.renderer.begin_frame().unwrap());
        f.renderer.end_frame().unwrap();

        let command_buffer = f.renderer.swapchain().command_buffers()[0];
        let commands = f.device.recorded_commands(command_buffer);
        assert_eq!(commands.len(), 4);
        assert!(matches!(commands[3], Command::EndRenderPass));
        assert_eq!(
            f.device
                .events()
                .iter()
                .filter(|e| matches!(e, DeviceEvent::Present { .. }))
                .count(),
            1
        );
        assert_eq!(f.renderer.frame_stats(), FrameStats::default());
    }

    #[test]
    fn test_material_texture_is_bound_through_its_unit() {
        let mut f = fixture();
        let green = Arc::new(Texture::solid_color(&f.context, [0, 255, 0, 255]).unwrap());
        let mut material = red_material();
        material.set_texture("u_Albedo", green.clone());

        assert!(f.renderer.begin_frame().unwrap());
        f.device.clear_events();
        f.renderer.draw(&mut f.quad, &mut f.program, &material, &NoGlobals).unwrap();

        let writes: Vec<DescriptorWrite> = f
            .device
            .events()
            .into_iter()
            .filter_map(|event| match event {
                DeviceEvent::UpdateDescriptorSet(_, writes) => Some(writes),
                _ => None,
            })
            .flatten()
            .collect();
        assert!(writes.iter().any(|write| matches!(
            write,
            DescriptorWrite::CombinedImageSampler { binding: 2, view, .. } if *view == green.view()
        )));
        f.renderer.end_frame().unwrap();
    }

    #[test]
    fn test_unbound_unit_uses_fallback_texture() {
        let mut f = fixture();
        assert!(f.renderer.begin_frame().unwrap());
        f.device.clear_events();
        f.renderer
            .draw(&mut f.quad, &mut f.program, &red_material(), &NoGlobals)
            .unwrap();

        let fallback_view = f.renderer.fallback_texture().view();
        assert!(f.device.events().iter().any(|event| matches!(
            event,
            DeviceEvent::UpdateDescriptorSet(_, writes) if writes.iter().any(|w| matches!(
                w,
                DescriptorWrite::CombinedImageSampler { view, .. } if *view == fallback_view
            ))
        )));
        f.renderer.end_frame().unwrap();
    }

    #[test]
    fn test_pipeline_failure_skips_the_draw() {
        let mut f = fixture();
        f.device.fail_pipeline_creation(1);
        assert!(f.renderer.begin_frame().unwrap());
        f.renderer
            .draw(&mut f.quad, &mut f.program, &red_material(), &NoGlobals)
            .unwrap();
        f.renderer.end_frame().unwrap();
        assert_eq!(f.renderer.frame_stats().draw_calls, 0);

        // The next frame retries and succeeds
        assert!(f.renderer.begin_frame().unwrap());
        f.renderer
            .draw(&mut f.quad, &mut f.program, &red_material(), &NoGlobals)
            .unwrap();
        f.renderer.end_frame().unwrap();
        assert_eq!(f.renderer.frame_stats().draw_calls, 1);
    }

    #[test]
    fn test_draw_outside_frame_is_an_error() {
        let mut f = fixture();
        assert!(f
            .renderer
            .draw(&mut f.quad, &mut f.program, &red_material(), &NoGlobals)
            .is_err());
        assert!(f.renderer.end_frame().is_err());
        assert!(f.renderer.begin_frame().unwrap());
        assert!(f.renderer.begin_frame().is_err());
    }

    #[test]
    fn test_pending_resize_applies_at_frame_start() {
        let mut f = fixture();
        let created = f.device.created_count(ObjectKind::Swapchain);

        f.renderer.on_resize(1024, 768);
        assert_eq!(f.device.created_count(ObjectKind::Swapchain), created);

        f.device.set_surface_extent(None);
        assert!(f.renderer.begin_frame().unwrap());
        assert_eq!(f.device.created_count(ObjectKind::Swapchain), created + 1);
        assert_eq!(f.renderer.swapchain().extent().width, 1024);
        f.renderer.end_frame().unwrap();
    }

    #[test]
    fn test_minimized_surface_skips_frames() {
        let mut f = fixture();
        f.device.set_surface_extent(Some((0, 0)));
        f.renderer.on_resize(0, 0);
        assert!(!f.renderer.begin_frame().unwrap());
        assert!(!f.renderer.is_frame_active());

        f.device.set_surface_extent(None);
        f.renderer.on_resize(640, 480);
        assert!(f.renderer.begin_frame().unwrap());
        f.renderer.end_frame().unwrap();
    }

    #[test]
    fn test_out_of_date_acquire_skips_one_frame() {
        let mut f = fixture();
        f.device.fail_acquire_out_of_date(1);
        assert!(!f.renderer.begin_frame().unwrap());
        assert!(f.renderer.begin_frame().unwrap());
        f.renderer.end_frame().unwrap();
    }

    #[test]
    fn test_offscreen_pass_keys_pipeline_by_target() {
        let mut f = fixture();
        let target = RenderTarget::new(&f.context, 256, 256, PixelFormat::Rgba8Unorm).unwrap();

        assert!(f.renderer.begin_frame().unwrap());
        f.renderer.begin_offscreen_pass(&target).unwrap();
        f.renderer
            .draw(&mut f.quad, &mut f.program, &red_material(), &NoGlobals)
            .unwrap();
        assert_eq!(f.quad.pipeline_cache().key().map(|k| k.pass), Some(target.pass_id()));
        f.renderer.end_offscreen_pass().unwrap();

        f.renderer
            .draw(&mut f.quad, &mut f.program, &red_material(), &NoGlobals)
            .unwrap();
        assert_eq!(f.quad.pipeline_cache().key().map(|k| k.pass), f.renderer.swapchain().pass_id());
        assert_eq!(f.quad.pipeline_cache().build_count(), 2);

        // A swapchain pass is open now, an off-screen pass cannot start
        assert!(f.renderer.begin_offscreen_pass(&target).is_err());
        f.renderer.end_frame().unwrap();
        assert_eq!(f.renderer.frame_stats().draw_calls, 2);
    }

    #[test]
    fn test_texture_units_reset_each_frame() {
        let mut f = fixture();
        let texture = Arc::new(Texture::solid_color(&f.context, [9, 9, 9, 255]).unwrap());
        assert!(f.renderer.begin_frame().unwrap());
        f.renderer.set_texture(3, texture);
        assert_eq!(f.renderer.textures.len(), 4);
        f.renderer.end_frame().unwrap();

        assert!(f.renderer.begin_frame().unwrap());
        assert!(f.renderer.textures.is_empty());
        f.renderer.end_frame().unwrap();
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let device = Arc::new(HeadlessDevice::default());
        let context = DeviceContext::with_device(device).unwrap();
        let config = RendererConfig::new("bad").with_screen_size(0, 600);
        assert!(matches!(
            VulkanRenderer::new(&context, &config),
            Err(VulkanError::InitializationFailed(_))
        ));
    }
}
