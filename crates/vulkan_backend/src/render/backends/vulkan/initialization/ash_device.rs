//! `GpuDevice` implementation backed by a real Vulkan device

use super::context::{
    LogicalDevice, PhysicalDeviceInfo, SurfaceProvider, VulkanError, VulkanInstance, VulkanResult,
};
use crate::render::backends::vulkan::device::{
    AcquireOutcome, Command, DescriptorWrite, GpuDevice, GraphicsPipelineDesc, PresentOutcome, QueueSetup,
    RenderPassDesc, SubmitDesc, SurfaceSupport, SwapchainDesc,
};
use ash::extensions::khr::Surface;
use ash::vk;
use std::ffi::CStr;

const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// Vulkan device created for a window surface
pub struct AshDevice {
    surface: vk::SurfaceKHR,
    surface_loader: Surface,
    physical_device: PhysicalDeviceInfo,
    device: LogicalDevice,
    // Only held so it is dropped after the logical device
    _instance: VulkanInstance,
}

impl AshDevice {
    /// Create instance, surface, physical and logical device for a window
    pub fn new(window: &mut dyn SurfaceProvider, app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        let extensions = window.required_instance_extensions()?;
        let instance = VulkanInstance::new(&extensions, app_name, enable_validation)?;

        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface = window.create_surface(&instance.entry, &instance.instance)?;

        let physical_device =
            match PhysicalDeviceInfo::select_suitable_device(&instance.instance, surface, &surface_loader) {
                Ok(info) => info,
                Err(err) => {
                    unsafe { surface_loader.destroy_surface(surface, None) };
                    return Err(err);
                }
            };

        let device = match LogicalDevice::new(&instance.instance, &physical_device) {
            Ok(device) => device,
            Err(err) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(err);
            }
        };

        Ok(Self {
            surface,
            surface_loader,
            physical_device,
            device,
            _instance: instance,
        })
    }

    /// Physical device properties and limits
    pub const fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    fn raw(&self) -> &ash::Device {
        &self.device.device
    }
}

impl Drop for AshDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device.device_wait_idle();
            self.surface_loader.destroy_surface(self.surface, None);
        }
        // Fields drop in declaration order: the logical device goes before the instance.
    }
}

impl GpuDevice for AshDevice {
    fn queue_setup(&self) -> QueueSetup {
        QueueSetup {
            graphics_queue: self.device.graphics_queue,
            present_queue: self.device.present_queue,
            graphics_family: self.physical_device.graphics_family,
            present_family: self.physical_device.present_family,
        }
    }

    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        self.physical_device.memory_properties
    }

    fn surface_support(&self) -> VulkanResult<SurfaceSupport> {
        let pd = self.physical_device.device;
        unsafe {
            Ok(SurfaceSupport {
                capabilities: self
                    .surface_loader
                    .get_physical_device_surface_capabilities(pd, self.surface)?,
                formats: self.surface_loader.get_physical_device_surface_formats(pd, self.surface)?,
                present_modes: self
                    .surface_loader
                    .get_physical_device_surface_present_modes(pd, self.surface)?,
            })
        }
    }

    fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { Ok(self.raw().device_wait_idle()?) }
    }

    fn create_buffer(&self, info: &vk::BufferCreateInfo) -> VulkanResult<vk::Buffer> {
        unsafe { Ok(self.raw().create_buffer(info, None)?) }
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.raw().destroy_buffer(buffer, None) }
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        unsafe { self.raw().get_buffer_memory_requirements(buffer) }
    }

    fn allocate_memory(&self, size: vk::DeviceSize, memory_type_index: u32) -> VulkanResult<vk::DeviceMemory> {
        let info = vk::MemoryAllocateInfo::builder()
            .allocation_size(size)
            .memory_type_index(memory_type_index);
        unsafe { Ok(self.raw().allocate_memory(&info, None)?) }
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.raw().free_memory(memory, None) }
    }

    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory) -> VulkanResult<()> {
        unsafe { Ok(self.raw().bind_buffer_memory(buffer, memory, 0)?) }
    }

    fn write_memory(&self, memory: vk::DeviceMemory, offset: vk::DeviceSize, bytes: &[u8]) -> VulkanResult<()> {
        unsafe {
            let ptr = self.raw().map_memory(
                memory,
                offset,
                bytes.len() as vk::DeviceSize,
                vk::MemoryMapFlags::empty(),
            )?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            self.raw().unmap_memory(memory);
        }
        Ok(())
    }

    fn create_image(&self, info: &vk::ImageCreateInfo) -> VulkanResult<vk::Image> {
        unsafe { Ok(self.raw().create_image(info, None)?) }
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { self.raw().destroy_image(image, None) }
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        unsafe { self.raw().get_image_memory_requirements(image) }
    }

    fn bind_image_memory(&self, image: vk::Image, memory: vk::DeviceMemory) -> VulkanResult<()> {
        unsafe { Ok(self.raw().bind_image_memory(image, memory, 0)?) }
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VulkanResult<vk::ImageView> {
        unsafe { Ok(self.raw().create_image_view(info, None)?) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.raw().destroy_image_view(view, None) }
    }

    fn create_sampler(&self, info: &vk::SamplerCreateInfo) -> VulkanResult<vk::Sampler> {
        unsafe { Ok(self.raw().create_sampler(info, None)?) }
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.raw().destroy_sampler(sampler, None) }
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> VulkanResult<vk::RenderPass> {
        let mut attachments = vec![vk::AttachmentDescription::builder()
            .format(desc.color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(desc.color_final_layout)
            .build()];

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let mut subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);

        if let Some(depth_format) = desc.depth_format {
            attachments.push(
                vk::AttachmentDescription::builder()
                    .format(depth_format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .stencil_load_op(vk::AttachmentLoadOp::CLEAR)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                    .build(),
            );
            subpass = subpass.depth_stencil_attachment(&depth_ref);
        }

        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        let dependency = vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(stages)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(stages)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .build();

        let subpasses = [subpass.build()];
        let dependencies = [dependency];
        let info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        unsafe { Ok(self.raw().create_render_pass(&info, None)?) }
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.raw().destroy_render_pass(render_pass, None) }
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<vk::Framebuffer> {
        let info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        unsafe { Ok(self.raw().create_framebuffer(&info, None)?) }
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.raw().destroy_framebuffer(framebuffer, None) }
    }

    fn create_shader_module(&self, spirv: &[u32]) -> VulkanResult<vk::ShaderModule> {
        let info = vk::ShaderModuleCreateInfo::builder().code(spirv);
        unsafe { Ok(self.raw().create_shader_module(&info, None)?) }
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.raw().destroy_shader_module(module, None) }
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> VulkanResult<vk::DescriptorSetLayout> {
        let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(bindings);
        unsafe { Ok(self.raw().create_descriptor_set_layout(&info, None)?) }
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.raw().destroy_descriptor_set_layout(layout, None) }
    }

    fn create_pipeline_layout(&self, set_layouts: &[vk::DescriptorSetLayout]) -> VulkanResult<vk::PipelineLayout> {
        let info = vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts);
        unsafe { Ok(self.raw().create_pipeline_layout(&info, None)?) }
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.raw().destroy_pipeline_layout(layout, None) }
    }

    fn create_descriptor_pool(&self, max_sets: u32, sizes: &[vk::DescriptorPoolSize]) -> VulkanResult<vk::DescriptorPool> {
        let info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(sizes);
        unsafe { Ok(self.raw().create_descriptor_pool(&info, None)?) }
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.raw().destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VulkanResult<vk::DescriptorSet> {
        let layouts = [layout];
        let info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let sets = unsafe { self.raw().allocate_descriptor_sets(&info)? };
        sets.into_iter()
            .next()
            .ok_or(VulkanError::Api(vk::Result::ERROR_OUT_OF_POOL_MEMORY))
    }

    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
        // Infos must outlive the write structures that point at them.
        let buffer_infos: Vec<[vk::DescriptorBufferInfo; 1]> = writes
            .iter()
            .map(|write| match *write {
                DescriptorWrite::UniformBuffer { buffer, range, .. } => [vk::DescriptorBufferInfo {
                    buffer,
                    offset: 0,
                    range,
                }],
                DescriptorWrite::CombinedImageSampler { .. } => [vk::DescriptorBufferInfo::default()],
            })
            .collect();
        let image_infos: Vec<[vk::DescriptorImageInfo; 1]> = writes
            .iter()
            .map(|write| match *write {
                DescriptorWrite::CombinedImageSampler { view, sampler, .. } => [vk::DescriptorImageInfo {
                    sampler,
                    image_view: view,
                    image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                }],
                DescriptorWrite::UniformBuffer { .. } => [vk::DescriptorImageInfo::default()],
            })
            .collect();

        let native: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .enumerate()
            .map(|(i, write)| match *write {
                DescriptorWrite::UniformBuffer { binding, .. } => vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&buffer_infos[i])
                    .build(),
                DescriptorWrite::CombinedImageSampler { binding, .. } => vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_infos[i])
                    .build(),
            })
            .collect();

        unsafe { self.raw().update_descriptor_sets(&native, &[]) }
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> VulkanResult<vk::Pipeline> {
        let stages: Vec<vk::PipelineShaderStageCreateInfo> = desc
            .stages
            .iter()
            .map(|stage| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(stage.stage)
                    .module(stage.module)
                    .name(ENTRY_POINT)
                    .build()
            })
            .collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(desc.vertex_bindings)
            .vertex_attribute_descriptions(desc.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(desc.topology)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let blend_attachments = [*desc.color_blend];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&blend_attachments)
            .blend_constants(desc.blend_constants);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(desc.rasterization)
            .multisample_state(desc.multisample)
            .depth_stencil_state(desc.depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(desc.layout)
            .render_pass(desc.render_pass)
            .subpass(desc.subpass)
            .build();

        let pipelines = unsafe {
            self.raw()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
                .map_err(|(_, err)| err)?
        };
        pipelines
            .into_iter()
            .next()
            .ok_or(VulkanError::Api(vk::Result::ERROR_INITIALIZATION_FAILED))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.raw().destroy_pipeline(pipeline, None) }
    }

    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::builder().flags(flags);
        unsafe { Ok(self.raw().create_fence(&info, None)?) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.raw().destroy_fence(fence, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VulkanResult<()> {
        unsafe { Ok(self.raw().wait_for_fences(&[fence], true, timeout)?) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()> {
        unsafe { Ok(self.raw().reset_fences(&[fence])?) }
    }

    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::builder();
        unsafe { Ok(self.raw().create_semaphore(&info, None)?) }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.raw().destroy_semaphore(semaphore, None) }
    }

    fn create_command_pool(&self, queue_family: u32) -> VulkanResult<vk::CommandPool> {
        let info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family);
        unsafe { Ok(self.raw().create_command_pool(&info, None)?) }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.raw().destroy_command_pool(pool, None) }
    }

    fn allocate_command_buffers(&self, pool: vk::CommandPool, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        unsafe { Ok(self.raw().allocate_command_buffers(&info)?) }
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        if !buffers.is_empty() {
            unsafe { self.raw().free_command_buffers(pool, buffers) }
        }
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer, one_time: bool) -> VulkanResult<()> {
        let flags = if one_time {
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
        } else {
            vk::CommandBufferUsageFlags::empty()
        };
        let info = vk::CommandBufferBeginInfo::builder().flags(flags);
        unsafe {
            self.raw()
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())?;
            Ok(self.raw().begin_command_buffer(command_buffer, &info)?)
        }
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        unsafe { Ok(self.raw().end_command_buffer(command_buffer)?) }
    }

    fn record(&self, cb: vk::CommandBuffer, command: Command) {
        let device = self.raw();
        unsafe {
            match command {
                Command::BeginRenderPass {
                    render_pass,
                    framebuffer,
                    extent,
                    clear_color,
                    clear_depth,
                } => {
                    let clear_values = [
                        vk::ClearValue {
                            color: vk::ClearColorValue { float32: clear_color },
                        },
                        vk::ClearValue {
                            depth_stencil: vk::ClearDepthStencilValue {
                                depth: clear_depth,
                                stencil: 0,
                            },
                        },
                    ];
                    let info = vk::RenderPassBeginInfo::builder()
                        .render_pass(render_pass)
                        .framebuffer(framebuffer)
                        .render_area(vk::Rect2D {
                            offset: vk::Offset2D { x: 0, y: 0 },
                            extent,
                        })
                        .clear_values(&clear_values);
                    device.cmd_begin_render_pass(cb, &info, vk::SubpassContents::INLINE);
                }
                Command::EndRenderPass => device.cmd_end_render_pass(cb),
                Command::BindPipeline(pipeline) => {
                    device.cmd_bind_pipeline(cb, vk::PipelineBindPoint::GRAPHICS, pipeline);
                }
                Command::BindDescriptorSet { layout, set } => device.cmd_bind_descriptor_sets(
                    cb,
                    vk::PipelineBindPoint::GRAPHICS,
                    layout,
                    0,
                    &[set],
                    &[],
                ),
                Command::SetViewport(viewport) => device.cmd_set_viewport(cb, 0, &[viewport]),
                Command::SetScissor(scissor) => device.cmd_set_scissor(cb, 0, &[scissor]),
                Command::BindVertexBuffer(buffer) => device.cmd_bind_vertex_buffers(cb, 0, &[buffer], &[0]),
                Command::BindIndexBuffer { buffer, index_type } => {
                    device.cmd_bind_index_buffer(cb, buffer, 0, index_type);
                }
                Command::Draw {
                    vertex_count,
                    first_vertex,
                } => device.cmd_draw(cb, vertex_count, 1, first_vertex, 0),
                Command::DrawIndexed {
                    index_count,
                    first_index,
                    vertex_offset,
                } => device.cmd_draw_indexed(cb, index_count, 1, first_index, vertex_offset, 0),
                Command::PipelineBarrier(barrier) => {
                    let native = vk::ImageMemoryBarrier::builder()
                        .old_layout(barrier.old_layout)
                        .new_layout(barrier.new_layout)
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .image(barrier.image)
                        .subresource_range(vk::ImageSubresourceRange {
                            aspect_mask: barrier.aspect,
                            base_mip_level: 0,
                            level_count: barrier.mip_levels,
                            base_array_layer: 0,
                            layer_count: 1,
                        })
                        .src_access_mask(barrier.src_access)
                        .dst_access_mask(barrier.dst_access)
                        .build();
                    device.cmd_pipeline_barrier(
                        cb,
                        barrier.src_stage,
                        barrier.dst_stage,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        &[native],
                    );
                }
                Command::CopyBufferToImage { buffer, image, extent } => {
                    let region = vk::BufferImageCopy::builder()
                        .buffer_offset(0)
                        .buffer_row_length(0)
                        .buffer_image_height(0)
                        .image_subresource(vk::ImageSubresourceLayers {
                            aspect_mask: vk::ImageAspectFlags::COLOR,
                            mip_level: 0,
                            base_array_layer: 0,
                            layer_count: 1,
                        })
                        .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                        .image_extent(extent)
                        .build();
                    device.cmd_copy_buffer_to_image(
                        cb,
                        buffer,
                        image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                    );
                }
            }
        }
    }

    fn queue_submit(&self, queue: vk::Queue, submit: &SubmitDesc) -> VulkanResult<()> {
        let command_buffers = [submit.command_buffer];
        let (wait_semaphores, wait_stages): (Vec<_>, Vec<_>) = submit.wait.into_iter().unzip();
        let signal_semaphores: Vec<_> = submit.signal.into_iter().collect();

        let info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe { Ok(self.raw().queue_submit(queue, &[info], submit.fence)?) }
    }

    fn queue_wait_idle(&self, queue: vk::Queue) -> VulkanResult<()> {
        unsafe { Ok(self.raw().queue_wait_idle(queue)?) }
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VulkanResult<vk::SwapchainKHR> {
        let info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.surface)
            .min_image_count(desc.min_image_count)
            .image_format(desc.surface_format.format)
            .image_color_space(desc.surface_format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(desc.sharing_mode)
            .queue_family_indices(&desc.queue_family_indices)
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true);

        unsafe { Ok(self.device.swapchain_loader.create_swapchain(&info, None)?) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.device.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VulkanResult<Vec<vk::Image>> {
        unsafe { Ok(self.device.swapchain_loader.get_swapchain_images(swapchain)?) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VulkanResult<AcquireOutcome> {
        let result = unsafe {
            self.device
                .swapchain_loader
                .acquire_next_image(swapchain, timeout, semaphore, vk::Fence::null())
        };
        match result {
            Ok((index, suboptimal)) => Ok(AcquireOutcome::Acquired { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(err) => Err(err.into()),
        }
    }

    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VulkanResult<PresentOutcome> {
        let wait_semaphores = [wait];
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.device.swapchain_loader.queue_present(queue, &info) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(err) => Err(err.into()),
        }
    }
}
