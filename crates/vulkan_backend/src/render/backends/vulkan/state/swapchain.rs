//! Vulkan swapchain management
//!
//! The swapchain owns every per-image resource needed to render a frame: image
//! views, a shared depth attachment, the render pass, one framebuffer, command
//! buffer and fence per image, and the two frame semaphores. These always exist
//! as a complete set. Resizing waits for the device to go idle, destroys the
//! whole set and builds a new one.

use super::sync::{Fence, FramePhase, FrameState, Semaphore};
use crate::render::backends::vulkan::resources::image::{full_scissor, full_viewport, GpuImage, ImageDesc, DEPTH_FORMAT};
use crate::render::backends::vulkan::{
    AcquireOutcome, Command, CommandPool, DeviceContext, DeviceRef, QueueSetup, RenderPassDesc, SubmitDesc,
    SwapchainDesc, VulkanError, VulkanResult,
};
use ash::vk;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_PASS_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a render pass, unique for the life of the process
///
/// A rebuilt swapchain gets a new identity even if the driver reuses the
/// native handle value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPassId(u64);

impl RenderPassId {
    /// Allocate a fresh identity
    pub fn next() -> Self {
        Self(NEXT_PASS_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// First supported surface format; a lone `UNDEFINED` means any format is accepted
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    match formats {
        [] => vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        },
        [only] if only.format == vk::Format::UNDEFINED => vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        },
        [first, ..] => *first,
    }
}

/// Surface extent, or `requested` clamped to the surface limits when the surface leaves it open
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, requested: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: requested.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: requested.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// Concurrent sharing across both families when graphics and present differ
pub fn sharing_for(queues: &QueueSetup) -> (vk::SharingMode, Vec<u32>) {
    if queues.shares_family() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (
            vk::SharingMode::CONCURRENT,
            vec![queues.graphics_family, queues.present_family],
        )
    }
}

/// Every resource tied to one swapchain generation
struct FrameTargets {
    device: DeviceRef,
    command_pool: Arc<CommandPool>,
    swapchain: vk::SwapchainKHR,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    depth: Option<GpuImage>,
    render_pass: vk::RenderPass,
    pass_id: RenderPassId,
    framebuffers: Vec<vk::Framebuffer>,
    command_buffers: Vec<vk::CommandBuffer>,
    fences: Vec<Fence>,
    frames: Vec<FrameState>,
    image_available: Option<Semaphore>,
    render_finished: Option<Semaphore>,
}

impl FrameTargets {
    /// Build a complete set, or `None` when the surface has zero area
    ///
    /// On failure everything created so far is destroyed by `Drop`.
    fn build(context: &DeviceContext, requested: vk::Extent2D) -> VulkanResult<Option<Self>> {
        let device = context.device().clone();
        let support = device.surface_support()?;
        let extent = choose_extent(&support.capabilities, requested);
        if extent.width == 0 || extent.height == 0 {
            log::debug!("Surface has zero area, swapchain not created");
            return Ok(None);
        }

        let format = choose_surface_format(&support.formats);
        let (sharing_mode, queue_family_indices) = sharing_for(&context.queues());

        let mut targets = Self {
            device: device.clone(),
            command_pool: context.command_pool().clone(),
            swapchain: vk::SwapchainKHR::null(),
            format,
            extent,
            images: Vec::new(),
            views: Vec::new(),
            depth: None,
            render_pass: vk::RenderPass::null(),
            pass_id: RenderPassId::next(),
            framebuffers: Vec::new(),
            command_buffers: Vec::new(),
            fences: Vec::new(),
            frames: Vec::new(),
            image_available: None,
            render_finished: None,
        };

        targets.swapchain = device.create_swapchain(&SwapchainDesc {
            surface_format: format,
            present_mode: vk::PresentModeKHR::FIFO,
            extent,
            min_image_count: support.capabilities.min_image_count,
            pre_transform: support.capabilities.current_transform,
            sharing_mode,
            queue_family_indices,
        })?;
        targets.images = device.swapchain_images(targets.swapchain)?;

        for &image in &targets.images {
            let info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = device.create_image_view(&info)?;
            targets.views.push(view);
        }

        let depth = GpuImage::new(context, ImageDesc::depth_attachment(extent.width, extent.height))?;
        let depth_view = depth.view();
        targets.depth = Some(depth);

        targets.render_pass = device.create_render_pass(&RenderPassDesc {
            color_format: format.format,
            depth_format: Some(DEPTH_FORMAT),
            color_final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        })?;

        for i in 0..targets.views.len() {
            let framebuffer = device.create_framebuffer(targets.render_pass, &[targets.views[i], depth_view], extent)?;
            targets.framebuffers.push(framebuffer);
        }

        targets.command_buffers = targets.command_pool.allocate(targets.images.len() as u32)?;

        for _ in 0..targets.images.len() {
            targets.fences.push(Fence::new(device.clone(), true)?);
        }
        targets.frames = vec![FrameState::default(); targets.images.len()];

        targets.image_available = Some(Semaphore::new(device.clone())?);
        targets.render_finished = Some(Semaphore::new(device)?);

        log::info!(
            "Created swapchain {}x{} with {} images ({:?})",
            extent.width,
            extent.height,
            targets.images.len(),
            format.format
        );
        Ok(Some(targets))
    }

    fn semaphores(&self) -> VulkanResult<(vk::Semaphore, vk::Semaphore)> {
        match (&self.image_available, &self.render_finished) {
            (Some(available), Some(finished)) => Ok((available.handle(), finished.handle())),
            _ => Err(VulkanError::InvalidOperation {
                reason: "swapchain semaphores missing".to_string(),
            }),
        }
    }
}

impl Drop for FrameTargets {
    fn drop(&mut self) {
        self.fences.clear();
        self.image_available = None;
        self.render_finished = None;
        self.command_pool.free(&self.command_buffers);
        for &framebuffer in &self.framebuffers {
            self.device.destroy_framebuffer(framebuffer);
        }
        if self.render_pass != vk::RenderPass::null() {
            self.device.destroy_render_pass(self.render_pass);
        }
        self.depth = None;
        for &view in &self.views {
            self.device.destroy_image_view(view);
        }
        if self.swapchain != vk::SwapchainKHR::null() {
            self.device.destroy_swapchain(self.swapchain);
        }
    }
}

/// Swapchain with its frame targets and per-image synchronization
pub struct Swapchain {
    context: DeviceContext,
    targets: Option<FrameTargets>,
    requested_extent: vk::Extent2D,
    current_image: Option<u32>,
    rebuild_after_present: bool,
}

impl Swapchain {
    /// Create a swapchain for the device surface
    pub fn new(context: &DeviceContext, extent: vk::Extent2D) -> VulkanResult<Self> {
        let targets = FrameTargets::build(context, extent)?;
        Ok(Self {
            context: context.clone(),
            targets,
            requested_extent: extent,
            current_image: None,
            rebuild_after_present: false,
        })
    }

    /// Rebuild for a new window size; a zero size leaves the swapchain torn down
    pub fn on_resize(&mut self, width: u32, height: u32) -> VulkanResult<()> {
        self.requested_extent = vk::Extent2D { width, height };
        self.rebuild()
    }

    /// Destroy and recreate every frame target
    pub fn rebuild(&mut self) -> VulkanResult<()> {
        self.context.wait_idle()?;
        self.current_image = None;
        self.rebuild_after_present = false;
        self.targets = None;
        self.targets = FrameTargets::build(&self.context, self.requested_extent)?;
        Ok(())
    }

    /// Whether frames can be rendered
    pub const fn is_ready(&self) -> bool {
        self.targets.is_some()
    }

    fn targets(&self) -> VulkanResult<&FrameTargets> {
        self.targets.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "swapchain has no frame targets".to_string(),
        })
    }

    fn current(&self) -> VulkanResult<(&FrameTargets, usize)> {
        let targets = self.targets()?;
        let index = self.current_image.ok_or_else(|| VulkanError::InvalidOperation {
            reason: "no swapchain image acquired".to_string(),
        })?;
        Ok((targets, index as usize))
    }

    fn transition(&mut self, index: u32, phase: FramePhase) {
        if let Some(frame) = self
            .targets
            .as_mut()
            .and_then(|targets| targets.frames.get_mut(index as usize))
        {
            frame.transition(index, phase);
        }
    }

    /// Acquire the next image
    ///
    /// Returns `None` when the frame must be skipped: the swapchain is torn
    /// down, or was out of date and has been rebuilt.
    pub fn acquire_next_image(&mut self) -> VulkanResult<Option<u32>> {
        let Some(targets) = &self.targets else {
            return Ok(None);
        };
        let (image_available, _) = targets.semaphores()?;
        let swapchain = targets.swapchain;

        match self
            .context
            .device()
            .acquire_next_image(swapchain, u64::MAX, image_available)?
        {
            AcquireOutcome::OutOfDate => {
                log::info!("Swapchain out of date at acquire, rebuilding");
                self.rebuild()?;
                Ok(None)
            }
            AcquireOutcome::Acquired { index, suboptimal } => {
                if suboptimal {
                    log::debug!("Swapchain suboptimal, rebuilding after present");
                    self.rebuild_after_present = true;
                }
                self.transition(index, FramePhase::Acquiring);
                Ok(Some(index))
            }
        }
    }

    /// Wait for image `index`'s previous submission, then begin its command buffer
    pub fn begin_recording(&mut self, index: u32) -> VulkanResult<vk::CommandBuffer> {
        let targets = self.targets.as_mut().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "swapchain has no frame targets".to_string(),
        })?;
        let slot = index as usize;
        let command_buffer = *targets
            .command_buffers
            .get(slot)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("image index {index} out of range"),
            })?;

        targets.fences[slot].wait(u64::MAX)?;
        targets.frames[slot].fence_waited();
        targets.frames[slot].transition(index, FramePhase::Recording);

        targets.device.begin_command_buffer(command_buffer, false)?;
        self.current_image = Some(index);
        log::trace!("Recording frame for image {}", index);
        Ok(command_buffer)
    }

    /// Record the swapchain render pass begin, viewport and scissor
    pub fn begin_render_pass(&self, clear_color: [f32; 4], clear_depth: f32) -> VulkanResult<()> {
        let (targets, index) = self.current()?;
        let command_buffer = targets.command_buffers[index];
        let device = &targets.device;
        device.record(
            command_buffer,
            Command::BeginRenderPass {
                render_pass: targets.render_pass,
                framebuffer: targets.framebuffers[index],
                extent: targets.extent,
                clear_color,
                clear_depth,
            },
        );
        device.record(command_buffer, Command::SetViewport(full_viewport(targets.extent)));
        device.record(command_buffer, Command::SetScissor(full_scissor(targets.extent)));
        Ok(())
    }

    /// Record the end of the swapchain render pass
    pub fn end_render_pass(&self) -> VulkanResult<()> {
        let (targets, index) = self.current()?;
        targets.device.record(targets.command_buffers[index], Command::EndRenderPass);
        Ok(())
    }

    /// End the command buffer and submit it
    ///
    /// Waits for the image to be available at color output, signals
    /// render-finished and the image's fence.
    pub fn submit(&mut self) -> VulkanResult<()> {
        let (targets, index) = self.current()?;
        let (image_available, render_finished) = targets.semaphores()?;
        let command_buffer = targets.command_buffers[index];

        targets.device.end_command_buffer(command_buffer)?;
        targets.fences[index].reset()?;
        targets.device.queue_submit(
            self.context.graphics_queue(),
            &SubmitDesc {
                command_buffer,
                wait: Some((image_available, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)),
                signal: Some(render_finished),
                fence: targets.fences[index].handle(),
            },
        )?;

        self.transition(index as u32, FramePhase::Submitted);
        Ok(())
    }

    /// Present the current image and drain the present queue
    ///
    /// Rebuilds the swapchain when presentation reports it out of date or
    /// suboptimal, or when the acquire did.
    pub fn present(&mut self) -> VulkanResult<()> {
        let (targets, index) = self.current()?;
        let (_, render_finished) = targets.semaphores()?;
        let swapchain = targets.swapchain;
        let index = index as u32;
        let device = self.context.device().clone();
        let present_queue = self.context.present_queue();

        self.transition(index, FramePhase::Presenting);
        let outcome = device.queue_present(present_queue, swapchain, index, render_finished)?;
        device.queue_wait_idle(present_queue)?;
        self.transition(index, FramePhase::Idle);
        self.current_image = None;

        if outcome.needs_rebuild() || self.rebuild_after_present {
            log::info!("Swapchain {:?} at present, rebuilding", outcome);
            self.rebuild()?;
        }
        Ok(())
    }

    /// Image being recorded, if any
    pub const fn current_image(&self) -> Option<u32> {
        self.current_image
    }

    /// Image size, zero while torn down
    pub fn extent(&self) -> vk::Extent2D {
        self.targets.as_ref().map_or(vk::Extent2D::default(), |t| t.extent)
    }

    /// Surface format
    pub fn format(&self) -> Option<vk::SurfaceFormatKHR> {
        self.targets.as_ref().map(|t| t.format)
    }

    /// Swapchain render pass
    pub fn render_pass(&self) -> Option<vk::RenderPass> {
        self.targets.as_ref().map(|t| t.render_pass)
    }

    /// Identity of the swapchain render pass
    pub fn pass_id(&self) -> Option<RenderPassId> {
        self.targets.as_ref().map(|t| t.pass_id)
    }

    /// Native swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.targets
            .as_ref()
            .map_or(vk::SwapchainKHR::null(), |t| t.swapchain)
    }

    /// Number of images
    pub fn image_count(&self) -> usize {
        self.targets.as_ref().map_or(0, |t| t.images.len())
    }

    /// Image views, one per image
    pub fn image_views(&self) -> &[vk::ImageView] {
        self.targets.as_ref().map_or(&[], |t| &t.views)
    }

    /// Framebuffers, one per image
    pub fn framebuffers(&self) -> &[vk::Framebuffer] {
        self.targets.as_ref().map_or(&[], |t| &t.framebuffers)
    }

    /// Command buffers, one per image
    pub fn command_buffers(&self) -> &[vk::CommandBuffer] {
        self.targets.as_ref().map_or(&[], |t| &t.command_buffers)
    }

    /// Fence handles, one per image
    pub fn fences(&self) -> Vec<vk::Fence> {
        self.targets
            .as_ref()
            .map_or_else(Vec::new, |t| t.fences.iter().map(Fence::handle).collect())
    }

    /// Frame state of image `index`
    pub fn frame_state(&self, index: u32) -> Option<FrameState> {
        self.targets
            .as_ref()
            .and_then(|t| t.frames.get(index as usize).copied())
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        if let Err(err) = self.context.wait_idle() {
            log::error!("Failed to wait for device idle before destroying swapchain: {}", err);
        }
        self.targets = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::headless::DeviceEvent;
    use crate::render::backends::vulkan::{HeadlessConfig, HeadlessDevice, ObjectKind};
    use ash::vk::Handle;

    fn setup(config: HeadlessConfig) -> (Arc<HeadlessDevice>, DeviceContext) {
        let device = Arc::new(HeadlessDevice::new(config));
        let context = DeviceContext::with_device(device.clone()).unwrap();
        (device, context)
    }

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn assert_complete_set(device: &HeadlessDevice, swapchain: &Swapchain) {
        let count = swapchain.image_count();
        assert!(count > 0);
        assert_eq!(swapchain.image_views().len(), count);
        assert_eq!(swapchain.framebuffers().len(), count);
        assert_eq!(swapchain.command_buffers().len(), count);
        assert_eq!(swapchain.fences().len(), count);

        assert_eq!(device.live_count(ObjectKind::Swapchain), 1);
        // color views plus the depth view
        assert_eq!(device.live_count(ObjectKind::ImageView), count + 1);
        assert_eq!(device.live_count(ObjectKind::Framebuffer), count);
        assert_eq!(device.live_count(ObjectKind::CommandBuffer), count);
        assert_eq!(device.live_count(ObjectKind::Fence), count);
        assert_eq!(device.live_count(ObjectKind::Semaphore), 2);
        assert_eq!(device.live_count(ObjectKind::RenderPass), 1);
    }

    #[test]
    fn test_surface_format_selection() {
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(choose_surface_format(&[srgb]), srgb);

        let undefined = vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(choose_surface_format(&[undefined]).format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn test_extent_clamped_when_surface_leaves_it_open() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(u32::MAX, u32::MAX),
            min_image_extent: extent(16, 16),
            max_image_extent: extent(1024, 1024),
            ..Default::default()
        };
        assert_eq!(choose_extent(&capabilities, extent(4096, 8)), extent(1024, 16));

        let fixed = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(640, 480),
            ..capabilities
        };
        assert_eq!(choose_extent(&fixed, extent(4096, 8)), extent(640, 480));
    }

    #[test]
    fn test_sharing_mode_follows_queue_families() {
        let (device, context) = setup(HeadlessConfig::default().with_separate_present_family());
        let _swapchain = Swapchain::new(&context, extent(640, 480)).unwrap();

        let desc = device
            .events()
            .into_iter()
            .find_map(|event| match event {
                DeviceEvent::CreateSwapchain(desc) => Some(desc),
                _ => None,
            })
            .unwrap();
        assert_eq!(desc.sharing_mode, vk::SharingMode::CONCURRENT);
        assert_eq!(desc.queue_family_indices, vec![0, 1]);
        assert_eq!(desc.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(desc.min_image_count, 2);

        let shared = QueueSetup {
            graphics_queue: vk::Queue::null(),
            present_queue: vk::Queue::null(),
            graphics_family: 2,
            present_family: 2,
        };
        assert_eq!(sharing_for(&shared), (vk::SharingMode::EXCLUSIVE, Vec::new()));
    }

    #[test]
    fn test_resize_rebuilds_complete_set() {
        let (device, context) = setup(HeadlessConfig::default().with_min_image_count(3));
        let mut swapchain = Swapchain::new(&context, extent(800, 600)).unwrap();
        assert_complete_set(&device, &swapchain);

        for (w, h) in [(1024, 768), (320, 200), (1920, 1080)] {
            let old_views = swapchain.image_views().to_vec();
            let old_fences = swapchain.fences();
            let old_handle = swapchain.handle();
            let old_pass = swapchain.pass_id();

            device.set_surface_extent(Some((w, h)));
            swapchain.on_resize(w, h).unwrap();

            assert_complete_set(&device, &swapchain);
            assert_eq!(swapchain.extent(), extent(w, h));
            assert_ne!(swapchain.pass_id(), old_pass);
            assert!(!device.is_live(ObjectKind::Swapchain, old_handle));
            assert!(old_views.iter().all(|&v| !device.is_live(ObjectKind::ImageView, v)));
            assert!(old_fences.iter().all(|&f| !device.is_live(ObjectKind::Fence, f)));
        }

        // Rebuild waited for the device
        assert!(device
            .events()
            .iter()
            .any(|event| matches!(event, DeviceEvent::DeviceWaitIdle)));
    }

    #[test]
    fn test_zero_size_tears_down_and_skips_frames() {
        let (device, context) = setup(HeadlessConfig::default());
        let mut swapchain = Swapchain::new(&context, extent(800, 600)).unwrap();

        device.set_surface_extent(Some((0, 0)));
        swapchain.on_resize(0, 0).unwrap();
        assert!(!swapchain.is_ready());
        assert_eq!(device.live_count(ObjectKind::Swapchain), 0);
        assert_eq!(device.live_count(ObjectKind::Framebuffer), 0);
        assert_eq!(swapchain.acquire_next_image().unwrap(), None);

        device.set_surface_extent(Some((400, 300)));
        swapchain.on_resize(400, 300).unwrap();
        assert!(swapchain.is_ready());
        assert_complete_set(&device, &swapchain);
    }

    #[test]
    fn test_failed_build_destroys_partial_set() {
        let (device, context) = setup(HeadlessConfig::default());
        // The depth attachment is the first allocation
        device.fail_allocation(1);
        assert!(Swapchain::new(&context, extent(800, 600)).is_err());

        assert_eq!(device.created_count(ObjectKind::Swapchain), 1);
        assert_eq!(device.live_count(ObjectKind::Swapchain), 0);
        assert_eq!(device.live_count(ObjectKind::ImageView), 0);
        assert_eq!(device.live_count(ObjectKind::Image), 0);
    }

    #[test]
    fn test_frame_ordering() {
        let (device, context) = setup(HeadlessConfig::default());
        let mut swapchain = Swapchain::new(&context, extent(800, 600)).unwrap();
        device.clear_events();

        for _ in 0..4 {
            let index = swapchain.acquire_next_image().unwrap().unwrap();
            swapchain.begin_recording(index).unwrap();
            swapchain.begin_render_pass([0.0; 4], 1.0).unwrap();
            swapchain.end_render_pass().unwrap();
            swapchain.submit().unwrap();
            swapchain.present().unwrap();
            assert_eq!(swapchain.frame_state(index).unwrap().phase(), FramePhase::Idle);
        }

        let fences = swapchain.fences();
        let buffers = swapchain.command_buffers().to_vec();
        let events = device.events();

        // Every begin of command buffer i comes right after a wait on fence i
        for (position, event) in events.iter().enumerate() {
            if let DeviceEvent::BeginCommandBuffer(cb) = event {
                let slot = buffers.iter().position(|b| b == cb).unwrap();
                let waited = events[..position]
                    .iter()
                    .rev()
                    .find_map(|e| match e {
                        DeviceEvent::WaitFence(f) => Some(*f),
                        _ => None,
                    })
                    .unwrap();
                assert_eq!(waited, fences[slot]);
            }
        }

        // Reset precedes submit, present waits on the submit's signal, then the queue drains
        let submit = events
            .iter()
            .position(|e| matches!(e, DeviceEvent::Submit(..)))
            .unwrap();
        assert!(matches!(events[submit - 1], DeviceEvent::ResetFence(_)));
        let DeviceEvent::Submit(_, desc) = &events[submit] else {
            unreachable!()
        };
        assert_eq!(
            desc.wait.map(|(_, stage)| stage),
            Some(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        );
        let DeviceEvent::Present { wait, .. } = &events[submit + 1] else {
            panic!("present must follow submit");
        };
        assert_eq!(Some(*wait), desc.signal);
        assert!(matches!(events[submit + 2], DeviceEvent::QueueWaitIdle(_)));
        assert_eq!(swapchain.frame_state(0).unwrap().serial(), 2);
    }

    #[test]
    fn test_out_of_date_acquire_rebuilds_and_skips() {
        let (device, context) = setup(HeadlessConfig::default());
        let mut swapchain = Swapchain::new(&context, extent(800, 600)).unwrap();
        let old = swapchain.handle();

        device.fail_acquire_out_of_date(1);
        assert_eq!(swapchain.acquire_next_image().unwrap(), None);
        assert_ne!(swapchain.handle().as_raw(), old.as_raw());
        assert_eq!(device.live_count(ObjectKind::Swapchain), 1);
        assert!(swapchain.acquire_next_image().unwrap().is_some());
    }

    #[test]
    fn test_suboptimal_acquire_proceeds_then_rebuilds() {
        let (device, context) = setup(HeadlessConfig::default());
        let mut swapchain = Swapchain::new(&context, extent(800, 600)).unwrap();
        let old = swapchain.handle();

        device.acquire_suboptimal(1);
        let index = swapchain.acquire_next_image().unwrap().unwrap();
        assert_eq!(swapchain.handle(), old);
        swapchain.begin_recording(index).unwrap();
        swapchain.submit().unwrap();
        swapchain.present().unwrap();
        assert_ne!(swapchain.handle(), old);
    }

    #[test]
    fn test_suboptimal_present_rebuilds() {
        let (device, context) = setup(HeadlessConfig::default());
        let mut swapchain = Swapchain::new(&context, extent(800, 600)).unwrap();
        let old = swapchain.handle();

        device.present_suboptimal(1);
        let index = swapchain.acquire_next_image().unwrap().unwrap();
        swapchain.begin_recording(index).unwrap();
        swapchain.submit().unwrap();
        swapchain.present().unwrap();
        assert_ne!(swapchain.handle(), old);
        assert_complete_set(&device, &swapchain);
    }
}
