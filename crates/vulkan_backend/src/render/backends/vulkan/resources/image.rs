//! GPU images and offscreen render targets

use super::buffer::allocate_for;
use crate::render::backends::vulkan::state::swapchain::RenderPassId;
use crate::render::backends::vulkan::{DeviceContext, DeviceRef, RenderPassDesc, VulkanError, VulkanResult};
use crate::render::image_data::PixelFormat;
use ash::vk;

/// Depth format used by every depth attachment
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Native format of a texel format
pub const fn vk_format(format: PixelFormat) -> vk::Format {
    match format {
        PixelFormat::R8Unorm => vk::Format::R8_UNORM,
        PixelFormat::Rg8Unorm => vk::Format::R8G8_UNORM,
        PixelFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        PixelFormat::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
        PixelFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        PixelFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
        PixelFormat::R32Float => vk::Format::R32_SFLOAT,
        PixelFormat::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
        PixelFormat::D32Float => vk::Format::D32_SFLOAT,
        PixelFormat::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
    }
}

/// Parameters of a device-local image
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    /// Texel format
    pub format: vk::Format,
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Depth in texels, 1 for 2D images
    pub depth: u32,
    /// Mip levels
    pub mip_levels: u32,
    /// Usage flags
    pub usage: vk::ImageUsageFlags,
    /// Aspect of the view
    pub aspect: vk::ImageAspectFlags,
}

impl ImageDesc {
    /// 2D color image
    pub const fn color(format: vk::Format, width: u32, height: u32, usage: vk::ImageUsageFlags) -> Self {
        Self {
            format,
            width,
            height,
            depth: 1,
            mip_levels: 1,
            usage,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }

    /// 2D depth attachment
    pub const fn depth_attachment(width: u32, height: u32) -> Self {
        Self {
            format: DEPTH_FORMAT,
            width,
            height,
            depth: 1,
            mip_levels: 1,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: vk::ImageAspectFlags::DEPTH,
        }
    }
}

/// Device-local image with its memory and a view over all mips
pub struct GpuImage {
    device: DeviceRef,
    desc: ImageDesc,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
}

impl GpuImage {
    /// Create the image, allocate and bind memory, create the view
    pub fn new(context: &DeviceContext, desc: ImageDesc) -> VulkanResult<Self> {
        if desc.width == 0 || desc.height == 0 || desc.depth == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!("image of zero extent {}x{}x{}", desc.width, desc.height, desc.depth),
            });
        }

        // Partially built images are cleaned up by Drop
        let mut image = Self {
            device: context.device().clone(),
            desc,
            image: vk::Image::null(),
            memory: vk::DeviceMemory::null(),
            view: vk::ImageView::null(),
        };

        let image_type = if desc.depth > 1 {
            vk::ImageType::TYPE_3D
        } else {
            vk::ImageType::TYPE_2D
        };
        let info = vk::ImageCreateInfo::builder()
            .image_type(image_type)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: desc.depth,
            })
            .mip_levels(desc.mip_levels.max(1))
            .array_layers(1)
            .format(desc.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);
        image.image = image.device.create_image(&info)?;

        let requirements = image.device.image_memory_requirements(image.image);
        image.memory = allocate_for(&image.device, requirements, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;
        image.device.bind_image_memory(image.image, image.memory)?;

        let view_type = if desc.depth > 1 {
            vk::ImageViewType::TYPE_3D
        } else {
            vk::ImageViewType::TYPE_2D
        };
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image.image)
            .view_type(view_type)
            .format(desc.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: desc.aspect,
                base_mip_level: 0,
                level_count: desc.mip_levels.max(1),
                base_array_layer: 0,
                layer_count: 1,
            });
        image.view = image.device.create_image_view(&view_info)?;

        log::debug!(
            "Created {}x{}x{} {:?} image ({} mips)",
            desc.width,
            desc.height,
            desc.depth,
            desc.format,
            desc.mip_levels
        );
        Ok(image)
    }

    /// Native image
    pub const fn handle(&self) -> vk::Image {
        self.image
    }

    /// View over all mips
    pub const fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Creation parameters
    pub const fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    /// Extent of mip 0
    pub const fn extent(&self) -> vk::Extent3D {
        vk::Extent3D {
            width: self.desc.width,
            height: self.desc.height,
            depth: self.desc.depth,
        }
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        if self.view != vk::ImageView::null() {
            self.device.destroy_image_view(self.view);
        }
        if self.image != vk::Image::null() {
            self.device.destroy_image(self.image);
        }
        if self.memory != vk::DeviceMemory::null() {
            self.device.free_memory(self.memory);
        }
    }
}

/// Viewport covering `extent`, depth 0..1
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor covering `extent`
pub const fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Offscreen color + depth target with its own render pass
///
/// The color attachment ends the pass in `SHADER_READ_ONLY_OPTIMAL` so it can
/// be sampled by later passes.
pub struct RenderTarget {
    device: DeviceRef,
    color: GpuImage,
    depth: GpuImage,
    render_pass: vk::RenderPass,
    framebuffer: vk::Framebuffer,
    pass_id: RenderPassId,
    extent: vk::Extent2D,
}

impl RenderTarget {
    /// Create a `width`×`height` target with the given color format
    pub fn new(context: &DeviceContext, width: u32, height: u32, format: PixelFormat) -> VulkanResult<Self> {
        if format.is_depth() {
            return Err(VulkanError::InvalidOperation {
                reason: format!("{format:?} cannot be used as a color attachment"),
            });
        }
        let device = context.device().clone();
        let color_format = vk_format(format);

        let color = GpuImage::new(
            context,
            ImageDesc::color(
                color_format,
                width,
                height,
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            ),
        )?;
        let depth = GpuImage::new(context, ImageDesc::depth_attachment(width, height))?;

        let render_pass = device.create_render_pass(&RenderPassDesc {
            color_format,
            depth_format: Some(DEPTH_FORMAT),
            color_final_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        })?;

        let extent = vk::Extent2D { width, height };
        let framebuffer = match device.create_framebuffer(render_pass, &[color.view(), depth.view()], extent) {
            Ok(framebuffer) => framebuffer,
            Err(err) => {
                device.destroy_render_pass(render_pass);
                return Err(err);
            }
        };

        Ok(Self {
            device,
            color,
            depth,
            render_pass,
            framebuffer,
            pass_id: RenderPassId::next(),
            extent,
        })
    }

    /// Render pass
    pub const fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Identity of the render pass, used to key pipelines
    pub const fn pass_id(&self) -> RenderPassId {
        self.pass_id
    }

    /// Framebuffer
    pub const fn framebuffer(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    /// Size in pixels
    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Color attachment, sampleable after the pass ends
    pub const fn color(&self) -> &GpuImage {
        &self.color
    }

    /// Depth attachment
    pub const fn depth(&self) -> &GpuImage {
        &self.depth
    }

    /// Viewport covering the whole target
    pub fn viewport(&self) -> vk::Viewport {
        full_viewport(self.extent)
    }

    /// Scissor covering the whole target
    pub const fn scissor(&self) -> vk::Rect2D {
        full_scissor(self.extent)
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        self.device.destroy_framebuffer(self.framebuffer);
        self.device.destroy_render_pass(self.render_pass);
        // color and depth images drop after this
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::{HeadlessDevice, ObjectKind};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    #[test]
    fn test_image_owns_view_and_memory() {
        let device = Arc::new(HeadlessDevice::default());
        let context = DeviceContext::with_device(device.clone()).unwrap();

        let image = GpuImage::new(
            &context,
            ImageDesc::color(vk::Format::R8G8B8A8_UNORM, 4, 4, vk::ImageUsageFlags::SAMPLED),
        )
        .unwrap();
        assert_eq!(device.live_count(ObjectKind::Image), 1);
        assert_eq!(device.live_count(ObjectKind::ImageView), 1);
        assert_eq!(device.live_count(ObjectKind::Memory), 1);

        drop(image);
        assert_eq!(device.live_count(ObjectKind::Image), 0);
        assert_eq!(device.live_count(ObjectKind::ImageView), 0);
        assert_eq!(device.live_count(ObjectKind::Memory), 0);
    }

    #[test]
    fn test_zero_extent_rejected() {
        let device = Arc::new(HeadlessDevice::default());
        let context = DeviceContext::with_device(device.clone()).unwrap();
        let result = GpuImage::new(&context, ImageDesc::depth_attachment(0, 16));
        assert!(result.is_err());
        assert_eq!(device.created_count(ObjectKind::Image), 0);
    }

    #[test]
    fn test_failed_allocation_destroys_image() {
        let device = Arc::new(HeadlessDevice::default());
        let context = DeviceContext::with_device(device.clone()).unwrap();
        device.fail_allocation(1);
        assert!(GpuImage::new(&context, ImageDesc::depth_attachment(8, 8)).is_err());
        assert_eq!(device.created_count(ObjectKind::Image), 1);
        assert_eq!(device.live_count(ObjectKind::Image), 0);
    }

    #[test]
    fn test_render_target_viewport_and_identity() {
        let device = Arc::new(HeadlessDevice::default());
        let context = DeviceContext::with_device(device.clone()).unwrap();

        let a = RenderTarget::new(&context, 256, 128, PixelFormat::Rgba8Unorm).unwrap();
        let b = RenderTarget::new(&context, 256, 128, PixelFormat::Rgba16Float).unwrap();
        assert_ne!(a.pass_id(), b.pass_id());

        let viewport = a.viewport();
        assert_relative_eq!(viewport.width, 256.0);
        assert_relative_eq!(viewport.height, 128.0);
        assert_relative_eq!(viewport.max_depth, 1.0);
        assert_eq!(a.scissor().extent, vk::Extent2D { width: 256, height: 128 });

        drop(a);
        drop(b);
        assert_eq!(device.live_count(ObjectKind::RenderPass), 0);
        assert_eq!(device.live_count(ObjectKind::Framebuffer), 0);
        assert_eq!(device.live_count(ObjectKind::Image), 0);
    }

    #[test]
    fn test_depth_format_rejected_as_color() {
        let device = Arc::new(HeadlessDevice::default());
        let context = DeviceContext::with_device(device).unwrap();
        assert!(RenderTarget::new(&context, 4, 4, PixelFormat::D32Float).is_err());
    }
}
