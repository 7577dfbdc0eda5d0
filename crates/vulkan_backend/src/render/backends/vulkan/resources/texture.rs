//! Vulkan texture management
//!
//! A texture is a sampled [`GpuImage`] plus its sampler. Pixel data is copied
//! through a staging buffer with a one-shot command buffer and left in
//! `SHADER_READ_ONLY_OPTIMAL`.

use super::buffer::{BufferKind, GpuBuffer};
use super::image::{vk_format, GpuImage, ImageDesc};
use crate::render::backends::vulkan::{Command, DeviceContext, ImageBarrier, SamplerState, VulkanError, VulkanResult};
use crate::render::image_data::{ImageData, ImageSource};
use crate::render::state::SamplerDesc;
use ash::vk;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Sampled image with its sampler
pub struct Texture {
    image: GpuImage,
    sampler: SamplerState,
}

impl Texture {
    /// Upload decoded pixels into a new device-local image
    pub fn from_image_data(context: &DeviceContext, data: &ImageData, sampler: SamplerDesc) -> VulkanResult<Self> {
        data.validate()?;
        if data.format.is_depth() {
            return Err(VulkanError::ImageLoad(format!(
                "{:?} cannot be uploaded as a texture",
                data.format
            )));
        }

        let desc = ImageDesc {
            depth: data.depth,
            mip_levels: data.mip_count.max(1),
            ..ImageDesc::color(
                vk_format(data.format),
                data.width,
                data.height,
                vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            )
        };
        let image = GpuImage::new(context, desc)?;
        let staging = GpuBuffer::with_data(context, BufferKind::Staging, &data.pixels)?;

        let target = image.handle();
        let extent = image.extent();
        context.submit_one_time(|device, command_buffer| {
            device.record(
                command_buffer,
                Command::PipelineBarrier(ImageBarrier {
                    image: target,
                    aspect: vk::ImageAspectFlags::COLOR,
                    mip_levels: desc.mip_levels,
                    old_layout: vk::ImageLayout::UNDEFINED,
                    new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    src_access: vk::AccessFlags::empty(),
                    dst_access: vk::AccessFlags::TRANSFER_WRITE,
                    src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                    dst_stage: vk::PipelineStageFlags::TRANSFER,
                }),
            );
            device.record(
                command_buffer,
                Command::CopyBufferToImage {
                    buffer: staging.handle(),
                    image: target,
                    extent,
                },
            );
            device.record(
                command_buffer,
                Command::PipelineBarrier(ImageBarrier {
                    image: target,
                    aspect: vk::ImageAspectFlags::COLOR,
                    mip_levels: desc.mip_levels,
                    old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    src_access: vk::AccessFlags::TRANSFER_WRITE,
                    dst_access: vk::AccessFlags::SHADER_READ,
                    src_stage: vk::PipelineStageFlags::TRANSFER,
                    dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
                }),
            );
        })?;

        let mut sampler = SamplerState::new(context.device().clone(), sampler);
        sampler.sampler()?;

        log::debug!(
            "Uploaded {}x{}x{} {:?} texture",
            data.width,
            data.height,
            data.depth,
            data.format
        );
        Ok(Self { image, sampler })
    }

    /// 1x1 texture of a single color
    pub fn solid_color(context: &DeviceContext, color: [u8; 4]) -> VulkanResult<Self> {
        Self::from_image_data(context, &ImageData::solid_color(1, 1, color), SamplerDesc::default())
    }

    /// Decode an image file through `source` and upload it
    pub fn load(
        context: &DeviceContext,
        source: &dyn ImageSource,
        path: &Path,
        sampler: SamplerDesc,
    ) -> VulkanResult<Self> {
        let data = source.load(path)?;
        Self::from_image_data(context, &data, sampler)
    }

    /// View over all mips
    pub const fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    /// Native sampler
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.current().unwrap_or_else(vk::Sampler::null)
    }

    /// Sampler descriptor
    pub const fn sampler_desc(&self) -> &SamplerDesc {
        self.sampler.desc()
    }

    /// Underlying image
    pub const fn image(&self) -> &GpuImage {
        &self.image
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("image", &self.image.handle())
            .field("view", &self.image.view())
            .field("extent", &self.image.extent())
            .field("sampler", &self.sampler())
            .finish()
    }
}

/// Textures loaded from disk, shared by path
#[derive(Debug, Default)]
pub struct TextureCache {
    textures: HashMap<PathBuf, Arc<Texture>>,
}

impl TextureCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Texture for `path`, loading it on first request
    pub fn get_or_load(
        &mut self,
        context: &DeviceContext,
        source: &dyn ImageSource,
        path: &Path,
        sampler: SamplerDesc,
    ) -> VulkanResult<Arc<Texture>> {
        if let Some(texture) = self.textures.get(path) {
            return Ok(texture.clone());
        }
        let texture = Arc::new(Texture::load(context, source, path, sampler)?);
        self.textures.insert(path.to_path_buf(), texture.clone());
        Ok(texture)
    }

    /// Number of cached textures
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Drop every cached texture; textures still referenced elsewhere stay alive
    pub fn clear(&mut self) {
        self.textures.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::headless::DeviceEvent;
    use crate::render::backends::vulkan::{HeadlessDevice, ObjectKind};
    use crate::render::image_data::PixelFormat;
    use std::cell::Cell;

    fn context() -> (Arc<HeadlessDevice>, DeviceContext) {
        let device = Arc::new(HeadlessDevice::default());
        let context = DeviceContext::with_device(device.clone()).unwrap();
        (device, context)
    }

    struct CountingSource {
        loads: Cell<u32>,
    }

    impl ImageSource for CountingSource {
        fn load(&self, _path: &Path) -> VulkanResult<ImageData> {
            self.loads.set(self.loads.get() + 1);
            Ok(ImageData::solid_color(2, 2, [0, 255, 0, 255]))
        }
    }

    #[test]
    fn test_upload_copies_mip0_and_transitions() {
        let (device, context) = context();
        device.clear_events();
        let texture = Texture::solid_color(&context, [255, 255, 255, 255]).unwrap();

        let commands: Vec<Command> = device
            .events()
            .into_iter()
            .filter_map(|event| match event {
                DeviceEvent::Record(_, command) => Some(command),
                _ => None,
            })
            .collect();
        assert_eq!(commands.len(), 3);
        let Command::PipelineBarrier(first) = commands[0] else {
            panic!("expected barrier, got {:?}", commands[0]);
        };
        assert_eq!(first.new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        let Command::CopyBufferToImage { extent, image, .. } = commands[1] else {
            panic!("expected copy, got {:?}", commands[1]);
        };
        assert_eq!((extent.width, extent.height, extent.depth), (1, 1, 1));
        assert_eq!(image, texture.image().handle());
        let Command::PipelineBarrier(last) = commands[2] else {
            panic!("expected barrier, got {:?}", commands[2]);
        };
        assert_eq!(last.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

        // Staging buffer and one-shot command buffer are gone, the sampler is built
        assert_eq!(device.live_count(ObjectKind::Buffer), 0);
        assert_eq!(device.live_count(ObjectKind::CommandBuffer), 0);
        assert!(device.is_live(ObjectKind::Sampler, texture.sampler()));
        assert!(device.is_live(ObjectKind::ImageView, texture.view()));
    }

    #[test]
    fn test_drop_releases_everything() {
        let (device, context) = context();
        let texture = Texture::solid_color(&context, [0, 0, 0, 255]).unwrap();
        drop(texture);
        assert_eq!(device.live_count(ObjectKind::Image), 0);
        assert_eq!(device.live_count(ObjectKind::ImageView), 0);
        assert_eq!(device.live_count(ObjectKind::Sampler), 0);
        assert_eq!(device.live_count(ObjectKind::Memory), 0);
    }

    #[test]
    fn test_rejects_mismatched_pixels_and_depth_formats() {
        let (device, context) = context();
        let mut data = ImageData::solid_color(4, 4, [1, 2, 3, 4]);
        data.pixels.pop();
        assert!(Texture::from_image_data(&context, &data, SamplerDesc::default()).is_err());

        let depth = ImageData {
            format: PixelFormat::D32Float,
            ..ImageData::solid_color(1, 1, [0; 4])
        };
        assert!(Texture::from_image_data(&context, &depth, SamplerDesc::default()).is_err());
        assert_eq!(device.created_count(ObjectKind::Image), 0);
    }

    #[test]
    fn test_cache_loads_each_path_once() {
        let (_device, context) = context();
        let source = CountingSource { loads: Cell::new(0) };
        let mut cache = TextureCache::new();

        let a = cache
            .get_or_load(&context, &source, Path::new("grass.png"), SamplerDesc::default())
            .unwrap();
        let b = cache
            .get_or_load(&context, &source, Path::new("grass.png"), SamplerDesc::default())
            .unwrap();
        cache
            .get_or_load(&context, &source, Path::new("rock.png"), SamplerDesc::clamped())
            .unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(source.loads.get(), 2);
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
