//! Decoded image data and the image loading collaborator

use crate::render::backends::vulkan::{VulkanError, VulkanResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Texel formats understood by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 8-bit single channel
    R8Unorm,
    /// 8-bit two channels
    Rg8Unorm,
    /// 8-bit RGBA
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA, sRGB encoded
    Rgba8Srgb,
    /// 8-bit BGRA
    Bgra8Unorm,
    /// 16-bit float RGBA
    Rgba16Float,
    /// 32-bit float single channel
    R32Float,
    /// 32-bit float RGBA
    Rgba32Float,
    /// 32-bit float depth
    D32Float,
    /// 24-bit depth with 8-bit stencil
    D24UnormS8Uint,
}

impl PixelFormat {
    /// Bytes per texel
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::Rg8Unorm => 2,
            Self::Rgba8Unorm
            | Self::Rgba8Srgb
            | Self::Bgra8Unorm
            | Self::R32Float
            | Self::D32Float
            | Self::D24UnormS8Uint => 4,
            Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
        }
    }

    /// Whether this is a depth format
    pub const fn is_depth(self) -> bool {
        matches!(self, Self::D32Float | Self::D24UnormS8Uint)
    }
}

/// Decoded pixels of a 2D (or 3D) image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Tightly packed texels of mip 0
    pub pixels: Vec<u8>,
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Depth in texels (1 for 2D images)
    pub depth: u32,
    /// Texel format
    pub format: PixelFormat,
    /// Mip levels the texture should allocate
    pub mip_count: u32,
}

impl ImageData {
    /// Create a solid color RGBA image
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixel_count = (width * height) as usize;
        Self {
            pixels: color.repeat(pixel_count),
            width,
            height,
            depth: 1,
            format: PixelFormat::Rgba8Unorm,
            mip_count: 1,
        }
    }

    /// Number of bytes uploaded for mip 0
    pub const fn mip0_size(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.depth as u64 * self.format.bytes_per_pixel() as u64
    }

    /// Check that the pixel buffer holds exactly one full mip 0
    pub fn validate(&self) -> VulkanResult<()> {
        if self.width == 0 || self.height == 0 || self.depth == 0 {
            return Err(VulkanError::ImageLoad(format!(
                "image has zero extent {}x{}x{}",
                self.width, self.height, self.depth
            )));
        }
        if self.pixels.len() as u64 != self.mip0_size() {
            return Err(VulkanError::ImageLoad(format!(
                "expected {} bytes for {}x{}x{} {:?}, got {}",
                self.mip0_size(),
                self.width,
                self.height,
                self.depth,
                self.format,
                self.pixels.len()
            )));
        }
        Ok(())
    }
}

/// Image decoding collaborator
pub trait ImageSource {
    /// Decode the image stored at `path`
    fn load(&self, path: &Path) -> VulkanResult<ImageData>;
}

/// Loads PNG files from disk with the `image` crate, converted to RGBA8
#[derive(Debug, Clone, Copy, Default)]
pub struct FileImageSource;

impl FileImageSource {
    /// Decode an image held in memory
    pub fn load_from_memory(bytes: &[u8]) -> VulkanResult<ImageData> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| VulkanError::ImageLoad(format!("failed to decode image: {e}")))?;
        Ok(Self::from_dynamic(&img))
    }

    fn from_dynamic(img: &image::DynamicImage) -> ImageData {
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        ImageData {
            pixels: rgba.into_raw(),
            width,
            height,
            depth: 1,
            format: PixelFormat::Rgba8Unorm,
            mip_count: 1,
        }
    }
}

impl ImageSource for FileImageSource {
    fn load(&self, path: &Path) -> VulkanResult<ImageData> {
        log::debug!("Loading image from: {:?}", path);

        let img = image::open(path)
            .map_err(|e| VulkanError::ImageLoad(format!("{}: {e}", path.display())))?;
        let data = Self::from_dynamic(&img);

        log::info!("Loaded image {}x{} from {:?}", data.width, data.height, path);
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_color_image() {
        let img = ImageData::solid_color(4, 4, [255, 0, 0, 255]);
        assert_eq!(img.mip0_size(), 64);
        assert_eq!(&img.pixels[0..4], &[255, 0, 0, 255]);
        assert!(img.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_short_buffer() {
        let mut img = ImageData::solid_color(2, 2, [0, 0, 0, 255]);
        img.pixels.truncate(12);
        assert!(matches!(img.validate(), Err(VulkanError::ImageLoad(_))));
    }

    #[test]
    fn test_bytes_per_pixel() {
        assert_eq!(PixelFormat::R8Unorm.bytes_per_pixel(), 1);
        assert_eq!(PixelFormat::Rgba16Float.bytes_per_pixel(), 8);
        assert!(PixelFormat::D32Float.is_depth());
        assert!(!PixelFormat::Rgba8Srgb.is_depth());
    }

    #[test]
    fn test_decode_png_from_memory() {
        let mut png = Vec::new();
        let source = image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        image::DynamicImage::ImageRgba8(source)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let data = FileImageSource::load_from_memory(&png).unwrap();
        assert_eq!((data.width, data.height), (3, 2));
        assert_eq!(&data.pixels[..4], &[10, 20, 30, 255]);
        assert!(data.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = FileImageSource.load(Path::new("does/not/exist.png"));
        assert!(result.is_err());
    }
}
