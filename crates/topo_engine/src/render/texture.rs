//! 2D textures
//!
//! A [`Texture2D`] owns one device texture. It remembers its size, format
//! and filter so callers can re-upload without repeating them, and it keeps
//! the mip chain current whenever the filter samples from mip levels.

use serde::{Deserialize, Serialize};

use crate::render::api::{GpuDevice, TextureId};
use crate::render::{RenderError, RenderResult};

/// Texture sampling filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextureFilter {
    /// Nearest texel, no mips
    Nearest,
    /// Linear, no mips
    Linear,
    /// Nearest texel from the nearest mip level
    NearestMipmap,
    /// Linear within the nearest mip level
    Bilinear,
    /// Linear within and between mip levels
    Trilinear,
}

impl TextureFilter {
    /// Whether sampling reads mip levels (and so they must be regenerated)
    pub const fn is_mipmapped(self) -> bool {
        matches!(self, Self::NearestMipmap | Self::Bilinear | Self::Trilinear)
    }
}

/// Texel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit RGBA
    Rgba8,
    /// 8-bit single channel, sampled as grey
    Luminance8,
    /// 32-bit float single channel, sampled as grey
    LuminanceF32,
    /// 32-bit float depth
    Depth,
}

impl PixelFormat {
    /// Bytes per texel
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8 | Self::LuminanceF32 | Self::Depth => 4,
            Self::Luminance8 => 1,
        }
    }

    /// Whether the format may be used as a colour attachment
    pub const fn is_colour_renderable(self) -> bool {
        !matches!(self, Self::Depth)
    }

    /// Number of channels in uploaded data
    pub const fn channels(self) -> usize {
        match self {
            Self::Rgba8 => 4,
            Self::Luminance8 | Self::LuminanceF32 | Self::Depth => 1,
        }
    }
}

/// Texture coordinate wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WrapMode {
    /// Tile
    #[default]
    Repeat,
    /// Clamp to the border texel
    ClampToEdge,
}

/// Owned 2D texture
#[derive(Debug)]
pub struct Texture2D {
    id: TextureId,
    width: u32,
    height: u32,
    format: PixelFormat,
    filter: TextureFilter,
    wrap: WrapMode,
}

impl Texture2D {
    /// Allocate an uninitialised texture
    pub fn create_empty(
        gpu: &mut dyn GpuDevice,
        width: u32,
        height: u32,
        filter: TextureFilter,
        format: PixelFormat,
    ) -> RenderResult<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::ResourceCreationFailed(format!(
                "texture dimensions must be non-zero, got {width}x{height}"
            )));
        }
        let id = gpu.create_texture(width, height, format, filter)?;
        log::trace!("Created {width}x{height} {format:?} texture {id:?} ({filter:?})");
        Ok(Self {
            id,
            width,
            height,
            format,
            filter,
            wrap: WrapMode::default(),
        })
    }

    /// Replace the texture contents
    ///
    /// `data` must hold exactly `width * height` texels of `data_format`.
    /// The mip chain is rebuilt afterwards when the filter uses mips.
    pub fn set_buffer(&mut self, gpu: &mut dyn GpuDevice, data_format: PixelFormat, data: &[u8]) -> RenderResult<()> {
        let expected = self.width as usize * self.height as usize * data_format.bytes_per_pixel();
        if data.len() != expected {
            log::warn!(
                "Texture upload for {}x{} {data_format:?} has {} bytes, expected {expected}",
                self.width,
                self.height,
                data.len()
            );
            return Err(RenderError::InvalidUpload {
                expected,
                actual: data.len(),
            });
        }
        gpu.upload_texture(self.id, data_format, data)?;
        self.regenerate_mipmaps(gpu)
    }

    /// Set the wrap mode on both axes
    pub fn set_wrap_mode(&mut self, gpu: &mut dyn GpuDevice, wrap: WrapMode) -> RenderResult<()> {
        gpu.set_texture_wrap(self.id, wrap)?;
        self.wrap = wrap;
        Ok(())
    }

    /// Rebuild mips if the filter samples them; otherwise a no-op
    pub fn regenerate_mipmaps(&self, gpu: &mut dyn GpuDevice) -> RenderResult<()> {
        if self.filter.is_mipmapped() {
            gpu.generate_mipmaps(self.id)?;
        }
        Ok(())
    }

    /// Free the device texture
    pub fn destroy(self, gpu: &mut dyn GpuDevice) {
        gpu.destroy_texture(self.id);
    }

    /// Device handle
    pub const fn id(&self) -> TextureId {
        self.id
    }

    /// Width in texels
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in texels
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Storage format
    pub const fn format(&self) -> PixelFormat {
        self.format
    }

    /// Sampling filter
    pub const fn filter(&self) -> TextureFilter {
        self.filter
    }

    /// Current wrap mode
    pub const fn wrap(&self) -> WrapMode {
        self.wrap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::HeadlessDevice;

    #[test]
    fn test_set_buffer_regenerates_mips_only_when_mipmapped() {
        let mut gpu = HeadlessDevice::new();

        let mut plain = Texture2D::create_empty(&mut gpu, 2, 2, TextureFilter::Nearest, PixelFormat::Luminance8).unwrap();
        plain.set_buffer(&mut gpu, PixelFormat::Luminance8, &[0, 64, 128, 255]).unwrap();
        assert_eq!(gpu.texture(plain.id()).unwrap().mip_generations, 0);

        let mut mipped = Texture2D::create_empty(&mut gpu, 2, 2, TextureFilter::Trilinear, PixelFormat::Rgba8).unwrap();
        mipped.set_buffer(&mut gpu, PixelFormat::Rgba8, &[255; 16]).unwrap();
        assert_eq!(gpu.texture(mipped.id()).unwrap().mip_generations, 1);

        plain.destroy(&mut gpu);
        mipped.destroy(&mut gpu);
        assert_eq!(gpu.live_textures(), 0);
    }

    #[test]
    fn test_set_buffer_rejects_wrong_length() {
        let mut gpu = HeadlessDevice::new();
        let mut tex = Texture2D::create_empty(&mut gpu, 4, 4, TextureFilter::Linear, PixelFormat::Rgba8).unwrap();
        let err = tex.set_buffer(&mut gpu, PixelFormat::Rgba8, &[0; 15]).unwrap_err();
        assert!(matches!(err, RenderError::InvalidUpload { expected: 64, actual: 15 }));
        assert!(gpu.texture(tex.id()).unwrap().data.is_empty());
        tex.destroy(&mut gpu);
    }

    #[test]
    fn test_zero_sized_texture_is_rejected() {
        let mut gpu = HeadlessDevice::new();
        assert!(Texture2D::create_empty(&mut gpu, 0, 4, TextureFilter::Linear, PixelFormat::Rgba8).is_err());
        assert_eq!(gpu.live_textures(), 0);
    }

    #[test]
    fn test_wrap_mode_tracked() {
        let mut gpu = HeadlessDevice::new();
        let mut tex = Texture2D::create_empty(&mut gpu, 1, 1, TextureFilter::Linear, PixelFormat::Rgba8).unwrap();
        assert_eq!(tex.wrap(), WrapMode::Repeat);
        tex.set_wrap_mode(&mut gpu, WrapMode::ClampToEdge).unwrap();
        assert_eq!(tex.wrap(), WrapMode::ClampToEdge);
        assert_eq!(gpu.texture(tex.id()).unwrap().wrap, WrapMode::ClampToEdge);
        tex.destroy(&mut gpu);
    }

    #[test]
    fn test_mipmapped_filters() {
        assert!(!TextureFilter::Nearest.is_mipmapped());
        assert!(!TextureFilter::Linear.is_mipmapped());
        assert!(TextureFilter::NearestMipmap.is_mipmapped());
        assert!(TextureFilter::Bilinear.is_mipmapped());
        assert!(TextureFilter::Trilinear.is_mipmapped());
    }
}
