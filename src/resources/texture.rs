//! Texture loading

use crate::backend::*;
use crate::resources::AssetError;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::path::Path;

/// Decoded texture with a full CPU-generated mip chain
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    /// Level 0 first, each level tightly packed
    pub mips: Vec<Vec<u8>>,
    pub name: String,
}

impl TextureData {
    /// Load texture from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let img = image::open(path).map_err(|source| AssetError::Texture {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_image(img, &name))
    }

    /// Single-channel images stay single-channel, everything else becomes RGBA8.
    pub fn from_image(img: DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        let (base, format) = match img.color().channel_count() {
            1 => (DynamicImage::ImageLuma8(img.to_luma8()), TextureFormat::R8Unorm),
            _ => (DynamicImage::ImageRgba8(img.to_rgba8()), TextureFormat::Rgba8Unorm),
        };

        let levels = mip_level_count(width, height);
        let mut mips = Vec::with_capacity(levels as usize);
        for level in 1..levels {
            let (w, h) = mip_extent(width, height, level);
            mips.push(base.resize_exact(w, h, FilterType::Triangle).into_bytes());
        }
        mips.insert(0, base.into_bytes());

        Self {
            width,
            height,
            format,
            mips,
            name: name.to_string(),
        }
    }
}

/// Number of levels down to 1x1
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

pub fn mip_extent(width: u32, height: u32, level: u32) -> (u32, u32) {
    ((width >> level).max(1), (height >> level).max(1))
}

/// GPU texture with associated view and sampler
pub struct GpuTexture {
    pub handle: TextureHandle,
    pub view: TextureViewHandle,
    pub sampler: SamplerHandle,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub mip_levels: u32,
    pub name: String,
}

impl GpuTexture {
    /// Create and upload every mip level to the GPU
    pub fn create(backend: &mut dyn GraphicsBackend, data: &TextureData) -> BackendResult<Self> {
        let mip_levels = data.mips.len().max(1) as u32;
        let handle = backend.create_texture(&TextureDescriptor {
            label: Some(data.name.clone()),
            width: data.width,
            height: data.height,
            mip_levels,
            format: data.format,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;

        let view = backend.create_texture_view(handle)?;
        for (level, bytes) in data.mips.iter().enumerate() {
            let (w, h) = mip_extent(data.width, data.height, level as u32);
            backend.write_texture(handle, level as u32, bytes, w, h);
        }
        let sampler = backend.create_sampler(&SamplerDescriptor::trilinear_repeat(&data.name))?;

        Ok(Self {
            handle,
            view,
            sampler,
            width: data.width,
            height: data.height,
            format: data.format,
            mip_levels,
            name: data.name.clone(),
        })
    }
}

/// Load and upload an image texture, logging failures.
pub fn load_texture(backend: &mut dyn GraphicsBackend, path: impl AsRef<Path>) -> Option<GpuTexture> {
    let path = path.as_ref();
    let result = TextureData::from_file(path)
        .and_then(|data| GpuTexture::create(backend, &data).map_err(AssetError::from));
    match result {
        Ok(texture) => {
            log::info!(
                "Loaded texture {}: {}x{} {:?}, {} mips",
                path.display(),
                texture.width,
                texture.height,
                texture.format,
                texture.mip_levels
            );
            Some(texture)
        }
        Err(e) => {
            log::error!("{e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use image::{GrayImage, RgbImage};

    #[test]
    fn test_mip_level_count() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(1024, 1024), 11);
        assert_eq!(mip_level_count(300, 20), 9);
        assert_eq!(mip_extent(300, 20, 8), (1, 1));
    }

    #[test]
    fn test_rgb_expands_to_rgba_with_mips() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 4, image::Rgb([10, 20, 30])));
        let data = TextureData::from_image(img, "rgb");

        assert_eq!(data.format, TextureFormat::Rgba8Unorm);
        assert_eq!(data.mips.len(), 4);
        assert_eq!(&data.mips[0][..4], &[10, 20, 30, 255]);
        assert_eq!(data.mips[1].len(), 4 * 2 * 4);
        assert_eq!(data.mips[3].len(), 4);
    }

    #[test]
    fn test_single_channel_stays_r8() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, image::Luma([7])));
        let data = TextureData::from_image(img, "gray");
        assert_eq!(data.format, TextureFormat::R8Unorm);
        assert_eq!(data.mips[0].len(), 16);
    }

    #[test]
    fn test_gpu_texture_uses_trilinear_repeat() {
        let mut backend = DummyBackend::new(4, 4);
        let img = DynamicImage::ImageRgba8(image::RgbaImage::new(16, 16));
        let texture = GpuTexture::create(&mut backend, &TextureData::from_image(img, "bricks")).unwrap();

        assert_eq!(texture.mip_levels, 5);
        let desc = backend.texture_descriptor(texture.handle).unwrap();
        assert_eq!(desc.mip_levels, 5);
        let sampler = backend.sampler_descriptor(texture.sampler).unwrap();
        assert_eq!(sampler.min_filter, FilterMode::Linear);
        assert_eq!(sampler.mipmap_filter, FilterMode::Linear);
        assert_eq!(sampler.address_mode_u, AddressMode::Repeat);
    }

    #[test]
    fn test_missing_texture_is_none() {
        let mut backend = DummyBackend::new(4, 4);
        let path = std::env::temp_dir().join("shadow_lab_missing_texture.png");
        assert!(load_texture(&mut backend, path).is_none());
        assert_eq!(backend.textures_created(), 0);
    }
}
