//! Design bitmap loading and mipmapped upload

use crate::backend::*;
use crate::error::{OverlayError, OverlayResult};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, RgbaImage};
use std::path::Path;

/// RGBA8 pixels of the tattoo design.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesignBitmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl DesignBitmap {
    /// Wrap tightly packed RGBA8 pixels.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> OverlayResult<Self> {
        if width == 0 || height == 0 {
            return Err(OverlayError::InvalidInput(format!(
                "design bitmap must not be empty ({}x{})",
                width, height
            )));
        }
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(OverlayError::InvalidInput(format!(
                "design bitmap {}x{} needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Load a bitmap from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> OverlayResult<Self> {
        let img = image::open(path.as_ref()).map_err(|e| {
            OverlayError::InvalidInput(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_image(img)
    }

    /// Decode a bitmap from encoded bytes (PNG, JPEG, ...)
    pub fn from_bytes(bytes: &[u8]) -> OverlayResult<Self> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| OverlayError::InvalidInput(e.to_string()))?;
        Self::from_image(img)
    }

    pub fn from_image(img: DynamicImage) -> OverlayResult<Self> {
        let (width, height) = img.dimensions();
        Self::from_rgba8(width, height, img.to_rgba8().into_raw())
    }

    /// A bitmap filled with one color
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> OverlayResult<Self> {
        let pixels = color
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self::from_rgba8(width, height, pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Every level of the mip chain, level 0 first.
    pub fn mip_chain(&self) -> Vec<MipLevel> {
        let count = mip_level_count(self.width, self.height);
        let mut levels = Vec::with_capacity(count as usize);
        levels.push(MipLevel {
            width: self.width,
            height: self.height,
            data: self.pixels.clone(),
        });
        if count == 1 {
            return levels;
        }

        let Some(base) = RgbaImage::from_raw(self.width, self.height, self.pixels.clone()) else {
            return levels;
        };
        for level in 1..count {
            let width = (self.width >> level).max(1);
            let height = (self.height >> level).max(1);
            let scaled = imageops::resize(&base, width, height, FilterType::Triangle);
            levels.push(MipLevel {
                width,
                height,
                data: scaled.into_raw(),
            });
        }
        levels
    }
}

/// One level of a mip chain.
#[derive(Debug, Clone)]
pub struct MipLevel {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Levels of a full mip chain down to 1x1.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// The design uploaded to the GPU with its view and sampler.
pub struct DesignTexture {
    pub handle: TextureHandle,
    pub view: TextureViewHandle,
    pub sampler: SamplerHandle,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
}

impl DesignTexture {
    /// Upload `bitmap` with a full mip chain.
    ///
    /// Sampling is trilinear with repeat addressing. Errors are reported
    /// under `label`; anything created before a failure is destroyed again.
    pub fn upload<B: GraphicsBackend>(
        backend: &mut B,
        bitmap: &DesignBitmap,
        label: &str,
    ) -> OverlayResult<Self> {
        let chain = bitmap.mip_chain();
        let mip_levels = chain.len() as u32;
        let mut created = Vec::with_capacity(3);

        let result = (|| -> BackendResult<Self> {
            let handle = backend.create_texture(&TextureDescriptor {
                label: Some("Tattoo Design".into()),
                width: bitmap.width(),
                height: bitmap.height(),
                mip_levels,
                format: TextureFormat::Rgba8Unorm,
                usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
            })?;
            created.push(GpuResource::Texture(handle));

            for (level, mip) in chain.iter().enumerate() {
                backend.write_texture(handle, level as u32, &mip.data, mip.width, mip.height);
            }

            let view = backend.create_texture_view(handle)?;
            created.push(GpuResource::TextureView(view));

            let sampler = backend.create_sampler(&SamplerDescriptor {
                label: Some("Tattoo Design Sampler".into()),
            })?;
            created.push(GpuResource::Sampler(sampler));

            Ok(Self {
                handle,
                view,
                sampler,
                width: bitmap.width(),
                height: bitmap.height(),
                mip_levels,
            })
        })();

        match result {
            Ok(texture) => {
                log::debug!(
                    "Uploaded {}x{} design with {} mip levels",
                    texture.width,
                    texture.height,
                    texture.mip_levels
                );
                Ok(texture)
            }
            Err(error) => {
                for resource in created.iter().rev() {
                    resource.destroy(backend);
                }
                Err(OverlayError::from_backend(label, &error))
            }
        }
    }

    pub fn resources(&self) -> [GpuResource; 3] {
        [
            GpuResource::Texture(self.handle),
            GpuResource::TextureView(self.view),
            GpuResource::Sampler(self.sampler),
        ]
    }
}
