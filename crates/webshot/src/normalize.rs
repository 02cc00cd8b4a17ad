//! Image normalization
//!
//! Turns the raw bytes returned by a render backend into an image of the
//! configured size and format.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage, RgbaImage};
use std::io::Cursor;
use tracing::{debug, warn};

use crate::config::PreviewConfig;
use crate::naming::ImageKind;

/// Encoded images at or below this many bytes are presumed broken.
pub const PLAUSIBLE_SIZE: usize = 4096;

/// Images that can hand out a rectangular part of themselves.
pub trait SubRegion {
    /// The `width` x `height` region starting at (`x`, `y`).
    fn sub_region(&self, x: u32, y: u32, width: u32, height: u32) -> DynamicImage;
}

impl SubRegion for DynamicImage {
    fn sub_region(&self, x: u32, y: u32, width: u32, height: u32) -> DynamicImage {
        self.crop_imm(x, y, width, height)
    }
}

impl SubRegion for RgbaImage {
    fn sub_region(&self, x: u32, y: u32, width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(image::imageops::crop_imm(self, x, y, width, height).to_image())
    }
}

impl SubRegion for RgbImage {
    fn sub_region(&self, x: u32, y: u32, width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(image::imageops::crop_imm(self, x, y, width, height).to_image())
    }
}

/// Decodes, resizes and re-encodes captured images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageNormalizer {
    width: u32,
    height: u32,
    quality: u8,
}

impl ImageNormalizer {
    /// `width`/`height` of `0` leave that axis unconstrained; `quality` 100
    /// encodes PNG, anything lower JPEG.
    pub fn new(width: u32, height: u32, quality: u8) -> Self {
        Self {
            width,
            height,
            quality: quality.clamp(1, 100),
        }
    }

    pub fn from_config(config: &PreviewConfig) -> Self {
        Self::new(config.width(), config.height(), config.quality())
    }

    pub fn kind(&self) -> ImageKind {
        ImageKind::for_quality(self.quality)
    }

    /// Normalize `raw` into the target size and format.
    ///
    /// Leading bytes that keep the image from decoding are skipped. Returns
    /// an empty buffer when nothing decodes, and `raw` unchanged when the
    /// re-encoded image is implausibly small.
    pub fn normalize(&self, raw: &[u8]) -> Vec<u8> {
        if raw.is_empty() {
            return Vec::new();
        }

        let decoded = match self.decode(raw) {
            Some(decoded) => decoded,
            None => {
                warn!("Could not decode {} bytes as {}", raw.len(), self.kind());
                return Vec::new();
            }
        };

        let fitted = self.fit(decoded);
        match self.encode(&fitted) {
            Ok(encoded) if encoded.len() > PLAUSIBLE_SIZE => encoded,
            Ok(encoded) => {
                debug!(
                    "Re-encoded image only {} bytes, keeping the original {} bytes",
                    encoded.len(),
                    raw.len()
                );
                raw.to_vec()
            }
            Err(e) => {
                warn!("Failed to encode {} image: {}", self.kind(), e);
                raw.to_vec()
            }
        }
    }

    /// Decode `raw` as the target format, dropping leading bytes until it
    /// decodes or nothing is left.
    pub fn decode(&self, raw: &[u8]) -> Option<DynamicImage> {
        let format = self.kind().format();
        (0..raw.len()).find_map(|offset| {
            let decoded = image::load_from_memory_with_format(&raw[offset..], format).ok()?;
            if offset > 0 {
                debug!("Skipped {} leading bytes before the image data", offset);
            }
            Some(decoded)
        })
    }

    /// Adjust `img` to the configured bounds.
    ///
    /// Both axes too large scales to exactly the target box. One axis too
    /// large cuts off the excess (bottom or right) without scaling. Otherwise
    /// an image smaller than a constrained axis is scaled up to the target.
    pub fn fit(&self, img: DynamicImage) -> DynamicImage {
        let (width, height) = img.dimensions();
        let too_wide = self.width > 0 && width > self.width;
        let too_high = self.height > 0 && height > self.height;

        if too_wide && too_high {
            return img.resize_exact(self.width, self.height, FilterType::Triangle);
        }
        if too_high {
            return img.sub_region(0, 0, width, self.height);
        }
        if too_wide {
            return img.sub_region(0, 0, self.width, height);
        }

        let too_narrow = self.width > 0 && width < self.width;
        let too_low = self.height > 0 && height < self.height;
        if too_narrow || too_low {
            let target_width = if self.width > 0 { self.width } else { width };
            let target_height = if self.height > 0 { self.height } else { height };
            return img.resize_exact(target_width, target_height, FilterType::Triangle);
        }

        img
    }

    /// Encode `img` as PNG or as JPEG at the configured quality.
    pub fn encode(&self, img: &DynamicImage) -> image::ImageResult<Vec<u8>> {
        let mut buffer = Vec::new();
        match self.kind() {
            ImageKind::Png => {
                img.write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)?;
            }
            ImageKind::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut buffer, self.quality);
                DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
            }
        }
        Ok(buffer)
    }
}
