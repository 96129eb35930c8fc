use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

/// Output bounds and encoding of scaled images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RescaleProfile {
    pub max_width: u32,
    pub max_height: u32,
    /// JPEG quality, 1-100.
    pub quality: u8,
}
impl Default for RescaleProfile {
    fn default() -> Self {
        Self { max_width: 1920, max_height: 1920, quality: 85 }
    }
}

impl RescaleProfile {
    /// Dimensions an image of `width` x `height` is scaled to, or `None` if
    /// it already fits. Aspect ratio is preserved.
    pub fn target_dimensions(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        if width <= self.max_width && height <= self.max_height {
            return None;
        }
        let ratio = f64::min(self.max_width as f64 / width as f64, self.max_height as f64 / height as f64);
        let scaled = |value: u32| ((value as f64 * ratio).round() as u32).max(1);
        Some((scaled(width), scaled(height)))
    }

    /// Decode `data`, downscale it if it exceeds the profile's bounds, and
    /// encode it as JPEG.
    ///
    /// CPU-bound; run it on the blocking pool.
    pub fn scale(&self, data: &[u8]) -> Result<Vec<u8>> {
        let image = image::load_from_memory(data).or_raise(|| ErrorKind::Image)?;
        let (width, height) = image.dimensions();
        let image = match self.target_dimensions(width, height) {
            Some((w, h)) => image.resize_exact(w, h, FilterType::Lanczos3),
            None => image,
        };
        // JPEG has no alpha channel.
        let image = DynamicImage::ImageRgb8(image.to_rgb8());
        let mut encoded = Vec::new();
        image
            .write_with_encoder(JpegEncoder::new_with_quality(&mut encoded, self.quality.clamp(1, 100)))
            .or_raise(|| ErrorKind::Image)?;
        Ok(encoded)
    }
}
