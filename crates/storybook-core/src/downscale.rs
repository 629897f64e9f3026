//! Bounded-dimension photo downscaling.

use image::ImageEncoder;
use image::imageops::FilterType;
use tracing::debug;

use crate::data_url::EncodedImage;
use crate::error::{Error, Result};

/// JPEG quality used for downscaled output
pub const JPEG_QUALITY: u8 = 90;

/// Shrink an image so its longest side is at most `max_dimension`.
///
/// Images already within bounds are returned byte-for-byte unchanged; there is
/// no upscaling. Larger images are resized with their aspect ratio preserved
/// (longest side exactly `max_dimension`) and re-encoded as JPEG.
pub fn downscale(bytes: &[u8], max_dimension: u32) -> Result<EncodedImage> {
    let img = image::load_from_memory(bytes).map_err(|e| Error::ImageDecode(e.to_string()))?;
    let (width, height) = (img.width(), img.height());

    if width.max(height) <= max_dimension {
        debug!("Image {}x{} already within {}px", width, height, max_dimension);
        return EncodedImage::sniff(bytes.to_vec());
    }

    let (target_w, target_h) = fit_within(width, height, max_dimension);
    debug!(
        "Downscaling {}x{} to {}x{}",
        width, height, target_w, target_h
    );

    let rgb = img
        .resize_exact(target_w, target_h, FilterType::Lanczos3)
        .to_rgb8();

    let mut jpeg_data = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg_data, JPEG_QUALITY);
    encoder
        .write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| Error::ImageEncode(e.to_string()))?;

    Ok(EncodedImage::new(jpeg_data, "image/jpeg"))
}

/// Target size for `width`x`height` whose longest side becomes `max_dimension`.
fn fit_within(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let scale = |short: u32, long: u32| -> u32 {
        let scaled = (u64::from(short) * u64::from(max_dimension) + u64::from(long) / 2)
            / u64::from(long);
        u32::try_from(scaled).unwrap_or(max_dimension).max(1)
    };

    if width >= height {
        (max_dimension, scale(height, width))
    } else {
        (scale(width, height), max_dimension)
    }
}
