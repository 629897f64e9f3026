//! Encoded images and their `data:` URL transport form.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::ImageEncoder;

use crate::error::{Error, Result};

/// Image bytes together with their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl EncodedImage {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
        }
    }

    /// Wrap bytes, detecting the MIME type from the magic bytes.
    pub fn sniff(bytes: Vec<u8>) -> Result<Self> {
        let format = image::guess_format(&bytes).map_err(|e| Error::ImageDecode(e.to_string()))?;
        Ok(Self::new(bytes, format.to_mime_type()))
    }

    /// Decode any supported image and re-encode it as PNG.
    pub fn reencode_png(bytes: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(bytes).map_err(|e| Error::ImageDecode(e.to_string()))?;
        let rgba = img.to_rgba8();

        let mut png_data = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new_with_quality(
            &mut png_data,
            image::codecs::png::CompressionType::Fast,
            image::codecs::png::FilterType::Adaptive,
        );
        encoder
            .write_image(
                rgba.as_raw(),
                rgba.width(),
                rgba.height(),
                image::ExtendedColorType::Rgba8,
            )
            .map_err(|e| Error::ImageEncode(e.to_string()))?;

        Ok(Self::new(png_data, "image/png"))
    }

    /// Pixel dimensions (width, height)
    pub fn dimensions(&self) -> Result<(u32, u32)> {
        let img =
            image::load_from_memory(&self.bytes).map_err(|e| Error::ImageDecode(e.to_string()))?;
        Ok((img.width(), img.height()))
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, BASE64.encode(&self.bytes))
    }

    /// Parse a base64 `data:` URL.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| Error::DataUrl("missing data: scheme".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| Error::DataUrl("missing payload separator".to_string()))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| Error::DataUrl("only base64 payloads are supported".to_string()))?;

        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|e| Error::DataUrl(e.to_string()))?;

        let mime = if mime.is_empty() { "application/octet-stream" } else { mime };
        Ok(Self::new(bytes, mime))
    }
}

/// Whether the string is already a transportable `data:` URL.
pub fn is_data_url(url: &str) -> bool {
    url.starts_with("data:")
}
