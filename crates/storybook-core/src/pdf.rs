//! PDF manifest assembly and the rendered document.

use std::collections::BTreeMap;
use std::path::Path;

use crate::backend::types::ManifestEntry;
use crate::model::{GeneratedImage, ImageKey, UploadedAsset};

/// A rendered book as returned by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfDocument {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl PdfDocument {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
        }
    }

    /// Whether the bytes carry the `%PDF` magic
    pub fn is_pdf(&self) -> bool {
        self.bytes.starts_with(b"%PDF")
    }

    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        std::fs::write(path, &self.bytes)
    }
}

/// Image references for the PDF: cover first, then pages ascending.
///
/// Uploaded assets win over generated URLs for the same key.
pub fn build_manifest(
    cover_url: Option<&str>,
    images: &BTreeMap<u32, GeneratedImage>,
    uploads: &BTreeMap<ImageKey, UploadedAsset>,
) -> Vec<ManifestEntry> {
    let mut sources: BTreeMap<ImageKey, (Option<String>, String)> = BTreeMap::new();

    if let Some(url) = cover_url {
        sources.insert(ImageKey::Cover, (None, url.to_string()));
    }
    for image in images.values() {
        sources.insert(image.key, (None, image.image_url.clone()));
    }
    for asset in uploads.values() {
        sources.insert(asset.key, (Some(asset.asset_id.clone()), asset.url.clone()));
    }

    sources
        .into_iter()
        .map(|(key, (image_id, url))| ManifestEntry::new(key, image_id, url))
        .collect()
}
