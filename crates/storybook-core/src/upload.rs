//! Upload reconciliation: make every known image durable.
//!
//! Images still missing an uploaded copy are normalized to `data:` URLs and
//! submitted in fixed-size batches. Items that cannot be normalized are
//! reported as skipped rather than aborting the whole reconciliation.

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::backend::types::{UploadItem, UploadRequest};
use crate::cache::ImageCache;
use crate::data_url::{EncodedImage, is_data_url};
use crate::error::Error;
use crate::model::{ImageKey, UploadedAsset};

/// An image without a durable copy yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingImage {
    pub key: ImageKey,
    pub url: String,
    /// Bytes already loaded into the preview card
    pub captured: Option<Bytes>,
}

/// Result of preparing one image for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Ready(UploadItem),
    Skipped { key: ImageKey, reason: String },
}

/// What one reconciliation did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub uploaded: Vec<UploadedAsset>,
    pub skipped: Vec<(ImageKey, String)>,
    /// Uploads whose image was replaced while they were in flight
    pub discarded: Vec<ImageKey>,
    /// Upload requests issued
    pub requests: usize,
}

impl ReconcileReport {
    pub const fn is_noop(&self) -> bool {
        self.requests == 0
            && self.uploaded.is_empty()
            && self.skipped.is_empty()
            && self.discarded.is_empty()
    }
}

fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://") || url.starts_with('/')
}

/// Bring one image into a transportable encoding.
///
/// `data:` URLs are reused as-is, remote URLs are fetched and re-encoded,
/// and anything else is recovered from the bytes captured by its preview card.
pub async fn normalize(pending: PendingImage, backend: &dyn Backend, cache: &ImageCache) -> Normalized {
    let PendingImage { key, url, captured } = pending;

    if is_data_url(&url) {
        return reuse_data_url(key, url);
    }

    let encoded = if is_remote(&url) {
        match cache.get_or_fetch(&url, backend).await {
            Ok(bytes) => EncodedImage::reencode_png(&bytes),
            Err(e) => Err(e),
        }
    } else if let Some(bytes) = captured {
        EncodedImage::reencode_png(&bytes)
    } else {
        Err(Error::NotReady(format!("no loaded copy of {url}")))
    };

    match encoded {
        Ok(image) => Normalized::Ready(UploadItem::new(key, image.to_data_url())),
        Err(e) => {
            warn!("Skipping upload of {}: {}", key, e);
            Normalized::Skipped {
                key,
                reason: e.to_string(),
            }
        }
    }
}

/// Reuse an already encoded image if its payload decodes.
fn reuse_data_url(key: ImageKey, url: String) -> Normalized {
    match EncodedImage::from_data_url(&url) {
        Ok(_) => Normalized::Ready(UploadItem::new(key, url)),
        Err(e) => {
            warn!("Skipping upload of {}: {}", key, e);
            Normalized::Skipped {
                key,
                reason: e.to_string(),
            }
        }
    }
}

/// Assets accepted by the backend, plus the error that stopped submission
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub uploaded: Vec<UploadedAsset>,
    pub requests: usize,
    pub error: Option<Error>,
}

/// Submit `items` in batches of `batch_size`.
///
/// The first failure (request-level or item-level) stops submission; assets
/// accepted before it are still returned so callers can record them.
pub async fn submit_batches(
    backend: &dyn Backend,
    items: Vec<UploadItem>,
    batch_size: usize,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();

    for batch in items.chunks(batch_size.max(1)) {
        outcome.requests += 1;
        debug!("Uploading batch {} ({} items)", outcome.requests, batch.len());

        let response = match backend
            .upload(&UploadRequest {
                items: batch.to_vec(),
            })
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Upload request failed: {}", e);
                outcome.error = Some(e);
                return outcome;
            }
        };

        for (index, item) in batch.iter().enumerate() {
            let key = item.key().unwrap_or(ImageKey::Cover);

            // Match by kind/page, falling back to position
            let result = response
                .uploads
                .iter()
                .find(|r| r.key().is_some() && r.key() == item.key())
                .or_else(|| response.uploads.get(index).filter(|r| r.key().is_none()));

            let accepted = match result {
                None => Err("missing from upload response".to_string()),
                Some(result) => match (&result.error, &result.image_id, &result.url) {
                    (Some(message), _, _) => Err(message.clone()),
                    (None, Some(asset_id), Some(url)) => Ok(UploadedAsset {
                        key,
                        asset_id: asset_id.clone(),
                        url: url.clone(),
                    }),
                    _ => Err("response lacks image_id or url".to_string()),
                },
            };

            match accepted {
                Ok(asset) => outcome.uploaded.push(asset),
                Err(message) => {
                    let e = Error::UploadItem {
                        key: key.to_string(),
                        message,
                    };
                    warn!("Upload aborted: {}", e);
                    outcome.error = Some(e);
                    return outcome;
                }
            }
        }
    }

    info!(
        "Uploaded {} images in {} requests",
        outcome.uploaded.len(),
        outcome.requests
    );
    outcome
}
