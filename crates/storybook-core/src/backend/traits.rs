use async_trait::async_trait;

use super::types::{
    CoverRequest, ImageUrlResponse, ImagesRequest, ImagesResponse, PdfRequest, RefImageRequest,
    RefImageResponse, RegenerateRequest, StoryRequest, StoryResponse, UploadRequest,
    UploadResponse,
};
use crate::error::Result;
use crate::pdf::PdfDocument;

/// Trait for generation backends
///
/// Implementations must turn both non-success statuses and an explicit
/// `error` field in the body into an `Err`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Human-readable name, used in logs
    fn name(&self) -> &'static str;

    /// Write the story and its illustration plan
    async fn story(&self, request: &StoryRequest) -> Result<StoryResponse>;

    /// Produce the character reference image
    async fn reference_image(&self, request: &RefImageRequest) -> Result<RefImageResponse>;

    /// Paint the cover
    async fn cover(&self, request: &CoverRequest) -> Result<ImageUrlResponse>;

    /// Illustrate every page
    async fn images(&self, request: &ImagesRequest) -> Result<ImagesResponse>;

    /// Illustrate a single page again
    async fn regenerate(&self, request: &RegenerateRequest) -> Result<ImageUrlResponse>;

    /// Store encoded images durably
    async fn upload(&self, request: &UploadRequest) -> Result<UploadResponse>;

    /// Render the finished book
    async fn pdf(&self, request: &PdfRequest) -> Result<PdfDocument>;

    /// Download the bytes behind an image URL
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>>;
}
