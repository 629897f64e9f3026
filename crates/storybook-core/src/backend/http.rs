use async_trait::async_trait;
use reqwest::{Client, Response, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::traits::Backend;
use super::types::{
    CoverRequest, ImageUrlResponse, ImagesRequest, ImagesResponse, PdfRequest, RefImageRequest,
    RefImageResponse, RegenerateRequest, StoryRequest, StoryResponse, UploadRequest,
    UploadResponse, error_field,
};
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::pdf::PdfDocument;

pub const STORY_PATH: &str = "/api/story";
pub const REF_IMAGE_PATH: &str = "/api/ref-image";
pub const COVER_PATH: &str = "/api/cover";
pub const IMAGES_PATH: &str = "/api/images";
pub const REGENERATE_PATH: &str = "/api/image/regenerate";
pub const UPLOAD_PATH: &str = "/api/images/upload";
pub const PDF_PATH: &str = "/api/pdf";

/// JSON-over-HTTP client for the storybook backend
pub struct HttpBackend {
    client: Client,
    /// Base URL (e.g., "http://localhost:8000")
    pub api_base: String,
    /// Optional bearer token
    pub api_key: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::BackendRequest {
                endpoint: "client".to_string(),
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Absolute URLs pass through; `/`-rooted paths are joined to the base.
    fn url(&self, path: &str) -> Result<String> {
        if path.starts_with("http://") || path.starts_with("https://") {
            Ok(path.to_string())
        } else if path.starts_with('/') {
            Ok(format!("{}{}", self.api_base, path))
        } else {
            Err(Error::BackendRequest {
                endpoint: path.to_string(),
                reason: "not an http(s) URL or a path on the backend".to_string(),
            })
        }
    }

    /// POST a JSON body and hand back the raw response once its status is a success
    async fn send<Req: Serialize + Sync>(&self, path: &str, body: &Req) -> Result<Response> {
        let url = self.url(path)?;
        debug!("POST {}", url);

        let mut req = self.client.post(&url).json(body);
        if let Some(ref key) = self.api_key {
            req = req.header(header::AUTHORIZATION, format!("Bearer {key}"));
        }

        let response = req.send().await.map_err(|e| transport_error(path, &e))?;
        check_status(path, response).await
    }

    async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let response = self.send(path, body).await?;
        let bytes = response.bytes().await.map_err(|e| transport_error(path, &e))?;
        parse_body(path, &bytes)
    }
}

/// Turn a non-success status into an error, preferring the server's own message
async fn check_status(path: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .as_ref()
        .and_then(error_field)
        .unwrap_or(body);
    warn!("{} answered {}: {}", path, status, message);

    Err(Error::BackendRequest {
        endpoint: path.to_string(),
        reason: format!("HTTP {status}: {message}"),
    })
}

fn transport_error(path: &str, e: &reqwest::Error) -> Error {
    warn!("Request to {} failed: {}", path, e);
    if e.is_timeout() {
        Error::BackendTimeout(path.to_string())
    } else {
        Error::BackendRequest {
            endpoint: path.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Decode a success body, honoring an explicit `error` field
fn parse_body<Resp: DeserializeOwned>(path: &str, bytes: &[u8]) -> Result<Resp> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| Error::BackendInvalidResponse {
        endpoint: path.to_string(),
        reason: e.to_string(),
    })?;

    if let Some(message) = error_field(&value) {
        return Err(Error::BackendReported {
            endpoint: path.to_string(),
            message,
        });
    }

    serde_json::from_value(value).map_err(|e| Error::BackendInvalidResponse {
        endpoint: path.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl Backend for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn story(&self, request: &StoryRequest) -> Result<StoryResponse> {
        self.post_json(STORY_PATH, request).await
    }

    async fn reference_image(&self, request: &RefImageRequest) -> Result<RefImageResponse> {
        self.post_json(REF_IMAGE_PATH, request).await
    }

    async fn cover(&self, request: &CoverRequest) -> Result<ImageUrlResponse> {
        self.post_json(COVER_PATH, request).await
    }

    async fn images(&self, request: &ImagesRequest) -> Result<ImagesResponse> {
        self.post_json(IMAGES_PATH, request).await
    }

    async fn regenerate(&self, request: &RegenerateRequest) -> Result<ImageUrlResponse> {
        self.post_json(REGENERATE_PATH, request).await
    }

    async fn upload(&self, request: &UploadRequest) -> Result<UploadResponse> {
        self.post_json(UPLOAD_PATH, request).await
    }

    async fn pdf(&self, request: &PdfRequest) -> Result<PdfDocument> {
        let response = self.send(PDF_PATH, request).await?;
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/pdf")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(PDF_PATH, &e))?;

        // A JSON body here is never a document
        if content_type.contains("json") {
            let value: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            return Err(match error_field(&value) {
                Some(message) => Error::BackendReported {
                    endpoint: PDF_PATH.to_string(),
                    message,
                },
                None => Error::BackendInvalidResponse {
                    endpoint: PDF_PATH.to_string(),
                    reason: "expected a document, got JSON".to_string(),
                },
            });
        }

        Ok(PdfDocument::new(bytes.to_vec(), content_type))
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        let full_url = self.url(url)?;
        debug!("GET {}", full_url);

        let response = self
            .client
            .get(&full_url)
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;
        let response = check_status(url, response).await?;
        let bytes = response.bytes().await.map_err(|e| transport_error(url, &e))?;
        Ok(bytes.to_vec())
    }
}
