//! Request and response bodies of the generation backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::form::ValidForm;
use crate::model::{ImageKey, PlanEntry, StoryPage};

/// `POST /api/story`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryRequest {
    pub name: String,
    pub age: u32,
    pub reading_age: u32,
    pub pages: u32,
    pub category: String,
    pub style: String,
    pub theme: String,
    pub traits: String,
}

impl StoryRequest {
    pub fn from_form(form: &ValidForm) -> Self {
        Self {
            name: form.name().to_string(),
            age: form.age(),
            reading_age: form.reading_age(),
            pages: form.pages().get(),
            category: form.category().as_str().to_string(),
            style: form.style().to_string(),
            theme: form.theme().to_string(),
            traits: form.traits().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryResponse {
    /// Whole story object; passed back verbatim to later calls
    pub story: Value,
    #[serde(default)]
    pub plan: Value,
}

/// The parts of `story.book` the pipeline reads
#[derive(Debug, Clone, Deserialize)]
struct Book {
    #[serde(default)]
    pages: Vec<StoryPage>,
    #[serde(default)]
    bible: Value,
}

impl StoryResponse {
    /// Pages (sorted by page number) and the character bible
    pub fn book(&self) -> Result<(Vec<StoryPage>, Value)> {
        let book = self.story.get("book").cloned().ok_or_else(|| invalid("story", "missing story.book"))?;
        let mut book: Book =
            serde_json::from_value(book).map_err(|e| invalid("story", &e.to_string()))?;

        if book.pages.is_empty() {
            return Err(invalid("story", "story has no pages"));
        }
        book.pages.sort_by_key(|p| p.page_number);
        Ok((book.pages, book.bible))
    }

    /// Entries of `plan.plan`; an absent plan is empty
    pub fn plan_entries(&self) -> Result<Vec<PlanEntry>> {
        match self.plan.get("plan") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(entries) => serde_json::from_value(entries.clone())
                .map_err(|e| invalid("story", &format!("bad plan: {e}"))),
        }
    }
}

/// `POST /api/ref-image`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefImageRequest {
    pub style: String,
    pub photo_b64: Option<String>,
    pub bible: Value,
    pub traits: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefImageResponse {
    pub ref_image_b64: String,
}

/// `POST /api/cover`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverRequest {
    pub style: String,
    pub ref_image_b64: String,
    pub story: Value,
}

/// Response of `/api/cover` and `/api/image/regenerate`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageUrlResponse {
    #[serde(default)]
    pub image_url: Option<String>,
}

impl ImageUrlResponse {
    pub fn require_url(self, endpoint: &str) -> Result<String> {
        self.image_url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| invalid(endpoint, "no image_url in response"))
    }
}

/// `POST /api/images`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagesRequest {
    pub style: String,
    pub ref_image_b64: String,
    pub story: Value,
    pub plan: Value,
    pub concurrency: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImagesResponse {
    #[serde(default)]
    pub images: Vec<PageImage>,
}

/// One page of an `/api/images` response; the URL is absent when that page failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageImage {
    pub page: u32,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /api/image/regenerate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegenerateRequest {
    pub style: String,
    pub ref_image_b64: String,
    pub page_text: String,
    pub scene_text: String,
    pub frame: Value,
    pub story: Value,
}

/// `POST /api/images/upload`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub items: Vec<UploadItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub data_url: String,
}

impl UploadItem {
    pub fn new(key: ImageKey, data_url: String) -> Self {
        let (kind, page) = key_fields(key);
        Self {
            kind,
            page,
            data_url,
        }
    }

    pub fn key(&self) -> Option<ImageKey> {
        key_from_fields(self.kind.as_deref(), self.page)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub uploads: Vec<UploadResult>,
}

/// Outcome for one upload item: either an asset or an error
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResult {
    pub fn key(&self) -> Option<ImageKey> {
        key_from_fields(self.kind.as_deref(), self.page)
    }
}

/// `POST /api/pdf`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfRequest {
    pub story: Value,
    pub images: Vec<ManifestEntry>,
    pub mode: String,
    pub trim: String,
    pub watermark_text: Option<String>,
}

/// One image reference in the PDF manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    pub url: String,
}

impl ManifestEntry {
    pub fn new(key: ImageKey, image_id: Option<String>, url: String) -> Self {
        let (kind, page) = key_fields(key);
        Self {
            kind,
            page,
            image_id,
            url,
        }
    }

    pub fn key(&self) -> Option<ImageKey> {
        key_from_fields(self.kind.as_deref(), self.page)
    }
}

/// Cover is tagged `kind: "cover"`, pages carry `page: n`
fn key_fields(key: ImageKey) -> (Option<String>, Option<u32>) {
    match key {
        ImageKey::Cover => (Some("cover".to_string()), None),
        ImageKey::Page(n) => (None, Some(n)),
    }
}

fn key_from_fields(kind: Option<&str>, page: Option<u32>) -> Option<ImageKey> {
    match (kind, page) {
        (Some("cover"), _) => Some(ImageKey::Cover),
        (_, Some(n)) => Some(ImageKey::Page(n)),
        _ => None,
    }
}

/// Text of an `error` field, if the body carries one
pub fn error_field(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::Null => None,
        Value::String(message) => Some(message.clone()),
        other => Some(other.to_string()),
    }
}

fn invalid(endpoint: &str, reason: &str) -> Error {
    Error::BackendInvalidResponse {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    }
}
