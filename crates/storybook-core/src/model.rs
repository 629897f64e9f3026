//! Story, plan and image records shared by the pipeline stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one image of the book
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ImageKey {
    Cover,
    Page(u32),
}

impl ImageKey {
    pub const fn page_number(self) -> Option<u32> {
        match self {
            Self::Cover => None,
            Self::Page(n) => Some(n),
        }
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cover => write!(f, "cover"),
            Self::Page(n) => write!(f, "page:{n}"),
        }
    }
}

/// One page of narrative as returned by story generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryPage {
    #[serde(alias = "page")]
    pub page_number: u32,
    #[serde(default)]
    pub text: String,
    #[serde(default, alias = "scene", alias = "scene_text")]
    pub scene_description: String,
}

/// Per-page composition hints guiding illustration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    #[serde(alias = "page")]
    pub page_number: u32,
    #[serde(flatten)]
    pub framing: serde_json::Map<String, serde_json::Value>,
}

impl PlanEntry {
    pub fn framing_value(&self) -> serde_json::Value {
        serde_json::Value::Object(self.framing.clone())
    }
}

/// A generated illustration; ephemeral until uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub key: ImageKey,
    pub image_url: String,
}

/// A durable copy of an image held by the backend's storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAsset {
    pub key: ImageKey,
    pub asset_id: String,
    pub url: String,
}
