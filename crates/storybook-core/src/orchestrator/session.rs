use serde_json::Value;
use std::collections::BTreeMap;

use super::stage::{Progress, RunStage};
use crate::error::Result;
use crate::form::ValidForm;
use crate::model::{GeneratedImage, ImageKey, PlanEntry, StoryPage, UploadedAsset};
use crate::preview::PreviewBoard;
use crate::upload::PendingImage;

/// Everything one generation run has produced so far
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Epoch of the run that owns this state
    pub run: u64,
    pub stage: RunStage,
    pub progress: Progress,
    pub form: Option<ValidForm>,
    /// Story object as returned by the backend
    pub story: Option<Value>,
    pub bible: Value,
    /// Plan object as returned by the backend
    pub plan_raw: Value,
    pub pages: Vec<StoryPage>,
    pub plan: Vec<PlanEntry>,
    pub reference_image: Option<String>,
    pub cover_url: Option<String>,
    /// Page illustrations keyed by page number
    pub images: BTreeMap<u32, GeneratedImage>,
    pub uploads: BTreeMap<ImageKey, UploadedAsset>,
    pub preview: PreviewBoard,
}

impl Session {
    pub fn fresh(run: u64, form: ValidForm) -> Self {
        Self {
            run,
            progress: Progress::for_stage(run, &RunStage::Idle, 0),
            form: Some(form),
            ..Default::default()
        }
    }

    /// Move to `next` and return the progress to report
    pub fn advance(&mut self, next: RunStage) -> Result<Progress> {
        self.stage.transition(next)?;
        self.progress = Progress::for_stage(self.run, &self.stage, self.progress.step);
        Ok(self.progress.clone())
    }

    pub fn page(&self, page_number: u32) -> Option<&StoryPage> {
        self.pages.iter().find(|p| p.page_number == page_number)
    }

    pub fn plan_entry(&self, page_number: u32) -> Option<&PlanEntry> {
        self.plan.iter().find(|p| p.page_number == page_number)
    }

    /// Page illustrations in page order
    pub fn generated_images(&self) -> Vec<GeneratedImage> {
        self.images.values().cloned().collect()
    }

    /// Story pages that have no illustration
    pub fn missing_pages(&self) -> Vec<u32> {
        self.pages
            .iter()
            .map(|p| p.page_number)
            .filter(|n| !self.images.contains_key(n))
            .collect()
    }

    /// Store a page illustration, dropping any durable copy of the old one.
    pub fn replace_page_image(&mut self, image: GeneratedImage) {
        if let Some(page_number) = image.key.page_number() {
            self.uploads.remove(&image.key);
            self.images.insert(page_number, image);
        }
    }

    /// Current URL of the cover or a page illustration
    pub fn image_url(&self, key: ImageKey) -> Option<&str> {
        match key {
            ImageKey::Cover => self.cover_url.as_deref(),
            ImageKey::Page(n) => self.images.get(&n).map(|image| image.image_url.as_str()),
        }
    }

    /// Cover and every page illustrated; the PDF export may start.
    pub fn pdf_ready(&self) -> bool {
        self.cover_url.is_some() && !self.pages.is_empty() && self.missing_pages().is_empty()
    }

    /// Images lacking an uploaded copy, cover first
    pub fn pending_uploads(&self) -> Vec<PendingImage> {
        let cover = self
            .cover_url
            .iter()
            .map(|url| (ImageKey::Cover, url.clone()));
        let pages = self
            .images
            .values()
            .map(|image| (image.key, image.image_url.clone()));

        cover
            .chain(pages)
            .filter(|(key, _)| !self.uploads.contains_key(key))
            .map(|(key, url)| PendingImage {
                key,
                url,
                captured: self.preview.captured(key),
            })
            .collect()
    }
}
