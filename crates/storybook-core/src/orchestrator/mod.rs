//! Generation runs: story, reference, cover and page illustrations, followed
//! by upload reconciliation and PDF export.
//!
//! All run state lives in one [`Session`] behind a lock. Every run gets a new
//! epoch; async completions re-check it before writing, so results of an
//! abandoned run never land in a newer one.

mod session;
mod stage;

pub use session::Session;
pub use stage::{Progress, RunStage, TOTAL_STEPS};

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::backend::types::{
    CoverRequest, ImagesRequest, PdfRequest, RefImageRequest, RegenerateRequest, StoryRequest,
};
use crate::backend::{Backend, create_backend};
use crate::cache::ImageCache;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::form::{Reference, ValidForm};
use crate::model::{GeneratedImage, ImageKey, PlanEntry};
use crate::pdf::{PdfDocument, build_manifest};
use crate::preview::{CardStatus, LoadJob, PreviewBoard, load_images};
use crate::upload::{self, Normalized, ReconcileReport};

/// Callback receiving every progress update
pub type ProgressFn = Box<dyn Fn(&Progress) + Send + Sync>;

type ProgressSink<'a> = Option<&'a (dyn Fn(&Progress) + Send + Sync)>;

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run: u64,
    pub cover_url: String,
    /// Pages that received an illustration
    pub illustrated: Vec<u32>,
    /// Pages left with a retry affordance
    pub missing: Vec<u32>,
}

struct StudioInner {
    backend: Arc<dyn Backend>,
    config: AppConfig,
    cache: ImageCache,
    session: RwLock<Session>,
}

/// Drives generation runs against a backend.
///
/// Cheap to clone; clones share the same run state.
#[derive(Clone)]
pub struct Studio {
    inner: Arc<StudioInner>,
}

impl Studio {
    /// Create a studio talking to the configured HTTP backend
    pub fn new(config: AppConfig) -> Result<Self> {
        let backend = create_backend(&config.backend)?;
        Ok(Self::with_backend(backend, config))
    }

    /// Create with a custom backend
    pub fn with_backend(backend: Arc<dyn Backend>, config: AppConfig) -> Self {
        info!("Using {} backend", backend.name());
        let cache = ImageCache::new(&config.cache);
        Self {
            inner: Arc::new(StudioInner {
                backend,
                config,
                cache,
                session: RwLock::new(Session::default()),
            }),
        }
    }

    /// Copy of the current run state
    pub async fn snapshot(&self) -> Session {
        self.inner.session.read().await.clone()
    }

    pub async fn pdf_ready(&self) -> bool {
        self.with_session(Session::pdf_ready).await
    }

    /// Read the session within a closure; the lock is released on return.
    async fn with_session<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Session) -> R,
    {
        let session = self.inner.session.read().await;
        f(&session)
    }

    /// Mutate the session if `run` is still the current run.
    async fn with_run_mut<F, R>(&self, run: u64, f: F) -> Result<R>
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut session = self.inner.session.write().await;
        if session.run != run {
            debug!("Discarding result of run {} (current run is {})", run, session.run);
            return Err(Error::StaleRun { run });
        }
        Ok(f(&mut session))
    }

    async fn enter(&self, run: u64, stage: RunStage, progress: ProgressSink<'_>) -> Result<()> {
        let update = self.with_run_mut(run, |s| s.advance(stage)).await??;
        info!("Run {}: {} ({}/{})", run, update.label, update.step, update.total);
        if let Some(callback) = progress {
            callback(&update);
        }
        Ok(())
    }

    /// Start a new run, discarding everything the previous one produced.
    async fn start_run(&self, form: &ValidForm) -> u64 {
        let mut session = self.inner.session.write().await;
        let run = session.run + 1;
        *session = Session::fresh(run, form.clone());
        self.inner.cache.clear();
        run
    }

    /// Run the whole generation pipeline for `form`.
    ///
    /// On failure the run moves to `Failed` and keeps whatever it had
    /// produced. If a newer run starts meanwhile this one ends with
    /// `Error::StaleRun` without touching the newer state.
    pub async fn generate(&self, form: &ValidForm, progress: Option<ProgressFn>) -> Result<RunSummary> {
        let run = self.start_run(form).await;
        let reference = match form.reference() {
            Reference::Photo(_) => "photo",
            Reference::Description(_) => "description",
        };
        info!(
            "Run {}: {} pages for {} in {} style, reference from {}",
            run,
            form.pages(),
            form.name(),
            form.style(),
            reference
        );

        let result = self.run_pipeline(run, form, progress.as_deref()).await;

        if let Err(e) = &result
            && !matches!(e, Error::StaleRun { .. })
        {
            error!("Run {} failed: {}", run, e);
            let failed = RunStage::Failed {
                message: e.to_string(),
            };
            if let Ok(Ok(update)) = self.with_run_mut(run, |s| s.advance(failed)).await
                && let Some(callback) = &progress
            {
                callback(&update);
            }
        }

        result
    }

    async fn run_pipeline(&self, run: u64, form: &ValidForm, progress: ProgressSink<'_>) -> Result<RunSummary> {
        let backend = self.inner.backend.as_ref();
        let config = &self.inner.config;

        // Story
        self.enter(run, RunStage::WritingStory, progress).await?;
        let response = backend.story(&StoryRequest::from_form(form)).await?;
        let (pages, bible) = response.book()?;
        let plan = response.plan_entries()?;

        if pages.len() != form.pages().get() as usize {
            warn!(
                "Requested {} pages, story has {}",
                form.pages(),
                pages.len()
            );
        }

        let story = response.story;
        let plan_raw = response.plan;
        let page_numbers: Vec<u32> = pages.iter().map(|p| p.page_number).collect();
        {
            let story = story.clone();
            let bible = bible.clone();
            let plan_raw = plan_raw.clone();
            let visible = config.preview.visible_pages;
            self.with_run_mut(run, move |s| {
                s.preview = PreviewBoard::render(&pages, visible);
                s.story = Some(story);
                s.bible = bible;
                s.plan_raw = plan_raw;
                s.pages = pages;
                s.plan = plan;
            })
            .await?;
        }

        // Character reference
        self.enter(run, RunStage::LockingReference, progress).await?;
        let reference = backend
            .reference_image(&RefImageRequest {
                style: form.style().to_string(),
                photo_b64: form.photo().map(str::to_string),
                bible,
                traits: form.traits().to_string(),
            })
            .await?;
        let ref_image = reference.ref_image_b64;
        if ref_image.trim().is_empty() {
            return Err(Error::BackendInvalidResponse {
                endpoint: "/api/ref-image".to_string(),
                reason: "empty reference image".to_string(),
            });
        }
        {
            let ref_image = ref_image.clone();
            self.with_run_mut(run, move |s| s.reference_image = Some(ref_image))
                .await?;
        }

        // Cover
        self.enter(run, RunStage::BuildingCover, progress).await?;
        let cover_url = backend
            .cover(&CoverRequest {
                style: form.style().to_string(),
                ref_image_b64: ref_image.clone(),
                story: story.clone(),
            })
            .await?
            .require_url("/api/cover")?;
        {
            let cover_url = cover_url.clone();
            self.with_run_mut(run, move |s| s.cover_url = Some(cover_url))
                .await?;
        }
        self.load_previews(
            run,
            vec![LoadJob {
                key: ImageKey::Cover,
                url: cover_url.clone(),
            }],
        )
        .await?;

        // Page illustrations
        self.enter(run, RunStage::IllustratingPages, progress).await?;
        let response = backend
            .images(&ImagesRequest {
                style: form.style().to_string(),
                ref_image_b64: ref_image,
                story,
                plan: plan_raw,
                concurrency: config.generation.images_concurrency,
            })
            .await?;

        let mut results = HashMap::with_capacity(response.images.len());
        for image in response.images {
            if !page_numbers.contains(&image.page) {
                warn!("Ignoring illustration for unknown page {}", image.page);
                continue;
            }
            results.insert(image.page, image);
        }

        let mut jobs = Vec::new();
        let mut missing = Vec::new();
        for &page_number in &page_numbers {
            let url = results
                .get(&page_number)
                .and_then(|r| r.image_url.clone())
                .filter(|url| !url.trim().is_empty());
            match url {
                Some(url) => jobs.push(LoadJob {
                    key: ImageKey::Page(page_number),
                    url,
                }),
                None => {
                    let reason = results
                        .get(&page_number)
                        .and_then(|r| r.error.clone())
                        .unwrap_or_else(|| "no illustration returned".to_string());
                    missing.push((page_number, reason));
                }
            }
        }

        {
            let jobs = jobs.clone();
            let missing = missing.clone();
            self.with_run_mut(run, move |s| {
                for job in jobs {
                    s.replace_page_image(GeneratedImage {
                        key: job.key,
                        image_url: job.url,
                    });
                }
                for (page_number, reason) in missing {
                    s.preview.mark_missing(ImageKey::Page(page_number), reason);
                }
            })
            .await?;
        }

        let illustrated = jobs.iter().filter_map(|j| j.key.page_number()).collect();
        self.load_previews(run, jobs).await?;

        if !missing.is_empty() {
            warn!("Run {}: {} pages without illustration", run, missing.len());
        }
        self.enter(run, RunStage::Done, progress).await?;

        Ok(RunSummary {
            run,
            cover_url,
            illustrated,
            missing: missing.into_iter().map(|(page_number, _)| page_number).collect(),
        })
    }

    /// Load preview images with bounded concurrency and apply them to their cards.
    async fn load_previews(&self, run: u64, jobs: Vec<LoadJob>) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }

        let backend = self.inner.backend.as_ref();
        let cache = &self.inner.cache;
        let outcomes = load_images(
            jobs,
            self.inner.config.preview.max_concurrent_loads,
            |url| async move { cache.get_or_fetch(&url, backend).await },
        )
        .await;

        self.with_run_mut(run, move |s| {
            for outcome in outcomes {
                s.preview.apply(outcome);
            }
        })
        .await
    }

    /// Illustrate one page again at the user's request.
    ///
    /// Success replaces that page's image and drops its durable copy so the
    /// next export uploads the new one.
    pub async fn retry_page(&self, page_number: u32) -> Result<GeneratedImage> {
        let (run, request) = self
            .with_session(|s| -> Result<(u64, RegenerateRequest)> {
                let form = s
                    .form
                    .as_ref()
                    .ok_or_else(|| Error::NotReady("no generation run yet".to_string()))?;
                let ref_image = s
                    .reference_image
                    .clone()
                    .ok_or_else(|| Error::NotReady("reference image not ready".to_string()))?;
                let story = s
                    .story
                    .clone()
                    .ok_or_else(|| Error::NotReady("story not ready".to_string()))?;
                let page = s.page(page_number).ok_or(Error::UnknownPage(page_number))?;
                let frame = s
                    .plan_entry(page_number)
                    .map_or(Value::Null, PlanEntry::framing_value);

                Ok((
                    s.run,
                    RegenerateRequest {
                        style: form.style().to_string(),
                        ref_image_b64: ref_image,
                        page_text: page.text.clone(),
                        scene_text: page.scene_description.clone(),
                        frame,
                        story,
                    },
                ))
            })
            .await?;

        let key = ImageKey::Page(page_number);
        self.with_run_mut(run, |s| s.preview.set_status(key, CardStatus::Loading))
            .await?;
        info!("Run {}: regenerating page {}", run, page_number);

        let url = match self
            .inner
            .backend
            .regenerate(&request)
            .await
            .and_then(|r| r.require_url("/api/image/regenerate"))
        {
            Ok(url) => url,
            Err(e) => {
                warn!("Regenerating page {} failed: {}", page_number, e);
                let reason = e.to_string();
                if let Err(stale) = self
                    .with_run_mut(run, |s| s.preview.mark_missing(key, reason))
                    .await
                {
                    debug!("Not marking page {} as failed: {}", page_number, stale);
                }
                return Err(e);
            }
        };

        let image = GeneratedImage {
            key,
            image_url: url.clone(),
        };
        {
            let image = image.clone();
            self.with_run_mut(run, move |s| s.replace_page_image(image))
                .await?;
        }
        self.load_previews(run, vec![LoadJob { key, url }]).await?;

        Ok(image)
    }

    /// Upload every image that has no durable copy yet.
    ///
    /// A no-op when everything is already uploaded. Images that cannot be
    /// normalized are listed in the report as skipped; uploads of images
    /// replaced while in flight are listed as discarded and not recorded.
    pub async fn reconcile_uploads(&self) -> Result<ReconcileReport> {
        let (run, pending) = self.with_session(|s| (s.run, s.pending_uploads())).await;
        if pending.is_empty() {
            debug!("Run {}: all images already uploaded", run);
            return Ok(ReconcileReport::default());
        }

        // URL each upload was made from
        let sources: HashMap<ImageKey, String> = pending
            .iter()
            .map(|image| (image.key, image.url.clone()))
            .collect();

        let backend = self.inner.backend.as_ref();
        let mut items = Vec::with_capacity(pending.len());
        let mut skipped = Vec::new();
        for image in pending {
            match upload::normalize(image, backend, &self.inner.cache).await {
                Normalized::Ready(item) => items.push(item),
                Normalized::Skipped { key, reason } => skipped.push((key, reason)),
            }
        }

        if items.is_empty() {
            return Ok(ReconcileReport {
                skipped,
                ..Default::default()
            });
        }

        let outcome =
            upload::submit_batches(backend, items, self.inner.config.upload.batch_size).await;

        let (uploaded, discarded) = self
            .with_run_mut(run, move |s| {
                let mut uploaded = Vec::new();
                let mut discarded = Vec::new();
                for asset in outcome.uploaded {
                    let current = s.image_url(asset.key);
                    if current.is_some() && current == sources.get(&asset.key).map(String::as_str) {
                        s.uploads.insert(asset.key, asset.clone());
                        uploaded.push(asset);
                    } else {
                        debug!("Discarding upload of {}: image replaced meanwhile", asset.key);
                        discarded.push(asset.key);
                    }
                }
                (uploaded, discarded)
            })
            .await?;

        if let Some(e) = outcome.error {
            return Err(e);
        }

        if !discarded.is_empty() {
            info!("Run {}: {} uploads superseded by newer images", run, discarded.len());
        }

        Ok(ReconcileReport {
            uploaded,
            skipped,
            discarded,
            requests: outcome.requests,
        })
    }

    /// Ask the backend to render the book from the current images.
    pub async fn request_pdf(&self) -> Result<PdfDocument> {
        let (story, manifest) = self
            .with_session(|s| {
                (
                    s.story.clone(),
                    build_manifest(s.cover_url.as_deref(), &s.images, &s.uploads),
                )
            })
            .await;

        if manifest.is_empty() {
            return Err(Error::EmptyManifest);
        }
        let story = story.ok_or_else(|| Error::NotReady("story not ready".to_string()))?;

        let pdf = &self.inner.config.pdf;
        let request = PdfRequest {
            story,
            images: manifest,
            mode: pdf.mode.clone(),
            trim: pdf.trim.clone(),
            watermark_text: pdf.watermark_text.clone(),
        };

        info!("Requesting PDF with {} images", request.images.len());
        let document = self.inner.backend.pdf(&request).await?;
        if !document.is_pdf() {
            warn!("PDF response has content type {}", document.content_type);
        }
        Ok(document)
    }

    /// Make every image durable, then render the PDF.
    pub async fn export_pdf(&self) -> Result<PdfDocument> {
        let report = self.reconcile_uploads().await?;
        for (key, reason) in &report.skipped {
            warn!("{} will use its generated URL: {}", key, reason);
        }
        self.request_pdf().await
    }
}
