//! Integration tests for storybook-core
//!
//! These tests verify the end-to-end workflow:
//! - Generation runs with a mock backend
//! - Partial failures and single-page retries
//! - Upload reconciliation batching and idempotency
//! - PDF manifest assembly

use async_trait::async_trait;
use image::ImageEncoder;
use serde_json::json;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storybook_core::backend::types::{
    CoverRequest, ImageUrlResponse, ImagesRequest, ImagesResponse, PageImage, PdfRequest,
    RefImageRequest, RefImageResponse, RegenerateRequest, StoryRequest, StoryResponse,
    UploadRequest, UploadResponse, UploadResult,
};
use storybook_core::{
    AppConfig, Backend, CardStatus, Error, FormState, ImageKey, PdfDocument, Progress,
    ReferenceMode, Result, RunStage, Studio, ValidForm,
};

// =============================================================================
// Mock Backend for Testing
// =============================================================================

/// A mock backend that answers every endpoint without network calls.
#[derive(Default)]
struct MockBackend {
    /// Endpoint that answers with an error ("story", "ref", "cover", "images", "regenerate")
    fail_at: Option<&'static str>,
    /// Pages `/api/images` returns without a URL
    missing_pages: Vec<u32>,
    /// Page whose upload item is rejected
    reject_upload_of: Option<u32>,
    /// URL scheme for page illustrations
    page_url_prefix: Option<&'static str>,
    /// Delay (ms) applied to successive story calls
    story_delays: Mutex<VecDeque<u64>>,
    /// Delay (ms) applied to every upload call
    upload_delay_ms: u64,

    story_requests: Mutex<Vec<StoryRequest>>,
    ref_requests: Mutex<Vec<RefImageRequest>>,
    regenerations: AtomicUsize,
    upload_requests: Mutex<Vec<UploadRequest>>,
    pdf_requests: Mutex<Vec<PdfRequest>>,
    fetches: AtomicUsize,
}

impl MockBackend {
    fn new() -> Self {
        Self::default()
    }

    fn failing_at(endpoint: &'static str) -> Self {
        Self {
            fail_at: Some(endpoint),
            ..Self::default()
        }
    }

    fn fails(&self, endpoint: &str) -> Result<()> {
        if self.fail_at == Some(endpoint) {
            return Err(Error::BackendReported {
                endpoint: endpoint.to_string(),
                message: format!("mock {endpoint} failure"),
            });
        }
        Ok(())
    }

    fn upload_count(&self) -> usize {
        self.upload_requests.lock().unwrap().len()
    }
}

fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(8, 8, image::Rgb([30, 120, 200]));
    let mut out = Vec::new();
    image::codecs::png::PngEncoder::new(&mut out)
        .write_image(img.as_raw(), 8, 8, image::ExtendedColorType::Rgb8)
        .unwrap();
    out
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn story(&self, request: &StoryRequest) -> Result<StoryResponse> {
        self.story_requests.lock().unwrap().push(request.clone());
        let delay = self.story_delays.lock().unwrap().pop_front();
        if let Some(ms) = delay {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        self.fails("story")?;

        let pages: Vec<_> = (1..=request.pages)
            .map(|n| json!({"page": n, "text": format!("{} page {n}", request.name), "scene": format!("scene {n}")}))
            .collect();
        let plan: Vec<_> = (1..=request.pages)
            .map(|n| json!({"page": n, "shot": if n % 2 == 0 { "close" } else { "wide" }}))
            .collect();

        Ok(serde_json::from_value(json!({
            "story": {"book": {"pages": pages, "bible": {"hero": request.name}}},
            "plan": {"plan": plan}
        }))
        .unwrap())
    }

    async fn reference_image(&self, request: &RefImageRequest) -> Result<RefImageResponse> {
        self.ref_requests.lock().unwrap().push(request.clone());
        self.fails("ref")?;
        Ok(RefImageResponse {
            ref_image_b64: "UkVG".to_string(),
        })
    }

    async fn cover(&self, _request: &CoverRequest) -> Result<ImageUrlResponse> {
        self.fails("cover")?;
        Ok(ImageUrlResponse {
            image_url: Some("https://gen.example/cover.png".to_string()),
        })
    }

    async fn images(&self, request: &ImagesRequest) -> Result<ImagesResponse> {
        self.fails("images")?;
        let plan = request.plan["plan"].as_array().cloned().unwrap_or_default();
        let prefix = self.page_url_prefix.unwrap_or("https://gen.example/");

        let images = plan
            .iter()
            .filter_map(|entry| entry["page"].as_u64())
            .map(|n| {
                let n = u32::try_from(n).unwrap();
                PageImage {
                    page: n,
                    image_url: (!self.missing_pages.contains(&n))
                        .then(|| format!("{prefix}page-{n}.png")),
                    error: None,
                }
            })
            .collect();
        Ok(ImagesResponse { images })
    }

    async fn regenerate(&self, request: &RegenerateRequest) -> Result<ImageUrlResponse> {
        let count = self.regenerations.fetch_add(1, Ordering::SeqCst) + 1;
        assert!(!request.page_text.is_empty());
        self.fails("regenerate")?;
        Ok(ImageUrlResponse {
            image_url: Some(format!("https://gen.example/retry-{count}.png")),
        })
    }

    async fn upload(&self, request: &UploadRequest) -> Result<UploadResponse> {
        self.upload_requests.lock().unwrap().push(request.clone());
        if self.upload_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.upload_delay_ms)).await;
        }

        let uploads = request
            .items
            .iter()
            .map(|item| {
                if item.page.is_some() && item.page == self.reject_upload_of {
                    return UploadResult {
                        error: Some("image too large".to_string()),
                        ..Default::default()
                    };
                }
                let id = item
                    .page
                    .map_or_else(|| "cover".to_string(), |n| format!("p{n}"));
                UploadResult {
                    kind: item.kind.clone(),
                    page: item.page,
                    image_id: Some(format!("img_{id}")),
                    url: Some(format!("https://cdn.example/img_{id}.png")),
                    error: None,
                }
            })
            .collect();
        Ok(UploadResponse { uploads })
    }

    async fn pdf(&self, request: &PdfRequest) -> Result<PdfDocument> {
        self.pdf_requests.lock().unwrap().push(request.clone());
        Ok(PdfDocument::new(b"%PDF-1.7 mock".to_vec(), "application/pdf"))
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if url.contains("broken") {
            return Err(Error::BackendRequest {
                endpoint: url.to_string(),
                reason: "HTTP 404 Not Found".to_string(),
            });
        }
        Ok(png_bytes())
    }
}

// =============================================================================
// Test Fixtures
// =============================================================================

fn form(pages: u32) -> ValidForm {
    FormState {
        name: "Astrid".to_string(),
        age: 6,
        reading_age: 6,
        page_count: pages,
        style: "watercolor".to_string(),
        theme: "the sea".to_string(),
        traits: "curly red hair and a green raincoat".to_string(),
        ..Default::default()
    }
    .validate()
    .expect("fixture form should be valid")
}

fn studio(backend: &Arc<MockBackend>) -> Studio {
    Studio::with_backend(Arc::clone(backend) as Arc<dyn Backend>, AppConfig::default())
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_description_without_traits_is_rejected() {
    let form = FormState {
        name: "Astrid".to_string(),
        page_count: 16,
        reference_mode: ReferenceMode::Description,
        traits: String::new(),
        ..Default::default()
    };

    let err = form.validate().unwrap_err();
    let messages = err.validation_messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("at least 6 characters"));
    assert!(messages[0].contains("photo"));
}

// =============================================================================
// Generation Runs
// =============================================================================

#[tokio::test]
async fn test_successful_twelve_page_run() {
    let backend = Arc::new(MockBackend::new());
    let studio = studio(&backend);

    let updates: Arc<Mutex<Vec<Progress>>> = Arc::default();
    let sink = Arc::clone(&updates);
    let summary = studio
        .generate(
            &form(12),
            Some(Box::new(move |p: &Progress| sink.lock().unwrap().push(p.clone()))),
        )
        .await
        .expect("run should succeed");

    assert_eq!(summary.illustrated, (1..=12).collect::<Vec<_>>());
    assert!(summary.missing.is_empty());

    let session = studio.snapshot().await;
    assert_eq!(session.stage, RunStage::Done);
    assert!(session.cover_url.is_some());

    let images = session.generated_images();
    assert_eq!(images.len(), 12);
    let pages: HashSet<_> = images.iter().filter_map(|i| i.key.page_number()).collect();
    assert_eq!(pages, (1..=12).collect());
    assert!(studio.pdf_ready().await);

    let steps: Vec<_> = updates.lock().unwrap().iter().map(|p| (p.step, p.total)).collect();
    assert_eq!(steps, [(1, 4), (2, 4), (3, 4), (4, 4), (4, 4)]);

    // Every card loaded, cover included
    assert!(session
        .preview
        .cards()
        .iter()
        .all(|c| matches!(c.status, CardStatus::Loaded { .. })));

    // Description mode sends traits, never a photo
    let ref_request = backend.ref_requests.lock().unwrap()[0].clone();
    assert!(ref_request.photo_b64.is_none());
    assert_eq!(ref_request.bible["hero"], "Astrid");
}

#[tokio::test]
async fn test_story_requests_exact_page_count() {
    for pages in [12, 16, 20] {
        let backend = Arc::new(MockBackend::new());
        let studio = studio(&backend);
        studio.generate(&form(pages), None).await.unwrap();

        let requests = backend.story_requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].pages, pages);
        assert_eq!(requests[0].category, "early_reader");
    }
}

#[tokio::test]
async fn test_failure_keeps_partial_results() {
    let backend = Arc::new(MockBackend::failing_at("cover"));
    let studio = studio(&backend);

    let err = studio.generate(&form(12), None).await.unwrap_err();
    assert!(err.to_string().contains("mock cover failure"));

    let session = studio.snapshot().await;
    assert!(matches!(session.stage, RunStage::Failed { ref message } if message.contains("mock cover failure")));
    assert_eq!(session.progress.step, 3);
    assert_eq!(session.pages.len(), 12);
    assert!(session.reference_image.is_some());
    assert!(session.cover_url.is_none());
    assert!(!studio.pdf_ready().await);
}

#[tokio::test]
async fn test_missing_pages_offer_retry() {
    let backend = Arc::new(MockBackend {
        missing_pages: vec![3, 7],
        ..MockBackend::default()
    });
    let studio = studio(&backend);

    let summary = studio.generate(&form(12), None).await.unwrap();
    assert_eq!(summary.missing, vec![3, 7]);

    let session = studio.snapshot().await;
    assert_eq!(session.stage, RunStage::Done);
    assert_eq!(session.preview.retryable_pages(), vec![3, 7]);
    assert!(!studio.pdf_ready().await);

    let retried = studio.retry_page(3).await.unwrap();
    assert_eq!(retried.key, ImageKey::Page(3));
    assert!(!studio.pdf_ready().await);

    studio.retry_page(7).await.unwrap();
    assert!(studio.pdf_ready().await);
    assert_eq!(backend.regenerations.load(Ordering::SeqCst), 2);

    let session = studio.snapshot().await;
    assert!(session.preview.retryable_pages().is_empty());
}

#[tokio::test]
async fn test_retry_unknown_page_or_before_run() {
    let backend = Arc::new(MockBackend::new());
    let studio = studio(&backend);

    assert!(matches!(studio.retry_page(1).await, Err(Error::NotReady(_))));

    studio.generate(&form(12), None).await.unwrap();
    assert!(matches!(studio.retry_page(13).await, Err(Error::UnknownPage(13))));
    assert_eq!(backend.regenerations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failed_retry_keeps_page_retryable() {
    let backend = Arc::new(MockBackend {
        fail_at: Some("regenerate"),
        missing_pages: vec![3],
        ..MockBackend::default()
    });
    let studio = studio(&backend);
    studio.generate(&form(12), None).await.unwrap();

    let err = studio.retry_page(3).await.unwrap_err();
    assert!(err.to_string().contains("mock regenerate failure"));

    let session = studio.snapshot().await;
    assert_eq!(session.stage, RunStage::Done);
    assert_eq!(session.preview.retryable_pages(), vec![3]);
    assert!(!session.images.contains_key(&3));
}

#[tokio::test]
async fn test_newer_run_discards_stale_results() {
    let backend = Arc::new(MockBackend::new());
    backend.story_delays.lock().unwrap().push_back(200);
    let studio = studio(&backend);

    let first = {
        let studio = studio.clone();
        let form = form(12);
        tokio::spawn(async move { studio.generate(&form, None).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second_form = FormState {
        name: "Bo".to_string(),
        page_count: 16,
        traits: "tall and freckled".to_string(),
        ..Default::default()
    }
    .validate()
    .unwrap();
    studio.generate(&second_form, None).await.unwrap();

    let first_result = first.await.unwrap();
    assert!(matches!(first_result, Err(Error::StaleRun { run: 1 })));

    let session = studio.snapshot().await;
    assert_eq!(session.run, 2);
    assert_eq!(session.stage, RunStage::Done);
    assert_eq!(session.pages.len(), 16);
    assert!(session.pages[0].text.starts_with("Bo"));
}

// =============================================================================
// Upload Reconciliation
// =============================================================================

#[tokio::test]
async fn test_reconcile_batches_and_is_idempotent() {
    let backend = Arc::new(MockBackend::new());
    let studio = studio(&backend);
    studio.generate(&form(12), None).await.unwrap();

    let report = studio.reconcile_uploads().await.unwrap();
    assert_eq!(report.uploaded.len(), 13);
    assert_eq!(report.requests, 3);
    assert!(report.skipped.is_empty());

    let sizes: Vec<_> = backend
        .upload_requests
        .lock()
        .unwrap()
        .iter()
        .map(|r| r.items.len())
        .collect();
    assert_eq!(sizes, [6, 6, 1]);

    let again = studio.reconcile_uploads().await.unwrap();
    assert!(again.is_noop());
    assert_eq!(backend.upload_count(), 3);
}

#[tokio::test]
async fn test_remote_images_fetched_once() {
    let backend = Arc::new(MockBackend::new());
    let studio = studio(&backend);
    studio.generate(&form(12), None).await.unwrap();
    let after_previews = backend.fetches.load(Ordering::SeqCst);
    assert_eq!(after_previews, 13);

    studio.reconcile_uploads().await.unwrap();
    assert_eq!(backend.fetches.load(Ordering::SeqCst), after_previews);

    let first = backend.upload_requests.lock().unwrap()[0].items[0].clone();
    assert_eq!(first.kind.as_deref(), Some("cover"));
    assert!(first.data_url.starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn test_retry_invalidates_only_that_upload() {
    let backend = Arc::new(MockBackend::new());
    let studio = studio(&backend);
    studio.generate(&form(12), None).await.unwrap();
    studio.reconcile_uploads().await.unwrap();

    let before = studio.snapshot().await;
    let retried = studio.retry_page(5).await.unwrap();
    let after = studio.snapshot().await;

    assert_eq!(after.images.len(), 12);
    assert_eq!(after.images[&5], retried);
    assert_eq!(after.uploads.len(), 12);
    assert!(!after.uploads.contains_key(&ImageKey::Page(5)));
    for n in (1..=12).filter(|&n| n != 5) {
        assert_eq!(after.images[&n], before.images[&n]);
        assert_eq!(after.uploads[&ImageKey::Page(n)], before.uploads[&ImageKey::Page(n)]);
    }

    let report = studio.reconcile_uploads().await.unwrap();
    assert_eq!(report.requests, 1);
    assert_eq!(report.uploaded.len(), 1);
    assert_eq!(report.uploaded[0].key, ImageKey::Page(5));
}

#[tokio::test]
async fn test_retry_during_upload_discards_old_copy() {
    let backend = Arc::new(MockBackend {
        upload_delay_ms: 200,
        ..MockBackend::default()
    });
    let studio = studio(&backend);
    studio.generate(&form(12), None).await.unwrap();

    let reconcile = {
        let studio = studio.clone();
        tokio::spawn(async move { studio.reconcile_uploads().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let retried = studio.retry_page(5).await.unwrap();

    let report = reconcile.await.unwrap().unwrap();
    assert_eq!(report.discarded, vec![ImageKey::Page(5)]);
    assert_eq!(report.uploaded.len(), 12);
    assert!(!studio.snapshot().await.uploads.contains_key(&ImageKey::Page(5)));

    // Export uploads the replacement before rendering
    studio.export_pdf().await.unwrap();
    let last_upload = backend.upload_requests.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last_upload.items.len(), 1);
    assert_eq!(last_upload.items[0].page, Some(5));

    let session = studio.snapshot().await;
    assert_eq!(session.images[&5], retried);
    assert!(session.uploads.contains_key(&ImageKey::Page(5)));

    let request = backend.pdf_requests.lock().unwrap()[0].clone();
    let page5 = request.images.iter().find(|e| e.page == Some(5)).unwrap();
    assert_eq!(page5.url, session.uploads[&ImageKey::Page(5)].url);
}

#[tokio::test]
async fn test_newer_run_discards_stale_uploads() {
    let backend = Arc::new(MockBackend {
        upload_delay_ms: 200,
        ..MockBackend::default()
    });
    let studio = studio(&backend);
    studio.generate(&form(12), None).await.unwrap();

    let reconcile = {
        let studio = studio.clone();
        tokio::spawn(async move { studio.reconcile_uploads().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    studio.generate(&form(16), None).await.unwrap();

    let result = reconcile.await.unwrap();
    assert!(matches!(result, Err(Error::StaleRun { run: 1 })));

    let session = studio.snapshot().await;
    assert_eq!(session.run, 2);
    assert!(session.uploads.is_empty());
}

#[tokio::test]
async fn test_item_error_aborts_reconciliation() {
    let backend = Arc::new(MockBackend {
        reject_upload_of: Some(8),
        ..MockBackend::default()
    });
    let studio = studio(&backend);
    studio.generate(&form(12), None).await.unwrap();

    let err = studio.reconcile_uploads().await.unwrap_err();
    assert!(matches!(err, Error::UploadItem { ref key, ref message } if key == "page:8" && message == "image too large"));

    // First batch (cover, 1-5) and the items before page 8 stay recorded
    let session = studio.snapshot().await;
    let uploaded: Vec<_> = session.uploads.keys().copied().collect();
    let mut expected = vec![ImageKey::Cover];
    expected.extend((1..=7).map(ImageKey::Page));
    assert_eq!(uploaded, expected);
    assert_eq!(backend.upload_count(), 2);
}

#[tokio::test]
async fn test_ephemeral_images_use_captured_bytes() {
    let backend = Arc::new(MockBackend {
        page_url_prefix: Some("memory://"),
        ..MockBackend::default()
    });
    let studio = studio(&backend);
    studio.generate(&form(12), None).await.unwrap();

    let report = studio.reconcile_uploads().await.unwrap();
    assert_eq!(report.uploaded.len(), 13);
    assert!(report.skipped.is_empty());
}

#[tokio::test]
async fn test_unnormalizable_images_are_skipped() {
    let backend = Arc::new(MockBackend {
        page_url_prefix: Some("memory://broken/"),
        ..MockBackend::default()
    });
    let studio = studio(&backend);
    studio.generate(&form(12), None).await.unwrap();

    let session = studio.snapshot().await;
    assert_eq!(session.preview.retryable_pages().len(), 12);

    let report = studio.reconcile_uploads().await.unwrap();
    assert_eq!(report.uploaded.len(), 1);
    assert_eq!(report.uploaded[0].key, ImageKey::Cover);
    assert_eq!(report.skipped.len(), 12);

    // Skipped pages fall back to their generated URLs in the manifest
    studio.request_pdf().await.unwrap();
    let request = backend.pdf_requests.lock().unwrap()[0].clone();
    assert_eq!(request.images.len(), 13);
    assert_eq!(request.images[1].url, "memory://broken/page-1.png");
    assert!(request.images[1].image_id.is_none());
}

// =============================================================================
// PDF Export
// =============================================================================

#[tokio::test]
async fn test_export_prefers_uploaded_assets() {
    let backend = Arc::new(MockBackend::new());
    let studio = studio(&backend);
    studio.generate(&form(12), None).await.unwrap();

    let document = studio.export_pdf().await.unwrap();
    assert!(document.is_pdf());

    let request = backend.pdf_requests.lock().unwrap()[0].clone();
    assert_eq!(request.mode, "print");
    assert_eq!(request.trim, "8.5x8.5");
    assert_eq!(request.images.len(), 13);
    assert_eq!(request.images[0].key(), Some(ImageKey::Cover));
    assert!(request.images.iter().all(|e| e.image_id.is_some()));
    assert!(request.images.iter().all(|e| e.url.starts_with("https://cdn.example/")));

    let pages: Vec<_> = request.images[1..].iter().filter_map(|e| e.page).collect();
    assert_eq!(pages, (1..=12).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_pdf_without_images_fails() {
    let backend = Arc::new(MockBackend::new());
    let studio = studio(&backend);

    assert!(matches!(studio.request_pdf().await, Err(Error::EmptyManifest)));
    assert!(backend.pdf_requests.lock().unwrap().is_empty());
}
