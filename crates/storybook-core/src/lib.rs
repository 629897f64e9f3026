//! Storybook Core Library
//!
//! This library provides the client-side pipeline for generating an
//! illustrated children's book through a remote backend:
//! - Form validation and reference photo downscaling
//! - Generation runs (story, character reference, cover, page illustrations)
//! - Preview cards with throttled image loading
//! - Upload reconciliation and PDF export

pub mod backend;
pub mod cache;
pub mod config;
pub mod data_url;
pub mod downscale;
pub mod error;
pub mod form;
pub mod model;
pub mod orchestrator;
pub mod pdf;
pub mod preview;
pub mod upload;
pub mod util;

pub use backend::{Backend, HttpBackend, create_backend};
pub use cache::ImageCache;
pub use config::AppConfig;
pub use data_url::EncodedImage;
pub use downscale::downscale;
pub use error::{Error, Result};
pub use form::{FormState, PageCount, Reference, ReferenceMode, ValidForm};
pub use model::{GeneratedImage, ImageKey, PlanEntry, StoryPage, UploadedAsset};
pub use orchestrator::{Progress, ProgressFn, RunStage, RunSummary, Session, Studio};
pub use pdf::PdfDocument;
pub use preview::{CardStatus, PreviewBoard, PreviewCard};
pub use upload::ReconcileReport;
pub use util::pdf_file_name;
