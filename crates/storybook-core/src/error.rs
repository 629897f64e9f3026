use thiserror::Error;

/// Unified error type for storybook-core
///
/// This enum encompasses all error cases that can occur in the library:
/// - Form validation (reported as a list before any network call)
/// - Backend operations (HTTP failures, malformed bodies, reported errors)
/// - Image operations (decoding, encoding, data URLs)
/// - Run bookkeeping (stale runs, illegal stage transitions)
/// - Configuration operations (loading, validation)
/// - General I/O operations
#[derive(Error, Debug)]
pub enum Error {
    // ==========================================================================
    // Validation Errors
    // ==========================================================================
    /// The form is incomplete or out of range
    #[error("{}", .0.join(" "))]
    Validation(Vec<String>),

    // ==========================================================================
    // Backend Errors
    // ==========================================================================
    /// Request could not be sent or answered with a non-success status
    #[error("{endpoint} request failed: {reason}")]
    BackendRequest { endpoint: String, reason: String },

    /// Response body could not be understood
    #[error("invalid response from {endpoint}: {reason}")]
    BackendInvalidResponse { endpoint: String, reason: String },

    /// Backend answered with an explicit `error` field
    #[error("{endpoint}: {message}")]
    BackendReported { endpoint: String, message: String },

    /// Backend request timed out
    #[error("{0} request timed out")]
    BackendTimeout(String),

    // ==========================================================================
    // Image Errors
    // ==========================================================================
    /// Bytes could not be decoded as an image
    #[error("failed to decode image: {0}")]
    ImageDecode(String),

    /// Image could not be encoded
    #[error("failed to encode image: {0}")]
    ImageEncode(String),

    /// Malformed `data:` URL
    #[error("invalid data URL: {0}")]
    DataUrl(String),

    // ==========================================================================
    // Pipeline Errors
    // ==========================================================================
    /// A single upload item was rejected by the backend
    #[error("upload of {key} failed: {message}")]
    UploadItem { key: String, message: String },

    /// Nothing to put in the PDF
    #[error("no images available for the PDF")]
    EmptyManifest,

    /// The run was superseded by a newer one; its results were discarded
    #[error("run {run} was superseded by a newer run")]
    StaleRun { run: u64 },

    /// Stage machine was asked to make an illegal move
    #[error("invalid stage transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Operation needs state the current run does not have yet
    #[error("{0}")]
    NotReady(String),

    /// Page is not part of the current story
    #[error("unknown page {0}")]
    UnknownPage(u32),

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Failed to load configuration file
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Invalid configuration value
    #[error("invalid config value for '{field}': {reason}")]
    ConfigInvalid { field: String, reason: String },

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Messages of a validation failure, empty for other errors
    pub fn validation_messages(&self) -> &[String] {
        match self {
            Self::Validation(messages) => messages,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
