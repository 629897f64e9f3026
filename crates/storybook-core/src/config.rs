use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix for environment overrides (`STORYBOOK__BACKEND__API_BASE`, ...)
pub const ENV_PREFIX: &str = "STORYBOOK";

/// Connection settings for the generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl BackendConfig {
    /// Create a new backend config
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_key,
            timeout_secs: default_timeout_secs(),
        }
    }
}

// Image generation is slow; a full page set can take minutes
const fn default_timeout_secs() -> u64 {
    300
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000".to_string(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Parallel illustrations the backend may render for one `/api/images` call
    #[serde(default = "default_images_concurrency")]
    pub images_concurrency: u32,

    /// Longest side of an uploaded reference photo
    #[serde(default = "default_max_photo_dimension")]
    pub max_photo_dimension: u32,
}

const fn default_images_concurrency() -> u32 {
    3
}

const fn default_max_photo_dimension() -> u32 {
    1024
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            images_concurrency: default_images_concurrency(),
            max_photo_dimension: default_max_photo_dimension(),
        }
    }
}

/// Preview settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Maximum number of image loads in flight
    #[serde(default = "default_max_concurrent_loads")]
    pub max_concurrent_loads: usize,

    /// Pages shown unlocked (None = all)
    #[serde(default)]
    pub visible_pages: Option<usize>,
}

const fn default_max_concurrent_loads() -> usize {
    4
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_concurrent_loads: default_max_concurrent_loads(),
            visible_pages: None,
        }
    }
}

/// Upload settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Items per `/api/images/upload` request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

const fn default_batch_size() -> usize {
    6
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

/// PDF export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfConfig {
    #[serde(default = "default_pdf_mode")]
    pub mode: String,
    #[serde(default = "default_pdf_trim")]
    pub trim: String,
    #[serde(default)]
    pub watermark_text: Option<String>,
}

fn default_pdf_mode() -> String {
    "print".to_string()
}

fn default_pdf_trim() -> String {
    "8.5x8.5".to_string()
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            mode: default_pdf_mode(),
            trim: default_pdf_trim(),
            watermark_text: None,
        }
    }
}

/// Cache configuration for fetched images
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum memory cache size in megabytes
    #[serde(default = "default_memory_max_mb")]
    pub memory_max_mb: u64,

    /// Memory cache TTL in seconds (0 = no expiry)
    #[serde(default)]
    pub memory_ttl_seconds: u64,
}

const fn default_memory_max_mb() -> u64 {
    256
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_max_mb: default_memory_max_mb(),
            memory_ttl_seconds: 0,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub preview: PreviewConfig,

    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub pdf: PdfConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

impl AppConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, crate::error::Error> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            crate::error::Error::ConfigLoad(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            crate::error::Error::ConfigLoad(format!("Failed to parse config: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations (~/.config/storybook/config.toml, ./config.toml)
    /// with `STORYBOOK__*` environment overrides on top.
    pub fn load() -> Self {
        let mut files = Vec::new();
        if let Some(config_dir) = crate::util::config_dir() {
            files.push(config_dir.join("storybook").join("config.toml"));
        }
        files.push(PathBuf::from("config.toml"));

        match Self::layered(&files) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Merge the given TOML files (later wins) and the environment.
    pub fn layered(files: &[PathBuf]) -> Result<Self, crate::error::Error> {
        let mut builder = config::Config::builder();
        for file in files {
            if file.exists() {
                tracing::debug!("Loading config from {}", file.display());
            }
            builder = builder.add_source(config::File::from(file.as_path()).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize::<Self>())
            .map_err(|e| crate::error::Error::ConfigLoad(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), crate::error::Error> {
        let invalid = |field: &str, reason: &str| crate::error::Error::ConfigInvalid {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        if self.backend.api_base.trim().is_empty() {
            return Err(invalid("backend.api_base", "must not be empty"));
        }
        if self.preview.max_concurrent_loads == 0 {
            return Err(invalid("preview.max_concurrent_loads", "must be at least 1"));
        }
        if self.upload.batch_size == 0 {
            return Err(invalid("upload.batch_size", "must be at least 1"));
        }
        if self.generation.max_photo_dimension == 0 {
            return Err(invalid("generation.max_photo_dimension", "must be at least 1"));
        }
        Ok(())
    }
}
