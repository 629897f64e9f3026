mod http;
mod traits;
pub mod types;

pub use http::HttpBackend;
pub use traits::Backend;

use crate::config::BackendConfig;
use crate::error::Result;
use std::sync::Arc;

/// Create a backend client from configuration
pub fn create_backend(config: &BackendConfig) -> Result<Arc<dyn Backend>> {
    let backend = HttpBackend::new(config)?;
    Ok(Arc::new(backend))
}
