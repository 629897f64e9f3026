/// Cache key for fetched images.
///
/// Keys are MD5 hashes of the URL, so arbitrarily long signed CDN URLs
/// map to fixed-length (32 hex chars) identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageCacheKey {
    hash: String,
}

impl ImageCacheKey {
    pub fn from_url(url: &str) -> Self {
        Self {
            hash: format!("{:x}", md5::compute(url.trim().as_bytes())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.hash
    }
}

impl std::fmt::Display for ImageCacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hash)
    }
}
