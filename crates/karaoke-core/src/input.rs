//! Request input checks that run before any workspace or subprocess exists

use crate::error::{CoreError, CoreResult};

const MAX_URL_LEN: usize = 2048;
const MAX_EXTENSION_LEN: usize = 8;
const FALLBACK_EXTENSION: &str = "bin";

/// Check a media URL before it goes to the downloader.
///
/// Requires an `http`/`https` scheme and a non-empty host. Whitespace and control characters
/// are refused. Returns the trimmed URL.
pub fn validate_media_url(raw: &str) -> CoreResult<String> {
    let url = raw.trim();
    if url.is_empty() {
        return Err(CoreError::InvalidUrl("URL is missing".into()));
    }
    if url.len() > MAX_URL_LEN {
        return Err(CoreError::InvalidUrl(format!("URL is longer than {MAX_URL_LEN} bytes")));
    }
    if url.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CoreError::InvalidUrl("URL contains whitespace or control characters".into()));
    }

    let lower = url.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .ok_or_else(|| CoreError::InvalidUrl("only http and https URLs are supported".into()))?;

    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    let host = authority.rsplit('@').next().unwrap_or("");
    let host = host.split(':').next().unwrap_or("");
    if host.is_empty() {
        return Err(CoreError::InvalidUrl("URL has no host".into()));
    }

    Ok(url.to_string())
}

/// Extension for a stored upload, taken from the client's file name.
///
/// Only ASCII alphanumerics survive; anything else falls back to `bin`. The client name itself
/// never reaches the filesystem.
pub fn upload_extension(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}
