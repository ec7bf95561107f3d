//! URL resolution against the worker scope.

use url::Url;

/// Error type for locator resolution failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty locator")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Resolve a locator to an absolute URL against the scope.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Join relative locators onto the scope (absolute ones pass through)
/// 3. Require http or https
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn resolve(scope: &Url, locator: &str) -> Result<Url, UrlError> {
    let trimmed = locator.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut resolved = scope.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match resolved.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    resolved.set_fragment(None);

    Ok(resolved)
}

/// Whether two URLs share scheme, host and port.
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

/// Whether `url` falls under `scope` (same origin and path prefix).
pub fn in_scope(scope: &Url, url: &Url) -> bool {
    same_origin(scope, url) && url.path().starts_with(scope.path())
}
