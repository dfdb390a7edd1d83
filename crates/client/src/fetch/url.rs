//! URL canonicalization and manifest path resolution.

use url::Url;

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("path must be absolute: {0}")]
    RelativePath(String),

    #[error("path leaves the origin: {0}")]
    CrossOrigin(String),
}

/// Canonicalize a URL string.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let mut parsed = Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let host = host.to_lowercase();
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Resolve an absolute path such as `/icon-192.png` against `origin`.
///
/// Any path or query already on `origin` is discarded.
///
/// # Errors
///
/// Returns `UrlError::RelativePath` if `path` has no leading `/`, and
/// `UrlError::CrossOrigin` if it resolves to another host (`//cdn/x.js`).
pub fn resolve_path(origin: &Url, path: &str) -> Result<Url, UrlError> {
    if !path.starts_with('/') {
        return Err(UrlError::RelativePath(path.to_string()));
    }
    let resolved = origin.join(path).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    if resolved.origin() != origin.origin() {
        return Err(UrlError::CrossOrigin(path.to_string()));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_basic() {
        let url = canonicalize("https://piggy.example.com").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("piggy.example.com"));
    }

    #[test]
    fn test_canonicalize_default_scheme() {
        let url = canonicalize("piggy.example.com").unwrap();
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn test_canonicalize_keeps_port() {
        let url = canonicalize("http://LocalHost:5173").unwrap();
        assert_eq!(url.host_str(), Some("localhost"));
        assert_eq!(url.port(), Some(5173));
    }

    #[test]
    fn test_canonicalize_remove_fragment_keep_query() {
        let url = canonicalize("https://piggy.example.com/?range=30d#chart").unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(url.query(), Some("range=30d"));
    }

    #[test]
    fn test_canonicalize_unsupported_scheme() {
        let result = canonicalize("file:///etc/passwd");
        assert!(matches!(result, Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_canonicalize_empty() {
        assert!(matches!(canonicalize("   "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_resolve_path() {
        let origin = canonicalize("http://localhost:5173").unwrap();
        let url = resolve_path(&origin, "/icon-192.png").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5173/icon-192.png");
    }

    #[test]
    fn test_resolve_path_ignores_origin_path() {
        let origin = canonicalize("http://localhost:5173/app/?x=1").unwrap();
        let url = resolve_path(&origin, "/").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5173/");
    }

    #[test]
    fn test_resolve_protocol_relative_path_rejected() {
        let origin = canonicalize("http://localhost:5173").unwrap();
        for path in ["//cdn.example.com/x.js", "/\\cdn.example.com/x.js"] {
            assert!(matches!(resolve_path(&origin, path), Err(UrlError::CrossOrigin(_))), "{path}");
        }
    }

    #[test]
    fn test_resolve_relative_path_rejected() {
        let origin = canonicalize("http://localhost:5173").unwrap();
        assert!(matches!(resolve_path(&origin, "index.html"), Err(UrlError::RelativePath(_))));
    }
}
