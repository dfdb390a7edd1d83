//! Network fetch seam.
//!
//! The worker never talks to reqwest directly; it goes through [`Fetcher`]
//! so the host (or a test) decides what "the network" is.
//!
//! ### HttpFetcher behavior
//! - Non-2xx statuses are returned as responses, not errors
//! - Transport failures and timeouts are errors
//! - `CacheMode::NoStore` adds `Cache-Control: no-store` and `Pragma: no-cache`
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable)

pub mod url;

use async_trait::async_trait;
use reqwest::{Client, Method, header};
use std::time::{Duration, Instant};

pub use url::{UrlError, canonicalize, resolve_path};

use piggybank_core::{AppConfig, CacheMode, Error, Request, RequestMode, Response, ResponseKind};

/// Something that can perform a request against the network.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform `request`.
    ///
    /// Returns `Err` only when no response was obtained at all.
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}

/// Configuration for the HTTP fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "piggybank-sw/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "piggybank-sw/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

/// reqwest-backed [`Fetcher`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn check_size(&self, len: usize) -> Result<(), Error> {
        if len > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }
        Ok(())
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() { Error::FetchTimeout(err.to_string()) } else { Error::Network(err.to_string()) }
}

/// Flatten a header map, dropping values that are not valid UTF-8.
pub(crate) fn collect_headers(headers: &header::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect()
}

fn response_kind(mode: RequestMode) -> ResponseKind {
    match mode {
        RequestMode::Cors => ResponseKind::Cors,
        RequestMode::Navigate | RequestMode::SameOrigin | RequestMode::NoCors => ResponseKind::Basic,
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("method {:?}: {}", request.method, e)))?;

        let mut builder = self.http.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if request.cache == CacheMode::NoStore {
            builder = builder
                .header(header::CACHE_CONTROL, "no-store")
                .header(header::PRAGMA, "no-cache");
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(transport_error)?;

        if let Some(len) = response.content_length() {
            self.check_size(len as usize)?;
        }

        let status = response.status();
        let final_url = response.url().clone();
        let headers = collect_headers(response.headers());

        let bytes = response.bytes().await.map_err(transport_error)?;
        self.check_size(bytes.len())?;

        tracing::debug!(
            url = %request.url,
            final_url = %final_url,
            status = status.as_u16(),
            bytes = bytes.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "fetched"
        );

        Ok(Response {
            url: Some(final_url),
            status: status.as_u16(),
            headers,
            body: bytes,
            kind: response_kind(request.mode),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "piggybank-sw/0.1");
        assert_eq!(config.max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app = AppConfig { user_agent: "piggy-test".into(), timeout_ms: 1500, max_bytes: 1024, ..Default::default() };
        let config = FetchConfig::from(&app);
        assert_eq!(config.user_agent, "piggy-test");
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.max_bytes, 1024);
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_collect_headers_skips_non_utf8() {
        let mut map = header::HeaderMap::new();
        map.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("image/png"));
        map.insert(header::ETAG, header::HeaderValue::from_bytes(b"\"caf\xe9\"").unwrap());

        let headers = collect_headers(&map);
        assert_eq!(headers, vec![("content-type".to_string(), "image/png".to_string())]);
    }

    #[test]
    fn test_check_size() {
        let fetcher = HttpFetcher::new(FetchConfig { max_bytes: 10, ..Default::default() }).unwrap();
        assert!(fetcher.check_size(10).is_ok());
        assert!(matches!(fetcher.check_size(11), Err(Error::FetchTooLarge(_))));
    }

    #[test]
    fn test_response_kind_follows_mode() {
        assert_eq!(response_kind(RequestMode::Cors), ResponseKind::Cors);
        assert_eq!(response_kind(RequestMode::Navigate), ResponseKind::Basic);
    }

    #[tokio::test]
    async fn test_invalid_method_rejected_before_network() {
        let fetcher = HttpFetcher::new(FetchConfig::default()).unwrap();
        let request =
            Request::get(::url::Url::parse("http://localhost:5173/").unwrap()).with_method("BAD METHOD");
        let result = fetcher.fetch(&request).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
