//! Network capability for the worker.
//!
//! ### Contract
//! - Connection failures (DNS, refused, reset, timeout) are `Err`.
//! - Any HTTP status is `Ok`; callers decide whether non-2xx is a failure.
//!
//! ### Forced revalidation
//! - `CacheMode::Reload` sends `Cache-Control: no-cache` and `Pragma: no-cache`
//!   so intermediate caches between the worker and the origin are bypassed.
//!
//! ### Limits
//! - Max redirects: 5
//! - Max body bytes: 10MB (configurable)
//! - No timeout unless configured

pub mod url;

use async_trait::async_trait;
use reqwest::{Client, header};
use std::time::{Duration, Instant};

pub use self::url::{UrlError, in_scope, resolve, same_origin};
pub use bytes::Bytes;
pub use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
pub use reqwest::{Method, StatusCode};

use crate::worker::{Request, Response};
use shellcache_core::{AppConfig, Error};

/// How a fetch treats caches between the worker and the origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Plain fetch.
    #[default]
    Default,
    /// Forced revalidation fetch.
    Reload,
}

/// Network capability consumed by the store manager and router.
#[async_trait]
pub trait Network: Send + Sync {
    /// Issue a request against the network.
    async fn fetch(&self, request: &Request, mode: CacheMode) -> Result<Response, Error>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "shellcache/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 10MB)
    pub max_bytes: usize,

    /// Request timeout (default: none)
    pub timeout: Option<Duration>,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "shellcache/0.1".to_string(), max_bytes: 10 * 1024 * 1024, timeout: None, max_redirects: 5 }
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

/// reqwest-backed network capability.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true);

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        let http = builder
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

fn map_send_error(url: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(format!("{}: {}", url, err))
    } else {
        Error::Network(format!("{}: {}", url, err))
    }
}

#[async_trait]
impl Network for FetchClient {
    async fn fetch(&self, request: &Request, mode: CacheMode) -> Result<Response, Error> {
        let start = Instant::now();

        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());

        if mode == CacheMode::Reload {
            builder = builder
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::PRAGMA, "no-cache");
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_send_error(request.url.as_str(), e))?;

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!(
                "{} bytes exceeds {}",
                len, self.config.max_bytes
            )));
        }

        let status = response.status();
        let final_url = response.url().clone();
        let headers = response.headers().clone();

        let body = response
            .bytes()
            .await
            .map_err(|e| map_send_error(request.url.as_str(), e))?;

        if body.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!(
                "{} bytes exceeds {}",
                body.len(),
                self.config.max_bytes
            )));
        }

        tracing::debug!(
            "fetched {} {} -> {} in {}ms ({} bytes, {:?})",
            request.method,
            request.url,
            status.as_u16(),
            start.elapsed().as_millis(),
            body.len(),
            mode
        );

        Ok(Response::from_parts(final_url, status, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "shellcache/0.1");
        assert_eq!(config.max_bytes, 10 * 1024 * 1024);
        assert!(config.timeout.is_none());
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app =
            AppConfig { user_agent: "test/1".into(), max_bytes: 42, timeout_ms: Some(1500), ..Default::default() };
        let config = FetchConfig::from(&app);
        assert_eq!(config.user_agent, "test/1");
        assert_eq!(config.max_bytes, 42);
        assert_eq!(config.timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_cache_mode_default() {
        assert_eq!(CacheMode::default(), CacheMode::Default);
    }

    #[tokio::test]
    async fn test_fetch_client_new() {
        let client = FetchClient::new(FetchConfig::default());
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_error() {
        let client = FetchClient::new(FetchConfig { timeout: Some(Duration::from_secs(2)), ..Default::default() })
            .unwrap();
        let request = Request::get(::url::Url::parse("http://127.0.0.1:9/unreachable").unwrap());

        let result = client.fetch(&request, CacheMode::Default).await;
        assert!(matches!(result, Err(Error::Network(_)) | Err(Error::FetchTimeout(_))));
    }

    fn shell_at(server: &httpmock::MockServer) -> Request {
        Request::get(::url::Url::parse(&server.url("/index.html")).unwrap())
    }

    #[tokio::test]
    async fn test_reload_sends_no_cache_headers() {
        let server = httpmock::MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("GET")
                    .path("/index.html")
                    .header("cache-control", "no-cache")
                    .header("pragma", "no-cache");
                then.status(200).header("content-type", "text/html").body("<main>shell</main>");
            })
            .await;

        let client = FetchClient::new(FetchConfig::default()).unwrap();
        let response = client.fetch(&shell_at(&server), CacheMode::Reload).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, Bytes::from_static(b"<main>shell</main>"));
    }

    #[tokio::test]
    async fn test_default_sends_no_revalidation_headers() {
        let server = httpmock::MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("GET")
                    .path("/index.html")
                    .header_missing("cache-control")
                    .header_missing("pragma");
                then.status(200).header("content-type", "text/html").body("<main>shell</main>");
            })
            .await;

        let client = FetchClient::new(FetchConfig::default()).unwrap();
        let response = client.fetch(&shell_at(&server), CacheMode::Default).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, StatusCode::OK);
    }
}
