//! Worker fixtures for tool tests.
//!
//! The worker's scope points at a closed local port, so every network
//! fetch fails immediately and responses come only from the store.

use std::sync::Arc;

use shellcache_client::fetch::{Bytes, HeaderMap, HeaderValue, StatusCode};
use shellcache_client::{FetchClient, FetchConfig, Request, Response, ServiceWorker};
use shellcache_core::{AppConfig, CacheDb};
use url::Url;

pub(crate) fn offline_config() -> AppConfig {
    AppConfig { worker_url: Some("http://127.0.0.1:9/sw.js?v=v1".into()), ..Default::default() }
}

pub(crate) async fn started_worker() -> (Arc<ServiceWorker>, Arc<FetchClient>) {
    let config = offline_config();
    let db = CacheDb::open_in_memory().await.unwrap();
    let fetch = Arc::new(FetchClient::new(FetchConfig::from(&config)).unwrap());
    let worker = Arc::new(ServiceWorker::from_config(&config, db, fetch.clone()).unwrap());
    worker.start().await.unwrap();

    let url = Url::parse("http://127.0.0.1:9/manifest.json").unwrap();
    let mut headers = HeaderMap::new();
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    let response = Response::from_parts(url.clone(), StatusCode::OK, headers, Bytes::from_static(br#"{"name":"app"}"#));
    worker.store().write(&Request::get(url), &response).await.unwrap();

    (worker, fetch)
}

/// Text of the first content block of a tool result.
pub(crate) fn result_text(result: &rmcp::model::CallToolResult) -> String {
    let content_val = serde_json::to_value(&result.content[0]).unwrap();
    content_val
        .get("text")
        .and_then(|v| v.as_str())
        .expect("Expected text field in content")
        .to_string()
}
