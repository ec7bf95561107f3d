//! Cache Store Manager.
//!
//! Owns the single version-qualified store: creates it, populates it from
//! the precache list, evicts every other store, and serves primitive
//! reads and writes against it.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use url::Url;

use super::context::WorkerContext;
use super::request::{Request, Response};
use crate::fetch::{CacheMode, Network};
use shellcache_core::cache::hash::compute_cache_key;
use shellcache_core::{CacheDb, Error, StoreInfo, StoredEntry};

/// Outcome of a precache population.
#[derive(Debug, Clone, Default)]
pub struct PopulateReport {
    pub stored: Vec<Url>,
    pub failed: Vec<(Url, String)>,
}

/// Outcome of stale store eviction.
#[derive(Debug, Clone, Default)]
pub struct EvictReport {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Read/write access to the current store plus store lifecycle operations.
#[derive(Clone)]
pub struct CacheStoreManager {
    db: CacheDb,
    ctx: Arc<WorkerContext>,
    network: Arc<dyn Network>,
}

impl CacheStoreManager {
    pub fn new(db: CacheDb, ctx: Arc<WorkerContext>, network: Arc<dyn Network>) -> Self {
        Self { db, ctx, network }
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    /// Name of the store for the active version.
    pub fn store_name(&self) -> &str {
        &self.ctx.store_name
    }

    /// Return the current store, creating it if absent.
    pub async fn open_current_store(&self) -> Result<StoreInfo, Error> {
        self.db.open_store(&self.ctx.store_name).await
    }

    /// Fetch and store every locator.
    ///
    /// A failing locator (network error or non-2xx status) is logged and
    /// reported, never propagated, so the remaining locators are still
    /// stored. Repeated calls overwrite existing entries.
    ///
    /// # Errors
    ///
    /// Returns an error only if the current store cannot be opened.
    pub async fn populate(&self, locators: &[Url]) -> Result<PopulateReport, Error> {
        self.open_current_store().await?;

        let mut report = PopulateReport::default();
        for url in locators {
            match self.precache_one(url).await {
                Ok(()) => report.stored.push(url.clone()),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "precache entry skipped");
                    report.failed.push((url.clone(), e.to_string()));
                }
            }
        }

        tracing::info!(
            store = %self.ctx.store_name,
            stored = report.stored.len(),
            failed = report.failed.len(),
            "precache populated"
        );

        Ok(report)
    }

    async fn precache_one(&self, url: &Url) -> Result<(), Error> {
        let request = Request::get(url.clone());
        let response = self.network.fetch(&request, CacheMode::Default).await?;
        if !response.is_success() {
            return Err(Error::BadStatus { url: url.to_string(), status: response.status.as_u16() });
        }
        self.write(&request, &response).await?;
        Ok(())
    }

    /// Delete every store whose name is not `keep`.
    ///
    /// Each deletion is attempted independently; failures are logged and
    /// reported without stopping the sweep.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store list cannot be read.
    pub async fn evict_all_except(&self, keep: &str) -> Result<EvictReport, Error> {
        let mut report = EvictReport::default();

        for name in self.db.store_names().await? {
            if name == keep {
                continue;
            }
            match self.db.delete_store(&name).await {
                Ok(_) => {
                    tracing::info!(store = %name, "evicted stale store");
                    report.deleted.push(name);
                }
                Err(e) => {
                    tracing::warn!(store = %name, error = %e, "failed to evict store");
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Look up the stored response for a request identity.
    ///
    /// An entry recorded with `Vary` request headers only matches when the
    /// request carries the same values for those headers.
    pub async fn read(&self, request: &Request) -> Result<Option<Response>, Error> {
        let key = request_key(request);
        let Some(entry) = self.db.get_entry(&self.ctx.store_name, &key).await? else {
            tracing::debug!("store miss for {} {}", request.method, request.url);
            return Ok(None);
        };

        if !vary_matches(entry.vary_json.as_deref(), &request.headers)? {
            tracing::debug!("store entry for {} rejected by Vary", request.url);
            return Ok(None);
        }

        tracing::debug!("store hit for {} {}", request.method, request.url);
        entry_to_response(entry).map(Some)
    }

    /// Store a snapshot of `response` under the request identity.
    ///
    /// Returns false when the response cannot be stored (`Vary: *`).
    pub async fn write(&self, request: &Request, response: &Response) -> Result<bool, Error> {
        let Some(vary) = vary_snapshot(&response.headers, &request.headers) else {
            tracing::debug!("not storing {}: Vary: *", request.url);
            return Ok(false);
        };

        let headers: Vec<(String, String)> = response
            .headers
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();

        let entry = StoredEntry {
            store_name: self.ctx.store_name.clone(),
            key_hash: request_key(request),
            method: request.method.as_str().to_string(),
            url: identity_url(&request.url).to_string(),
            vary_json: if vary.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&vary).map_err(|e| Error::CorruptEntry(e.to_string()))?)
            },
            status: response.status.as_u16(),
            status_text: response.status_text.clone(),
            content_type: response.content_type().map(str::to_string),
            headers_json: serde_json::to_string(&headers).map_err(|e| Error::CorruptEntry(e.to_string()))?,
            body: response.body.to_vec(),
            stored_at: chrono::Utc::now().to_rfc3339(),
        };

        self.db.put_entry(&entry).await?;
        tracing::debug!("stored {} in {}", entry.url, entry.store_name);
        Ok(true)
    }
}

fn identity_url(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    url
}

fn request_key(request: &Request) -> String {
    compute_cache_key(request.method.as_str(), identity_url(&request.url).as_str())
}

fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get_all(name)
        .iter()
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Request header values for each header the response varies on.
///
/// `None` means the response varies on `*` and must not be stored.
fn vary_snapshot(response: &HeaderMap, request: &HeaderMap) -> Option<BTreeMap<String, String>> {
    let mut vary = BTreeMap::new();
    for value in response.get_all(header::VARY) {
        let value = String::from_utf8_lossy(value.as_bytes());
        for name in value.split(',').map(|n| n.trim().to_ascii_lowercase()) {
            if name.is_empty() {
                continue;
            }
            if name == "*" {
                return None;
            }
            let current = header_value(request, &name);
            vary.insert(name, current);
        }
    }
    Some(vary)
}

fn vary_matches(vary_json: Option<&str>, request: &HeaderMap) -> Result<bool, Error> {
    let Some(json) = vary_json else {
        return Ok(true);
    };
    let vary: BTreeMap<String, String> = serde_json::from_str(json).map_err(|e| Error::CorruptEntry(e.to_string()))?;
    Ok(vary.iter().all(|(name, value)| header_value(request, name) == *value))
}

fn entry_to_response(entry: StoredEntry) -> Result<Response, Error> {
    let url = Url::parse(&entry.url).map_err(|e| Error::CorruptEntry(e.to_string()))?;
    let status = StatusCode::from_u16(entry.status).map_err(|e| Error::CorruptEntry(e.to_string()))?;
    let pairs: Vec<(String, String)> =
        serde_json::from_str(&entry.headers_json).map_err(|e| Error::CorruptEntry(e.to_string()))?;

    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::debug!(header = %name, "dropping unreadable stored header"),
        }
    }

    Ok(Response { url, status, status_text: entry.status_text, headers, body: Bytes::from(entry.body) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::testing::{StubNetwork, test_context};

    async fn manager(network: Arc<StubNetwork>) -> CacheStoreManager {
        let db = CacheDb::open_in_memory().await.unwrap();
        CacheStoreManager::new(db, Arc::new(test_context("v1")), network)
    }

    fn url(path: &str) -> Url {
        Url::parse("https://app.example/").unwrap().join(path).unwrap()
    }

    #[tokio::test]
    async fn test_open_current_store_idempotent() {
        let store = manager(Arc::new(StubNetwork::new())).await;
        let first = store.open_current_store().await.unwrap();
        let second = store.open_current_store().await.unwrap();
        assert_eq!(first.name, "shellcache-v1");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_populate_tolerates_unreachable_entry() {
        let network = Arc::new(StubNetwork::new());
        network.serve("/manifest.json", 200, "application/json", "{}");
        network.serve("/app.js", 200, "text/javascript", "boot()");
        let store = manager(network).await;

        let report = store
            .populate(&[url("/manifest.json"), url("/icon.png"), url("/app.js")])
            .await
            .unwrap();

        assert_eq!(report.stored, vec![url("/manifest.json"), url("/app.js")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, url("/icon.png"));

        let urls = store.db().entry_urls("shellcache-v1").await.unwrap();
        assert_eq!(urls, vec![url("/app.js").to_string(), url("/manifest.json").to_string()]);
    }

    #[tokio::test]
    async fn test_populate_rejects_non_success() {
        let network = Arc::new(StubNetwork::new());
        network.serve("/missing.png", 404, "text/plain", "nope");
        let store = manager(network).await;

        let report = store.populate(&[url("/missing.png")]).await.unwrap();
        assert!(report.stored.is_empty());
        assert!(report.failed[0].1.contains("BAD_STATUS"));
    }

    #[tokio::test]
    async fn test_populate_idempotent() {
        let network = Arc::new(StubNetwork::new());
        network.serve("/manifest.json", 200, "application/json", "{}");
        network.serve("/icon.png", 200, "image/png", "png");
        let store = manager(network).await;
        let list = [url("/manifest.json"), url("/icon.png")];

        store.populate(&list).await.unwrap();
        let first = store.db().entry_urls("shellcache-v1").await.unwrap();
        store.populate(&list).await.unwrap();
        let second = store.db().entry_urls("shellcache-v1").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.db().count_entries("shellcache-v1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_evict_all_except() {
        let store = manager(Arc::new(StubNetwork::new())).await;
        store.db().open_store("shellcache-v0").await.unwrap();
        store.db().open_store("other-app").await.unwrap();
        store.open_current_store().await.unwrap();

        let report = store.evict_all_except("shellcache-v1").await.unwrap();

        assert_eq!(report.deleted.len(), 2);
        assert!(report.failed.is_empty());
        assert_eq!(store.db().store_names().await.unwrap(), vec!["shellcache-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_evict_all_except_continues_past_failed_delete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stores.db");
        let db = CacheDb::open(&path).await.unwrap();
        let store = CacheStoreManager::new(db, Arc::new(test_context("v1")), Arc::new(StubNetwork::new()));
        store.db().open_store("shellcache-v0").await.unwrap();
        store.db().open_store("shellcache-pinned").await.unwrap();
        store.open_current_store().await.unwrap();

        // A second handle on the same file installs a trigger that refuses one deletion.
        let admin = tokio_rusqlite::Connection::open(&path).await.unwrap();
        admin
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER pin_store BEFORE DELETE ON stores
                     WHEN OLD.name = 'shellcache-pinned'
                     BEGIN SELECT RAISE(ABORT, 'store is pinned'); END;",
                )
            })
            .await
            .unwrap();

        let report = store.evict_all_except("shellcache-v1").await.unwrap();

        assert_eq!(report.deleted, vec!["shellcache-v0".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "shellcache-pinned");

        let mut remaining = store.db().store_names().await.unwrap();
        remaining.sort();
        assert_eq!(remaining, vec!["shellcache-pinned".to_string(), "shellcache-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let store = manager(Arc::new(StubNetwork::new())).await;
        let request = Request::get(url("/app.js"));
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/javascript"));
        headers.insert(header::ETAG, HeaderValue::from_static("\"abc\""));
        let response = Response::from_parts(url("/app.js"), StatusCode::OK, headers, Bytes::from_static(b"boot()"));

        assert!(store.write(&request, &response).await.unwrap());

        let cached = store.read(&request).await.unwrap().unwrap();
        assert_eq!(cached.status, StatusCode::OK);
        assert_eq!(cached.body, Bytes::from_static(b"boot()"));
        assert_eq!(cached.content_type(), Some("text/javascript"));
        assert_eq!(cached.headers.get(header::ETAG).unwrap(), "\"abc\"");
    }

    #[tokio::test]
    async fn test_read_ignores_fragment() {
        let store = manager(Arc::new(StubNetwork::new())).await;
        let response = Response::from_parts(url("/doc.html"), StatusCode::OK, HeaderMap::new(), Bytes::new());
        store.write(&Request::get(url("/doc.html#top")), &response).await.unwrap();

        assert!(store.read(&Request::get(url("/doc.html"))).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_vary_mismatch_is_miss() {
        let store = manager(Arc::new(StubNetwork::new())).await;
        let mut headers = HeaderMap::new();
        headers.insert(header::VARY, HeaderValue::from_static("Accept-Language"));
        let response = Response::from_parts(url("/strings.json"), StatusCode::OK, headers, Bytes::from_static(b"{}"));

        let english = Request::get(url("/strings.json"))
            .with_header(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en"));
        let german = Request::get(url("/strings.json"))
            .with_header(header::ACCEPT_LANGUAGE, HeaderValue::from_static("de"));

        store.write(&english, &response).await.unwrap();

        assert!(store.read(&english).await.unwrap().is_some());
        assert!(store.read(&german).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_vary_star_not_stored() {
        let store = manager(Arc::new(StubNetwork::new())).await;
        let mut headers = HeaderMap::new();
        headers.insert(header::VARY, HeaderValue::from_static("*"));
        let response = Response::from_parts(url("/live"), StatusCode::OK, headers, Bytes::new());
        let request = Request::get(url("/live"));

        assert!(!store.write(&request, &response).await.unwrap());
        assert!(store.read(&request).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_scoped_to_current_version() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network: Arc<StubNetwork> = Arc::new(StubNetwork::new());
        let v1 = CacheStoreManager::new(db.clone(), Arc::new(test_context("v1")), network.clone());
        let v2 = CacheStoreManager::new(db, Arc::new(test_context("v2")), network);
        let request = Request::get(url("/app.js"));
        let response = Response::from_parts(url("/app.js"), StatusCode::OK, HeaderMap::new(), Bytes::new());

        v1.write(&request, &response).await.unwrap();

        assert!(v1.read(&request).await.unwrap().is_some());
        assert!(v2.read(&request).await.unwrap().is_none());
    }
}
