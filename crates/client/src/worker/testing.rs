//! Scripted network and context fixtures for worker tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderValue};
use url::Url;

use super::context::WorkerContext;
use super::request::{Request, Response};
use crate::fetch::{CacheMode, Network};
use shellcache_core::{Error, NavigationStrategy};

pub(crate) fn test_context(version: &str) -> WorkerContext {
    let scope = Url::parse("https://app.example/").unwrap();
    WorkerContext {
        version: version.to_string(),
        store_name: format!("shellcache-{version}"),
        shell: scope.join("index.html").unwrap(),
        scope,
        precache: Vec::new(),
        navigation: NavigationStrategy::NetworkFirst,
    }
}

/// Serves canned responses by path; unknown paths fail like an unreachable host.
#[derive(Default)]
pub(crate) struct StubNetwork {
    routes: Mutex<HashMap<String, (u16, &'static str, Bytes)>>,
    offline: AtomicBool,
    calls: Mutex<Vec<(String, CacheMode)>>,
}

impl StubNetwork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn serve(&self, path: &str, status: u16, content_type: &'static str, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, content_type, Bytes::from(body.to_string())));
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// (path, mode) of every fetch issued so far.
    pub(crate) fn calls(&self) -> Vec<(String, CacheMode)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Network for StubNetwork {
    async fn fetch(&self, request: &Request, mode: CacheMode) -> Result<Response, Error> {
        let path = request.url.path().to_string();
        self.calls.lock().unwrap().push((path.clone(), mode));
        tokio::task::yield_now().await;

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("{}: offline", request.url)));
        }

        let route = self.routes.lock().unwrap().get(&path).cloned();
        let Some((status, content_type, body)) = route else {
            return Err(Error::Network(format!("{}: unreachable", request.url)));
        };

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        Ok(Response::from_parts(request.url.clone(), StatusCode::from_u16(status).unwrap(), headers, body))
    }
}
