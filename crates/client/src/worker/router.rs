//! Request Router.
//!
//! Classifies each intercepted request and applies its serving strategy:
//!
//! | class | strategy |
//! |---|---|
//! | navigation | network-first with stored-shell fallback, or cache-first with background refresh |
//! | static GET | cache-first with network fallback and write-through |
//! | unhandled | passthrough, no response is produced |
//!
//! Store writes never delay the response; they are attached to the event's
//! [`WaitUntil`] so the host can await them.

use std::sync::Arc;

use reqwest::Method;
use reqwest::header::HeaderMap;

use super::context::WorkerContext;
use super::lifetime::WaitUntil;
use super::request::{Destination, Request, RequestMode, Response};
use super::store::CacheStoreManager;
use crate::fetch::{CacheMode, Network, in_scope, same_origin};
use shellcache_core::NavigationStrategy;

/// Request classes, first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    Navigation,
    StaticGet,
    Unhandled,
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Cache,
    Network,
    /// Synthesized 503 "Offline".
    Offline,
}

/// The router's answer to one intercepted request.
#[derive(Debug, Clone)]
pub enum FetchDisposition {
    /// Respond with this response.
    Respond { response: Response, source: ResponseSource },
    /// Respond with a network error; nothing is invented.
    NetworkError(String),
    /// Not intercepted; the host performs the request unmodified.
    Passthrough,
}

/// Classify a request.
///
/// Only same-origin `GET` requests are intercepted. Navigations must also
/// fall under the worker scope.
pub fn classify(request: &Request, ctx: &WorkerContext) -> RequestClass {
    if request.method != Method::GET || !same_origin(&ctx.scope, &request.url) {
        return RequestClass::Unhandled;
    }

    if request.is_navigation() {
        if in_scope(&ctx.scope, &request.url) {
            RequestClass::Navigation
        } else {
            RequestClass::Unhandled
        }
    } else {
        RequestClass::StaticGet
    }
}

/// Routes intercepted requests through the store and the network.
#[derive(Clone)]
pub struct Router {
    ctx: Arc<WorkerContext>,
    store: CacheStoreManager,
    network: Arc<dyn Network>,
}

impl Router {
    pub fn new(ctx: Arc<WorkerContext>, store: CacheStoreManager, network: Arc<dyn Network>) -> Self {
        Self { ctx, store, network }
    }

    /// Produce exactly one disposition for `request`.
    pub async fn handle(&self, request: &Request, wait: &WaitUntil) -> FetchDisposition {
        match classify(request, &self.ctx) {
            RequestClass::Navigation => match self.ctx.navigation {
                NavigationStrategy::NetworkFirst => self.network_first_shell(request, wait).await,
                NavigationStrategy::CacheFirst => self.cache_first_shell(request, wait).await,
            },
            RequestClass::StaticGet => self.cache_first(request, wait).await,
            RequestClass::Unhandled => {
                tracing::debug!("passthrough {} {}", request.method, request.url);
                FetchDisposition::Passthrough
            }
        }
    }

    /// The request actually issued for any navigation: the shell identity.
    ///
    /// Carries no headers, so it is the same identity precache stored and
    /// a `Vary` snapshot never depends on the navigation that triggered it.
    fn shell_request(&self) -> Request {
        Request {
            method: Method::GET,
            url: self.ctx.shell.clone(),
            mode: RequestMode::SameOrigin,
            destination: Destination::Document,
            headers: HeaderMap::new(),
        }
    }

    async fn network_first_shell(&self, request: &Request, wait: &WaitUntil) -> FetchDisposition {
        let shell = self.shell_request();

        match self.network.fetch(&shell, CacheMode::Reload).await {
            Ok(response) if response.is_success() => {
                self.write_through(&shell, &response, wait);
                respond(response, ResponseSource::Network)
            }
            Ok(response) => {
                tracing::warn!(status = response.status.as_u16(), "shell fetch returned non-success status");
                match self.cached(&shell).await {
                    Some(cached) => respond(cached, ResponseSource::Cache),
                    None => respond(response, ResponseSource::Network),
                }
            }
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "shell fetch failed, falling back to store");
                self.stored_shell_or_offline(&shell).await
            }
        }
    }

    async fn cache_first_shell(&self, request: &Request, wait: &WaitUntil) -> FetchDisposition {
        let shell = self.shell_request();

        if let Some(cached) = self.cached(&shell).await {
            let store = self.store.clone();
            let network = self.network.clone();
            wait.extend(async move {
                match network.fetch(&shell, CacheMode::Reload).await {
                    Ok(fresh) if fresh.is_success() => {
                        if let Err(e) = store.write(&shell, &fresh).await {
                            tracing::warn!(url = %shell.url, error = %e, "background shell refresh not stored");
                        }
                    }
                    Ok(fresh) => tracing::debug!(status = fresh.status.as_u16(), "background shell refresh skipped"),
                    Err(e) => tracing::debug!(error = %e, "background shell refresh failed"),
                }
            });
            return respond(cached, ResponseSource::Cache);
        }

        match self.network.fetch(&shell, CacheMode::Reload).await {
            Ok(response) => {
                if response.is_success() {
                    self.write_through(&shell, &response, wait);
                }
                respond(response, ResponseSource::Network)
            }
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "shell fetch failed with no stored shell");
                respond(Response::offline(shell.url), ResponseSource::Offline)
            }
        }
    }

    async fn cache_first(&self, request: &Request, wait: &WaitUntil) -> FetchDisposition {
        if let Some(cached) = self.cached(request).await {
            return respond(cached, ResponseSource::Cache);
        }

        match self.network.fetch(request, CacheMode::Default).await {
            Ok(response) => {
                if response.is_success() {
                    self.write_through(request, &response, wait);
                }
                respond(response, ResponseSource::Network)
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "static fetch failed with no stored copy");
                FetchDisposition::NetworkError(e.to_string())
            }
        }
    }

    async fn stored_shell_or_offline(&self, shell: &Request) -> FetchDisposition {
        match self.cached(shell).await {
            Some(cached) => respond(cached, ResponseSource::Cache),
            None => respond(Response::offline(shell.url.clone()), ResponseSource::Offline),
        }
    }

    /// Store read where a failing store counts as a miss.
    async fn cached(&self, request: &Request) -> Option<Response> {
        match self.store.read(request).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "store read failed, treating as miss");
                None
            }
        }
    }

    fn write_through(&self, request: &Request, response: &Response, wait: &WaitUntil) {
        let store = self.store.clone();
        let request = request.clone();
        let response = response.clone();
        wait.extend(async move {
            if let Err(e) = store.write(&request, &response).await {
                tracing::warn!(url = %request.url, error = %e, "write-through failed");
            }
        });
    }
}

fn respond(response: Response, source: ResponseSource) -> FetchDisposition {
    FetchDisposition::Respond { response, source }
}
