//! Request and response values flowing through the worker.

use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

/// Request mode as reported by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Top-level page load.
    Navigate,
    #[default]
    SameOrigin,
    NoCors,
    Cors,
}

/// What the requested resource will be used as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Destination {
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
    #[default]
    Empty,
    Other,
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
    pub destination: Destination,
    pub headers: HeaderMap,
}

impl Request {
    /// A subresource GET.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            mode: RequestMode::SameOrigin,
            destination: Destination::Empty,
            headers: HeaderMap::new(),
        }
    }

    /// A top-level page load.
    pub fn navigate(url: Url) -> Self {
        Self { mode: RequestMode::Navigate, destination: Destination::Document, ..Self::get(url) }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Top-level page load or explicit document fetch.
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate || self.destination == Destination::Document
    }
}

/// A response, either fetched, read back from a store, or synthesized.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub status: StatusCode,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    /// Build a response using the canonical reason phrase for `status`.
    pub fn from_parts(url: Url, status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        Self { url, status, status_text, headers, body }
    }

    /// The terminal "no connectivity and nothing cached" response.
    pub fn offline(url: Url) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        Self {
            url,
            status: StatusCode::SERVICE_UNAVAILABLE,
            status_text: "Offline".to_string(),
            headers,
            body: Bytes::from_static(b"Offline"),
        }
    }

    /// 2xx status.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}
