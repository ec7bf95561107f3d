//! Client code for shellcache.
//!
//! This crate provides the network capability and the offline cache
//! worker (store manager, request router, lifecycle) shared by the
//! server and CLI hosts.

pub mod fetch;
pub mod worker;

pub use fetch::{CacheMode, FetchClient, FetchConfig, Network};
pub use worker::{
    CacheStoreManager, Destination, FetchDisposition, Handled, Request, RequestClass, RequestMode, Response,
    ResponseSource, Router, ServiceWorker, WaitUntil, WorkerContext, WorkerEvent, WorkerMessage, WorkerPhase,
};
