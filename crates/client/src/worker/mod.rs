//! The offline cache worker.
//!
//! One [`ServiceWorker`] per process holds a read-only [`WorkerContext`],
//! a [`CacheStoreManager`] for the version-qualified store, and a
//! [`Router`] that serves intercepted requests from the store and the
//! network.

pub mod context;
pub mod lifecycle;
pub mod lifetime;
pub mod request;
pub mod router;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use context::WorkerContext;
pub use lifecycle::{
    EventReply, Handled, MessageReply, ServiceWorker, StartReport, WorkerEvent, WorkerMessage, WorkerPhase,
};
pub use lifetime::WaitUntil;
pub use request::{Destination, Request, RequestMode, Response};
pub use router::{FetchDisposition, RequestClass, ResponseSource, Router, classify};
pub use store::{CacheStoreManager, EvictReport, PopulateReport};
