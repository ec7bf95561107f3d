//! SQLite-backed storage for versioned cache stores.
//!
//! This module provides a persistent request/response cache using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Named stores, one per worker version
//! - Request identities keyed by SHA-256 of method and URL
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod stores;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::StoredEntry;
pub use stores::StoreInfo;
