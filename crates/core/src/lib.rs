//! Core types and shared functionality for shellcache.
//!
//! This crate provides:
//! - Versioned cache stores with a SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, StoreInfo, StoredEntry};
pub use config::{AppConfig, ConfigError, NavigationStrategy};
pub use error::Error;
