//! Named store management.
//!
//! A store is a named container of entries. Workers keep exactly one
//! store per version and delete the rest on activation.

use super::connection::CacheDb;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Metadata for one named store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StoreInfo {
    pub name: String,
    pub created_at: String,
}

impl CacheDb {
    /// Open a store by name, creating it if absent.
    ///
    /// Opening an existing store leaves its entries and creation time untouched.
    pub async fn open_store(&self, name: &str) -> Result<StoreInfo, Error> {
        let name = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<StoreInfo, Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO stores (name, created_at) VALUES (?1, ?2)",
                    params![&name, &now],
                )?;
                let info = conn.query_row(
                    "SELECT name, created_at FROM stores WHERE name = ?1",
                    params![&name],
                    |row| Ok(StoreInfo { name: row.get(0)?, created_at: row.get(1)? }),
                )?;
                Ok(info)
            })
            .await
            .map_err(Error::from)
    }

    /// Check whether a store exists.
    pub async fn has_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM stores WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// List all store names in creation order.
    pub async fn store_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM stores ORDER BY created_at ASC, name ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, rusqlite::Error>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a store and every entry in it.
    ///
    /// Entries go with the store row through `ON DELETE CASCADE`, so the
    /// removal is one statement and cannot leave an empty store behind.
    /// Returns false if no store with that name existed.
    pub async fn delete_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM stores WHERE name = ?1", params![&name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}
