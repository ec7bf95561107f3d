//! Stored entry CRUD operations.
//!
//! An entry is a response snapshot captured at write time, addressed by
//! (store name, request key). Writes overwrite; there is no merging.

use super::connection::CacheDb;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A stored response snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StoredEntry {
    pub store_name: String,
    pub key_hash: String,
    pub method: String,
    pub url: String,
    /// Request header values named by the response `Vary` header, as a JSON object.
    pub vary_json: Option<String>,
    pub status: u16,
    pub status_text: String,
    pub content_type: Option<String>,
    /// Response headers as a JSON array of `[name, value]` pairs.
    pub headers_json: String,
    pub body: Vec<u8>,
    pub stored_at: String,
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredEntry> {
    Ok(StoredEntry {
        store_name: row.get(0)?,
        key_hash: row.get(1)?,
        method: row.get(2)?,
        url: row.get(3)?,
        vary_json: row.get(4)?,
        status: row.get(5)?,
        status_text: row.get(6)?,
        content_type: row.get(7)?,
        headers_json: row.get(8)?,
        body: row.get(9)?,
        stored_at: row.get(10)?,
    })
}

impl CacheDb {
    /// Insert or overwrite an entry.
    ///
    /// The owning store is created if it does not exist yet.
    pub async fn put_entry(&self, entry: &StoredEntry) -> Result<(), Error> {
        let entry = entry.clone();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO stores (name, created_at) VALUES (?1, ?2)",
                    params![&entry.store_name, &now],
                )?;
                conn.execute(
                    "INSERT INTO entries (
                    store_name, key_hash, method, url, vary_json, status,
                    status_text, content_type, headers_json, body, stored_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ON CONFLICT(store_name, key_hash) DO UPDATE SET
                    method = excluded.method,
                    url = excluded.url,
                    vary_json = excluded.vary_json,
                    status = excluded.status,
                    status_text = excluded.status_text,
                    content_type = excluded.content_type,
                    headers_json = excluded.headers_json,
                    body = excluded.body,
                    stored_at = excluded.stored_at",
                    params![
                        &entry.store_name,
                        &entry.key_hash,
                        &entry.method,
                        &entry.url,
                        &entry.vary_json,
                        entry.status,
                        &entry.status_text,
                        &entry.content_type,
                        &entry.headers_json,
                        &entry.body,
                        &entry.stored_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get an entry by store name and request key.
    ///
    /// Returns None if the store or the entry doesn't exist.
    pub async fn get_entry(&self, store_name: &str, key_hash: &str) -> Result<Option<StoredEntry>, Error> {
        let store_name = store_name.to_string();
        let key_hash = key_hash.to_string();
        self.conn
            .call(move |conn| -> Result<Option<StoredEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT
                    store_name, key_hash, method, url, vary_json, status,
                    status_text, content_type, headers_json, body, stored_at
                FROM entries WHERE store_name = ?1 AND key_hash = ?2",
                )?;

                match stmt.query_row(params![store_name, key_hash], entry_from_row) {
                    Ok(entry) => Ok(Some(entry)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// List the URLs stored in a store, sorted.
    pub async fn entry_urls(&self, store_name: &str) -> Result<Vec<String>, Error> {
        let store_name = store_name.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM entries WHERE store_name = ?1 ORDER BY url ASC")?;
                let urls = stmt
                    .query_map(params![store_name], |row| row.get(0))?
                    .collect::<Result<Vec<String>, rusqlite::Error>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }

    /// Count entries in a store.
    pub async fn count_entries(&self, store_name: &str) -> Result<u64, Error> {
        let store_name = store_name.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM entries WHERE store_name = ?1",
                    params![store_name],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::hash::compute_cache_key;

    fn make_test_entry(store: &str, url: &str, body: &str) -> StoredEntry {
        StoredEntry {
            store_name: store.to_string(),
            key_hash: compute_cache_key("GET", url),
            method: "GET".to_string(),
            url: url.to_string(),
            vary_json: None,
            status: 200,
            status_text: "OK".to_string(),
            content_type: Some("text/html".to_string()),
            headers_json: "[]".to_string(),
            body: body.as_bytes().to_vec(),
            stored_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_test_entry("shellcache-v1", "https://app.example/index.html", "<html>");

        db.put_entry(&entry).await.unwrap();

        let stored = db.get_entry("shellcache-v1", &entry.key_hash).await.unwrap().unwrap();
        assert_eq!(stored.url, entry.url);
        assert_eq!(stored.body, b"<html>");
        assert_eq!(stored.status, 200);
    }

    #[tokio::test]
    async fn test_put_creates_store() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry(&make_test_entry("shellcache-v1", "https://app.example/a.js", "a"))
            .await
            .unwrap();

        assert!(db.has_store("shellcache-v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let url = "https://app.example/app.js";
        db.put_entry(&make_test_entry("shellcache-v1", url, "old")).await.unwrap();
        db.put_entry(&make_test_entry("shellcache-v1", url, "new")).await.unwrap();

        let stored = db
            .get_entry("shellcache-v1", &compute_cache_key("GET", url))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.body, b"new");
        assert_eq!(db.count_entries("shellcache-v1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let result = db.get_entry("shellcache-v1", "nonexistent").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_entries_scoped_to_store() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let url = "https://app.example/manifest.json";
        db.put_entry(&make_test_entry("shellcache-v1", url, "{}")).await.unwrap();

        let other = db
            .get_entry("shellcache-v2", &compute_cache_key("GET", url))
            .await
            .unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_delete_store_removes_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry(&make_test_entry("shellcache-v1", "https://app.example/a.js", "a"))
            .await
            .unwrap();
        db.put_entry(&make_test_entry("shellcache-v1", "https://app.example/b.js", "b"))
            .await
            .unwrap();

        assert!(db.delete_store("shellcache-v1").await.unwrap());

        assert!(!db.has_store("shellcache-v1").await.unwrap());
        assert_eq!(db.count_entries("shellcache-v1").await.unwrap(), 0);

        let leftover: i64 = db
            .conn
            .call(|conn| conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(leftover, 0);
    }

    #[tokio::test]
    async fn test_entry_urls_sorted() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry(&make_test_entry("shellcache-v1", "https://app.example/b.js", "b"))
            .await
            .unwrap();
        db.put_entry(&make_test_entry("shellcache-v1", "https://app.example/a.js", "a"))
            .await
            .unwrap();

        assert_eq!(
            db.entry_urls("shellcache-v1").await.unwrap(),
            vec!["https://app.example/a.js".to_string(), "https://app.example/b.js".to_string()]
        );
    }
}
