//! Snapshot CRUD operations.
//!
//! A snapshot is the captured copy of one response, stored under its
//! request identity. Writes replace whole values; there is no append.

use super::connection::CacheStorage;
use super::hash::compute_entry_hash;
use crate::http::{Response, ResponseKind};
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;
use url::Url;

/// A captured response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Request identity this response answers.
    pub key: String,
    /// Final response URL, if the response had one.
    pub url: Option<String>,
    pub status: u16,
    pub kind: ResponseKind,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub stored_at: String,
}

impl Snapshot {
    /// Capture a copy of `response` for storage under `key`.
    pub fn capture(key: impl Into<String>, response: &Response) -> Self {
        Self {
            key: key.into(),
            url: response.url.as_ref().map(|u| u.to_string()),
            status: response.status,
            kind: response.kind,
            headers: response.headers.clone(),
            body: response.body.to_vec(),
            stored_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Rebuild the response this snapshot was captured from.
    pub fn into_response(self) -> Result<Response, Error> {
        let url = self
            .url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| Error::CorruptSnapshot(format!("{}: {e}", self.key)))?;

        Ok(Response { url, status: self.status, headers: self.headers, body: self.body.into(), kind: self.kind })
    }
}

type EntryRow = (String, Option<String>, u16, String, String, Vec<u8>, String);

impl CacheStorage {
    /// Insert or replace one entry in `store_name`.
    ///
    /// Fails if the store does not exist.
    pub async fn put_entry(&self, store_name: &str, snapshot: &Snapshot) -> Result<(), Error> {
        self.put_entries(store_name, vec![snapshot.clone()]).await
    }

    /// Insert or replace several entries in one transaction.
    pub async fn put_entries(&self, store_name: &str, snapshots: Vec<Snapshot>) -> Result<(), Error> {
        let store_name = store_name.to_string();
        let rows = snapshots
            .into_iter()
            .map(|s| -> Result<(Snapshot, String), Error> {
                let headers_json = serde_json::to_string(&s.headers)?;
                Ok((s, headers_json))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO cache_entries (
                        hash, store_name, key, url, status, kind, headers_json, body, stored_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    ON CONFLICT(hash) DO UPDATE SET
                        url = excluded.url,
                        status = excluded.status,
                        kind = excluded.kind,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    )?;
                    for (snapshot, headers_json) in &rows {
                        stmt.execute(params![
                            compute_entry_hash(&store_name, &snapshot.key),
                            &store_name,
                            &snapshot.key,
                            &snapshot.url,
                            snapshot.status,
                            snapshot.kind.as_str(),
                            headers_json,
                            &snapshot.body,
                            &snapshot.stored_at,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get the entry for `key` in `store_name`.
    ///
    /// Returns None if either the store or the entry doesn't exist.
    pub async fn get_entry(&self, store_name: &str, key: &str) -> Result<Option<Snapshot>, Error> {
        let hash = compute_entry_hash(store_name, key);
        let row = self
            .conn
            .call(move |conn| -> Result<Option<EntryRow>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT key, url, status, kind, headers_json, body, stored_at
                    FROM cache_entries WHERE hash = ?1",
                )?;

                let result = stmt.query_row(params![hash], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                });

                match result {
                    Ok(r) => Ok(Some(r)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        let Some((key, url, status, kind, headers_json, body, stored_at)) = row else {
            return Ok(None);
        };

        let kind = kind.parse::<ResponseKind>().map_err(Error::CorruptSnapshot)?;
        let headers = serde_json::from_str(&headers_json)?;

        Ok(Some(Snapshot { key, url, status, kind, headers, body, stored_at }))
    }

    /// Request identities stored in `store_name`, sorted.
    pub async fn entry_keys(&self, store_name: &str) -> Result<Vec<String>, Error> {
        let store_name = store_name.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT key FROM cache_entries WHERE store_name = ?1 ORDER BY key")?;
                let keys = stmt
                    .query_map(params![store_name], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn count_entries(&self, store_name: &str) -> Result<u64, Error> {
        let store_name = store_name.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE store_name = ?1",
                    params![store_name],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete one entry. Returns false if it wasn't there.
    pub async fn delete_entry(&self, store_name: &str, key: &str) -> Result<bool, Error> {
        let hash = compute_entry_hash(store_name, key);
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM cache_entries WHERE hash = ?1", params![hash])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = "http://localhost:5173/index.html";

    fn index_response(body: &str) -> Response {
        Response::new(200, body.to_string())
            .with_url(Url::parse(INDEX).unwrap())
            .with_header("content-type", "text/html")
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let storage = CacheStorage::open_in_memory().await.unwrap();
        let store = storage.open_store("piggybank-v4").await.unwrap();
        let response = index_response("<html>v4</html>");

        store.put(&Snapshot::capture(INDEX, &response)).await.unwrap();

        let restored = storage.get_entry("piggybank-v4", INDEX).await.unwrap().unwrap().into_response().unwrap();
        assert_eq!(restored, response);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let storage = CacheStorage::open_in_memory().await.unwrap();
        storage.open_store("piggybank-v4").await.unwrap();
        assert!(storage.get_entry("piggybank-v4", "http://localhost:5173/nope.js").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let storage = CacheStorage::open_in_memory().await.unwrap();
        let store = storage.open_store("piggybank-v4").await.unwrap();

        store.put(&Snapshot::capture(INDEX, &index_response("first"))).await.unwrap();
        store.put(&Snapshot::capture(INDEX, &index_response("second"))).await.unwrap();

        let snapshot = storage.get_entry("piggybank-v4", INDEX).await.unwrap().unwrap();
        assert_eq!(snapshot.body, b"second".to_vec());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_put_all_is_atomic() {
        let storage = CacheStorage::open_in_memory().await.unwrap();
        let store = storage.open_store("piggybank-v4").await.unwrap();
        storage.delete("piggybank-v4").await.unwrap();
        storage.open_store("piggybank-v5").await.unwrap();

        // Store vanished between open and write; nothing may land anywhere.
        let result = store
            .put_all(vec![
                Snapshot::capture("http://localhost:5173/", &index_response("a")),
                Snapshot::capture(INDEX, &index_response("b")),
            ])
            .await;
        assert!(result.is_err());
        assert_eq!(storage.count_entries("piggybank-v4").await.unwrap(), 0);
        assert_eq!(storage.count_entries("piggybank-v5").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_entry_keys_and_delete() {
        let storage = CacheStorage::open_in_memory().await.unwrap();
        let store = storage.open_store("piggybank-v4").await.unwrap();
        store
            .put_all(vec![
                Snapshot::capture(INDEX, &index_response("doc")),
                Snapshot::capture("http://localhost:5173/", &index_response("root")),
            ])
            .await
            .unwrap();

        assert_eq!(store.keys().await.unwrap(), vec!["http://localhost:5173/", INDEX]);

        assert!(storage.delete_entry("piggybank-v4", INDEX).await.unwrap());
        assert!(!storage.delete_entry("piggybank-v4", INDEX).await.unwrap());
        assert_eq!(store.keys().await.unwrap(), vec!["http://localhost:5173/"]);
    }

    #[tokio::test]
    async fn test_get_entry_rejects_unknown_kind() {
        let storage = CacheStorage::open_in_memory().await.unwrap();
        let store = storage.open_store("piggybank-v4").await.unwrap();
        store.put(&Snapshot::capture(INDEX, &index_response("doc"))).await.unwrap();
        storage
            .conn
            .call(|conn| conn.execute("UPDATE cache_entries SET kind = 'weird'", []))
            .await
            .unwrap();

        let result = storage.get_entry("piggybank-v4", INDEX).await;
        assert!(matches!(result, Err(Error::CorruptSnapshot(_))));
    }

    #[test]
    fn test_into_response_rejects_bad_url() {
        let snapshot = Snapshot {
            key: INDEX.to_string(),
            url: Some("not a url".to_string()),
            status: 200,
            kind: ResponseKind::Basic,
            headers: Vec::new(),
            body: Vec::new(),
            stored_at: chrono::Utc::now().to_rfc3339(),
        };
        assert!(matches!(snapshot.into_response(), Err(Error::CorruptSnapshot(_))));
    }
}
