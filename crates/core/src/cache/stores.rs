//! Store lifecycle: open, enumerate, delete.
//!
//! A store is a named bucket of snapshots. Worker versions never share a
//! store, so pruning on activation is a whole-store delete.

use super::connection::CacheStorage;
use super::snapshots::Snapshot;
use crate::Error;
use tokio_rusqlite::params;

/// Handle to a single named store.
///
/// Holding a handle does not keep the store alive: if another version's
/// activation deletes it, reads miss and writes fail.
#[derive(Clone, Debug)]
pub struct Store {
    storage: CacheStorage,
    name: String,
}

impl CacheStorage {
    /// Return the store called `name`, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the store row cannot be written.
    pub async fn open_store(&self, name: &str) -> Result<Store, Error> {
        let owned = name.to_string();
        let created_at = chrono::Utc::now().to_rfc3339();
        let inserted = self
            .conn
            .call(move |conn| -> Result<usize, Error> {
                let n = conn.execute(
                    "INSERT OR IGNORE INTO cache_stores (name, created_at) VALUES (?1, ?2)",
                    params![owned, created_at],
                )?;
                Ok(n)
            })
            .await
            .map_err(Error::from)?;

        if inserted > 0 {
            tracing::debug!(store = name, "created cache store");
        }

        Ok(Store { storage: self.clone(), name: name.to_string() })
    }

    /// Names of every store in this origin, sorted.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM cache_stores ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn has(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM cache_stores WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove a store and all of its entries.
    ///
    /// Returns false if no store had that name.
    pub async fn delete(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM cache_stores WHERE name = ?1", params![name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every store except `keep`.
    ///
    /// Each delete is attempted even if an earlier one fails; failures are
    /// logged and the store is left for a later call. Returns the names that
    /// were actually removed.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` only if the store names cannot be listed.
    pub async fn retain(&self, keep: &str) -> Result<Vec<String>, Error> {
        let mut removed = Vec::new();
        for name in self.keys().await? {
            if name == keep {
                continue;
            }
            match self.delete(&name).await {
                Ok(true) => {
                    tracing::info!(store = %name, current = keep, "deleted stale store");
                    removed.push(name);
                }
                Ok(false) => {}
                Err(err) => tracing::warn!(store = %name, error = %err, "failed to delete stale store"),
            }
        }
        Ok(removed)
    }

    /// Look up `key` in the store called `store_name` only.
    ///
    /// A missing store is a miss, not an error.
    pub async fn match_in(&self, store_name: &str, key: &str) -> Result<Option<Snapshot>, Error> {
        self.get_entry(store_name, key).await
    }
}

impl Store {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write a snapshot, replacing any entry with the same key.
    pub async fn put(&self, snapshot: &Snapshot) -> Result<(), Error> {
        self.storage.put_entry(&self.name, snapshot).await
    }

    /// Write several snapshots atomically.
    pub async fn put_all(&self, snapshots: Vec<Snapshot>) -> Result<(), Error> {
        self.storage.put_entries(&self.name, snapshots).await
    }

    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        self.storage.entry_keys(&self.name).await
    }

    pub async fn count(&self) -> Result<u64, Error> {
        self.storage.count_entries(&self.name).await
    }
}
