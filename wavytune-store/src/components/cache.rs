//! Read-through cache of small hot records.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rusqlite::{OptionalExtension, named_params};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::debug;

use super::database::Database;
use crate::error::StoreError;

/// Session-lifetime cache over the settings table.
///
/// Small hot records (user settings, the last project) are read on almost
/// every interaction, so they are kept in memory for the session. A value
/// only ever enters the cache from a committed state: `get` populates it
/// from a guarded read, and `put` updates it strictly after the write
/// transaction commits, so the cache never shows an uncommitted value.
///
/// There is no eviction beyond the session bound; the table is tiny.
#[derive(Clone)]
pub struct SessionCache {
    db: Arc<Database>,
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCache").finish_non_exhaustive()
    }
}

impl SessionCache {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Loads every settings row into the cache. Called once at open.
    pub(crate) async fn warm(&self) -> Result<(), StoreError> {
        let rows = self
            .db
            .read(|conn| {
                let mut stmt = conn.prepare("SELECT key, value FROM wavytune_settings")?;
                let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
                rows.collect::<Result<Vec<(String, String)>, _>>()
            })
            .await?;

        let mut entries = self.entries.write().await;
        entries.extend(rows);
        debug!(settings = entries.len(), "Session cache warmed");
        Ok(())
    }

    /// Returns the value for `key`, without touching the database on a hit.
    ///
    /// A miss falls through to a guarded read and populates the cache.
    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(value) = self.entries.read().await.get(key) {
            return Ok(Some(value.clone()));
        }

        let fetched = self
            .db
            .read(|conn| {
                conn.query_row(
                    "SELECT value FROM wavytune_settings WHERE key = :key",
                    named_params! {":key": key},
                    |row| row.get::<_, String>(0),
                )
                .optional()
            })
            .await?;

        if let Some(value) = &fetched {
            self.entries
                .write()
                .await
                .insert(key.to_owned(), value.clone());
        }

        Ok(fetched)
    }

    /// Writes `key` through the guard, then updates the cache.
    pub async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let now = OffsetDateTime::now_utc();
        self.db
            .write(|tx| {
                tx.execute(
                    "INSERT INTO wavytune_settings (key, value, updated_at)
                    VALUES (:key, :value, :updated_at)
                    ON CONFLICT (key) DO UPDATE SET value = :value, updated_at = :updated_at",
                    named_params! {
                        ":key": key,
                        ":value": value,
                        ":updated_at": now,
                    },
                )?;
                Ok(())
            })
            .await?;

        // Only reached once the transaction above has committed.
        self.entries
            .write()
            .await
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    /// Drops `key` from the cache.
    ///
    /// For values known to have changed outside the cache's own write path,
    /// such as a bulk import issued directly through the store.
    pub async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
    }
}
