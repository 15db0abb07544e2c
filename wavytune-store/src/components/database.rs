//! The connection guard around the encrypted database file.
//!
//! All reads and writes flow through [`Database`]: writers are serialized
//! (one write transaction at a time), readers proceed concurrently under WAL
//! snapshot isolation, and passphrase rotation takes the whole guard
//! exclusively. No other component holds the underlying handle.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;

use rusqlite::TransactionBehavior;
use tracing::{debug, info};

use crate::{
    components::keystore::Passphrase,
    config::StoreConfig,
    error::{self, StoreError},
};

mod connection;
pub(crate) use connection::DbConnection;

pub(crate) mod migrations;
mod schema;

#[cfg(test)]
mod testing;

pub(crate) type DbHandle = deadpool::managed::Object<connection::StoreManager>;

/// Owns the single access path to the encrypted database file.
///
/// At most one `Database` may be live per file across all processes on the
/// host; a sibling lockfile enforces this, and a second opener surfaces
/// [`StoreError::Busy`].
pub(crate) struct Database {
    path: PathBuf,
    pool: connection::StorePool,
    config: StoreConfig,
    /// Exclusive process lock over the file; released on close.
    lock: Mutex<Option<fmutex::Guard<'static>>>,
    schema_version: u32,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("schema_version", &self.schema_version)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Opens the encrypted file at `path`, creating it if absent.
    ///
    /// Classifies failure modes before any caller sees a connection:
    /// a passphrase that cannot decrypt the header is [`StoreError::WrongKey`],
    /// a file that decrypts but fails integrity checks is
    /// [`StoreError::Corrupt`], and a file locked by another process is
    /// [`StoreError::Busy`].
    pub(crate) async fn open(
        path: &Path,
        passphrase: Passphrase,
        config: StoreConfig,
    ) -> Result<Self, StoreError> {
        let lock = lock_database_file(path)?;

        if fs::exists(path).map_err(|source| StoreError::Io {
            path: path.to_owned(),
            source,
        })? {
            info!("Opening existing database");
        } else {
            info!("Creating empty database");
        }

        let pool = connection::pool(path, passphrase, config.pool_size())?;

        let db = Self {
            path: path.to_owned(),
            pool,
            config,
            lock: Mutex::new(Some(lock)),
            schema_version: 0,
        };

        let handle = db.handle().await?;
        handle.with_raw(check_database)?;

        Ok(db)
    }

    /// Brings the schema to the current version.
    ///
    /// A set `cancel` flag is honored only between steps, never inside an
    /// open transaction.
    pub(crate) async fn migrate(&mut self, cancel: Option<&AtomicBool>) -> Result<u32, StoreError> {
        info!("Applying latest database migrations");
        let handle = self.handle().await?;
        let version = handle.with_raw_mut(|conn| migrations::migrate(conn, cancel))?;
        self.schema_version = version;
        Ok(version)
    }

    /// Version the schema was at after the open-time migration pass.
    pub(crate) fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub(crate) async fn handle(&self) -> Result<DbHandle, StoreError> {
        self.pool.get().await.map_err(StoreError::from_pool)
    }

    /// Runs a read against a pooled connection under the shared side of the
    /// guard, retrying with bounded backoff while the database is busy.
    pub(crate) async fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send,
        F: Fn(&rusqlite::Connection) -> Result<T, rusqlite::Error> + Send,
    {
        let attempts = self.config.busy_attempts().max(1);
        let mut delay = self.config.busy_backoff();

        for attempt in 1..=attempts {
            let result = {
                let handle = self.handle().await?;
                handle.with_raw(&f)
            };
            match result {
                Ok(value) => return Ok(value),
                Err(e) if error::is_busy(&e) => {
                    if attempt == attempts {
                        break;
                    }
                    debug!(attempt, "database busy during read, backing off");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(error::classify_sqlite(e)),
            }
        }

        Err(StoreError::Busy)
    }

    /// Runs a write transaction under the exclusive writer section,
    /// retrying with bounded backoff while the database is busy.
    ///
    /// The closure may run more than once; it must not have effects outside
    /// the transaction it is handed.
    pub(crate) async fn write<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send,
        F: Fn(&rusqlite::Transaction<'_>) -> Result<T, rusqlite::Error> + Send,
    {
        let attempts = self.config.busy_attempts().max(1);
        let mut delay = self.config.busy_backoff();

        for attempt in 1..=attempts {
            let result = {
                let handle = self.handle().await?;
                handle.with_raw_mut(|conn| {
                    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                    let value = f(&tx)?;
                    tx.commit()?;
                    Ok(value)
                })
            };
            match result {
                Ok(value) => return Ok(value),
                Err(e) if error::is_busy(&e) => {
                    if attempt == attempts {
                        break;
                    }
                    debug!(attempt, "database busy during write, backing off");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(error::classify_sqlite(e)),
            }
        }

        Err(StoreError::Busy)
    }

    /// Re-encrypts the database in place under a new passphrase.
    ///
    /// Refuses with [`StoreError::RotationConflict`] while any other pooled
    /// connection is checked out: a connection keyed with the old passphrase
    /// could otherwise observe half-rekeyed pages. On failure the file
    /// remains openable under the prior passphrase.
    pub(crate) async fn rotate_passphrase(
        &self,
        current: &Passphrase,
        new: &Passphrase,
    ) -> Result<(), StoreError> {
        if !self.pool.manager().passphrase_matches(current) {
            return Err(StoreError::WrongKey);
        }

        let handle = self.handle().await?;
        let status = self.pool.status();
        if status.size - status.available > 1 {
            return Err(StoreError::RotationConflict);
        }

        info!("Rotating database passphrase");
        handle.with_exclusive(|conn| {
            // Idle connections are still keyed with the old passphrase.
            self.pool.retain(|_, _| false);
            // A connection checked out since the check above would be left
            // keyed with the old passphrase; recheck now that keying new
            // connections is held off by the guard.
            if self.pool.status().size > 1 {
                return Err(StoreError::RotationConflict);
            }
            conn.pragma_update(None, "rekey", new.expose())
                .map_err(error::classify_sqlite)?;
            self.pool.manager().set_passphrase(new);
            Ok(())
        })?;

        info!("Database passphrase rotated");
        Ok(())
    }

    /// Closes the guard. Idempotent, and safe to call from teardown paths
    /// after prior failures.
    pub(crate) fn close(&self) {
        if self.lock.lock().unwrap().take().is_some() {
            info!("Closing database");
        }
        self.pool.close();
    }
}

/// Health checks run once per open, before the handle is shared.
fn check_database(conn: &rusqlite::Connection) -> Result<(), StoreError> {
    // The first read of the file is where a wrong passphrase surfaces.
    if let Err(e) = conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    }) {
        return Err(error::classify_sqlite(e));
    }

    let result: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    if result != "ok" {
        return Err(StoreError::Corrupt { reason: result });
    }

    Ok(())
}

/// Ensures only a single opener is using the database file.
fn lock_database_file(path: &Path) -> Result<fmutex::Guard<'static>, StoreError> {
    let lockfile_path = path.with_extension("lock");

    {
        // Ensure that the lockfile exists on disk.
        let _ = fs::File::create(&lockfile_path).map_err(|source| StoreError::Io {
            path: lockfile_path.clone(),
            source,
        })?;
    }

    fmutex::try_lock_exclusive_path(&lockfile_path)
        .map_err(|source| StoreError::Io {
            path: lockfile_path.clone(),
            source,
        })?
        .ok_or(StoreError::Busy)
}
