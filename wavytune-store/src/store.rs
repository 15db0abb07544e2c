//! The narrow interface the rest of the application talks to.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tracing::info;

use crate::{
    components::{
        cache::SessionCache,
        database::Database,
        keystore::{KeyManager, Passphrase},
    },
    config::StoreConfig,
    error::StoreError,
};

/// The result of a committed write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommitResult {
    /// Number of rows the statement changed.
    pub rows_affected: usize,
}

/// A handle to the open encrypted store.
///
/// Cloning is cheap and hands the same underlying guard to another thread;
/// the GUI event thread and background workers share one `Store`. Opening,
/// migration, and rotation are long-running and must not be issued from the
/// GUI thread; run them on a worker and signal completion back through the
/// resolved future.
///
/// The store requires a multi-threaded Tokio runtime: guarded database
/// access runs via [`tokio::task::block_in_place`].
#[derive(Clone, Debug)]
pub struct Store {
    db: Arc<Database>,
    cache: SessionCache,
}

impl Store {
    /// Opens (creating if absent) the encrypted database at `path`.
    ///
    /// Obtains the passphrase from `keys`, opens the file with it, brings
    /// the schema to the current version, and warms the session cache, in
    /// that order. Each failure mode surfaces as the matching
    /// [`StoreError`] kind.
    pub async fn open(
        path: impl AsRef<Path>,
        keys: &KeyManager,
        config: StoreConfig,
    ) -> Result<Self, StoreError> {
        Self::open_with_cancel(path, keys, config, None).await
    }

    /// Like [`Store::open`], but cancellable between migration steps.
    ///
    /// Setting the flag never interrupts an open transaction; it is honored
    /// only before the next migration step begins, and surfaces as
    /// [`StoreError::Cancelled`].
    pub async fn open_with_cancel(
        path: impl AsRef<Path>,
        keys: &KeyManager,
        config: StoreConfig,
        cancel: Option<&AtomicBool>,
    ) -> Result<Self, StoreError> {
        let passphrase = keys.obtain_passphrase()?;
        let mut db = Database::open(path.as_ref(), passphrase, config).await?;
        db.migrate(cancel).await?;

        let db = Arc::new(db);
        let cache = SessionCache::new(db.clone());
        cache.warm().await?;

        info!(version = db.schema_version(), "Store opened");
        Ok(Self { db, cache })
    }

    /// Runs a read against a consistent snapshot of the database.
    ///
    /// Reads issued while a write transaction is in progress observe the
    /// pre-write state; once the writer commits, subsequent reads observe
    /// the post-write state.
    pub async fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send,
        F: Fn(&rusqlite::Connection) -> Result<T, rusqlite::Error> + Send,
    {
        self.db.read(f).await
    }

    /// Runs `f` inside a write transaction, committing on success.
    ///
    /// Writers are serialized; lock contention is retried with bounded
    /// backoff before surfacing [`StoreError::Busy`]. The closure may run
    /// more than once under retry and must not have effects outside the
    /// transaction it is handed.
    pub async fn write<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send,
        F: Fn(&rusqlite::Transaction<'_>) -> Result<T, rusqlite::Error> + Send,
    {
        self.db.write(f).await
    }

    /// Executes a single statement inside a write transaction.
    pub async fn execute<P>(&self, sql: &str, params: P) -> Result<CommitResult, StoreError>
    where
        P: rusqlite::Params + Clone + Send + Sync,
    {
        let rows_affected = self
            .db
            .write(|tx| tx.execute(sql, params.clone()))
            .await?;
        Ok(CommitResult { rows_affected })
    }

    /// The session cache over the settings table.
    pub fn settings(&self) -> &SessionCache {
        &self.cache
    }

    /// Version the schema was at after the open-time migration pass.
    pub fn schema_version(&self) -> u32 {
        self.db.schema_version()
    }

    /// Greatest schema version this binary understands.
    ///
    /// A database reporting a newer version than this fails to open with
    /// [`StoreError::UnsupportedVersion`].
    pub fn supported_schema_version() -> u32 {
        crate::components::database::migrations::supported_version()
    }

    /// Re-encrypts the database in place under `new`.
    ///
    /// Fails with [`StoreError::WrongKey`] if `current` is not the
    /// passphrase the store is keyed with, and with
    /// [`StoreError::RotationConflict`] while any other connection is in
    /// use. On failure the database remains openable under `current`.
    pub async fn rotate_passphrase(
        &self,
        current: &Passphrase,
        new: &Passphrase,
    ) -> Result<(), StoreError> {
        self.db.rotate_passphrase(current, new).await
    }

    /// Closes the store.
    ///
    /// Idempotent, and safe to call from a teardown path after prior
    /// failures. Cached values remain readable; guarded reads and writes
    /// fail once the pool is closed.
    pub fn close(&self) {
        self.db.close();
    }
}
