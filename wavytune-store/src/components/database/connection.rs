use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::{components::keystore::Passphrase, error::StoreError};

pub(super) fn pool(
    path: impl AsRef<Path>,
    passphrase: Passphrase,
    max_size: usize,
) -> Result<StorePool, StoreError> {
    let config = deadpool_sqlite::Config::new(path.as_ref());
    let manager = StoreManager::from_config(&config, passphrase);
    StorePool::builder(manager)
        .config(deadpool::managed::PoolConfig::new(max_size))
        .build()
        .map_err(|e| StoreError::Pool(e.to_string()))
}

pub(super) type StorePool = deadpool::managed::Pool<StoreManager>;

pub(crate) struct StoreManager {
    inner: deadpool_sqlite::Manager,
    /// Pooled connections are thread-safe, but SQLite does not reliably
    /// honor the busy handler when a rekey or migration rewrites the file
    /// under concurrent access, so structural operations take this lock
    /// exclusively while ordinary reads and writes share it.
    guard: Arc<RwLock<()>>,
    /// Serializes write transactions: one writer at a time, while readers
    /// proceed on other connections under WAL snapshot isolation.
    write_lock: Arc<Mutex<()>>,
    /// The passphrase new connections are keyed with; replaced on rotation.
    passphrase: Arc<RwLock<SecretString>>,
}

impl StoreManager {
    /// Creates a new [`StoreManager`] using the given
    /// [`deadpool_sqlite::Config`], keying every connection it creates with
    /// `passphrase`.
    #[must_use]
    pub(super) fn from_config(config: &deadpool_sqlite::Config, passphrase: Passphrase) -> Self {
        Self {
            inner: deadpool_sqlite::Manager::from_config(config, deadpool_sqlite::Runtime::Tokio1),
            guard: Arc::new(RwLock::new(())),
            write_lock: Arc::new(Mutex::new(())),
            passphrase: Arc::new(RwLock::new(SecretString::new(passphrase.expose().to_owned()))),
        }
    }

    pub(super) fn passphrase_matches(&self, candidate: &Passphrase) -> bool {
        candidate.matches(self.passphrase.read().unwrap().expose_secret())
    }

    pub(super) fn set_passphrase(&self, new: &Passphrase) {
        *self.passphrase.write().unwrap() = SecretString::new(new.expose().to_owned());
    }
}

impl deadpool::managed::Manager for StoreManager {
    type Type = DbConnection;
    type Error = rusqlite::Error;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        let inner = self.inner.create().await?;
        let guard = self.guard.clone();
        let passphrase = self.passphrase.clone();
        inner
            .interact(move |conn| {
                // Keying happens under the shared side of the guard, so a
                // connection is never keyed while a rekey holds the guard
                // exclusively.
                let _guard = guard.read().unwrap();
                conn.pragma_update(None, "key", passphrase.read().unwrap().expose_secret())?;
                conn.busy_timeout(Duration::from_secs(5))?;
                conn.pragma_update(None, "foreign_keys", "ON")?;
                // Readers snapshot the file as of the start of their read
                // transaction. `journal_mode` reports the resulting mode as
                // a row, so it cannot go through `pragma_update`.
                conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .map_err(|_| rusqlite::Error::UnwindingPanic)??;
        Ok(DbConnection {
            inner,
            guard: self.guard.clone(),
            write_lock: self.write_lock.clone(),
        })
    }

    async fn recycle(
        &self,
        obj: &mut Self::Type,
        metrics: &deadpool_sqlite::Metrics,
    ) -> deadpool::managed::RecycleResult<Self::Error> {
        self.inner.recycle(&mut obj.inner, metrics).await
    }
}

pub(crate) struct DbConnection {
    inner: deadpool_sync::SyncWrapper<rusqlite::Connection>,
    guard: Arc<RwLock<()>>,
    write_lock: Arc<Mutex<()>>,
}

impl DbConnection {
    pub(crate) fn with_raw<T>(&self, f: impl FnOnce(&rusqlite::Connection) -> T) -> T {
        tokio::task::block_in_place(|| {
            let _guard = self.guard.read().unwrap();
            f(self.inner.lock().unwrap().as_ref())
        })
    }

    pub(crate) fn with_raw_mut<T>(&self, f: impl FnOnce(&mut rusqlite::Connection) -> T) -> T {
        tokio::task::block_in_place(|| {
            let _writer = self.write_lock.lock().unwrap();
            let _guard = self.guard.read().unwrap();
            f(self.inner.lock().unwrap().as_mut())
        })
    }

    pub(crate) fn with_exclusive<T>(&self, f: impl FnOnce(&mut rusqlite::Connection) -> T) -> T {
        tokio::task::block_in_place(|| {
            let _guard = self.guard.write().unwrap();
            f(self.inner.lock().unwrap().as_mut())
        })
    }
}
