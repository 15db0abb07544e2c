use std::path::PathBuf;

use uuid::Uuid;

/// Errors surfaced by the encrypted store.
///
/// The transient condition (a busy database) is retried internally with
/// bounded backoff before [`StoreError::Busy`] reaches a caller; every other
/// kind is surfaced unchanged. The store never degrades data integrity to
/// keep running.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// No configured source yielded passphrase material.
    #[error("no passphrase source yielded key material")]
    KeyUnavailable,

    /// The passphrase cannot decrypt the database header.
    #[error("passphrase does not decrypt the database")]
    WrongKey,

    /// The file decrypted, but failed integrity checks.
    #[error("database failed integrity checks: {reason}")]
    Corrupt {
        /// First integrity failure reported by SQLite.
        reason: String,
    },

    /// The database is locked by another process, or lock contention
    /// outlasted the bounded retry budget.
    #[error("database is busy")]
    Busy,

    /// Another connection was live while a passphrase rotation was requested.
    #[error("cannot rotate the passphrase while other connections are in use")]
    RotationConflict,

    /// A migration step failed; the stored schema version remains at the
    /// last successfully committed step.
    #[error("migration step {step} ({id}) failed")]
    MigrationFailed {
        /// Schema version the failing step would have produced.
        step: u32,
        /// Stable identity of the failing step.
        id: Uuid,
        /// The underlying SQLite failure.
        #[source]
        source: rusqlite::Error,
    },

    /// The stored schema version is newer than this binary understands.
    ///
    /// Opening such a database read-write would risk silent data loss, so
    /// the store refuses to run any migration against it.
    #[error("database schema version {stored} is newer than the supported version {supported}")]
    UnsupportedVersion {
        /// Version recorded inside the database.
        stored: u32,
        /// Greatest version this binary supports.
        supported: u32,
    },

    /// A cancellation request was honored between migration steps.
    #[error("operation cancelled before the next migration step")]
    Cancelled,

    /// An SQLite failure outside the classified cases above.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// A connection pool failure.
    #[error("connection pool error: {0}")]
    Pool(String),

    /// A filesystem error around the database file or its lockfile.
    #[error("i/o error at {path}: {source}")]
    Io {
        /// Path the operation touched.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Classifies a pool-level failure into the store taxonomy.
    pub(crate) fn from_pool(e: deadpool::managed::PoolError<rusqlite::Error>) -> Self {
        match e {
            deadpool::managed::PoolError::Timeout(_) => StoreError::Busy,
            deadpool::managed::PoolError::Backend(e) => classify_sqlite(e),
            other => StoreError::Pool(other.to_string()),
        }
    }
}

/// Maps a raw SQLite error onto the store taxonomy.
///
/// Keying an SQLCipher database never fails by itself; a wrong passphrase
/// shows up as `NotADatabase` on the first read of the file. That case must
/// become [`StoreError::WrongKey`], never [`StoreError::Corrupt`].
pub(crate) fn classify_sqlite(e: rusqlite::Error) -> StoreError {
    if is_not_a_database(&e) {
        StoreError::WrongKey
    } else if is_busy(&e) {
        StoreError::Busy
    } else {
        StoreError::Sqlite(e)
    }
}

pub(crate) fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(code, _) if matches!(
            code.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        )
    )
}

pub(crate) fn is_not_a_database(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(code, _)
            if code.code == rusqlite::ErrorCode::NotADatabase
    )
}
