//! Store configuration.
//!
//! The database path and passphrase source are constructor arguments to
//! [`Store::open`]; this type only carries tuning knobs. Fields are
//! `Option<T>` to distinguish a caller relying on a default value (which may
//! change over time) from a caller explicitly configuring the current
//! default; the accessor methods apply the defaults.
//!
//! [`Store::open`]: crate::Store::open

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for how WavyTune stores local data.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Maximum number of pooled connections to the encrypted file.
    ///
    /// One connection serves the GUI event thread; the rest serve background
    /// workers reading under snapshot isolation.
    pub pool_size: Option<usize>,

    /// Number of attempts made against a busy database before surfacing
    /// [`Busy`](crate::StoreError::Busy) to the caller.
    pub busy_attempts: Option<u32>,

    /// Base delay between busy retries, in milliseconds. Doubles on each
    /// subsequent attempt.
    pub busy_backoff_ms: Option<u64>,
}

impl StoreConfig {
    /// Returns the connection pool size to use.
    pub fn pool_size(&self) -> usize {
        self.pool_size.unwrap_or(4)
    }

    /// Returns the bounded number of attempts against a busy database.
    pub fn busy_attempts(&self) -> u32 {
        self.busy_attempts.unwrap_or(5)
    }

    /// Returns the base backoff delay between busy retries.
    pub fn busy_backoff(&self) -> Duration {
        Duration::from_millis(self.busy_backoff_ms.unwrap_or(50))
    }
}
