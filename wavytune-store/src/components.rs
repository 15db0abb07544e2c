//! Components of the storage core.
//!
//! The [`database`] component is the single synchronization point for the
//! encrypted file; [`keystore`] supplies the passphrase it is opened with;
//! [`cache`] sits on top of the guarded read/write path.

pub(crate) mod cache;
pub(crate) mod database;
pub(crate) mod keystore;
