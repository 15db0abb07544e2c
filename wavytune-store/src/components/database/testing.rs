//! Test utilities for database operations.

use secrecy::SecretString;
use tempfile::TempDir;

use crate::{
    components::keystore::{KeyManager, Passphrase, PassphraseSource},
    config::StoreConfig,
    error::StoreError,
    store::Store,
};

pub(crate) fn passphrase(material: &str) -> Passphrase {
    Passphrase::new(SecretString::new(material.to_owned()))
}

pub(crate) fn key_manager(material: &str) -> KeyManager {
    KeyManager::new(PassphraseSource::Direct(SecretString::new(
        material.to_owned(),
    )))
}

/// An on-disk encrypted store backed by a temporary directory.
///
/// The directory lives as long as the wrapper, so a test can close and
/// reopen the same file to exercise persistence.
#[derive(Debug)]
pub(crate) struct TestStore {
    dir: TempDir,
    pub(crate) store: Store,
}

impl TestStore {
    pub(crate) async fn new(material: &str) -> Result<Self, StoreError> {
        let dir = TempDir::new().expect("failed to create temporary directory");
        let store = Store::open(
            dir.path().join("wavytune.db"),
            &key_manager(material),
            StoreConfig::default(),
        )
        .await?;
        Ok(Self { dir, store })
    }

    /// Closes the store and reopens the same file with `material`.
    pub(crate) async fn reopen(self, material: &str) -> Result<Self, StoreError> {
        self.store.close();
        let store = Store::open(
            self.dir.path().join("wavytune.db"),
            &key_manager(material),
            StoreConfig::default(),
        )
        .await?;
        Ok(Self {
            dir: self.dir,
            store,
        })
    }
}
