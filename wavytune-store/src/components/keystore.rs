//! Passphrase acquisition and lifecycle.
//!
//! # Design
//!
//! WavyTune is a desktop application, so the passphrase protecting its
//! database may come from several places depending on how the app was
//! launched: the configuration layer can hand it over directly (e.g. after
//! reading an OS keystore), point at an environment variable (useful for
//! batch/CI runs), or defer to an interactive prompt owned by the GUI.
//! The key manager performs no discovery of its own; it is told exactly one
//! source and either produces material from it or fails with
//! [`StoreError::KeyUnavailable`].
//!
//! Passphrase material only ever lives inside [`secrecy::SecretString`], so
//! it is zeroed when released and excluded from `Debug` output. Nothing in
//! this module logs or persists the material.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};

use crate::error::StoreError;

/// Where the database passphrase comes from.
///
/// Chosen by the configuration-loading collaborator and handed to
/// [`KeyManager::new`].
pub enum PassphraseSource {
    /// Passphrase material supplied directly by the caller.
    Direct(SecretString),

    /// Passphrase read from the named environment variable.
    Environment(String),

    /// Passphrase requested from the user via the given callback.
    ///
    /// The callback returns `None` when the user declines to provide one.
    Prompt(Box<dyn Fn() -> Option<SecretString> + Send + Sync>),
}

impl fmt::Debug for PassphraseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(_) => f.debug_tuple("Direct").finish_non_exhaustive(),
            Self::Environment(name) => f.debug_tuple("Environment").field(name).finish(),
            Self::Prompt(_) => f.debug_tuple("Prompt").finish_non_exhaustive(),
        }
    }
}

/// Obtains and holds the database passphrase for a session.
#[derive(Debug)]
pub struct KeyManager {
    source: PassphraseSource,
}

impl KeyManager {
    /// Creates a key manager drawing from the given source.
    pub fn new(source: PassphraseSource) -> Self {
        Self { source }
    }

    /// Obtains passphrase material from the configured source.
    ///
    /// Fails with [`StoreError::KeyUnavailable`] if the source yields
    /// nothing. Empty material is treated as unavailable; SQLCipher would
    /// accept it and silently produce an unencrypted file.
    pub fn obtain_passphrase(&self) -> Result<Passphrase, StoreError> {
        let secret = match &self.source {
            PassphraseSource::Direct(secret) => secret.clone(),
            PassphraseSource::Environment(name) => match std::env::var(name) {
                Ok(value) => SecretString::new(value),
                Err(_) => return Err(StoreError::KeyUnavailable),
            },
            PassphraseSource::Prompt(prompt) => prompt().ok_or(StoreError::KeyUnavailable)?,
        };

        if secret.expose_secret().is_empty() {
            return Err(StoreError::KeyUnavailable);
        }

        Ok(Passphrase(secret))
    }
}

/// Opaque passphrase material.
///
/// The inner buffer is zeroed when the last clone is dropped.
#[derive(Clone)]
pub struct Passphrase(SecretString);

impl Passphrase {
    /// Wraps already-secret material, e.g. for [`Store::rotate_passphrase`].
    ///
    /// [`Store::rotate_passphrase`]: crate::Store::rotate_passphrase
    pub fn new(secret: SecretString) -> Self {
        Self(secret)
    }

    pub(crate) fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub(crate) fn matches(&self, other: &str) -> bool {
        self.expose().as_bytes() == other.as_bytes()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Passphrase").finish_non_exhaustive()
    }
}
