//! The WavyTune encrypted store.
//!
//! WavyTune keeps its local state in a single SQLCipher-encrypted SQLite file.
//! This crate is the storage core beneath the application: it owns the
//! encrypted database handle, brings the schema to the current version on
//! open, and hands the GUI and background workers a narrow read/write
//! interface. The widget tree, audio pipeline, and CLI wiring are external
//! collaborators that only ever touch the database through [`Store`].

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unused_lifetimes,
    unused_qualifications
)]

mod components;
pub mod config;
mod error;
mod store;

pub use components::cache::SessionCache;
pub use components::keystore::{KeyManager, Passphrase, PassphraseSource};
pub use config::StoreConfig;
pub use error::StoreError;
pub use store::{CommitResult, Store};
