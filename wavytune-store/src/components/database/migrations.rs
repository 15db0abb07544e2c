//! Ordered schema migrations.
//!
//! Every schema change ships as a [`Migration`] registered in [`all`]: a
//! static, ordered list validated at startup, so a gap or duplicate is
//! caught long before it reaches a user's database. Each step runs inside
//! its own transaction together with the version bump and the audit-log
//! row, so an interruption leaves the stored version at the last committed
//! step rather than half-applied.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use rusqlite::{Connection, Transaction, TransactionBehavior, named_params};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::StoreError;

mod initial_settings;
mod recent_projects;

/// A single versioned schema change.
pub(crate) trait Migration {
    /// Stable identity of this step. Never reused, even if the step is
    /// retired.
    fn id(&self) -> Uuid;

    /// Version the database is at after this step commits. Versions are
    /// contiguous from 1 in registration order.
    fn version(&self) -> u32;

    fn description(&self) -> &'static str;

    fn up(&self, transaction: &Transaction<'_>) -> Result<(), rusqlite::Error>;
}

pub(super) fn all() -> Vec<Box<dyn Migration + Send + Sync>> {
    vec![
        // initial_settings
        Box::new(initial_settings::Migration) as _,
        // recent_projects
        Box::new(recent_projects::Migration) as _,
    ]
}

/// Greatest schema version this binary understands.
pub(crate) fn supported_version() -> u32 {
    all().last().map(|step| step.version()).unwrap_or(0)
}

/// Applies every registered step newer than the stored schema version.
///
/// Returns the version the database is at afterwards. A set `cancel` flag is
/// honored only before the next step begins, never inside an open
/// transaction.
pub(crate) fn migrate(
    conn: &mut Connection,
    cancel: Option<&AtomicBool>,
) -> Result<u32, StoreError> {
    let steps = all();
    migrate_with(conn, &steps, cancel)
}

pub(super) fn migrate_with(
    conn: &mut Connection,
    steps: &[Box<dyn Migration + Send + Sync>],
    cancel: Option<&AtomicBool>,
) -> Result<u32, StoreError> {
    validate(steps);

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS wavytune_schema_version (
            version INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS wavytune_migrations (
            id TEXT NOT NULL UNIQUE,
            version INTEGER NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )?;

    let mut stored = stored_version(conn)?;
    let supported = steps.last().map(|step| step.version()).unwrap_or(0);
    if stored > supported {
        return Err(StoreError::UnsupportedVersion { stored, supported });
    }

    for step in steps {
        if step.version() <= stored {
            continue;
        }

        if cancel.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
            info!(version = stored, "Migration cancelled before next step");
            return Err(StoreError::Cancelled);
        }

        // The audit log is authoritative for "has this step run": a step
        // recorded there is never applied twice, even if the version row
        // was tampered with.
        let recorded: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM wavytune_migrations WHERE id = :id)",
            named_params! {":id": step.id().to_string()},
            |row| row.get(0),
        )?;
        if recorded {
            warn!(id = %step.id(), "Migration has already been applied, skipping");
            // Reconcile the version row with the audit log, so the stored
            // version does not stay stale if no later step commits.
            conn.execute(
                "UPDATE wavytune_schema_version SET version = :version",
                named_params! {":version": step.version()},
            )?;
            stored = step.version();
            continue;
        }

        info!(
            id = %step.id(),
            version = step.version(),
            "Applying migration: {}",
            step.description(),
        );

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let apply = |tx: &Transaction<'_>| -> Result<(), rusqlite::Error> {
            step.up(tx)?;
            tx.execute(
                "UPDATE wavytune_schema_version SET version = :version",
                named_params! {":version": step.version()},
            )?;
            tx.execute(
                "INSERT INTO wavytune_migrations (id, version, applied_at)
                VALUES (:id, :version, :applied_at)",
                named_params! {
                    ":id": step.id().to_string(),
                    ":version": step.version(),
                    ":applied_at": OffsetDateTime::now_utc(),
                },
            )?;
            Ok(())
        };
        match apply(&tx).and_then(|()| tx.commit()) {
            Ok(()) => stored = step.version(),
            Err(source) => {
                return Err(StoreError::MigrationFailed {
                    step: step.version(),
                    id: step.id(),
                    source,
                });
            }
        }
    }

    Ok(stored)
}

fn stored_version(conn: &Connection) -> Result<u32, StoreError> {
    let version = conn.query_row(
        "SELECT version FROM wavytune_schema_version",
        [],
        |row| row.get::<_, u32>(0),
    );
    match version {
        Ok(version) => Ok(version),
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            conn.execute("INSERT INTO wavytune_schema_version (version) VALUES (0)", [])?;
            Ok(0)
        }
        Err(e) => Err(e.into()),
    }
}

/// An invalid registry is a programming error, caught here and pinned by a
/// unit test rather than discovered against a user's database.
fn validate(steps: &[Box<dyn Migration + Send + Sync>]) {
    let mut ids = HashSet::new();
    for (index, step) in steps.iter().enumerate() {
        assert!(
            ids.insert(step.id()),
            "duplicate migration id {}",
            step.id()
        );
        assert_eq!(
            step.version(),
            index as u32 + 1,
            "migration versions must be contiguous from 1",
        );
    }
}
