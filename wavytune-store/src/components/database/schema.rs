//! Documentation about the database structure.
//!
//! The structure is managed by [`Database::open`], which applies migrations
//! (defined in [`migrations`]) that produce the current structure.
//!
//! The SQL code in this module's constants encodes the current database
//! structure, as represented internally by SQLite. We do not use these
//! constants at runtime; instead we check the output of the migrations in a
//! test, to pin the expected database structure. Note that SQLite records
//! the statement text with any `IF NOT EXISTS` clause removed.
//!
//! [`Database::open`]: super::Database::open
//! [`migrations`]: super::migrations

// The constants in this module are only used in tests, but `#[cfg(test)]`
// prevents them from showing up in `cargo doc --document-private-items`.
#![allow(dead_code)]

/// Tracks which migration steps have been applied.
///
/// ### Columns
///
/// - `id` is the string encoding of a step's stable UUID.
/// - `version`: The schema version the step produced.
/// - `applied_at`: The time at which the step committed, as a string in the
///   format `yyyy-MM-dd HH:mm:ss.fffffffzzz`.
pub(crate) const TABLE_MIGRATIONS: &str = r#"
CREATE TABLE wavytune_migrations (
    id TEXT NOT NULL UNIQUE,
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL
)
"#;

/// Stores the paths of recently opened projects.
///
/// ### Columns
///
/// - `path` is the absolute path of a project file.
/// - `last_opened`: The time at which the project was last opened, as a
///   string in the format `yyyy-MM-dd HH:mm:ss.fffffffzzz`.
pub(crate) const TABLE_RECENT_PROJECTS: &str = r#"
CREATE TABLE wavytune_recent_projects (
    path TEXT NOT NULL UNIQUE,
    last_opened TEXT NOT NULL
)
"#;

/// Stores the current schema version.
///
/// This table should only ever contain exactly one row. The version is
/// advanced in the same transaction as the step that produced it.
pub(crate) const TABLE_SCHEMA_VERSION: &str = r#"
CREATE TABLE wavytune_schema_version (
    version INTEGER NOT NULL
)
"#;

/// Stores small hot records such as user settings and the last project.
///
/// This is the table backing the session cache.
///
/// ### Columns
///
/// - `key` is an application-chosen setting name.
/// - `value` is the string encoding of the setting.
/// - `updated_at`: The time at which the value was last written, as a string
///   in the format `yyyy-MM-dd HH:mm:ss.fffffffzzz`.
pub(crate) const TABLE_SETTINGS: &str = r#"
CREATE TABLE wavytune_settings (
    key TEXT NOT NULL PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;
