//! SQLite backing store for the repository layer.
//!
//! # Responsibility
//! - Open file-backed or in-memory databases holding the `id_sequence`,
//!   `team` and `member` tables.
//! - Bring the schema up to date before handing out a [`SqliteStore`].
//! - Implement `StoreDriver` so sessions and repositories never name SQLite
//!   types.
//!
//! # Invariants
//! - The schema version lives in `PRAGMA user_version`; a database written
//!   by a newer build is refused, never downgraded.
//! - A store is only returned once every pending migration has committed.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;
mod sqlite_store;

pub use open::{open_store, open_store_in_memory, open_store_with, StoreConfig};
pub use sqlite_store::SqliteStore;

pub type DbResult<T> = Result<T, DbError>;

/// Failure while opening a store or migrating its schema.
#[derive(Debug)]
pub enum DbError {
    /// Connection setup or pragma failure.
    Sqlite(rusqlite::Error),
    /// A migration script failed; nothing from the run was kept.
    Migration {
        version: u32,
        name: &'static str,
        source: rusqlite::Error,
    },
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite: {err}"),
            Self::Migration {
                version,
                name,
                source,
            } => write!(f, "migration {version} ({name}) failed: {source}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "repository schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Migration { source, .. } => Some(source),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
