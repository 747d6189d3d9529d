//! Store driver contract consumed by the session and the bulk executor.
//!
//! # Responsibility
//! - Define the statement/row shapes that cross the driver boundary.
//! - Classify driver failures so callers can tell conflicts from outages.
//!
//! # Invariants
//! - Statements are fully rendered: positional `?` placeholders only and no
//!   `Value::List` parameters.
//! - Drivers hold no session state. A driver has at most one open
//!   transaction; sessions that need transactions of their own each use a
//!   separate driver over the same database.

mod row;

pub use row::{Row, RowView};

use crate::model::entity::EntityId;
use crate::model::value::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Row lock requested by a query plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Shared read; the default behavior of every read.
    Read,
    /// Exclusive write lock held until the enclosing transaction ends.
    PessimisticWrite,
}

/// Per-statement metadata the driver must honor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatementHints {
    pub read_only: bool,
    pub lock: Option<LockMode>,
}

/// One rendered, parameterized statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
    pub hints: StatementHints,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
            hints: StatementHints::default(),
        }
    }

    pub fn with_hints(mut self, hints: StatementHints) -> Self {
        self.hints = hints;
        self
    }
}

/// Failure class reported by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// The store rejected a write (unique, foreign key, not-null...).
    Constraint,
    /// The store could not be reached or timed out waiting for a lock.
    Unavailable,
    /// Any other statement-level failure.
    Statement,
}

#[derive(Debug)]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: StoreErrorKind,
        message: impl Into<String>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            StoreErrorKind::Constraint => "constraint violation",
            StoreErrorKind::Unavailable => "store unavailable",
            StoreErrorKind::Statement => "statement failed",
        };
        write!(f, "{kind}: {}", self.message)
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn Error + 'static))
    }
}

/// Lower-level store capable of running parameterized statements.
pub trait StoreDriver {
    /// Runs a read statement and returns every row.
    fn query(&self, statement: &Statement) -> StoreResult<Vec<Row>>;
    /// Runs a write statement and returns the affected row count.
    fn execute(&self, statement: &Statement) -> StoreResult<usize>;
    /// Hands out the next primary key of a named sequence.
    fn next_id(&self, sequence: &str) -> StoreResult<EntityId>;
    fn begin(&self) -> StoreResult<()>;
    fn commit(&self) -> StoreResult<()>;
    fn rollback(&self) -> StoreResult<()>;
    /// Whether a transaction is open on the driver, whoever opened it.
    fn in_transaction(&self) -> bool;
    /// Opens a named savepoint inside the current transaction.
    fn savepoint(&self, name: &str) -> StoreResult<()>;
    /// Keeps every write since `savepoint(name)` and drops the savepoint.
    fn release_savepoint(&self, name: &str) -> StoreResult<()>;
    /// Undoes every write since `savepoint(name)` and drops the savepoint.
    fn rollback_to_savepoint(&self, name: &str) -> StoreResult<()>;
}
