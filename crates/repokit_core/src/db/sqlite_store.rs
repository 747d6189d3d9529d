//! `StoreDriver` implementation over a single SQLite connection.
//!
//! # Invariants
//! - Read-only hints are enforced: a statement that would write is rejected.
//! - `PessimisticWrite` locks require an open transaction; transactions are
//!   started with `BEGIN IMMEDIATE`, so the write lock is already held.

use crate::model::entity::EntityId;
use crate::model::value::Value;
use crate::store::{
    LockMode, Row, Statement, StoreDriver, StoreError, StoreErrorKind, StoreResult,
};
use log::debug;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode};
use std::sync::Arc;

const NEXT_ID_SQL: &str = "INSERT INTO id_sequence (name, next_value) VALUES (?1, 2)
    ON CONFLICT (name) DO UPDATE SET next_value = next_value + 1
    RETURNING next_value - 1;";

/// SQLite-backed store driver. Obtain one through `open_store*`.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub(super) fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Raw connection access for diagnostics and tests.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn check_lock(&self, statement: &Statement) -> StoreResult<()> {
        if statement.hints.lock == Some(LockMode::PessimisticWrite) && !self.in_transaction() {
            return Err(StoreError::new(
                StoreErrorKind::Statement,
                "pessimistic write lock requires an active transaction",
            ));
        }
        Ok(())
    }
}

impl StoreDriver for SqliteStore {
    fn query(&self, statement: &Statement) -> StoreResult<Vec<Row>> {
        self.check_lock(statement)?;
        let mut stmt = self.conn.prepare(&statement.sql).map_err(classify)?;
        if statement.hints.read_only && !stmt.readonly() {
            return Err(StoreError::new(
                StoreErrorKind::Statement,
                "read-only hint given for a statement that writes",
            ));
        }

        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut rows = stmt
            .query(params_from_iter(statement.params.iter()))
            .map_err(classify)?;

        let mut result = Vec::new();
        while let Some(row) = rows.next().map_err(classify)? {
            let mut values = Vec::with_capacity(columns.len());
            for index in 0..columns.len() {
                values.push(read_value(row.get_ref(index).map_err(classify)?)?);
            }
            result.push(Row::new(Arc::clone(&columns), values));
        }

        debug!(
            "event=store_query module=db status=ok rows={} params={}",
            result.len(),
            statement.params.len()
        );
        Ok(result)
    }

    fn execute(&self, statement: &Statement) -> StoreResult<usize> {
        self.check_lock(statement)?;
        let changed = self
            .conn
            .execute(&statement.sql, params_from_iter(statement.params.iter()))
            .map_err(classify)?;
        debug!(
            "event=store_execute module=db status=ok changed={} params={}",
            changed,
            statement.params.len()
        );
        Ok(changed)
    }

    fn next_id(&self, sequence: &str) -> StoreResult<EntityId> {
        self.conn
            .query_row(NEXT_ID_SQL, [sequence], |row| row.get::<_, i64>(0))
            .map_err(classify)
    }

    fn begin(&self) -> StoreResult<()> {
        self.conn
            .execute_batch("BEGIN IMMEDIATE;")
            .map_err(classify)
    }

    fn commit(&self) -> StoreResult<()> {
        self.conn.execute_batch("COMMIT;").map_err(classify)
    }

    fn rollback(&self) -> StoreResult<()> {
        self.conn.execute_batch("ROLLBACK;").map_err(classify)
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn savepoint(&self, name: &str) -> StoreResult<()> {
        check_savepoint_name(name)?;
        self.conn
            .execute_batch(&format!("SAVEPOINT {name};"))
            .map_err(classify)
    }

    fn release_savepoint(&self, name: &str) -> StoreResult<()> {
        check_savepoint_name(name)?;
        self.conn
            .execute_batch(&format!("RELEASE SAVEPOINT {name};"))
            .map_err(classify)
    }

    fn rollback_to_savepoint(&self, name: &str) -> StoreResult<()> {
        check_savepoint_name(name)?;
        // ROLLBACK TO keeps the savepoint open; release it as well.
        self.conn
            .execute_batch(&format!(
                "ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name};"
            ))
            .map_err(classify)
    }
}

fn check_savepoint_name(name: &str) -> StoreResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if valid {
        return Ok(());
    }
    Err(StoreError::new(
        StoreErrorKind::Statement,
        format!("invalid savepoint name `{name}`"),
    ))
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Self::Null => Ok(ToSqlOutput::Borrowed(ValueRef::Null)),
            Self::Integer(value) => Ok(ToSqlOutput::Borrowed(ValueRef::Integer(*value))),
            Self::Real(value) => Ok(ToSqlOutput::Borrowed(ValueRef::Real(*value))),
            Self::Text(value) => Ok(ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes()))),
            Self::List(_) => Err(rusqlite::Error::ToSqlConversionFailure(Box::new(
                StoreError::new(
                    StoreErrorKind::Statement,
                    "list parameters must be expanded before binding",
                ),
            ))),
        }
    }
}

fn read_value(value: ValueRef<'_>) -> StoreResult<Value> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(value) => Ok(Value::Integer(value)),
        ValueRef::Real(value) => Ok(Value::Real(value)),
        ValueRef::Text(bytes) => String::from_utf8(bytes.to_vec())
            .map(Value::Text)
            .map_err(|err| {
                StoreError::with_source(StoreErrorKind::Statement, "non UTF-8 text column", err)
            }),
        ValueRef::Blob(_) => Err(StoreError::new(
            StoreErrorKind::Statement,
            "blob columns are not supported",
        )),
    }
}

fn classify(err: rusqlite::Error) -> StoreError {
    let kind = match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => StoreErrorKind::Constraint,
        Some(
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::CannotOpen
            | ErrorCode::SystemIoFailure
            | ErrorCode::DiskFull
            | ErrorCode::OperationInterrupted,
        ) => StoreErrorKind::Unavailable,
        _ => StoreErrorKind::Statement,
    };
    StoreError::with_source(kind, err.to_string(), err)
}
