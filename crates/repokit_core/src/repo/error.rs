//! Error kinds surfaced by the session, resolver and repository facade.

use crate::db::DbError;
use crate::model::entity::EntityId;
use crate::store::{StoreError, StoreErrorKind};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    /// A required single result (or required id lookup) matched nothing.
    NotFound {
        entity: &'static str,
        id: Option<EntityId>,
    },
    /// The query contract cannot be resolved; raised before any round trip.
    Malformed(String),
    /// A single-result contract matched more than one row.
    NotUnique { entity: &'static str, count: usize },
    /// The store rejected a write. Not retried.
    Conflict(StoreError),
    /// Driver-level failure or timeout. Not retried.
    StoreUnavailable(StoreError),
    /// Any other driver statement failure, propagated unchanged.
    Store(StoreError),
    /// Entity state rejected before it was written.
    Validation(String),
    /// Persisted row cannot be decoded into an entity.
    InvalidData(String),
    /// Store bootstrap failure (open or migration).
    Db(DbError),
}

impl RepoError {
    pub fn not_found(entity: &'static str, id: Option<EntityId>) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Stable short code for log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Malformed(_) => "malformed",
            Self::NotUnique { .. } => "not_unique",
            Self::Conflict(_) => "conflict",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Store(_) => "store_error",
            Self::Validation(_) => "validation",
            Self::InvalidData(_) => "invalid_data",
            Self::Db(_) => "db_error",
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound {
                entity,
                id: Some(id),
            } => write!(f, "{entity} not found: {id}"),
            Self::NotFound { entity, id: None } => write!(f, "no {entity} matched the query"),
            Self::Malformed(message) => write!(f, "malformed query contract: {message}"),
            Self::NotUnique { entity, count } => write!(
                f,
                "expected at most one {entity}, but the query matched {count} rows"
            ),
            Self::Conflict(err) => write!(f, "write conflict: {err}"),
            Self::StoreUnavailable(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Validation(message) => write!(f, "validation failed: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Conflict(err) | Self::StoreUnavailable(err) | Self::Store(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound { .. }
            | Self::Malformed(_)
            | Self::NotUnique { .. }
            | Self::Validation(_)
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<StoreError> for RepoError {
    fn from(value: StoreError) -> Self {
        match value.kind {
            StoreErrorKind::Constraint => Self::Conflict(value),
            StoreErrorKind::Unavailable => Self::StoreUnavailable(value),
            StoreErrorKind::Statement => Self::Store(value),
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}
