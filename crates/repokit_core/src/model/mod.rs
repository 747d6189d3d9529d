//! Entity model: mapping metadata, values, relations and the sample domain.
//!
//! # Responsibility
//! - Define the shapes the session tracks and the resolver maps to columns.
//! - Host the `Member`/`Team` domain used by the typed repositories.
//!
//! # Invariants
//! - Every entity is identified by a stable `EntityId` once saved.
//! - Audit fields are stamped by the session, never by callers.

pub mod entity;
pub mod member;
pub mod relation;
pub mod team;
pub mod value;
