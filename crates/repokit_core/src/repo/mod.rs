//! Repository layer: the facade callers program against.
//!
//! # Responsibility
//! - Offer CRUD, derived/template queries, paging and bulk updates per
//!   entity type over a caller-owned `Session`.
//! - Host the typed `MemberRepository` and its custom extension seam.
//!
//! # Invariants
//! - Repositories are stateless; identity and pending writes live in the
//!   session passed to every call.
//! - Errors surface as `RepoError` kinds, never as raw driver errors.

pub mod bulk;
pub mod error;
pub mod member_repo;
pub mod repository;

pub use error::{RepoError, RepoResult};
pub use member_repo::{
    MemberDto, MemberRepository, MemberRepositoryCustom, MemberRepositoryImpl, TeamRepository,
};
pub use repository::Repository;
