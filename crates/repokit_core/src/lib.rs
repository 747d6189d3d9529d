//! Repository-style data access over a relational store.
//! The session owns identity and pending writes; repositories compile
//! method contracts into statements and run them through it.

pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod session;
pub mod store;

pub use db::{open_store, open_store_in_memory, open_store_with, SqliteStore, StoreConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig};
pub use model::entity::{AuditFields, Entity, EntityId, Managed};
pub use model::member::Member;
pub use model::team::Team;
pub use model::value::Value;
pub use query::{Args, Direction, Modifying, Page, Pageable, QueryMethod, Slice, Sort};
pub use repo::{
    MemberDto, MemberRepository, MemberRepositoryCustom, RepoError, RepoResult, Repository,
    TeamRepository,
};
pub use session::{
    AuditingInterceptor, Clock, FlushMode, FlushSummary, Session, SessionConfig, SystemClock,
};
pub use store::{LockMode, StoreDriver};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
