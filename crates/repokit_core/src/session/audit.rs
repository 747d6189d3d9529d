//! Auditing interceptor invoked by the session before inserts and updates.
//!
//! # Invariants
//! - `created_at`/`created_by` are written once, on insert, and never again.
//! - A fresh insert has `created_* == last_modified_*`.
//! - Successive update stamps on one entity strictly increase.

use crate::model::entity::{AuditFields, Auditing, Timestamp};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Supplies the identifier of whoever performs the current write.
pub trait ActorResolver {
    fn current_actor(&self) -> Option<String>;
}

impl<F> ActorResolver for F
where
    F: Fn() -> Option<String>,
{
    fn current_actor(&self) -> Option<String> {
        self()
    }
}

/// Source of audit instants, in epoch milliseconds.
pub trait Clock {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| {
                Timestamp::try_from(elapsed.as_millis()).unwrap_or(Timestamp::MAX)
            })
    }
}

/// Stamps audit fields. Cheap to clone; share one per process.
#[derive(Clone)]
pub struct AuditingInterceptor {
    actor: Arc<dyn ActorResolver + Send + Sync>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl AuditingInterceptor {
    pub fn new(actor: impl ActorResolver + Send + Sync + 'static) -> Self {
        Self::with_clock(actor, SystemClock)
    }

    pub fn with_clock(
        actor: impl ActorResolver + Send + Sync + 'static,
        clock: impl Clock + Send + Sync + 'static,
    ) -> Self {
        Self {
            actor: Arc::new(actor),
            clock: Arc::new(clock),
        }
    }

    /// Interceptor that records instants but no actor.
    pub fn anonymous() -> Self {
        Self::new(|| None::<String>)
    }

    pub fn on_insert(&self, audit: &mut AuditFields, policy: Auditing) {
        let now = self.clock.now();
        let actor = self.actor_for(policy);
        audit.created_at = Some(now);
        audit.created_by = actor.clone();
        audit.last_modified_at = Some(now);
        audit.last_modified_by = actor;
    }

    pub fn on_update(&self, audit: &mut AuditFields, policy: Auditing) {
        let now = self.clock.now();
        let stamp = match audit.last_modified_at {
            Some(previous) if previous >= now => previous.saturating_add(1),
            _ => now,
        };
        audit.last_modified_at = Some(stamp);
        audit.last_modified_by = self.actor_for(policy);
    }

    fn actor_for(&self, policy: Auditing) -> Option<String> {
        match policy {
            Auditing::Full => self.actor.current_actor(),
            Auditing::TimestampsOnly => None,
        }
    }
}

impl std::fmt::Debug for AuditingInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditingInterceptor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{AuditingInterceptor, Clock};
    use crate::model::entity::{AuditFields, Auditing, Timestamp};

    struct FixedClock(Timestamp);

    impl Clock for FixedClock {
        fn now(&self) -> Timestamp {
            self.0
        }
    }

    #[test]
    fn insert_stamps_created_and_modified_identically() {
        let interceptor =
            AuditingInterceptor::with_clock(|| Some("alice".to_string()), FixedClock(100));
        let mut audit = AuditFields::default();
        interceptor.on_insert(&mut audit, Auditing::Full);

        assert_eq!(audit.created_at, Some(100));
        assert_eq!(audit.created_at, audit.last_modified_at);
        assert_eq!(audit.created_by.as_deref(), Some("alice"));
        assert_eq!(audit.created_by, audit.last_modified_by);
    }

    #[test]
    fn update_keeps_creation_and_moves_forward_on_a_frozen_clock() {
        let interceptor =
            AuditingInterceptor::with_clock(|| Some("bob".to_string()), FixedClock(100));
        let mut audit = AuditFields::default();
        interceptor.on_insert(&mut audit, Auditing::Full);
        interceptor.on_update(&mut audit, Auditing::Full);
        interceptor.on_update(&mut audit, Auditing::Full);

        assert_eq!(audit.created_at, Some(100));
        assert_eq!(audit.last_modified_at, Some(102));
    }

    #[test]
    fn timestamps_only_policy_skips_actor() {
        let interceptor =
            AuditingInterceptor::with_clock(|| Some("carol".to_string()), FixedClock(5));
        let mut audit = AuditFields::default();
        interceptor.on_insert(&mut audit, Auditing::TimestampsOnly);
        assert_eq!(audit.created_at, Some(5));
        assert_eq!(audit.created_by, None);
    }
}
