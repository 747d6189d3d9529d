//! Set-based update/delete statements that bypass the session.
//!
//! # Invariants
//! - One statement per call; no per-row load, dirty-check or audit stamp.
//! - Tracked entities may hold stale values afterwards; callers that read
//!   the affected rows again must `clear()` the session first.
//! - Refused with `StoreUnavailable` while another session's transaction
//!   holds the driver.

use crate::query::{PlanKind, QueryPlan};
use crate::repo::error::{RepoError, RepoResult};
use crate::session::Session;
use log::{error, info};
use std::time::Instant;

/// Executes an update or delete plan and returns the affected row count.
///
/// Pending session changes are flushed first when the session auto-flushes
/// or the plan asks for `flush_automatically`.
pub fn execute(session: &mut Session<'_>, plan: &QueryPlan) -> RepoResult<usize> {
    if plan.kind() == PlanKind::Select {
        return Err(RepoError::malformed(format!(
            "`{}` is a select, not a bulk statement",
            plan.source()
        )));
    }
    let statement = plan.write_statement()?;
    let started_at = Instant::now();
    session.ensure_write_access()?;

    if plan
        .hints()
        .modifying
        .is_some_and(|modifying| modifying.flush_automatically)
    {
        session.flush()?;
    } else {
        session.auto_flush()?;
    }

    match session.driver().execute(&statement) {
        Ok(affected) => {
            info!(
                "event=bulk_update module=repo status=ok entity={} method={} affected={} duration_ms={}",
                plan.root().name,
                plan.source(),
                affected,
                started_at.elapsed().as_millis()
            );
            Ok(affected)
        }
        Err(err) => {
            let err = RepoError::from(err);
            error!(
                "event=bulk_update module=repo status=error entity={} method={} error_code={} error={}",
                plan.root().name,
                plan.source(),
                err.code(),
                err
            );
            Err(err)
        }
    }
}
