//! Runs resolved plans through a session.
//!
//! # Invariants
//! - Pending session changes are flushed first under `FlushMode::Auto`.
//! - Entity rows are materialized through the identity map; tracked
//!   instances are returned as they are, never overwritten by row data.

use crate::model::entity::{Entity, Managed};
use crate::query::plan::{OrderTerm, PlanKind, Projection, QueryPlan, Window};
use crate::repo::error::{RepoError, RepoResult};
use crate::session::Session;
use crate::store::Row;

pub(crate) fn ensure_entity_select<E: Entity>(plan: &QueryPlan) -> RepoResult<()> {
    if plan.kind() != PlanKind::Select || *plan.projection() != Projection::Entity {
        return Err(RepoError::malformed(format!(
            "`{}` does not select {} entities",
            plan.source(),
            E::schema().name
        )));
    }
    if plan.root().table != E::schema().table {
        return Err(RepoError::malformed(format!(
            "`{}` selects {}, not {}",
            plan.source(),
            plan.root().name,
            E::schema().name
        )));
    }
    Ok(())
}

/// Every entity the plan matches.
pub(crate) fn list<E: Entity>(
    session: &mut Session<'_>,
    plan: &QueryPlan,
) -> RepoResult<Vec<Managed<E>>> {
    list_window(session, plan, &[], None)
}

pub(crate) fn list_window<E: Entity>(
    session: &mut Session<'_>,
    plan: &QueryPlan,
    extra_order: &[OrderTerm],
    window: Option<Window>,
) -> RepoResult<Vec<Managed<E>>> {
    ensure_entity_select::<E>(plan)?;
    session.auto_flush()?;
    let statement = plan.select_statement(extra_order, window);
    let rows = session.driver().query(&statement)?;
    let fetched = plan.fetched_relations();
    session.hydrate::<E>(&rows, &fetched, plan.hints().read_only)
}

/// At most one entity; more than one match is `NotUnique`.
pub(crate) fn single<E: Entity>(
    session: &mut Session<'_>,
    plan: &QueryPlan,
) -> RepoResult<Option<Managed<E>>> {
    let limit = plan.limit().map_or(2, |limit| limit.min(2));
    let mut found = list_window::<E>(session, plan, &[], Some(Window { offset: 0, limit }))?;
    if found.len() > 1 {
        return Err(RepoError::NotUnique {
            entity: E::schema().name,
            count: found.len(),
        });
    }
    Ok(found.pop())
}

/// Raw rows of a column projection.
pub(crate) fn rows(session: &mut Session<'_>, plan: &QueryPlan) -> RepoResult<Vec<Row>> {
    if plan.kind() != PlanKind::Select {
        return Err(RepoError::malformed(format!(
            "`{}` is not a select",
            plan.source()
        )));
    }
    session.auto_flush()?;
    Ok(session.driver().query(&plan.content_statement())?)
}

/// Total number of matches (ignores fetch joins and limits).
pub(crate) fn count(session: &mut Session<'_>, plan: &QueryPlan) -> RepoResult<u64> {
    let statement = plan.count_statement()?;
    session.auto_flush()?;
    let rows = session.driver().query(&statement)?;
    let value = rows
        .first()
        .and_then(|row| row.values().first())
        .and_then(|value| value.as_i64())
        .ok_or_else(|| RepoError::InvalidData("count query returned no integer".to_string()))?;
    u64::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("count query returned {value}")))
}
