//! Query resolver: repository method contracts to bound query plans.
//!
//! # Responsibility
//! - Describe repository methods declaratively (`QueryMethod`).
//! - Compile derived names, explicit templates and named queries into
//!   `QueryPlan`s before any store round trip.
//! - Run plans through a session and page their results.
//!
//! # Invariants
//! - Resolution never touches the store; a malformed contract fails with
//!   `RepoError::Malformed` before the first driver call.
//! - A derived contract whose `<Entity>.<method>` name is registered as a
//!   named query resolves to that query instead.

mod derived;
pub(crate) mod exec;
pub mod page;
mod plan;
mod template;

pub use page::{Page, Pageable, Slice};
pub use plan::{
    CountTarget, Join, OrderTerm, PlanKind, ProjectedColumn, Projection, QueryHints, QueryPlan,
};

use crate::model::entity::EntitySchema;
use crate::model::value::Value;
use crate::repo::error::{RepoError, RepoResult};
use crate::store::LockMode;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Ordered list of `(property, direction)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    orders: Vec<(String, Direction)>,
}

impl Sort {
    pub fn unsorted() -> Self {
        Self::default()
    }

    pub fn by(property: impl Into<String>, direction: Direction) -> Self {
        Self::unsorted().and(property, direction)
    }

    pub fn asc(property: impl Into<String>) -> Self {
        Self::by(property, Direction::Asc)
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self::by(property, Direction::Desc)
    }

    pub fn and(mut self, property: impl Into<String>, direction: Direction) -> Self {
        self.orders.push((property.into(), direction));
        self
    }

    pub fn orders(&self) -> &[(String, Direction)] {
        &self.orders
    }

    pub fn is_unsorted(&self) -> bool {
        self.orders.is_empty()
    }
}

/// Flags of a set-based update or delete contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifying {
    /// Detach every tracked entity after the statement ran.
    pub clear_automatically: bool,
    /// Flush pending changes first, whatever the session's flush mode.
    pub flush_automatically: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MethodKind {
    Derived(String),
    Template(String),
    Named(String),
}

/// Declarative description of one repository method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMethod {
    kind: MethodKind,
    count_query: Option<String>,
    entity_graph: Vec<String>,
    read_only: bool,
    lock: Option<LockMode>,
    modifying: Option<Modifying>,
}

impl QueryMethod {
    fn with_kind(kind: MethodKind) -> Self {
        Self {
            kind,
            count_query: None,
            entity_graph: Vec::new(),
            read_only: false,
            lock: None,
            modifying: None,
        }
    }

    /// Query derived from a method name (`findByUsernameAndAgeGreaterThan`).
    pub fn derived(name: impl Into<String>) -> Self {
        Self::with_kind(MethodKind::Derived(name.into()))
    }

    /// Explicit query template with `:name` placeholders.
    pub fn query(template: impl Into<String>) -> Self {
        Self::with_kind(MethodKind::Template(template.into()))
    }

    /// Query registered on the entity schema (`Member.findByUsername`).
    pub fn named(name: impl Into<String>) -> Self {
        Self::with_kind(MethodKind::Named(name.into()))
    }

    /// Explicit total-count template used by page queries.
    pub fn count_query(mut self, template: impl Into<String>) -> Self {
        self.count_query = Some(template.into());
        self
    }

    /// Relations to fetch in the same round trip.
    pub fn entity_graph(mut self, relations: &[&str]) -> Self {
        self.entity_graph = relations.iter().map(|name| (*name).to_string()).collect();
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn lock(mut self, mode: LockMode) -> Self {
        self.lock = Some(mode);
        self
    }

    pub fn modifying(mut self, clear_automatically: bool, flush_automatically: bool) -> Self {
        self.modifying = Some(Modifying {
            clear_automatically,
            flush_automatically,
        });
        self
    }

    /// Short label for log events and error messages.
    pub fn describe(&self) -> &str {
        match &self.kind {
            MethodKind::Derived(name) | MethodKind::Named(name) => name,
            MethodKind::Template(_) => "template",
        }
    }

    fn kind_label(&self) -> &'static str {
        match self.kind {
            MethodKind::Derived(_) => "derived",
            MethodKind::Template(_) => "template",
            MethodKind::Named(_) => "named",
        }
    }
}

/// Runtime arguments of one call. Derived contracts bind them in order;
/// templates bind them by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    entries: Vec<(String, Value)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push((name.into(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Values in declaration order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compiles `method` against `schema` into a bound plan.
///
/// # Side effects
/// - Emits `query_resolve` debug events; failures log at `warn`.
pub fn resolve(
    schema: &'static EntitySchema,
    method: &QueryMethod,
    args: &Args,
) -> RepoResult<QueryPlan> {
    let started_at = Instant::now();
    let result = compile(schema, method, args);
    match &result {
        Ok(plan) => debug!(
            "event=query_resolve module=query status=ok entity={} kind={} method={} params={} duration_us={}",
            schema.name,
            method.kind_label(),
            plan.source(),
            plan.params().len(),
            started_at.elapsed().as_micros()
        ),
        Err(err) => warn!(
            "event=query_resolve module=query status=error entity={} kind={} error_code={} error={}",
            schema.name,
            method.kind_label(),
            err.code(),
            err
        ),
    }
    result
}

fn compile(
    schema: &'static EntitySchema,
    method: &QueryMethod,
    args: &Args,
) -> RepoResult<QueryPlan> {
    let mut plan = match &method.kind {
        MethodKind::Derived(name) => {
            let registered = format!("{}.{name}", schema.name);
            match schema.named_query(&registered) {
                Some(query) => template::compile(schema, query, args, &registered)?,
                None => derived::compile(schema, name, args)?,
            }
        }
        MethodKind::Template(query) => template::compile(schema, query, args, "template")?,
        MethodKind::Named(name) => {
            let query = schema.named_query(name).ok_or_else(|| {
                RepoError::malformed(format!("{} has no named query `{name}`", schema.name))
            })?;
            template::compile(schema, query, args, name)?
        }
    };

    if let Some(count_query) = &method.count_query {
        let count = template::compile(schema, count_query, args, "count query")?;
        if count.kind() != PlanKind::Select {
            return Err(RepoError::malformed("count query must be a select"));
        }
        plan.count = Some(Box::new(count));
    }

    if method.modifying.is_some() && plan.kind() == PlanKind::Select {
        return Err(RepoError::malformed(format!(
            "`{}` is marked modifying but is a select",
            method.describe()
        )));
    }
    if method.modifying.is_none() && plan.kind() != PlanKind::Select {
        return Err(RepoError::malformed(format!(
            "`{}` writes rows and must be marked modifying",
            method.describe()
        )));
    }

    plan.apply_entity_graph(&method.entity_graph)?;
    plan.hints = QueryHints {
        read_only: method.read_only,
        lock: method.lock,
        modifying: method.modifying,
    };
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::{resolve, Args, QueryMethod};
    use crate::model::entity::Entity;
    use crate::model::member::Member;
    use crate::repo::error::RepoError;

    #[test]
    fn derived_name_prefers_registered_named_query() {
        let plan = resolve(
            Member::schema(),
            &QueryMethod::derived("findByUsername"),
            &Args::new().with("username", "AAA"),
        )
        .unwrap();
        assert_eq!(plan.source(), "Member.findByUsername");
        assert_eq!(plan.alias(), "m");
    }

    #[test]
    fn unknown_named_query_is_malformed() {
        let err = resolve(Member::schema(), &QueryMethod::named("Member.nope"), &Args::new())
            .unwrap_err();
        assert!(matches!(err, RepoError::Malformed(_)));
    }

    #[test]
    fn update_template_requires_modifying() {
        let method = QueryMethod::query("update Member m set m.age = m.age + 1 where m.age >= :age");
        let args = Args::new().with("age", 20);
        assert!(resolve(Member::schema(), &method, &args).is_err());
        assert!(resolve(Member::schema(), &method.modifying(true, false), &args).is_ok());
    }
}
