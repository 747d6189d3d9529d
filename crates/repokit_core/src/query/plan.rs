//! Immutable, pre-bound query plans and their SQL rendering.
//!
//! # Invariants
//! - Plans carry positional parameters only; list arguments are already
//!   expanded.
//! - Fetch joins contribute columns to the content statement and never to
//!   the count statement.
//! - The derived count statement keeps inner joins and left joins the
//!   predicate references; every other join is dropped.

use crate::model::entity::{EntitySchema, RelationDef};
use crate::model::value::Value;
use crate::query::{Direction, Modifying};
use crate::repo::error::{RepoError, RepoResult};
use crate::store::{LockMode, Statement, StatementHints};

/// Statement family a plan renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    Select,
    Update,
    Delete,
}

/// What a select plan returns per row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Root entity columns, plus fetched relation columns.
    Entity,
    /// Scalar expressions labeled for `Row::get`.
    Columns(Vec<ProjectedColumn>),
    /// A single count.
    Count(CountTarget),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedColumn {
    pub expr: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountTarget {
    Rows,
    Expr { expr: String, distinct: bool },
}

#[derive(Debug, Clone)]
pub struct Join {
    pub relation: &'static RelationDef,
    pub target: &'static EntitySchema,
    pub alias: String,
    pub left: bool,
    pub fetch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub expr: String,
    pub direction: Direction,
}

/// Metadata the session and the driver honor while running a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryHints {
    pub read_only: bool,
    pub lock: Option<LockMode>,
    pub modifying: Option<Modifying>,
}

impl QueryHints {
    pub(crate) fn statement_hints(&self) -> StatementHints {
        StatementHints {
            read_only: self.read_only,
            lock: self.lock,
        }
    }
}

/// Row window applied by pagination and single-result lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Window {
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub(crate) kind: PlanKind,
    pub(crate) root: &'static EntitySchema,
    pub(crate) alias: String,
    pub(crate) projection: Projection,
    pub(crate) distinct: bool,
    pub(crate) joins: Vec<Join>,
    /// `SET` clause of an update plan.
    pub(crate) assignments: Option<String>,
    pub(crate) assignment_params: Vec<Value>,
    pub(crate) predicate: Option<String>,
    pub(crate) params: Vec<Value>,
    /// Aliases the predicate mentions; decides which joins a count keeps.
    pub(crate) predicate_aliases: Vec<String>,
    pub(crate) order: Vec<OrderTerm>,
    pub(crate) limit: Option<usize>,
    pub(crate) hints: QueryHints,
    pub(crate) count: Option<Box<QueryPlan>>,
    /// Short description of the contract, used in log events.
    pub(crate) source: String,
}

impl QueryPlan {
    pub(crate) fn new(
        kind: PlanKind,
        root: &'static EntitySchema,
        alias: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            root,
            alias: alias.into(),
            projection: Projection::Entity,
            distinct: false,
            joins: Vec::new(),
            assignments: None,
            assignment_params: Vec::new(),
            predicate: None,
            params: Vec::new(),
            predicate_aliases: Vec::new(),
            order: Vec::new(),
            limit: None,
            hints: QueryHints::default(),
            count: None,
            source: source.into(),
        }
    }

    /// Every row of `root`, unordered.
    pub fn select_all(root: &'static EntitySchema) -> Self {
        Self::new(PlanKind::Select, root, "e", format!("{}.findAll", root.name))
    }

    pub fn kind(&self) -> PlanKind {
        self.kind
    }

    pub fn root(&self) -> &'static EntitySchema {
        self.root
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn order(&self) -> &[OrderTerm] {
        &self.order
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn hints(&self) -> QueryHints {
        self.hints
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn has_explicit_count(&self) -> bool {
        self.count.is_some()
    }

    /// Relations materialized from the content statement.
    pub fn fetched_relations(&self) -> Vec<&'static str> {
        self.joins
            .iter()
            .filter(|join| join.fetch)
            .map(|join| join.relation.name)
            .collect()
    }

    pub(crate) fn join_for(&self, relation: &str) -> Option<&Join> {
        self.joins.iter().find(|join| join.relation.name == relation)
    }

    pub(crate) fn is_known_alias(&self, alias: &str) -> bool {
        self.alias == alias || self.joins.iter().any(|join| join.alias == alias)
    }

    /// Adds a left join for `relation`, or returns the existing join's alias.
    pub(crate) fn ensure_join(&mut self, relation: &'static RelationDef, left: bool) -> String {
        if let Some(join) = self.joins.iter().find(|join| join.relation.name == relation.name) {
            return join.alias.clone();
        }
        let alias = format!("{}_{}", self.alias, relation.name);
        self.joins.push(Join {
            relation,
            target: (relation.target)(),
            alias: alias.clone(),
            left,
            fetch: false,
        });
        alias
    }

    /// Adds or upgrades a left fetch join for each relation name.
    pub(crate) fn apply_entity_graph(&mut self, relations: &[String]) -> RepoResult<()> {
        if relations.is_empty() {
            return Ok(());
        }
        if self.kind != PlanKind::Select || self.projection != Projection::Entity {
            return Err(RepoError::malformed(format!(
                "entity graph needs an entity select, got `{}`",
                self.source
            )));
        }
        for name in relations {
            let relation = self.root.relation(name).ok_or_else(|| {
                RepoError::malformed(format!(
                    "{} has no relation `{name}` for the entity graph",
                    self.root.name
                ))
            })?;
            self.ensure_join(relation, true);
            if let Some(join) = self
                .joins
                .iter_mut()
                .find(|join| join.relation.name == relation.name)
            {
                join.fetch = true;
            }
        }
        Ok(())
    }

    /// Resolves sort properties against the root entity.
    pub(crate) fn order_terms(
        &self,
        sort: &[(String, Direction)],
    ) -> RepoResult<Vec<OrderTerm>> {
        sort.iter()
            .map(|(property, direction)| {
                let column = self.root.column_of(property).ok_or_else(|| {
                    RepoError::malformed(format!(
                        "{} has no sortable property `{property}`",
                        self.root.name
                    ))
                })?;
                Ok(OrderTerm {
                    expr: format!("{}.{column}", self.alias),
                    direction: *direction,
                })
            })
            .collect()
    }

    /// Content statement with the plan's own ordering and limit.
    pub fn content_statement(&self) -> Statement {
        self.select_statement(&[], None)
    }

    pub(crate) fn select_statement(&self, extra_order: &[OrderTerm], window: Option<Window>) -> Statement {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&self.select_list().join(", "));
        sql.push_str(&self.from_clause(self.joins.iter()));
        let mut params = self.params.clone();
        self.push_where(&mut sql);

        let order: Vec<String> = self
            .order
            .iter()
            .chain(extra_order)
            .map(|term| format!("{} {}", term.expr, term.direction.as_sql()))
            .collect();
        if !order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        match (window, self.limit) {
            (Some(window), _) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                params.push(count_value(window.limit));
                params.push(count_value(window.offset));
            }
            (None, Some(limit)) => {
                sql.push_str(" LIMIT ?");
                params.push(count_value(limit));
            }
            (None, None) => {}
        }

        Statement::new(sql, params).with_hints(self.hints.statement_hints())
    }

    /// Total-count statement for a select plan: the explicit count plan when
    /// declared, otherwise the predicate re-projected onto one count.
    pub fn count_statement(&self) -> RepoResult<Statement> {
        if self.kind != PlanKind::Select {
            return Err(RepoError::malformed(format!(
                "`{}` is not a select and cannot be counted",
                self.source
            )));
        }
        if let Some(count) = &self.count {
            return Ok(count.content_statement());
        }
        if let Projection::Count(_) = self.projection {
            return Ok(self.content_statement());
        }

        let kept = self
            .joins
            .iter()
            .filter(|join| !join.left || self.predicate_aliases.contains(&join.alias));
        let from = self.from_clause(kept);
        let mut sql = match (&self.projection, self.distinct) {
            (Projection::Columns(columns), true) => {
                let exprs: Vec<&str> = columns.iter().map(|column| column.expr.as_str()).collect();
                format!("SELECT COUNT(*) FROM (SELECT DISTINCT {}{from}", exprs.join(", "))
            }
            (_, true) => format!(
                "SELECT COUNT(DISTINCT {}.{}){from}",
                self.alias, self.root.id.column
            ),
            (_, false) => format!("SELECT COUNT(*){from}"),
        };
        self.push_where(&mut sql);
        if matches!(self.projection, Projection::Columns(_)) && self.distinct {
            sql.push(')');
        }
        Ok(Statement::new(sql, self.params.clone()).with_hints(StatementHints {
            read_only: self.hints.read_only,
            lock: None,
        }))
    }

    /// Set-based statement of an update or delete plan.
    pub fn write_statement(&self) -> RepoResult<Statement> {
        let mut sql = match (self.kind, &self.assignments) {
            (PlanKind::Update, Some(assignments)) => {
                format!("UPDATE {} SET {assignments}", self.root.table)
            }
            (PlanKind::Delete, _) => format!("DELETE FROM {}", self.root.table),
            _ => {
                return Err(RepoError::malformed(format!(
                    "`{}` is not an update or delete statement",
                    self.source
                )))
            }
        };
        self.push_where(&mut sql);
        let mut params = self.assignment_params.clone();
        params.extend(self.params.iter().cloned());
        Ok(Statement::new(sql, params))
    }

    fn select_list(&self) -> Vec<String> {
        match &self.projection {
            Projection::Entity => {
                let mut columns: Vec<String> = self
                    .root
                    .all_columns()
                    .into_iter()
                    .map(|column| format!("{}.{column} AS \"{column}\"", self.alias))
                    .collect();
                for join in self.joins.iter().filter(|join| join.fetch) {
                    columns.extend(join.target.all_columns().into_iter().map(|column| {
                        format!(
                            "{}.{column} AS \"{}.{column}\"",
                            join.alias, join.relation.name
                        )
                    }));
                }
                columns
            }
            Projection::Columns(columns) => columns
                .iter()
                .map(|column| format!("{} AS \"{}\"", column.expr, column.label))
                .collect(),
            Projection::Count(CountTarget::Rows) => vec!["COUNT(*) AS \"count\"".to_string()],
            Projection::Count(CountTarget::Expr { expr, distinct }) => {
                let distinct = if *distinct { "DISTINCT " } else { "" };
                vec![format!("COUNT({distinct}{expr}) AS \"count\"")]
            }
        }
    }

    fn from_clause<'p>(&self, joins: impl Iterator<Item = &'p Join>) -> String {
        let mut sql = format!(" FROM {} {}", self.root.table, self.alias);
        for join in joins {
            let keyword = if join.left { "LEFT JOIN" } else { "JOIN" };
            sql.push_str(&format!(
                " {keyword} {} {} ON {}.{} = {}.{}",
                join.target.table,
                join.alias,
                join.alias,
                join.target.id.column,
                self.alias,
                join.relation.column
            ));
        }
        sql
    }

    fn push_where(&self, sql: &mut String) {
        if let Some(predicate) = &self.predicate {
            sql.push_str(" WHERE ");
            sql.push_str(predicate);
        }
    }
}

fn count_value(count: usize) -> Value {
    Value::Integer(i64::try_from(count).unwrap_or(i64::MAX))
}
