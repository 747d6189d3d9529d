//! Entity contract and static mapping metadata.
//!
//! # Responsibility
//! - Describe how an entity type maps onto a table (`EntitySchema`).
//! - Define the `Entity` trait the session, resolver and facade work with.
//!
//! # Invariants
//! - `Entity::values()` yields one value per `EntitySchema::value_columns()`
//!   entry, in the same order.
//! - An assigned id never changes; `created_*` audit fields are write-once.

use crate::model::value::Value;
use crate::repo::error::RepoResult;
use crate::session::FetchContext;
use crate::store::RowView;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

/// Primary key of every entity.
pub type EntityId = i64;

/// Epoch milliseconds, the unit of every audit instant.
pub type Timestamp = i64;

/// Session-managed entity instance. The identity map hands out clones of
/// the same `Rc`, so two handles are the same instance iff `Rc::ptr_eq`.
pub type Managed<E> = Rc<RefCell<E>>;

pub const AUDIT_COLUMNS: [&str; 4] = [
    "created_by",
    "created_at",
    "last_modified_by",
    "last_modified_at",
];

/// Which audit fields the interceptor maintains for an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auditing {
    /// Instants and actors.
    Full,
    /// Instants only; `created_by`/`last_modified_by` stay `None`.
    TimestampsOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Property name used by query contracts (`username`).
    pub name: &'static str,
    pub column: &'static str,
}

/// Owning side of a to-one association; the column holds the foreign key.
#[derive(Debug, Clone, Copy)]
pub struct RelationDef {
    pub name: &'static str,
    pub column: &'static str,
    pub target: fn() -> &'static EntitySchema,
}

/// Query text registered under a stable name (`Member.findByUsername`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedQuery {
    pub name: &'static str,
    pub query: &'static str,
}

#[derive(Debug)]
pub struct EntitySchema {
    /// Entity name used in query templates (`Member`).
    pub name: &'static str,
    pub table: &'static str,
    /// Store sequence that hands out ids for new instances.
    pub sequence: &'static str,
    pub id: FieldDef,
    pub fields: &'static [FieldDef],
    pub relations: &'static [RelationDef],
    pub named_queries: &'static [NamedQuery],
    pub auditing: Auditing,
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&'static RelationDef> {
        self.relations.iter().find(|relation| relation.name == name)
    }

    /// Resolves a property name (id, field, audit field or owning relation)
    /// to its column.
    pub fn column_of(&self, property: &str) -> Option<&'static str> {
        if property == self.id.name {
            return Some(self.id.column);
        }
        if let Some(field) = self.field(property) {
            return Some(field.column);
        }
        if let Some(relation) = self.relation(property) {
            return Some(relation.column);
        }
        audit_column(property)
    }

    /// Persisted non-key columns in `Entity::values()` order.
    pub fn value_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields
            .iter()
            .map(|field| field.column)
            .chain(self.relations.iter().map(|relation| relation.column))
    }

    /// Every selected column: id, value columns, audit columns.
    pub fn all_columns(&self) -> Vec<&'static str> {
        std::iter::once(self.id.column)
            .chain(self.value_columns())
            .chain(AUDIT_COLUMNS)
            .collect()
    }

    pub fn named_query(&self, name: &str) -> Option<&'static str> {
        self.named_queries
            .iter()
            .find(|query| query.name == name)
            .map(|query| query.query)
    }
}

fn audit_column(property: &str) -> Option<&'static str> {
    match property {
        "createdBy" => Some(AUDIT_COLUMNS[0]),
        "createdAt" => Some(AUDIT_COLUMNS[1]),
        "lastModifiedBy" => Some(AUDIT_COLUMNS[2]),
        "lastModifiedAt" => Some(AUDIT_COLUMNS[3]),
        _ => None,
    }
}

/// Creation/modification metadata stamped by the auditing interceptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFields {
    pub created_by: Option<String>,
    pub created_at: Option<Timestamp>,
    pub last_modified_by: Option<String>,
    pub last_modified_at: Option<Timestamp>,
}

impl AuditFields {
    pub fn from_row(row: RowView<'_>) -> RepoResult<Self> {
        Ok(Self {
            created_by: row.opt_text(AUDIT_COLUMNS[0])?,
            created_at: row.opt_int(AUDIT_COLUMNS[1])?,
            last_modified_by: row.opt_text(AUDIT_COLUMNS[2])?,
            last_modified_at: row.opt_int(AUDIT_COLUMNS[3])?,
        })
    }

    /// Values in `AUDIT_COLUMNS` order.
    pub fn values(&self) -> [Value; 4] {
        [
            Value::from(self.created_by.clone()),
            Value::from(self.created_at),
            Value::from(self.last_modified_by.clone()),
            Value::from(self.last_modified_at),
        ]
    }
}

/// A mutable record the session can track.
pub trait Entity: Clone + Debug + 'static {
    fn schema() -> &'static EntitySchema;

    fn id(&self) -> Option<EntityId>;

    /// Called once, when the session assigns a store-generated id.
    fn assign_id(&mut self, id: EntityId);

    fn audit(&self) -> &AuditFields;

    fn audit_mut(&mut self) -> &mut AuditFields;

    /// Current values of `schema().value_columns()`.
    fn values(&self) -> Vec<Value>;

    /// Decodes id, value columns and audit columns.
    fn from_row(row: RowView<'_>) -> RepoResult<Self>;

    /// Checked before every insert/update statement.
    fn validate(&self) -> RepoResult<()> {
        Ok(())
    }

    /// Populates `relation` from columns fetched in the same round trip.
    fn attach_fetched(
        this: &Managed<Self>,
        relation: &str,
        fetched: &mut FetchContext<'_, '_>,
    ) -> RepoResult<()>;
}

#[cfg(test)]
mod tests {
    use crate::model::member::Member;
    use crate::model::team::Team;
    use crate::model::entity::Entity;

    #[test]
    fn column_of_resolves_ids_fields_relations_and_audit() {
        let schema = Member::schema();
        assert_eq!(schema.column_of("id"), Some("member_id"));
        assert_eq!(schema.column_of("username"), Some("username"));
        assert_eq!(schema.column_of("team"), Some("team_id"));
        assert_eq!(schema.column_of("createdAt"), Some("created_at"));
        assert_eq!(schema.column_of("nickname"), None);
    }

    #[test]
    fn all_columns_lists_key_values_then_audit() {
        assert_eq!(
            Team::schema().all_columns(),
            vec![
                "team_id",
                "name",
                "created_by",
                "created_at",
                "last_modified_by",
                "last_modified_at"
            ]
        );
    }
}
