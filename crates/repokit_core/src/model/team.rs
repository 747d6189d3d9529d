//! Team entity: the inverse side of the member/team association.

use crate::model::entity::{
    AuditFields, Auditing, Entity, EntityId, EntitySchema, FieldDef, Managed,
};
use crate::model::member::Member;
use crate::model::relation::InverseCollection;
use crate::model::value::Value;
use crate::repo::error::{RepoError, RepoResult};
use crate::session::FetchContext;
use crate::store::RowView;

static TEAM_SCHEMA: EntitySchema = EntitySchema {
    name: "Team",
    table: "team",
    sequence: "team",
    id: FieldDef {
        name: "id",
        column: "team_id",
    },
    fields: &[FieldDef {
        name: "name",
        column: "name",
    }],
    relations: &[],
    named_queries: &[],
    auditing: Auditing::TimestampsOnly,
};

#[derive(Debug, Clone)]
pub struct Team {
    pub id: Option<EntityId>,
    pub name: String,
    /// Navigation only; maintained by `Member::change_team`.
    pub members: InverseCollection<Member>,
    pub audit: AuditFields,
}

impl Team {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            members: InverseCollection::new(),
            audit: AuditFields::default(),
        }
    }

    pub(crate) fn members_mut(team: &mut Team) -> &mut InverseCollection<Member> {
        &mut team.members
    }
}

impl Entity for Team {
    fn schema() -> &'static EntitySchema {
        &TEAM_SCHEMA
    }

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn assign_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    fn audit(&self) -> &AuditFields {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditFields {
        &mut self.audit
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::from(self.name.as_str())]
    }

    fn from_row(row: RowView<'_>) -> RepoResult<Self> {
        Ok(Self {
            id: Some(row.int("team_id")?),
            name: row.text("name")?,
            members: InverseCollection::new(),
            audit: AuditFields::from_row(row)?,
        })
    }

    fn validate(&self) -> RepoResult<()> {
        if self.name.trim().is_empty() {
            return Err(RepoError::Validation("team name cannot be blank".to_string()));
        }
        Ok(())
    }

    fn attach_fetched(
        _this: &Managed<Self>,
        relation: &str,
        _fetched: &mut FetchContext<'_, '_>,
    ) -> RepoResult<()> {
        Err(RepoError::Malformed(format!(
            "Team has no fetchable relation `{relation}`"
        )))
    }
}
