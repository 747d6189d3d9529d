//! Member entity: owning side of the member/team association.
//!
//! # Invariants
//! - `team` is the only persisted link to a team (`team_id` column).
//! - `age` is never negative.

use crate::model::entity::{
    AuditFields, Auditing, Entity, EntityId, EntitySchema, FieldDef, Managed, NamedQuery,
    RelationDef,
};
use crate::model::relation::{set_owning_relation, sync_inverse_collection, Reference};
use crate::model::team::Team;
use crate::model::value::Value;
use crate::repo::error::{RepoError, RepoResult};
use crate::session::{FetchContext, Session};
use crate::store::RowView;

static MEMBER_SCHEMA: EntitySchema = EntitySchema {
    name: "Member",
    table: "member",
    sequence: "member",
    id: FieldDef {
        name: "id",
        column: "member_id",
    },
    fields: &[
        FieldDef {
            name: "username",
            column: "username",
        },
        FieldDef {
            name: "age",
            column: "age",
        },
    ],
    relations: &[RelationDef {
        name: "team",
        column: "team_id",
        target: Team::schema,
    }],
    named_queries: &[NamedQuery {
        name: "Member.findByUsername",
        query: "select m from Member m where m.username = :username",
    }],
    auditing: Auditing::Full,
};

#[derive(Debug, Clone)]
pub struct Member {
    pub id: Option<EntityId>,
    pub username: String,
    pub age: i64,
    pub team: Option<Reference<Team>>,
    pub audit: AuditFields,
}

impl Member {
    pub fn new(username: impl Into<String>, age: i64) -> Self {
        Self {
            id: None,
            username: username.into(),
            age,
            team: None,
            audit: AuditFields::default(),
        }
    }

    /// Creates a member with a caller-chosen id (import paths).
    pub fn with_id(id: EntityId, username: impl Into<String>, age: i64) -> Self {
        Self {
            id: Some(id),
            ..Self::new(username, age)
        }
    }

    pub fn team_id(&self) -> Option<EntityId> {
        self.team.as_ref().and_then(Reference::id)
    }

    /// Moves `member` into `team`, updating the team's member collection in
    /// the same step.
    pub fn change_team(member: &Managed<Member>, team: &Managed<Team>) {
        set_owning_relation(member, Some(team), Self::team_mut, Team::members_mut);
    }

    pub fn leave_team(member: &Managed<Member>) {
        set_owning_relation(member, None, Self::team_mut, Team::members_mut);
    }

    /// Resolves the team lazily through `session`; a second call costs no
    /// round trip.
    pub fn load_team(
        member: &Managed<Member>,
        session: &mut Session<'_>,
    ) -> RepoResult<Option<Managed<Team>>> {
        let Some(mut reference) = member.borrow().team.clone() else {
            return Ok(None);
        };
        if let Some(team) = reference.target() {
            return Ok(Some(team));
        }
        let team = session.resolve(&mut reference)?;
        if let Some(team) = &team {
            let expected = reference.id();
            let mut state = member.borrow_mut();
            // Only cache when the member still points at the loaded row.
            if state.team_id() == expected {
                state.team = Some(reference);
                drop(state);
                sync_inverse_collection(member, None, Some(team), Team::members_mut);
            }
        }
        Ok(team)
    }

    fn team_mut(member: &mut Member) -> &mut Option<Reference<Team>> {
        &mut member.team
    }
}

impl Entity for Member {
    fn schema() -> &'static EntitySchema {
        &MEMBER_SCHEMA
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
        vec![
            Value::from(self.username.as_str()),
            Value::Integer(self.age),
            Value::from(self.team_id()),
        ]
    }

    fn from_row(row: RowView<'_>) -> RepoResult<Self> {
        Ok(Self {
            id: Some(row.int("member_id")?),
            username: row.text("username")?,
            age: row.int("age")?,
            team: row.opt_int("team_id")?.map(Reference::to_id),
            audit: AuditFields::from_row(row)?,
        })
    }

    fn validate(&self) -> RepoResult<()> {
        if self.age < 0 {
            return Err(RepoError::Validation(format!(
                "member age cannot be negative, got {}",
                self.age
            )));
        }
        if self.team.as_ref().is_some_and(Reference::is_transient) {
            return Err(RepoError::Validation(
                "member references a team that was never saved".to_string(),
            ));
        }
        Ok(())
    }

    fn attach_fetched(
        this: &Managed<Self>,
        relation: &str,
        fetched: &mut FetchContext<'_, '_>,
    ) -> RepoResult<()> {
        if relation != "team" {
            return Err(RepoError::Malformed(format!(
                "Member has no fetchable relation `{relation}`"
            )));
        }
        let Some(team) = fetched.materialize::<Team>(relation)? else {
            return Ok(());
        };
        // An in-memory reassignment that was not flushed yet wins over the row.
        let matches_row = this.borrow().team_id() == team.borrow().id;
        if matches_row {
            let mut member = this.borrow_mut();
            if let Some(reference) = member.team.as_mut() {
                if !reference.is_resolved() {
                    reference.resolve(team.clone());
                }
            }
            drop(member);
            sync_inverse_collection(this, None, Some(&team), Team::members_mut);
        }
        Ok(())
    }
}
