//! Typed repository for `Member`: the generic facade, declared query
//! methods, and a pluggable custom extension, all callable on one type.

use crate::model::entity::Managed;
use crate::model::member::Member;
use crate::model::team::Team;
use crate::model::value::Value;
use crate::query::{Args, Page, Pageable, QueryMethod, Slice};
use crate::repo::error::RepoResult;
use crate::repo::repository::Repository;
use crate::session::Session;
use crate::store::LockMode;
use serde::Serialize;
use std::ops::Deref;

const FIND_USER: &str = "select m from Member m where m.username = :username and m.age = :age";
const FIND_USERNAME_LIST: &str = "select m.username from Member m";
const FIND_MEMBER_DTO: &str = "select m.id, m.username, t.name from Member m join m.team t";
const FIND_BY_NAMES: &str = "select m from Member m where m.username in :names";
const FIND_BY_AGE: &str = "select m from Member m left join m.team t where m.age = :age";
const COUNT_BY_AGE: &str = "select count(m.username) from Member m where m.age = :age";
const BULK_AGE_PLUS: &str = "update Member m set m.age = m.age + 1 where m.age >= :age";
const FIND_MEMBER_FETCH_JOIN: &str = "select m from Member m left join fetch m.team";
const SELECT_ALL_MEMBERS: &str = "select m from Member m";

pub type TeamRepository = Repository<Team>;

/// Member row joined with its team name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberDto {
    pub id: i64,
    pub username: String,
    pub team_name: String,
}

/// Hand-written queries that sit next to the declared ones.
pub trait MemberRepositoryCustom {
    fn find_member_custom(&self, session: &mut Session<'_>) -> RepoResult<Vec<Managed<Member>>>;
}

/// Default custom extension: every member, through an explicit template.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemberRepositoryImpl;

impl MemberRepositoryCustom for MemberRepositoryImpl {
    fn find_member_custom(&self, session: &mut Session<'_>) -> RepoResult<Vec<Managed<Member>>> {
        Repository::<Member>::new().find_list(
            session,
            &QueryMethod::query(SELECT_ALL_MEMBERS),
            &Args::new(),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemberRepository<C = MemberRepositoryImpl> {
    base: Repository<Member>,
    custom: C,
}

impl MemberRepository<MemberRepositoryImpl> {
    pub fn new() -> Self {
        Self::with_custom(MemberRepositoryImpl)
    }
}

impl<C: MemberRepositoryCustom> MemberRepository<C> {
    pub fn with_custom(custom: C) -> Self {
        Self {
            base: Repository::new(),
            custom,
        }
    }

    pub fn find_by_username_and_age_greater_than(
        &self,
        session: &mut Session<'_>,
        username: &str,
        age: i64,
    ) -> RepoResult<Vec<Managed<Member>>> {
        self.base.find_list(
            session,
            &QueryMethod::derived("findByUsernameAndAgeGreaterThan"),
            &Args::new().with("username", username).with("age", age),
        )
    }

    pub fn find_top3_hello_by(&self, session: &mut Session<'_>) -> RepoResult<Vec<Managed<Member>>> {
        self.base
            .find_list(session, &QueryMethod::derived("findTop3HelloBy"), &Args::new())
    }

    /// Resolves to the registered `Member.findByUsername` query.
    pub fn find_by_username(
        &self,
        session: &mut Session<'_>,
        username: &str,
    ) -> RepoResult<Vec<Managed<Member>>> {
        self.base.find_list(
            session,
            &QueryMethod::derived("findByUsername"),
            &Args::new().with("username", username),
        )
    }

    pub fn find_user(
        &self,
        session: &mut Session<'_>,
        username: &str,
        age: i64,
    ) -> RepoResult<Vec<Managed<Member>>> {
        self.base.find_list(
            session,
            &QueryMethod::query(FIND_USER),
            &Args::new().with("username", username).with("age", age),
        )
    }

    pub fn find_username_list(&self, session: &mut Session<'_>) -> RepoResult<Vec<String>> {
        self.base
            .find_projected(session, &QueryMethod::query(FIND_USERNAME_LIST), &Args::new())?
            .iter()
            .map(|row| row.view().text("username"))
            .collect()
    }

    /// Members that belong to a team, with the team name.
    pub fn find_member_dto(&self, session: &mut Session<'_>) -> RepoResult<Vec<MemberDto>> {
        self.base
            .find_projected(session, &QueryMethod::query(FIND_MEMBER_DTO), &Args::new())?
            .iter()
            .map(|row| {
                let view = row.view();
                Ok(MemberDto {
                    id: view.int("id")?,
                    username: view.text("username")?,
                    team_name: view.text("name")?,
                })
            })
            .collect()
    }

    pub fn find_by_names(
        &self,
        session: &mut Session<'_>,
        names: &[&str],
    ) -> RepoResult<Vec<Managed<Member>>> {
        self.base.find_list(
            session,
            &QueryMethod::query(FIND_BY_NAMES),
            &Args::new().with("names", Value::from(names.to_vec())),
        )
    }

    pub fn find_list_by_username(
        &self,
        session: &mut Session<'_>,
        username: &str,
    ) -> RepoResult<Vec<Managed<Member>>> {
        self.base.find_list(
            session,
            &QueryMethod::derived("findListByUsername"),
            &Args::new().with("username", username),
        )
    }

    /// Exactly one member; none is `NotFound`, several `NotUnique`.
    pub fn find_member_by_username(
        &self,
        session: &mut Session<'_>,
        username: &str,
    ) -> RepoResult<Managed<Member>> {
        self.base.find_required(
            session,
            &QueryMethod::derived("findMemberByUsername"),
            &Args::new().with("username", username),
        )
    }

    pub fn find_optional_by_username(
        &self,
        session: &mut Session<'_>,
        username: &str,
    ) -> RepoResult<Option<Managed<Member>>> {
        self.base.find_one(
            session,
            &QueryMethod::derived("findOptionalByUsername"),
            &Args::new().with("username", username),
        )
    }

    /// Page of members of one age; the total comes from a join-free count.
    pub fn find_by_age(
        &self,
        session: &mut Session<'_>,
        age: i64,
        pageable: &Pageable,
    ) -> RepoResult<Page<Managed<Member>>> {
        self.base.find_page(
            session,
            &QueryMethod::query(FIND_BY_AGE).count_query(COUNT_BY_AGE),
            &Args::new().with("age", age),
            pageable,
        )
    }

    pub fn find_slice_by_age(
        &self,
        session: &mut Session<'_>,
        age: i64,
        pageable: &Pageable,
    ) -> RepoResult<Slice<Managed<Member>>> {
        self.base.find_slice(
            session,
            &QueryMethod::query(FIND_BY_AGE),
            &Args::new().with("age", age),
            pageable,
        )
    }

    /// Adds one to the age of every member at least `age` old and clears
    /// the session.
    pub fn bulk_age_plus(&self, session: &mut Session<'_>, age: i64) -> RepoResult<usize> {
        self.base.bulk_update(
            session,
            &QueryMethod::query(BULK_AGE_PLUS).modifying(true, false),
            &Args::new().with("age", age),
        )
    }

    pub fn find_member_fetch_join(
        &self,
        session: &mut Session<'_>,
    ) -> RepoResult<Vec<Managed<Member>>> {
        self.base
            .find_list(session, &QueryMethod::query(FIND_MEMBER_FETCH_JOIN), &Args::new())
    }

    /// Every member with its team fetched in the same round trip.
    pub fn find_all(&self, session: &mut Session<'_>) -> RepoResult<Vec<Managed<Member>>> {
        self.base.find_list(
            session,
            &QueryMethod::derived("findAll").entity_graph(&["team"]),
            &Args::new(),
        )
    }

    pub fn find_member_entity_graph(
        &self,
        session: &mut Session<'_>,
    ) -> RepoResult<Vec<Managed<Member>>> {
        self.base.find_list(
            session,
            &QueryMethod::query(SELECT_ALL_MEMBERS).entity_graph(&["team"]),
            &Args::new(),
        )
    }

    pub fn find_entity_graph_by_username(
        &self,
        session: &mut Session<'_>,
        username: &str,
    ) -> RepoResult<Vec<Managed<Member>>> {
        self.base.find_list(
            session,
            &QueryMethod::derived("findEntityGraphByUsername").entity_graph(&["team"]),
            &Args::new().with("username", username),
        )
    }

    /// Loaded without a snapshot: later changes are never flushed.
    pub fn find_read_only_by_username(
        &self,
        session: &mut Session<'_>,
        username: &str,
    ) -> RepoResult<Option<Managed<Member>>> {
        self.base.find_one(
            session,
            &QueryMethod::derived("findReadOnlyByUsername").read_only(),
            &Args::new().with("username", username),
        )
    }

    /// Needs an open transaction on the session.
    pub fn find_lock_by_username(
        &self,
        session: &mut Session<'_>,
        username: &str,
    ) -> RepoResult<Vec<Managed<Member>>> {
        self.base.find_list(
            session,
            &QueryMethod::derived("findLockByUsername").lock(LockMode::PessimisticWrite),
            &Args::new().with("username", username),
        )
    }
}

impl<C> Deref for MemberRepository<C> {
    type Target = Repository<Member>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl<C: MemberRepositoryCustom> MemberRepositoryCustom for MemberRepository<C> {
    fn find_member_custom(&self, session: &mut Session<'_>) -> RepoResult<Vec<Managed<Member>>> {
        self.custom.find_member_custom(session)
    }
}
