mod common;

use common::{CountingStore, FixedClock, StepClock};
use repokit_core::{
    AuditingInterceptor, Entity, Member, MemberRepository, Session, Team, TeamRepository,
};

fn session_at<'d>(store: &'d CountingStore, clock: StepClock) -> Session<'d> {
    Session::new(
        store,
        AuditingInterceptor::with_clock(|| Some("admin".to_string()), clock),
    )
}

#[test]
fn insert_stamps_created_and_modified_alike() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    let mut session = session_at(&store, StepClock::new(1_000, 10));

    let member = members
        .save_and_flush(&mut session, Member::new("member1", 10))
        .unwrap();
    let audit = member.borrow().audit.clone();
    assert_eq!(audit.created_at, Some(1_000));
    assert_eq!(audit.created_by.as_deref(), Some("admin"));
    assert_eq!(audit.created_at, audit.last_modified_at);
    assert_eq!(audit.created_by, audit.last_modified_by);
}

#[test]
fn update_stamps_only_modification_fields() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    let id = {
        let mut session = session_at(&store, StepClock::new(1_000, 10));
        let member = members
            .save_and_flush(&mut session, Member::new("member1", 10))
            .unwrap();
        member.borrow_mut().username = "member2".to_string();
        session.flush().unwrap();
        let id = member.borrow().id().unwrap();
        id
    };

    let mut session = common::session(&store);
    let stored = members.get_by_id(&mut session, id).unwrap();
    let stored = stored.borrow();
    assert_eq!(stored.username, "member2");
    assert_eq!(stored.audit.created_at, Some(1_000));
    assert_eq!(stored.audit.last_modified_at, Some(1_010));
    assert_eq!(stored.audit.created_by.as_deref(), Some("admin"));
    assert_eq!(stored.audit.last_modified_by.as_deref(), Some("admin"));
}

#[test]
fn stamps_increase_even_when_the_clock_stalls() {
    let store = CountingStore::in_memory();
    let teams = TeamRepository::new();
    let mut session = Session::new(
        &store,
        AuditingInterceptor::with_clock(|| Some("admin".to_string()), FixedClock(5_000)),
    );

    let team = teams.save_and_flush(&mut session, Team::new("teamA")).unwrap();
    team.borrow_mut().name = "teamB".to_string();
    session.flush().unwrap();
    let first = team.borrow().audit.last_modified_at.unwrap();
    team.borrow_mut().name = "teamC".to_string();
    session.flush().unwrap();
    let second = team.borrow().audit.last_modified_at.unwrap();

    assert!(first > 5_000);
    assert!(second > first);
    assert_eq!(team.borrow().audit.created_at, Some(5_000));
}

#[test]
fn timestamps_only_entities_carry_no_actor() {
    let store = CountingStore::in_memory();
    let teams = TeamRepository::new();
    let mut session = session_at(&store, StepClock::new(1, 1));

    let team = teams.save_and_flush(&mut session, Team::new("teamA")).unwrap();
    let audit = team.borrow().audit.clone();
    assert!(audit.created_at.is_some());
    assert_eq!(audit.created_by, None);
    assert_eq!(audit.last_modified_by, None);
}

#[test]
fn merge_keeps_audit_under_interceptor_control() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    let mut session = session_at(&store, StepClock::new(1_000, 10));
    let member = members
        .save_and_flush(&mut session, Member::new("member1", 10))
        .unwrap();
    let id = member.borrow().id().unwrap();

    let mut detached = Member::with_id(id, "member1", 11);
    detached.audit.created_by = Some("forged".to_string());
    members.save_and_flush(&mut session, detached).unwrap();

    let audit = member.borrow().audit.clone();
    assert_eq!(audit.created_by.as_deref(), Some("admin"));
    assert_eq!(audit.created_at, Some(1_000));
    assert!(audit.last_modified_at > audit.created_at);
}

#[test]
fn unchanged_entities_are_not_restamped() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    let mut session = session_at(&store, StepClock::new(1_000, 10));
    let member = members
        .save_and_flush(&mut session, Member::new("member1", 10))
        .unwrap();

    session.flush().unwrap();
    assert_eq!(member.borrow().audit.last_modified_at, Some(1_000));
}
