mod common;

use common::{commit_mode_session, session, CountingStore};
use repokit_core::model::relation::Reference;
use repokit_core::{Entity, Member, MemberRepository, RepoError, Team, TeamRepository};
use std::rc::Rc;

#[test]
fn one_instance_per_identity_across_lookups_and_queries() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    {
        let mut session = session(&store);
        members.save(&mut session, Member::new("AAA", 10)).unwrap();
        session.flush().unwrap();
    }

    let mut session = session(&store);
    let by_query = members.find_member_by_username(&mut session, "AAA").unwrap();
    let id = by_query.borrow().id().unwrap();
    let by_id = members.find_by_id(&mut session, id).unwrap().unwrap();
    let by_list = members.find_by_username(&mut session, "AAA").unwrap();

    assert!(Rc::ptr_eq(&by_query, &by_id));
    assert!(Rc::ptr_eq(&by_query, &by_list[0]));
    assert_eq!(session.stats().tracked, 1);
}

#[test]
fn query_results_never_overwrite_pending_changes() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    let mut session = commit_mode_session(&store);
    let member = members.save(&mut session, Member::new("AAA", 10)).unwrap();
    session.flush().unwrap();

    member.borrow_mut().age = 99;
    let found = members.find_by_username(&mut session, "AAA").unwrap();
    assert!(Rc::ptr_eq(&found[0], &member));
    assert_eq!(found[0].borrow().age, 99);
    assert!(session.is_dirty());
}

#[test]
fn auto_mode_flushes_before_queries() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    let mut session = session(&store);
    members.save(&mut session, Member::new("AAA", 10)).unwrap();

    let found = members.find_by_username(&mut session, "AAA").unwrap();
    assert_eq!(found.len(), 1);
    assert!(!session.is_dirty());
}

#[test]
fn commit_mode_defers_writes_until_flush() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    let mut session = commit_mode_session(&store);
    members.save(&mut session, Member::new("AAA", 10)).unwrap();

    assert!(members.find_by_username(&mut session, "AAA").unwrap().is_empty());
    assert_eq!(store.executes(), 0);

    session.flush().unwrap();
    assert_eq!(members.find_by_username(&mut session, "AAA").unwrap().len(), 1);
}

#[test]
fn flush_writes_inserts_then_updates_then_deletes() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    let mut session = commit_mode_session(&store);
    let kept = members.save(&mut session, Member::new("kept", 10)).unwrap();
    let doomed = members.save(&mut session, Member::new("doomed", 20)).unwrap();
    session.flush().unwrap();
    store.reset();

    members.delete(&mut session, &doomed).unwrap();
    kept.borrow_mut().age = 11;
    members.save(&mut session, Member::new("fresh", 30)).unwrap();
    let summary = session.flush().unwrap();

    assert_eq!((summary.inserted, summary.updated, summary.deleted), (1, 1, 1));
    let statements = store.statements();
    assert!(statements[0].starts_with("INSERT INTO member"));
    assert!(statements[1].starts_with("UPDATE member SET age = ?"));
    assert!(statements[2].starts_with("DELETE FROM member"));
}

#[test]
fn failed_flush_leaves_store_and_session_untouched() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    {
        let mut session = commit_mode_session(&store);
        members.save(&mut session, Member::new("valid", 10)).unwrap();
        members
            .save(&mut session, Member {
                team: Some(Reference::to_id(999)),
                ..Member::new("dangling", 20)
            })
            .unwrap();

        let err = session.flush().unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));
        assert!(session.is_dirty());
        assert_eq!(session.stats().new, 2);
    }

    let mut session = session(&store);
    assert_eq!(members.count(&mut session).unwrap(), 0);
}

#[test]
fn failed_commit_can_be_retried_after_fixing_state() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    {
        let mut session = commit_mode_session(&store);
        session.begin().unwrap();
        members.save(&mut session, Member::new("valid", 10)).unwrap();
        let dangling = members
            .save(&mut session, Member {
                team: Some(Reference::to_id(999)),
                ..Member::new("dangling", 20)
            })
            .unwrap();

        let err = session.commit().unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));
        assert!(session.in_transaction());
        assert_eq!(session.stats().new, 2);

        Member::leave_team(&dangling);
        session.commit().unwrap();
        assert!(!session.in_transaction());
        assert!(!session.is_dirty());
    }

    let mut session = session(&store);
    assert_eq!(members.count(&mut session).unwrap(), 2);
}

#[test]
fn failed_flush_inside_transaction_keeps_earlier_flushes() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    let teams = TeamRepository::new();
    {
        let mut session = commit_mode_session(&store);
        session.begin().unwrap();
        teams.save(&mut session, Team::new("kept")).unwrap();
        session.flush().unwrap();

        let dangling = members
            .save(&mut session, Member {
                team: Some(Reference::to_id(999)),
                ..Member::new("dangling", 20)
            })
            .unwrap();
        assert!(session.flush().is_err());

        session.remove(&dangling).unwrap();
        session.commit().unwrap();
    }

    let mut session = session(&store);
    assert_eq!(teams.count(&mut session).unwrap(), 1);
    assert_eq!(members.count(&mut session).unwrap(), 0);
}

#[test]
fn sessions_sharing_a_driver_take_turns_on_writes() {
    let store = CountingStore::in_memory();
    let teams = TeamRepository::new();
    let mut owner = session(&store);
    let mut other = commit_mode_session(&store);

    owner.begin().unwrap();
    assert!(matches!(other.begin(), Err(RepoError::StoreUnavailable(_))));
    assert!(matches!(
        teams.save(&mut other, Team::new("needs_an_id")),
        Err(RepoError::StoreUnavailable(_))
    ));

    teams
        .save(&mut other, Team {
            id: Some(50),
            ..Team::new("waiting")
        })
        .unwrap();
    let err = other.flush().unwrap_err();
    assert!(matches!(err, RepoError::StoreUnavailable(_)));
    assert!(other.is_dirty());

    owner.commit().unwrap();
    assert_eq!(other.flush().unwrap().inserted, 1);
    assert_eq!(teams.count(&mut owner).unwrap(), 1);
}

#[test]
fn rollback_discards_flushed_writes_and_detaches() {
    let store = CountingStore::in_memory();
    let teams = TeamRepository::new();
    let mut session = session(&store);

    session.begin().unwrap();
    let team = teams.save(&mut session, Team::new("temp")).unwrap();
    session.flush().unwrap();
    session.rollback().unwrap();

    assert!(!session.contains(&team));
    assert_eq!(teams.count(&mut session).unwrap(), 0);
}

#[test]
fn commit_flushes_pending_changes() {
    let store = CountingStore::in_memory();
    let teams = TeamRepository::new();
    {
        let mut session = commit_mode_session(&store);
        session.begin().unwrap();
        teams.save(&mut session, Team::new("kept")).unwrap();
        session.commit().unwrap();
        assert!(!session.in_transaction());
    }
    let mut session = session(&store);
    assert_eq!(teams.count(&mut session).unwrap(), 1);
}

#[test]
fn dropping_a_session_with_open_transaction_rolls_back() {
    let store = CountingStore::in_memory();
    let teams = TeamRepository::new();
    {
        let mut session = session(&store);
        session.begin().unwrap();
        teams.save_and_flush(&mut session, Team::new("lost")).unwrap();
    }
    let mut session = session(&store);
    assert_eq!(teams.count(&mut session).unwrap(), 0);
}

#[test]
fn update_of_vanished_row_is_not_found() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    let mut first = session(&store);
    let member = members
        .save_and_flush(&mut first, Member::new("AAA", 10))
        .unwrap();
    let id = member.borrow().id().unwrap();

    {
        let mut second = session(&store);
        assert!(members.delete_by_id(&mut second, id).unwrap());
        second.flush().unwrap();
    }

    member.borrow_mut().age = 11;
    let err = first.flush().unwrap_err();
    assert!(matches!(err, RepoError::NotFound { id: Some(found), .. } if found == id));
}

#[test]
fn read_only_results_are_never_flushed() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    {
        let mut session = session(&store);
        members
            .save_and_flush(&mut session, Member::new("member1", 10))
            .unwrap();
    }

    let mut session = session(&store);
    let member = members
        .find_read_only_by_username(&mut session, "member1")
        .unwrap()
        .unwrap();
    assert_eq!(session.stats().read_only, 1);

    member.borrow_mut().username = "member2".to_string();
    assert!(!session.is_dirty());
    assert!(session.flush().unwrap().is_empty());

    let mut fresh = common::session(&store);
    assert!(members.find_optional_by_username(&mut fresh, "member2").unwrap().is_none());
}

#[test]
fn detached_instances_are_ignored_by_flush() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    let mut session = session(&store);
    let member = members
        .save_and_flush(&mut session, Member::new("AAA", 10))
        .unwrap();

    assert!(session.detach(&member));
    member.borrow_mut().age = 50;
    assert!(session.flush().unwrap().is_empty());

    let reloaded = members.find_member_by_username(&mut session, "AAA").unwrap();
    assert!(!Rc::ptr_eq(&reloaded, &member));
    assert_eq!(reloaded.borrow().age, 10);
    assert!(matches!(
        members.delete(&mut session, &member),
        Err(RepoError::Validation(_))
    ));
}

#[test]
fn pessimistic_lock_needs_a_transaction() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    let mut session = session(&store);
    members
        .save_and_flush(&mut session, Member::new("member1", 10))
        .unwrap();

    assert!(members.find_lock_by_username(&mut session, "member1").is_err());

    session.begin().unwrap();
    let locked = members.find_lock_by_username(&mut session, "member1").unwrap();
    assert_eq!(locked.len(), 1);
    session.commit().unwrap();
}
