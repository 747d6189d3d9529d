mod common;

use common::{session, CountingStore};
use repokit_core::db::open_store;
use repokit_core::{
    Entity, Member, MemberRepository, RepoError, Repository, Sort, Team, TeamRepository,
};

#[test]
fn save_then_find_by_id_in_a_fresh_session() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();

    let id = {
        let mut session = session(&store);
        let member = members
            .save_and_flush(&mut session, Member::new("memberA", 10))
            .unwrap();
        let id = member.borrow().id().unwrap();
        id
    };

    let mut session = session(&store);
    let found = members.find_by_id(&mut session, id).unwrap().unwrap();
    assert_eq!(found.borrow().username, "memberA");
    assert_eq!(found.borrow().age, 10);
}

#[test]
fn basic_crud_counts_and_deletes() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    let mut session = session(&store);

    let member1 = members.save(&mut session, Member::new("member1", 10)).unwrap();
    let member2 = members.save(&mut session, Member::new("member2", 20)).unwrap();
    session.flush().unwrap();

    let id1 = member1.borrow().id().unwrap();
    let id2 = member2.borrow().id().unwrap();
    assert!(std::rc::Rc::ptr_eq(
        &members.get_by_id(&mut session, id1).unwrap(),
        &member1
    ));
    assert_eq!(members.find_all(&mut session).unwrap().len(), 2);
    assert_eq!(members.count(&mut session).unwrap(), 2);

    members.delete(&mut session, &member1).unwrap();
    assert!(members.delete_by_id(&mut session, id2).unwrap());
    assert!(!members.delete_by_id(&mut session, 999).unwrap());

    assert_eq!(members.count(&mut session).unwrap(), 0);
    assert!(!members.exists_by_id(&mut session, id1).unwrap());
}

#[test]
fn get_by_id_of_missing_row_is_not_found() {
    let store = CountingStore::in_memory();
    let mut session = session(&store);
    let err = TeamRepository::new().get_by_id(&mut session, 42).unwrap_err();
    assert!(matches!(
        err,
        RepoError::NotFound {
            entity: "Team",
            id: Some(42)
        }
    ));
}

#[test]
fn save_with_known_id_merges_onto_the_managed_instance() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();

    let id = {
        let mut session = session(&store);
        let member = members
            .save_and_flush(&mut session, Member::new("before", 10))
            .unwrap();
        let id = member.borrow().id().unwrap();
        id
    };

    let mut session = session(&store);
    let merged = members
        .save(&mut session, Member::with_id(id, "after", 30))
        .unwrap();
    let summary = session.flush().unwrap();
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.updated, 1);
    assert_eq!(merged.borrow().username, "after");
    assert_eq!(members.count(&mut session).unwrap(), 1);
}

#[test]
fn save_with_unknown_id_inserts() {
    let store = CountingStore::in_memory();
    let teams = TeamRepository::new();
    let mut session = session(&store);

    teams.save(&mut session, Team {
        id: Some(77),
        ..Team::new("imported")
    })
    .unwrap();
    assert_eq!(session.flush().unwrap().inserted, 1);
    assert!(teams.exists_by_id(&mut session, 77).unwrap());
}

#[test]
fn invalid_entity_is_rejected_before_any_write() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    {
        let mut session = session(&store);
        members.save(&mut session, Member::new("valid", 10)).unwrap();
        members.save(&mut session, Member::new("negative", -1)).unwrap();
        let err = session.flush().unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));
        assert!(session.is_dirty());
    }
    assert_eq!(store.executes(), 0);

    let mut session = session(&store);
    assert_eq!(members.count(&mut session).unwrap(), 0);
}

#[test]
fn find_all_sorted_orders_rows() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    let mut session = session(&store);
    for (username, age) in [("b", 20), ("c", 10), ("a", 30)] {
        members.save(&mut session, Member::new(username, age)).unwrap();
    }

    let by_name = Repository::<Member>::new()
        .find_all_sorted(&mut session, &Sort::asc("username"))
        .unwrap();
    let names: Vec<String> = by_name.iter().map(|m| m.borrow().username.clone()).collect();
    assert_eq!(names, ["a", "b", "c"]);

    let by_age = Repository::<Member>::new()
        .find_all_sorted(&mut session, &Sort::desc("age"))
        .unwrap();
    assert_eq!(by_age[0].borrow().age, 30);

    let err = Repository::<Member>::new()
        .find_all_sorted(&mut session, &Sort::asc("nickname"))
        .unwrap_err();
    assert!(matches!(err, RepoError::Malformed(_)));
}

#[test]
fn file_backed_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("repokit.db");
    let teams = TeamRepository::new();

    {
        let store = open_store(&path).unwrap();
        let mut session = session(&store);
        teams.save(&mut session, Team::new("persisted")).unwrap();
        session.flush().unwrap();
    }

    let store = open_store(&path).unwrap();
    let mut session = session(&store);
    let all = teams.find_all(&mut session).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].borrow().name, "persisted");

    // Sequences continue where the previous process stopped.
    let next = teams.save(&mut session, Team::new("second")).unwrap();
    assert_eq!(next.borrow().id(), Some(2));
}
