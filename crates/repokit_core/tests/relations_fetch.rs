mod common;

use common::{session, CountingStore};
use repokit_core::{Member, MemberRepository, Session, Team, TeamRepository};
use std::rc::Rc;

/// memberA and memberB in teamA, memberC in teamB, loner without a team.
fn seed(session: &mut Session<'_>) {
    let members = MemberRepository::new();
    let teams = TeamRepository::new();
    let team_a = teams.save(session, Team::new("teamA")).unwrap();
    let team_b = teams.save(session, Team::new("teamB")).unwrap();
    for (username, team) in [("memberA", &team_a), ("memberB", &team_a), ("memberC", &team_b)] {
        let member = members.save(session, Member::new(username, 10)).unwrap();
        Member::change_team(&member, team);
    }
    members.save(session, Member::new("loner", 10)).unwrap();
    session.flush().unwrap();
    session.clear();
}

fn team_name(member: &repokit_core::Managed<Member>) -> Option<String> {
    let member = member.borrow();
    let target = member.team.as_ref()?.target()?;
    let name = target.borrow().name.clone();
    Some(name)
}

#[test]
fn change_team_keeps_both_sides_consistent() {
    let store = CountingStore::in_memory();
    let mut session = session(&store);
    let teams = TeamRepository::new();
    let team_a = teams.save(&mut session, Team::new("teamA")).unwrap();
    let team_b = teams.save(&mut session, Team::new("teamB")).unwrap();
    let member = MemberRepository::new()
        .save(&mut session, Member::new("member1", 10))
        .unwrap();

    Member::change_team(&member, &team_a);
    assert!(team_a.borrow().members.contains(&member));

    Member::change_team(&member, &team_b);
    assert!(!team_a.borrow().members.contains(&member));
    assert!(team_b.borrow().members.contains(&member));
    assert_eq!(member.borrow().team_id(), team_b.borrow().id);

    Member::leave_team(&member);
    assert!(team_b.borrow().members.is_empty());
    assert_eq!(member.borrow().team_id(), None);
}

#[test]
fn team_change_is_written_at_flush() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    let mut session = session(&store);
    seed(&mut session);

    let loner = members.find_member_by_username(&mut session, "loner").unwrap();
    let team_b = members
        .find_member_by_username(&mut session, "memberC")
        .unwrap()
        .borrow()
        .team_id()
        .unwrap();
    let team_b = TeamRepository::new().get_by_id(&mut session, team_b).unwrap();
    Member::change_team(&loner, &team_b);
    assert_eq!(session.flush().unwrap().updated, 1);
    session.clear();

    let dtos = members.find_member_dto(&mut session).unwrap();
    assert!(dtos
        .iter()
        .any(|dto| dto.username == "loner" && dto.team_name == "teamB"));
}

#[test]
fn lazy_team_costs_one_round_trip_per_identity() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    let mut session = session(&store);
    seed(&mut session);

    let member_a = members.find_member_by_username(&mut session, "memberA").unwrap();
    let member_b = members.find_member_by_username(&mut session, "memberB").unwrap();
    assert_eq!(team_name(&member_a), None);
    store.reset();

    let team = Member::load_team(&member_a, &mut session).unwrap().unwrap();
    assert_eq!(store.queries(), 1);
    assert_eq!(team.borrow().name, "teamA");

    Member::load_team(&member_a, &mut session).unwrap();
    let shared = Member::load_team(&member_b, &mut session).unwrap().unwrap();
    assert_eq!(store.queries(), 1);
    assert!(Rc::ptr_eq(&team, &shared));
    assert_eq!(team.borrow().members.len(), 2);

    let loner = members.find_member_by_username(&mut session, "loner").unwrap();
    assert!(Member::load_team(&loner, &mut session).unwrap().is_none());
}

#[test]
fn fetch_join_loads_teams_in_the_same_round_trip() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    let mut session = session(&store);
    seed(&mut session);
    store.reset();

    let found = members.find_member_fetch_join(&mut session).unwrap();
    assert_eq!(found.len(), 4);
    assert_eq!(store.queries(), 1);

    let mut pairs: Vec<(String, Option<String>)> = found
        .iter()
        .map(|member| (member.borrow().username.clone(), team_name(member)))
        .collect();
    pairs.sort();
    assert_eq!(
        pairs,
        [
            ("loner".to_string(), None),
            ("memberA".to_string(), Some("teamA".to_string())),
            ("memberB".to_string(), Some("teamA".to_string())),
            ("memberC".to_string(), Some("teamB".to_string())),
        ]
    );

    for member in &found {
        Member::load_team(member, &mut session).unwrap();
    }
    assert_eq!(store.queries(), 1);
    assert_eq!(session.stats().tracked, 6);
}

#[test]
fn entity_graphs_fetch_like_a_join() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    let mut session = session(&store);
    seed(&mut session);

    for query in 0..3 {
        session.clear();
        store.reset();
        let found = match query {
            0 => members.find_all(&mut session).unwrap(),
            1 => members.find_member_entity_graph(&mut session).unwrap(),
            _ => members
                .find_entity_graph_by_username(&mut session, "memberC")
                .unwrap(),
        };
        assert!(!found.is_empty());
        assert!(found
            .iter()
            .filter(|member| member.borrow().username != "loner")
            .all(|member| team_name(member).is_some()));
        assert_eq!(store.queries(), 1);
    }
}

#[test]
fn fetched_team_keeps_the_inverse_collection() {
    let store = CountingStore::in_memory();
    let members = MemberRepository::new();
    let mut session = session(&store);
    seed(&mut session);

    let found = members.find_all(&mut session).unwrap();
    let member_a = found
        .iter()
        .find(|member| member.borrow().username == "memberA")
        .unwrap();
    let team = member_a.borrow().team.as_ref().unwrap().target().unwrap();
    assert_eq!(team.borrow().members.len(), 2);
    assert!(team.borrow().members.contains(member_a));
}
