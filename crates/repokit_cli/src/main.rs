//! CLI smoke entry point.
//!
//! # Responsibility
//! - Exercise the core crate end to end against an in-memory store.
//! - Keep output deterministic for quick local sanity checks.

use log::{error, info};
use repokit_core::{
    init_logging, open_store_in_memory, AuditingInterceptor, LoggingConfig, Member,
    MemberRepository, Pageable, RepoResult, Session, Sort, Team, TeamRepository,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("repokit_core ping={}", repokit_core::ping());
    println!("repokit_core version={}", repokit_core::core_version());

    if let Err(err) = init_logging(&LoggingConfig::default()) {
        eprintln!("logging disabled: {err}");
    }

    match run_demo() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(
                "event=cli_demo module=cli status=error error_code={} error={}",
                err.code(),
                err
            );
            eprintln!("demo failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_demo() -> RepoResult<()> {
    let store = open_store_in_memory()?;
    let mut session = Session::new(
        &store,
        AuditingInterceptor::new(|| Some("operator".to_string())),
    );
    let members = MemberRepository::new();
    let teams = TeamRepository::new();

    let team = teams.save(&mut session, Team::new("teamA"))?;
    let seed = [("member1", 10), ("member2", 19), ("member3", 20), ("member4", 21)];
    for (username, age) in seed {
        let member = members.save(&mut session, Member::new(username, age))?;
        Member::change_team(&member, &team);
    }
    let summary = session.flush()?;
    info!(
        "event=cli_demo module=cli status=ok stage=seed inserted={}",
        summary.inserted
    );

    let page = members.find_all_paged(
        &mut session,
        &Pageable::sorted(0, 3, Sort::desc("username")),
    )?;
    println!(
        "page number={} size={} rows={} total={} pages={}",
        page.number(),
        page.size(),
        page.number_of_elements(),
        page.total_elements(),
        page.total_pages()
    );

    let affected = members.bulk_age_plus(&mut session, 20)?;
    println!("bulk_age_plus affected={affected}");

    for dto in members.find_member_dto(&mut session)? {
        println!(
            "member id={} username={} team={}",
            dto.id, dto.username, dto.team_name
        );
    }
    Ok(())
}
