// End-to-end properties of the status engine: the listing filters must agree
// with the single-entity checks for every entity and instant, histories never
// overlap, and concurrent writers cannot double-open a period.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rusqlite::Connection;
use std::sync::{Arc, Barrier};

use ringside::{
    activation_ladder, bookable, bookable_ids, employ, establish_tag_team, injure,
    list_tag_teams, list_with_activation, list_with_status, load_snapshot, open_database,
    open_period, resolve_activation, resolve_roster, resolve_tag_team, retire, roster_ladder,
    setup_database, suspend, ActivationStatus, Entity, EntityKind, PeriodType, RosterError,
    RosterStatus, TagTeam, TagTeamStatus, Title, Wrestler,
};

fn day(n: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, n, 0, 0, 0).unwrap()
}

fn test_conn() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    setup_database(&conn).unwrap();
    conn
}

fn add(conn: &Connection, kind: EntityKind, name: &str) -> String {
    let e = Entity::new(kind, name);
    ringside::insert_entity(conn, &e).unwrap();
    e.id
}

/// A roster with one wrestler in every reachable lifecycle state.
fn varied_roster(conn: &mut Connection) -> Vec<String> {
    let never = add(conn, EntityKind::Wrestler, "never signed");

    let employed = add(conn, EntityKind::Wrestler, "employed");
    employ(conn, &Wrestler::new(&employed), day(1)).unwrap();

    let released = add(conn, EntityKind::Wrestler, "released");
    employ(conn, &Wrestler::new(&released), day(1)).unwrap();
    ringside::close_period(conn, &released, PeriodType::Employment, day(8)).unwrap();

    let suspended = add(conn, EntityKind::Wrestler, "suspended");
    employ(conn, &Wrestler::new(&suspended), day(1)).unwrap();
    suspend(conn, &Wrestler::new(&suspended), day(4)).unwrap();

    let injured = add(conn, EntityKind::Wrestler, "injured");
    employ(conn, &Wrestler::new(&injured), day(1)).unwrap();
    injure(conn, &Wrestler::new(&injured), day(5)).unwrap();

    let retired = add(conn, EntityKind::Wrestler, "retired");
    employ(conn, &Wrestler::new(&retired), day(1)).unwrap();
    retire(conn, &Wrestler::new(&retired), day(6)).unwrap();

    let future = add(conn, EntityKind::Wrestler, "future signing");
    open_period(conn, &future, PeriodType::Employment, day(25)).unwrap();

    // Suspended and injured at once: injury outranks suspension.
    let both = add(conn, EntityKind::Wrestler, "suspended then injured");
    employ(conn, &Wrestler::new(&both), day(1)).unwrap();
    suspend(conn, &Wrestler::new(&both), day(3)).unwrap();
    open_period(conn, &both, PeriodType::Injury, day(5)).unwrap();

    vec![never, employed, released, suspended, injured, retired, future, both]
}

#[test]
fn scope_method_equivalence_for_wrestlers() -> Result<()> {
    let mut conn = test_conn();
    let ids = varied_roster(&mut conn);
    let ladder = roster_ladder();

    for as_of in [day(2), day(7), day(12), day(30)] {
        for rung in ladder.rungs() {
            let listed = list_with_status(&conn, EntityKind::Wrestler, rung.status, as_of)?;
            for id in &ids {
                let resolved = resolve_roster(&load_snapshot(&conn, id)?, as_of);
                assert_eq!(
                    listed.contains(id),
                    resolved == rung.status,
                    "status {:?} at {} disagrees for {}",
                    rung.status,
                    as_of,
                    id
                );
            }
        }

        // The bookable set is exactly the entities whose single check passes.
        let set = bookable_ids(&conn, EntityKind::Wrestler, as_of)?;
        for id in &ids {
            assert_eq!(
                set.contains(id),
                bookable(&conn, id, EntityKind::Wrestler, as_of)?
            );
        }
    }
    Ok(())
}

#[test]
fn scope_method_equivalence_for_tag_teams() -> Result<()> {
    let mut conn = test_conn();

    // Complete, bookable.
    let full = add(&conn, EntityKind::TagTeam, "full team");
    let (a, b) = (
        add(&conn, EntityKind::Wrestler, "a"),
        add(&conn, EntityKind::Wrestler, "b"),
    );
    employ(&mut conn, &Wrestler::new(&a), day(1))?;
    employ(&mut conn, &Wrestler::new(&b), day(1))?;
    establish_tag_team(
        &mut conn,
        &TagTeam::new(&full),
        &[Wrestler::new(&a), Wrestler::new(&b)],
        day(2),
    )?;

    // Employed team, one member only.
    let short = add(&conn, EntityKind::TagTeam, "short team");
    let c = add(&conn, EntityKind::Wrestler, "c");
    employ(&mut conn, &Wrestler::new(&c), day(1))?;
    open_period(&mut conn, &short, PeriodType::Employment, day(2))?;
    ringside::join_composite(&mut conn, &short, &c, EntityKind::Wrestler, day(2))?;

    // Complete but one member suspended.
    let cursed = add(&conn, EntityKind::TagTeam, "cursed team");
    let (d, e) = (
        add(&conn, EntityKind::Wrestler, "d"),
        add(&conn, EntityKind::Wrestler, "e"),
    );
    employ(&mut conn, &Wrestler::new(&d), day(1))?;
    employ(&mut conn, &Wrestler::new(&e), day(1))?;
    establish_tag_team(
        &mut conn,
        &TagTeam::new(&cursed),
        &[Wrestler::new(&d), Wrestler::new(&e)],
        day(2),
    )?;
    suspend(&mut conn, &Wrestler::new(&e), day(5))?;

    // Never employed as a team.
    let idle = add(&conn, EntityKind::TagTeam, "idle team");

    let teams = [&full, &short, &cursed, &idle];
    let statuses = [
        TagTeamStatus::Bookable,
        TagTeamStatus::Unbookable,
        TagTeamStatus::Unemployed,
        TagTeamStatus::FutureEmployment,
        TagTeamStatus::Released,
        TagTeamStatus::Suspended,
        TagTeamStatus::Retired,
    ];

    for as_of in [day(3), day(10)] {
        for status in statuses {
            let listed = list_tag_teams(&conn, status, as_of)?;
            for team in teams {
                let resolved = resolve_tag_team(&conn, team, as_of)?;
                assert_eq!(
                    listed.contains(team),
                    resolved == status,
                    "tag team status {:?} at {} disagrees for {}",
                    status,
                    as_of,
                    team
                );
            }
        }
    }

    assert_eq!(resolve_tag_team(&conn, &full, day(10))?, TagTeamStatus::Bookable);
    assert_eq!(resolve_tag_team(&conn, &short, day(10))?, TagTeamStatus::Unbookable);
    assert_eq!(resolve_tag_team(&conn, &cursed, day(10))?, TagTeamStatus::Unbookable);
    assert_eq!(resolve_tag_team(&conn, &cursed, day(3))?, TagTeamStatus::Bookable);
    Ok(())
}

#[test]
fn scope_method_equivalence_for_titles() -> Result<()> {
    let mut conn = test_conn();

    let undebuted = add(&conn, EntityKind::Title, "midcard belt");
    let active = add(&conn, EntityKind::Title, "world belt");
    let pulled = add(&conn, EntityKind::Title, "legacy belt");

    ringside::activate(&mut conn, &Title::new(&active), day(1))?;
    ringside::activate(&mut conn, &Title::new(&pulled), day(1))?;
    ringside::deactivate(&mut conn, &Title::new(&pulled), day(8))?;

    let ladder = activation_ladder();
    for as_of in [day(5), day(12)] {
        for rung in ladder.rungs() {
            let listed = list_with_activation(&conn, EntityKind::Title, rung.status, as_of)?;
            for id in [&undebuted, &active, &pulled] {
                let resolved = resolve_activation(&load_snapshot(&conn, id)?, as_of);
                assert_eq!(listed.contains(id), resolved == rung.status);
            }
        }
    }

    assert_eq!(
        resolve_activation(&load_snapshot(&conn, &pulled)?, day(12)),
        ActivationStatus::Inactive
    );
    Ok(())
}

#[test]
fn round_trip_release() -> Result<()> {
    let mut conn = test_conn();
    open_period(&mut conn, "w-1", PeriodType::Employment, day(1))?;
    ringside::close_period(&mut conn, "w-1", PeriodType::Employment, day(2))?;

    let hist = ringside::history(&conn, "w-1", PeriodType::Employment)?;
    assert_eq!(hist.len(), 1);
    assert_eq!(hist[0].started_at, day(1));
    assert_eq!(hist[0].ended_at, Some(day(2)));

    let snap = load_snapshot(&conn, "w-1")?;
    let mid = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    let after = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap();
    assert_eq!(resolve_roster(&snap, mid), RosterStatus::Employed);
    assert_eq!(resolve_roster(&snap, after), RosterStatus::Released);
    Ok(())
}

#[test]
fn histories_never_overlap() -> Result<()> {
    let mut conn = test_conn();
    let w = Wrestler::new("w-1");

    // Three employment spells with suspensions inside the second.
    employ(&mut conn, &w, day(1))?;
    ringside::release(&mut conn, &w, day(5))?;
    employ(&mut conn, &w, day(8))?;
    suspend(&mut conn, &w, day(10))?;
    ringside::reinstate(&mut conn, &w, day(12))?;
    ringside::release(&mut conn, &w, day(15))?;
    employ(&mut conn, &w, day(20))?;

    for t in PeriodType::ALL {
        let hist = ringside::history(&conn, "w-1", t)?;
        for (i, a) in hist.iter().enumerate() {
            for b in &hist[i + 1..] {
                assert!(!a.overlaps(b), "{t} periods overlap");
            }
        }
    }
    load_snapshot(&conn, "w-1")?.check_invariants()?;
    Ok(())
}

#[test]
fn retirement_outranks_suspension() -> Result<()> {
    let mut conn = test_conn();
    open_period(&mut conn, "w-1", PeriodType::Employment, day(1))?;
    open_period(&mut conn, "w-1", PeriodType::Suspension, day(5))?;
    open_period(&mut conn, "w-1", PeriodType::Retirement, day(8))?;

    let snap = load_snapshot(&conn, "w-1")?;
    assert_eq!(resolve_roster(&snap, day(10)), RosterStatus::Retired);
    Ok(())
}

#[test]
fn available_on_gates_on_bookings() -> Result<()> {
    let mut conn = test_conn();
    let w = add(&conn, EntityKind::Wrestler, "double booked");
    employ(&mut conn, &Wrestler::new(&w), day(1))?;

    let d10 = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
    let d11 = NaiveDate::from_ymd_opt(2024, 1, 11).unwrap();
    ringside::store::record_booking(&conn, &w, "match-1", d10)?;

    assert!(!ringside::available_on(&conn, &w, EntityKind::Wrestler, d10)?);
    assert!(ringside::available_on(&conn, &w, EntityKind::Wrestler, d11)?);
    Ok(())
}

#[test]
fn concurrent_open_period_has_one_winner() {
    let path = std::env::temp_dir().join(format!("ringside-race-{}.db", std::process::id()));
    let _ = std::fs::remove_file(&path);
    {
        let conn = open_database(&path).unwrap();
        setup_database(&conn).unwrap();
        let mut conn = conn;
        open_period(&mut conn, "w-1", PeriodType::Employment, day(1)).unwrap();
    }

    let barrier = Arc::new(Barrier::new(2));
    let mut handles = Vec::new();
    for _ in 0..2 {
        let barrier = Arc::clone(&barrier);
        let path = path.clone();
        handles.push(std::thread::spawn(move || {
            let mut conn = open_database(&path).unwrap();
            barrier.wait();
            open_period(&mut conn, "w-1", PeriodType::Suspension, day(5))
        }));
    }

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let wins = results.iter().filter(|r| r.is_ok()).count();
    let clashes = results
        .iter()
        .filter(|r| matches!(r, Err(RosterError::PeriodClash { .. })))
        .count();
    assert_eq!(wins, 1, "exactly one concurrent open must win");
    assert_eq!(clashes, 1, "the loser must see PeriodClash");

    // The store holds a single open suspension.
    let conn = open_database(&path).unwrap();
    let hist = ringside::history(&conn, "w-1", PeriodType::Suspension).unwrap();
    assert_eq!(hist.len(), 1);
    drop(conn);
    let _ = std::fs::remove_file(&path);
}
