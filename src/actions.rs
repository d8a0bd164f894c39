// Action handlers.
//
// Each handler maps to one ledger open/close inside its own transaction, with
// the transition checks the ledger itself cannot express. Cross-entity
// cascades collect the affected entities, validate every precondition, then
// commit all mutations as one unit; any failure rolls the whole operation
// back.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

use crate::composite::TAG_TEAM_SIZE;
use crate::entity::{
    Activatable, Employable, EntityKind, Injurable, Retirable, RosterEntity, Stable, Suspendable,
    TagTeam, Wrestler,
};
use crate::error::{Result, RosterError};
use crate::period::{Period, PeriodType};
use crate::status::{resolve_activation, resolve_roster, ActivationStatus, RosterStatus};
use crate::store;

/// Period types an entity can hold open besides Retirement; retiring closes
/// whichever of these are open.
const RETIREMENT_CLOSES: [PeriodType; 4] = [
    PeriodType::Employment,
    PeriodType::Suspension,
    PeriodType::Injury,
    PeriodType::Activation,
];

// ============================================================================
// SINGLE-ENTITY ACTIONS
// ============================================================================

pub fn employ<E: Employable>(
    conn: &mut Connection,
    entity: &E,
    at: DateTime<Utc>,
) -> Result<Period> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let snap = store::load_snapshot(&tx, entity.entity_id())?;
    if resolve_roster(&snap, at) == RosterStatus::Retired {
        return Err(RosterError::InvalidTransition {
            action: "employ",
            status: RosterStatus::Retired.to_string(),
        });
    }
    let period = store::open_period_in(&tx, entity.entity_id(), PeriodType::Employment, at)?;
    tx.commit()?;
    Ok(period)
}

/// End employment. Any open suspension or injury ends with it; a released
/// entity carries no residual flags.
pub fn release<E: Employable>(
    conn: &mut Connection,
    entity: &E,
    at: DateTime<Utc>,
) -> Result<Period> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let snap = store::load_snapshot(&tx, entity.entity_id())?;
    for t in [PeriodType::Suspension, PeriodType::Injury] {
        if snap.open(t).is_some() {
            store::close_period_in(&tx, entity.entity_id(), t, at)?;
        }
    }
    let period = store::close_period_in(&tx, entity.entity_id(), PeriodType::Employment, at)?;
    tx.commit()?;
    Ok(period)
}

pub fn suspend<E: Suspendable>(
    conn: &mut Connection,
    entity: &E,
    at: DateTime<Utc>,
) -> Result<Period> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let snap = store::load_snapshot(&tx, entity.entity_id())?;
    let status = resolve_roster(&snap, at);
    if status != RosterStatus::Employed {
        return Err(RosterError::InvalidTransition {
            action: "suspend",
            status: status.to_string(),
        });
    }
    let period = store::open_period_in(&tx, entity.entity_id(), PeriodType::Suspension, at)?;
    tx.commit()?;
    Ok(period)
}

pub fn reinstate<E: Suspendable>(
    conn: &mut Connection,
    entity: &E,
    at: DateTime<Utc>,
) -> Result<Period> {
    store::close_period(conn, entity.entity_id(), PeriodType::Suspension, at)
}

pub fn injure<E: Injurable>(
    conn: &mut Connection,
    entity: &E,
    at: DateTime<Utc>,
) -> Result<Period> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let snap = store::load_snapshot(&tx, entity.entity_id())?;
    let status = resolve_roster(&snap, at);
    if status != RosterStatus::Employed {
        return Err(RosterError::InvalidTransition {
            action: "injure",
            status: status.to_string(),
        });
    }
    let period = store::open_period_in(&tx, entity.entity_id(), PeriodType::Injury, at)?;
    tx.commit()?;
    Ok(period)
}

pub fn heal<E: Injurable>(
    conn: &mut Connection,
    entity: &E,
    at: DateTime<Utc>,
) -> Result<Period> {
    store::close_period(conn, entity.entity_id(), PeriodType::Injury, at)
}

pub fn retire<E: Retirable>(
    conn: &mut Connection,
    entity: &E,
    at: DateTime<Utc>,
) -> Result<Period> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let period = retire_in(&tx, entity.entity_id(), at)?;
    tx.commit()?;
    Ok(period)
}

/// Shared by `retire` and the stable cascade. Closes every open flag the
/// entity holds, then opens the retirement.
fn retire_in(conn: &Connection, entity_id: &str, at: DateTime<Utc>) -> Result<Period> {
    let snap = store::load_snapshot(conn, entity_id)?;
    if snap.covering(PeriodType::Retirement, at).is_some() {
        return Err(RosterError::InvalidTransition {
            action: "retire",
            status: "retired".to_string(),
        });
    }
    for t in RETIREMENT_CLOSES {
        if snap.open(t).is_some() {
            store::close_period_in(conn, entity_id, t, at)?;
        }
    }
    store::open_period_in(conn, entity_id, PeriodType::Retirement, at)
}

pub fn unretire<E: Retirable>(
    conn: &mut Connection,
    entity: &E,
    at: DateTime<Utc>,
) -> Result<Period> {
    store::close_period(conn, entity.entity_id(), PeriodType::Retirement, at)
}

pub fn activate<E: Activatable>(
    conn: &mut Connection,
    entity: &E,
    at: DateTime<Utc>,
) -> Result<Period> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let snap = store::load_snapshot(&tx, entity.entity_id())?;
    if resolve_activation(&snap, at) == ActivationStatus::Retired {
        return Err(RosterError::InvalidTransition {
            action: "activate",
            status: ActivationStatus::Retired.to_string(),
        });
    }
    let period = store::open_period_in(&tx, entity.entity_id(), PeriodType::Activation, at)?;
    tx.commit()?;
    Ok(period)
}

pub fn deactivate<E: Activatable>(
    conn: &mut Connection,
    entity: &E,
    at: DateTime<Utc>,
) -> Result<Period> {
    store::close_period(conn, entity.entity_id(), PeriodType::Activation, at)
}

// ============================================================================
// COMPOSITE ORCHESTRATION
// ============================================================================

/// Form a tag team: employ the team and join exactly TAG_TEAM_SIZE wrestlers,
/// atomically. A retired founding member fails the whole operation.
pub fn establish_tag_team(
    conn: &mut Connection,
    team: &TagTeam,
    members: &[Wrestler],
    at: DateTime<Utc>,
) -> Result<()> {
    if members.len() != TAG_TEAM_SIZE {
        return Err(RosterError::CompositeMembership {
            kind: EntityKind::TagTeam,
            required: TAG_TEAM_SIZE,
            found: members.len(),
        });
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    // Validate every precondition before the first mutation.
    for member in members {
        let snap = store::load_snapshot(&tx, member.entity_id())?;
        if resolve_roster(&snap, at) == RosterStatus::Retired {
            return Err(RosterError::InvalidTransition {
                action: "establish a tag team with",
                status: RosterStatus::Retired.to_string(),
            });
        }
    }

    store::open_period_in(&tx, team.entity_id(), PeriodType::Employment, at)?;
    for member in members {
        store::join_composite_in(&tx, team.entity_id(), member.entity_id(), member.kind(), at)?;
    }

    info!(team_id = team.entity_id(), members = members.len(), at = %at, "tag team established");
    tx.commit()?;
    Ok(())
}

/// Retire a stable and every current member with it, as one atomic unit.
/// Memberships close at the same instant. Any member that cannot retire
/// (already retired) fails the whole cascade and leaves the stable untouched.
pub fn retire_stable(conn: &mut Connection, stable: &Stable, at: DateTime<Utc>) -> Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let own = store::load_snapshot(&tx, stable.entity_id())?;
    if resolve_activation(&own, at) == ActivationStatus::Retired {
        return Err(RosterError::InvalidTransition {
            action: "retire",
            status: "retired".to_string(),
        });
    }

    // Collect and validate everything first.
    let members = store::members_at(&tx, stable.entity_id(), at)?;
    for m in &members {
        match m.member_kind {
            EntityKind::Wrestler | EntityKind::TagTeam | EntityKind::Manager => {}
            other => {
                return Err(RosterError::Corrupt(format!(
                    "stable {} has a {} member",
                    stable.entity_id(),
                    other
                )))
            }
        }
        let snap = store::load_snapshot(&tx, &m.member_id)?;
        if snap.covering(PeriodType::Retirement, at).is_some() {
            return Err(RosterError::InvalidTransition {
                action: "retire a stable containing",
                status: "retired".to_string(),
            });
        }
    }

    // Then mutate.
    retire_in(&tx, stable.entity_id(), at)?;
    for m in &members {
        retire_in(&tx, &m.member_id, at)?;
        store::leave_composite_in(&tx, stable.entity_id(), &m.member_id, at)?;
    }

    info!(stable_id = stable.entity_id(), members = members.len(), at = %at, "stable retired");
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::{resolve_stable, resolve_tag_team};
    use crate::status::TagTeamStatus;
    use crate::store::{
        history, join_composite, load_snapshot, open_period, setup_database,
    };
    use chrono::TimeZone;

    fn day(n: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::days(i64::from(n) - 1)
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_employ_release_lifecycle() {
        let mut conn = test_conn();
        let w = Wrestler::new("w-1");

        employ(&mut conn, &w, day(1)).unwrap();
        let snap = load_snapshot(&conn, "w-1").unwrap();
        assert_eq!(resolve_roster(&snap, day(5)), RosterStatus::Employed);

        release(&mut conn, &w, day(10)).unwrap();
        let snap = load_snapshot(&conn, "w-1").unwrap();
        assert_eq!(resolve_roster(&snap, day(15)), RosterStatus::Released);
    }

    #[test]
    fn test_suspend_requires_employment() {
        let mut conn = test_conn();
        let w = Wrestler::new("w-1");

        let err = suspend(&mut conn, &w, day(5)).unwrap_err();
        assert!(matches!(err, RosterError::InvalidTransition { .. }));

        employ(&mut conn, &w, day(1)).unwrap();
        suspend(&mut conn, &w, day(5)).unwrap();

        // Suspending while suspended is not an Employed status either.
        let err = suspend(&mut conn, &w, day(6)).unwrap_err();
        assert!(matches!(err, RosterError::InvalidTransition { .. }));

        reinstate(&mut conn, &w, day(10)).unwrap();
        let snap = load_snapshot(&conn, "w-1").unwrap();
        assert_eq!(resolve_roster(&snap, day(15)), RosterStatus::Employed);
    }

    #[test]
    fn test_injure_and_heal() {
        let mut conn = test_conn();
        let w = Wrestler::new("w-1");
        employ(&mut conn, &w, day(1)).unwrap();
        injure(&mut conn, &w, day(5)).unwrap();

        let snap = load_snapshot(&conn, "w-1").unwrap();
        assert_eq!(resolve_roster(&snap, day(7)), RosterStatus::Injured);

        heal(&mut conn, &w, day(9)).unwrap();
        let snap = load_snapshot(&conn, "w-1").unwrap();
        assert_eq!(resolve_roster(&snap, day(10)), RosterStatus::Employed);
    }

    #[test]
    fn test_release_clears_open_flags() {
        let mut conn = test_conn();
        let w = Wrestler::new("w-1");
        employ(&mut conn, &w, day(1)).unwrap();
        suspend(&mut conn, &w, day(5)).unwrap();

        release(&mut conn, &w, day(10)).unwrap();
        let snap = load_snapshot(&conn, "w-1").unwrap();
        assert_eq!(resolve_roster(&snap, day(15)), RosterStatus::Released);
        assert!(snap.open(PeriodType::Suspension).is_none());
    }

    #[test]
    fn test_retire_and_unretire() {
        let mut conn = test_conn();
        let w = Wrestler::new("w-1");
        employ(&mut conn, &w, day(1)).unwrap();
        suspend(&mut conn, &w, day(5)).unwrap();

        retire(&mut conn, &w, day(10)).unwrap();
        let snap = load_snapshot(&conn, "w-1").unwrap();
        assert_eq!(resolve_roster(&snap, day(15)), RosterStatus::Retired);
        assert!(snap.open(PeriodType::Employment).is_none());
        assert!(snap.open(PeriodType::Suspension).is_none());

        let err = retire(&mut conn, &w, day(20)).unwrap_err();
        assert!(matches!(err, RosterError::InvalidTransition { .. }));

        unretire(&mut conn, &w, day(30)).unwrap();
        let snap = load_snapshot(&conn, "w-1").unwrap();
        // Employment ended at retirement; a comeback needs a fresh employ.
        assert_eq!(resolve_roster(&snap, day(31)), RosterStatus::Released);
        employ(&mut conn, &w, day(31)).unwrap();
        let snap = load_snapshot(&conn, "w-1").unwrap();
        assert_eq!(resolve_roster(&snap, day(32)), RosterStatus::Employed);
    }

    #[test]
    fn test_employ_retired_needs_unretire() {
        let mut conn = test_conn();
        let w = Wrestler::new("w-1");
        employ(&mut conn, &w, day(1)).unwrap();
        retire(&mut conn, &w, day(10)).unwrap();

        let err = employ(&mut conn, &w, day(15)).unwrap_err();
        assert!(matches!(err, RosterError::InvalidTransition { .. }));
    }

    #[test]
    fn test_title_activation_lifecycle() {
        let mut conn = test_conn();
        let t = crate::entity::Title::new("t-1");

        activate(&mut conn, &t, day(1)).unwrap();
        deactivate(&mut conn, &t, day(10)).unwrap();
        activate(&mut conn, &t, day(20)).unwrap();

        retire(&mut conn, &t, day(30)).unwrap();
        let err = activate(&mut conn, &t, day(35)).unwrap_err();
        assert!(matches!(err, RosterError::InvalidTransition { .. }));

        let hist = history(&conn, "t-1", PeriodType::Activation).unwrap();
        assert_eq!(hist.len(), 2);
        assert_eq!(hist[1].ended_at, Some(day(30)));
    }

    #[test]
    fn test_establish_tag_team() {
        let mut conn = test_conn();
        let (a, b) = (Wrestler::new("w-1"), Wrestler::new("w-2"));
        employ(&mut conn, &a, day(1)).unwrap();
        employ(&mut conn, &b, day(1)).unwrap();

        let team = TagTeam::new("tt-1");
        establish_tag_team(&mut conn, &team, &[a, b], day(2)).unwrap();
        assert_eq!(
            resolve_tag_team(&conn, "tt-1", day(5)).unwrap(),
            TagTeamStatus::Bookable
        );
    }

    #[test]
    fn test_establish_tag_team_wrong_count() {
        let mut conn = test_conn();
        let a = Wrestler::new("w-1");
        employ(&mut conn, &a, day(1)).unwrap();

        let err =
            establish_tag_team(&mut conn, &TagTeam::new("tt-1"), &[a], day(2)).unwrap_err();
        match err {
            RosterError::CompositeMembership { required, found, .. } => {
                assert_eq!(required, TAG_TEAM_SIZE);
                assert_eq!(found, 1);
            }
            other => panic!("expected CompositeMembership, got {other:?}"),
        }
    }

    #[test]
    fn test_retire_stable_cascades() {
        let mut conn = test_conn();
        let stable = Stable::new("st-1");
        let (a, b) = (Wrestler::new("w-1"), Wrestler::new("w-2"));

        activate(&mut conn, &stable, day(1)).unwrap();
        employ(&mut conn, &a, day(1)).unwrap();
        employ(&mut conn, &b, day(1)).unwrap();
        join_composite(&mut conn, "st-1", "w-1", EntityKind::Wrestler, day(2)).unwrap();
        join_composite(&mut conn, "st-1", "w-2", EntityKind::Wrestler, day(2)).unwrap();

        retire_stable(&mut conn, &stable, day(10)).unwrap();

        assert_eq!(
            resolve_stable(&conn, "st-1", day(15)).unwrap(),
            ActivationStatus::Retired
        );
        for w in ["w-1", "w-2"] {
            let snap = load_snapshot(&conn, w).unwrap();
            assert_eq!(resolve_roster(&snap, day(15)), RosterStatus::Retired);
        }
        assert!(store::members_at(&conn, "st-1", day(15)).unwrap().is_empty());
        // History from before the cascade is intact.
        assert_eq!(store::members_at(&conn, "st-1", day(5)).unwrap().len(), 2);
    }

    #[test]
    fn test_retire_stable_rolls_back_on_member_failure() {
        let mut conn = test_conn();
        let stable = Stable::new("st-1");
        let (a, b) = (Wrestler::new("w-1"), Wrestler::new("w-2"));

        activate(&mut conn, &stable, day(1)).unwrap();
        employ(&mut conn, &a, day(1)).unwrap();
        employ(&mut conn, &b, day(1)).unwrap();
        join_composite(&mut conn, "st-1", "w-1", EntityKind::Wrestler, day(2)).unwrap();
        join_composite(&mut conn, "st-1", "w-2", EntityKind::Wrestler, day(2)).unwrap();

        // One member retires on their own first; the cascade must refuse.
        open_period(&mut conn, "w-2", PeriodType::Retirement, day(5)).unwrap();
        let err = retire_stable(&mut conn, &stable, day(10)).unwrap_err();
        assert!(matches!(err, RosterError::InvalidTransition { .. }));

        // Nothing moved: stable still active, member one still employed,
        // memberships still open.
        assert_eq!(
            resolve_stable(&conn, "st-1", day(15)).unwrap(),
            ActivationStatus::Active
        );
        let snap = load_snapshot(&conn, "w-1").unwrap();
        assert_eq!(resolve_roster(&snap, day(15)), RosterStatus::Employed);
        assert_eq!(store::members_at(&conn, "st-1", day(15)).unwrap().len(), 2);
    }
}
