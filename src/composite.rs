// Composite status propagation.
//
// A tag team's or stable's status is recomputed from current member state on
// every read; nothing here is stored or patched independently, so there is no
// propagation lag to get wrong. The member conditions compile to SQL with the
// same ladder filters the in-memory path uses.

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::Result;
use crate::rules::roster_ladder;
use crate::status::{
    combine_tag_team, resolve_activation, resolve_roster, ActivationStatus, RosterStatus,
    TagTeamStatus,
};
use crate::store;

/// A tag team has exactly this many current members when bookable.
pub const TAG_TEAM_SIZE: usize = 2;

// ============================================================================
// RESOLUTION
// ============================================================================

/// Resolve a tag team: its own roster ladder combined with every current
/// member's individually resolved status.
pub fn resolve_tag_team(
    conn: &Connection,
    team_id: &str,
    as_of: DateTime<Utc>,
) -> Result<TagTeamStatus> {
    let own = resolve_roster(&store::load_snapshot(conn, team_id)?, as_of);

    let members = store::members_at(conn, team_id, as_of)?;
    let mut member_statuses = Vec::with_capacity(members.len());
    for m in &members {
        let snap = store::load_snapshot(conn, &m.member_id)?;
        member_statuses.push(resolve_roster(&snap, as_of));
    }

    Ok(combine_tag_team(own, &member_statuses, TAG_TEAM_SIZE))
}

/// Resolve a stable. Retirement is the stable's own: members retiring does
/// not retire the stable, and vice versa the cascade is an explicit action.
pub fn resolve_stable(
    conn: &Connection,
    stable_id: &str,
    as_of: DateTime<Utc>,
) -> Result<ActivationStatus> {
    Ok(resolve_activation(&store::load_snapshot(conn, stable_id)?, as_of))
}

// ============================================================================
// COMPILED FILTERS
// ============================================================================

/// SQL for "a current membership of e covers :as_of", reused by both member
/// conditions.
fn current_membership_sql() -> &'static str {
    "m.composite_id = e.id AND m.joined_at <= :as_of AND (m.left_at IS NULL OR m.left_at > :as_of)"
}

/// SQL for the tag-team member rule: exactly TAG_TEAM_SIZE current members,
/// every one of them resolving Employed under the roster ladder.
fn members_complete_sql() -> String {
    let member_employed = roster_ladder().filter_sql(RosterStatus::Employed, "m.member_id");
    let current = current_membership_sql();
    format!(
        "((SELECT COUNT(*) FROM memberships m WHERE {current}) = {TAG_TEAM_SIZE} \
         AND NOT EXISTS (SELECT 1 FROM memberships m WHERE {current} \
         AND NOT ({member_employed})))"
    )
}

/// The set filter for one tag-team status. Bookable and Unbookable split the
/// Employed rung of the team's own ladder by the member rule; every other
/// status is the corresponding roster rung unchanged.
pub fn tag_team_filter_sql(status: TagTeamStatus) -> String {
    let ladder = roster_ladder();
    match status {
        TagTeamStatus::Retired => ladder.filter_sql(RosterStatus::Retired, "e.id"),
        TagTeamStatus::Suspended => ladder.filter_sql(RosterStatus::Suspended, "e.id"),
        TagTeamStatus::FutureEmployment => {
            ladder.filter_sql(RosterStatus::FutureEmployment, "e.id")
        }
        TagTeamStatus::Released => ladder.filter_sql(RosterStatus::Released, "e.id"),
        TagTeamStatus::Unemployed => ladder.filter_sql(RosterStatus::Unemployed, "e.id"),
        TagTeamStatus::Bookable => format!(
            "({} AND {})",
            ladder.filter_sql(RosterStatus::Employed, "e.id"),
            members_complete_sql()
        ),
        TagTeamStatus::Unbookable => format!(
            "({} AND NOT {})",
            ladder.filter_sql(RosterStatus::Employed, "e.id"),
            members_complete_sql()
        ),
    }
}
