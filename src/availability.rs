// Availability predicates.
//
// Pure queries over the period ledger and the booking store. The single-entity
// checks and the listing queries below both run the ladders from rules.rs, so
// for any entity and instant `bookable(e)` agrees with membership in
// `bookable_ids()`.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;

use crate::composite::{resolve_stable, resolve_tag_team, tag_team_filter_sql};
use crate::entity::EntityKind;
use crate::error::Result;
use crate::rules::{activation_ladder, roster_ladder};
use crate::status::{
    resolve_activation, resolve_roster, ActivationStatus, RosterStatus, TagTeamStatus,
};
use crate::store;

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0).expect("midnight exists").and_utc()
}

// ============================================================================
// SINGLE-ENTITY CHECKS
// ============================================================================

/// Can this entity be put in a match at `as_of`? Employed for singles roster,
/// Bookable for tag teams (member rule included), Active for titles and
/// stables. The ladder already guarantees no covering suspension, injury or
/// retirement.
pub fn bookable(
    conn: &Connection,
    entity_id: &str,
    kind: EntityKind,
    as_of: DateTime<Utc>,
) -> Result<bool> {
    Ok(match kind {
        EntityKind::Wrestler | EntityKind::Manager | EntityKind::Referee => {
            resolve_roster(&store::load_snapshot(conn, entity_id)?, as_of) == RosterStatus::Employed
        }
        EntityKind::TagTeam => resolve_tag_team(conn, entity_id, as_of)? == TagTeamStatus::Bookable,
        EntityKind::Stable => resolve_stable(conn, entity_id, as_of)? == ActivationStatus::Active,
        EntityKind::Title => {
            resolve_activation(&store::load_snapshot(conn, entity_id)?, as_of)
                == ActivationStatus::Active
        }
    })
}

/// Is the entity usable at all at `as_of`? Same status gate as `bookable`,
/// without any date-specific booking concern.
pub fn available(
    conn: &Connection,
    entity_id: &str,
    kind: EntityKind,
    as_of: DateTime<Utc>,
) -> Result<bool> {
    bookable(conn, entity_id, kind, as_of)
}

pub fn unavailable(
    conn: &Connection,
    entity_id: &str,
    kind: EntityKind,
    as_of: DateTime<Utc>,
) -> Result<bool> {
    Ok(!available(conn, entity_id, kind, as_of)?)
}

/// True iff no booking record exists for this entity on `date`.
pub fn not_booked_on(conn: &Connection, entity_id: &str, date: NaiveDate) -> Result<bool> {
    Ok(!store::has_booking_on(conn, entity_id, date)?)
}

/// Bookable on the date and not already booked that date.
pub fn available_on(
    conn: &Connection,
    entity_id: &str,
    kind: EntityKind,
    date: NaiveDate,
) -> Result<bool> {
    Ok(bookable(conn, entity_id, kind, start_of_day(date))? && not_booked_on(conn, entity_id, date)?)
}

// ============================================================================
// LISTING QUERIES
// ============================================================================

/// Ids of singles roster entities (wrestler, manager, referee) of `kind` with
/// this status at `as_of`.
pub fn list_with_status(
    conn: &Connection,
    kind: EntityKind,
    status: RosterStatus,
    as_of: DateTime<Utc>,
) -> Result<Vec<String>> {
    let filter = roster_ladder().filter_sql(status, "e.id");
    store::query_ids(conn, kind, &filter, as_of)
}

/// Ids of tag teams with this status at `as_of`.
pub fn list_tag_teams(
    conn: &Connection,
    status: TagTeamStatus,
    as_of: DateTime<Utc>,
) -> Result<Vec<String>> {
    let filter = tag_team_filter_sql(status);
    store::query_ids(conn, EntityKind::TagTeam, &filter, as_of)
}

/// Ids of titles or stables with this status at `as_of`.
pub fn list_with_activation(
    conn: &Connection,
    kind: EntityKind,
    status: ActivationStatus,
    as_of: DateTime<Utc>,
) -> Result<Vec<String>> {
    let filter = activation_ladder().filter_sql(status, "e.id");
    store::query_ids(conn, kind, &filter, as_of)
}

/// The bookable set for a kind: the set-oriented twin of `bookable`.
pub fn bookable_ids(
    conn: &Connection,
    kind: EntityKind,
    as_of: DateTime<Utc>,
) -> Result<Vec<String>> {
    match kind {
        EntityKind::Wrestler | EntityKind::Manager | EntityKind::Referee => {
            list_with_status(conn, kind, RosterStatus::Employed, as_of)
        }
        EntityKind::TagTeam => list_tag_teams(conn, TagTeamStatus::Bookable, as_of),
        EntityKind::Stable | EntityKind::Title => {
            list_with_activation(conn, kind, ActivationStatus::Active, as_of)
        }
    }
}
