// SQLite persistence: the period ledger, the membership ledger, bookings and
// the entity registry.
//
// The at-most-one-open-period invariant is enforced twice: a pre-check inside
// the mutation's transaction gives the normal PeriodClash, and a partial
// unique index over open rows decides races between concurrent writers so the
// loser also surfaces PeriodClash rather than corrupting history.
//
// Instants are stored as fixed-width RFC 3339 UTC text ("2024-01-05T00:00:00Z")
// so SQL string comparison equals temporal comparison; the compiled predicate
// filters rely on that.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{named_params, params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::entity::{Entity, EntityKind};
use crate::error::{Result, RosterError};
use crate::period::{LedgerSnapshot, Period, PeriodType};

// ============================================================================
// ROW TYPES
// ============================================================================

/// One spell of a member inside a composite (tag team or stable).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub id: String,
    pub composite_id: String,
    pub member_id: String,
    pub member_kind: EntityKind,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

impl Membership {
    /// True when the membership covers `at`. Same half-open semantics as
    /// periods.
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.joined_at <= at && self.left_at.map_or(true, |left| left > at)
    }
}

/// A match assignment. Read-only from the engine's perspective; the
/// match-assignment subsystem produces these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRecord {
    pub entity_id: String,
    pub match_id: String,
    pub date: NaiveDate,
}

// ============================================================================
// INSTANT FORMATTING
// ============================================================================

pub fn fmt_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_instant(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| RosterError::Corrupt(format!("bad instant in store: {s}")))
}

fn instant_from_sql(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| rusqlite::Error::InvalidQuery)
}

fn fmt_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn date_from_sql(s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| rusqlite::Error::InvalidQuery)
}

// ============================================================================
// SETUP
// ============================================================================

/// Open a database file with WAL mode and a busy timeout, ready for
/// concurrent callers.
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS entities (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            name TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS periods (
            id TEXT PRIMARY KEY,
            entity_id TEXT NOT NULL,
            period_type TEXT NOT NULL,
            started_at TEXT NOT NULL,
            ended_at TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS memberships (
            id TEXT PRIMARY KEY,
            composite_id TEXT NOT NULL,
            member_id TEXT NOT NULL,
            member_kind TEXT NOT NULL,
            joined_at TEXT NOT NULL,
            left_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS bookings (
            id TEXT PRIMARY KEY,
            entity_id TEXT NOT NULL,
            match_id TEXT NOT NULL,
            date TEXT NOT NULL
        )",
        [],
    )?;

    // One open period per (entity, type); one open membership per
    // (composite, member). Losers of write races hit these.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_periods_single_open
         ON periods(entity_id, period_type) WHERE ended_at IS NULL",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_memberships_single_open
         ON memberships(composite_id, member_id) WHERE left_at IS NULL",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_periods_entity
         ON periods(entity_id, period_type, started_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_memberships_composite
         ON memberships(composite_id, joined_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_bookings_entity_date
         ON bookings(entity_id, date)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ENTITY REGISTRY
// ============================================================================

pub fn insert_entity(conn: &Connection, entity: &Entity) -> Result<()> {
    conn.execute(
        "INSERT INTO entities (id, kind, name) VALUES (?1, ?2, ?3)",
        params![entity.id, entity.kind.as_str(), entity.name],
    )?;
    Ok(())
}

pub fn get_entity(conn: &Connection, id: &str) -> Result<Option<Entity>> {
    let row = conn
        .query_row(
            "SELECT id, kind, name FROM entities WHERE id = ?1",
            params![id],
            |row| {
                let kind_str: String = row.get(1)?;
                let kind = EntityKind::from_str(&kind_str).ok_or(rusqlite::Error::InvalidQuery)?;
                Ok(Entity {
                    id: row.get(0)?,
                    kind,
                    name: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

// ============================================================================
// PERIOD LEDGER
// ============================================================================

fn row_to_period(row: &rusqlite::Row<'_>) -> rusqlite::Result<Period> {
    let type_str: String = row.get(2)?;
    let period_type = PeriodType::from_str(&type_str).ok_or(rusqlite::Error::InvalidQuery)?;
    let started_str: String = row.get(3)?;
    let ended_str: Option<String> = row.get(4)?;

    Ok(Period {
        id: row.get(0)?,
        entity_id: row.get(1)?,
        period_type,
        started_at: instant_from_sql(&started_str)?,
        ended_at: ended_str.as_deref().map(instant_from_sql).transpose()?,
    })
}

const PERIOD_COLS: &str = "id, entity_id, period_type, started_at, ended_at";

/// Open a period. Fails with PeriodClash if one is already open, and with
/// InvalidRange if the new start would run backwards into recorded history.
pub fn open_period(
    conn: &mut Connection,
    entity_id: &str,
    period_type: PeriodType,
    started_at: DateTime<Utc>,
) -> Result<Period> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let period = open_period_in(&tx, entity_id, period_type, started_at)?;
    tx.commit()?;
    Ok(period)
}

pub(crate) fn open_period_in(
    conn: &Connection,
    entity_id: &str,
    period_type: PeriodType,
    started_at: DateTime<Utc>,
) -> Result<Period> {
    if current_period(conn, entity_id, period_type)?.is_some() {
        return Err(RosterError::PeriodClash {
            entity_id: entity_id.to_string(),
            period_type,
        });
    }

    // A new period may not start before the end of the latest closed one.
    let latest_end: Option<String> = conn
        .query_row(
            "SELECT MAX(ended_at) FROM periods
             WHERE entity_id = ?1 AND period_type = ?2 AND ended_at IS NOT NULL",
            params![entity_id, period_type.as_str()],
            |row| row.get(0),
        )
        .optional()?
        .flatten();
    if let Some(end_str) = latest_end {
        let boundary = parse_instant(&end_str)?;
        if started_at < boundary {
            return Err(RosterError::InvalidRange {
                start: boundary,
                end: started_at,
            });
        }
    }

    let period = Period::open(entity_id, period_type, started_at);
    let result = conn.execute(
        "INSERT INTO periods (id, entity_id, period_type, started_at, ended_at)
         VALUES (?1, ?2, ?3, ?4, NULL)",
        params![
            period.id,
            period.entity_id,
            period.period_type.as_str(),
            fmt_instant(period.started_at),
        ],
    );

    match result {
        Ok(_) => {
            debug!(entity_id, period_type = %period_type, started_at = %period.started_at, "period opened");
            Ok(period)
        }
        // Lost a race: another writer opened one between our check and insert.
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(RosterError::PeriodClash {
                entity_id: entity_id.to_string(),
                period_type,
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Close the open period. Fails with NoOpenPeriod if none is open, and with
/// InvalidRange if the end precedes the open period's start.
pub fn close_period(
    conn: &mut Connection,
    entity_id: &str,
    period_type: PeriodType,
    ended_at: DateTime<Utc>,
) -> Result<Period> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let period = close_period_in(&tx, entity_id, period_type, ended_at)?;
    tx.commit()?;
    Ok(period)
}

pub(crate) fn close_period_in(
    conn: &Connection,
    entity_id: &str,
    period_type: PeriodType,
    ended_at: DateTime<Utc>,
) -> Result<Period> {
    let open = current_period(conn, entity_id, period_type)?.ok_or_else(|| {
        RosterError::NoOpenPeriod {
            entity_id: entity_id.to_string(),
            period_type,
        }
    })?;

    if ended_at < open.started_at {
        return Err(RosterError::InvalidRange {
            start: open.started_at,
            end: ended_at,
        });
    }

    conn.execute(
        "UPDATE periods SET ended_at = ?1 WHERE id = ?2",
        params![fmt_instant(ended_at), open.id],
    )?;
    debug!(entity_id, period_type = %period_type, ended_at = %ended_at, "period closed");

    Ok(Period {
        ended_at: Some(ended_at),
        ..open
    })
}

/// The open period of this type, or None.
pub fn current_period(
    conn: &Connection,
    entity_id: &str,
    period_type: PeriodType,
) -> Result<Option<Period>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {PERIOD_COLS} FROM periods
                 WHERE entity_id = ?1 AND period_type = ?2 AND ended_at IS NULL"
            ),
            params![entity_id, period_type.as_str()],
            row_to_period,
        )
        .optional()?;
    Ok(row)
}

/// The period (open or closed) covering `at`, or None.
pub fn period_at(
    conn: &Connection,
    entity_id: &str,
    period_type: PeriodType,
    at: DateTime<Utc>,
) -> Result<Option<Period>> {
    let at_str = fmt_instant(at);
    let row = conn
        .query_row(
            &format!(
                "SELECT {PERIOD_COLS} FROM periods
                 WHERE entity_id = ?1 AND period_type = ?2
                   AND started_at <= ?3 AND (ended_at IS NULL OR ended_at > ?3)"
            ),
            params![entity_id, period_type.as_str(), at_str],
            row_to_period,
        )
        .optional()?;
    Ok(row)
}

/// Full history of one period type, oldest first.
pub fn history(
    conn: &Connection,
    entity_id: &str,
    period_type: PeriodType,
) -> Result<Vec<Period>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PERIOD_COLS} FROM periods
         WHERE entity_id = ?1 AND period_type = ?2
         ORDER BY started_at ASC"
    ))?;
    let periods = stmt
        .query_map(params![entity_id, period_type.as_str()], row_to_period)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(periods)
}

/// Move the start of the open period. Fails with StartDateLocked when a
/// recorded booking would fall before the new start, and with InvalidRange
/// when the new start would overlap the previous closed period.
pub fn reschedule_start(
    conn: &mut Connection,
    entity_id: &str,
    period_type: PeriodType,
    new_start: DateTime<Utc>,
) -> Result<Period> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let open = current_period(&tx, entity_id, period_type)?.ok_or_else(|| {
        RosterError::NoOpenPeriod {
            entity_id: entity_id.to_string(),
            period_type,
        }
    })?;

    if let Some(booked_on) = earliest_booking(&tx, entity_id)? {
        if booked_on < new_start.date_naive() {
            return Err(RosterError::StartDateLocked {
                entity_id: entity_id.to_string(),
                booked_on,
            });
        }
    }

    let latest_end: Option<String> = tx
        .query_row(
            "SELECT MAX(ended_at) FROM periods
             WHERE entity_id = ?1 AND period_type = ?2 AND ended_at IS NOT NULL",
            params![entity_id, period_type.as_str()],
            |row| row.get(0),
        )
        .optional()?
        .flatten();
    if let Some(end_str) = latest_end {
        let boundary = parse_instant(&end_str)?;
        if new_start < boundary {
            return Err(RosterError::InvalidRange {
                start: boundary,
                end: new_start,
            });
        }
    }

    tx.execute(
        "UPDATE periods SET started_at = ?1 WHERE id = ?2",
        params![fmt_instant(new_start), open.id],
    )?;
    debug!(entity_id, period_type = %period_type, new_start = %new_start, "period start rescheduled");
    tx.commit()?;

    Ok(Period {
        started_at: new_start,
        ..open
    })
}

/// Load every period of one entity as a consistent snapshot.
pub fn load_snapshot(conn: &Connection, entity_id: &str) -> Result<LedgerSnapshot> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PERIOD_COLS} FROM periods WHERE entity_id = ?1 ORDER BY started_at ASC"
    ))?;
    let periods = stmt
        .query_map(params![entity_id], row_to_period)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(LedgerSnapshot::from_periods(entity_id, periods))
}

// ============================================================================
// MEMBERSHIP LEDGER
// ============================================================================

fn row_to_membership(row: &rusqlite::Row<'_>) -> rusqlite::Result<Membership> {
    let kind_str: String = row.get(3)?;
    let member_kind = EntityKind::from_str(&kind_str).ok_or(rusqlite::Error::InvalidQuery)?;
    let joined_str: String = row.get(4)?;
    let left_str: Option<String> = row.get(5)?;

    Ok(Membership {
        id: row.get(0)?,
        composite_id: row.get(1)?,
        member_id: row.get(2)?,
        member_kind,
        joined_at: instant_from_sql(&joined_str)?,
        left_at: left_str.as_deref().map(instant_from_sql).transpose()?,
    })
}

const MEMBERSHIP_COLS: &str = "id, composite_id, member_id, member_kind, joined_at, left_at";

pub fn join_composite(
    conn: &mut Connection,
    composite_id: &str,
    member_id: &str,
    member_kind: EntityKind,
    joined_at: DateTime<Utc>,
) -> Result<Membership> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let membership = join_composite_in(&tx, composite_id, member_id, member_kind, joined_at)?;
    tx.commit()?;
    Ok(membership)
}

pub(crate) fn join_composite_in(
    conn: &Connection,
    composite_id: &str,
    member_id: &str,
    member_kind: EntityKind,
    joined_at: DateTime<Utc>,
) -> Result<Membership> {
    let membership = Membership {
        id: uuid::Uuid::new_v4().to_string(),
        composite_id: composite_id.to_string(),
        member_id: member_id.to_string(),
        member_kind,
        joined_at,
        left_at: None,
    };

    let result = conn.execute(
        "INSERT INTO memberships (id, composite_id, member_id, member_kind, joined_at, left_at)
         VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
        params![
            membership.id,
            membership.composite_id,
            membership.member_id,
            membership.member_kind.as_str(),
            fmt_instant(membership.joined_at),
        ],
    );

    match result {
        Ok(_) => {
            debug!(composite_id, member_id, joined_at = %joined_at, "member joined");
            Ok(membership)
        }
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(RosterError::MembershipClash {
                composite_id: composite_id.to_string(),
                member_id: member_id.to_string(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

pub fn leave_composite(
    conn: &mut Connection,
    composite_id: &str,
    member_id: &str,
    left_at: DateTime<Utc>,
) -> Result<Membership> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let membership = leave_composite_in(&tx, composite_id, member_id, left_at)?;
    tx.commit()?;
    Ok(membership)
}

pub(crate) fn leave_composite_in(
    conn: &Connection,
    composite_id: &str,
    member_id: &str,
    left_at: DateTime<Utc>,
) -> Result<Membership> {
    let open = conn
        .query_row(
            &format!(
                "SELECT {MEMBERSHIP_COLS} FROM memberships
                 WHERE composite_id = ?1 AND member_id = ?2 AND left_at IS NULL"
            ),
            params![composite_id, member_id],
            row_to_membership,
        )
        .optional()?
        .ok_or_else(|| RosterError::NoOpenMembership {
            composite_id: composite_id.to_string(),
            member_id: member_id.to_string(),
        })?;

    if left_at < open.joined_at {
        return Err(RosterError::InvalidRange {
            start: open.joined_at,
            end: left_at,
        });
    }

    conn.execute(
        "UPDATE memberships SET left_at = ?1 WHERE id = ?2",
        params![fmt_instant(left_at), open.id],
    )?;
    debug!(composite_id, member_id, left_at = %left_at, "member left");

    Ok(Membership {
        left_at: Some(left_at),
        ..open
    })
}

/// Memberships of a composite current at `at`, in join order.
pub fn members_at(
    conn: &Connection,
    composite_id: &str,
    at: DateTime<Utc>,
) -> Result<Vec<Membership>> {
    let at_str = fmt_instant(at);
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEMBERSHIP_COLS} FROM memberships
         WHERE composite_id = ?1 AND joined_at <= ?2
           AND (left_at IS NULL OR left_at > ?2)
         ORDER BY joined_at ASC"
    ))?;
    let members = stmt
        .query_map(params![composite_id, at_str], row_to_membership)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(members)
}

/// Composites this entity belongs to at `at`.
pub fn member_of(conn: &Connection, member_id: &str, at: DateTime<Utc>) -> Result<Vec<Membership>> {
    let at_str = fmt_instant(at);
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEMBERSHIP_COLS} FROM memberships
         WHERE member_id = ?1 AND joined_at <= ?2
           AND (left_at IS NULL OR left_at > ?2)
         ORDER BY joined_at ASC"
    ))?;
    let members = stmt
        .query_map(params![member_id, at_str], row_to_membership)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(members)
}

// ============================================================================
// BOOKINGS
// ============================================================================

pub fn record_booking(
    conn: &Connection,
    entity_id: &str,
    match_id: &str,
    date: NaiveDate,
) -> Result<BookingRecord> {
    conn.execute(
        "INSERT INTO bookings (id, entity_id, match_id, date) VALUES (?1, ?2, ?3, ?4)",
        params![
            uuid::Uuid::new_v4().to_string(),
            entity_id,
            match_id,
            fmt_date(date),
        ],
    )?;
    Ok(BookingRecord {
        entity_id: entity_id.to_string(),
        match_id: match_id.to_string(),
        date,
    })
}

pub fn bookings_on(conn: &Connection, entity_id: &str, date: NaiveDate) -> Result<Vec<BookingRecord>> {
    let mut stmt = conn.prepare(
        "SELECT entity_id, match_id, date FROM bookings
         WHERE entity_id = ?1 AND date = ?2",
    )?;
    let bookings = stmt
        .query_map(params![entity_id, fmt_date(date)], |row| {
            let date_str: String = row.get(2)?;
            Ok(BookingRecord {
                entity_id: row.get(0)?,
                match_id: row.get(1)?,
                date: date_from_sql(&date_str)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(bookings)
}

pub fn has_booking_on(conn: &Connection, entity_id: &str, date: NaiveDate) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings WHERE entity_id = ?1 AND date = ?2",
        params![entity_id, fmt_date(date)],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn earliest_booking(conn: &Connection, entity_id: &str) -> Result<Option<NaiveDate>> {
    let date_str: Option<String> = conn
        .query_row(
            "SELECT MIN(date) FROM bookings WHERE entity_id = ?1",
            params![entity_id],
            |row| row.get(0),
        )
        .optional()?
        .flatten();
    match date_str {
        Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| RosterError::Corrupt(format!("bad booking date in store: {s}"))),
        None => Ok(None),
    }
}

// ============================================================================
// SET QUERIES
// ============================================================================

/// Execute a compiled status filter against the entity registry: the ids of
/// every entity of `kind` matching the filter at `as_of`.
pub fn query_ids(
    conn: &Connection,
    kind: EntityKind,
    filter_sql: &str,
    as_of: DateTime<Utc>,
) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT e.id FROM entities e WHERE e.kind = :kind AND ({filter_sql}) ORDER BY e.id"
    );
    let mut stmt = conn.prepare(&sql)?;

    let ids = if filter_sql.contains(":as_of") {
        stmt.query_map(
            named_params! { ":kind": kind.as_str(), ":as_of": fmt_instant(as_of) },
            |row| row.get::<_, String>(0),
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?
    } else {
        stmt.query_map(named_params! { ":kind": kind.as_str() }, |row| {
            row.get::<_, String>(0)
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?
    };
    Ok(ids)
}
