// Periods and the per-entity ledger snapshot.
//
// A period records one occurrence of a status-affecting condition as a
// half-open interval [started_at, ended_at). ended_at = None means the
// period is still open. Status is never stored; it is derived from these
// intervals on every read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, RosterError};

// ============================================================================
// PERIOD TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodType {
    Employment,
    Injury,
    Suspension,
    Retirement,
    Activation,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Employment => "employment",
            PeriodType::Injury => "injury",
            PeriodType::Suspension => "suspension",
            PeriodType::Retirement => "retirement",
            PeriodType::Activation => "activation",
        }
    }

    pub fn from_str(s: &str) -> Option<PeriodType> {
        match s {
            "employment" => Some(PeriodType::Employment),
            "injury" => Some(PeriodType::Injury),
            "suspension" => Some(PeriodType::Suspension),
            "retirement" => Some(PeriodType::Retirement),
            "activation" => Some(PeriodType::Activation),
            _ => None,
        }
    }

    pub const ALL: [PeriodType; 5] = [
        PeriodType::Employment,
        PeriodType::Injury,
        PeriodType::Suspension,
        PeriodType::Retirement,
        PeriodType::Activation,
    ];
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PERIOD
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Period {
    /// Stable row identity.
    pub id: String,

    pub entity_id: String,
    pub period_type: PeriodType,

    pub started_at: DateTime<Utc>,

    /// None while the period is open.
    pub ended_at: Option<DateTime<Utc>>,
}

impl Period {
    pub fn open(entity_id: impl Into<String>, period_type: PeriodType, started_at: DateTime<Utc>) -> Self {
        Period {
            id: uuid::Uuid::new_v4().to_string(),
            entity_id: entity_id.into(),
            period_type,
            started_at,
            ended_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// True when the interval covers `at`. The end instant itself is excluded:
    /// a period closed at T no longer covers T.
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.started_at <= at && self.ended_at.map_or(true, |end| end > at)
    }

    /// True when the two intervals share any instant. Open periods extend to
    /// infinity.
    pub fn overlaps(&self, other: &Period) -> bool {
        let self_ends_after = self.ended_at.map_or(true, |end| end > other.started_at);
        let other_ends_after = other.ended_at.map_or(true, |end| end > self.started_at);
        self_ends_after && other_ends_after
    }
}

// ============================================================================
// LEDGER SNAPSHOT
// ============================================================================

/// All periods of one entity, grouped by type, each group in chronological
/// order. Loaded once per read; the resolvers and the in-memory predicate
/// backend evaluate against this.
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    pub entity_id: String,
    periods: HashMap<PeriodType, Vec<Period>>,
}

impl LedgerSnapshot {
    pub fn new(entity_id: impl Into<String>) -> Self {
        LedgerSnapshot {
            entity_id: entity_id.into(),
            periods: HashMap::new(),
        }
    }

    pub fn from_periods(entity_id: impl Into<String>, mut periods: Vec<Period>) -> Self {
        periods.sort_by_key(|p| p.started_at);
        let mut grouped: HashMap<PeriodType, Vec<Period>> = HashMap::new();
        for p in periods {
            grouped.entry(p.period_type).or_default().push(p);
        }
        LedgerSnapshot {
            entity_id: entity_id.into(),
            periods: grouped,
        }
    }

    /// Chronological history of one period type, oldest first.
    pub fn of(&self, period_type: PeriodType) -> &[Period] {
        self.periods.get(&period_type).map_or(&[], Vec::as_slice)
    }

    /// The open period of this type, if any.
    pub fn open(&self, period_type: PeriodType) -> Option<&Period> {
        self.of(period_type).iter().find(|p| p.is_open())
    }

    /// The period (open or closed) covering `at`, if any.
    pub fn covering(&self, period_type: PeriodType, at: DateTime<Utc>) -> Option<&Period> {
        self.of(period_type).iter().find(|p| p.covers(at))
    }

    /// True when any period of this type starts strictly after `at`.
    pub fn has_future_start(&self, period_type: PeriodType, at: DateTime<Utc>) -> bool {
        self.of(period_type).iter().any(|p| p.started_at > at)
    }

    /// True when any period of this type ended at or before `at`.
    pub fn has_ended_by(&self, period_type: PeriodType, at: DateTime<Utc>) -> bool {
        self.of(period_type)
            .iter()
            .any(|p| p.ended_at.map_or(false, |end| end <= at))
    }

    /// Verify the no-overlap and single-open invariants. A violation means
    /// the store is corrupted, not that the caller did something wrong.
    pub fn check_invariants(&self) -> Result<()> {
        for (period_type, group) in &self.periods {
            let open_count = group.iter().filter(|p| p.is_open()).count();
            if open_count > 1 {
                return Err(RosterError::Corrupt(format!(
                    "entity {} has {} open {} periods",
                    self.entity_id, open_count, period_type
                )));
            }
            for pair in group.windows(2) {
                if pair[0].overlaps(&pair[1]) {
                    return Err(RosterError::Corrupt(format!(
                        "entity {} has overlapping {} periods",
                        self.entity_id, period_type
                    )));
                }
            }
        }
        Ok(())
    }
}
