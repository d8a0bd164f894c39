// Status rules as data.
//
// The precedence ladder is defined once, as a list of (status, clause) rungs.
// Both execution backends consume the same definition: `Clause::eval` runs it
// against one entity's loaded periods, `Clause::to_sql` compiles it into a
// set filter over the persisted store. The set filter for rung N is rung N's
// clause AND NOT any earlier rung's clause, derived mechanically, so the
// single-entity check and the listing query cannot drift apart.

use chrono::{DateTime, Utc};

use crate::period::{LedgerSnapshot, PeriodType};
use crate::status::{ActivationStatus, RosterStatus};

// ============================================================================
// CLAUSE
// ============================================================================

/// One boolean condition over an entity's period history at an instant.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// A period of this type covers the instant (open or closed-but-covering).
    Covering(PeriodType),

    /// Some period of this type starts strictly after the instant.
    FutureStart(PeriodType),

    /// Some period of this type ended at or before the instant.
    EndedBy(PeriodType),

    /// Always true; the fallback rung of every ladder.
    Always,

    Not(Box<Clause>),
    All(Vec<Clause>),
    Any(Vec<Clause>),
}

impl Clause {
    /// Evaluate against one entity's loaded periods.
    pub fn eval(&self, snapshot: &LedgerSnapshot, as_of: DateTime<Utc>) -> bool {
        match self {
            Clause::Covering(t) => snapshot.covering(*t, as_of).is_some(),
            Clause::FutureStart(t) => snapshot.has_future_start(*t, as_of),
            Clause::EndedBy(t) => snapshot.has_ended_by(*t, as_of),
            Clause::Always => true,
            Clause::Not(inner) => !inner.eval(snapshot, as_of),
            Clause::All(clauses) => clauses.iter().all(|c| c.eval(snapshot, as_of)),
            Clause::Any(clauses) => clauses.iter().any(|c| c.eval(snapshot, as_of)),
        }
    }

    /// Compile to a SQL boolean expression over the `periods` table. The
    /// instant is bound as the named parameter `:as_of`; `entity_col` is the
    /// SQL expression for the entity id being filtered (e.g. `e.id` or
    /// `m.member_id`).
    pub fn to_sql(&self, entity_col: &str) -> String {
        match self {
            Clause::Covering(t) => format!(
                "EXISTS (SELECT 1 FROM periods p WHERE p.entity_id = {col} \
                 AND p.period_type = '{t}' AND p.started_at <= :as_of \
                 AND (p.ended_at IS NULL OR p.ended_at > :as_of))",
                col = entity_col,
                t = t.as_str()
            ),
            Clause::FutureStart(t) => format!(
                "EXISTS (SELECT 1 FROM periods p WHERE p.entity_id = {col} \
                 AND p.period_type = '{t}' AND p.started_at > :as_of)",
                col = entity_col,
                t = t.as_str()
            ),
            Clause::EndedBy(t) => format!(
                "EXISTS (SELECT 1 FROM periods p WHERE p.entity_id = {col} \
                 AND p.period_type = '{t}' AND p.ended_at IS NOT NULL \
                 AND p.ended_at <= :as_of)",
                col = entity_col,
                t = t.as_str()
            ),
            Clause::Always => "1 = 1".to_string(),
            Clause::Not(inner) => format!("NOT ({})", inner.to_sql(entity_col)),
            Clause::All(clauses) => {
                if clauses.is_empty() {
                    return "1 = 1".to_string();
                }
                let parts: Vec<String> = clauses.iter().map(|c| c.to_sql(entity_col)).collect();
                format!("({})", parts.join(" AND "))
            }
            Clause::Any(clauses) => {
                if clauses.is_empty() {
                    return "1 = 0".to_string();
                }
                let parts: Vec<String> = clauses.iter().map(|c| c.to_sql(entity_col)).collect();
                format!("({})", parts.join(" OR "))
            }
        }
    }
}

// ============================================================================
// STATUS LADDER
// ============================================================================

#[derive(Debug, Clone)]
pub struct Rung<S> {
    pub status: S,
    pub clause: Clause,
}

/// An ordered precedence ladder. The first rung whose clause holds wins; the
/// last rung must be the `Always` fallback.
#[derive(Debug, Clone)]
pub struct StatusLadder<S: Copy + PartialEq> {
    rungs: Vec<Rung<S>>,
}

impl<S: Copy + PartialEq> StatusLadder<S> {
    pub fn new(rungs: Vec<Rung<S>>) -> Self {
        debug_assert!(matches!(rungs.last().map(|r| &r.clause), Some(Clause::Always)));
        StatusLadder { rungs }
    }

    pub fn rungs(&self) -> &[Rung<S>] {
        &self.rungs
    }

    /// Resolve one entity's status: the first matching rung.
    pub fn resolve(&self, snapshot: &LedgerSnapshot, as_of: DateTime<Utc>) -> S {
        for rung in &self.rungs {
            if rung.clause.eval(snapshot, as_of) {
                return rung.status;
            }
        }
        // Unreachable with a well-formed ladder; the fallback rung is Always.
        self.rungs.last().expect("ladder has at least one rung").status
    }

    /// The set-filter clause for one status: that rung's clause with every
    /// earlier rung excluded.
    pub fn filter_clause(&self, status: S) -> Clause {
        let idx = self
            .rungs
            .iter()
            .position(|r| r.status == status)
            .expect("status belongs to this ladder");

        let mut parts: Vec<Clause> = self.rungs[..idx]
            .iter()
            .map(|r| Clause::Not(Box::new(r.clause.clone())))
            .collect();
        if !matches!(self.rungs[idx].clause, Clause::Always) {
            parts.push(self.rungs[idx].clause.clone());
        }
        Clause::All(parts)
    }

    /// The compiled SQL filter for one status.
    pub fn filter_sql(&self, status: S, entity_col: &str) -> String {
        self.filter_clause(status).to_sql(entity_col)
    }
}

// ============================================================================
// LADDER DEFINITIONS
// ============================================================================

/// The roster ladder for individually-employable entities and for a tag
/// team's own periods. Highest precedence first.
pub fn roster_ladder() -> StatusLadder<RosterStatus> {
    StatusLadder::new(vec![
        Rung {
            status: RosterStatus::Retired,
            clause: Clause::Covering(PeriodType::Retirement),
        },
        Rung {
            status: RosterStatus::Injured,
            clause: Clause::Covering(PeriodType::Injury),
        },
        Rung {
            status: RosterStatus::Suspended,
            clause: Clause::Covering(PeriodType::Suspension),
        },
        Rung {
            status: RosterStatus::FutureEmployment,
            clause: Clause::FutureStart(PeriodType::Employment),
        },
        Rung {
            status: RosterStatus::Employed,
            clause: Clause::Covering(PeriodType::Employment),
        },
        Rung {
            status: RosterStatus::Released,
            clause: Clause::EndedBy(PeriodType::Employment),
        },
        Rung {
            status: RosterStatus::Unemployed,
            clause: Clause::Always,
        },
    ])
}

/// The activation ladder for titles and stables.
pub fn activation_ladder() -> StatusLadder<ActivationStatus> {
    StatusLadder::new(vec![
        Rung {
            status: ActivationStatus::Retired,
            clause: Clause::Covering(PeriodType::Retirement),
        },
        Rung {
            status: ActivationStatus::WithFutureActivation,
            clause: Clause::FutureStart(PeriodType::Activation),
        },
        Rung {
            status: ActivationStatus::Active,
            clause: Clause::Covering(PeriodType::Activation),
        },
        Rung {
            status: ActivationStatus::Inactive,
            clause: Clause::EndedBy(PeriodType::Activation),
        },
        Rung {
            status: ActivationStatus::Undebuted,
            clause: Clause::Always,
        },
    ])
}
