// Error taxonomy for the roster engine.
//
// Every variant here is a recoverable condition the calling action handler is
// expected to turn into a user-facing message. Storage faults and invariant
// corruption are the exceptions: those are not part of the normal contract
// and must never be swallowed.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::entity::EntityKind;
use crate::period::PeriodType;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RosterError>;

#[derive(Error, Debug)]
pub enum RosterError {
    /// An open period of this type already exists for the entity.
    #[error("an open {period_type} period already exists for entity {entity_id}")]
    PeriodClash {
        entity_id: String,
        period_type: PeriodType,
    },

    /// A close was requested but no period of this type is open.
    #[error("no open {period_type} period for entity {entity_id}")]
    NoOpenPeriod {
        entity_id: String,
        period_type: PeriodType,
    },

    /// The end instant precedes the start instant, or a new period would run
    /// backwards into already-recorded history.
    #[error("invalid range: {end} precedes {start}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// A start-date edit would strand a commitment outside the active window.
    #[error("start date for entity {entity_id} is locked by a booking on {booked_on}")]
    StartDateLocked {
        entity_id: String,
        booked_on: NaiveDate,
    },

    /// A composite operation ran with a member count the kind does not allow.
    #[error("{kind} requires {required} current members, found {found}")]
    CompositeMembership {
        kind: EntityKind,
        required: usize,
        found: usize,
    },

    /// The requested action is not permitted in the entity's current status.
    #[error("cannot {action} an entity that is {status}")]
    InvalidTransition {
        action: &'static str,
        status: String,
    },

    /// The member already has an open membership in this composite.
    #[error("member {member_id} already belongs to composite {composite_id}")]
    MembershipClash {
        composite_id: String,
        member_id: String,
    },

    /// A leave was requested but the member has no open membership.
    #[error("member {member_id} has no open membership in composite {composite_id}")]
    NoOpenMembership {
        composite_id: String,
        member_id: String,
    },

    /// The period store violates an invariant the engine relies on. Fatal:
    /// callers must not catch and continue past this.
    #[error("period store corrupted: {0}")]
    Corrupt(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl RosterError {
    /// True for the expected, caller-recoverable conditions of the contract.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, RosterError::Corrupt(_) | RosterError::Storage(_))
    }
}
