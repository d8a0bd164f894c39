// Derived lifecycle statuses.
//
// A status is a read-time projection of an entity's period ledgers as of an
// instant. Nothing in the engine stores one; callers mutate periods and
// recompute.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::period::LedgerSnapshot;
use crate::rules::{activation_ladder, roster_ladder};

// ============================================================================
// ROSTER STATUS
// ============================================================================

/// Status of an individually-employable roster member (wrestler, manager,
/// referee) and of a tag team's own period ledger before member propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RosterStatus {
    Unemployed,
    FutureEmployment,
    Employed,
    Released,
    Suspended,
    Injured,
    Retired,
}

impl RosterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RosterStatus::Unemployed => "unemployed",
            RosterStatus::FutureEmployment => "future_employment",
            RosterStatus::Employed => "employed",
            RosterStatus::Released => "released",
            RosterStatus::Suspended => "suspended",
            RosterStatus::Injured => "injured",
            RosterStatus::Retired => "retired",
        }
    }
}

impl fmt::Display for RosterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ACTIVATION STATUS
// ============================================================================

/// Status of a title or a stable, derived from Activation and Retirement
/// periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivationStatus {
    Undebuted,
    WithFutureActivation,
    Active,
    Inactive,
    Retired,
}

impl ActivationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationStatus::Undebuted => "undebuted",
            ActivationStatus::WithFutureActivation => "with_future_activation",
            ActivationStatus::Active => "active",
            ActivationStatus::Inactive => "inactive",
            ActivationStatus::Retired => "retired",
        }
    }
}

impl fmt::Display for ActivationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TAG TEAM STATUS
// ============================================================================

/// A tag team's surfaced status. The Employed rung of the team's own ladder
/// splits into Bookable/Unbookable depending on member state; every other
/// rung carries through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagTeamStatus {
    Unemployed,
    FutureEmployment,
    Bookable,
    Unbookable,
    Released,
    Suspended,
    Retired,
}

impl TagTeamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagTeamStatus::Unemployed => "unemployed",
            TagTeamStatus::FutureEmployment => "future_employment",
            TagTeamStatus::Bookable => "bookable",
            TagTeamStatus::Unbookable => "unbookable",
            TagTeamStatus::Released => "released",
            TagTeamStatus::Suspended => "suspended",
            TagTeamStatus::Retired => "retired",
        }
    }
}

impl fmt::Display for TagTeamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RESOLVERS
// ============================================================================

/// Resolve a roster member's status from its loaded periods.
pub fn resolve_roster(snapshot: &LedgerSnapshot, as_of: DateTime<Utc>) -> RosterStatus {
    roster_ladder().resolve(snapshot, as_of)
}

/// Resolve a title's or stable's status from its loaded periods.
pub fn resolve_activation(snapshot: &LedgerSnapshot, as_of: DateTime<Utc>) -> ActivationStatus {
    activation_ladder().resolve(snapshot, as_of)
}

/// Combine a tag team's own ladder status with its current members' resolved
/// statuses. `member_statuses` must be the statuses of the memberships
/// current at the same instant.
pub fn combine_tag_team(
    own: RosterStatus,
    member_statuses: &[RosterStatus],
    required_members: usize,
) -> TagTeamStatus {
    match own {
        RosterStatus::Retired => TagTeamStatus::Retired,
        RosterStatus::Suspended => TagTeamStatus::Suspended,
        RosterStatus::FutureEmployment => TagTeamStatus::FutureEmployment,
        RosterStatus::Released => TagTeamStatus::Released,
        RosterStatus::Unemployed => TagTeamStatus::Unemployed,
        // Teams are not injurable; an injury row would mean a corrupted
        // ledger, which surfaces upstream. Treat as unbookable here.
        RosterStatus::Injured => TagTeamStatus::Unbookable,
        RosterStatus::Employed => {
            let complete = member_statuses.len() == required_members
                && member_statuses.iter().all(|s| *s == RosterStatus::Employed);
            if complete {
                TagTeamStatus::Bookable
            } else {
                TagTeamStatus::Unbookable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_requires_exact_member_count() {
        let own = RosterStatus::Employed;

        assert_eq!(
            combine_tag_team(own, &[RosterStatus::Employed, RosterStatus::Employed], 2),
            TagTeamStatus::Bookable
        );
        assert_eq!(
            combine_tag_team(own, &[RosterStatus::Employed], 2),
            TagTeamStatus::Unbookable
        );
        assert_eq!(
            combine_tag_team(
                own,
                &[
                    RosterStatus::Employed,
                    RosterStatus::Employed,
                    RosterStatus::Employed
                ],
                2
            ),
            TagTeamStatus::Unbookable
        );
    }

    #[test]
    fn test_combine_requires_every_member_employed() {
        assert_eq!(
            combine_tag_team(
                RosterStatus::Employed,
                &[RosterStatus::Employed, RosterStatus::Suspended],
                2
            ),
            TagTeamStatus::Unbookable
        );
        assert_eq!(
            combine_tag_team(
                RosterStatus::Employed,
                &[RosterStatus::Employed, RosterStatus::Injured],
                2
            ),
            TagTeamStatus::Unbookable
        );
    }

    #[test]
    fn test_combine_own_ladder_wins_over_members() {
        // A retired team is retired even with two employed members.
        assert_eq!(
            combine_tag_team(
                RosterStatus::Retired,
                &[RosterStatus::Employed, RosterStatus::Employed],
                2
            ),
            TagTeamStatus::Retired
        );
        assert_eq!(
            combine_tag_team(
                RosterStatus::Suspended,
                &[RosterStatus::Employed, RosterStatus::Employed],
                2
            ),
            TagTeamStatus::Suspended
        );
    }
}
