// Ringside - temporal roster status & availability engine
//
// Status is never stored: it is derived on every read from per-entity period
// ledgers (employment, injury, suspension, retirement, activation) under a
// fixed precedence ladder. The same ladder definition drives the
// single-entity checks and the set-oriented listing filters, so the two
// cannot disagree.

pub mod actions;
pub mod availability;
pub mod composite;
pub mod entity;
pub mod error;
pub mod period;
pub mod rules;
pub mod status;
pub mod store;

// Re-export commonly used types
pub use actions::{
    activate, deactivate, employ, establish_tag_team, heal, injure, reinstate, release, retire,
    retire_stable, suspend, unretire,
};
pub use availability::{
    available, available_on, bookable, bookable_ids, list_tag_teams, list_with_activation,
    list_with_status, not_booked_on, unavailable,
};
pub use composite::{resolve_stable, resolve_tag_team, tag_team_filter_sql, TAG_TEAM_SIZE};
pub use entity::{
    Activatable, Employable, Entity, EntityKind, Injurable, Manager, Referee, Retirable,
    RosterEntity, Stable, Suspendable, TagTeam, Title, Wrestler,
};
pub use error::{Result, RosterError};
pub use period::{LedgerSnapshot, Period, PeriodType};
pub use rules::{activation_ladder, roster_ladder, Clause, Rung, StatusLadder};
pub use status::{
    combine_tag_team, resolve_activation, resolve_roster, ActivationStatus, RosterStatus,
    TagTeamStatus,
};
pub use store::{
    close_period, current_period, get_entity, history, insert_entity, join_composite,
    leave_composite, load_snapshot, member_of, members_at, open_database, open_period, period_at,
    query_ids, reschedule_start, setup_database, BookingRecord, Membership,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
