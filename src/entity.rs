// Entity kinds and capability traits.
//
// Each kind supports a fixed set of period types. The capability traits make
// that set a compile-time property of the typed handles: suspending a Title
// does not typecheck, it is not a runtime error.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::period::PeriodType;

// ============================================================================
// ENTITY KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Wrestler,
    TagTeam,
    Manager,
    Referee,
    Stable,
    Title,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Wrestler => "wrestler",
            EntityKind::TagTeam => "tag_team",
            EntityKind::Manager => "manager",
            EntityKind::Referee => "referee",
            EntityKind::Stable => "stable",
            EntityKind::Title => "title",
        }
    }

    pub fn from_str(s: &str) -> Option<EntityKind> {
        match s {
            "wrestler" => Some(EntityKind::Wrestler),
            "tag_team" => Some(EntityKind::TagTeam),
            "manager" => Some(EntityKind::Manager),
            "referee" => Some(EntityKind::Referee),
            "stable" => Some(EntityKind::Stable),
            "title" => Some(EntityKind::Title),
            _ => None,
        }
    }

    /// Which period types apply to this kind.
    pub fn supports(&self, period_type: PeriodType) -> bool {
        use EntityKind::*;
        use PeriodType::*;
        match (self, period_type) {
            (Wrestler | Manager | Referee, Employment | Injury | Suspension | Retirement) => true,
            (TagTeam, Employment | Suspension | Retirement) => true,
            (Stable | Title, Activation | Retirement) => true,
            _ => false,
        }
    }

    /// Tag teams and stables derive status from members as well as their own
    /// periods.
    pub fn is_composite(&self) -> bool {
        matches!(self, EntityKind::TagTeam | EntityKind::Stable)
    }

    /// Titles and stables run on the Activation ladder instead of Employment.
    pub fn uses_activation(&self) -> bool {
        matches!(self, EntityKind::Stable | EntityKind::Title)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ENTITY ROW
// ============================================================================

/// A roster identity. The engine treats the name as opaque; only id and kind
/// drive any logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub kind: EntityKind,
    pub name: String,
}

impl Entity {
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Entity {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            name: name.into(),
        }
    }
}

// ============================================================================
// CAPABILITY TRAITS
// ============================================================================

/// An identity the period ledger can be keyed by.
pub trait RosterEntity {
    fn entity_id(&self) -> &str;
    fn kind(&self) -> EntityKind;
}

pub trait Employable: RosterEntity {}
pub trait Suspendable: RosterEntity {}
pub trait Injurable: RosterEntity {}
pub trait Retirable: RosterEntity {}
pub trait Activatable: RosterEntity {}

macro_rules! typed_handle {
    ($name:ident, $kind:expr) => {
        /// Typed handle carrying just the entity id.
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            pub id: String,
        }

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name { id: id.into() }
            }
        }

        impl RosterEntity for $name {
            fn entity_id(&self) -> &str {
                &self.id
            }

            fn kind(&self) -> EntityKind {
                $kind
            }
        }
    };
}

typed_handle!(Wrestler, EntityKind::Wrestler);
typed_handle!(TagTeam, EntityKind::TagTeam);
typed_handle!(Manager, EntityKind::Manager);
typed_handle!(Referee, EntityKind::Referee);
typed_handle!(Stable, EntityKind::Stable);
typed_handle!(Title, EntityKind::Title);

impl Employable for Wrestler {}
impl Suspendable for Wrestler {}
impl Injurable for Wrestler {}
impl Retirable for Wrestler {}

impl Employable for Manager {}
impl Suspendable for Manager {}
impl Injurable for Manager {}
impl Retirable for Manager {}

impl Employable for Referee {}
impl Suspendable for Referee {}
impl Injurable for Referee {}
impl Retirable for Referee {}

impl Employable for TagTeam {}
impl Suspendable for TagTeam {}
impl Retirable for TagTeam {}

impl Activatable for Stable {}
impl Retirable for Stable {}

impl Activatable for Title {}
impl Retirable for Title {}
