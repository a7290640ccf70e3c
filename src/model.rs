// Core league entities and lifecycle enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a castaway within a season.
///
/// The status is monotonic: `Active -> Eliminated` or `Active -> Winner`,
/// never reversed. Transitions are recorded by an external elimination
/// process; this core only enforces the ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastawayStatus {
    Active,
    Eliminated,
    Winner,
}

impl CastawayStatus {
    /// Parse the stored status string. Unknown strings are `None` so the
    /// caller surfaces a hard error instead of defaulting.
    pub fn from_str_status(s: &str) -> Option<Self> {
        match s {
            "active" => Some(CastawayStatus::Active),
            "eliminated" => Some(CastawayStatus::Eliminated),
            "winner" => Some(CastawayStatus::Winner),
            _ => None,
        }
    }

    /// The storage representation of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            CastawayStatus::Active => "active",
            CastawayStatus::Eliminated => "eliminated",
            CastawayStatus::Winner => "winner",
        }
    }

    /// Whether a castaway in this status can still be picked to play.
    pub fn is_playable(&self) -> bool {
        matches!(self, CastawayStatus::Active)
    }

    /// Whether the status may move to `next`. Exhaustive so a new variant
    /// forces a decision here.
    pub fn can_become(&self, next: CastawayStatus) -> bool {
        match (self, next) {
            (CastawayStatus::Active, CastawayStatus::Eliminated) => true,
            (CastawayStatus::Active, CastawayStatus::Winner) => true,
            (CastawayStatus::Active, CastawayStatus::Active) => false,
            (CastawayStatus::Eliminated, _) => false,
            (CastawayStatus::Winner, _) => false,
        }
    }
}

impl fmt::Display for CastawayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State of a member's weekly pick.
///
/// The lifecycle is `Open -> Selected -> Locked -> Scored` for members who
/// choose in time, `Open -> AutoPicked -> Scored` for members filled in at
/// the deadline, and `Open -> Unfillable` for members with no eligible
/// castaway left. States never regress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickState {
    Open,
    Selected,
    Locked,
    AutoPicked,
    Unfillable,
    Scored,
}

impl PickState {
    /// Parse the stored state string. Unknown strings are `None` so the
    /// caller surfaces a hard error instead of defaulting.
    pub fn from_str_state(s: &str) -> Option<Self> {
        match s {
            "open" => Some(PickState::Open),
            "selected" => Some(PickState::Selected),
            "locked" => Some(PickState::Locked),
            "auto_picked" => Some(PickState::AutoPicked),
            "unfillable" => Some(PickState::Unfillable),
            "scored" => Some(PickState::Scored),
            _ => None,
        }
    }

    /// The storage representation of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            PickState::Open => "open",
            PickState::Selected => "selected",
            PickState::Locked => "locked",
            PickState::AutoPicked => "auto_picked",
            PickState::Unfillable => "unfillable",
            PickState::Scored => "scored",
        }
    }

    /// Whether a member submission is still accepted in this state.
    pub fn accepts_submission(&self) -> bool {
        matches!(self, PickState::Open | PickState::Selected)
    }

    /// Whether the deadline machinery has already resolved this pick.
    pub fn is_resolved(&self) -> bool {
        !self.accepts_submission()
    }

    /// Whether no further state change is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PickState::Unfillable | PickState::Scored)
    }

    /// Whether the state may move to `next`. Exhaustive: the only legal
    /// moves are re-selection before the deadline, the deadline
    /// resolutions, and the scoring attribution afterwards.
    pub fn can_transition_to(&self, next: PickState) -> bool {
        use PickState::*;
        match (self, next) {
            (Open, Selected) => true,
            (Open, AutoPicked) => true,
            (Open, Unfillable) => true,
            (Selected, Selected) => true, // re-submission overwrites
            (Selected, Locked) => true,
            (Locked, Scored) => true,
            (AutoPicked, Scored) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PickState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A season of the show; the grouping key for episodes, castaways, and
/// scoring rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Season {
    pub id: i64,
    pub name: String,
    pub year: i32,
}

/// A single episode. `picks_lock_at` is the authoritative submission
/// deadline and is never after `airs_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: i64,
    pub season_id: i64,
    /// Sequence number within the season, strictly increasing.
    pub number: u32,
    pub airs_at: DateTime<Utc>,
    pub picks_lock_at: DateTime<Utc>,
    /// Set once scoring events are finalized; frozen afterwards.
    pub is_final: bool,
}

impl Episode {
    /// Whether pick submissions are closed at `now`.
    pub fn picks_locked(&self, now: DateTime<Utc>) -> bool {
        now >= self.picks_lock_at
    }
}

/// A contestant who can be drafted and picked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Castaway {
    pub id: i64,
    pub season_id: i64,
    pub name: String,
    pub status: CastawayStatus,
}

/// A league: a group of members playing against each other over one season.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct League {
    pub id: i64,
    pub season_id: i64,
    pub name: String,
}

/// A league member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: i64,
    pub league_id: i64,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
}
