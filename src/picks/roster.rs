// Roster reads and draft/drop mutations.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::Database;
use crate::model::CastawayStatus;

/// One castaway on a member's active roster, in auto-pick preference order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterSlot {
    pub castaway_id: i64,
    pub name: String,
    pub status: CastawayStatus,
    /// The member's draft ranking for this castaway (1 = first pick).
    /// `None` when the entry was added without a ranking signal.
    pub draft_position: Option<u32>,
    pub drafted_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("castaway {castaway_id} is already on the member's roster")]
    AlreadyOnRoster { castaway_id: i64 },

    #[error("castaway {castaway_id} does not belong to the league's season")]
    WrongSeason { castaway_id: i64 },

    #[error("castaway {castaway_id} is {status} and cannot be drafted")]
    NotPlayable {
        castaway_id: i64,
        status: CastawayStatus,
    },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// The member's currently playable castaways: non-dropped entries whose
/// castaway is still `active`. Castaways eliminated (or crowned) since the
/// draft are excluded even if the member never dropped them, since a pick
/// can only target a castaway who is still in the game.
pub fn active_castaways(
    db: &Database,
    league_id: i64,
    member_id: i64,
) -> Result<Vec<RosterSlot>> {
    db.active_roster(league_id, member_id)
}

/// Add a castaway to a member's roster. Rejects castaways from another
/// season, castaways already out of the game, and duplicates of a
/// currently held castaway. A previously dropped castaway may be drafted
/// again; that creates a new entry rather than reviving the old one.
pub fn draft_castaway(
    db: &Database,
    league_id: i64,
    member_id: i64,
    castaway_id: i64,
    draft_position: Option<u32>,
    now: DateTime<Utc>,
) -> Result<i64, RosterError> {
    let league = db.league(league_id)?;
    let castaway = db.castaway(castaway_id)?;
    if castaway.season_id != league.season_id {
        return Err(RosterError::WrongSeason { castaway_id });
    }
    if !castaway.status.is_playable() {
        return Err(RosterError::NotPlayable {
            castaway_id,
            status: castaway.status,
        });
    }
    if db.has_active_roster_entry(league_id, member_id, castaway_id)? {
        return Err(RosterError::AlreadyOnRoster { castaway_id });
    }
    Ok(db.insert_roster_entry(league_id, member_id, castaway_id, draft_position, now)?)
}

/// Drop a castaway from a member's roster. Returns `false` if the member
/// held no active entry for the castaway.
pub fn drop_castaway(
    db: &Database,
    league_id: i64,
    member_id: i64,
    castaway_id: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    db.drop_roster_entry(league_id, member_id, castaway_id, now)
}
