// Weekly pick records and member-facing submission.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::db::Database;
use crate::model::PickState;
use crate::picks::roster;

/// A member's weekly selection for one episode — the single row per
/// (league, member, episode).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyPick {
    pub id: i64,
    pub league_id: i64,
    pub member_id: i64,
    pub episode_id: i64,
    /// The chosen castaway. `None` while the pick is open and for
    /// unfillable picks.
    pub castaway_id: Option<i64>,
    pub state: PickState,
    pub submitted_at: Option<DateTime<Utc>>,
    /// Realized point total, populated only after scoring finalization.
    pub points: Option<i64>,
}

#[derive(Debug, Error)]
pub enum PickError {
    #[error("pick window for episode {episode_id} closed at {locks_at}")]
    WindowClosed {
        episode_id: i64,
        locks_at: DateTime<Utc>,
    },

    #[error("castaway {castaway_id} is not on the member's active roster")]
    CastawayNotEligible { castaway_id: i64 },

    #[error("pick for episode {episode_id} is already {state} and cannot change")]
    AlreadyResolved {
        episode_id: i64,
        state: PickState,
    },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Confirmation returned to the submitting member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickReceipt {
    pub pick_id: i64,
    pub state: PickState,
}

/// Submit (or change) a member's pick for an episode.
///
/// Accepted only while `now` is strictly before the episode's lock
/// deadline and the castaway is on the member's active roster. Each
/// submission overwrites the previous selection — there is never more
/// than one pick row per (league, member, episode). A pick the deadline
/// machinery has already resolved is immutable.
pub fn submit_pick(
    db: &Database,
    now: DateTime<Utc>,
    league_id: i64,
    member_id: i64,
    episode_id: i64,
    castaway_id: i64,
) -> Result<PickReceipt, PickError> {
    let episode = db.episode(episode_id)?;
    let league = db.league(league_id)?;
    if episode.season_id != league.season_id {
        return Err(anyhow!(
            "episode {episode_id} does not belong to league {league_id}'s season"
        )
        .into());
    }

    if episode.picks_locked(now) {
        return Err(PickError::WindowClosed {
            episode_id,
            locks_at: episode.picks_lock_at,
        });
    }

    // A resolved pick should be unreachable here while the deadline is in
    // the future, but a clock-skewed caller racing the lock pass can see
    // one; reject rather than clobber.
    if let Some(existing) = db.pick_row(league_id, member_id, episode_id)? {
        if existing.state.is_resolved() {
            return Err(PickError::AlreadyResolved {
                episode_id,
                state: existing.state,
            });
        }
    }

    let eligible = roster::active_castaways(db, league_id, member_id)?
        .iter()
        .any(|slot| slot.castaway_id == castaway_id);
    if !eligible {
        return Err(PickError::CastawayNotEligible { castaway_id });
    }

    let pick_id =
        db.upsert_selected_pick(league_id, member_id, episode_id, castaway_id, now)?;
    debug!(
        pick_id,
        member_id, episode_id, castaway_id, "pick selection recorded"
    );
    Ok(PickReceipt {
        pick_id,
        state: PickState::Selected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().expect("valid test timestamp")
    }

    const LOCK_AT: &str = "2026-03-04T23:00:00Z";

    /// Season with one episode locking at `LOCK_AT`, one league, one
    /// member holding two ranked castaways.
    fn seed(db: &Database) -> (i64, i64, i64, Vec<i64>) {
        let season = db.create_season("Season 48", 2026).unwrap();
        let episode = db
            .create_episode(season, 1, ts("2026-03-05T01:00:00Z"), ts(LOCK_AT))
            .unwrap();
        let league = db.create_league(season, "Tribal Treasury").unwrap();
        let member = db
            .add_member(league, "Quinn", ts("2026-02-01T00:00:00Z"))
            .unwrap();
        let c1 = db.create_castaway(season, "Aurora").unwrap();
        let c2 = db.create_castaway(season, "Briggs").unwrap();
        roster::draft_castaway(db, league, member, c1, Some(1), ts("2026-02-10T00:00:00Z"))
            .unwrap();
        roster::draft_castaway(db, league, member, c2, Some(2), ts("2026-02-10T00:01:00Z"))
            .unwrap();
        (episode, league, member, vec![c1, c2])
    }

    #[test]
    fn submit_before_deadline_succeeds() {
        let db = test_db();
        let (episode, league, member, castaways) = seed(&db);

        let receipt = submit_pick(
            &db,
            ts("2026-03-04T22:00:00Z"),
            league,
            member,
            episode,
            castaways[0],
        )
        .unwrap();
        assert_eq!(receipt.state, PickState::Selected);

        let pick = db.pick_row(league, member, episode).unwrap().unwrap();
        assert_eq!(pick.castaway_id, Some(castaways[0]));
        assert_eq!(pick.state, PickState::Selected);
    }

    #[test]
    fn submit_at_deadline_rejected() {
        let db = test_db();
        let (episode, league, member, castaways) = seed(&db);

        // Exactly at the deadline counts as closed.
        let result = submit_pick(&db, ts(LOCK_AT), league, member, episode, castaways[0]);
        assert!(matches!(result, Err(PickError::WindowClosed { .. })));

        let result = submit_pick(
            &db,
            ts("2026-03-04T23:30:00Z"),
            league,
            member,
            episode,
            castaways[0],
        );
        assert!(matches!(result, Err(PickError::WindowClosed { .. })));
    }

    #[test]
    fn submit_ineligible_castaway_rejected() {
        let db = test_db();
        let (episode, league, member, castaways) = seed(&db);

        // Not on the roster at all.
        let season = db.episode(episode).unwrap().season_id;
        let undrafted = db.create_castaway(season, "Calla").unwrap();
        let result = submit_pick(
            &db,
            ts("2026-03-04T22:00:00Z"),
            league,
            member,
            episode,
            undrafted,
        );
        assert!(matches!(result, Err(PickError::CastawayNotEligible { .. })));

        // On the roster but eliminated since the draft.
        db.set_castaway_status(castaways[0], crate::model::CastawayStatus::Eliminated)
            .unwrap();
        let result = submit_pick(
            &db,
            ts("2026-03-04T22:00:00Z"),
            league,
            member,
            episode,
            castaways[0],
        );
        assert!(matches!(result, Err(PickError::CastawayNotEligible { .. })));
    }

    #[test]
    fn resubmission_overwrites_single_row() {
        let db = test_db();
        let (episode, league, member, castaways) = seed(&db);

        submit_pick(&db, ts("2026-03-04T20:00:00Z"), league, member, episode, castaways[0])
            .unwrap();
        submit_pick(&db, ts("2026-03-04T21:00:00Z"), league, member, episode, castaways[1])
            .unwrap();

        let pick = db.pick_row(league, member, episode).unwrap().unwrap();
        assert_eq!(pick.castaway_id, Some(castaways[1]));
        assert_eq!(pick.submitted_at, Some(ts("2026-03-04T21:00:00Z")));
    }

    #[test]
    fn resolved_pick_rejects_submission() {
        let db = test_db();
        let (episode, league, member, castaways) = seed(&db);

        let receipt = submit_pick(
            &db,
            ts("2026-03-04T20:00:00Z"),
            league,
            member,
            episode,
            castaways[0],
        )
        .unwrap();
        db.lock_pick(receipt.pick_id).unwrap();

        // A caller whose clock still reads before the deadline cannot
        // change a locked pick.
        let result = submit_pick(
            &db,
            ts("2026-03-04T22:59:00Z"),
            league,
            member,
            episode,
            castaways[1],
        );
        assert!(matches!(
            result,
            Err(PickError::AlreadyResolved {
                state: PickState::Locked,
                ..
            })
        ));
    }

    #[test]
    fn wrong_league_episode_pairing_is_storage_error() {
        let db = test_db();
        let (episode, _, _, castaways) = seed(&db);
        let other_season = db.create_season("Season 49", 2027).unwrap();
        let other_league = db.create_league(other_season, "Other").unwrap();
        let other_member = db
            .add_member(other_league, "Pat", ts("2026-02-01T00:00:00Z"))
            .unwrap();

        let result = submit_pick(
            &db,
            ts("2026-03-04T20:00:00Z"),
            other_league,
            other_member,
            episode,
            castaways[0],
        );
        assert!(matches!(result, Err(PickError::Storage(_))));
    }
}
