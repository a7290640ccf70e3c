// Scoring finalization: attribute episode points to resolved picks.

use anyhow::{anyhow, Result};
use serde::Serialize;
use tracing::{info, warn};

use super::MemberFailure;
use crate::db::Database;

/// One member's realized points for the finalized episode — the weekly
/// results view.
#[derive(Debug, Clone, Serialize)]
pub struct MemberPoints {
    pub league_id: i64,
    pub member_id: i64,
    pub points: i64,
}

/// Aggregate result of finalizing one episode's scoring.
#[derive(Debug, Serialize)]
pub struct FinalizeOutcome {
    pub episode_id: i64,
    pub scored: usize,
    pub member_points: Vec<MemberPoints>,
    pub failures: Vec<MemberFailure>,
}

/// Finalize an episode: freeze its scoring events and attribute point
/// totals to every `locked` and `auto_picked` pick, moving them to
/// `scored`.
///
/// Safe to re-run after a scoring correction: already-`scored` picks are
/// recomputed and their totals overwritten, never accumulated. Each pick
/// is processed independently, so one member's failure is reported in
/// the outcome while the rest complete; an aborted run can simply be
/// retried from scratch. `unfillable` picks are untouched and contribute
/// nothing.
pub fn finalize_episode(db: &Database, episode_id: i64) -> Result<FinalizeOutcome> {
    db.mark_episode_final(episode_id)?;

    let mut outcome = FinalizeOutcome {
        episode_id,
        scored: 0,
        member_points: Vec::new(),
        failures: Vec::new(),
    };

    for pick in db.picks_awaiting_score(episode_id)? {
        let result = (|| -> Result<i64> {
            let castaway_id = pick
                .castaway_id
                .ok_or_else(|| anyhow!("resolved pick {} has no castaway", pick.id))?;
            let total = db.castaway_episode_points(episode_id, castaway_id)?;
            db.set_pick_scored(pick.id, total)?;
            Ok(total)
        })();

        match result {
            Ok(points) => {
                outcome.scored += 1;
                outcome.member_points.push(MemberPoints {
                    league_id: pick.league_id,
                    member_id: pick.member_id,
                    points,
                });
            }
            Err(e) => {
                warn!(member_id = pick.member_id, pick_id = pick.id, "failed to score pick: {e:#}");
                outcome.failures.push(MemberFailure {
                    member_id: pick.member_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        episode_id,
        scored = outcome.scored,
        failures = outcome.failures.len(),
        "episode scoring finalized"
    );
    Ok(outcome)
}
