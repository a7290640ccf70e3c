// Deadline processing: the lock pass and the auto-pick pass.
//
// Both passes are idempotent (state-guarded transitions) and isolate
// failures per member, so a retried scheduled run finishes whatever a
// crashed or partially failed run left behind without touching picks that
// already reached a terminal state.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::MemberFailure;
use crate::db::Database;
use crate::picks::roster;

/// Aggregate result of a deadline pass over one episode.
#[derive(Debug, Default, Serialize)]
pub struct DeadlineOutcome {
    pub locked: usize,
    pub auto_picked: usize,
    pub unfillable: usize,
    pub failures: Vec<MemberFailure>,
}

impl DeadlineOutcome {
    fn absorb(&mut self, other: DeadlineOutcome) {
        self.locked += other.locked;
        self.auto_picked += other.auto_picked;
        self.unfillable += other.unfillable;
        self.failures.extend(other.failures);
    }

    /// Whether the pass changed nothing and hit no failures (the steady
    /// state once an episode is fully resolved).
    pub fn is_quiet(&self) -> bool {
        self.locked == 0
            && self.auto_picked == 0
            && self.unfillable == 0
            && self.failures.is_empty()
    }
}

/// Lock every `selected` pick for an episode whose deadline has passed.
///
/// A no-op before the deadline. Each member's pick is transitioned
/// independently; a failed transition is recorded and does not block the
/// others. Re-running finds nothing in `selected` state and does nothing.
pub fn run_lock_pass(
    db: &Database,
    now: DateTime<Utc>,
    episode_id: i64,
) -> Result<DeadlineOutcome> {
    let episode = db.episode(episode_id)?;
    let mut outcome = DeadlineOutcome::default();
    if !episode.picks_locked(now) {
        debug!(episode_id, "lock pass invoked before deadline; skipping");
        return Ok(outcome);
    }

    for (pick_id, member_id) in db.selected_picks(episode_id)? {
        match db.lock_pick(pick_id) {
            Ok(true) => outcome.locked += 1,
            // Already resolved by an earlier or concurrent run.
            Ok(false) => {}
            Err(e) => {
                warn!(member_id, pick_id, "failed to lock pick: {e:#}");
                outcome.failures.push(MemberFailure {
                    member_id,
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(outcome)
}

/// Fill every still-open (or never-created) pick for an episode whose
/// deadline has passed.
///
/// The selection is deterministic: the member's top eligible castaway in
/// roster preference order (draft ranking, then draft time, then id). A
/// member with no eligible castaway left gets a terminal `unfillable`
/// pick with no castaway and no point contribution. Re-running resolves
/// the same members to the same castaways and skips resolved picks.
pub fn run_auto_pick_pass(
    db: &Database,
    now: DateTime<Utc>,
    episode_id: i64,
) -> Result<DeadlineOutcome> {
    let episode = db.episode(episode_id)?;
    let mut outcome = DeadlineOutcome::default();
    if !episode.picks_locked(now) {
        debug!(episode_id, "auto-pick pass invoked before deadline; skipping");
        return Ok(outcome);
    }

    for gap in db.unresolved_members(episode_id)? {
        let resolved = resolve_member(db, now, episode_id, gap.league_id, gap.member_id);
        match resolved {
            Ok(Resolution::AutoPicked(castaway_id)) => {
                debug!(
                    member_id = gap.member_id,
                    castaway_id, "auto-picked castaway at deadline"
                );
                outcome.auto_picked += 1;
            }
            Ok(Resolution::Unfillable) => {
                info!(
                    member_id = gap.member_id,
                    "no eligible castaway left; pick is unfillable"
                );
                outcome.unfillable += 1;
            }
            Ok(Resolution::AlreadyResolved) => {}
            Err(e) => {
                warn!(member_id = gap.member_id, "auto-pick failed: {e:#}");
                outcome.failures.push(MemberFailure {
                    member_id: gap.member_id,
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(outcome)
}

enum Resolution {
    AutoPicked(i64),
    Unfillable,
    /// Another run resolved the pick between the gap query and our write;
    /// the guarded write changed nothing, so it is not counted here.
    AlreadyResolved,
}

/// Resolve one member's missing pick with their top eligible castaway.
fn resolve_member(
    db: &Database,
    now: DateTime<Utc>,
    episode_id: i64,
    league_id: i64,
    member_id: i64,
) -> Result<Resolution> {
    let eligible = roster::active_castaways(db, league_id, member_id)?;
    let choice = eligible.first().map(|slot| slot.castaway_id);
    let applied = db.resolve_auto_pick(league_id, member_id, episode_id, choice, now)?;
    Ok(match (applied, choice) {
        (false, _) => Resolution::AlreadyResolved,
        (true, Some(castaway_id)) => Resolution::AutoPicked(castaway_id),
        (true, None) => Resolution::Unfillable,
    })
}

/// Run the lock pass followed by the auto-pick pass for one episode —
/// the body behind the external scheduler's deadline trigger. Returns
/// the merged outcome (`{locked, autoPicked, unfillable, failures}`).
pub fn process_episode_deadline(
    db: &Database,
    now: DateTime<Utc>,
    episode_id: i64,
) -> Result<DeadlineOutcome> {
    let mut outcome = run_lock_pass(db, now, episode_id)?;
    outcome.absorb(run_auto_pick_pass(db, now, episode_id)?);
    if !outcome.is_quiet() {
        info!(
            episode_id,
            locked = outcome.locked,
            auto_picked = outcome.auto_picked,
            unfillable = outcome.unfillable,
            failures = outcome.failures.len(),
            "episode deadline processed"
        );
    }
    Ok(outcome)
}
