// Scoring event validation and per-castaway episode totals.

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::db::Database;

/// A stored scoring event: one rule applied to one castaway in one
/// episode, with a quantity. `points` is frozen at creation
/// (`rule.points * quantity`), so later rule edits never change it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringEvent {
    pub episode_id: i64,
    pub castaway_id: i64,
    pub rule_id: i64,
    pub code: String,
    pub category: String,
    pub quantity: u32,
    pub points: i64,
}

/// One entry in a scoring submission batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEntry {
    pub castaway_id: i64,
    pub rule_id: i64,
    pub quantity: u32,
}

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("unknown scoring rule {rule_id}")]
    UnknownRule { rule_id: i64 },

    #[error("rule `{code}` is not active")]
    InactiveRule { code: String },

    #[error("rule `{code}` belongs to a different season")]
    WrongSeasonRule { code: String },

    #[error("unknown castaway {castaway_id} for this episode's season")]
    UnknownCastaway { castaway_id: i64 },

    #[error("quantity must be at least 1, got {quantity}")]
    InvalidQuantity { quantity: u32 },

    #[error("duplicate event for castaway {castaway_id} and rule {rule_id}; use quantity instead")]
    DuplicateEvent { castaway_id: i64, rule_id: i64 },

    #[error("episode {episode_id} is final; scoring events are frozen")]
    EpisodeFinal { episode_id: i64 },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// An entry dropped from a batch, with the reason it was rejected.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedEvent {
    pub castaway_id: i64,
    pub rule_id: i64,
    pub reason: String,
}

/// Per-category subtotal for one castaway's episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryPoints {
    pub category: String,
    pub points: i64,
}

/// One castaway's episode score: per-category subtotals for display plus
/// the overall total.
#[derive(Debug, Clone, Serialize)]
pub struct CastawayScore {
    pub castaway_id: i64,
    pub by_category: Vec<CategoryPoints>,
    pub total: i64,
}

/// Result of a scoring batch: recomputed totals plus the entries that
/// were rejected (the rest of the batch still applied).
#[derive(Debug, Serialize)]
pub struct ScoreSheet {
    pub totals: Vec<CastawayScore>,
    pub rejected: Vec<RejectedEvent>,
}

/// Record a batch of scoring events for an episode.
///
/// Each entry is validated independently; an invalid entry is rejected
/// and reported while the rest of the batch applies. A repeated
/// (castaway, rule) tuple within one batch is a duplicate — quantity is
/// the only way to represent repetition. Across batches an entry
/// overwrites the stored event for its tuple, which is the correction
/// path after a scoring error. Once the episode is final the whole batch
/// is refused.
pub fn record_events(
    db: &Database,
    episode_id: i64,
    entries: &[EventEntry],
) -> Result<ScoreSheet, ScoringError> {
    let episode = db.episode(episode_id)?;
    if episode.is_final {
        return Err(ScoringError::EpisodeFinal { episode_id });
    }

    let mut seen: HashSet<(i64, i64)> = HashSet::new();
    let mut rejected = Vec::new();

    for entry in entries {
        match validate_entry(db, episode.season_id, entry, &mut seen) {
            Ok(rule_points) => {
                let points = rule_points * i64::from(entry.quantity);
                db.replace_event(
                    episode_id,
                    entry.castaway_id,
                    entry.rule_id,
                    entry.quantity,
                    points,
                )?;
            }
            Err(ScoringError::Storage(e)) => return Err(ScoringError::Storage(e)),
            Err(e) => {
                warn!(
                    castaway_id = entry.castaway_id,
                    rule_id = entry.rule_id,
                    "rejected scoring event: {e}"
                );
                rejected.push(RejectedEvent {
                    castaway_id: entry.castaway_id,
                    rule_id: entry.rule_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(ScoreSheet {
        totals: episode_totals(db, episode_id)?,
        rejected,
    })
}

/// Validate one batch entry; returns the rule's per-unit points on success.
fn validate_entry(
    db: &Database,
    season_id: i64,
    entry: &EventEntry,
    seen: &mut HashSet<(i64, i64)>,
) -> Result<i64, ScoringError> {
    if entry.quantity < 1 {
        return Err(ScoringError::InvalidQuantity {
            quantity: entry.quantity,
        });
    }
    let rule = db
        .rule(entry.rule_id)?
        .ok_or(ScoringError::UnknownRule {
            rule_id: entry.rule_id,
        })?;
    if rule.season_id != season_id {
        return Err(ScoringError::WrongSeasonRule { code: rule.code });
    }
    if !rule.active {
        return Err(ScoringError::InactiveRule { code: rule.code });
    }
    if !db.castaway_in_season(entry.castaway_id, season_id)? {
        return Err(ScoringError::UnknownCastaway {
            castaway_id: entry.castaway_id,
        });
    }
    if !seen.insert((entry.castaway_id, entry.rule_id)) {
        return Err(ScoringError::DuplicateEvent {
            castaway_id: entry.castaway_id,
            rule_id: entry.rule_id,
        });
    }
    Ok(rule.points)
}

/// Delete every event for an episode so scoring can be re-entered from
/// scratch. Refused once the episode is final.
pub fn clear_events(db: &Database, episode_id: i64) -> Result<usize, ScoringError> {
    let episode = db.episode(episode_id)?;
    if episode.is_final {
        return Err(ScoringError::EpisodeFinal { episode_id });
    }
    Ok(db.delete_events_for_episode(episode_id)?)
}

/// Per-castaway totals for an episode, grouped by rule category.
///
/// Recomputed from the stored events every time; the grouping maps make
/// the result independent of event insertion order.
pub fn episode_totals(db: &Database, episode_id: i64) -> Result<Vec<CastawayScore>> {
    let events = db.events_for_episode(episode_id)?;

    let mut by_castaway: BTreeMap<i64, BTreeMap<String, i64>> = BTreeMap::new();
    for event in &events {
        *by_castaway
            .entry(event.castaway_id)
            .or_default()
            .entry(event.category.clone())
            .or_default() += event.points;
    }

    Ok(by_castaway
        .into_iter()
        .map(|(castaway_id, categories)| {
            let total = categories.values().sum();
            CastawayScore {
                castaway_id,
                by_category: categories
                    .into_iter()
                    .map(|(category, points)| CategoryPoints { category, points })
                    .collect(),
                total,
            }
        })
        .collect())
}
