// League standings derived from scored picks.

use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;

use crate::db::Database;

/// One row of the ranked league table.
#[derive(Debug, Clone, Serialize)]
pub struct StandingRow {
    pub member_id: i64,
    pub display_name: String,
    /// Cumulative realized points across all scored picks.
    pub points: i64,
    /// 1-based rank, strict (no shared ranks; see tie-break below).
    pub rank: u32,
}

/// Compute the ranked league table.
///
/// Points are the sum of each member's `scored` weekly pick totals.
/// Ties are broken by, in order: fewer negative-point events attributed
/// through the member's scored picks (rewarding consistency), earlier
/// league join time (rewarding tenure), then member id. The order is
/// total, so ranks are strict 1..n and recomputation is deterministic.
pub fn rank(db: &Database, league_id: i64) -> Result<Vec<StandingRow>> {
    let members = db.members_of_league(league_id)?;
    let points: HashMap<i64, i64> = db.scored_points_by_member(league_id)?.into_iter().collect();
    let negatives: HashMap<i64, i64> = db.negative_event_counts(league_id)?.into_iter().collect();

    let mut table: Vec<(i64, String, i64, i64, chrono::DateTime<chrono::Utc>)> = members
        .into_iter()
        .map(|m| {
            let pts = points.get(&m.id).copied().unwrap_or(0);
            let neg = negatives.get(&m.id).copied().unwrap_or(0);
            (m.id, m.display_name, pts, neg, m.joined_at)
        })
        .collect();

    table.sort_by(|a, b| {
        b.2.cmp(&a.2) // points, descending
            .then(a.3.cmp(&b.3)) // negative events, ascending
            .then(a.4.cmp(&b.4)) // joined_at, ascending
            .then(a.0.cmp(&b.0)) // member id, ascending
    });

    Ok(table
        .into_iter()
        .enumerate()
        .map(|(i, (member_id, display_name, points, _, _))| StandingRow {
            member_id,
            display_name,
            points,
            rank: i as u32 + 1,
        })
        .collect())
}
