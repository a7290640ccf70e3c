// Integration tests for the league core.
//
// These tests exercise the full pick lifecycle end-to-end using the
// library crate's public API: drafting rosters, submitting picks,
// processing the lock deadline, auto-picking, recording scoring events,
// finalizing episodes, and ranking the league table.

use chrono::{DateTime, Duration, Utc};

use castaway_league::db::Database;
use castaway_league::model::{CastawayStatus, PickState};
use castaway_league::picks::pick::{submit_pick, PickError};
use castaway_league::picks::roster;
use castaway_league::scoring::engine::{record_events, EventEntry};
use castaway_league::scoring::standings;
use castaway_league::tasks::deadline::process_episode_deadline;
use castaway_league::tasks::finalize::finalize_episode;

// ===========================================================================
// Test helpers
// ===========================================================================

fn ts(s: &str) -> DateTime<Utc> {
    s.parse().expect("valid test timestamp")
}

/// A fully seeded league: one season, two episodes, three members, and
/// six castaways drafted two per member in ranked order.
struct Fixture {
    db: Database,
    season: i64,
    episodes: Vec<i64>,
    league: i64,
    members: Vec<i64>,
    castaways: Vec<i64>,
    rules: Rules,
}

struct Rules {
    immunity: i64,  // +5 challenge
    survived: i64,  // +2 tribal
    voted_out: i64, // -5 tribal
}

const E1_LOCK: &str = "2026-03-04T23:00:00Z";
const E2_LOCK: &str = "2026-03-11T23:00:00Z";

fn fixture() -> Fixture {
    let db = Database::open(":memory:").expect("in-memory database should open");

    let season = db.create_season("Season 48", 2026).unwrap();
    let e1 = db
        .create_episode(season, 1, ts("2026-03-05T01:00:00Z"), ts(E1_LOCK))
        .unwrap();
    let e2 = db
        .create_episode(season, 2, ts("2026-03-12T01:00:00Z"), ts(E2_LOCK))
        .unwrap();

    let league = db.create_league(season, "Tribal Treasury").unwrap();
    let members = vec![
        db.add_member(league, "Quinn", ts("2026-02-01T00:00:00Z")).unwrap(),
        db.add_member(league, "Sasha", ts("2026-02-02T00:00:00Z")).unwrap(),
        db.add_member(league, "Pat", ts("2026-02-03T00:00:00Z")).unwrap(),
    ];

    let names = ["Aurora", "Briggs", "Calla", "Dune", "Ember", "Flint"];
    let castaways: Vec<i64> = names
        .iter()
        .map(|n| db.create_castaway(season, n).unwrap())
        .collect();

    // Each member drafts two castaways, ranked 1 and 2.
    for (i, member) in members.iter().enumerate() {
        for rank in 0..2 {
            let castaway = castaways[i * 2 + rank];
            let drafted_at = ts("2026-02-10T00:00:00Z") + Duration::minutes((i * 2 + rank) as i64);
            roster::draft_castaway(&db, league, *member, castaway, Some(rank as u32 + 1), drafted_at)
                .unwrap();
        }
    }

    let rules = Rules {
        immunity: db
            .upsert_rule(season, "immunity_win", "Wins individual immunity", "challenge", 5, true)
            .unwrap(),
        survived: db
            .upsert_rule(season, "votes_survived", "Receives votes but survives", "tribal", 2, true)
            .unwrap(),
        voted_out: db
            .upsert_rule(season, "voted_out", "Voted out", "tribal", -5, true)
            .unwrap(),
    };

    Fixture {
        db,
        season,
        episodes: vec![e1, e2],
        league,
        members,
        castaways,
        rules,
    }
}

// ===========================================================================
// Pick lifecycle
// ===========================================================================

#[test]
fn full_episode_lifecycle() {
    let f = fixture();
    let episode = f.episodes[0];

    // Quinn selects castaway A at T-1h; Sasha never selects; Pat selects
    // then changes their mind.
    submit_pick(&f.db, ts("2026-03-04T22:00:00Z"), f.league, f.members[0], episode, f.castaways[0])
        .unwrap();
    submit_pick(&f.db, ts("2026-03-04T20:00:00Z"), f.league, f.members[2], episode, f.castaways[4])
        .unwrap();
    submit_pick(&f.db, ts("2026-03-04T21:00:00Z"), f.league, f.members[2], episode, f.castaways[5])
        .unwrap();

    // At T the deadline trigger fires.
    let outcome = process_episode_deadline(&f.db, ts(E1_LOCK), episode).unwrap();
    assert_eq!(outcome.locked, 2);
    assert_eq!(outcome.auto_picked, 1);
    assert_eq!(outcome.unfillable, 0);
    assert!(outcome.failures.is_empty());

    // Quinn kept A; Pat kept the later selection; Sasha was filled with
    // her top-ranked castaway.
    let quinn = f.db.pick_row(f.league, f.members[0], episode).unwrap().unwrap();
    assert_eq!((quinn.state, quinn.castaway_id), (PickState::Locked, Some(f.castaways[0])));
    let pat = f.db.pick_row(f.league, f.members[2], episode).unwrap().unwrap();
    assert_eq!((pat.state, pat.castaway_id), (PickState::Locked, Some(f.castaways[5])));
    let sasha = f.db.pick_row(f.league, f.members[1], episode).unwrap().unwrap();
    assert_eq!((sasha.state, sasha.castaway_id), (PickState::AutoPicked, Some(f.castaways[2])));

    // Scoring: A wins immunity and survives votes; Sasha's auto-picked
    // castaway is voted out.
    let sheet = record_events(
        &f.db,
        episode,
        &[
            EventEntry { castaway_id: f.castaways[0], rule_id: f.rules.immunity, quantity: 1 },
            EventEntry { castaway_id: f.castaways[0], rule_id: f.rules.survived, quantity: 1 },
            EventEntry { castaway_id: f.castaways[2], rule_id: f.rules.voted_out, quantity: 1 },
        ],
    )
    .unwrap();
    assert!(sheet.rejected.is_empty());

    let finalize = finalize_episode(&f.db, episode).unwrap();
    assert_eq!(finalize.scored, 3);

    // Standings: Quinn +7, Pat 0, Sasha -5.
    let table = standings::rank(&f.db, f.league).unwrap();
    let rows: Vec<(i64, i64, u32)> = table.iter().map(|r| (r.member_id, r.points, r.rank)).collect();
    assert_eq!(
        rows,
        vec![
            (f.members[0], 7, 1),
            (f.members[2], 0, 2),
            (f.members[1], -5, 3),
        ]
    );
}

#[test]
fn submission_window_and_eligibility_errors() {
    let f = fixture();
    let episode = f.episodes[0];

    // After the deadline: window closed, regardless of eligibility.
    let late = submit_pick(&f.db, ts("2026-03-04T23:00:01Z"), f.league, f.members[0], episode, f.castaways[0]);
    assert!(matches!(late, Err(PickError::WindowClosed { .. })));

    // Someone else's castaway is not eligible.
    let foreign = submit_pick(&f.db, ts("2026-03-04T20:00:00Z"), f.league, f.members[0], episode, f.castaways[2]);
    assert!(matches!(foreign, Err(PickError::CastawayNotEligible { .. })));

    // An eliminated castaway on the member's own roster is not eligible.
    f.db.set_castaway_status(f.castaways[0], CastawayStatus::Eliminated).unwrap();
    let gone = submit_pick(&f.db, ts("2026-03-04T20:00:00Z"), f.league, f.members[0], episode, f.castaways[0]);
    assert!(matches!(gone, Err(PickError::CastawayNotEligible { .. })));

    // The second castaway still works.
    submit_pick(&f.db, ts("2026-03-04T20:00:00Z"), f.league, f.members[0], episode, f.castaways[1])
        .unwrap();
}

#[test]
fn deadline_processing_is_idempotent_under_retry() {
    let f = fixture();
    let episode = f.episodes[0];

    submit_pick(&f.db, ts("2026-03-04T22:00:00Z"), f.league, f.members[0], episode, f.castaways[0])
        .unwrap();

    let first = process_episode_deadline(&f.db, ts(E1_LOCK), episode).unwrap();
    assert_eq!((first.locked, first.auto_picked), (1, 2));

    // A retried scheduled run finds nothing to do.
    let retry = process_episode_deadline(&f.db, ts("2026-03-04T23:10:00Z"), episode).unwrap();
    assert!(retry.is_quiet());

    // Auto-picks resolved the same way both times.
    let sasha = f.db.pick_row(f.league, f.members[1], episode).unwrap().unwrap();
    assert_eq!(sasha.castaway_id, Some(f.castaways[2]));
}

#[test]
fn member_with_empty_roster_is_unfillable() {
    let f = fixture();
    let episode = f.episodes[0];

    // Sasha's whole roster is out of the game by the deadline.
    f.db.set_castaway_status(f.castaways[2], CastawayStatus::Eliminated).unwrap();
    f.db.set_castaway_status(f.castaways[3], CastawayStatus::Eliminated).unwrap();

    let outcome = process_episode_deadline(&f.db, ts(E1_LOCK), episode).unwrap();
    assert_eq!(outcome.unfillable, 1);
    assert_eq!(outcome.auto_picked, 2);

    let sasha = f.db.pick_row(f.league, f.members[1], episode).unwrap().unwrap();
    assert_eq!(sasha.state, PickState::Unfillable);
    assert!(sasha.castaway_id.is_none());

    // Unfillable picks never gain points, even after finalization.
    finalize_episode(&f.db, episode).unwrap();
    let sasha = f.db.pick_row(f.league, f.members[1], episode).unwrap().unwrap();
    assert_eq!(sasha.state, PickState::Unfillable);
    assert!(sasha.points.is_none());
}

// ===========================================================================
// Scoring corrections and standings
// ===========================================================================

#[test]
fn correction_overwrites_standings() {
    let f = fixture();
    let episode = f.episodes[0];

    submit_pick(&f.db, ts("2026-03-04T22:00:00Z"), f.league, f.members[0], episode, f.castaways[0])
        .unwrap();
    process_episode_deadline(&f.db, ts(E1_LOCK), episode).unwrap();

    record_events(
        &f.db,
        episode,
        &[EventEntry { castaway_id: f.castaways[0], rule_id: f.rules.survived, quantity: 1 }],
    )
    .unwrap();
    finalize_episode(&f.db, episode).unwrap();
    let before = standings::rank(&f.db, f.league).unwrap();
    assert_eq!(before[0].points, 2);

    // The scorer missed an immunity win: correct the event set and
    // re-finalize. Totals are replaced, not added to.
    f.db.replace_event(episode, f.castaways[0], f.rules.immunity, 1, 5).unwrap();
    finalize_episode(&f.db, episode).unwrap();
    finalize_episode(&f.db, episode).unwrap();

    let after = standings::rank(&f.db, f.league).unwrap();
    assert_eq!(after[0].member_id, f.members[0]);
    assert_eq!(after[0].points, 7);
}

#[test]
fn cumulative_points_span_episodes() {
    let f = fixture();

    for (i, &episode) in f.episodes.iter().enumerate() {
        let lock = if i == 0 { E1_LOCK } else { E2_LOCK };
        submit_pick(
            &f.db,
            ts(lock) - Duration::hours(1),
            f.league,
            f.members[0],
            episode,
            f.castaways[0],
        )
        .unwrap();
        process_episode_deadline(&f.db, ts(lock), episode).unwrap();
        record_events(
            &f.db,
            episode,
            &[EventEntry { castaway_id: f.castaways[0], rule_id: f.rules.immunity, quantity: 1 }],
        )
        .unwrap();
        finalize_episode(&f.db, episode).unwrap();
    }

    let table = standings::rank(&f.db, f.league).unwrap();
    assert_eq!(table[0].member_id, f.members[0]);
    assert_eq!(table[0].points, 10);
}

#[test]
fn tie_break_prefers_fewer_negative_events_then_tenure() {
    let f = fixture();
    let episode = f.episodes[0];

    // Quinn and Sasha both land on 47 points, but Sasha's castaway took
    // a negative event along the way; Quinn ranks higher. Pat also hits
    // 47 with a clean sheet and loses the second tie-break on join time.
    submit_pick(&f.db, ts("2026-03-04T22:00:00Z"), f.league, f.members[0], episode, f.castaways[0]).unwrap();
    submit_pick(&f.db, ts("2026-03-04T22:00:00Z"), f.league, f.members[1], episode, f.castaways[2]).unwrap();
    submit_pick(&f.db, ts("2026-03-04T22:00:00Z"), f.league, f.members[2], episode, f.castaways[4]).unwrap();
    process_episode_deadline(&f.db, ts(E1_LOCK), episode).unwrap();

    f.db.replace_event(episode, f.castaways[2], f.rules.voted_out, 1, -5).unwrap();
    finalize_episode(&f.db, episode).unwrap();

    // Force the 47-point tie through stored totals.
    for member in &f.members {
        let pick = f.db.pick_row(f.league, *member, episode).unwrap().unwrap();
        f.db.set_pick_scored(pick.id, 47).unwrap();
    }

    let table = standings::rank(&f.db, f.league).unwrap();
    let order: Vec<i64> = table.iter().map(|r| r.member_id).collect();
    assert_eq!(order, vec![f.members[0], f.members[2], f.members[1]]);
    assert_eq!(
        table.iter().map(|r| r.rank).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}

// ===========================================================================
// Scoring engine edge cases through the public API
// ===========================================================================

#[test]
fn duplicate_event_rejected_not_summed() {
    let f = fixture();
    let episode = f.episodes[0];

    let sheet = record_events(
        &f.db,
        episode,
        &[
            EventEntry { castaway_id: f.castaways[0], rule_id: f.rules.survived, quantity: 1 },
            EventEntry { castaway_id: f.castaways[0], rule_id: f.rules.survived, quantity: 1 },
        ],
    )
    .unwrap();

    assert_eq!(sheet.rejected.len(), 1);
    assert_eq!(sheet.totals.len(), 1);
    assert_eq!(sheet.totals[0].total, 2);
}

#[test]
fn event_totals_ignore_batch_order() {
    let f = fixture();

    let batch = vec![
        EventEntry { castaway_id: f.castaways[0], rule_id: f.rules.immunity, quantity: 1 },
        EventEntry { castaway_id: f.castaways[0], rule_id: f.rules.survived, quantity: 2 },
        EventEntry { castaway_id: f.castaways[1], rule_id: f.rules.voted_out, quantity: 1 },
    ];

    // Episode 1 gets the batch forward, episode 2 gets it reversed.
    record_events(&f.db, f.episodes[0], &batch).unwrap();
    let mut reversed = batch;
    reversed.reverse();
    record_events(&f.db, f.episodes[1], &reversed).unwrap();

    let t1 = castaway_league::scoring::engine::episode_totals(&f.db, f.episodes[0]).unwrap();
    let t2 = castaway_league::scoring::engine::episode_totals(&f.db, f.episodes[1]).unwrap();
    let sum1: Vec<(i64, i64)> = t1.iter().map(|s| (s.castaway_id, s.total)).collect();
    let sum2: Vec<(i64, i64)> = t2.iter().map(|s| (s.castaway_id, s.total)).collect();
    assert_eq!(sum1, sum2);
}

#[test]
fn roster_lifecycle_feeds_eligibility() {
    let f = fixture();
    let episode = f.episodes[0];

    // Quinn drops castaway B, then can't pick it.
    roster::drop_castaway(&f.db, f.league, f.members[0], f.castaways[1], ts("2026-03-01T00:00:00Z"))
        .unwrap();
    let result = submit_pick(
        &f.db,
        ts("2026-03-04T20:00:00Z"),
        f.league,
        f.members[0],
        episode,
        f.castaways[1],
    );
    assert!(matches!(result, Err(PickError::CastawayNotEligible { .. })));

    // Re-drafting it (new entry, never a reactivation) restores
    // eligibility under the new ranking.
    roster::draft_castaway(&f.db, f.league, f.members[0], f.castaways[1], Some(1), ts("2026-03-02T00:00:00Z"))
        .unwrap();
    submit_pick(&f.db, ts("2026-03-04T20:00:00Z"), f.league, f.members[0], episode, f.castaways[1])
        .unwrap();
}

#[test]
fn season_isolation_between_leagues() {
    let f = fixture();

    // A second league on the same season resolves independently.
    let league_b = f.db.create_league(f.season, "Outcasts").unwrap();
    let solo = f.db.add_member(league_b, "Indy", ts("2026-02-05T00:00:00Z")).unwrap();
    let spare = f.db.create_castaway(f.season, "Gale").unwrap();
    roster::draft_castaway(&f.db, league_b, solo, spare, Some(1), ts("2026-02-11T00:00:00Z"))
        .unwrap();

    let episode = f.episodes[0];
    let outcome = process_episode_deadline(&f.db, ts(E1_LOCK), episode).unwrap();
    // Three members in league A plus one in league B, all auto-picked.
    assert_eq!(outcome.auto_picked, 4);

    let indy = f.db.pick_row(league_b, solo, episode).unwrap().unwrap();
    assert_eq!(indy.castaway_id, Some(spare));

    // League B standings contain only its own member.
    finalize_episode(&f.db, episode).unwrap();
    let table = standings::rank(&f.db, league_b).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table[0].member_id, solo);
}
