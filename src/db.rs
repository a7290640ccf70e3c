// SQLite persistence layer for league, roster, pick, and scoring state.

use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::model::{Castaway, CastawayStatus, Episode, League, Member, PickState, Season};
use crate::picks::pick::WeeklyPick;
use crate::picks::roster::RosterSlot;
use crate::scoring::engine::ScoringEvent;
use crate::scoring::rules::ScoringRule;

/// SQLite-backed persistence for seasons, episodes, castaways, leagues,
/// rosters, weekly picks, scoring rules, and scoring events.
///
/// The schema is the enforcement point for the core data invariants:
/// one pick per (league, member, episode), one event per (episode,
/// castaway, rule), and at most one active roster entry per castaway and
/// member. State transitions are guarded in SQL (`WHERE state = ...`) so
/// retried scheduled runs are no-ops rather than corruption.
pub struct Database {
    conn: Mutex<Connection>,
}

/// A member whose pick for an episode is still open (or missing entirely)
/// after the lock deadline; the unit the auto-pick resolver operates on.
#[derive(Debug, Clone)]
pub struct PickGap {
    pub league_id: i64,
    pub member_id: i64,
    pub pick_id: Option<i64>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS seasons (
                id   INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                year INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS episodes (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                season_id     INTEGER NOT NULL REFERENCES seasons(id),
                number        INTEGER NOT NULL,
                airs_at       TEXT NOT NULL,
                picks_lock_at TEXT NOT NULL,
                is_final      INTEGER NOT NULL DEFAULT 0,
                UNIQUE(season_id, number)
            );

            CREATE TABLE IF NOT EXISTS castaways (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                season_id INTEGER NOT NULL REFERENCES seasons(id),
                name      TEXT NOT NULL,
                status    TEXT NOT NULL DEFAULT 'active',
                UNIQUE(season_id, name)
            );

            CREATE TABLE IF NOT EXISTS leagues (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                season_id INTEGER NOT NULL REFERENCES seasons(id),
                name      TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS members (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                league_id    INTEGER NOT NULL REFERENCES leagues(id),
                display_name TEXT NOT NULL,
                joined_at    TEXT NOT NULL,
                UNIQUE(league_id, display_name)
            );

            CREATE TABLE IF NOT EXISTS roster_entries (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                league_id      INTEGER NOT NULL REFERENCES leagues(id),
                member_id      INTEGER NOT NULL REFERENCES members(id),
                castaway_id    INTEGER NOT NULL REFERENCES castaways(id),
                draft_position INTEGER,
                drafted_at     TEXT NOT NULL,
                dropped_at     TEXT
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_roster_active
                ON roster_entries(league_id, member_id, castaway_id)
                WHERE dropped_at IS NULL;

            CREATE TABLE IF NOT EXISTS weekly_picks (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                league_id    INTEGER NOT NULL REFERENCES leagues(id),
                member_id    INTEGER NOT NULL REFERENCES members(id),
                episode_id   INTEGER NOT NULL REFERENCES episodes(id),
                castaway_id  INTEGER REFERENCES castaways(id),
                state        TEXT NOT NULL DEFAULT 'open',
                submitted_at TEXT,
                points       INTEGER,
                UNIQUE(league_id, member_id, episode_id)
            );

            CREATE TABLE IF NOT EXISTS scoring_rules (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                season_id INTEGER NOT NULL REFERENCES seasons(id),
                code      TEXT NOT NULL,
                name      TEXT NOT NULL,
                category  TEXT NOT NULL,
                points    INTEGER NOT NULL,
                active    INTEGER NOT NULL DEFAULT 1,
                UNIQUE(season_id, code)
            );

            CREATE TABLE IF NOT EXISTS scoring_events (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                episode_id  INTEGER NOT NULL REFERENCES episodes(id),
                castaway_id INTEGER NOT NULL REFERENCES castaways(id),
                rule_id     INTEGER NOT NULL REFERENCES scoring_rules(id),
                quantity    INTEGER NOT NULL,
                points      INTEGER NOT NULL,
                UNIQUE(episode_id, castaway_id, rule_id)
            );

            CREATE INDEX IF NOT EXISTS idx_picks_episode ON weekly_picks(episode_id);
            CREATE INDEX IF NOT EXISTS idx_events_episode ON scoring_events(episode_id);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    // ------------------------------------------------------------------
    // Seasons, episodes, castaways
    // ------------------------------------------------------------------

    /// Create a season and return its id.
    pub fn create_season(&self, name: &str, year: i32) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO seasons (name, year) VALUES (?1, ?2)",
            params![name, year],
        )
        .context("failed to create season")?;
        Ok(conn.last_insert_rowid())
    }

    /// Create an episode. Enforces the episode invariants at insert time:
    /// the lock deadline must not be after air time, and the sequence
    /// number must be strictly greater than any existing number in the
    /// season.
    pub fn create_episode(
        &self,
        season_id: i64,
        number: u32,
        airs_at: DateTime<Utc>,
        picks_lock_at: DateTime<Utc>,
    ) -> Result<i64> {
        if picks_lock_at > airs_at {
            bail!(
                "episode {number} lock deadline {picks_lock_at} is after air time {airs_at}"
            );
        }
        let conn = self.conn();
        let max_number: Option<u32> = conn
            .query_row(
                "SELECT MAX(number) FROM episodes WHERE season_id = ?1",
                params![season_id],
                |row| row.get(0),
            )
            .context("failed to query max episode number")?;
        if let Some(max) = max_number {
            if number <= max {
                bail!("episode numbers must be strictly increasing: {number} <= {max}");
            }
        }
        conn.execute(
            "INSERT INTO episodes (season_id, number, airs_at, picks_lock_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                season_id,
                number,
                ts_to_sql(airs_at),
                ts_to_sql(picks_lock_at)
            ],
        )
        .context("failed to create episode")?;
        Ok(conn.last_insert_rowid())
    }

    /// Create a castaway in `active` status and return its id.
    pub fn create_castaway(&self, season_id: i64, name: &str) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO castaways (season_id, name) VALUES (?1, ?2)",
            params![season_id, name],
        )
        .context("failed to create castaway")?;
        Ok(conn.last_insert_rowid())
    }

    /// Record a castaway's status change, enforcing monotonicity: only
    /// `active -> eliminated` and `active -> winner` are legal. This is
    /// invoked by the external elimination-recording process.
    pub fn set_castaway_status(&self, castaway_id: i64, next: CastawayStatus) -> Result<()> {
        let current = self.castaway(castaway_id)?.status;
        if !current.can_become(next) {
            bail!("illegal castaway status transition {current} -> {next}");
        }
        let conn = self.conn();
        conn.execute(
            "UPDATE castaways SET status = ?1 WHERE id = ?2",
            params![next.as_str(), castaway_id],
        )
        .context("failed to update castaway status")?;
        Ok(())
    }

    /// Look up a season id by name. `None` when no such season exists.
    pub fn season_id_by_name(&self, name: &str) -> Result<Option<i64>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id FROM seasons WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()
        .context("failed to query season by name")
    }

    /// Load a season by id.
    pub fn season(&self, season_id: i64) -> Result<Season> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, year FROM seasons WHERE id = ?1",
            params![season_id],
            |row| {
                Ok(Season {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    year: row.get(2)?,
                })
            },
        )
        .with_context(|| format!("season {season_id} not found"))
    }

    /// Load an episode by id.
    pub fn episode(&self, episode_id: i64) -> Result<Episode> {
        let conn = self.conn();
        let raw = conn
            .query_row(
                "SELECT id, season_id, number, airs_at, picks_lock_at, is_final
                 FROM episodes WHERE id = ?1",
                params![episode_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, bool>(5)?,
                    ))
                },
            )
            .with_context(|| format!("episode {episode_id} not found"))?;
        episode_from_raw(raw)
    }

    /// Episodes whose lock deadline has passed and whose scoring is not yet
    /// final — the set the deadline watcher re-checks each poll.
    pub fn episodes_due(&self, now: DateTime<Utc>) -> Result<Vec<Episode>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, season_id, number, airs_at, picks_lock_at, is_final
                 FROM episodes WHERE picks_lock_at <= ?1 AND is_final = 0
                 ORDER BY season_id, number",
            )
            .context("failed to prepare episodes_due query")?;
        let raws = stmt
            .query_map(params![ts_to_sql(now)], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, bool>(5)?,
                ))
            })
            .context("failed to query due episodes")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map due episode rows")?;
        raws.into_iter().map(episode_from_raw).collect()
    }

    /// Load a castaway by id.
    pub fn castaway(&self, castaway_id: i64) -> Result<Castaway> {
        let conn = self.conn();
        let (id, season_id, name, status) = conn
            .query_row(
                "SELECT id, season_id, name, status FROM castaways WHERE id = ?1",
                params![castaway_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .with_context(|| format!("castaway {castaway_id} not found"))?;
        let status = CastawayStatus::from_str_status(&status)
            .with_context(|| format!("castaway {castaway_id} has invalid status `{status}`"))?;
        Ok(Castaway {
            id,
            season_id,
            name,
            status,
        })
    }

    /// Whether a castaway exists and belongs to the given season. Used by
    /// scoring validation to reject events for foreign or unknown ids.
    pub fn castaway_in_season(&self, castaway_id: i64, season_id: i64) -> Result<bool> {
        let conn = self.conn();
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM castaways WHERE id = ?1 AND season_id = ?2)",
                params![castaway_id, season_id],
                |row| row.get(0),
            )
            .context("failed to check castaway season membership")?;
        Ok(exists)
    }

    // ------------------------------------------------------------------
    // Leagues and members
    // ------------------------------------------------------------------

    /// Create a league on a season and return its id.
    pub fn create_league(&self, season_id: i64, name: &str) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO leagues (season_id, name) VALUES (?1, ?2)",
            params![season_id, name],
        )
        .context("failed to create league")?;
        Ok(conn.last_insert_rowid())
    }

    /// Load a league by id.
    pub fn league(&self, league_id: i64) -> Result<League> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, season_id, name FROM leagues WHERE id = ?1",
            params![league_id],
            |row| {
                Ok(League {
                    id: row.get(0)?,
                    season_id: row.get(1)?,
                    name: row.get(2)?,
                })
            },
        )
        .with_context(|| format!("league {league_id} not found"))
    }

    /// Add a member to a league and return their id.
    pub fn add_member(
        &self,
        league_id: i64,
        display_name: &str,
        joined_at: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO members (league_id, display_name, joined_at)
             VALUES (?1, ?2, ?3)",
            params![league_id, display_name, ts_to_sql(joined_at)],
        )
        .context("failed to add member")?;
        Ok(conn.last_insert_rowid())
    }

    /// All members of a league, ordered by id.
    pub fn members_of_league(&self, league_id: i64) -> Result<Vec<Member>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, league_id, display_name, joined_at
                 FROM members WHERE league_id = ?1 ORDER BY id",
            )
            .context("failed to prepare members query")?;
        let raws = stmt
            .query_map(params![league_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .context("failed to query members")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map member rows")?;
        raws.into_iter()
            .map(|(id, league_id, display_name, joined_at)| {
                Ok(Member {
                    id,
                    league_id,
                    display_name,
                    joined_at: ts_from_sql(&joined_at)?,
                })
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Roster entries
    // ------------------------------------------------------------------

    /// Whether the member currently holds the castaway (a non-dropped
    /// roster entry exists).
    pub fn has_active_roster_entry(
        &self,
        league_id: i64,
        member_id: i64,
        castaway_id: i64,
    ) -> Result<bool> {
        let conn = self.conn();
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM roster_entries
                 WHERE league_id = ?1 AND member_id = ?2 AND castaway_id = ?3
                   AND dropped_at IS NULL)",
                params![league_id, member_id, castaway_id],
                |row| row.get(0),
            )
            .context("failed to check roster entry existence")?;
        Ok(exists)
    }

    /// Insert a roster entry. The partial unique index rejects a duplicate
    /// active entry for the same (league, member, castaway) triple.
    pub fn insert_roster_entry(
        &self,
        league_id: i64,
        member_id: i64,
        castaway_id: i64,
        draft_position: Option<u32>,
        drafted_at: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO roster_entries
                (league_id, member_id, castaway_id, draft_position, drafted_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                league_id,
                member_id,
                castaway_id,
                draft_position,
                ts_to_sql(drafted_at)
            ],
        )
        .context("failed to insert roster entry")?;
        Ok(conn.last_insert_rowid())
    }

    /// Mark the member's active entry for the castaway as dropped. Returns
    /// `false` if there was no active entry (already dropped, or never
    /// held). Dropped entries are never reactivated; drafting the castaway
    /// again creates a new row.
    pub fn drop_roster_entry(
        &self,
        league_id: i64,
        member_id: i64,
        castaway_id: i64,
        dropped_at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE roster_entries SET dropped_at = ?1
                 WHERE league_id = ?2 AND member_id = ?3 AND castaway_id = ?4
                   AND dropped_at IS NULL",
                params![ts_to_sql(dropped_at), league_id, member_id, castaway_id],
            )
            .context("failed to drop roster entry")?;
        Ok(changed > 0)
    }

    /// The member's currently playable castaways: non-dropped entries whose
    /// castaway status is still `active`. Ordered by draft ranking (NULLs
    /// last), then draft time, then castaway id — the order the auto-pick
    /// resolver consumes.
    pub fn active_roster(&self, league_id: i64, member_id: i64) -> Result<Vec<RosterSlot>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT c.id, c.name, c.status, r.draft_position, r.drafted_at
                 FROM roster_entries r
                 JOIN castaways c ON c.id = r.castaway_id
                 WHERE r.league_id = ?1 AND r.member_id = ?2
                   AND r.dropped_at IS NULL AND c.status = 'active'
                 ORDER BY r.draft_position IS NULL, r.draft_position, r.drafted_at, c.id",
            )
            .context("failed to prepare active roster query")?;
        let raws = stmt
            .query_map(params![league_id, member_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<u32>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .context("failed to query active roster")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map roster rows")?;
        raws.into_iter()
            .map(|(castaway_id, name, status, draft_position, drafted_at)| {
                let status = CastawayStatus::from_str_status(&status)
                    .with_context(|| format!("castaway {castaway_id} has invalid status"))?;
                Ok(RosterSlot {
                    castaway_id,
                    name,
                    status,
                    draft_position,
                    drafted_at: ts_from_sql(&drafted_at)?,
                })
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Weekly picks
    // ------------------------------------------------------------------

    /// Load the single pick row for (league, member, episode), if any.
    pub fn pick_row(
        &self,
        league_id: i64,
        member_id: i64,
        episode_id: i64,
    ) -> Result<Option<WeeklyPick>> {
        let conn = self.conn();
        let raw = conn
            .query_row(
                "SELECT id, league_id, member_id, episode_id, castaway_id, state,
                        submitted_at, points
                 FROM weekly_picks
                 WHERE league_id = ?1 AND member_id = ?2 AND episode_id = ?3",
                params![league_id, member_id, episode_id],
                map_pick_raw,
            )
            .optional()
            .context("failed to query pick row")?;
        raw.map(pick_from_raw).transpose()
    }

    /// Upsert the member's selection for an episode. The single row per
    /// (league, member, episode) is created on first submission and
    /// overwritten on re-submission; the `WHERE` guard on the conflict arm
    /// backstops the terminal-state check in the caller so a resolved pick
    /// is never clobbered. Returns the pick id.
    pub fn upsert_selected_pick(
        &self,
        league_id: i64,
        member_id: i64,
        episode_id: i64,
        castaway_id: i64,
        submitted_at: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO weekly_picks
                (league_id, member_id, episode_id, castaway_id, state, submitted_at)
             VALUES (?1, ?2, ?3, ?4, 'selected', ?5)
             ON CONFLICT(league_id, member_id, episode_id) DO UPDATE SET
                castaway_id  = excluded.castaway_id,
                state        = 'selected',
                submitted_at = excluded.submitted_at
             WHERE weekly_picks.state IN ('open', 'selected')",
            params![
                league_id,
                member_id,
                episode_id,
                castaway_id,
                ts_to_sql(submitted_at)
            ],
        )
        .context("failed to upsert pick selection")?;
        let id: i64 = conn
            .query_row(
                "SELECT id FROM weekly_picks
                 WHERE league_id = ?1 AND member_id = ?2 AND episode_id = ?3",
                params![league_id, member_id, episode_id],
                |row| row.get(0),
            )
            .context("failed to read back pick id")?;
        Ok(id)
    }

    /// Picks in `selected` state for an episode, as (pick_id, member_id)
    /// pairs. The lock pass iterates these one member at a time.
    pub fn selected_picks(&self, episode_id: i64) -> Result<Vec<(i64, i64)>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, member_id FROM weekly_picks
                 WHERE episode_id = ?1 AND state = 'selected'
                 ORDER BY member_id",
            )
            .context("failed to prepare selected picks query")?;
        let pairs = stmt
            .query_map(params![episode_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })
            .context("failed to query selected picks")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map selected pick rows")?;
        Ok(pairs)
    }

    /// Transition one pick from `selected` to `locked`. Returns `false`
    /// when the pick was not in `selected` state (already locked by a
    /// previous run), making retried lock passes no-ops.
    pub fn lock_pick(&self, pick_id: i64) -> Result<bool> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE weekly_picks SET state = 'locked'
                 WHERE id = ?1 AND state = 'selected'",
                params![pick_id],
            )
            .context("failed to lock pick")?;
        Ok(changed > 0)
    }

    /// Members of the episode's season whose pick is still `open` or does
    /// not exist yet. The weekly pick row is created lazily, so a member
    /// who never visited the pick page has no row at the deadline.
    pub fn unresolved_members(&self, episode_id: i64) -> Result<Vec<PickGap>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT m.league_id, m.id, wp.id
                 FROM members m
                 JOIN leagues l ON l.id = m.league_id
                 JOIN episodes e ON e.season_id = l.season_id
                 LEFT JOIN weekly_picks wp
                   ON wp.member_id = m.id AND wp.league_id = m.league_id
                  AND wp.episode_id = e.id
                 WHERE e.id = ?1 AND (wp.id IS NULL OR wp.state = 'open')
                 ORDER BY m.league_id, m.id",
            )
            .context("failed to prepare unresolved members query")?;
        let gaps = stmt
            .query_map(params![episode_id], |row| {
                Ok(PickGap {
                    league_id: row.get(0)?,
                    member_id: row.get(1)?,
                    pick_id: row.get(2)?,
                })
            })
            .context("failed to query unresolved members")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map unresolved member rows")?;
        Ok(gaps)
    }

    /// Resolve a missing/open pick at the deadline: `auto_picked` with the
    /// chosen castaway, or `unfillable` with none. The conflict arm only
    /// fires for rows still `open`, so a concurrent or retried run cannot
    /// overwrite a resolution. Returns whether a row was written.
    pub fn resolve_auto_pick(
        &self,
        league_id: i64,
        member_id: i64,
        episode_id: i64,
        castaway_id: Option<i64>,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool> {
        let state = if castaway_id.is_some() {
            PickState::AutoPicked
        } else {
            PickState::Unfillable
        };
        let conn = self.conn();
        let changed = conn
            .execute(
                "INSERT INTO weekly_picks
                    (league_id, member_id, episode_id, castaway_id, state, submitted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(league_id, member_id, episode_id) DO UPDATE SET
                    castaway_id  = excluded.castaway_id,
                    state        = excluded.state,
                    submitted_at = excluded.submitted_at
                 WHERE weekly_picks.state = 'open'",
                params![
                    league_id,
                    member_id,
                    episode_id,
                    castaway_id,
                    state.as_str(),
                    ts_to_sql(resolved_at)
                ],
            )
            .context("failed to resolve auto pick")?;
        Ok(changed > 0)
    }

    /// Picks eligible for point attribution: `locked` and `auto_picked`
    /// picks, plus already-`scored` picks so a recomputation overwrites
    /// their totals.
    pub fn picks_awaiting_score(&self, episode_id: i64) -> Result<Vec<WeeklyPick>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, league_id, member_id, episode_id, castaway_id, state,
                        submitted_at, points
                 FROM weekly_picks
                 WHERE episode_id = ?1 AND state IN ('locked', 'auto_picked', 'scored')
                 ORDER BY league_id, member_id",
            )
            .context("failed to prepare picks_awaiting_score query")?;
        let raws = stmt
            .query_map(params![episode_id], map_pick_raw)
            .context("failed to query picks awaiting score")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map pick rows")?;
        raws.into_iter().map(pick_from_raw).collect()
    }

    /// Store a pick's realized point total and move it to `scored`.
    /// Re-running overwrites the stored total (correction path); picks in
    /// any other state are left untouched.
    pub fn set_pick_scored(&self, pick_id: i64, points: i64) -> Result<bool> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE weekly_picks SET state = 'scored', points = ?1
                 WHERE id = ?2 AND state IN ('locked', 'auto_picked', 'scored')",
                params![points, pick_id],
            )
            .context("failed to store pick score")?;
        Ok(changed > 0)
    }

    // ------------------------------------------------------------------
    // Scoring rules
    // ------------------------------------------------------------------

    /// Insert a rule or update its fields if `(season_id, code)` already
    /// exists. Returns the rule's row id in a single atomic statement.
    /// Safe to call on an in-use rule: event points are frozen at event
    /// creation, so repricing never rewrites history.
    pub fn upsert_rule(
        &self,
        season_id: i64,
        code: &str,
        name: &str,
        category: &str,
        points: i64,
        active: bool,
    ) -> Result<i64> {
        let conn = self.conn();
        let id: i64 = conn
            .query_row(
                "INSERT INTO scoring_rules (season_id, code, name, category, points, active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(season_id, code) DO UPDATE SET
                    name     = excluded.name,
                    category = excluded.category,
                    points   = excluded.points,
                    active   = excluded.active
                 RETURNING id",
                params![season_id, code, name, category, points, active],
                |row| row.get(0),
            )
            .context("failed to upsert scoring rule")?;
        Ok(id)
    }

    /// Load a rule by id. `None` when the id is unknown.
    pub fn rule(&self, rule_id: i64) -> Result<Option<ScoringRule>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, season_id, code, name, category, points, active
             FROM scoring_rules WHERE id = ?1",
            params![rule_id],
            map_rule_row,
        )
        .optional()
        .context("failed to query scoring rule")
    }

    /// Active rules for a season, optionally filtered to one category.
    /// Ordered by (category, code).
    pub fn active_rules(
        &self,
        season_id: i64,
        category: Option<&str>,
    ) -> Result<Vec<ScoringRule>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, season_id, code, name, category, points, active
                 FROM scoring_rules
                 WHERE season_id = ?1 AND active = 1
                   AND (?2 IS NULL OR category = ?2)
                 ORDER BY category, code",
            )
            .context("failed to prepare active rules query")?;
        let rules = stmt
            .query_map(params![season_id, category], map_rule_row)
            .context("failed to query active rules")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map rule rows")?;
        Ok(rules)
    }

    // ------------------------------------------------------------------
    // Scoring events
    // ------------------------------------------------------------------

    /// Write one scoring event, overwriting any prior event for the same
    /// (episode, castaway, rule) tuple — the delete-and-reinsert correction
    /// path. `points` is the frozen value `rule.points * quantity`.
    pub fn replace_event(
        &self,
        episode_id: i64,
        castaway_id: i64,
        rule_id: i64,
        quantity: u32,
        points: i64,
    ) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO scoring_events (episode_id, castaway_id, rule_id, quantity, points)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(episode_id, castaway_id, rule_id) DO UPDATE SET
                quantity = excluded.quantity,
                points   = excluded.points",
            params![episode_id, castaway_id, rule_id, quantity, points],
        )
        .context("failed to replace scoring event")?;
        Ok(())
    }

    /// All events for an episode with their rule code and category,
    /// ordered by (castaway, category, code) for stable grouping.
    pub fn events_for_episode(&self, episode_id: i64) -> Result<Vec<ScoringEvent>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT e.episode_id, e.castaway_id, e.rule_id, r.code, r.category,
                        e.quantity, e.points
                 FROM scoring_events e
                 JOIN scoring_rules r ON r.id = e.rule_id
                 WHERE e.episode_id = ?1
                 ORDER BY e.castaway_id, r.category, r.code",
            )
            .context("failed to prepare episode events query")?;
        let events = stmt
            .query_map(params![episode_id], |row| {
                Ok(ScoringEvent {
                    episode_id: row.get(0)?,
                    castaway_id: row.get(1)?,
                    rule_id: row.get(2)?,
                    code: row.get(3)?,
                    category: row.get(4)?,
                    quantity: row.get(5)?,
                    points: row.get(6)?,
                })
            })
            .context("failed to query episode events")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map event rows")?;
        Ok(events)
    }

    /// Delete all events for an episode (full re-entry path). The caller
    /// guards against finalized episodes.
    pub fn delete_events_for_episode(&self, episode_id: i64) -> Result<usize> {
        let conn = self.conn();
        let deleted = conn
            .execute(
                "DELETE FROM scoring_events WHERE episode_id = ?1",
                params![episode_id],
            )
            .context("failed to delete episode events")?;
        Ok(deleted)
    }

    /// Sum of frozen event points for one castaway in one episode.
    pub fn castaway_episode_points(&self, episode_id: i64, castaway_id: i64) -> Result<i64> {
        let conn = self.conn();
        let total: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(points), 0) FROM scoring_events
                 WHERE episode_id = ?1 AND castaway_id = ?2",
                params![episode_id, castaway_id],
                |row| row.get(0),
            )
            .context("failed to sum castaway episode points")?;
        Ok(total)
    }

    /// Mark an episode's scoring final. Idempotent.
    pub fn mark_episode_final(&self, episode_id: i64) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE episodes SET is_final = 1 WHERE id = ?1",
            params![episode_id],
        )
        .context("failed to mark episode final")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Standings queries
    // ------------------------------------------------------------------

    /// Cumulative realized points per member: the sum of `scored` pick
    /// totals in the league.
    pub fn scored_points_by_member(&self, league_id: i64) -> Result<Vec<(i64, i64)>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT member_id, COALESCE(SUM(points), 0)
                 FROM weekly_picks
                 WHERE league_id = ?1 AND state = 'scored'
                 GROUP BY member_id",
            )
            .context("failed to prepare scored points query")?;
        let totals = stmt
            .query_map(params![league_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })
            .context("failed to query scored points")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map scored point rows")?;
        Ok(totals)
    }

    /// Number of negative-point scoring events attributed to each member
    /// through their scored picks — the first standings tie-break signal.
    pub fn negative_event_counts(&self, league_id: i64) -> Result<Vec<(i64, i64)>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT wp.member_id, COUNT(*)
                 FROM weekly_picks wp
                 JOIN scoring_events se
                   ON se.episode_id = wp.episode_id AND se.castaway_id = wp.castaway_id
                 WHERE wp.league_id = ?1 AND wp.state = 'scored' AND se.points < 0
                 GROUP BY wp.member_id",
            )
            .context("failed to prepare negative event counts query")?;
        let counts = stmt
            .query_map(params![league_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })
            .context("failed to query negative event counts")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map negative event count rows")?;
        Ok(counts)
    }
}

// ---------------------------------------------------------------------------
// Row mapping helpers
// ---------------------------------------------------------------------------

type RawPick = (
    i64,
    i64,
    i64,
    i64,
    Option<i64>,
    String,
    Option<String>,
    Option<i64>,
);

fn map_pick_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawPick> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn pick_from_raw(raw: RawPick) -> Result<WeeklyPick> {
    let (id, league_id, member_id, episode_id, castaway_id, state, submitted_at, points) = raw;
    let state = PickState::from_str_state(&state)
        .with_context(|| format!("pick {id} has invalid state `{state}`"))?;
    Ok(WeeklyPick {
        id,
        league_id,
        member_id,
        episode_id,
        castaway_id,
        state,
        submitted_at: submitted_at.as_deref().map(ts_from_sql).transpose()?,
        points,
    })
}

fn map_rule_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScoringRule> {
    Ok(ScoringRule {
        id: row.get(0)?,
        season_id: row.get(1)?,
        code: row.get(2)?,
        name: row.get(3)?,
        category: row.get(4)?,
        points: row.get(5)?,
        active: row.get(6)?,
    })
}

fn episode_from_raw(raw: (i64, i64, u32, String, String, bool)) -> Result<Episode> {
    let (id, season_id, number, airs_at, picks_lock_at, is_final) = raw;
    Ok(Episode {
        id,
        season_id,
        number,
        airs_at: ts_from_sql(&airs_at)?,
        picks_lock_at: ts_from_sql(&picks_lock_at)?,
        is_final,
    })
}

/// Uniform RFC 3339 storage format (millisecond precision, `Z` suffix) so
/// TEXT comparison in SQL matches chronological order.
fn ts_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn ts_from_sql(s: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid stored timestamp `{s}`"))?;
    Ok(parsed.with_timezone(&Utc))
}
