// Scoring rule catalog and CSV seed import.
//
// Rules are seeded from a CSV file (code,name,category,points,active) at
// startup and read through `active_rules`. Event points are frozen at
// event creation, so editing or repricing a rule never rewrites totals
// that were already computed from it.

use std::io::Read;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::db::Database;

/// A named, categorized, signed point value applied to in-episode events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringRule {
    pub id: i64,
    pub season_id: i64,
    /// Stable identifier, unique among the season's rules.
    pub code: String,
    pub name: String,
    pub category: String,
    pub points: i64,
    pub active: bool,
}

impl ScoringRule {
    /// Whether scoring against this rule subtracts points.
    pub fn is_negative(&self) -> bool {
        self.points < 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuleImportError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Raw rule CSV row. `active` defaults to true when the column is absent
/// (seed files usually only list live rules).
#[derive(Debug, Deserialize)]
struct RawRule {
    code: String,
    name: String,
    category: String,
    points: i64,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Reader-based loader (private, enables testing without temp files)
// ---------------------------------------------------------------------------

fn load_rules_from_reader<R: Read>(rdr: R) -> Result<Vec<RawRule>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut rules = Vec::new();
    for result in reader.deserialize::<RawRule>() {
        let raw = result?;
        if raw.code.trim().is_empty() {
            warn!("skipping rule row with empty code (name: '{}')", raw.name);
            continue;
        }
        rules.push(raw);
    }
    Ok(rules)
}

/// Import the rule catalog for a season from a CSV file. Rows upsert on
/// `(season_id, code)`, so re-importing an edited file updates names,
/// categories, prices, and active flags in place. Returns the number of
/// rules written.
pub fn import_rules(
    db: &Database,
    season_id: i64,
    path: &Path,
) -> Result<usize, RuleImportError> {
    let file = std::fs::File::open(path).map_err(|e| RuleImportError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let raws = load_rules_from_reader(file).map_err(|e| RuleImportError::Csv {
        path: path.display().to_string(),
        source: e,
    })?;

    let mut written = 0;
    for raw in &raws {
        db.upsert_rule(
            season_id,
            raw.code.trim(),
            raw.name.trim(),
            raw.category.trim(),
            raw.points,
            raw.active,
        )?;
        written += 1;
    }
    Ok(written)
}

/// Active rules for a season, optionally filtered to one category,
/// ordered by (category, code).
pub fn active_rules(
    db: &Database,
    season_id: i64,
    category: Option<&str>,
) -> Result<Vec<ScoringRule>> {
    db.active_rules(season_id, category)
}
