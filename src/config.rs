// Configuration loading and parsing (league.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub league: LeagueSettings,
    pub db_path: String,
    pub data_paths: DataPaths,
    pub schedule: ScheduleConfig,
}

// ---------------------------------------------------------------------------
// league.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire league.toml file.
#[derive(Debug, Clone, Deserialize)]
struct LeagueFile {
    league: LeagueSettings,
    storage: StorageSection,
    data: DataPaths,
    schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeagueSettings {
    pub name: String,
    pub season: String,
    pub season_year: i32,
}

#[derive(Debug, Clone, Deserialize)]
struct StorageSection {
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataPaths {
    /// Scoring-rule catalog seed CSV.
    pub rules: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// How often the deadline watcher re-checks for overdue episodes.
    pub deadline_poll_seconds: u64,
    /// Hour of day (0-23) the standings refresh is described to run at.
    pub standings_hour: u32,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/league.toml` relative to
/// the given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy
/// defaults. Prefer `load_config()` which handles default initialization
/// automatically.
pub(crate) fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let league_path = base_dir.join("config").join("league.toml");
    let league_text = read_file(&league_path)?;
    let league_file: LeagueFile =
        toml::from_str(&league_text).map_err(|e| ConfigError::ParseError {
            path: league_path.clone(),
            source: e,
        })?;

    let config = Config {
        league: league_file.league,
        db_path: resolve_db_path(base_dir, &league_file.storage.path),
        data_paths: league_file.data,
        schedule: league_file.schedule,
    };

    validate(&config)?;

    Ok(config)
}

/// Resolve the configured database path. Absolute paths (and the SQLite
/// `:memory:` marker) are used as given; relative paths resolve against
/// the platform data directory so the database survives working-directory
/// changes, falling back to `base_dir` when no platform directory exists.
fn resolve_db_path(base_dir: &Path, raw: &str) -> String {
    if raw == ":memory:" || Path::new(raw).is_absolute() {
        return raw.to_string();
    }
    match directories::ProjectDirs::from("", "", "torchtally") {
        Some(dirs) => dirs.data_dir().join(raw).display().to_string(),
        None => base_dir.join(raw).display().to_string(),
    }
}

/// Ensure the config file exists by copying missing files from
/// `defaults/`. Returns the list of files that were copied.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // File already exists in config/, skip it
            }
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working
/// directory. Ensures default config files are copied before loading.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.league.name.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "league.name".into(),
            message: "must not be empty".into(),
        });
    }

    if config.league.season.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "league.season".into(),
            message: "must not be empty".into(),
        });
    }

    if config.schedule.deadline_poll_seconds == 0 {
        return Err(ConfigError::ValidationError {
            field: "schedule.deadline_poll_seconds".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.schedule.standings_hour > 23 {
        return Err(ConfigError::ValidationError {
            field: "schedule.standings_hour".into(),
            message: format!(
                "must be an hour of day (0-23), got {}",
                config.schedule.standings_hour
            ),
        });
    }

    if config.data_paths.rules.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "data.rules".into(),
            message: "must not be empty".into(),
        });
    }

    Ok(())
}
