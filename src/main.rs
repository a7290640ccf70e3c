// League service entry point.
//
// Startup sequence:
// 1. Initialize tracing
// 2. Load config
// 3. Open database
// 4. Ensure the configured season exists, import the rule catalog
// 5. Log the scheduled task registry
// 6. Spawn the deadline watcher task
// 7. Wait for Ctrl+C
// 8. Cleanup on exit

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use castaway_league::config;
use castaway_league::db::Database;
use castaway_league::scoring::rules;
use castaway_league::tasks::registry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("torchtally starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: league={}, season={} ({})",
        config.league.name, config.league.season, config.league.season_year
    );

    // 3. Open database
    if let Some(parent) = Path::new(&config.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create data directory {}", parent.display()))?;
        }
    }
    let db = Arc::new(Database::open(&config.db_path).context("failed to open database")?);
    info!("Database opened at {}", config.db_path);

    // 4. Ensure the configured season exists and import the rule catalog
    let season_id = match db.season_id_by_name(&config.league.season)? {
        Some(id) => {
            let season = db.season(id)?;
            info!("Season `{}` ({}) already present", season.name, season.year);
            id
        }
        None => {
            let id = db
                .create_season(&config.league.season, config.league.season_year)
                .context("failed to create season")?;
            info!("Created season `{}`", config.league.season);
            id
        }
    };

    let rules_path = Path::new(&config.data_paths.rules);
    if rules_path.exists() {
        let imported = rules::import_rules(&db, season_id, rules_path)
            .context("failed to import scoring rules")?;
        info!("Imported {imported} scoring rules from {}", rules_path.display());
    } else {
        warn!(
            "rule catalog seed {} not found; scoring will reject all events until rules exist",
            rules_path.display()
        );
    }

    // 5. Log the scheduled task registry so operators can see what the
    // external scheduler is expected to run.
    for task in registry::scheduled_tasks(&config.schedule) {
        info!("scheduled task `{}`: runs {}", task.name, task.schedule);
    }

    // 6. Spawn the deadline watcher task
    let watcher_db = Arc::clone(&db);
    let watcher_schedule = config.schedule.clone();
    let watcher_handle = tokio::spawn(async move {
        registry::run_deadline_watcher(watcher_db, watcher_schedule).await;
    });
    info!(
        "Deadline watcher running (poll every {}s)",
        config.schedule.deadline_poll_seconds
    );

    // 7. Wait for Ctrl+C
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    // 8. Cleanup: the watcher loops forever, abort it.
    watcher_handle.abort();
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), watcher_handle).await;

    info!("torchtally shut down cleanly");
    Ok(())
}

/// Initialize tracing to stderr with an env-filter override
/// (`RUST_LOG=castaway_league=debug` etc).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("castaway_league=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
