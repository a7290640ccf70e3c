// Named scheduled tasks and the deadline watcher loop.
//
// The cron-style runner is an external collaborator; this module only
// names the tasks with human-readable schedules and provides the concrete
// body for the deadline trigger. The member-facing countdown is cosmetic:
// the watcher is the single authoritative lock driver.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use crate::config::ScheduleConfig;
use crate::db::Database;
use crate::tasks::deadline;

/// A named scheduled task with a human-readable schedule description.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSpec {
    pub name: &'static str,
    pub schedule: String,
    pub description: &'static str,
}

/// The tasks this core expects the external scheduler to run.
pub fn scheduled_tasks(schedule: &ScheduleConfig) -> Vec<TaskSpec> {
    vec![
        TaskSpec {
            name: "lock_picks",
            schedule: "shortly before each episode airs".to_string(),
            description: "lock every selected pick once the episode's deadline passes",
        },
        TaskSpec {
            name: "auto_pick",
            schedule: "shortly after each episode's lock deadline".to_string(),
            description: "fill still-open picks from each member's eligible roster",
        },
        TaskSpec {
            name: "standings_refresh",
            schedule: format!(
                "the morning after each episode, around {:02}:00",
                schedule.standings_hour
            ),
            description: "recompute and publish the ranked league table",
        },
    ]
}

/// Poll for episodes whose lock deadline has passed and process them.
///
/// Every pass is idempotent, so polling a fully resolved episode is a
/// quiet no-op until its scoring is finalized and it drops out of the
/// due set. Runs until the task is aborted at shutdown.
pub async fn run_deadline_watcher(db: Arc<Database>, schedule: ScheduleConfig) {
    let mut interval =
        tokio::time::interval(Duration::from_secs(schedule.deadline_poll_seconds));
    // First tick completes immediately; the first real pass happens right
    // after startup so a restart never misses an overdue deadline.
    loop {
        interval.tick().await;
        let now = Utc::now();
        let due = match db.episodes_due(now) {
            Ok(due) => due,
            Err(e) => {
                error!("failed to query due episodes: {e:#}");
                continue;
            }
        };
        for episode in due {
            match deadline::process_episode_deadline(&db, now, episode.id) {
                Ok(outcome) if outcome.is_quiet() => {}
                Ok(outcome) => match serde_json::to_string(&outcome) {
                    Ok(json) => info!(episode_id = episode.id, outcome = %json, "deadline pass complete"),
                    Err(_) => info!(episode_id = episode.id, "deadline pass complete"),
                },
                Err(e) => error!(episode_id = episode.id, "deadline pass failed: {e:#}"),
            }
        }
    }
}
