// Scheduled task bodies: the deadline lock/auto-pick passes, scoring
// finalization, and the named task registry the external scheduler runs.

pub mod deadline;
pub mod finalize;
pub mod registry;

use serde::Serialize;

/// One member whose transition failed during a batch pass. Failures are
/// collected and reported, never thrown: the rest of the batch proceeds
/// and the next scheduled run retries the remainder.
#[derive(Debug, Clone, Serialize)]
pub struct MemberFailure {
    pub member_id: i64,
    pub reason: String,
}
