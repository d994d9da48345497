pub mod executor;
pub mod monitor;
pub mod report;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

use std::{sync::Arc, time::Duration};

use storesync_core::{
    config::Config,
    models::{AcquireOutcome, SyncRunResult, TriggerDescriptor},
    ports::{IssueTracker, JobQueue, LeaseStore, StateStore},
    resolver::resolve_action,
};
use time::UtcDateTime;

/// Shared handles for one coordinator run.
#[derive(Clone)]
pub struct SyncContext {
    pub config: Arc<Config>,
    pub holder_id: String,
    pub tracker: Arc<dyn IssueTracker>,
    pub queue: Arc<dyn JobQueue>,
    pub lease: Arc<dyn LeaseStore>,
    pub state: Arc<dyn StateStore>,
}

/// What one invocation ended up doing.
#[derive(Debug, Clone)]
pub enum RunReport {
    Completed(SyncRunResult),
    /// Another run holds the lease; nothing was executed.
    Skipped { holder_id: String, expires_at: UtcDateTime },
}

impl RunReport {
    /// Process exit code. Only a failed run is non-zero; skips and partial
    /// failures exit clean so the schedule keeps firing.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed(result) if result.outcome.is_failed() => 1,
            _ => 0,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Self::Completed(result) => format!(
                "{}: {} in {}",
                result.action,
                result.outcome,
                report::format_duration(result.duration())
            ),
            Self::Skipped { holder_id, expires_at } => format!(
                "skipped: run in progress (holder {holder_id}, lease expires {})",
                report::format_timestamp(*expires_at)
            ),
        }
    }
}

/// Runs one full coordinator cycle: resolve the action, serialize against
/// concurrent runs, execute, report back to the tracker.
pub async fn run(ctx: &SyncContext, trigger: &TriggerDescriptor) -> anyhow::Result<RunReport> {
    let action = resolve_action(trigger, &ctx.config.tracker.control_labels);
    tracing::info!("Trigger {} resolved to action {}", trigger.kind, action);

    let ttl = Duration::from_secs(ctx.config.sync.lease_ttl_secs);
    let lease = match ctx.lease.acquire(&ctx.holder_id, ttl).await? {
        AcquireOutcome::Acquired(lease) => lease,
        AcquireOutcome::Busy { holder_id, expires_at } => {
            tracing::info!(
                "Run lease held by {holder_id} until {}",
                report::format_timestamp(expires_at)
            );
            return Ok(RunReport::Skipped { holder_id, expires_at });
        }
    };

    let result = executor::execute(ctx, action, trigger).await;
    report::publish(ctx, trigger, &result).await;

    if let Err(e) = ctx.lease.release(&lease).await {
        // The lease will expire on its own.
        tracing::warn!("Failed to release run lease: {e}");
    }
    Ok(RunReport::Completed(result))
}
