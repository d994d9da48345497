use storesync_core::{
    error::{Backend, SyncError},
    models::QueueMetrics,
};

use crate::{
    SyncContext,
    retry::{RetryPolicy, with_retries},
};

/// Fetches the job window past the stored checkpoint, classifies it against
/// the retry budget, and persists the new checkpoint and snapshot.
pub async fn snapshot(ctx: &SyncContext, policy: &RetryPolicy) -> Result<QueueMetrics, SyncError> {
    let since = ctx.state.checkpoint().await?;
    let records =
        with_retries(policy, Backend::JobQueue, "list jobs", || ctx.queue.list_jobs(since))
            .await?;
    let metrics = QueueMetrics::compute(&records, ctx.config.sync.retry_budget);
    tracing::info!(
        "Queue window: {} pending, {} retrying, {} failed, {} succeeded",
        metrics.pending,
        metrics.retrying,
        metrics.failed,
        metrics.succeeded
    );
    // Advance the checkpoint to the newest record seen, not to now: a job
    // updated between listing and storing must land in the next window.
    if let Some(high_water) = records.iter().map(|r| r.updated_at).max() {
        ctx.state.store_checkpoint(high_water).await?;
    }
    ctx.state.store_snapshot(&metrics).await?;
    Ok(metrics)
}
