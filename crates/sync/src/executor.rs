use storesync_core::{
    error::{Backend, SyncError},
    models::{Action, RunOutcome, SnapshotDelta, SyncRunResult, TriggerDescriptor},
};
use time::UtcDateTime;

use crate::{
    SyncContext, monitor,
    retry::{RetryPolicy, with_retries},
};

/// Runs the resolved action to completion. Never returns an error: any
/// failure is folded into the result so the reporter and the exit code both
/// see it.
pub async fn execute(
    ctx: &SyncContext,
    action: Action,
    trigger: &TriggerDescriptor,
) -> SyncRunResult {
    let policy = RetryPolicy::from_config(&ctx.config.sync);
    let started_at = UtcDateTime::now();
    let mut result = SyncRunResult {
        action,
        started_at,
        ended_at: started_at,
        outcome: RunOutcome::Success,
        metrics: None,
        receipt: None,
        delta: None,
        issue_context: None,
        failure: None,
        degraded: trigger.degraded.clone(),
    };
    match perform(ctx, action, trigger, &policy, &mut result).await {
        Ok(()) => {
            if result.metrics.as_ref().is_some_and(|m| m.failed > 0) {
                result.outcome = RunOutcome::PartialFailure;
            }
        }
        Err(e) => {
            tracing::error!("Run failed: {e}");
            result.outcome = RunOutcome::Failed;
            result.failure = Some(e.describe());
        }
    }
    result.ended_at = UtcDateTime::now();
    result
}

async fn perform(
    ctx: &SyncContext,
    action: Action,
    trigger: &TriggerDescriptor,
    policy: &RetryPolicy,
    result: &mut SyncRunResult,
) -> Result<(), SyncError> {
    match action {
        Action::Process => {
            if let Some(issue) = &trigger.issue {
                let detail = with_retries(policy, Backend::Tracker, "read issue", || {
                    ctx.tracker.read_issue(issue)
                })
                .await?;
                tracing::info!("Processing {}: {}", issue, detail.title);
                result.issue_context = Some(detail.title);
            }
            let receipt = with_retries(policy, Backend::JobQueue, "request sync", || {
                ctx.queue.request_sync()
            })
            .await?;
            tracing::info!("Sync requested: {} jobs queued", receipt.queued);
            result.receipt = Some(receipt);
            result.metrics = Some(monitor::snapshot(ctx, policy).await?);
        }
        Action::CheckJobs => {
            result.metrics = Some(monitor::snapshot(ctx, policy).await?);
        }
        Action::SyncStatus => {
            // Load the previous snapshot before the monitor overwrites it.
            let previous = ctx.state.last_snapshot().await?;
            let metrics = monitor::snapshot(ctx, policy).await?;
            result.delta = previous.map(|prev| SnapshotDelta::between(&prev, &metrics));
            result.metrics = Some(metrics);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use storesync_core::models::{IssueRef, JobStatus, QueueMetrics, TriggerKind};

    use super::*;
    use crate::testing::{FakeQueue, context, job, trigger};

    #[tokio::test]
    async fn test_process_requests_then_snapshots() {
        let queue =
            Arc::new(FakeQueue::with_records(vec![job("a", JobStatus::Succeeded, 1, 100, 160)]));
        let (ctx, _tracker, _lease) = context(queue.clone(), None);
        let result = execute(&ctx, Action::Process, &trigger(TriggerKind::Scheduled)).await;

        assert_eq!(result.outcome, RunOutcome::Success);
        assert_eq!(result.receipt.map(|r| r.queued), Some(5));
        assert_eq!(result.metrics.unwrap().succeeded, 1);
        assert_eq!(queue.sync_requests(), 1);
        assert_eq!(queue.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_check_jobs_inspects_only() {
        let queue = Arc::new(FakeQueue::with_records(vec![]));
        let (ctx, _tracker, _lease) = context(queue.clone(), None);
        let result = execute(&ctx, Action::CheckJobs, &trigger(TriggerKind::Manual)).await;

        assert_eq!(result.outcome, RunOutcome::Success);
        assert!(result.receipt.is_none());
        assert_eq!(queue.sync_requests(), 0);
        assert_eq!(queue.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_sync_status_reports_delta() {
        let queue = Arc::new(FakeQueue::with_records(vec![
            job("a", JobStatus::Pending, 0, 100, 100),
            job("b", JobStatus::Failed, 9, 100, 150),
        ]));
        let previous =
            QueueMetrics { pending: 3, retrying: 1, failed: 0, succeeded: 2, mean_latency: None };
        let (ctx, _tracker, _lease) = context(queue, Some(previous));
        let result = execute(&ctx, Action::SyncStatus, &trigger(TriggerKind::Manual)).await;

        assert_eq!(result.outcome, RunOutcome::PartialFailure);
        assert_eq!(result.delta, Some(SnapshotDelta { pending: -2, retrying: -1, failed: 1 }));
    }

    #[tokio::test]
    async fn test_first_status_run_has_no_delta() {
        let queue = Arc::new(FakeQueue::with_records(vec![]));
        let (ctx, _tracker, _lease) = context(queue, None);
        let result = execute(&ctx, Action::SyncStatus, &trigger(TriggerKind::Manual)).await;

        assert_eq!(result.outcome, RunOutcome::Success);
        assert_eq!(result.delta, None);
        assert!(result.metrics.is_some());
    }

    #[tokio::test]
    async fn test_degraded_trigger_is_carried() {
        let queue = Arc::new(FakeQueue::with_records(vec![]));
        let (ctx, _tracker, _lease) = context(queue, None);
        let mut trigger = trigger(TriggerKind::Unknown);
        trigger.degraded = Some("unrecognized event \"push\"".to_string());
        let result = execute(&ctx, Action::Process, &trigger).await;

        assert_eq!(result.outcome, RunOutcome::Success);
        assert_eq!(result.degraded.as_deref(), Some("unrecognized event \"push\""));
    }

    #[tokio::test]
    async fn test_issue_context_is_read() {
        let queue = Arc::new(FakeQueue::with_records(vec![]));
        let (ctx, _tracker, _lease) = context(queue, None);
        let mut trigger = trigger(TriggerKind::IssueOpened);
        trigger.issue = Some(IssueRef { repo: None, number: 4 });
        let result = execute(&ctx, Action::Process, &trigger).await;

        assert_eq!(result.issue_context.as_deref(), Some("Storefront sync"));
    }
}
