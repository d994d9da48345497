//! Rendering and posting of the tracker report comment.

use std::{cmp::Ordering, time::Duration};

use storesync_core::{
    error::{Backend, SyncError},
    models::{IssueRef, RunOutcome, SyncRunResult, TriggerDescriptor},
};
use time::{OffsetDateTime, UtcDateTime, format_description::well_known::Rfc3339};

use crate::{
    SyncContext,
    retry::{RetryPolicy, with_retries},
};

/// Invisible marker identifying the coordinator's own comment, so repeated
/// runs update it in place instead of stacking new ones.
pub(crate) const REPORT_MARKER: &str = "<!-- storesync:report -->";

/// Logs the run summary and, when an issue triggered us, posts the report
/// comment. Reporting is best-effort; the outcome and exit code are already
/// decided.
pub async fn publish(ctx: &SyncContext, trigger: &TriggerDescriptor, result: &SyncRunResult) {
    let summary = summary_line(result);
    if result.outcome.is_failed() {
        tracing::error!("{summary}");
    } else {
        tracing::info!("{summary}");
    }
    let Some(issue) = &trigger.issue else { return };
    if let Err(e) = upsert_comment(ctx, issue, &render_comment(result)).await {
        tracing::error!("Failed to post report to {issue}: {e}");
    }
}

async fn upsert_comment(
    ctx: &SyncContext,
    issue: &IssueRef,
    body: &str,
) -> Result<(), SyncError> {
    let policy = RetryPolicy::from_config(&ctx.config.sync);
    let comments = with_retries(&policy, Backend::Tracker, "list comments", || {
        ctx.tracker.list_comments(issue)
    })
    .await?;
    match comments.iter().find(|c| c.body.contains(REPORT_MARKER)) {
        Some(existing) => {
            with_retries(&policy, Backend::Tracker, "update comment", || {
                ctx.tracker.update_comment(issue, existing.id, body)
            })
            .await
        }
        None => {
            with_retries(&policy, Backend::Tracker, "create comment", || {
                ctx.tracker.create_comment(issue, body)
            })
            .await
        }
    }
}

pub fn render_comment(result: &SyncRunResult) -> String {
    let mut out = String::new();
    out.push_str("### Sync run report\n\n");
    let outcome = match result.outcome {
        RunOutcome::Success => "✅ success",
        RunOutcome::PartialFailure => "⚠️ partial failure",
        RunOutcome::Failed => "❌ failed",
    };
    out.push_str(&format!("**Action:** `{}` · **Outcome:** {}\n\n", result.action, outcome));
    if let Some(title) = &result.issue_context {
        out.push_str(&format!("Triggered by: {title}\n\n"));
    }
    if let Some(degraded) = &result.degraded {
        out.push_str(&format!("> ⚠️ Trigger degraded: {degraded}\n\n"));
    }
    if let Some(failure) = &result.failure {
        out.push_str(&format!("**Failure:** {failure}\n\n"));
    }
    if let Some(metrics) = &result.metrics {
        out.push_str("| Pending | Retrying | Failed | Succeeded |\n");
        out.push_str("| - | - | - | - |\n");
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n\n",
            metrics.pending, metrics.retrying, metrics.failed, metrics.succeeded
        ));
        if let Some(latency) = metrics.mean_latency {
            out.push_str(&format!("Mean job latency: {}\n\n", format_duration(latency)));
        }
    }
    if let Some(receipt) = &result.receipt {
        out.push_str(&format!("Requested sync: {} jobs queued\n\n", receipt.queued));
    }
    if let Some(delta) = &result.delta {
        out.push_str(&format!(
            "Since last snapshot: {} pending, {} retrying, {} failed\n\n",
            signed(delta.pending),
            signed(delta.retrying),
            signed(delta.failed)
        ));
    }
    out.push_str("---\n");
    out.push_str(&format!(
        "*Updated {} · took {}*\n{}\n",
        format_timestamp(result.ended_at),
        format_duration(result.duration()),
        REPORT_MARKER
    ));
    out
}

fn summary_line(result: &SyncRunResult) -> String {
    format!("Run {}: {} in {}", result.action, result.outcome, format_duration(result.duration()))
}

fn signed(value: i64) -> String {
    match value.cmp(&0) {
        Ordering::Less => value.to_string(),
        Ordering::Equal | Ordering::Greater => format!("+{value}"),
    }
}

pub(crate) fn format_timestamp(at: UtcDateTime) -> String {
    OffsetDateTime::from(at).format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}

pub(crate) fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs >= 90.0 { format!("{:.1}m", secs / 60.0) } else { format!("{secs:.1}s") }
}
