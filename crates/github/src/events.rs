//! Classification of workflow invocations into trigger descriptors.
//!
//! The hosting platform hands us an event name and a JSON payload whose shape
//! varies per event. Classification never aborts the run: anything we can't
//! make sense of degrades to an unknown trigger that resolves to the default
//! action downstream.

use serde::Deserialize;
use storesync_core::{
    error::MalformedTrigger,
    models::{Action, IssueRef, TriggerDescriptor, TriggerKind},
};
use time::UtcDateTime;

/// Raw inputs of one coordinator invocation, before classification.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    /// Event name from the platform, e.g. `schedule` or `issues`.
    pub event_name: Option<String>,
    /// Raw JSON event payload, when one was delivered.
    pub payload: Option<String>,
    /// Action requested explicitly by an operator.
    pub manual_action: Option<Action>,
}

#[derive(Debug, Default, Deserialize)]
struct EventPayload {
    action: Option<String>,
    issue: Option<PayloadIssue>,
    label: Option<PayloadLabel>,
    repository: Option<PayloadRepository>,
    inputs: Option<PayloadInputs>,
}

#[derive(Debug, Deserialize)]
struct PayloadIssue {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct PayloadLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PayloadRepository {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct PayloadInputs {
    action: Option<String>,
}

/// Builds the trigger descriptor for this invocation.
///
/// A malformed invocation is downgraded, not fatal: the descriptor comes back
/// as [`TriggerKind::Unknown`] with the problem recorded in `degraded` so the
/// report can surface it.
pub fn build_trigger(
    invocation: &Invocation,
    host_repo: &str,
    now: UtcDateTime,
) -> TriggerDescriptor {
    match classify(invocation, host_repo, now) {
        Ok(trigger) => trigger,
        Err(e) => {
            tracing::warn!("Trigger classification failed, falling back to default: {e}");
            TriggerDescriptor {
                kind: TriggerKind::Unknown,
                manual_action: None,
                issue: None,
                label: None,
                received_at: now,
                degraded: Some(e.0),
            }
        }
    }
}

fn classify(
    invocation: &Invocation,
    host_repo: &str,
    now: UtcDateTime,
) -> Result<TriggerDescriptor, MalformedTrigger> {
    // An explicit operator action wins over whatever event came along with it.
    if let Some(action) = invocation.manual_action {
        return Ok(TriggerDescriptor {
            kind: TriggerKind::Manual,
            manual_action: Some(action),
            issue: None,
            label: None,
            received_at: now,
            degraded: None,
        });
    }
    let event_name = invocation
        .event_name
        .as_deref()
        .ok_or_else(|| MalformedTrigger("no event name and no requested action".to_string()))?;
    let payload = parse_payload(invocation)?;
    match event_name {
        "schedule" => Ok(TriggerDescriptor::scheduled(now)),
        "workflow_dispatch" => {
            let manual_action = match payload.inputs.as_ref().and_then(|i| i.action.as_deref()) {
                Some(name) => Some(name.parse::<Action>().map_err(|()| {
                    MalformedTrigger(format!("unknown dispatch action {name:?}"))
                })?),
                None => None,
            };
            Ok(TriggerDescriptor {
                kind: TriggerKind::Manual,
                manual_action,
                issue: None,
                label: None,
                received_at: now,
                degraded: None,
            })
        }
        "issues" => {
            let action = payload.action.as_deref().unwrap_or_default();
            let kind = match action {
                "opened" => TriggerKind::IssueOpened,
                "edited" => TriggerKind::IssueEdited,
                "labeled" => TriggerKind::IssueLabeled,
                other => {
                    return Err(MalformedTrigger(format!("unhandled issues action {other:?}")));
                }
            };
            let label = if kind == TriggerKind::IssueLabeled {
                Some(
                    payload
                        .label
                        .as_ref()
                        .map(|l| l.name.clone())
                        .ok_or_else(|| MalformedTrigger("labeled event without label".to_string()))?,
                )
            } else {
                None
            };
            Ok(TriggerDescriptor {
                kind,
                manual_action: None,
                issue: issue_ref(&payload, host_repo),
                label,
                received_at: now,
                degraded: None,
            })
        }
        "issue_comment" => {
            let action = payload.action.as_deref().unwrap_or_default();
            if action != "created" {
                return Err(MalformedTrigger(format!(
                    "unhandled issue_comment action {action:?}"
                )));
            }
            Ok(TriggerDescriptor {
                kind: TriggerKind::CommentCreated,
                manual_action: None,
                issue: issue_ref(&payload, host_repo),
                label: None,
                received_at: now,
                degraded: None,
            })
        }
        other => Err(MalformedTrigger(format!("unrecognized event {other:?}"))),
    }
}

fn parse_payload(invocation: &Invocation) -> Result<EventPayload, MalformedTrigger> {
    match invocation.payload.as_deref() {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| MalformedTrigger(format!("unparseable event payload: {e}"))),
        // Scheduled runs deliver no payload.
        None => Ok(EventPayload::default()),
    }
}

fn issue_ref(payload: &EventPayload, host_repo: &str) -> Option<IssueRef> {
    let issue = payload.issue.as_ref()?;
    let repo = payload
        .repository
        .as_ref()
        .map(|r| r.full_name.as_str())
        .filter(|full_name| !full_name.eq_ignore_ascii_case(host_repo))
        .map(str::to_string);
    Some(IssueRef { repo, number: issue.number })
}
