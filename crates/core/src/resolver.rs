use crate::{
    config::ControlLabels,
    models::{Action, TriggerDescriptor, TriggerKind},
};

/// Decides which action a trigger runs. Every trigger resolves to exactly one
/// action; unrecognized input falls back to [`Action::Process`] instead of
/// aborting.
pub fn resolve_action(trigger: &TriggerDescriptor, control_labels: &ControlLabels) -> Action {
    match trigger.kind {
        // An operator's explicit choice is taken verbatim.
        TriggerKind::Manual => trigger.manual_action.unwrap_or_default(),
        TriggerKind::Scheduled => Action::Process,
        TriggerKind::IssueLabeled => trigger
            .label
            .as_deref()
            .and_then(|label| control_labels.action_for(label))
            .unwrap_or(Action::Process),
        TriggerKind::IssueOpened | TriggerKind::IssueEdited | TriggerKind::CommentCreated => {
            Action::Process
        }
        TriggerKind::Unknown => Action::Process,
    }
}
