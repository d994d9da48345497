use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use time::UtcDateTime;

/// The single action a run executes against the backends.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Full sync cycle: push a sync request, then snapshot the queue.
    #[default]
    Process,
    /// Snapshot the queue only, no mutating calls.
    CheckJobs,
    /// Snapshot the queue and compare against the previous snapshot.
    SyncStatus,
}

impl Action {
    pub const fn variants() -> &'static [Self] {
        &[Self::Process, Self::CheckJobs, Self::SyncStatus]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::CheckJobs => "check_jobs",
            Self::SyncStatus => "sync_status",
        }
    }
}

impl FromStr for Action {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "process" => Ok(Self::Process),
            "check_jobs" => Ok(Self::CheckJobs),
            "sync_status" => Ok(Self::SyncStatus),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TriggerKind {
    IssueOpened,
    IssueEdited,
    IssueLabeled,
    CommentCreated,
    Scheduled,
    Manual,
    /// Classification failed. Resolves like any other trigger rather than
    /// aborting, so a malformed invocation can never silently no-op a sync.
    Unknown,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IssueOpened => "issue_opened",
            Self::IssueEdited => "issue_edited",
            Self::IssueLabeled => "issue_labeled",
            Self::CommentCreated => "comment_created",
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Reference to a tracker issue. `repo` is set only when the issue lives
/// outside the hosting repository.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct IssueRef {
    pub repo: Option<String>,
    pub number: u64,
}

impl fmt::Display for IssueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repo {
            Some(repo) => write!(f, "{repo}#{}", self.number),
            None => write!(f, "#{}", self.number),
        }
    }
}

/// Canonical description of what launched this run. Immutable once built.
#[derive(Debug, Clone)]
pub struct TriggerDescriptor {
    pub kind: TriggerKind,
    pub manual_action: Option<Action>,
    pub issue: Option<IssueRef>,
    pub label: Option<String>,
    pub received_at: UtcDateTime,
    /// Warning attached when classification had to fall back.
    pub degraded: Option<String>,
}

impl TriggerDescriptor {
    pub fn scheduled(received_at: UtcDateTime) -> Self {
        Self {
            kind: TriggerKind::Scheduled,
            manual_action: None,
            issue: None,
            label: None,
            received_at,
            degraded: None,
        }
    }

    pub fn manual(action: Option<Action>, received_at: UtcDateTime) -> Self {
        Self {
            kind: TriggerKind::Manual,
            manual_action: action,
            issue: None,
            label: None,
            received_at,
            degraded: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    // Aliases cover the backend's alternate state names.
    #[serde(alias = "enqueued")]
    Pending,
    #[serde(alias = "started")]
    Running,
    Failed,
    #[serde(alias = "done")]
    Succeeded,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Succeeded => "succeeded",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Read-only snapshot of one job owned by the external queue.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    pub attempt_count: u32,
    pub created_at: UtcDateTime,
    pub updated_at: UtcDateTime,
}

/// Aggregate classification of a window of job records.
///
/// Persisted as JSON between runs so `sync_status` can report deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QueueMetrics {
    pub pending: u64,
    pub retrying: u64,
    pub failed: u64,
    pub succeeded: u64,
    pub mean_latency: Option<Duration>,
}

impl QueueMetrics {
    /// Classify job records against the retry budget. A `Failed` record still
    /// within budget counts as retrying, not failed.
    pub fn compute(records: &[JobRecord], retry_budget: u32) -> Self {
        let mut metrics = Self::default();
        let mut latency_ms: i128 = 0;
        for record in records {
            match record.status {
                JobStatus::Pending | JobStatus::Running => metrics.pending += 1,
                JobStatus::Failed if record.attempt_count > retry_budget => metrics.failed += 1,
                JobStatus::Failed => metrics.retrying += 1,
                JobStatus::Succeeded => {
                    metrics.succeeded += 1;
                    latency_ms += (record.updated_at - record.created_at).whole_milliseconds().max(0);
                }
            }
        }
        if metrics.succeeded > 0 {
            metrics.mean_latency =
                Some(Duration::from_millis((latency_ms / metrics.succeeded as i128) as u64));
        }
        metrics
    }

    pub fn total(&self) -> u64 { self.pending + self.retrying + self.failed + self.succeeded }
}

/// Signed change between two queue snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotDelta {
    pub pending: i64,
    pub retrying: i64,
    pub failed: i64,
}

impl SnapshotDelta {
    pub fn between(previous: &QueueMetrics, current: &QueueMetrics) -> Self {
        fn diff(prev: u64, cur: u64) -> i64 { cur as i64 - prev as i64 }
        Self {
            pending: diff(previous.pending, current.pending),
            retrying: diff(previous.retrying, current.retrying),
            failed: diff(previous.failed, current.failed),
        }
    }

    pub fn is_zero(&self) -> bool { self.pending == 0 && self.retrying == 0 && self.failed == 0 }
}

/// The queue backend's acknowledgement of a sync request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReceipt {
    /// Number of jobs queued in response.
    pub queued: u64,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RunOutcome {
    Success,
    /// The run completed but some jobs exceeded their retry budget.
    PartialFailure,
    Failed,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialFailure => "partial failure",
            Self::Failed => "failed",
        }
    }

    pub fn is_failed(&self) -> bool { matches!(self, Self::Failed) }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Everything one run produced. Built by the executor, consumed by the
/// reporter, then discarded.
#[derive(Debug, Clone)]
pub struct SyncRunResult {
    pub action: Action,
    pub started_at: UtcDateTime,
    pub ended_at: UtcDateTime,
    pub outcome: RunOutcome,
    pub metrics: Option<QueueMetrics>,
    pub receipt: Option<SyncReceipt>,
    pub delta: Option<SnapshotDelta>,
    /// Title of the triggering issue, when one was read.
    pub issue_context: Option<String>,
    /// Failure description for `Failed` runs, safe to render.
    pub failure: Option<String>,
    /// Carried over from a degraded trigger classification.
    pub degraded: Option<String>,
}

impl SyncRunResult {
    pub fn duration(&self) -> Duration {
        Duration::from_millis((self.ended_at - self.started_at).whole_milliseconds().max(0) as u64)
    }
}

/// The mutual-exclusion record serializing runs. Lives in the state store,
/// outside any single invocation's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLease {
    pub holder_id: String,
    pub acquired_at: UtcDateTime,
    pub expires_at: UtcDateTime,
}

impl RunLease {
    pub fn is_expired(&self, now: UtcDateTime) -> bool { self.expires_at <= now }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired(RunLease),
    /// Someone else holds an unexpired lease. A clean skip, not an error.
    Busy { holder_id: String, expires_at: UtcDateTime },
}

#[derive(Debug, Clone)]
pub struct TrackerIssue {
    pub number: u64,
    pub title: String,
    pub labels: Vec<String>,
    pub open: bool,
}

#[derive(Debug, Clone)]
pub struct TrackerComment {
    pub id: u64,
    pub body: String,
}
