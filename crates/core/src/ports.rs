use std::time::Duration;

use async_trait::async_trait;
use time::UtcDateTime;

use crate::{
    error::SyncError,
    models::{
        AcquireOutcome, IssueRef, JobRecord, QueueMetrics, RunLease, SyncReceipt, TrackerComment,
        TrackerIssue,
    },
};

/// Issue tracker operations the coordinator needs.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn read_issue(&self, issue: &IssueRef) -> Result<TrackerIssue, SyncError>;

    async fn list_comments(&self, issue: &IssueRef) -> Result<Vec<TrackerComment>, SyncError>;

    async fn create_comment(&self, issue: &IssueRef, body: &str) -> Result<(), SyncError>;

    async fn update_comment(
        &self,
        issue: &IssueRef,
        comment_id: u64,
        body: &str,
    ) -> Result<(), SyncError>;
}

/// Commerce job queue operations.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Asks the backend to enqueue a product sync.
    async fn request_sync(&self) -> Result<SyncReceipt, SyncError>;

    /// Lists job records updated at or after `since`, or the backend's full
    /// recent window when `since` is unset.
    async fn list_jobs(&self, since: Option<UtcDateTime>) -> Result<Vec<JobRecord>, SyncError>;
}

/// Mutual exclusion between concurrent coordinator runs.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    async fn acquire(&self, holder_id: &str, ttl: Duration) -> Result<AcquireOutcome, SyncError>;

    async fn release(&self, lease: &RunLease) -> Result<(), SyncError>;
}

/// Durable state carried between runs.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn checkpoint(&self) -> Result<Option<UtcDateTime>, SyncError>;

    async fn store_checkpoint(&self, at: UtcDateTime) -> Result<(), SyncError>;

    async fn last_snapshot(&self) -> Result<Option<QueueMetrics>, SyncError>;

    async fn store_snapshot(&self, metrics: &QueueMetrics) -> Result<(), SyncError>;
}
