//! In-memory fakes for the backend ports.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use storesync_core::{
    config::{Config, DbConfig, QueueConfig, SyncConfig, TrackerConfig},
    error::SyncError,
    models::{
        AcquireOutcome, Action, IssueRef, JobRecord, JobStatus, QueueMetrics, RunLease,
        SyncReceipt, TrackerComment, TrackerIssue, TriggerDescriptor, TriggerKind,
    },
    ports::{IssueTracker, JobQueue, LeaseStore, StateStore},
};
use time::UtcDateTime;

use crate::SyncContext;

pub(crate) fn test_config() -> Config {
    Config {
        tracker: TrackerConfig {
            owner: "acme".to_string(),
            repo: "store-operations".to_string(),
            control_labels: [
                ("resync".to_string(), Action::Process),
                ("verify-jobs".to_string(), Action::CheckJobs),
                ("sync-status".to_string(), Action::SyncStatus),
            ]
            .into_iter()
            .collect(),
        },
        queue: QueueConfig {
            base_url: url::Url::parse("https://queue.example/api").unwrap(),
            timeout_secs: 5,
        },
        db: DbConfig { url: "sqlite://test.db".to_string() },
        sync: SyncConfig {
            call_retries: 2,
            retry_base_delay_ms: 1,
            call_timeout_secs: 1,
            ..SyncConfig::default()
        },
    }
}

pub(crate) fn context(
    queue: Arc<FakeQueue>,
    previous_snapshot: Option<QueueMetrics>,
) -> (SyncContext, Arc<FakeTracker>, Arc<FakeLease>) {
    let tracker =
        Arc::new(FakeTracker { title: "Storefront sync".to_string(), ..Default::default() });
    let lease = Arc::new(FakeLease::default());
    let state = Arc::new(FakeState::default());
    *state.snapshot.lock().unwrap() = previous_snapshot;
    let ctx = SyncContext {
        config: Arc::new(test_config()),
        holder_id: "test-run".to_string(),
        tracker: tracker.clone(),
        queue,
        lease: lease.clone(),
        state,
    };
    (ctx, tracker, lease)
}

pub(crate) fn trigger(kind: TriggerKind) -> TriggerDescriptor {
    TriggerDescriptor {
        kind,
        manual_action: None,
        issue: None,
        label: None,
        received_at: UtcDateTime::UNIX_EPOCH,
        degraded: None,
    }
}

pub(crate) fn job(
    id: &str,
    status: JobStatus,
    attempt_count: u32,
    created: i64,
    updated: i64,
) -> JobRecord {
    JobRecord {
        id: id.to_string(),
        status,
        attempt_count,
        created_at: UtcDateTime::from_unix_timestamp(created).unwrap(),
        updated_at: UtcDateTime::from_unix_timestamp(updated).unwrap(),
    }
}

#[derive(Default)]
pub(crate) struct FakeTracker {
    pub title: String,
    pub existing: Mutex<Vec<TrackerComment>>,
    pub created: Mutex<Vec<String>>,
    pub updated: Mutex<Vec<(u64, String)>>,
}

impl FakeTracker {
    pub fn seed_comment(&self, id: u64, body: String) {
        self.existing.lock().unwrap().push(TrackerComment { id, body });
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn read_issue(&self, issue: &IssueRef) -> Result<TrackerIssue, SyncError> {
        Ok(TrackerIssue {
            number: issue.number,
            title: self.title.clone(),
            labels: vec![],
            open: true,
        })
    }

    async fn list_comments(&self, _issue: &IssueRef) -> Result<Vec<TrackerComment>, SyncError> {
        Ok(self.existing.lock().unwrap().clone())
    }

    async fn create_comment(&self, _issue: &IssueRef, body: &str) -> Result<(), SyncError> {
        self.created.lock().unwrap().push(body.to_string());
        Ok(())
    }

    async fn update_comment(
        &self,
        _issue: &IssueRef,
        comment_id: u64,
        body: &str,
    ) -> Result<(), SyncError> {
        self.updated.lock().unwrap().push((comment_id, body.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeQueue {
    records: Vec<JobRecord>,
    receipt_queued: u64,
    sync_requests: AtomicU32,
    list_calls: AtomicU32,
    since_seen: Mutex<Vec<Option<UtcDateTime>>>,
    fail_sync: Mutex<Vec<SyncError>>,
    fail_list: Mutex<Vec<SyncError>>,
}

impl FakeQueue {
    pub fn with_records(records: Vec<JobRecord>) -> Self {
        Self { records, receipt_queued: 5, ..Default::default() }
    }

    pub fn fail_next(&self, error: SyncError) { self.fail_sync.lock().unwrap().push(error); }

    pub fn fail_next_list(&self, error: SyncError) { self.fail_list.lock().unwrap().push(error); }

    pub fn sync_requests(&self) -> u32 { self.sync_requests.load(Ordering::SeqCst) }

    pub fn list_calls(&self) -> u32 { self.list_calls.load(Ordering::SeqCst) }

    pub fn since_seen(&self) -> Vec<Option<UtcDateTime>> {
        self.since_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for FakeQueue {
    async fn request_sync(&self) -> Result<SyncReceipt, SyncError> {
        if let Some(error) = self.fail_sync.lock().unwrap().pop() {
            return Err(error);
        }
        self.sync_requests.fetch_add(1, Ordering::SeqCst);
        Ok(SyncReceipt { queued: self.receipt_queued })
    }

    async fn list_jobs(&self, since: Option<UtcDateTime>) -> Result<Vec<JobRecord>, SyncError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.fail_list.lock().unwrap().pop() {
            return Err(error);
        }
        self.since_seen.lock().unwrap().push(since);
        Ok(self.records.clone())
    }
}

#[derive(Default)]
pub(crate) struct FakeLease {
    busy: Option<(String, UtcDateTime)>,
    acquired: AtomicU32,
    released: AtomicU32,
}

impl FakeLease {
    pub fn busy(holder: &str, expires_at: UtcDateTime) -> Arc<Self> {
        Arc::new(Self { busy: Some((holder.to_string(), expires_at)), ..Default::default() })
    }

    pub fn released(&self) -> u32 { self.released.load(Ordering::SeqCst) }
}

#[async_trait]
impl LeaseStore for FakeLease {
    async fn acquire(&self, holder_id: &str, ttl: Duration) -> Result<AcquireOutcome, SyncError> {
        if let Some((holder, expires_at)) = &self.busy {
            return Ok(AcquireOutcome::Busy { holder_id: holder.clone(), expires_at: *expires_at });
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        let now = UtcDateTime::now();
        Ok(AcquireOutcome::Acquired(RunLease {
            holder_id: holder_id.to_string(),
            acquired_at: now,
            expires_at: now + ttl,
        }))
    }

    async fn release(&self, _lease: &RunLease) -> Result<(), SyncError> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeState {
    pub checkpoint: Mutex<Option<UtcDateTime>>,
    pub snapshot: Mutex<Option<QueueMetrics>>,
}

#[async_trait]
impl StateStore for FakeState {
    async fn checkpoint(&self) -> Result<Option<UtcDateTime>, SyncError> {
        Ok(*self.checkpoint.lock().unwrap())
    }

    async fn store_checkpoint(&self, at: UtcDateTime) -> Result<(), SyncError> {
        *self.checkpoint.lock().unwrap() = Some(at);
        Ok(())
    }

    async fn last_snapshot(&self) -> Result<Option<QueueMetrics>, SyncError> {
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn store_snapshot(&self, metrics: &QueueMetrics) -> Result<(), SyncError> {
        *self.snapshot.lock().unwrap() = Some(metrics.clone());
        Ok(())
    }
}
