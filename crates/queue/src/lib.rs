use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, de::DeserializeOwned};
use storesync_core::{
    config::QueueConfig,
    error::{Backend, SyncError},
    models::{JobRecord, JobStatus, SyncReceipt},
    ports::JobQueue,
};
use time::UtcDateTime;
use url::Url;

/// HTTP client for the commerce platform's job queue API.
pub struct JobQueueClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl JobQueueClient {
    pub fn new(config: &QueueConfig, token: Option<String>) -> Result<Arc<Self>> {
        let http = Client::builder()
            .user_agent(concat!("storesync/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create queue client")?;
        Ok(Arc::new(Self { http, base_url: config.base_url.clone(), token }))
    }

    fn endpoint(&self, segment: &str) -> Result<Url, SyncError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| SyncError::Fatal {
                backend: Backend::JobQueue,
                message: format!("queue base URL {} cannot take a path", self.base_url),
            })?;
            segments.pop_if_empty().push(segment);
        }
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SyncError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await.map_err(classify_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::from_status(
                Backend::JobQueue,
                status.as_u16(),
                truncate(&body, 200),
            ));
        }
        response.json().await.map_err(|e| SyncError::Fatal {
            backend: Backend::JobQueue,
            message: format!("unexpected response body: {e}"),
        })
    }
}

#[async_trait]
impl JobQueue for JobQueueClient {
    async fn request_sync(&self) -> Result<SyncReceipt, SyncError> {
        let url = self.endpoint("sync")?;
        let receipt: WireReceipt = self.send(self.http.post(url)).await?;
        Ok(SyncReceipt { queued: receipt.queued })
    }

    async fn list_jobs(&self, since: Option<UtcDateTime>) -> Result<Vec<JobRecord>, SyncError> {
        let mut url = self.endpoint("jobs")?;
        if let Some(since) = since {
            url.query_pairs_mut().append_pair("since", &since.unix_timestamp().to_string());
        }
        let jobs: Vec<WireJob> = self.send(self.http.get(url)).await?;
        tracing::debug!("Fetched {} job records", jobs.len());
        Ok(jobs.into_iter().map(JobRecord::from).collect())
    }
}

/// Job row as the queue API serializes it, with unix-second timestamps.
#[derive(Debug, Deserialize)]
struct WireJob {
    id: String,
    status: JobStatus,
    #[serde(default)]
    attempt_count: u32,
    created_at: i64,
    updated_at: i64,
}

impl From<WireJob> for JobRecord {
    fn from(value: WireJob) -> Self {
        Self {
            id: value.id,
            status: value.status,
            attempt_count: value.attempt_count,
            created_at: timestamp(value.created_at),
            updated_at: timestamp(value.updated_at),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireReceipt {
    queued: u64,
}

fn timestamp(secs: i64) -> UtcDateTime {
    UtcDateTime::from_unix_timestamp(secs).unwrap_or(UtcDateTime::UNIX_EPOCH)
}

fn classify_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() || err.is_connect() {
        SyncError::Transient { backend: Backend::JobQueue, message: err.to_string() }
    } else {
        SyncError::Fatal { backend: Backend::JobQueue, message: err.to_string() }
    }
}

// Error bodies can be arbitrarily large HTML pages.
fn truncate(body: &str, max_chars: usize) -> String {
    let mut out: String = body.chars().take(max_chars).collect();
    if out.len() < body.len() {
        out.push('…');
    }
    out
}
