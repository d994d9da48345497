pub mod events;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use octocrab::{Octocrab, issues::IssueHandler, models::IssueState};
use storesync_core::{
    config::{Credentials, TrackerConfig},
    error::{Backend, SyncError},
    models::{IssueRef, TrackerComment, TrackerIssue},
    ports::IssueTracker,
};

/// GitHub-backed issue tracker client.
#[derive(Clone)]
pub struct Tracker {
    client: Octocrab,
    /// Separate client for issues outside the hosting repository, when the
    /// environment provided a distinct token for them.
    cross_client: Option<Octocrab>,
    owner: String,
    repo: String,
}

impl Tracker {
    pub async fn new(config: &TrackerConfig, credentials: &Credentials) -> Result<Arc<Self>> {
        let client = Octocrab::builder()
            .personal_token(credentials.tracker_token.clone())
            .build()
            .context("Failed to create tracker client")?;
        let profile = client.current().user().await.context("Failed to fetch current user")?;
        tracing::info!("Logged in as {}", profile.login);

        let cross_client = match &credentials.cross_repo_token {
            Some(token) if *token != credentials.tracker_token => Some(
                Octocrab::builder()
                    .personal_token(token.clone())
                    .build()
                    .context("Failed to create cross-repo tracker client")?,
            ),
            _ => None,
        };
        Ok(Arc::new(Self {
            client,
            cross_client,
            owner: config.owner.clone(),
            repo: config.repo.clone(),
        }))
    }

    fn issues(&self, issue: &IssueRef) -> IssueHandler<'_> {
        match issue.repo.as_deref() {
            Some(full_name) => {
                let (owner, repo) = full_name.split_once('/').unwrap_or((full_name, ""));
                self.cross_client.as_ref().unwrap_or(&self.client).issues(owner, repo)
            }
            None => self.client.issues(&self.owner, &self.repo),
        }
    }
}

#[async_trait]
impl IssueTracker for Tracker {
    async fn read_issue(&self, issue: &IssueRef) -> Result<TrackerIssue, SyncError> {
        let result = self.issues(issue).get(issue.number).await.map_err(classify_error)?;
        Ok(TrackerIssue {
            number: result.number,
            title: result.title,
            labels: result.labels.into_iter().map(|l| l.name).collect(),
            open: matches!(result.state, IssueState::Open),
        })
    }

    async fn list_comments(&self, issue: &IssueRef) -> Result<Vec<TrackerComment>, SyncError> {
        let page = self
            .issues(issue)
            .list_comments(issue.number)
            .per_page(100)
            // Only fetch first page for now
            .send()
            .await
            .map_err(classify_error)?;
        Ok(page
            .items
            .into_iter()
            .filter_map(|c| c.body.map(|body| TrackerComment { id: c.id.into_inner(), body }))
            .collect())
    }

    async fn create_comment(&self, issue: &IssueRef, body: &str) -> Result<(), SyncError> {
        self.issues(issue).create_comment(issue.number, body).await.map_err(classify_error)?;
        Ok(())
    }

    async fn update_comment(
        &self,
        issue: &IssueRef,
        comment_id: u64,
        body: &str,
    ) -> Result<(), SyncError> {
        self.issues(issue)
            .update_comment(comment_id.into(), body)
            .await
            .map_err(classify_error)?;
        Ok(())
    }
}

fn classify_error(err: octocrab::Error) -> SyncError {
    match err {
        octocrab::Error::GitHub { source, .. } => {
            SyncError::from_status(Backend::Tracker, source.status_code.as_u16(), source.message)
        }
        e @ (octocrab::Error::Hyper { .. } | octocrab::Error::Service { .. }) => {
            SyncError::Transient { backend: Backend::Tracker, message: e.to_string() }
        }
        e => SyncError::Fatal { backend: Backend::Tracker, message: e.to_string() },
    }
}
