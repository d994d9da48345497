use std::{collections::HashMap, env, fmt, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    error::{Backend, SyncError},
    models::Action,
};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub queue: QueueConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        );
        serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerConfig {
    pub owner: String,
    pub repo: String,
    /// Labels that map to a control action when applied to an issue.
    #[serde(default)]
    pub control_labels: ControlLabels,
}

impl TrackerConfig {
    pub fn full_name(&self) -> String { format!("{}/{}", self.owner, self.repo) }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    pub base_url: Url,
    /// Per-request timeout for the queue client.
    #[serde(default = "default_queue_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DbConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Run lease TTL. Must outlive a stuck run without starving the cycle
    /// after next on the 20-minute schedule.
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_secs: u64,
    /// Job attempts beyond which a failed job counts as failed, not retrying.
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    /// Retries after the first attempt of each backend call.
    #[serde(default = "default_call_retries")]
    pub call_retries: u32,
    /// Base backoff delay, doubled per attempt.
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
    /// Per-attempt timeout for backend calls.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lease_ttl_secs: default_lease_ttl(),
            retry_budget: default_retry_budget(),
            call_retries: default_call_retries(),
            retry_base_delay_ms: default_retry_base_delay(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

fn default_lease_ttl() -> u64 { 1500 }
fn default_retry_budget() -> u32 { 3 }
fn default_call_retries() -> u32 { 3 }
fn default_retry_base_delay() -> u64 { 500 }
fn default_call_timeout() -> u64 { 45 }
fn default_queue_timeout() -> u64 { 30 }

/// The label vocabulary is deployment configuration, not code.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ControlLabels(HashMap<String, Action>);

impl ControlLabels {
    /// Case-insensitive lookup of the action a label maps to.
    pub fn action_for(&self, label: &str) -> Option<Action> {
        self.0
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(label))
            .map(|(_, action)| *action)
    }
}

impl FromIterator<(String, Action)> for ControlLabels {
    fn from_iter<T: IntoIterator<Item = (String, Action)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Secrets supplied by the execution environment, never by the config file.
#[derive(Clone)]
pub struct Credentials {
    pub tracker_token: String,
    /// Token for issues outside the hosting repository. Falls back to the
    /// tracker token when unset.
    pub cross_repo_token: Option<String>,
    pub queue_token: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Result<Self, SyncError> {
        let tracker_token =
            env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()).ok_or_else(|| {
                SyncError::Auth {
                    backend: Backend::Tracker,
                    message: "GITHUB_TOKEN is not set".to_string(),
                }
            })?;
        let cross_repo_token = env::var("CROSS_REPO_TOKEN").ok().filter(|t| !t.is_empty());
        let queue_token = env::var("QUEUE_API_TOKEN").ok().filter(|t| !t.is_empty());
        Ok(Self { tracker_token, cross_repo_token, queue_token })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Keep tokens out of logs.
        f.debug_struct("Credentials").finish_non_exhaustive()
    }
}
