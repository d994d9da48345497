use std::{env, path::PathBuf, process::exit, sync::Arc};

use anyhow::Result;
use argp::FromArgs;
use storesync_core::{
    config::{Config, Credentials},
    models::Action,
};
use storesync_db::Database;
use storesync_github::{
    Tracker,
    events::{Invocation, build_trigger},
};
use storesync_queue::JobQueueClient;
use storesync_sync::{RunReport, SyncContext};
use time::UtcDateTime;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

#[derive(FromArgs, Debug)]
/// Coordinates product sync between the issue tracker and the commerce job
/// queue: resolves what launched the run, executes the matching action, and
/// reports the result back to the tracker.
struct Args {
    #[argp(option, short = 'c', default = "default_config_path()")]
    /// config file path (default: config.yml)
    config: PathBuf,
    #[argp(option)]
    /// platform event name (default: $GITHUB_EVENT_NAME)
    event_name: Option<String>,
    #[argp(option)]
    /// path to the JSON event payload (default: $GITHUB_EVENT_PATH)
    event_path: Option<PathBuf>,
    #[argp(option, from_str_fn(parse_action))]
    /// run this action directly: process, check_jobs or sync_status
    action: Option<Action>,
    #[argp(option)]
    /// lease holder id (default: $GITHUB_RUN_ID, or random)
    holder_id: Option<String>,
}

fn default_config_path() -> PathBuf { PathBuf::from("config.yml") }

fn parse_action(value: &str) -> Result<Action, String> {
    value.parse().map_err(|()| {
        format!("unknown action '{value}' (expected process, check_jobs or sync_status)")
    })
}

#[tokio::main]
async fn main() {
    let args: Args = argp::parse_args_or_exit(argp::DEFAULT);
    let env_filter = EnvFilter::builder()
        // Default to info level
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    match run(args).await {
        Ok(report) => {
            println!("{}", report.summary());
            exit(report.exit_code());
        }
        Err(e) => {
            tracing::error!("{e:?}");
            exit(1);
        }
    }
}

async fn run(args: Args) -> Result<RunReport> {
    let config = Arc::new(Config::load(&args.config)?);
    let credentials = Credentials::from_env()?;

    let invocation = build_invocation(&args);
    let trigger = build_trigger(&invocation, &config.tracker.full_name(), UtcDateTime::now());

    let db = Arc::new(Database::new(&config.db).await?);
    let tracker = Tracker::new(&config.tracker, &credentials).await?;
    let queue = JobQueueClient::new(&config.queue, credentials.queue_token.clone())?;
    let holder_id = args
        .holder_id
        .or_else(|| env::var("GITHUB_RUN_ID").ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let ctx = SyncContext {
        config,
        holder_id,
        tracker,
        queue,
        lease: db.clone(),
        state: db.clone(),
    };
    let report = storesync_sync::run(&ctx, &trigger).await;
    db.close().await;
    report
}

fn build_invocation(args: &Args) -> Invocation {
    let event_name = args
        .event_name
        .clone()
        .or_else(|| env::var("GITHUB_EVENT_NAME").ok().filter(|v| !v.is_empty()));
    let event_path =
        args.event_path.clone().or_else(|| env::var("GITHUB_EVENT_PATH").ok().map(PathBuf::from));
    let payload = event_path.and_then(|path| match std::fs::read_to_string(&path) {
        Ok(raw) => Some(raw),
        Err(e) => {
            tracing::warn!("Failed to read event payload {}: {e}", path.display());
            None
        }
    });
    Invocation { event_name, payload, manual_action: args.action }
}
