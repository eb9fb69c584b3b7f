//! # Deskclaw — automation daemon for the desktop assistant
//!
//! Runs the two automation cores headlessly:
//! - the recurring-prompt scheduler (cron expressions → agent prompts)
//! - the capability-aware task queue (deadline sweeps + cleanup)
//!
//! Usage:
//!   deskclaw                              # Start the daemon
//!   deskclaw --data-dir ./state           # Custom state directory
//!   deskclaw --describe "0 9 * * *"       # Explain a cron expression and exit

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use deskclaw_core::DeskclawConfig;
use deskclaw_queue::{QueueStore, RetryPolicy, TaskQueue};
use deskclaw_scheduler::{CronExpression, ScheduleExecutor, SchedulerEngine};

#[derive(Parser)]
#[command(
    name = "deskclaw",
    version,
    about = "🦞 Deskclaw — automation core for the desktop assistant"
)]
struct Cli {
    /// Config file path (default: ~/.deskclaw/config.toml)
    #[arg(long)]
    config: Option<String>,

    /// State directory (overrides [scheduler] data_dir)
    #[arg(long)]
    data_dir: Option<String>,

    /// Seconds between schedule due-checks (overrides [scheduler] tick_secs)
    #[arg(long)]
    tick_secs: Option<u64>,

    /// Agent endpoint URL (overrides [agent] url)
    #[arg(long)]
    agent_url: Option<String>,

    /// Parse a cron expression, print its description and next run, exit
    #[arg(long, value_name = "EXPR")]
    describe: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

/// Delivers fired prompts to the local assistant agent over HTTP.
/// Non-2xx responses and transport errors surface as schedule failures.
struct HttpExecutor {
    client: reqwest::Client,
    url: String,
    timeout: std::time::Duration,
}

#[async_trait::async_trait]
impl ScheduleExecutor for HttpExecutor {
    async fn execute(&self, prompt: &str, agent_name: &str) -> Result<String, String> {
        let resp = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "prompt": prompt, "agent": agent_name }))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| format!("agent request failed: {e}"))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if status.is_success() {
            Ok(body)
        } else {
            Err(format!("agent returned {status}: {body}"))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "deskclaw=debug,deskclaw_scheduler=debug,deskclaw_queue=debug"
    } else {
        "deskclaw=info,deskclaw_scheduler=info,deskclaw_queue=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    if let Some(expr) = &cli.describe {
        return describe_expression(expr);
    }

    let mut config = match &cli.config {
        Some(path) => DeskclawConfig::load_from(&expand_path(path))?,
        None => DeskclawConfig::load()?,
    };
    if let Some(dir) = &cli.data_dir {
        config.scheduler.data_dir = dir.clone();
    }
    if let Some(secs) = cli.tick_secs {
        config.scheduler.tick_secs = secs;
    }
    if let Some(url) = &cli.agent_url {
        config.agent.url = url.clone();
    }

    let data_dir = expand_path(&config.scheduler.data_dir);
    tracing::info!("🦞 Deskclaw starting (state: {})", data_dir.display());

    let executor = Arc::new(HttpExecutor {
        client: reqwest::Client::new(),
        url: config.agent.url.clone(),
        timeout: std::time::Duration::from_secs(config.agent.timeout_secs),
    });

    let engine = Arc::new(SchedulerEngine::new(
        &data_dir,
        executor,
        config.scheduler.history_cap,
    ));
    let queue = Arc::new(TaskQueue::with_store(
        RetryPolicy {
            max_retries: config.queue.max_retries,
            backoff: match config.queue.retry_backoff_secs {
                0 => None,
                secs => Some(chrono::Duration::seconds(secs as i64)),
            },
        },
        QueueStore::new(&data_dir.join("queue")),
    ));

    tokio::spawn(engine.clone().run(config.scheduler.tick_secs));
    tokio::spawn(queue_maintenance(queue.clone(), config.queue.clone()));

    tokio::signal::ctrl_c().await?;
    tracing::info!("👋 Deskclaw shutting down");
    Ok(())
}

/// Periodic queue upkeep: expire overdue tasks and drop old finished ones.
async fn queue_maintenance(queue: Arc<TaskQueue>, config: deskclaw_core::config::QueueConfig) {
    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(config.deadline_sweep_secs));
    let cleanup_age = chrono::Duration::seconds(config.cleanup_age_secs as i64);

    loop {
        interval.tick().await;
        let now = chrono::Utc::now();
        let expired = queue.check_deadlines(now).await;
        if expired > 0 {
            tracing::info!("⏱️ {expired} tasks exceeded their deadline");
        }
        queue.cleanup(cleanup_age, now).await;
    }
}

fn describe_expression(expr: &str) -> Result<()> {
    let parsed = CronExpression::parse(expr)?;
    println!("{}", parsed.describe());
    match parsed.next_after(chrono::Utc::now()) {
        Some(next) => println!("next run: {}", next.to_rfc3339()),
        None => println!("next run: never (no matching date)"),
    }
    Ok(())
}
