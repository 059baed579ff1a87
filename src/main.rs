//! autocrew - label-driven multi-agent development workflow.
//!
//! One binary, three long-running services:
//! - `planner`: Slack socket-mode assistant that turns a conversation into
//!   tracker issues labeled `agent:ready`.
//! - `executor`: webhook service that turns a labeled issue into a change
//!   request labeled `agent:review`.
//! - `reviewer`: webhook service that adjudicates change requests, labeling
//!   `agent:revision` or `agent:approved`.

use anyhow::{Context, Result};
use autocrew::chat::SocketMode;
use autocrew::config::{ExecutorConfig, PlannerConfig, ReviewerConfig};
use autocrew::executor;
use autocrew::llm::Client;
use autocrew::planner::{Planner, SessionStore};
use autocrew::reviewer::{self, Reviewer, SlackNotifier};
use autocrew::vcs::Factory;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);
const AGENT_MAX_TOKENS: u32 = 16000;

#[derive(Parser)]
#[command(name = "autocrew", version, about = "Label-driven multi-agent development workflow")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the Slack planning assistant
    Planner,
    /// Run the issue executor webhook service
    Executor,
    /// Run the change-request reviewer webhook service
    Reviewer,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Local .env for developer workflows; real environment takes precedence.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Planner => run_planner().await,
        Command::Executor => run_executor().await,
        Command::Reviewer => run_reviewer().await,
    }
}

async fn run_planner() -> Result<()> {
    let config = PlannerConfig::from_env()?;

    let sessions = Arc::new(SessionStore::new());
    let llm = Arc::new(Client::new(config.anthropic_api_key));
    let factory = Arc::new(Factory::new(config.github_token, config.gitlab_token));
    let planner = Arc::new(Planner::new(sessions, llm, factory));

    let socket = SocketMode::new(config.slack_bot_token, config.slack_app_token, planner);

    tracing::info!("planner starting");
    tokio::select! {
        result = socket.run() => result,
        _ = shutdown_signal() => {
            tracing::info!("shutting down");
            Ok(())
        }
    }
}

async fn run_executor() -> Result<()> {
    let config = ExecutorConfig::from_env()?;
    let clone_token = config.clone_token();

    let llm = Arc::new(Client::new(config.anthropic_api_key).with_max_tokens(AGENT_MAX_TOKENS));
    let factory = Arc::new(Factory::new(config.github_token, config.gitlab_token));
    let agent = executor::Executor::new(llm);
    let worker = Arc::new(executor::Worker::new(agent, factory, clone_token));

    let jobs = TaskTracker::new();
    let server = executor::WebhookServer::new(
        worker,
        config.github_webhook_secret,
        config.gitlab_webhook_secret,
        jobs.clone(),
    );

    serve("executor", &config.listen_addr, server.router(), jobs).await
}

async fn run_reviewer() -> Result<()> {
    let config = ReviewerConfig::from_env()?;

    let llm = Arc::new(Client::new(config.anthropic_api_key).with_max_tokens(AGENT_MAX_TOKENS));
    let factory = Arc::new(Factory::new(config.github_token, config.gitlab_token));
    let notifier = Arc::new(SlackNotifier::new(
        config.slack_bot_token,
        config.slack_notify_channel,
    ));
    let agent = Reviewer::new(llm);
    let worker = Arc::new(reviewer::Worker::new(agent, factory, notifier));

    let jobs = TaskTracker::new();
    let server = reviewer::WebhookServer::new(
        worker,
        config.github_webhook_secret,
        config.gitlab_webhook_secret,
        jobs.clone(),
    );

    serve("reviewer", &config.listen_addr, server.router(), jobs).await
}

/// Serve until a shutdown signal, then give in-flight jobs a bounded grace
/// period to drain.
async fn serve(service: &str, addr: &str, router: axum::Router, jobs: TaskTracker) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(service, addr, "webhook server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;

    tracing::info!("shutting down");
    jobs.close();
    if tokio::time::timeout(SHUTDOWN_GRACE, jobs.wait()).await.is_err() {
        tracing::warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "grace period elapsed with jobs still in flight"
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
