//! Per-service configuration from environment variables.
//!
//! Each service names exactly what it needs and fails fast at startup with
//! the missing variable spelled out. At least one tracker token is required
//! everywhere; the provider factory refuses to build a provider whose token
//! is absent.

use anyhow::{bail, Context, Result};

pub struct PlannerConfig {
    pub anthropic_api_key: String,
    pub slack_bot_token: String,
    pub slack_app_token: String,
    pub github_token: Option<String>,
    pub gitlab_token: Option<String>,
}

pub struct ExecutorConfig {
    pub anthropic_api_key: String,
    pub github_token: Option<String>,
    pub gitlab_token: Option<String>,
    pub github_webhook_secret: String,
    pub gitlab_webhook_secret: String,
    pub listen_addr: String,
}

pub struct ReviewerConfig {
    pub anthropic_api_key: String,
    pub github_token: Option<String>,
    pub gitlab_token: Option<String>,
    pub github_webhook_secret: String,
    pub gitlab_webhook_secret: String,
    pub slack_bot_token: String,
    pub slack_notify_channel: String,
    pub listen_addr: String,
}

impl PlannerConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            anthropic_api_key: require("ANTHROPIC_API_KEY")?,
            slack_bot_token: require("SLACK_BOT_TOKEN")?,
            slack_app_token: require("SLACK_APP_TOKEN")?,
            github_token: optional("GITHUB_TOKEN"),
            gitlab_token: optional("GITLAB_TOKEN"),
        };
        require_tracker_token(&config.github_token, &config.gitlab_token)?;
        Ok(config)
    }
}

impl ExecutorConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            anthropic_api_key: require("ANTHROPIC_API_KEY")?,
            github_token: optional("GITHUB_TOKEN"),
            gitlab_token: optional("GITLAB_TOKEN"),
            github_webhook_secret: optional("GITHUB_WEBHOOK_SECRET").unwrap_or_default(),
            gitlab_webhook_secret: optional("GITLAB_WEBHOOK_SECRET").unwrap_or_default(),
            listen_addr: or_default("EXECUTOR_ADDR", "0.0.0.0:8080"),
        };
        require_tracker_token(&config.github_token, &config.gitlab_token)?;
        Ok(config)
    }

    /// The token injected into clone URLs; whichever tracker token is set.
    pub fn clone_token(&self) -> String {
        self.github_token
            .clone()
            .or_else(|| self.gitlab_token.clone())
            .unwrap_or_default()
    }
}

impl ReviewerConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            anthropic_api_key: require("ANTHROPIC_API_KEY")?,
            github_token: optional("GITHUB_TOKEN"),
            gitlab_token: optional("GITLAB_TOKEN"),
            github_webhook_secret: optional("GITHUB_WEBHOOK_SECRET").unwrap_or_default(),
            gitlab_webhook_secret: optional("GITLAB_WEBHOOK_SECRET").unwrap_or_default(),
            slack_bot_token: require("SLACK_BOT_TOKEN")?,
            slack_notify_channel: require("SLACK_NOTIFY_CHANNEL")?,
            listen_addr: or_default("REVIEWER_ADDR", "0.0.0.0:8081"),
        };
        require_tracker_token(&config.github_token, &config.gitlab_token)?;
        Ok(config)
    }
}

fn require(key: &str) -> Result<String> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .with_context(|| format!("missing required environment variable {key}"))
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn or_default(key: &str, default: &str) -> String {
    optional(key).unwrap_or_else(|| default.to_string())
}

fn require_tracker_token(github: &Option<String>, gitlab: &Option<String>) -> Result<()> {
    if github.is_none() && gitlab.is_none() {
        bail!("at least one of GITHUB_TOKEN or GITLAB_TOKEN must be set");
    }
    Ok(())
}

macro_rules! redacted_debug {
    ($type:ty, $($field:ident),+) => {
        impl std::fmt::Debug for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($type))
                    $(.field(stringify!($field), &"<REDACTED>"))+
                    .finish_non_exhaustive()
            }
        }
    };
}

redacted_debug!(PlannerConfig, anthropic_api_key, slack_bot_token, slack_app_token);
redacted_debug!(ExecutorConfig, anthropic_api_key);
redacted_debug!(ReviewerConfig, anthropic_api_key, slack_bot_token);
