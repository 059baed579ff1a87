//! Executor worker: one call per accepted webhook event.

use super::agent::{ExecutionResult, Executor};
use crate::vcs::{labels, ChangeRequestInput, ProviderResolver};
use anyhow::{Context, Result};
use std::sync::Arc;

pub struct Worker {
    agent: Executor,
    factory: Arc<dyn ProviderResolver>,
    /// Token injected into clone URLs; the same token the tracker uses.
    clone_token: String,
}

impl Worker {
    pub fn new(agent: Executor, factory: Arc<dyn ProviderResolver>, clone_token: String) -> Self {
        Self {
            agent,
            factory,
            clone_token,
        }
    }

    pub async fn handle_issue(&self, repo_url: &str, issue_number: u64) -> Result<()> {
        let (provider, _info) = self
            .factory
            .provider_for(repo_url)
            .context("build provider")?;

        // The webhook payload carries only a stub; fetch the body too.
        let issue = provider
            .get_issue(issue_number)
            .await
            .context("fetch issue")?;

        tracing::info!(issue = issue.number, title = %issue.title, "handling issue");

        let result = self
            .agent
            .run(&issue, provider.as_ref(), &self.clone_token)
            .await
            .context("agent run")?;

        let cr_url = provider
            .open_change_request(ChangeRequestInput {
                title: result.title.clone(),
                body: build_cr_body(&result),
                head_branch: result.branch.clone(),
                base_branch: "main".to_string(),
                draft: false,
            })
            .await
            .context("open change request")?;

        tracing::info!(url = %cr_url, issue = issue.number, "change request opened");

        // Non-fatal: the change request is open regardless.
        if let Err(err) = provider.add_label(issue.number, labels::REVIEW).await {
            tracing::warn!(error = %err, "failed to add review label");
        }

        Ok(())
    }
}

/// The `Closes <url>` line is machine-read by the reviewer.
pub fn build_cr_body(result: &ExecutionResult) -> String {
    format!(
        "{}\n\n---\nCloses {}\n\n*Opened by the Executor Agent*",
        result.summary, result.issue_url
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::extract_issue_url;

    #[test]
    fn cr_body_carries_machine_readable_closes_line() {
        let body = build_cr_body(&ExecutionResult {
            branch: "agent/issue-7-add-healthz".into(),
            title: "Add /healthz".into(),
            summary: "Adds a liveness endpoint.".into(),
            issue_url: "https://github.com/org/repo/issues/7".into(),
        });
        assert!(body.starts_with("Adds a liveness endpoint.\n\n---\n"));
        assert!(body.ends_with("*Opened by the Executor Agent*"));
        assert_eq!(
            extract_issue_url(&body).as_deref(),
            Some("https://github.com/org/repo/issues/7")
        );
    }
}
