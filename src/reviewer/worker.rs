//! Reviewer worker: fetch, adjudicate, label.
//!
//! The worker never recurses: on `request_changes` it labels the issue and
//! returns, relying on the executor's webhook to pick the revision up and on
//! a fresh `agent:review` label to re-enter this worker. Revision rounds are
//! counted per change request in process-local memory (non-durable; a
//! restart resets the count).

use super::agent::Reviewer;
use super::notifier::{CrReadyMessage, Notifier};
use crate::vcs::{labels, parse_issue_number, Issue, ProviderResolver, Verdict};
use anyhow::{bail, Context, Result};
use dashmap::DashMap;
use std::sync::Arc;

const MAX_REVISION_ROUNDS: u32 = 5;

pub struct Worker {
    agent: Reviewer,
    factory: Arc<dyn ProviderResolver>,
    notifier: Arc<dyn Notifier>,
    /// Revision rounds per change request, keyed by `repo_url#number`.
    rounds: DashMap<String, u32>,
}

impl Worker {
    pub fn new(agent: Reviewer, factory: Arc<dyn ProviderResolver>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            agent,
            factory,
            notifier,
            rounds: DashMap::new(),
        }
    }

    pub async fn handle_change_request(&self, repo_url: &str, cr_number: u64) -> Result<()> {
        let (provider, _info) = self
            .factory
            .provider_for(repo_url)
            .context("build provider")?;

        let key = format!("{repo_url}#{cr_number}");
        let round = self.rounds.get(&key).map(|r| *r).unwrap_or(0);
        if round >= MAX_REVISION_ROUNDS {
            bail!("change request #{cr_number} exceeded {MAX_REVISION_ROUNDS} revision rounds");
        }

        let cr = provider
            .get_change_request(cr_number)
            .await
            .context("get change request")?;

        let mut issue = Issue::default();
        if !cr.issue_url.is_empty() {
            match parse_issue_number(&cr.issue_url) {
                Some(number) => match provider.get_issue(number).await {
                    Ok(full) => issue = full,
                    Err(err) => {
                        tracing::warn!(url = %cr.issue_url, error = %err, "could not fetch original issue");
                    }
                },
                None => {
                    tracing::warn!(url = %cr.issue_url, "could not parse issue number from linked URL");
                }
            }
        }

        tracing::info!(cr = cr_number, round, "reviewing change request");

        let review = self
            .agent
            .review(&cr, &issue)
            .await
            .context("agent review")?;

        provider
            .post_review(cr_number, &review)
            .await
            .context("post review")?;

        tracing::info!(
            cr = cr_number,
            verdict = %review.verdict,
            comments = review.comments.len(),
            "review posted"
        );

        match review.verdict {
            Verdict::Approve => {
                if let Err(err) = provider.add_label(issue.number, labels::APPROVED).await {
                    tracing::warn!(error = %err, "failed to add approved label");
                }
                let ready = CrReadyMessage {
                    cr_url: cr.url.clone(),
                    cr_title: cr.title.clone(),
                    issue_url: issue.url.clone(),
                    issue_title: issue.title.clone(),
                    repo_url: repo_url.to_string(),
                };
                if let Err(err) = self.notifier.notify_cr_ready(&ready).await {
                    tracing::warn!(error = %err, "failed to send approval notification");
                }
            }
            Verdict::RequestChanges => {
                // The executor picks this label up and pushes a revision,
                // which re-triggers review via a fresh agent:review label.
                provider
                    .add_label(issue.number, labels::REVISION)
                    .await
                    .context("add revision label")?;
                *self.rounds.entry(key).or_insert(0) += 1;
                tracing::info!(cr = cr_number, round = round + 1, "requested changes — executor will revise");
            }
            Verdict::Comment => {
                tracing::info!(cr = cr_number, "review posted as comment — no action required");
            }
        }

        Ok(())
    }
}
