//! Tracker / VCS provider abstraction
//!
//! One capability set over two provider families. GitHub and GitLab diverge
//! materially in how reviews are posted and how labels change; everything the
//! agents consume goes through [`Provider`] so no provider vocabulary leaks
//! into agent code.

pub mod github;
pub mod gitlab;
pub mod resolver;

pub use resolver::{parse_repo_url, Factory, Platform, RepoInfo};

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// The label contract shared with external providers: the sole coordination
/// primitive between the services.
pub mod labels {
    pub const READY: &str = "agent:ready";
    pub const REVIEW: &str = "agent:review";
    pub const REVISION: &str = "agent:revision";
    pub const APPROVED: &str = "agent:approved";
}

#[derive(Debug, Clone, Default)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub url: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IssueInput {
    pub title: String,
    /// Markdown body.
    pub body: String,
    pub labels: Vec<String>,
}

/// A pull request or merge request.
#[derive(Debug, Clone, Default)]
pub struct ChangeRequest {
    pub number: u64,
    pub title: String,
    /// The body written by the executor.
    pub description: String,
    pub url: String,
    pub head_branch: String,
    pub base_branch: String,
    /// Unified diff of all changes.
    pub diff: String,
    /// The originating issue URL parsed from the description.
    pub issue_url: String,
}

#[derive(Debug, Clone)]
pub struct ChangeRequestInput {
    pub title: String,
    pub body: String,
    pub head_branch: String,
    pub base_branch: String,
    pub draft: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approve,
    RequestChanges,
    Comment,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Verdict::Approve => "approve",
            Verdict::RequestChanges => "request_changes",
            Verdict::Comment => "comment",
        };
        f.write_str(s)
    }
}

/// Which side of the diff an inline comment anchors to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Side {
    Old,
    #[default]
    New,
}

#[derive(Debug, Clone)]
pub struct ReviewComment {
    pub path: String,
    pub line: u64,
    pub body: String,
    pub side: Side,
}

#[derive(Debug, Clone)]
pub struct Review {
    pub verdict: Verdict,
    pub summary: String,
    pub comments: Vec<ReviewComment>,
}

/// The seam the workers resolve providers through; [`Factory`] is the real
/// implementation.
pub trait ProviderResolver: Send + Sync {
    fn provider_for(&self, repo_url: &str) -> Result<(std::sync::Arc<dyn Provider>, RepoInfo)>;
}

#[async_trait]
pub trait Provider: Send + Sync {
    async fn create_issue(&self, input: IssueInput) -> Result<Issue>;
    async fn get_issue(&self, number: u64) -> Result<Issue>;
    /// Idempotent: adding a label that is already present is not an error.
    async fn add_label(&self, number: u64, label: &str) -> Result<()>;
    /// Returns the URL of the opened change request.
    async fn open_change_request(&self, input: ChangeRequestInput) -> Result<String>;
    async fn get_change_request(&self, number: u64) -> Result<ChangeRequest>;
    async fn post_review(&self, number: u64, review: &Review) -> Result<()>;
    async fn get_cr_comments(&self, number: u64) -> Result<Vec<ReviewComment>>;
    fn repo_url(&self) -> &str;
}

/// Recover the linked issue URL from a change-request body: the first line
/// starting with `Closes `.
pub fn extract_issue_url(body: &str) -> Option<String> {
    body.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("Closes "))
        .map(|url| url.to_string())
}

/// Parse the issue number out of a tracker URL: the final `/`-separated path
/// segment as an integer.
pub fn parse_issue_number(url: &str) -> Option<u64> {
    url.trim_end_matches('/').rsplit('/').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_closes_line() {
        let body = "Adds rate limiting.\n\n---\nCloses https://github.com/org/repo/issues/42\n\n*Opened by the Executor Agent*";
        assert_eq!(
            extract_issue_url(body).as_deref(),
            Some("https://github.com/org/repo/issues/42")
        );
    }

    #[test]
    fn extract_ignores_bodies_without_closes() {
        assert_eq!(extract_issue_url("just a summary"), None);
    }

    #[test]
    fn parses_trailing_issue_number() {
        assert_eq!(
            parse_issue_number("https://host/org/repo/issues/42"),
            Some(42)
        );
        assert_eq!(
            parse_issue_number("https://gitlab.com/acme/svc/-/issues/13/"),
            Some(13)
        );
        assert_eq!(parse_issue_number("https://host/org/repo/issues/"), None);
        assert_eq!(parse_issue_number("not-a-url"), None);
    }

    #[test]
    fn closes_line_round_trips_to_number() {
        let body = "Closes https://host/org/repo/issues/42";
        let url = extract_issue_url(body).unwrap();
        assert_eq!(parse_issue_number(&url), Some(42));
    }
}
