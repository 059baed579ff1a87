//! Executor webhook intake.
//!
//! Accepts GitHub `issues`/`labeled` and GitLab `issue` label-added events
//! for `agent:ready` and `agent:revision`, schedules the job on a fresh
//! background task, and answers 202 before the job runs. The revision label
//! re-enters the executor after the reviewer requests changes.

use super::worker::Worker;
use crate::vcs::labels;
use crate::webhook::{label_added, verify_github_signature, verify_gitlab_token, LabelChanges};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

const TRIGGER_LABELS: [&str; 2] = [labels::READY, labels::REVISION];

pub struct WebhookServer {
    worker: Arc<Worker>,
    github_secret: String,
    gitlab_secret: String,
    jobs: TaskTracker,
}

impl WebhookServer {
    pub fn new(
        worker: Arc<Worker>,
        github_secret: String,
        gitlab_secret: String,
        jobs: TaskTracker,
    ) -> Self {
        Self {
            worker,
            github_secret,
            gitlab_secret,
            jobs,
        }
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/webhook/github", post(handle_github))
            .route("/webhook/gitlab", post(handle_gitlab))
            .route("/health", get(health))
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(Duration::from_secs(10)))
            .with_state(Arc::new(self))
    }

    /// Fire-and-forget: the job's outcome never changes the HTTP response.
    fn schedule(&self, repo_url: String, issue_number: u64) {
        let worker = self.worker.clone();
        let job = Uuid::new_v4();
        tracing::info!(job = %job, issue = issue_number, repo = %repo_url, "scheduling issue job");
        self.jobs.spawn(async move {
            if let Err(err) = worker.handle_issue(&repo_url, issue_number).await {
                tracing::error!(job = %job, issue = issue_number, error = ?err, "issue job failed");
            }
        });
    }
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct GitHubIssuePayload {
    #[serde(default)]
    action: String,
    #[serde(default)]
    label: NamedLabel,
    issue: IssueStub,
    repository: RepositoryStub,
}

#[derive(Debug, Default, Deserialize)]
struct NamedLabel {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct IssueStub {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct RepositoryStub {
    html_url: String,
}

async fn handle_github(
    State(server): State<Arc<WebhookServer>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok());
    if !verify_github_signature(&server.github_secret, &body, signature) {
        tracing::warn!("github webhook signature verification failed");
        return StatusCode::UNAUTHORIZED;
    }

    let event = headers.get("x-github-event").and_then(|v| v.to_str().ok());
    if event != Some("issues") {
        return StatusCode::NO_CONTENT;
    }

    let payload: GitHubIssuePayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => return StatusCode::BAD_REQUEST,
    };

    if payload.action != "labeled" || !TRIGGER_LABELS.contains(&payload.label.name.as_str()) {
        return StatusCode::NO_CONTENT;
    }

    server.schedule(payload.repository.html_url, payload.issue.number);
    StatusCode::ACCEPTED
}

#[derive(Debug, Deserialize)]
struct GitLabIssuePayload {
    #[serde(default)]
    object_kind: String,
    #[serde(default)]
    changes: GitLabChanges,
    object_attributes: GitLabIssueAttributes,
    project: GitLabProjectStub,
}

#[derive(Debug, Default, Deserialize)]
struct GitLabChanges {
    #[serde(default)]
    labels: LabelChanges,
}

#[derive(Debug, Deserialize)]
struct GitLabIssueAttributes {
    iid: u64,
}

#[derive(Debug, Deserialize)]
struct GitLabProjectStub {
    web_url: String,
}

async fn handle_gitlab(
    State(server): State<Arc<WebhookServer>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let token = headers.get("x-gitlab-token").and_then(|v| v.to_str().ok());
    if !verify_gitlab_token(&server.gitlab_secret, token) {
        tracing::warn!("gitlab webhook token mismatch");
        return StatusCode::UNAUTHORIZED;
    }

    let payload: GitLabIssuePayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => return StatusCode::BAD_REQUEST,
    };

    if payload.object_kind != "issue" {
        return StatusCode::NO_CONTENT;
    }
    if !TRIGGER_LABELS
        .iter()
        .any(|&label| label_added(&payload.changes.labels, label))
    {
        return StatusCode::NO_CONTENT;
    }

    server.schedule(payload.project.web_url, payload.object_attributes.iid);
    StatusCode::ACCEPTED
}
