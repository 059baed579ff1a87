//! Webhook intake matrix: signatures, event filtering, response codes.

mod common;

use autocrew::executor;
use autocrew::reviewer;
use autocrew::vcs::Factory;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{RecordingNotifier, RecordingProvider, ScriptedClient};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;

const SECRET: &str = "s3cret";

fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

fn executor_router(github_secret: &str, gitlab_secret: &str) -> Router {
    let agent = executor::Executor::new(Arc::new(ScriptedClient::new(vec![])));
    let worker = Arc::new(executor::Worker::new(
        agent,
        Arc::new(Factory::new(None, None)),
        String::new(),
    ));
    executor::WebhookServer::new(
        worker,
        github_secret.to_string(),
        gitlab_secret.to_string(),
        TaskTracker::new(),
    )
    .router()
}

fn reviewer_router(github_secret: &str, gitlab_secret: &str) -> Router {
    let agent = reviewer::Reviewer::new(Arc::new(ScriptedClient::new(vec![])));
    let provider = Arc::new(RecordingProvider::new("https://github.com/org/repo"));
    let worker = Arc::new(reviewer::Worker::new(
        agent,
        Arc::new(common::FixedResolver { provider }),
        Arc::new(RecordingNotifier::default()),
    ));
    reviewer::WebhookServer::new(
        worker,
        github_secret.to_string(),
        gitlab_secret.to_string(),
        TaskTracker::new(),
    )
    .router()
}

async fn post_github(router: Router, event: &str, signature: Option<&str>, body: &[u8]) -> StatusCode {
    let mut request = Request::builder()
        .method("POST")
        .uri("/webhook/github")
        .header("x-github-event", event)
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        request = request.header("x-hub-signature-256", signature);
    }
    router
        .oneshot(request.body(Body::from(body.to_vec())).unwrap())
        .await
        .unwrap()
        .status()
}

async fn post_gitlab(router: Router, token: Option<&str>, body: &[u8]) -> StatusCode {
    let mut request = Request::builder()
        .method("POST")
        .uri("/webhook/gitlab")
        .header("content-type", "application/json");
    if let Some(token) = token {
        request = request.header("x-gitlab-token", token);
    }
    router
        .oneshot(request.body(Body::from(body.to_vec())).unwrap())
        .await
        .unwrap()
        .status()
}

fn github_issue_event(label: &str) -> Vec<u8> {
    json!({
        "action": "labeled",
        "label": {"name": label},
        "issue": {"number": 7, "title": "Add /healthz"},
        "repository": {"html_url": "https://github.com/org/repo"}
    })
    .to_string()
    .into_bytes()
}

fn gitlab_issue_event(current: &[&str], previous: &[&str]) -> Vec<u8> {
    let as_labels = |names: &[&str]| -> Value {
        names.iter().map(|n| json!({"name": n})).collect()
    };
    json!({
        "object_kind": "issue",
        "changes": {"labels": {"current": as_labels(current), "previous": as_labels(previous)}},
        "object_attributes": {"iid": 7},
        "project": {"web_url": "https://gitlab.com/acme/svc"}
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn github_ready_label_is_accepted() {
    let body = github_issue_event("agent:ready");
    let sig = sign(SECRET, &body);
    let status = post_github(executor_router(SECRET, ""), "issues", Some(&sig), &body).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn github_revision_label_reenters_the_executor() {
    let body = github_issue_event("agent:revision");
    let sig = sign(SECRET, &body);
    let status = post_github(executor_router(SECRET, ""), "issues", Some(&sig), &body).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn github_unrelated_label_is_ignored() {
    let body = github_issue_event("discussion");
    let sig = sign(SECRET, &body);
    let status = post_github(executor_router(SECRET, ""), "issues", Some(&sig), &body).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn github_unrelated_event_is_ignored() {
    let body = github_issue_event("agent:ready");
    let sig = sign(SECRET, &body);
    let status = post_github(executor_router(SECRET, ""), "push", Some(&sig), &body).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn github_bad_signature_is_unauthorized() {
    let body = github_issue_event("agent:ready");
    let status = post_github(
        executor_router(SECRET, ""),
        "issues",
        Some("sha256=deadbeef"),
        &body,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let status = post_github(executor_router(SECRET, ""), "issues", None, &body).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn github_malformed_json_is_bad_request() {
    let body = b"{not json";
    let sig = sign(SECRET, body);
    let status = post_github(executor_router(SECRET, ""), "issues", Some(&sig), body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn github_empty_secret_disables_verification() {
    let body = github_issue_event("agent:ready");
    let status = post_github(executor_router("", ""), "issues", None, &body).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn gitlab_label_transition_is_accepted() {
    let body = gitlab_issue_event(&["bug", "agent:ready"], &["bug"]);
    let status = post_gitlab(executor_router("", SECRET), Some(SECRET), &body).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn gitlab_preexisting_label_is_ignored() {
    let body = gitlab_issue_event(&["agent:ready"], &["agent:ready"]);
    let status = post_gitlab(executor_router("", SECRET), Some(SECRET), &body).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn gitlab_token_mismatch_is_unauthorized() {
    let body = gitlab_issue_event(&["agent:ready"], &[]);
    let status = post_gitlab(executor_router("", SECRET), Some("wrong"), &body).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let status = post_gitlab(executor_router("", SECRET), None, &body).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn reviewer_accepts_review_labeled_pull_requests() {
    let body = json!({
        "action": "labeled",
        "label": {"name": "agent:review"},
        "pull_request": {"number": 8},
        "repository": {"html_url": "https://github.com/org/repo"}
    })
    .to_string()
    .into_bytes();
    let sig = sign(SECRET, &body);
    let status = post_github(
        reviewer_router(SECRET, ""),
        "pull_request",
        Some(&sig),
        &body,
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn reviewer_ignores_issue_events() {
    let body = github_issue_event("agent:review");
    let sig = sign(SECRET, &body);
    let status = post_github(reviewer_router(SECRET, ""), "issues", Some(&sig), &body).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn gitlab_merge_request_review_label_is_accepted() {
    let body = json!({
        "object_kind": "merge_request",
        "changes": {"labels": {
            "current": [{"name": "agent:review"}],
            "previous": []
        }},
        "object_attributes": {"iid": 8},
        "project": {"web_url": "https://gitlab.com/acme/svc"}
    })
    .to_string()
    .into_bytes();
    let status = post_gitlab(reviewer_router("", SECRET), Some(SECRET), &body).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn health_endpoint_answers() {
    let response = executor_router("", "")
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
