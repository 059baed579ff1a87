//! GitHub-family provider over the REST v3 API

use super::{
    extract_issue_url, ChangeRequest, ChangeRequestInput, Issue, IssueInput, Provider, RepoInfo,
    Review, ReviewComment, Side, Verdict,
};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

const API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("autocrew/", env!("CARGO_PKG_VERSION"));

pub struct GitHubProvider {
    http: reqwest::Client,
    token: String,
    api_base: String,
    info: RepoInfo,
}

impl GitHubProvider {
    pub fn new(token: String, info: RepoInfo) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            api_base: API_BASE.to_string(),
            info,
        }
    }

    fn repo_path(&self, tail: &str) -> String {
        format!(
            "{}/repos/{}/{}/{tail}",
            self.api_base, self.info.owner, self.info.repo
        )
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: String,
        body: Option<Value>,
        what: &str,
    ) -> Result<T> {
        let mut req = self
            .http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("accept", "application/vnd.github+json")
            .header("user-agent", USER_AGENT);
        if let Some(body) = body {
            req = req.json(&body);
        }

        let response = req.send().await.with_context(|| format!("github {what}"))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("github {what}: read response"))?;
        if !status.is_success() {
            bail!("github {what}: {status}: {}", &text[..text.len().min(300)]);
        }
        serde_json::from_str(&text).with_context(|| format!("github {what}: parse response"))
    }

    async fn get_cr_diff(&self, number: u64) -> Result<String> {
        let files: Vec<PullFile> = self
            .request(
                Method::GET,
                self.repo_path(&format!("pulls/{number}/files")),
                None,
                "list change request files",
            )
            .await?;

        let mut diff = String::new();
        for file in files {
            diff.push_str(&format!("--- {0}\n+++ {0}\n", file.filename));
            if let Some(patch) = &file.patch {
                diff.push_str(patch);
            }
            diff.push('\n');
        }
        Ok(diff)
    }
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    html_url: String,
    #[serde(default)]
    labels: Vec<LabelResponse>,
}

#[derive(Debug, Deserialize)]
struct LabelResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    html_url: String,
    head: RefResponse,
    base: RefResponse,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct PullFile {
    filename: String,
    #[serde(default)]
    patch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PullCommentResponse {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    line: Option<u64>,
    #[serde(default)]
    body: String,
}

fn issue_from_response(resp: IssueResponse) -> Issue {
    Issue {
        number: resp.number,
        title: resp.title,
        body: resp.body.unwrap_or_default(),
        url: resp.html_url,
        labels: resp.labels.into_iter().map(|l| l.name).collect(),
    }
}

fn verdict_event(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Approve => "APPROVE",
        Verdict::RequestChanges => "REQUEST_CHANGES",
        Verdict::Comment => "COMMENT",
    }
}

fn side_name(side: Side) -> &'static str {
    match side {
        Side::Old => "LEFT",
        Side::New => "RIGHT",
    }
}

#[async_trait]
impl Provider for GitHubProvider {
    async fn create_issue(&self, input: IssueInput) -> Result<Issue> {
        let resp: IssueResponse = self
            .request(
                Method::POST,
                self.repo_path("issues"),
                Some(json!({
                    "title": input.title,
                    "body": input.body,
                    "labels": input.labels,
                })),
                "create issue",
            )
            .await?;
        Ok(issue_from_response(resp))
    }

    async fn get_issue(&self, number: u64) -> Result<Issue> {
        let resp: IssueResponse = self
            .request(
                Method::GET,
                self.repo_path(&format!("issues/{number}")),
                None,
                "get issue",
            )
            .await?;
        Ok(issue_from_response(resp))
    }

    async fn add_label(&self, number: u64, label: &str) -> Result<()> {
        let _: Vec<LabelResponse> = self
            .request(
                Method::POST,
                self.repo_path(&format!("issues/{number}/labels")),
                Some(json!({"labels": [label]})),
                "add label",
            )
            .await?;
        Ok(())
    }

    async fn open_change_request(&self, input: ChangeRequestInput) -> Result<String> {
        let resp: PullResponse = self
            .request(
                Method::POST,
                self.repo_path("pulls"),
                Some(json!({
                    "title": input.title,
                    "body": input.body,
                    "head": input.head_branch,
                    "base": input.base_branch,
                    "draft": input.draft,
                })),
                "open change request",
            )
            .await?;
        Ok(resp.html_url)
    }

    async fn get_change_request(&self, number: u64) -> Result<ChangeRequest> {
        let resp: PullResponse = self
            .request(
                Method::GET,
                self.repo_path(&format!("pulls/{number}")),
                None,
                "get change request",
            )
            .await?;
        let diff = self.get_cr_diff(number).await?;
        let description = resp.body.unwrap_or_default();
        let issue_url = extract_issue_url(&description).unwrap_or_default();

        Ok(ChangeRequest {
            number: resp.number,
            title: resp.title,
            description,
            url: resp.html_url,
            head_branch: resp.head.name,
            base_branch: resp.base.name,
            diff,
            issue_url,
        })
    }

    /// One atomic review submission carrying the verdict, summary, and all
    /// inline comments.
    async fn post_review(&self, number: u64, review: &Review) -> Result<()> {
        let comments: Vec<Value> = review
            .comments
            .iter()
            .map(|c| {
                json!({
                    "path": c.path,
                    "line": c.line,
                    "body": c.body,
                    "side": side_name(c.side),
                })
            })
            .collect();

        let _: Value = self
            .request(
                Method::POST,
                self.repo_path(&format!("pulls/{number}/reviews")),
                Some(json!({
                    "event": verdict_event(review.verdict),
                    "body": review.summary,
                    "comments": comments,
                })),
                "post review",
            )
            .await?;
        Ok(())
    }

    async fn get_cr_comments(&self, number: u64) -> Result<Vec<ReviewComment>> {
        let comments: Vec<PullCommentResponse> = self
            .request(
                Method::GET,
                self.repo_path(&format!("pulls/{number}/comments")),
                None,
                "get change request comments",
            )
            .await?;
        Ok(comments
            .into_iter()
            .map(|c| ReviewComment {
                path: c.path.unwrap_or_default(),
                line: c.line.unwrap_or_default(),
                body: c.body,
                side: Side::New,
            })
            .collect())
    }

    fn repo_url(&self) -> &str {
        &self.info.raw_url
    }
}
