//! GitLab-family provider over the v4 REST API
//!
//! Reviews have no atomic submission here: the summary is posted as a
//! merge-request note, each inline comment becomes a discussion anchored to
//! the MR's diff refs, and an `approve` verdict additionally hits the
//! approval endpoint. Issue numbers are project-scoped IIDs.

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

pub struct GitLabProvider {
    http: reqwest::Client,
    token: String,
    base_url: String,
    info: RepoInfo,
}

impl GitLabProvider {
    pub fn new(token: String, base_url: String, info: RepoInfo) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
            info,
        }
    }

    /// URL-encoded `namespace/repo` project id. The namespace may itself
    /// contain slashes (subgroups), all of which must be encoded.
    fn project_id(&self) -> String {
        format!("{}/{}", self.info.owner, self.info.repo).replace('/', "%2F")
    }

    fn project_path(&self, tail: &str) -> String {
        format!(
            "{}/api/v4/projects/{}/{tail}",
            self.base_url,
            self.project_id()
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
            .header("PRIVATE-TOKEN", &self.token);
        if let Some(body) = body {
            req = req.json(&body);
        }

        let response = req.send().await.with_context(|| format!("gitlab {what}"))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("gitlab {what}: read response"))?;
        if !status.is_success() {
            bail!("gitlab {what}: {status}: {}", &text[..text.len().min(300)]);
        }
        serde_json::from_str(&text).with_context(|| format!("gitlab {what}: parse response"))
    }

    async fn get_mr_diff(&self, number: u64) -> Result<String> {
        let diffs: Vec<DiffResponse> = self
            .request(
                Method::GET,
                self.project_path(&format!("merge_requests/{number}/diffs")),
                None,
                "get change request diff",
            )
            .await?;

        let mut diff = String::new();
        for d in diffs {
            diff.push_str(&format!("--- {}\n+++ {}\n", d.old_path, d.new_path));
            diff.push_str(&d.diff);
            diff.push('\n');
        }
        Ok(diff)
    }
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    iid: u64,
    title: String,
    #[serde(default)]
    description: Option<String>,
    web_url: String,
    #[serde(default)]
    labels: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MergeRequestResponse {
    iid: u64,
    title: String,
    #[serde(default)]
    description: Option<String>,
    web_url: String,
    source_branch: String,
    target_branch: String,
    #[serde(default)]
    diff_refs: Option<DiffRefs>,
}

#[derive(Debug, Clone, Deserialize)]
struct DiffRefs {
    base_sha: String,
    head_sha: String,
    start_sha: String,
}

#[derive(Debug, Deserialize)]
struct DiffResponse {
    old_path: String,
    new_path: String,
    #[serde(default)]
    diff: String,
}

#[derive(Debug, Deserialize)]
struct NoteResponse {
    #[serde(default)]
    body: String,
    #[serde(default)]
    system: bool,
}

fn issue_from_response(resp: IssueResponse) -> Issue {
    Issue {
        number: resp.iid,
        title: resp.title,
        body: resp.description.unwrap_or_default(),
        url: resp.web_url,
        labels: resp.labels,
    }
}

#[async_trait]
impl Provider for GitLabProvider {
    async fn create_issue(&self, input: IssueInput) -> Result<Issue> {
        let resp: IssueResponse = self
            .request(
                Method::POST,
                self.project_path("issues"),
                Some(json!({
                    "title": input.title,
                    "description": input.body,
                    "labels": input.labels.join(","),
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
                self.project_path(&format!("issues/{number}")),
                None,
                "get issue",
            )
            .await?;
        Ok(issue_from_response(resp))
    }

    async fn add_label(&self, number: u64, label: &str) -> Result<()> {
        let _: IssueResponse = self
            .request(
                Method::PUT,
                self.project_path(&format!("issues/{number}")),
                Some(json!({"add_labels": label})),
                "add label",
            )
            .await?;
        Ok(())
    }

    async fn open_change_request(&self, input: ChangeRequestInput) -> Result<String> {
        let resp: MergeRequestResponse = self
            .request(
                Method::POST,
                self.project_path("merge_requests"),
                Some(json!({
                    "title": input.title,
                    "description": input.body,
                    "source_branch": input.head_branch,
                    "target_branch": input.base_branch,
                })),
                "open change request",
            )
            .await?;
        Ok(resp.web_url)
    }

    async fn get_change_request(&self, number: u64) -> Result<ChangeRequest> {
        let resp: MergeRequestResponse = self
            .request(
                Method::GET,
                self.project_path(&format!("merge_requests/{number}")),
                None,
                "get change request",
            )
            .await?;
        let diff = self.get_mr_diff(number).await?;
        let description = resp.description.unwrap_or_default();
        let issue_url = extract_issue_url(&description).unwrap_or_default();

        Ok(ChangeRequest {
            number: resp.iid,
            title: resp.title,
            description,
            url: resp.web_url,
            head_branch: resp.source_branch,
            base_branch: resp.target_branch,
            diff,
            issue_url,
        })
    }

    async fn post_review(&self, number: u64, review: &Review) -> Result<()> {
        let _: Value = self
            .request(
                Method::POST,
                self.project_path(&format!("merge_requests/{number}/notes")),
                Some(json!({"body": review.summary})),
                "post review note",
            )
            .await?;

        if !review.comments.is_empty() {
            // Discussions need the MR's diff refs to anchor a position.
            let mr: MergeRequestResponse = self
                .request(
                    Method::GET,
                    self.project_path(&format!("merge_requests/{number}")),
                    None,
                    "get diff refs",
                )
                .await?;

            for comment in &review.comments {
                let mut position = json!({
                    "position_type": "text",
                    "new_path": comment.path,
                    "old_path": comment.path,
                });
                match comment.side {
                    Side::New => position["new_line"] = json!(comment.line),
                    Side::Old => position["old_line"] = json!(comment.line),
                }
                if let Some(refs) = &mr.diff_refs {
                    position["base_sha"] = json!(refs.base_sha);
                    position["head_sha"] = json!(refs.head_sha);
                    position["start_sha"] = json!(refs.start_sha);
                }

                let result: Result<Value> = self
                    .request(
                        Method::POST,
                        self.project_path(&format!("merge_requests/{number}/discussions")),
                        Some(json!({"body": comment.body, "position": position})),
                        "post inline comment",
                    )
                    .await;
                // Line mapping can fail when the diff has shifted; skip the
                // comment rather than aborting the whole review.
                if let Err(err) = result {
                    tracing::warn!(
                        path = %comment.path,
                        line = comment.line,
                        error = %err,
                        "inline comment failed, continuing"
                    );
                }
            }
        }

        if review.verdict == Verdict::Approve {
            let _: Value = self
                .request(
                    Method::POST,
                    self.project_path(&format!("merge_requests/{number}/approve")),
                    Some(json!({})),
                    "approve change request",
                )
                .await?;
        }

        Ok(())
    }

    async fn get_cr_comments(&self, number: u64) -> Result<Vec<ReviewComment>> {
        let notes: Vec<NoteResponse> = self
            .request(
                Method::GET,
                self.project_path(&format!("merge_requests/{number}/notes")),
                None,
                "get change request comments",
            )
            .await?;
        Ok(notes
            .into_iter()
            // System notes ("added label ...") are noise, not review content.
            .filter(|n| !n.system)
            .map(|n| ReviewComment {
                path: String::new(),
                line: 0,
                body: n.body,
                side: Side::New,
            })
            .collect())
    }

    fn repo_url(&self) -> &str {
        &self.info.raw_url
    }
}
