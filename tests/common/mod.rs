//! Shared test doubles: a scripted completion client and a recording
//! tracker provider.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use autocrew::llm::{
    ChatMessage, CompletionClient, ContentBlock, ModelResponse, ToolDefinition,
};
use autocrew::reviewer::{CrReadyMessage, Notifier};
use autocrew::vcs::{
    parse_repo_url, ChangeRequest, ChangeRequestInput, Issue, IssueInput, Provider,
    ProviderResolver, RepoInfo, Review, ReviewComment, Side,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Plays back a fixed sequence of model responses. With `repeat_last`, the
/// final response is replayed forever (for iteration-cap tests).
pub struct ScriptedClient {
    responses: Mutex<VecDeque<ModelResponse>>,
    repeat_last: Option<ModelResponse>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            repeat_last: None,
        }
    }

    pub fn repeating(response: ModelResponse) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            repeat_last: Some(response),
        }
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete_with_tools(
        &self,
        _system: &str,
        _messages: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> Result<ModelResponse> {
        if let Some(response) = self.responses.lock().unwrap().pop_front() {
            return Ok(response);
        }
        if let Some(response) = &self.repeat_last {
            return Ok(response.clone());
        }
        bail!("scripted client exhausted")
    }
}

pub fn text_response(text: &str) -> ModelResponse {
    ModelResponse {
        stop_reason: Some("end_turn".to_string()),
        content: vec![ContentBlock::Text {
            text: text.to_string(),
        }],
    }
}

pub fn tool_response(calls: &[(&str, &str, Value)]) -> ModelResponse {
    ModelResponse {
        stop_reason: Some("tool_use".to_string()),
        content: calls
            .iter()
            .map(|(id, name, input)| ContentBlock::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input: input.clone(),
            })
            .collect(),
    }
}

/// Records every mutation and serves canned fetches.
#[derive(Default)]
pub struct RecordingProvider {
    pub url: String,
    pub created_issues: Mutex<Vec<IssueInput>>,
    pub labels_added: Mutex<Vec<(u64, String)>>,
    pub opened: Mutex<Vec<ChangeRequestInput>>,
    pub reviews: Mutex<Vec<(u64, Review)>>,
    pub issue: Mutex<Option<Issue>>,
    pub change_request: Mutex<Option<ChangeRequest>>,
}

impl RecordingProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_issue(self, issue: Issue) -> Self {
        *self.issue.lock().unwrap() = Some(issue);
        self
    }

    pub fn with_change_request(self, cr: ChangeRequest) -> Self {
        *self.change_request.lock().unwrap() = Some(cr);
        self
    }
}

#[async_trait]
impl Provider for RecordingProvider {
    async fn create_issue(&self, input: IssueInput) -> Result<Issue> {
        let mut created = self.created_issues.lock().unwrap();
        created.push(input.clone());
        let number = created.len() as u64;
        Ok(Issue {
            number,
            title: input.title,
            body: input.body,
            url: format!("{}/issues/{number}", self.url),
            labels: input.labels,
        })
    }

    async fn get_issue(&self, number: u64) -> Result<Issue> {
        Ok(self.issue.lock().unwrap().clone().unwrap_or(Issue {
            number,
            ..Issue::default()
        }))
    }

    async fn add_label(&self, number: u64, label: &str) -> Result<()> {
        self.labels_added
            .lock()
            .unwrap()
            .push((number, label.to_string()));
        Ok(())
    }

    async fn open_change_request(&self, input: ChangeRequestInput) -> Result<String> {
        self.opened.lock().unwrap().push(input);
        Ok(format!("{}/pull/1", self.url))
    }

    async fn get_change_request(&self, number: u64) -> Result<ChangeRequest> {
        Ok(self
            .change_request
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(ChangeRequest {
                number,
                ..ChangeRequest::default()
            }))
    }

    async fn post_review(&self, number: u64, review: &Review) -> Result<()> {
        self.reviews.lock().unwrap().push((number, review.clone()));
        Ok(())
    }

    async fn get_cr_comments(&self, _number: u64) -> Result<Vec<ReviewComment>> {
        Ok(Vec::new())
    }

    fn repo_url(&self) -> &str {
        &self.url
    }
}

/// Always resolves to the same provider regardless of URL.
pub struct FixedResolver {
    pub provider: Arc<RecordingProvider>,
}

impl ProviderResolver for FixedResolver {
    fn provider_for(&self, repo_url: &str) -> Result<(Arc<dyn Provider>, RepoInfo)> {
        let info = parse_repo_url(repo_url).unwrap_or(RepoInfo {
            platform: autocrew::vcs::Platform::GitHub,
            host: "github.com".to_string(),
            owner: "org".to_string(),
            repo: "repo".to_string(),
            raw_url: repo_url.to_string(),
        });
        Ok((self.provider.clone(), info))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<CrReadyMessage>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_cr_ready(&self, msg: &CrReadyMessage) -> Result<()> {
        self.messages.lock().unwrap().push(msg.clone());
        Ok(())
    }
}

pub fn comment(path: &str, line: u64, body: &str) -> ReviewComment {
    ReviewComment {
        path: path.to_string(),
        line,
        body: body.to_string(),
        side: Side::New,
    }
}
