//! Tool-capable chat completion client
//!
//! Speaks the Anthropic-style Messages API: the system prompt is a top-level
//! field, assistant tool calls arrive as `tool_use` content blocks, and tool
//! results are sent back inside user-role messages. Content blocks the client
//! does not recognize are carried through history verbatim so the provider
//! sees its own blocks (e.g. thinking) unchanged on replay.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rand::Rng;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: u32 = 8096;

const MAX_ATTEMPTS: u32 = 4;
const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(30);

/// A single content block in an assistant message.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    /// Provider-specific block preserved verbatim for replay.
    Other(Value),
}

impl ContentBlock {
    fn from_wire(value: Value) -> Self {
        match value.get("type").and_then(Value::as_str) {
            Some("text") => ContentBlock::Text {
                text: value
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            Some("tool_use") => ContentBlock::ToolUse {
                id: value
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                name: value
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                input: value.get("input").cloned().unwrap_or(Value::Null),
            },
            _ => ContentBlock::Other(value),
        }
    }

    fn to_wire(&self) -> Value {
        match self {
            ContentBlock::Text { text } => json!({"type": "text", "text": text}),
            ContentBlock::ToolUse { id, name, input } => {
                json!({"type": "tool_use", "id": id, "name": name, "input": input})
            }
            ContentBlock::Other(value) => value.clone(),
        }
    }
}

/// Answer to one `tool_use` block, keyed by its id.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    pub content: String,
}

impl ToolResultBlock {
    fn to_wire(&self) -> Value {
        json!({
            "type": "tool_result",
            "tool_use_id": self.tool_use_id,
            "content": self.content,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    ToolResult,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    ToolResults(Vec<ToolResultBlock>),
}

/// An element of an agent's conversation history.
///
/// Constructed only through the associated functions so the role always
/// matches the content shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    role: Role,
    content: MessageContent,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    /// An assistant turn replayed verbatim, including tool-use blocks.
    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Blocks(blocks),
        }
    }

    pub fn tool_results(results: Vec<ToolResultBlock>) -> Self {
        Self {
            role: Role::ToolResult,
            content: MessageContent::ToolResults(results),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &MessageContent {
        &self.content
    }

    /// The plain text of a user or assistant text message, if that is what
    /// this message holds.
    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// A tool the model may call, described by a JSON-schema input.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// One `tool_use` block extracted from a model response.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Parsed model response: ordered content blocks plus the stop reason.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub stop_reason: Option<String>,
    pub content: Vec<ContentBlock>,
}

impl ModelResponse {
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Concatenated text blocks, newline-joined.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } if !text.is_empty() => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The completion seam the agents program against.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete_with_tools(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse>;
}

pub struct Client {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    backoff_base: Duration,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("api_key", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Client {
    pub fn new(api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            backoff_base: BASE_DELAY,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Shrink the backoff base so retry behavior is testable in real time.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .backoff_base
            .saturating_mul(1 << attempt.min(16))
            .min(MAX_DELAY);
        // Full jitter: uniform in [0, exp).
        let cap = exp.as_millis().max(1) as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..cap))
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[async_trait]
impl CompletionClient for Client {
    async fn complete_with_tools(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse> {
        let api_messages = to_api_messages(messages)?;

        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system,
            "messages": api_messages,
        });
        if !tools.is_empty() {
            let tool_params: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.input_schema,
                    })
                })
                .collect();
            body["tools"] = json!(tool_params);
        }

        let mut attempt = 0u32;
        loop {
            let response = self
                .http
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
                .context("send completion request")?;

            let status = response.status();
            let text = response.text().await.context("read completion response")?;

            if status.is_success() {
                let parsed: ApiResponse = serde_json::from_str(&text).with_context(|| {
                    format!(
                        "parse completion response: {}",
                        &text[..text.len().min(200)]
                    )
                })?;
                let content = parsed
                    .content
                    .into_iter()
                    .map(ContentBlock::from_wire)
                    .collect();
                return Ok(ModelResponse {
                    stop_reason: parsed.stop_reason,
                    content,
                });
            }

            if is_retryable(status) && attempt + 1 < MAX_ATTEMPTS {
                let delay = self.retry_delay(attempt);
                tracing::warn!(
                    status = status.as_u16(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "transient completion error, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            if let Ok(err) = serde_json::from_str::<ApiError>(&text) {
                bail!(
                    "completion api: {} ({})",
                    err.error.message,
                    err.error.kind.as_deref().unwrap_or("unknown")
                );
            }
            bail!("completion api: {status}: {}", &text[..text.len().min(200)]);
        }
    }
}

/// Transient statuses worth retrying: rate limit, 5xx, and provider overload.
/// Authentication and other client errors fail immediately.
fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504 | 529)
}

/// Encode history for the wire, enforcing the pairing invariant: every
/// `tool_use` id emitted by an assistant message must be answered, in order,
/// by the tool-result message that immediately follows it.
fn to_api_messages(messages: &[ChatMessage]) -> Result<Vec<Value>> {
    let mut out = Vec::with_capacity(messages.len());
    let mut pending_tool_ids: Vec<String> = Vec::new();

    for (i, msg) in messages.iter().enumerate() {
        match (&msg.role, &msg.content) {
            (Role::User, MessageContent::Text(text)) => {
                if !pending_tool_ids.is_empty() {
                    bail!("message[{i}]: tool_use blocks left unanswered");
                }
                out.push(json!({"role": "user", "content": text}));
            }
            (Role::Assistant, MessageContent::Text(text)) => {
                if !pending_tool_ids.is_empty() {
                    bail!("message[{i}]: tool_use blocks left unanswered");
                }
                out.push(json!({"role": "assistant", "content": text}));
            }
            (Role::Assistant, MessageContent::Blocks(blocks)) => {
                if !pending_tool_ids.is_empty() {
                    bail!("message[{i}]: tool_use blocks left unanswered");
                }
                pending_tool_ids = blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::ToolUse { id, .. } => Some(id.clone()),
                        _ => None,
                    })
                    .collect();
                let wire: Vec<Value> = blocks.iter().map(ContentBlock::to_wire).collect();
                out.push(json!({"role": "assistant", "content": wire}));
            }
            (Role::ToolResult, MessageContent::ToolResults(results)) => {
                if results.is_empty() {
                    bail!("message[{i}]: tool_result message has no blocks");
                }
                let answered: Vec<&str> =
                    results.iter().map(|r| r.tool_use_id.as_str()).collect();
                if answered != pending_tool_ids.iter().map(String::as_str).collect::<Vec<_>>() {
                    bail!(
                        "message[{i}]: tool_result ids {answered:?} do not answer pending tool_use ids {pending_tool_ids:?}"
                    );
                }
                pending_tool_ids.clear();
                let wire: Vec<Value> = results.iter().map(ToolResultBlock::to_wire).collect();
                out.push(json!({"role": "user", "content": wire}));
            }
            _ => bail!("message[{i}]: role does not match content shape"),
        }
    }

    if !pending_tool_ids.is_empty() {
        bail!("history ends with unanswered tool_use blocks {pending_tool_ids:?}");
    }

    Ok(out)
}
