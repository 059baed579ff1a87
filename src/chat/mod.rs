//! Slack chat transport
//!
//! Socket mode for the planner: `apps.connections.open` hands back a
//! websocket URL, events arrive as envelopes that must be acked by id, and
//! replies go out through `chat.postMessage` into the originating thread.
//! Bot-authored messages are ignored to avoid feedback loops.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message as WsMessage;

const SLACK_API_BASE: &str = "https://slack.com/api";
const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// One inbound chat message, keyed by the thread that is its session.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Thread timestamp, the session id. The root message's own ts when the
    /// message starts a new thread.
    pub thread_id: String,
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
    pub is_dm: bool,
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, msg: IncomingMessage) -> Result<String>;
}

/// Thin Slack Web API client.
pub struct SlackClient {
    http: reqwest::Client,
    bot_token: String,
}

#[derive(Debug, Deserialize)]
struct ApiAck {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthTestResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct ConnectionsOpenResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    url: String,
}

impl SlackClient {
    pub fn new(bot_token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token,
        }
    }

    pub async fn post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        text: &str,
    ) -> Result<()> {
        let mut body = json!({"channel": channel, "text": text});
        if let Some(ts) = thread_ts {
            body["thread_ts"] = json!(ts);
        }

        let ack: ApiAck = self
            .http
            .post(format!("{SLACK_API_BASE}/chat.postMessage"))
            .bearer_auth(&self.bot_token)
            .json(&body)
            .send()
            .await
            .context("slack chat.postMessage")?
            .json()
            .await
            .context("slack chat.postMessage: parse response")?;
        if !ack.ok {
            bail!(
                "slack chat.postMessage: {}",
                ack.error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(())
    }

    /// Resolve the bot's own user id, used to strip mentions from text.
    pub async fn auth_test(&self) -> Result<String> {
        let resp: AuthTestResponse = self
            .http
            .post(format!("{SLACK_API_BASE}/auth.test"))
            .bearer_auth(&self.bot_token)
            .send()
            .await
            .context("slack auth.test")?
            .json()
            .await
            .context("slack auth.test: parse response")?;
        if !resp.ok {
            bail!(
                "slack auth.test: {}",
                resp.error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(resp.user_id)
    }
}

/// Socket-mode event loop feeding a [`MessageHandler`].
pub struct SocketMode {
    client: SlackClient,
    http: reqwest::Client,
    app_token: String,
    handler: Arc<dyn MessageHandler>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
}

impl SocketMode {
    pub fn new(bot_token: String, app_token: String, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            client: SlackClient::new(bot_token),
            http: reqwest::Client::new(),
            app_token,
            handler,
        }
    }

    /// Run the event loop, reconnecting on disconnects until the task is
    /// cancelled.
    pub async fn run(&self) -> Result<()> {
        let bot_id = self.client.auth_test().await?;
        tracing::info!(bot_id = %bot_id, "connected to slack");

        loop {
            match self.connect_and_listen(&bot_id).await {
                Ok(()) => tracing::info!("slack connection closed, reconnecting"),
                Err(err) => tracing::warn!(error = %err, "slack connection error, reconnecting"),
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    async fn open_connection(&self) -> Result<String> {
        let resp: ConnectionsOpenResponse = self
            .http
            .post(format!("{SLACK_API_BASE}/apps.connections.open"))
            .bearer_auth(&self.app_token)
            .send()
            .await
            .context("slack apps.connections.open")?
            .json()
            .await
            .context("slack apps.connections.open: parse response")?;
        if !resp.ok || resp.url.is_empty() {
            bail!(
                "slack apps.connections.open: {}",
                resp.error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(resp.url)
    }

    async fn connect_and_listen(&self, bot_id: &str) -> Result<()> {
        let url = self.open_connection().await?;
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .context("connect to slack websocket")?;
        let (mut write, mut read) = stream.split();

        while let Some(frame) = read.next().await {
            let frame = frame.context("read slack websocket frame")?;
            let WsMessage::Text(text) = frame else {
                continue;
            };
            let Ok(envelope) = serde_json::from_str::<Envelope>(&text) else {
                continue;
            };

            // Ack first: Slack redelivers unacked envelopes.
            if let Some(id) = &envelope.envelope_id {
                let ack = json!({"envelope_id": id}).to_string();
                write
                    .send(WsMessage::Text(ack))
                    .await
                    .context("ack slack envelope")?;
            }

            match envelope.kind.as_str() {
                "disconnect" => return Ok(()),
                "events_api" => {
                    if let Some(payload) = &envelope.payload {
                        self.handle_event(bot_id, &payload["event"]).await;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn handle_event(&self, bot_id: &str, event: &Value) {
        let kind = event["type"].as_str().unwrap_or_default();
        let msg = match kind {
            "app_mention" => IncomingMessage {
                thread_id: thread_id(event),
                channel_id: event["channel"].as_str().unwrap_or_default().to_string(),
                user_id: event["user"].as_str().unwrap_or_default().to_string(),
                text: strip_mention(event["text"].as_str().unwrap_or_default(), bot_id),
                is_dm: false,
            },
            "message" => {
                // Ignore our own (and any bot's) messages.
                if event["bot_id"].as_str().is_some()
                    || event["subtype"].as_str() == Some("bot_message")
                {
                    return;
                }
                if event["channel_type"].as_str() != Some("im") {
                    return;
                }
                IncomingMessage {
                    thread_id: thread_id(event),
                    channel_id: event["channel"].as_str().unwrap_or_default().to_string(),
                    user_id: event["user"].as_str().unwrap_or_default().to_string(),
                    text: event["text"].as_str().unwrap_or_default().to_string(),
                    is_dm: true,
                }
            }
            _ => return,
        };

        tracing::info!(
            channel = %msg.channel_id,
            thread = %msg.thread_id,
            user = %msg.user_id,
            dm = msg.is_dm,
            "incoming message"
        );

        let reply = match self.handler.handle(msg.clone()).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::error!(error = ?err, "handler error");
                "Sorry, something went wrong. Please try again.".to_string()
            }
        };

        if let Err(err) = self
            .client
            .post_message(&msg.channel_id, Some(&msg.thread_id), &reply)
            .await
        {
            tracing::error!(error = %err, "failed to post reply");
        }
    }
}

fn thread_id(event: &Value) -> String {
    event["thread_ts"]
        .as_str()
        .or_else(|| event["ts"].as_str())
        .unwrap_or_default()
        .to_string()
}

fn strip_mention(text: &str, bot_id: &str) -> String {
    let mention = format!("<@{bot_id}>");
    text.trim_start_matches(&mention).trim().to_string()
}
