//! Approval notifications to the out-of-band chat channel.

use crate::chat::SlackClient;
use anyhow::Result;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct CrReadyMessage {
    pub cr_url: String,
    pub cr_title: String,
    pub issue_url: String,
    pub issue_title: String,
    pub repo_url: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_cr_ready(&self, msg: &CrReadyMessage) -> Result<()>;
}

pub struct SlackNotifier {
    client: SlackClient,
    channel_id: String,
}

impl SlackNotifier {
    pub fn new(bot_token: String, channel_id: String) -> Self {
        Self {
            client: SlackClient::new(bot_token),
            channel_id,
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify_cr_ready(&self, msg: &CrReadyMessage) -> Result<()> {
        let text = format!(
            ":white_check_mark: *Change request ready for your review*\n\
             *<{}|{}>*\n\
             Issue: <{}|{}>\n\
             Repo: {}",
            msg.cr_url, msg.cr_title, msg.issue_url, msg.issue_title, msg.repo_url
        );
        self.client
            .post_message(&self.channel_id, None, &text)
            .await
    }
}
