use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::bot::{format_review_card, review_keyboard};
use super::TelegramClient;
use crate::models::{NewsItem, Platform};
use crate::services::email::escape_html;
use crate::services::news::ReviewNotifier;
use crate::services::social::{PublishError, PublishedRef, Publisher, SocialContent, VideoUpload};

/// Sends a review card per item to every admin chat
pub struct TelegramNotifier {
    client: Arc<TelegramClient>,
    admin_chat_ids: Vec<i64>,
}

impl TelegramNotifier {
    pub fn new(client: Arc<TelegramClient>, admin_chat_ids: Vec<i64>) -> Self {
        Self { client, admin_chat_ids }
    }
}

#[async_trait]
impl ReviewNotifier for TelegramNotifier {
    async fn notify(&self, items: &[NewsItem]) -> anyhow::Result<()> {
        let mut failures = 0;
        for item in items {
            let card = format_review_card(item);
            let keyboard = review_keyboard(item.id);
            for chat_id in &self.admin_chat_ids {
                if let Err(e) = self.client.send_message(*chat_id, &card, Some(&keyboard)).await {
                    warn!(chat_id, news_id = item.id, error = %e, "Failed to send review card");
                    failures += 1;
                }
            }
        }

        let attempts = items.len() * self.admin_chat_ids.len();
        if attempts > 0 && failures == attempts {
            anyhow::bail!("all {} review cards failed", attempts);
        }
        info!(items = items.len(), chats = self.admin_chat_ids.len(), "Review cards sent");
        Ok(())
    }
}

/// Posts to a public Telegram channel the bot administers
pub struct TelegramChannelPublisher {
    client: Arc<TelegramClient>,
    channel_id: i64,
}

impl TelegramChannelPublisher {
    pub fn new(client: Arc<TelegramClient>, channel_id: i64) -> Self {
        Self { client, channel_id }
    }
}

#[async_trait]
impl Publisher for TelegramChannelPublisher {
    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    async fn publish_text(&self, content: &SocialContent) -> Result<PublishedRef, PublishError> {
        let mut text = escape_html(&content.message);
        if let Some(link) = content.link.as_deref().filter(|l| !content.message.contains(l)) {
            text.push_str(&format!("\n\n{}", escape_html(link)));
        }

        let message = self
            .client
            .send_message(self.channel_id, &text, None)
            .await
            .map_err(|e| PublishError::invalid(Platform::Telegram, e.to_string()))?;
        Ok(PublishedRef {
            external_id: message.message_id.to_string(),
            url: None,
        })
    }

    async fn publish_video(&self, _video: &VideoUpload) -> Result<PublishedRef, PublishError> {
        Err(PublishError::Unsupported(Platform::Telegram))
    }
}
