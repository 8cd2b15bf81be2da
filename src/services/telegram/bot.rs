//! Admin bot: commands, moderation callbacks and video relay

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{InlineKeyboard, InlineKeyboardButton, Message, TelegramClient, TelegramError, Update};
use crate::models::{ModerationStatus, NewsItem};
use crate::services::crosspost::{CrossPostReport, CrossPostService};
use crate::services::email::escape_html;
use crate::services::moderation::truncate_chars;
use crate::services::news::{NewsService, NewsServiceError};
use crate::services::rate_limiter::SlidingWindowLimiter;
use crate::services::social::VideoUpload;

/// Largest file the Bot API lets a bot download
pub const MAX_DOWNLOAD_BYTES: u64 = 20 * 1024 * 1024;

const PENDING_LIMIT: i64 = 10;
const CARD_EXCERPT_CHARS: usize = 400;

const HELP_TEXT: &str = "<b>Newsdesk bot</b>\n\n\
/pending - news awaiting review\n\
/stats - counts by status\n\
/fetch - fetch feeds and run AI processing\n\
/help - this message\n\n\
Send a video to publish it to the configured video platforms.";

/// HTML card shown to reviewers
pub fn format_review_card(item: &NewsItem) -> String {
    let mut card = format!("<b>{}</b>\n\n", escape_html(&item.title));

    let body = item
        .summary
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| truncate_chars(&item.content, CARD_EXCERPT_CHARS));
    card.push_str(&escape_html(body.trim()));
    card.push_str("\n\n");

    if let Some(category) = &item.category {
        card.push_str(&format!("Category: {}\n", escape_html(category)));
    }
    if !item.tags.is_empty() {
        let tags: Vec<String> = item.tags.iter().map(|t| format!("#{}", t.replace(' ', "_"))).collect();
        card.push_str(&escape_html(&tags.join(" ")));
        card.push('\n');
    }
    if let Some(confidence) = item.pre_moderation_confidence {
        card.push_str(&format!(
            "AI: {} ({:.2})",
            item.pre_moderation_status, confidence
        ));
        if let Some(reason) = item.pre_moderation_reason.as_deref().filter(|r| !r.is_empty()) {
            card.push_str(&format!(" {}", escape_html(reason)));
        }
        card.push('\n');
    }
    card.push_str(&format!(
        "<a href=\"{}\">Source</a> · #{}",
        escape_html(&item.url),
        item.id
    ));
    card
}

pub fn review_keyboard(id: i64) -> InlineKeyboard {
    InlineKeyboard {
        inline_keyboard: vec![
            vec![
                InlineKeyboardButton::callback("✅ Approve", format!("approve:{}", id)),
                InlineKeyboardButton::callback("❌ Reject", format!("reject:{}", id)),
            ],
            vec![InlineKeyboardButton::callback("🚀 Publish", format!("publish:{}", id))],
        ],
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Action {
    Approve,
    Reject,
    Publish,
}

fn parse_callback(data: &str) -> Option<(Action, i64)> {
    let (action, id) = data.split_once(':')?;
    let action = match action {
        "approve" => Action::Approve,
        "reject" => Action::Reject,
        "publish" => Action::Publish,
        _ => return None,
    };
    Some((action, id.trim().parse().ok()?))
}

/// `/cmd@botname args` -> `cmd`
fn parse_command(text: &str) -> Option<String> {
    let first = text.split_whitespace().next()?;
    let command = first.strip_prefix('/')?;
    let command = command.split('@').next().unwrap_or(command);
    Some(command.to_lowercase())
}

fn summarize_crosspost(report: &CrossPostReport) -> String {
    let mut lines = Vec::with_capacity(report.results.len());
    for result in &report.results {
        let line = match (&result.error, &result.url) {
            (Some(error), _) => format!("❌ {}: {}", result.platform, escape_html(error)),
            (None, Some(url)) => format!("✅ {}: {}", result.platform, escape_html(url)),
            (None, None) => format!("✅ {}", result.platform),
        };
        lines.push(line);
    }
    lines.join("\n")
}

/// Video or video document attached to a message
struct IncomingVideo {
    file_id: String,
    file_name: String,
    mime_type: String,
    file_size: Option<u64>,
}

fn incoming_video(message: &Message) -> Option<IncomingVideo> {
    if let Some(video) = &message.video {
        return Some(IncomingVideo {
            file_id: video.file_id.clone(),
            file_name: video.file_name.clone().unwrap_or_else(|| "video.mp4".to_string()),
            mime_type: video.mime_type.clone().unwrap_or_else(|| "video/mp4".to_string()),
            file_size: video.file_size,
        });
    }
    let document = message.document.as_ref()?;
    let mime_type = document.mime_type.clone()?;
    if !mime_type.starts_with("video/") {
        return None;
    }
    Some(IncomingVideo {
        file_id: document.file_id.clone(),
        file_name: document.file_name.clone().unwrap_or_else(|| "video".to_string()),
        mime_type,
        file_size: document.file_size,
    })
}

pub struct TelegramBot {
    client: Arc<TelegramClient>,
    news: Arc<NewsService>,
    crosspost: Option<Arc<CrossPostService>>,
    limiter: Arc<SlidingWindowLimiter>,
    admin_chat_ids: Vec<i64>,
    batch_size: i64,
}

impl TelegramBot {
    pub fn new(
        client: Arc<TelegramClient>,
        news: Arc<NewsService>,
        crosspost: Option<Arc<CrossPostService>>,
        limiter: Arc<SlidingWindowLimiter>,
        admin_chat_ids: Vec<i64>,
        batch_size: i64,
    ) -> Self {
        Self {
            client,
            news,
            crosspost,
            limiter,
            admin_chat_ids,
            batch_size,
        }
    }

    pub fn limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.limiter
    }

    fn is_admin(&self, chat_id: i64) -> bool {
        self.admin_chat_ids.contains(&chat_id)
    }

    /// Handle one webhook update.
    ///
    /// Errors are for logging only; Telegram always gets a 200.
    pub async fn handle_update(&self, update: Update) -> Result<(), TelegramError> {
        let Some(chat_id) = update.chat_id() else {
            debug!(update_id = update.update_id, "Ignoring update without chat");
            return Ok(());
        };

        if !self.limiter.check_and_record(&chat_id.to_string()).await {
            debug!(chat_id, update_id = update.update_id, "Rate limited, dropping update");
            return Ok(());
        }

        if !self.is_admin(chat_id) {
            warn!(chat_id, "Update from unauthorized chat");
            if let Some(callback) = &update.callback_query {
                self.client.answer_callback_query(&callback.id, Some("Not allowed")).await?;
            } else {
                self.client
                    .send_message(chat_id, "Sorry, this bot is private.", None)
                    .await?;
            }
            return Ok(());
        }

        if let Some(callback) = update.callback_query {
            let data = callback.data.unwrap_or_default();
            return self
                .handle_callback(chat_id, &callback.id, callback.message.as_ref(), &data)
                .await;
        }

        if let Some(message) = update.message {
            if let Some(video) = incoming_video(&message) {
                return self.relay_video(chat_id, &message, video).await;
            }
            if let Some(text) = message.text.as_deref() {
                return self.handle_text(chat_id, text).await;
            }
        }
        Ok(())
    }

    async fn handle_text(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        let Some(command) = parse_command(text) else {
            self.client
                .send_message(chat_id, "Send /help for the list of commands.", None)
                .await?;
            return Ok(());
        };

        info!(chat_id, command = %command, "Bot command");
        match command.as_str() {
            "start" | "help" => {
                self.client.send_message(chat_id, HELP_TEXT, None).await?;
            }
            "pending" => self.send_pending(chat_id).await?,
            "stats" => self.send_stats(chat_id).await?,
            "fetch" => self.run_fetch(chat_id).await?,
            _ => {
                self.client
                    .send_message(chat_id, "Unknown command. Send /help.", None)
                    .await?;
            }
        }
        Ok(())
    }

    async fn send_pending(&self, chat_id: i64) -> Result<(), TelegramError> {
        let items = match self.news.awaiting_review(PENDING_LIMIT).await {
            Ok(items) => items,
            Err(e) => return self.report_error(chat_id, &e).await,
        };
        if items.is_empty() {
            self.client.send_message(chat_id, "Nothing awaiting review.", None).await?;
            return Ok(());
        }
        for item in &items {
            self.client
                .send_message(chat_id, &format_review_card(item), Some(&review_keyboard(item.id)))
                .await?;
        }
        Ok(())
    }

    async fn send_stats(&self, chat_id: i64) -> Result<(), TelegramError> {
        let stats = match self.news.stats().await {
            Ok(stats) => stats,
            Err(e) => return self.report_error(chat_id, &e).await,
        };
        let mut text = String::from("<b>News by status</b>\n");
        for status in ModerationStatus::ALL {
            text.push_str(&format!("{}: {}\n", status, stats.get(&status).copied().unwrap_or(0)));
        }
        self.client.send_message(chat_id, text.trim_end(), None).await?;
        Ok(())
    }

    async fn run_fetch(&self, chat_id: i64) -> Result<(), TelegramError> {
        self.client.send_message(chat_id, "Fetching feeds…", None).await?;
        let report = match self.news.process_rss_news(self.batch_size).await {
            Ok(report) => report,
            Err(e) => return self.report_error(chat_id, &e).await,
        };
        let text = format!(
            "<b>Fetch finished</b>\nSources: {}\nNew items: {}\nDuplicates: {}\nFailed items: {}\nFailed sources: {}\n\n\
             <b>AI processing</b>\nProcessed: {}\nApproved: {}\nRejected: {}\nAnalyzed: {}\nFailed: {}",
            report.fetch.sources,
            report.fetch.inserted,
            report.fetch.duplicates,
            report.fetch.failed_items,
            report.fetch.failed_sources.len(),
            report.process.processed,
            report.process.approved,
            report.process.rejected,
            report.process.analyzed,
            report.process.failed,
        );
        self.client.send_message(chat_id, &text, None).await?;
        Ok(())
    }

    async fn report_error(&self, chat_id: i64, error: &NewsServiceError) -> Result<(), TelegramError> {
        warn!(chat_id, error = %error, "Bot command failed");
        self.client
            .send_message(chat_id, &format!("⚠️ {}", escape_html(&error.to_string())), None)
            .await?;
        Ok(())
    }

    async fn handle_callback(
        &self,
        chat_id: i64,
        callback_id: &str,
        message: Option<&Message>,
        data: &str,
    ) -> Result<(), TelegramError> {
        let Some((action, id)) = parse_callback(data) else {
            self.client.answer_callback_query(callback_id, Some("Unknown action")).await?;
            return Ok(());
        };

        let result = match action {
            Action::Approve => self.news.approve(id).await,
            Action::Reject => self.news.reject(id, Some("Rejected via Telegram")).await,
            Action::Publish => self.news.publish(id).await,
        };

        let item = match result {
            Ok(item) => item,
            Err(e) => {
                warn!(news_id = id, error = %e, "Moderation callback failed");
                self.client
                    .answer_callback_query(callback_id, Some(&truncate_chars(&e.to_string(), 190)))
                    .await?;
                return Ok(());
            }
        };
        info!(chat_id, news_id = id, status = %item.moderation_status, "Moderated via Telegram");

        let mut status_line = format!("\n\n<b>Status: {}</b>", item.moderation_status);
        if action == Action::Publish {
            if let Some(crosspost) = &self.crosspost {
                match crosspost.publish_news(id, None).await {
                    Ok(report) if !report.results.is_empty() => {
                        status_line.push('\n');
                        status_line.push_str(&summarize_crosspost(&report));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(news_id = id, error = %e, "Cross-posting after publish failed");
                        status_line.push_str(&format!("\nCross-posting failed: {}", escape_html(&e.to_string())));
                    }
                }
            }
        }

        if let Some(message) = message {
            let keyboard = (item.moderation_status == ModerationStatus::Approved).then(|| InlineKeyboard {
                inline_keyboard: vec![vec![InlineKeyboardButton::callback(
                    "🚀 Publish",
                    format!("publish:{}", id),
                )]],
            });
            let text = format!("{}{}", format_review_card(&item), status_line);
            self.client
                .edit_message_text(message.chat.id, message.message_id, &text, keyboard.as_ref())
                .await?;
        }

        self.client
            .answer_callback_query(callback_id, Some(&format!("News {}", item.moderation_status)))
            .await?;
        Ok(())
    }

    async fn relay_video(&self, chat_id: i64, message: &Message, video: IncomingVideo) -> Result<(), TelegramError> {
        let Some(crosspost) = &self.crosspost else {
            self.client
                .send_message(chat_id, "Cross-posting is not configured.", None)
                .await?;
            return Ok(());
        };

        if video.file_size.is_some_and(|size| size > MAX_DOWNLOAD_BYTES) {
            return self.reject_large_file(chat_id, video.file_size.unwrap_or_default()).await;
        }

        let file = self.client.get_file(&video.file_id).await?;
        if let Some(size) = file.file_size.filter(|size| *size > MAX_DOWNLOAD_BYTES) {
            return self.reject_large_file(chat_id, size).await;
        }
        let path = file.file_path.ok_or(TelegramError::MissingFilePath)?;

        self.client.send_message(chat_id, "Uploading video…", None).await?;
        let bytes = self.client.download_file(&path).await?;

        let caption = message.caption.clone().unwrap_or_default();
        let title = caption
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| video.file_name.clone());
        let upload = VideoUpload {
            bytes,
            file_name: video.file_name,
            mime_type: video.mime_type,
            title,
            description: caption.trim().to_string(),
        };

        info!(chat_id, size = upload.bytes.len(), "Relaying video");
        let text = match crosspost.publish_video(&upload, None).await {
            Ok(report) => format!("<b>Video published</b>\n{}", summarize_crosspost(&report)),
            Err(e) => {
                warn!(chat_id, error = %e, "Video relay failed");
                format!("⚠️ Video relay failed: {}", escape_html(&e.to_string()))
            }
        };
        self.client.send_message(chat_id, &text, None).await?;
        Ok(())
    }

    async fn reject_large_file(&self, chat_id: i64, size: u64) -> Result<(), TelegramError> {
        info!(chat_id, size, "Video too large for the Bot API");
        self.client
            .send_message(
                chat_id,
                &format!(
                    "Video is too large ({:.1} MB). Bots can only download files up to 20 MB.",
                    size as f64 / (1024.0 * 1024.0)
                ),
                None,
            )
            .await?;
        Ok(())
    }
}
