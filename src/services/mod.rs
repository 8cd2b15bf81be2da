//! Services layer - Business logic
//!
//! Services implement the content pipelines and the rules around them:
//! - RSS ingestion, AI pre-moderation and analysis
//! - human moderation and cross-posting
//! - the Telegram bot, email and the public blog/search reads

pub mod ai;
pub mod analysis;
pub mod blog;
pub mod crosspost;
pub mod email;
pub mod feed;
pub mod markdown;
pub mod moderation;
pub mod news;
pub mod prompts;
pub mod rate_limiter;
pub mod search;
pub mod settings;
pub mod social;
pub mod telegram;

pub use ai::{AiError, AzureOpenAi, ChatModel};
pub use analysis::{ArticleAnalysis, ArticleAnalyzer};
pub use blog::{generate_slug, BlogService, BlogServiceError};
pub use crosspost::{CrossPostError, CrossPostReport, CrossPostService};
pub use email::{ContactForm, ContactService, EmailDigestNotifier, Mailer};
pub use feed::FeedFetcher;
pub use markdown::MarkdownRenderer;
pub use moderation::{ModerationVerdict, PreModerator};
pub use news::{NewsService, NewsServiceError, ReviewNotifier};
pub use prompts::PromptService;
pub use rate_limiter::SlidingWindowLimiter;
pub use search::{SearchService, SearchError};
pub use settings::{PipelineSettings, SettingsService, SettingsServiceError};
pub use telegram::{TelegramBot, TelegramClient};
