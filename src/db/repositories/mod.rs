//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for a single table.

pub mod ai_prompt;
pub mod blog_post;
pub mod news;
pub mod rss_source;
pub mod settings;
pub mod social_post;

pub use ai_prompt::{AiPromptRepository, SqlxAiPromptRepository};
pub use blog_post::{BlogPostRepository, SqlxBlogPostRepository};
pub use news::{
    NewsAnalysisUpdate, NewsRepository, PreModerationUpdate, SqlxNewsRepository,
};
pub use rss_source::{RssSourceRepository, SqlxRssSourceRepository};
pub use settings::{Setting, SettingsRepository, SqlxSettingsRepository};
pub use social_post::{NewSocialPost, SocialPostRepository, SqlxSocialPostRepository};
