//! Data models
//!
//! This module contains the data structures used throughout the Newsdesk service:
//! - Database entities (NewsItem, RssSource, BlogPost, SocialMediaPost, AiPrompt)
//! - Status enums driving the moderation and publishing lifecycles
//! - Pagination helpers

mod ai_prompt;
mod blog_post;
mod news;
mod rss_source;
mod social_post;

pub use ai_prompt::{prompt_types, AiPrompt};
pub use blog_post::{BlogPost, BlogPostStatus, CreateBlogPostInput, UpdateBlogPostInput};
pub use news::{
    CreateNewsInput, ListParams, ModerationStatus, NewsItem, PagedResult, PreModerationStatus,
};
pub use rss_source::{CreateRssSourceInput, RssSource};
pub use social_post::{ContentKind, Platform, SocialMediaPost, SocialPostStatus};
