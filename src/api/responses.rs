//! Shared API response types
//!
//! Public endpoints never expose moderation internals; admin endpoints
//! return the full models.

use serde::{Deserialize, Serialize};

use crate::models::{BlogPost, NewsItem, PagedResult};

// ============================================================================
// Pagination
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> From<PagedResult<T>> for PageResponse<T> {
    fn from(result: PagedResult<T>) -> Self {
        let total_pages = result.total_pages();
        Self {
            items: result.items,
            total: result.total,
            page: result.page,
            per_page: result.per_page,
            total_pages,
        }
    }
}

// ============================================================================
// Public content
// ============================================================================

/// News item as shown on the site
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicNews {
    pub id: i64,
    pub title: String,
    pub summary: Option<String>,
    pub content: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub published_at: Option<String>,
}

impl From<NewsItem> for PublicNews {
    fn from(item: NewsItem) -> Self {
        Self {
            id: item.id,
            title: item.title,
            summary: item.summary,
            content: item.content,
            url: item.url,
            image_url: item.image_url,
            category: item.category,
            tags: item.tags,
            published_at: item.published_at.map(|dt| dt.to_rfc3339()),
        }
    }
}

/// Blog post list entry, without the body
#[derive(Debug, Serialize, Deserialize)]
pub struct BlogSummary {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    pub published_at: Option<String>,
}

impl From<BlogPost> for BlogSummary {
    fn from(post: BlogPost) -> Self {
        Self {
            id: post.id,
            slug: post.slug,
            title: post.title,
            excerpt: post.excerpt,
            cover_image: post.cover_image,
            published_at: post.published_at.map(|dt| dt.to_rfc3339()),
        }
    }
}

/// Full public blog post
#[derive(Debug, Serialize, Deserialize)]
pub struct BlogPostResponse {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub content_html: String,
    pub excerpt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    pub published_at: Option<String>,
    pub updated_at: String,
}

impl From<BlogPost> for BlogPostResponse {
    fn from(post: BlogPost) -> Self {
        Self {
            id: post.id,
            slug: post.slug,
            title: post.title,
            content_html: post.content_html,
            excerpt: post.excerpt,
            cover_image: post.cover_image,
            published_at: post.published_at.map(|dt| dt.to_rfc3339()),
            updated_at: post.updated_at.to_rfc3339(),
        }
    }
}

// ============================================================================
// Misc
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: bool,
    pub version: String,
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub avg_response_time_ms: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}
