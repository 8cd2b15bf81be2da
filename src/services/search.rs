//! Site search over published news and blog posts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::moderation::truncate_chars;
use crate::db::repositories::{BlogPostRepository, NewsRepository};
use crate::models::ContentKind;

pub const MAX_QUERY_CHARS: usize = 100;
pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 50;
const SNIPPET_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub kind: ContentKind,
    pub id: i64,
    pub title: String,
    pub snippet: String,
    /// Article URL for news, site path for blog posts
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
}

pub struct SearchService {
    news: Arc<dyn NewsRepository>,
    blog: Arc<dyn BlogPostRepository>,
}

impl SearchService {
    pub fn new(news: Arc<dyn NewsRepository>, blog: Arc<dyn BlogPostRepository>) -> Self {
        Self { news, blog }
    }

    /// Newest matches first across both content kinds, at most `limit`
    pub async fn search(&self, q: &str, limit: Option<i64>) -> Result<Vec<SearchResult>, SearchError> {
        let query = normalize_query(q)?;
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        let news = self.news.search_published(&query, limit).await?;
        let posts = self.blog.search_published(&query, limit).await?;

        let mut results: Vec<SearchResult> = news
            .into_iter()
            .map(|n| SearchResult {
                kind: ContentKind::News,
                id: n.id,
                snippet: truncate_chars(n.summary.as_deref().unwrap_or(&n.content), SNIPPET_CHARS),
                title: n.title,
                url: n.url,
                published_at: n.published_at,
            })
            .chain(posts.into_iter().map(|p| SearchResult {
                kind: ContentKind::Blog,
                id: p.id,
                snippet: truncate_chars(p.excerpt.as_deref().unwrap_or_default(), SNIPPET_CHARS),
                title: p.title,
                url: format!("/blog/{}", p.slug),
                published_at: p.published_at,
            }))
            .collect();

        results.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        results.truncate(limit as usize);
        debug!(query = %query, results = results.len(), "Search");
        Ok(results)
    }
}

/// Trim and bound the raw query
pub fn normalize_query(q: &str) -> Result<String, SearchError> {
    let query = q.trim();
    if query.is_empty() {
        return Err(SearchError::ValidationError("Search query cannot be empty".into()));
    }
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(SearchError::ValidationError(format!(
            "Search query cannot exceed {} characters",
            MAX_QUERY_CHARS
        )));
    }
    Ok(query.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::{SqlxBlogPostRepository, SqlxNewsRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::{BlogPostStatus, CreateBlogPostInput, CreateNewsInput, ModerationStatus};
    use crate::services::blog::BlogService;

    async fn setup() -> (DynDatabasePool, SearchService) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let service = SearchService::new(
            SqlxNewsRepository::boxed(pool.clone()),
            SqlxBlogPostRepository::boxed(pool.clone()),
        );
        (pool, service)
    }

    async fn add_news(pool: &DynDatabasePool, title: &str, status: ModerationStatus) {
        let repo = SqlxNewsRepository::new(pool.clone());
        let item = repo
            .create(&CreateNewsInput {
                source_id: None,
                title: title.into(),
                content: "Some body".into(),
                url: format!("https://n.example/{}", title.len()),
                image_url: None,
                content_hash: title.into(),
                source_published_at: None,
            })
            .await
            .unwrap();
        repo.update_status(item.id, status, None).await.unwrap();
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  rust  ").unwrap(), "rust");
        assert!(normalize_query("   ").is_err());
        assert!(normalize_query(&"x".repeat(101)).is_err());
        assert!(normalize_query(&"x".repeat(100)).is_ok());
    }

    #[tokio::test]
    async fn test_search_mixes_published_news_and_blog() {
        let (pool, service) = setup().await;
        add_news(&pool, "Rust 2.0 announced", ModerationStatus::Published).await;
        add_news(&pool, "Rust draft story", ModerationStatus::Pending).await;

        let blog = BlogService::new(SqlxBlogPostRepository::boxed(pool.clone()), Arc::new(MemoryCache::new()));
        blog.create(CreateBlogPostInput {
            title: "Why I write Rust".into(),
            content: "Because it is fun.".into(),
            status: Some(BlogPostStatus::Published),
            ..Default::default()
        })
        .await
        .unwrap();
        blog.create(CreateBlogPostInput {
            title: "Unpublished Rust notes".into(),
            content: "Draft".into(),
            ..Default::default()
        })
        .await
        .unwrap();

        let results = service.search(" rust ", None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().any(|r| r.kind == ContentKind::News && r.title == "Rust 2.0 announced"));
        assert!(results
            .iter()
            .any(|r| r.kind == ContentKind::Blog && r.url == "/blog/why-i-write-rust"));

        let limited = service.search("rust", Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_like_wildcards_are_literal() {
        let (pool, service) = setup().await;
        add_news(&pool, "Plain title", ModerationStatus::Published).await;
        assert!(service.search("%", None).await.unwrap().is_empty());
        assert!(matches!(
            service.search("", None).await,
            Err(SearchError::ValidationError(_))
        ));
    }
}
