//! Blog service
//!
//! Implements business logic for blog posts:
//! - Create, read, update, delete
//! - Markdown rendering and excerpt generation
//! - Slug generation and uniqueness
//! - Cache invalidation for public reads

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use super::markdown::MarkdownRenderer;
use crate::cache::{CacheLayer, SharedCache};
use crate::db::repositories::BlogPostRepository;
use crate::models::{
    BlogPost, BlogPostStatus, CreateBlogPostInput, ListParams, PagedResult, UpdateBlogPostInput,
};

const CACHE_KEY_LIST: &str = "blog:list";
const CACHE_KEY_SLUG: &str = "blog:slug";
const CACHE_PATTERN: &str = "blog:*";

/// Length of auto-generated excerpts, in characters
const EXCERPT_CHARS: usize = 200;
const MAX_TITLE_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum BlogServiceError {
    #[error("Blog post not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Blog post slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] anyhow::Error),
}

pub struct BlogService {
    repo: Arc<dyn BlogPostRepository>,
    cache: SharedCache,
    renderer: MarkdownRenderer,
}

impl BlogService {
    pub fn new(repo: Arc<dyn BlogPostRepository>, cache: SharedCache) -> Self {
        Self {
            repo,
            cache,
            renderer: MarkdownRenderer::new(),
        }
    }

    // ---------------------------------------------------------------------
    // Public reads
    // ---------------------------------------------------------------------

    pub async fn list_published(&self, params: &ListParams) -> Result<PagedResult<BlogPost>, BlogServiceError> {
        let cache_key = format!("{}:{}:{}", CACHE_KEY_LIST, params.page, params.per_page);
        if let Ok(Some(cached)) = self.cache.get::<PagedResult<BlogPost>>(&cache_key).await {
            return Ok(cached);
        }

        let status = Some(BlogPostStatus::Published);
        let posts = self.repo.list(status, params.offset(), params.limit()).await?;
        let total = self.repo.count(status).await?;
        let result = PagedResult::new(posts, total, params);

        let _ = self.cache.set(&cache_key, &result, self.cache.default_ttl()).await;
        Ok(result)
    }

    /// Published post by slug; drafts are reported as not found
    pub async fn get_by_slug(&self, slug: &str) -> Result<BlogPost, BlogServiceError> {
        let cache_key = format!("{}:{}", CACHE_KEY_SLUG, slug);
        if let Ok(Some(cached)) = self.cache.get::<BlogPost>(&cache_key).await {
            return Ok(cached);
        }

        let post = self
            .repo
            .get_by_slug(slug)
            .await?
            .filter(|p| p.status == BlogPostStatus::Published)
            .ok_or_else(|| BlogServiceError::NotFound(slug.to_string()))?;

        let _ = self.cache.set(&cache_key, &post, self.cache.default_ttl()).await;
        Ok(post)
    }

    // ---------------------------------------------------------------------
    // Admin
    // ---------------------------------------------------------------------

    pub async fn get(&self, id: i64) -> Result<BlogPost, BlogServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| BlogServiceError::NotFound(id.to_string()))
    }

    /// All posts, optionally filtered by status
    pub async fn list(
        &self,
        status: Option<BlogPostStatus>,
        params: &ListParams,
    ) -> Result<PagedResult<BlogPost>, BlogServiceError> {
        let posts = self.repo.list(status, params.offset(), params.limit()).await?;
        let total = self.repo.count(status).await?;
        Ok(PagedResult::new(posts, total, params))
    }

    pub async fn create(&self, input: CreateBlogPostInput) -> Result<BlogPost, BlogServiceError> {
        let title = validate_title(&input.title)?;
        validate_content(&input.content)?;

        let slug = resolve_slug(input.slug.as_deref(), &title)?;
        if self.repo.exists_by_slug(&slug).await? {
            return Err(BlogServiceError::DuplicateSlug(slug));
        }

        let status = input.status.unwrap_or_default();
        let now = Utc::now();
        let post = BlogPost {
            id: 0,
            slug,
            title,
            content_html: self.renderer.render(&input.content),
            excerpt: Some(self.excerpt_for(input.excerpt.as_deref(), &input.content)),
            content: input.content,
            cover_image: non_empty(input.cover_image),
            status,
            published_at: (status == BlogPostStatus::Published).then_some(now),
            created_at: now,
            updated_at: now,
        };

        let created = self.repo.create(&post).await?;
        self.invalidate().await;
        info!(post_id = created.id, slug = %created.slug, "Blog post created");
        Ok(created)
    }

    pub async fn update(&self, id: i64, input: UpdateBlogPostInput) -> Result<BlogPost, BlogServiceError> {
        let mut post = self.get(id).await?;

        if let Some(title) = input.title {
            post.title = validate_title(&title)?;
        }
        if let Some(slug) = input.slug {
            let slug = resolve_slug(Some(&slug), &post.title)?;
            if slug != post.slug {
                if self.repo.exists_by_slug(&slug).await? {
                    return Err(BlogServiceError::DuplicateSlug(slug));
                }
                post.slug = slug;
            }
        }

        let content_changed = input.content.is_some();
        if let Some(content) = input.content {
            validate_content(&content)?;
            post.content_html = self.renderer.render(&content);
            post.content = content;
        }
        match input.excerpt {
            Some(excerpt) => post.excerpt = Some(self.excerpt_for(Some(&excerpt), &post.content)),
            None if content_changed => post.excerpt = Some(self.excerpt_for(None, &post.content)),
            None => {}
        }
        if let Some(cover_image) = input.cover_image {
            post.cover_image = non_empty(Some(cover_image));
        }
        if let Some(status) = input.status {
            if status == BlogPostStatus::Published && post.published_at.is_none() {
                post.published_at = Some(Utc::now());
            }
            post.status = status;
        }

        let updated = self.repo.update(&post).await?;
        self.invalidate().await;
        info!(post_id = id, "Blog post updated");
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<(), BlogServiceError> {
        self.get(id).await?;
        self.repo.delete(id).await?;
        self.invalidate().await;
        info!(post_id = id, "Blog post deleted");
        Ok(())
    }

    fn excerpt_for(&self, explicit: Option<&str>, content: &str) -> String {
        match explicit.map(str::trim).filter(|e| !e.is_empty()) {
            Some(excerpt) => excerpt.to_string(),
            None => self.renderer.excerpt(content, EXCERPT_CHARS),
        }
    }

    async fn invalidate(&self) {
        let _ = self.cache.delete_pattern(CACHE_PATTERN).await;
    }
}

fn validate_title(title: &str) -> Result<String, BlogServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(BlogServiceError::ValidationError("Title cannot be empty".into()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(BlogServiceError::ValidationError(format!(
            "Title cannot exceed {} characters",
            MAX_TITLE_CHARS
        )));
    }
    Ok(title.to_string())
}

fn validate_content(content: &str) -> Result<(), BlogServiceError> {
    if content.trim().is_empty() {
        return Err(BlogServiceError::ValidationError("Content cannot be empty".into()));
    }
    Ok(())
}

fn resolve_slug(explicit: Option<&str>, title: &str) -> Result<String, BlogServiceError> {
    let slug = match explicit.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => generate_slug(s),
        None => generate_slug(title),
    };
    if slug.is_empty() {
        return Err(BlogServiceError::ValidationError(
            "Could not derive a slug from the title".into(),
        ));
    }
    Ok(slug)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Generate a URL-friendly slug.
///
/// Lowercases, keeps ASCII alphanumerics and non-ASCII letters, and turns
/// every other run of characters into a single hyphen.
pub fn generate_slug(title: &str) -> String {
    let mut result = String::with_capacity(title.len());
    let mut prev_hyphen = false;

    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() || (!c.is_ascii() && c.is_alphanumeric()) {
            result.push(c);
            prev_hyphen = false;
        } else if !prev_hyphen && !result.is_empty() {
            result.push('-');
            prev_hyphen = true;
        }
    }

    result.trim_end_matches('-').to_string()
}
