//! Blog post repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;

use super::news::escape_like;
use crate::db::DynDatabasePool;
use crate::models::{BlogPost, BlogPostStatus};

const POST_COLUMNS: &str = "id, slug, title, content, content_html, excerpt, cover_image, status, \
    published_at, created_at, updated_at";

#[async_trait]
pub trait BlogPostRepository: Send + Sync {
    async fn create(&self, post: &BlogPost) -> Result<BlogPost>;
    async fn get_by_id(&self, id: i64) -> Result<Option<BlogPost>>;
    async fn get_by_slug(&self, slug: &str) -> Result<Option<BlogPost>>;
    async fn exists_by_slug(&self, slug: &str) -> Result<bool>;
    async fn list(&self, status: Option<BlogPostStatus>, offset: i64, limit: i64) -> Result<Vec<BlogPost>>;
    async fn count(&self, status: Option<BlogPostStatus>) -> Result<i64>;
    async fn update(&self, post: &BlogPost) -> Result<BlogPost>;
    async fn delete(&self, id: i64) -> Result<()>;
    async fn search_published(&self, query: &str, limit: i64) -> Result<Vec<BlogPost>>;
}

pub struct SqlxBlogPostRepository {
    pool: DynDatabasePool,
}

impl SqlxBlogPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BlogPostRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl BlogPostRepository for SqlxBlogPostRepository {
    async fn create(&self, post: &BlogPost) -> Result<BlogPost> {
        create_post(self.pool.sqlite(), post).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<BlogPost>> {
        let row = sqlx::query(&format!("SELECT {} FROM blog_posts WHERE id = ?", POST_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get blog post")?;
        row.map(|r| row_to_post(&r)).transpose()
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<BlogPost>> {
        let row = sqlx::query(&format!("SELECT {} FROM blog_posts WHERE slug = ?", POST_COLUMNS))
            .bind(slug)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get blog post by slug")?;
        row.map(|r| row_to_post(&r)).transpose()
    }

    async fn exists_by_slug(&self, slug: &str) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM blog_posts WHERE slug = ?")
            .bind(slug)
            .fetch_one(self.pool.sqlite())
            .await?;
        Ok(row.get::<i64, _>("count") > 0)
    }

    async fn list(&self, status: Option<BlogPostStatus>, offset: i64, limit: i64) -> Result<Vec<BlogPost>> {
        let pool = self.pool.sqlite();
        let rows = match status {
            Some(status) => sqlx::query(&format!(
                "SELECT {} FROM blog_posts WHERE status = ? \
                 ORDER BY COALESCE(published_at, created_at) DESC, id DESC LIMIT ? OFFSET ?",
                POST_COLUMNS
            ))
            .bind(status.to_string())
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await,
            None => sqlx::query(&format!(
                "SELECT {} FROM blog_posts ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
                POST_COLUMNS
            ))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await,
        }
        .context("Failed to list blog posts")?;
        rows.iter().map(row_to_post).collect()
    }

    async fn count(&self, status: Option<BlogPostStatus>) -> Result<i64> {
        let pool = self.pool.sqlite();
        let row = match status {
            Some(status) => sqlx::query("SELECT COUNT(*) as count FROM blog_posts WHERE status = ?")
                .bind(status.to_string())
                .fetch_one(pool)
                .await,
            None => sqlx::query("SELECT COUNT(*) as count FROM blog_posts").fetch_one(pool).await,
        }
        .context("Failed to count blog posts")?;
        Ok(row.get("count"))
    }

    async fn update(&self, post: &BlogPost) -> Result<BlogPost> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE blog_posts SET slug = ?, title = ?, content = ?, content_html = ?, excerpt = ?, \
             cover_image = ?, status = ?, published_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&post.slug)
        .bind(&post.title)
        .bind(&post.content)
        .bind(&post.content_html)
        .bind(&post.excerpt)
        .bind(&post.cover_image)
        .bind(post.status.to_string())
        .bind(post.published_at)
        .bind(now)
        .bind(post.id)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to update blog post")?;

        Ok(BlogPost {
            updated_at: now,
            ..post.clone()
        })
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM blog_posts WHERE id = ?")
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to delete blog post")?;
        Ok(())
    }

    async fn search_published(&self, query: &str, limit: i64) -> Result<Vec<BlogPost>> {
        let pattern = format!("%{}%", escape_like(query));
        let rows = sqlx::query(&format!(
            "SELECT {} FROM blog_posts WHERE status = 'published' AND \
             (title LIKE ? ESCAPE '\\' OR excerpt LIKE ? ESCAPE '\\' OR content LIKE ? ESCAPE '\\') \
             ORDER BY published_at DESC LIMIT ?",
            POST_COLUMNS
        ))
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(limit)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to search blog posts")?;
        rows.iter().map(row_to_post).collect()
    }
}

async fn create_post(pool: &SqlitePool, post: &BlogPost) -> Result<BlogPost> {
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO blog_posts (slug, title, content, content_html, excerpt, cover_image, status, \
         published_at, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&post.slug)
    .bind(&post.title)
    .bind(&post.content)
    .bind(&post.content_html)
    .bind(&post.excerpt)
    .bind(&post.cover_image)
    .bind(post.status.to_string())
    .bind(post.published_at)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create blog post")?;

    Ok(BlogPost {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..post.clone()
    })
}

fn row_to_post(row: &SqliteRow) -> Result<BlogPost> {
    let status: String = row.get("status");
    Ok(BlogPost {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        content: row.get("content"),
        content_html: row.get("content_html"),
        excerpt: row.get("excerpt"),
        cover_image: row.get("cover_image"),
        status: status.parse().map_err(|e: String| anyhow::anyhow!(e))?,
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
