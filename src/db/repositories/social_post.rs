//! Social media post repository
//!
//! Records every cross-posting attempt, one row per platform.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};
use std::sync::Arc;

use crate::db::DynDatabasePool;
use crate::models::{ContentKind, Platform, SocialMediaPost};

const SOCIAL_COLUMNS: &str = "id, platform, content_kind, content_id, message, media_url, \
    external_id, external_url, status, error, created_at, published_at";

/// Row inserted before calling the platform API
#[derive(Debug, Clone)]
pub struct NewSocialPost {
    pub platform: Platform,
    pub content_kind: ContentKind,
    pub content_id: Option<i64>,
    pub message: String,
    pub media_url: Option<String>,
}

#[async_trait]
pub trait SocialPostRepository: Send + Sync {
    async fn create(&self, post: &NewSocialPost) -> Result<SocialMediaPost>;
    async fn get_by_id(&self, id: i64) -> Result<Option<SocialMediaPost>>;
    async fn mark_published(&self, id: i64, external_id: &str, external_url: Option<&str>) -> Result<()>;
    async fn mark_failed(&self, id: i64, error: &str) -> Result<()>;
    async fn list(&self, platform: Option<Platform>, offset: i64, limit: i64) -> Result<Vec<SocialMediaPost>>;
    async fn count(&self, platform: Option<Platform>) -> Result<i64>;
    async fn list_for_content(&self, kind: ContentKind, content_id: i64) -> Result<Vec<SocialMediaPost>>;
}

pub struct SqlxSocialPostRepository {
    pool: DynDatabasePool,
}

impl SqlxSocialPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SocialPostRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SocialPostRepository for SqlxSocialPostRepository {
    async fn create(&self, post: &NewSocialPost) -> Result<SocialMediaPost> {
        let result = sqlx::query(
            "INSERT INTO social_media_posts (platform, content_kind, content_id, message, media_url, \
             status, created_at) VALUES (?, ?, ?, ?, ?, 'pending', ?)",
        )
        .bind(post.platform.as_str())
        .bind(post.content_kind.to_string())
        .bind(post.content_id)
        .bind(&post.message)
        .bind(&post.media_url)
        .bind(Utc::now())
        .execute(self.pool.sqlite())
        .await
        .context("Failed to create social post")?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .ok_or_else(|| anyhow::anyhow!("Social post not found after insert"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<SocialMediaPost>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM social_media_posts WHERE id = ?",
            SOCIAL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.sqlite())
        .await
        .context("Failed to get social post")?;
        row.map(|r| row_to_social_post(&r)).transpose()
    }

    async fn mark_published(&self, id: i64, external_id: &str, external_url: Option<&str>) -> Result<()> {
        sqlx::query(
            "UPDATE social_media_posts SET status = 'published', external_id = ?, external_url = ?, \
             error = NULL, published_at = ? WHERE id = ?",
        )
        .bind(external_id)
        .bind(external_url)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to mark social post published")?;
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<()> {
        sqlx::query("UPDATE social_media_posts SET status = 'failed', error = ? WHERE id = ?")
            .bind(error)
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to mark social post failed")?;
        Ok(())
    }

    async fn list(&self, platform: Option<Platform>, offset: i64, limit: i64) -> Result<Vec<SocialMediaPost>> {
        let pool = self.pool.sqlite();
        let rows = match platform {
            Some(platform) => sqlx::query(&format!(
                "SELECT {} FROM social_media_posts WHERE platform = ? ORDER BY id DESC LIMIT ? OFFSET ?",
                SOCIAL_COLUMNS
            ))
            .bind(platform.as_str())
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await,
            None => sqlx::query(&format!(
                "SELECT {} FROM social_media_posts ORDER BY id DESC LIMIT ? OFFSET ?",
                SOCIAL_COLUMNS
            ))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await,
        }
        .context("Failed to list social posts")?;
        rows.iter().map(row_to_social_post).collect()
    }

    async fn count(&self, platform: Option<Platform>) -> Result<i64> {
        let pool = self.pool.sqlite();
        let row = match platform {
            Some(platform) => sqlx::query("SELECT COUNT(*) as count FROM social_media_posts WHERE platform = ?")
                .bind(platform.as_str())
                .fetch_one(pool)
                .await,
            None => sqlx::query("SELECT COUNT(*) as count FROM social_media_posts")
                .fetch_one(pool)
                .await,
        }
        .context("Failed to count social posts")?;
        Ok(row.get("count"))
    }

    async fn list_for_content(&self, kind: ContentKind, content_id: i64) -> Result<Vec<SocialMediaPost>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM social_media_posts WHERE content_kind = ? AND content_id = ? ORDER BY id",
            SOCIAL_COLUMNS
        ))
        .bind(kind.to_string())
        .bind(content_id)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list social posts for content")?;
        rows.iter().map(row_to_social_post).collect()
    }
}

fn row_to_social_post(row: &SqliteRow) -> Result<SocialMediaPost> {
    let platform: String = row.get("platform");
    let kind: String = row.get("content_kind");
    let status: String = row.get("status");
    Ok(SocialMediaPost {
        id: row.get("id"),
        platform: platform.parse().map_err(|e: String| anyhow::anyhow!(e))?,
        content_kind: kind.parse().map_err(|e: String| anyhow::anyhow!(e))?,
        content_id: row.get("content_id"),
        message: row.get("message"),
        media_url: row.get("media_url"),
        external_id: row.get("external_id"),
        external_url: row.get("external_url"),
        status: status.parse().unwrap_or_default(),
        error: row.get("error"),
        created_at: row.get("created_at"),
        published_at: row.get("published_at"),
    })
}
