//! RSS source repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};
use std::sync::Arc;

use crate::db::DynDatabasePool;
use crate::models::{CreateRssSourceInput, RssSource};

const SOURCE_COLUMNS: &str =
    "id, name, url, category, is_active, last_fetched_at, last_error, created_at";

#[async_trait]
pub trait RssSourceRepository: Send + Sync {
    async fn create(&self, input: &CreateRssSourceInput) -> Result<RssSource>;
    async fn get_by_id(&self, id: i64) -> Result<Option<RssSource>>;
    async fn exists_by_url(&self, url: &str) -> Result<bool>;
    async fn list(&self) -> Result<Vec<RssSource>>;
    async fn list_active(&self) -> Result<Vec<RssSource>>;
    async fn set_active(&self, id: i64, active: bool) -> Result<()>;
    /// Stamp `last_fetched_at` and store (or clear) the fetch error
    async fn record_fetch(&self, id: i64, error: Option<&str>) -> Result<()>;
    async fn delete(&self, id: i64) -> Result<()>;
}

pub struct SqlxRssSourceRepository {
    pool: DynDatabasePool,
}

impl SqlxRssSourceRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn RssSourceRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl RssSourceRepository for SqlxRssSourceRepository {
    async fn create(&self, input: &CreateRssSourceInput) -> Result<RssSource> {
        let result = sqlx::query(
            "INSERT INTO rss_sources (name, url, category, is_active, created_at) VALUES (?, ?, ?, 1, ?)",
        )
        .bind(&input.name)
        .bind(&input.url)
        .bind(&input.category)
        .bind(Utc::now())
        .execute(self.pool.sqlite())
        .await
        .context("Failed to create RSS source")?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .ok_or_else(|| anyhow::anyhow!("RSS source not found after insert"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<RssSource>> {
        let row = sqlx::query(&format!("SELECT {} FROM rss_sources WHERE id = ?", SOURCE_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get RSS source")?;
        Ok(row.as_ref().map(row_to_source))
    }

    async fn exists_by_url(&self, url: &str) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM rss_sources WHERE url = ?")
            .bind(url)
            .fetch_one(self.pool.sqlite())
            .await?;
        Ok(row.get::<i64, _>("count") > 0)
    }

    async fn list(&self) -> Result<Vec<RssSource>> {
        let rows = sqlx::query(&format!("SELECT {} FROM rss_sources ORDER BY name", SOURCE_COLUMNS))
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list RSS sources")?;
        Ok(rows.iter().map(row_to_source).collect())
    }

    async fn list_active(&self) -> Result<Vec<RssSource>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM rss_sources WHERE is_active = 1 ORDER BY id",
            SOURCE_COLUMNS
        ))
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list active RSS sources")?;
        Ok(rows.iter().map(row_to_source).collect())
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<()> {
        sqlx::query("UPDATE rss_sources SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to toggle RSS source")?;
        Ok(())
    }

    async fn record_fetch(&self, id: i64, error: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE rss_sources SET last_fetched_at = ?, last_error = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(error)
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to record fetch")?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM rss_sources WHERE id = ?")
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to delete RSS source")?;
        Ok(())
    }
}

fn row_to_source(row: &SqliteRow) -> RssSource {
    RssSource {
        id: row.get("id"),
        name: row.get("name"),
        url: row.get("url"),
        category: row.get("category"),
        is_active: row.get("is_active"),
        last_fetched_at: row.get("last_fetched_at"),
        last_error: row.get("last_error"),
        created_at: row.get("created_at"),
    }
}
