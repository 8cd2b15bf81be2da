//! Settings repository
//!
//! Key-value runtime switches stored in `api_settings`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::DynDatabasePool;

/// A setting key-value pair
#[derive(Debug, Clone)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Setting>>;

    async fn get_all(&self) -> Result<Vec<Setting>>;

    /// Upsert a single setting
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Upsert several settings in one transaction
    async fn set_many(&self, settings: &HashMap<String, String>) -> Result<()>;
}

pub struct SqlxSettingsRepository {
    pool: DynDatabasePool,
}

impl SqlxSettingsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SettingsRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SettingsRepository for SqlxSettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<Setting>> {
        get_setting(self.pool.sqlite(), key).await
    }

    async fn get_all(&self) -> Result<Vec<Setting>> {
        let rows = sqlx::query("SELECT key, value, updated_at FROM api_settings ORDER BY key")
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list settings")?;
        Ok(rows.iter().map(row_to_setting).collect())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        set_setting(self.pool.sqlite(), key, value).await
    }

    async fn set_many(&self, settings: &HashMap<String, String>) -> Result<()> {
        let mut tx = self.pool.sqlite().begin().await?;
        for (key, value) in settings {
            sqlx::query(UPSERT_SQL)
                .bind(key)
                .bind(value)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to set setting {}", key))?;
        }
        tx.commit().await?;
        Ok(())
    }
}

const UPSERT_SQL: &str = "INSERT INTO api_settings (key, value, updated_at) VALUES (?, ?, ?) \
     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at";

async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<Setting>> {
    let row = sqlx::query("SELECT key, value, updated_at FROM api_settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to get setting")?;
    Ok(row.as_ref().map(row_to_setting))
}

async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(UPSERT_SQL)
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("Failed to set setting")?;
    Ok(())
}

fn row_to_setting(row: &SqliteRow) -> Setting {
    Setting {
        key: row.get("key"),
        value: row.get("value"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> Arc<dyn SettingsRepository> {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        SqlxSettingsRepository::boxed(pool)
    }

    #[tokio::test]
    async fn test_seeded_defaults() {
        let repo = setup().await;
        let all = repo.get_all().await.unwrap();
        let keys: Vec<&str> = all.iter().map(|s| s.key.as_str()).collect();
        assert!(keys.contains(&"auto_pre_moderation"));
        assert!(keys.contains(&"crosspost_platforms"));
    }

    #[tokio::test]
    async fn test_set_and_overwrite() {
        let repo = setup().await;
        repo.set("notify_email", "true").await.unwrap();
        assert_eq!(repo.get("notify_email").await.unwrap().unwrap().value, "true");

        repo.set("custom", "1").await.unwrap();
        repo.set("custom", "2").await.unwrap();
        assert_eq!(repo.get("custom").await.unwrap().unwrap().value, "2");
        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_many() {
        let repo = setup().await;
        let mut values = HashMap::new();
        values.insert("auto_analyze".to_string(), "false".to_string());
        values.insert("crosspost_platforms".to_string(), "youtube".to_string());
        repo.set_many(&values).await.unwrap();

        assert_eq!(repo.get("auto_analyze").await.unwrap().unwrap().value, "false");
        assert_eq!(repo.get("crosspost_platforms").await.unwrap().unwrap().value, "youtube");
    }
}
