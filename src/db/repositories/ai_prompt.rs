//! AI prompt repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};
use std::sync::Arc;

use crate::db::DynDatabasePool;
use crate::models::AiPrompt;

#[async_trait]
pub trait AiPromptRepository: Send + Sync {
    /// Active prompt of the given type, if one is stored
    async fn get_active(&self, prompt_type: &str) -> Result<Option<AiPrompt>>;
    async fn list(&self) -> Result<Vec<AiPrompt>>;
    /// Insert or replace the prompt for a type
    async fn upsert(&self, prompt_type: &str, content: &str, is_active: bool) -> Result<AiPrompt>;
}

pub struct SqlxAiPromptRepository {
    pool: DynDatabasePool,
}

impl SqlxAiPromptRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AiPromptRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AiPromptRepository for SqlxAiPromptRepository {
    async fn get_active(&self, prompt_type: &str) -> Result<Option<AiPrompt>> {
        let row = sqlx::query(
            "SELECT id, prompt_type, content, is_active, updated_at FROM ai_prompts \
             WHERE prompt_type = ? AND is_active = 1",
        )
        .bind(prompt_type)
        .fetch_optional(self.pool.sqlite())
        .await
        .context("Failed to get prompt")?;
        Ok(row.as_ref().map(row_to_prompt))
    }

    async fn list(&self) -> Result<Vec<AiPrompt>> {
        let rows = sqlx::query(
            "SELECT id, prompt_type, content, is_active, updated_at FROM ai_prompts ORDER BY prompt_type",
        )
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list prompts")?;
        Ok(rows.iter().map(row_to_prompt).collect())
    }

    async fn upsert(&self, prompt_type: &str, content: &str, is_active: bool) -> Result<AiPrompt> {
        let row = sqlx::query(
            "INSERT INTO ai_prompts (prompt_type, content, is_active, updated_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(prompt_type) DO UPDATE SET content = excluded.content, \
             is_active = excluded.is_active, updated_at = excluded.updated_at \
             RETURNING id, prompt_type, content, is_active, updated_at",
        )
        .bind(prompt_type)
        .bind(content)
        .bind(is_active)
        .bind(Utc::now())
        .fetch_one(self.pool.sqlite())
        .await
        .context("Failed to save prompt")?;
        Ok(row_to_prompt(&row))
    }
}

fn row_to_prompt(row: &SqliteRow) -> AiPrompt {
    AiPrompt {
        id: row.get("id"),
        prompt_type: row.get("prompt_type"),
        content: row.get("content"),
        is_active: row.get("is_active"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::prompt_types;

    async fn setup() -> Arc<dyn AiPromptRepository> {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        SqlxAiPromptRepository::boxed(pool)
    }

    #[tokio::test]
    async fn test_upsert_replaces_content() {
        let repo = setup().await;
        let first = repo.upsert(prompt_types::PRE_MODERATION, "v1 {{title}}", true).await.unwrap();
        let second = repo.upsert(prompt_types::PRE_MODERATION, "v2 {{title}}", true).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(repo.list().await.unwrap().len(), 1);
        let active = repo.get_active(prompt_types::PRE_MODERATION).await.unwrap().unwrap();
        assert_eq!(active.content, "v2 {{title}}");
    }

    #[tokio::test]
    async fn test_inactive_prompt_is_not_returned() {
        let repo = setup().await;
        repo.upsert(prompt_types::ARTICLE_ANALYSIS, "analyze", false).await.unwrap();
        assert!(repo.get_active(prompt_types::ARTICLE_ANALYSIS).await.unwrap().is_none());
        assert!(repo.get_active(prompt_types::SOCIAL_POST).await.unwrap().is_none());
    }
}
