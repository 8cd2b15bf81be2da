//! News repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::DynDatabasePool;
use crate::models::{CreateNewsInput, ModerationStatus, NewsItem, PreModerationStatus};

const NEWS_COLUMNS: &str = "id, source_id, title, content, summary, url, image_url, category, tags, \
    social_text, content_hash, moderation_status, pre_moderation_status, pre_moderation_reason, \
    pre_moderation_confidence, rejection_reason, source_published_at, analyzed_at, published_at, created_at, updated_at";

/// Fields written by the AI analysis step
#[derive(Debug, Clone, Default)]
pub struct NewsAnalysisUpdate {
    pub summary: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub social_text: Option<String>,
}

/// Fields written by the AI pre-moderation step
#[derive(Debug, Clone)]
pub struct PreModerationUpdate {
    pub status: PreModerationStatus,
    pub reason: Option<String>,
    pub confidence: Option<f64>,
    /// Human moderation status to force alongside (e.g. rejected)
    pub moderation_status: Option<ModerationStatus>,
}

#[async_trait]
pub trait NewsRepository: Send + Sync {
    async fn create(&self, input: &CreateNewsInput) -> Result<NewsItem>;
    /// Insert unless the URL is already stored; `None` on conflict
    async fn create_if_new(&self, input: &CreateNewsInput) -> Result<Option<NewsItem>>;
    async fn get_by_id(&self, id: i64) -> Result<Option<NewsItem>>;
    async fn exists_by_url(&self, url: &str) -> Result<bool>;
    async fn exists_by_hash(&self, hash: &str) -> Result<bool>;
    /// List items, newest first. `None` lists every status.
    async fn list(&self, status: Option<ModerationStatus>, offset: i64, limit: i64) -> Result<Vec<NewsItem>>;
    async fn count(&self, status: Option<ModerationStatus>) -> Result<i64>;
    /// Published items ordered by publication date
    async fn list_published(&self, offset: i64, limit: i64) -> Result<Vec<NewsItem>>;
    /// Items that have not been through AI pre-moderation yet, oldest first
    async fn list_awaiting_pre_moderation(&self, limit: i64) -> Result<Vec<NewsItem>>;
    /// Pre-approved items waiting for a human decision, oldest first
    async fn list_awaiting_review(&self, limit: i64) -> Result<Vec<NewsItem>>;
    async fn update_pre_moderation(&self, id: i64, update: &PreModerationUpdate) -> Result<()>;
    async fn update_analysis(&self, id: i64, update: &NewsAnalysisUpdate) -> Result<()>;
    /// Change the human moderation status. `reason` is kept only for rejections.
    async fn update_status(&self, id: i64, status: ModerationStatus, reason: Option<&str>) -> Result<()>;
    async fn count_by_status(&self) -> Result<HashMap<ModerationStatus, i64>>;
    async fn search_published(&self, query: &str, limit: i64) -> Result<Vec<NewsItem>>;
}

pub struct SqlxNewsRepository {
    pool: DynDatabasePool,
}

impl SqlxNewsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn NewsRepository> {
        Arc::new(Self::new(pool))
    }

    fn db(&self) -> &SqlitePool {
        self.pool.sqlite()
    }
}

#[async_trait]
impl NewsRepository for SqlxNewsRepository {
    async fn create(&self, input: &CreateNewsInput) -> Result<NewsItem> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO news (source_id, title, content, url, image_url, content_hash, \
             source_published_at, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(input.source_id)
        .bind(&input.title)
        .bind(&input.content)
        .bind(&input.url)
        .bind(&input.image_url)
        .bind(&input.content_hash)
        .bind(input.source_published_at)
        .bind(now)
        .bind(now)
        .execute(self.db())
        .await
        .context("Failed to create news item")?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .ok_or_else(|| anyhow::anyhow!("News item not found after insert"))
    }

    async fn create_if_new(&self, input: &CreateNewsInput) -> Result<Option<NewsItem>> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO news (source_id, title, content, url, image_url, content_hash, \
             source_published_at, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(url) DO NOTHING",
        )
        .bind(input.source_id)
        .bind(&input.title)
        .bind(&input.content)
        .bind(&input.url)
        .bind(&input.image_url)
        .bind(&input.content_hash)
        .bind(input.source_published_at)
        .bind(now)
        .bind(now)
        .execute(self.db())
        .await
        .context("Failed to create news item")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_by_id(result.last_insert_rowid()).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<NewsItem>> {
        let row = sqlx::query(&format!("SELECT {} FROM news WHERE id = ?", NEWS_COLUMNS))
            .bind(id)
            .fetch_optional(self.db())
            .await
            .context("Failed to get news item")?;
        row.map(|r| row_to_news(&r)).transpose()
    }

    async fn exists_by_url(&self, url: &str) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM news WHERE url = ?")
            .bind(url)
            .fetch_one(self.db())
            .await?;
        Ok(row.get::<i64, _>("count") > 0)
    }

    async fn exists_by_hash(&self, hash: &str) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM news WHERE content_hash = ?")
            .bind(hash)
            .fetch_one(self.db())
            .await?;
        Ok(row.get::<i64, _>("count") > 0)
    }

    async fn list(&self, status: Option<ModerationStatus>, offset: i64, limit: i64) -> Result<Vec<NewsItem>> {
        let rows = match status {
            Some(status) => sqlx::query(&format!(
                "SELECT {} FROM news WHERE moderation_status = ? ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
                NEWS_COLUMNS
            ))
            .bind(status.as_str())
            .bind(limit)
            .bind(offset)
            .fetch_all(self.db())
            .await,
            None => sqlx::query(&format!(
                "SELECT {} FROM news ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
                NEWS_COLUMNS
            ))
            .bind(limit)
            .bind(offset)
            .fetch_all(self.db())
            .await,
        }
        .context("Failed to list news")?;
        rows.iter().map(row_to_news).collect()
    }

    async fn count(&self, status: Option<ModerationStatus>) -> Result<i64> {
        let row = match status {
            Some(status) => sqlx::query("SELECT COUNT(*) as count FROM news WHERE moderation_status = ?")
                .bind(status.as_str())
                .fetch_one(self.db())
                .await,
            None => sqlx::query("SELECT COUNT(*) as count FROM news")
                .fetch_one(self.db())
                .await,
        }
        .context("Failed to count news")?;
        Ok(row.get("count"))
    }

    async fn list_published(&self, offset: i64, limit: i64) -> Result<Vec<NewsItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM news WHERE moderation_status = 'published' \
             ORDER BY published_at DESC, id DESC LIMIT ? OFFSET ?",
            NEWS_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.db())
        .await
        .context("Failed to list published news")?;
        rows.iter().map(row_to_news).collect()
    }

    async fn list_awaiting_pre_moderation(&self, limit: i64) -> Result<Vec<NewsItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM news WHERE pre_moderation_status = 'pending' AND moderation_status = 'pending' \
             ORDER BY created_at ASC, id ASC LIMIT ?",
            NEWS_COLUMNS
        ))
        .bind(limit)
        .fetch_all(self.db())
        .await
        .context("Failed to list news awaiting pre-moderation")?;
        rows.iter().map(row_to_news).collect()
    }

    async fn list_awaiting_review(&self, limit: i64) -> Result<Vec<NewsItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM news WHERE pre_moderation_status = 'approved' AND moderation_status = 'pending' \
             ORDER BY created_at ASC, id ASC LIMIT ?",
            NEWS_COLUMNS
        ))
        .bind(limit)
        .fetch_all(self.db())
        .await
        .context("Failed to list news awaiting review")?;
        rows.iter().map(row_to_news).collect()
    }

    async fn update_pre_moderation(&self, id: i64, update: &PreModerationUpdate) -> Result<()> {
        sqlx::query(
            "UPDATE news SET pre_moderation_status = ?, pre_moderation_reason = ?, \
             pre_moderation_confidence = ?, moderation_status = COALESCE(?, moderation_status), \
             updated_at = ? WHERE id = ?",
        )
        .bind(update.status.to_string())
        .bind(&update.reason)
        .bind(update.confidence)
        .bind(update.moderation_status.map(|s| s.as_str()))
        .bind(Utc::now())
        .bind(id)
        .execute(self.db())
        .await
        .context("Failed to update pre-moderation result")?;
        Ok(())
    }

    async fn update_analysis(&self, id: i64, update: &NewsAnalysisUpdate) -> Result<()> {
        let tags = serde_json::to_string(&update.tags)?;
        let now = Utc::now();
        sqlx::query(
            "UPDATE news SET summary = COALESCE(?, summary), category = COALESCE(?, category), \
             tags = ?, social_text = COALESCE(?, social_text), analyzed_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&update.summary)
        .bind(&update.category)
        .bind(tags)
        .bind(&update.social_text)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(self.db())
        .await
        .context("Failed to update analysis")?;
        Ok(())
    }

    async fn update_status(&self, id: i64, status: ModerationStatus, reason: Option<&str>) -> Result<()> {
        let now = Utc::now();
        let published_at: Option<DateTime<Utc>> = match status {
            ModerationStatus::Published => Some(now),
            _ => None,
        };
        sqlx::query(
            "UPDATE news SET moderation_status = ?, \
             published_at = CASE WHEN ? = 'published' THEN COALESCE(published_at, ?) ELSE NULL END, \
             rejection_reason = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(status.as_str())
        .bind(published_at)
        .bind(if status == ModerationStatus::Rejected { reason } else { None })
        .bind(now)
        .bind(id)
        .execute(self.db())
        .await
        .context("Failed to update news status")?;
        Ok(())
    }

    async fn count_by_status(&self) -> Result<HashMap<ModerationStatus, i64>> {
        let rows = sqlx::query(
            "SELECT moderation_status, COUNT(*) as count FROM news GROUP BY moderation_status",
        )
        .fetch_all(self.db())
        .await
        .context("Failed to count news by status")?;

        let mut counts: HashMap<ModerationStatus, i64> =
            ModerationStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for row in rows {
            let status: String = row.get("moderation_status");
            if let Ok(status) = status.parse::<ModerationStatus>() {
                counts.insert(status, row.get("count"));
            }
        }
        Ok(counts)
    }

    async fn search_published(&self, query: &str, limit: i64) -> Result<Vec<NewsItem>> {
        let pattern = format!("%{}%", escape_like(query));
        let rows = sqlx::query(&format!(
            "SELECT {} FROM news WHERE moderation_status = 'published' AND \
             (title LIKE ? ESCAPE '\\' OR summary LIKE ? ESCAPE '\\' OR content LIKE ? ESCAPE '\\') \
             ORDER BY published_at DESC LIMIT ?",
            NEWS_COLUMNS
        ))
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(limit)
        .fetch_all(self.db())
        .await
        .context("Failed to search news")?;
        rows.iter().map(row_to_news).collect()
    }
}

/// Escape `%`, `_` and `\` for use inside a LIKE pattern with `ESCAPE '\'`
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn row_to_news(row: &SqliteRow) -> Result<NewsItem> {
    let moderation: String = row.get("moderation_status");
    let pre_moderation: String = row.get("pre_moderation_status");
    let tags: String = row.get("tags");
    Ok(NewsItem {
        id: row.get("id"),
        source_id: row.get("source_id"),
        title: row.get("title"),
        content: row.get("content"),
        summary: row.get("summary"),
        url: row.get("url"),
        image_url: row.get("image_url"),
        category: row.get("category"),
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        social_text: row.get("social_text"),
        content_hash: row.get("content_hash"),
        moderation_status: moderation.parse().unwrap_or_default(),
        pre_moderation_status: pre_moderation.parse().unwrap_or_default(),
        pre_moderation_reason: row.get("pre_moderation_reason"),
        pre_moderation_confidence: row.get("pre_moderation_confidence"),
        rejection_reason: row.get("rejection_reason"),
        source_published_at: row.get("source_published_at"),
        analyzed_at: row.get("analyzed_at"),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> Arc<dyn NewsRepository> {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        SqlxNewsRepository::boxed(pool)
    }

    fn input(url: &str, hash: &str) -> CreateNewsInput {
        CreateNewsInput {
            source_id: None,
            title: format!("Title for {}", url),
            content: "Body".to_string(),
            url: url.to_string(),
            image_url: None,
            content_hash: hash.to_string(),
            source_published_at: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = setup().await;
        let item = repo.create(&input("https://a.example/1", "h1")).await.unwrap();

        assert!(item.id > 0);
        assert_eq!(item.moderation_status, ModerationStatus::Pending);
        assert_eq!(item.pre_moderation_status, PreModerationStatus::Pending);
        assert!(item.tags.is_empty());

        let fetched = repo.get_by_id(item.id).await.unwrap().unwrap();
        assert_eq!(fetched.url, "https://a.example/1");
        assert!(repo.exists_by_url("https://a.example/1").await.unwrap());
        assert!(repo.exists_by_hash("h1").await.unwrap());
        assert!(!repo.exists_by_hash("h2").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_if_new_ignores_known_url() {
        let repo = setup().await;
        let first = repo.create_if_new(&input("https://a.example/dup", "h1")).await.unwrap();
        assert!(first.is_some());

        let again = repo.create_if_new(&input("https://a.example/dup", "h2")).await.unwrap();
        assert!(again.is_none());
        assert_eq!(repo.count(None).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_create_if_new_concurrent_writers() {
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("news.db").to_string_lossy().into_owned();
        let pool = crate::db::create_pool(&crate::config::DatabaseConfig { url }).await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let repo = SqlxNewsRepository::boxed(pool);

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..8 {
            let repo = repo.clone();
            tasks.spawn(async move {
                repo.create_if_new(&input("https://a.example/race", &format!("h{}", i)))
                    .await
            });
        }
        let mut created = 0;
        while let Some(result) = tasks.join_next().await {
            if result.unwrap().unwrap().is_some() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(repo.count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pre_moderation_and_review_queue() {
        let repo = setup().await;
        let a = repo.create(&input("https://a.example/1", "h1")).await.unwrap();
        let b = repo.create(&input("https://a.example/2", "h2")).await.unwrap();

        assert_eq!(repo.list_awaiting_pre_moderation(10).await.unwrap().len(), 2);

        repo.update_pre_moderation(a.id, &PreModerationUpdate {
            status: PreModerationStatus::Approved,
            reason: Some("fine".into()),
            confidence: Some(0.9),
            moderation_status: None,
        }).await.unwrap();
        repo.update_pre_moderation(b.id, &PreModerationUpdate {
            status: PreModerationStatus::Rejected,
            reason: Some("spam".into()),
            confidence: Some(0.8),
            moderation_status: Some(ModerationStatus::Rejected),
        }).await.unwrap();

        assert!(repo.list_awaiting_pre_moderation(10).await.unwrap().is_empty());
        let review = repo.list_awaiting_review(10).await.unwrap();
        assert_eq!(review.len(), 1);
        assert_eq!(review[0].id, a.id);

        let b = repo.get_by_id(b.id).await.unwrap().unwrap();
        assert_eq!(b.moderation_status, ModerationStatus::Rejected);
        assert_eq!(b.pre_moderation_reason.as_deref(), Some("spam"));
    }

    #[tokio::test]
    async fn test_publish_sets_and_clears_published_at() {
        let repo = setup().await;
        let item = repo.create(&input("https://a.example/1", "h1")).await.unwrap();

        repo.update_status(item.id, ModerationStatus::Published, None).await.unwrap();
        let published = repo.get_by_id(item.id).await.unwrap().unwrap();
        assert!(published.published_at.is_some());
        assert_eq!(repo.list_published(0, 10).await.unwrap().len(), 1);

        repo.update_status(item.id, ModerationStatus::Rejected, Some("outdated")).await.unwrap();
        let rejected = repo.get_by_id(item.id).await.unwrap().unwrap();
        assert!(rejected.published_at.is_none());
        assert_eq!(rejected.rejection_reason.as_deref(), Some("outdated"));
        assert!(repo.list_published(0, 10).await.unwrap().is_empty());

        let counts = repo.count_by_status().await.unwrap();
        assert_eq!(counts[&ModerationStatus::Rejected], 1);
        assert_eq!(counts[&ModerationStatus::Published], 0);
    }

    #[tokio::test]
    async fn test_analysis_update_and_search() {
        let repo = setup().await;
        let item = repo.create(&input("https://a.example/1", "h1")).await.unwrap();

        repo.update_analysis(item.id, &NewsAnalysisUpdate {
            summary: Some("Rust 2024 edition released".into()),
            category: Some("technology".into()),
            tags: vec!["rust".into(), "release".into()],
            social_text: None,
        }).await.unwrap();
        repo.update_status(item.id, ModerationStatus::Published, None).await.unwrap();

        let item = repo.get_by_id(item.id).await.unwrap().unwrap();
        assert_eq!(item.tags, vec!["rust", "release"]);
        assert!(item.analyzed_at.is_some());

        assert_eq!(repo.search_published("2024 edition", 10).await.unwrap().len(), 1);
        assert!(repo.search_published("100%", 10).await.unwrap().is_empty());
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
