//! News service
//!
//! Owns the news lifecycle:
//! - ingestion from RSS sources (`fetch_news`)
//! - AI pre-moderation and analysis (`process_pending`)
//! - human moderation (`approve`, `reject`, `publish`)
//! - cached public listing

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::ai::AiError;
use super::analysis::{ArticleAnalysis, ArticleAnalyzer};
use super::feed::{content_hash, FeedFetcher, FeedItem};
use super::moderation::{ModerationVerdict, PreModerator};
use super::settings::SettingsService;
use crate::cache::{CacheLayer, SharedCache};
use crate::db::repositories::{
    NewsAnalysisUpdate, NewsRepository, PreModerationUpdate, RssSourceRepository,
};
use crate::models::{
    CreateNewsInput, CreateRssSourceInput, ListParams, ModerationStatus, NewsItem, PagedResult,
    PreModerationStatus, RssSource,
};

const CACHE_KEY_PUBLISHED: &str = "news:published";
const CACHE_KEY_ITEM: &str = "news:item";
const CACHE_PATTERN: &str = "news:*";

/// Newest items taken from a single feed per fetch
const MAX_ITEMS_PER_SOURCE: usize = 50;

#[derive(Debug, Error)]
pub enum NewsServiceError {
    #[error("News item not found: {0}")]
    NotFound(i64),

    #[error("RSS source not found: {0}")]
    SourceNotFound(i64),

    #[error("Cannot change status from {from} to {to}")]
    InvalidTransition {
        from: ModerationStatus,
        to: ModerationStatus,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("RSS source already exists: {0}")]
    DuplicateSource(String),

    #[error("AI is not configured")]
    AiUnavailable,

    #[error("A feed fetch is already running")]
    PipelineBusy,

    #[error("AI error: {0}")]
    Ai(#[from] AiError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] anyhow::Error),
}

/// Receives items that passed pre-moderation and wait for a human
#[async_trait]
pub trait ReviewNotifier: Send + Sync {
    async fn notify(&self, items: &[NewsItem]) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source_id: i64,
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchReport {
    /// Active sources polled
    pub sources: usize,
    /// Items found in the feeds
    pub fetched: usize,
    pub inserted: usize,
    pub duplicates: usize,
    /// Items that could not be stored
    pub failed_items: usize,
    pub failed_sources: Vec<SourceFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessReport {
    pub processed: usize,
    pub approved: usize,
    pub rejected: usize,
    pub analyzed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineReport {
    pub fetch: FetchReport,
    pub process: ProcessReport,
}

pub struct NewsService {
    repo: Arc<dyn NewsRepository>,
    sources: Arc<dyn RssSourceRepository>,
    settings: Arc<SettingsService>,
    fetcher: FeedFetcher,
    moderator: Arc<PreModerator>,
    /// `None` when no AI endpoint is configured
    analyzer: Option<Arc<ArticleAnalyzer>>,
    cache: SharedCache,
    telegram: Option<Arc<dyn ReviewNotifier>>,
    email: Option<Arc<dyn ReviewNotifier>>,
    /// Held for the duration of a fetch; shared by every trigger
    fetch_lock: Arc<Mutex<()>>,
}

impl NewsService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<dyn NewsRepository>,
        sources: Arc<dyn RssSourceRepository>,
        settings: Arc<SettingsService>,
        fetcher: FeedFetcher,
        moderator: Arc<PreModerator>,
        analyzer: Option<Arc<ArticleAnalyzer>>,
        cache: SharedCache,
    ) -> Self {
        Self {
            repo,
            sources,
            settings,
            fetcher,
            moderator,
            analyzer,
            cache,
            telegram: None,
            email: None,
            fetch_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_telegram_notifier(mut self, notifier: Arc<dyn ReviewNotifier>) -> Self {
        self.telegram = Some(notifier);
        self
    }

    pub fn with_email_notifier(mut self, notifier: Arc<dyn ReviewNotifier>) -> Self {
        self.email = Some(notifier);
        self
    }

    // ---------------------------------------------------------------------
    // Public reads
    // ---------------------------------------------------------------------

    /// Published items, newest first
    pub async fn list_published(&self, params: &ListParams) -> Result<PagedResult<NewsItem>, NewsServiceError> {
        let cache_key = format!("{}:{}:{}", CACHE_KEY_PUBLISHED, params.page, params.per_page);
        if let Ok(Some(cached)) = self.cache.get::<PagedResult<NewsItem>>(&cache_key).await {
            return Ok(cached);
        }

        let items = self.repo.list_published(params.offset(), params.limit()).await?;
        let total = self.repo.count(Some(ModerationStatus::Published)).await?;
        let result = PagedResult::new(items, total, params);

        let _ = self.cache.set(&cache_key, &result, self.cache.default_ttl()).await;
        Ok(result)
    }

    /// A single published item; anything else is reported as not found
    pub async fn get_published(&self, id: i64) -> Result<NewsItem, NewsServiceError> {
        let cache_key = format!("{}:{}", CACHE_KEY_ITEM, id);
        if let Ok(Some(cached)) = self.cache.get::<NewsItem>(&cache_key).await {
            return Ok(cached);
        }

        let item = self
            .repo
            .get_by_id(id)
            .await?
            .filter(|n| n.moderation_status == ModerationStatus::Published)
            .ok_or(NewsServiceError::NotFound(id))?;

        let _ = self.cache.set(&cache_key, &item, self.cache.default_ttl()).await;
        Ok(item)
    }

    // ---------------------------------------------------------------------
    // Admin reads
    // ---------------------------------------------------------------------

    pub async fn get(&self, id: i64) -> Result<NewsItem, NewsServiceError> {
        self.repo.get_by_id(id).await?.ok_or(NewsServiceError::NotFound(id))
    }

    pub async fn list(
        &self,
        status: Option<ModerationStatus>,
        params: &ListParams,
    ) -> Result<PagedResult<NewsItem>, NewsServiceError> {
        let items = self.repo.list(status, params.offset(), params.limit()).await?;
        let total = self.repo.count(status).await?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Pre-approved items waiting for a human decision
    pub async fn awaiting_review(&self, limit: i64) -> Result<Vec<NewsItem>, NewsServiceError> {
        Ok(self.repo.list_awaiting_review(limit).await?)
    }

    pub async fn stats(&self) -> Result<HashMap<ModerationStatus, i64>, NewsServiceError> {
        Ok(self.repo.count_by_status().await?)
    }

    // ---------------------------------------------------------------------
    // Sources
    // ---------------------------------------------------------------------

    pub async fn list_sources(&self) -> Result<Vec<RssSource>, NewsServiceError> {
        Ok(self.sources.list().await?)
    }

    pub async fn create_source(&self, input: CreateRssSourceInput) -> Result<RssSource, NewsServiceError> {
        let name = input.name.trim();
        let url = input.url.trim();
        if name.is_empty() {
            return Err(NewsServiceError::ValidationError("Source name cannot be empty".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(NewsServiceError::ValidationError(
                "Source URL must start with http:// or https://".into(),
            ));
        }
        if self.sources.exists_by_url(url).await? {
            return Err(NewsServiceError::DuplicateSource(url.to_string()));
        }

        let source = self
            .sources
            .create(&CreateRssSourceInput {
                name: name.to_string(),
                url: url.to_string(),
                category: input.category.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            })
            .await?;
        info!(source_id = source.id, url = %source.url, "RSS source added");
        Ok(source)
    }

    pub async fn set_source_active(&self, id: i64, active: bool) -> Result<RssSource, NewsServiceError> {
        self.sources.get_by_id(id).await?.ok_or(NewsServiceError::SourceNotFound(id))?;
        self.sources.set_active(id, active).await?;
        self.sources
            .get_by_id(id)
            .await?
            .ok_or(NewsServiceError::SourceNotFound(id))
    }

    pub async fn delete_source(&self, id: i64) -> Result<(), NewsServiceError> {
        self.sources.get_by_id(id).await?.ok_or(NewsServiceError::SourceNotFound(id))?;
        self.sources.delete(id).await?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Ingestion
    // ---------------------------------------------------------------------

    /// Poll every active source and store unseen items as pending.
    ///
    /// A failing source is recorded on the source row and in the report; the
    /// remaining sources are still processed.
    ///
    /// Returns `PipelineBusy` when another fetch is in progress.
    pub async fn fetch_news(&self) -> Result<FetchReport, NewsServiceError> {
        let Ok(_guard) = self.fetch_lock.try_lock() else {
            return Err(NewsServiceError::PipelineBusy);
        };
        self.fetch_sources().await
    }

    async fn fetch_sources(&self) -> Result<FetchReport, NewsServiceError> {
        let sources = self.sources.list_active().await?;
        let mut report = FetchReport {
            sources: sources.len(),
            ..Default::default()
        };

        for source in sources {
            match self.fetcher.fetch(&source.url).await {
                Ok(items) => {
                    if let Err(e) = self.sources.record_fetch(source.id, None).await {
                        warn!(source_id = source.id, error = %e, "Failed to record fetch");
                    }
                    report.fetched += items.len();
                    for item in items.into_iter().take(MAX_ITEMS_PER_SOURCE) {
                        let url = item.link.clone();
                        match self.store_item(&source, item).await {
                            Ok(true) => report.inserted += 1,
                            Ok(false) => report.duplicates += 1,
                            Err(e) => {
                                warn!(source_id = source.id, url = %url, error = %e, "Failed to store news item");
                                report.failed_items += 1;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(source_id = source.id, url = %source.url, error = %e, "Feed fetch failed");
                    if let Err(e) = self.sources.record_fetch(source.id, Some(&e.to_string())).await {
                        warn!(source_id = source.id, error = %e, "Failed to record fetch");
                    }
                    report.failed_sources.push(SourceFailure {
                        source_id: source.id,
                        name: source.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            sources = report.sources,
            fetched = report.fetched,
            inserted = report.inserted,
            duplicates = report.duplicates,
            failed_items = report.failed_items,
            failed = report.failed_sources.len(),
            "Fetch finished"
        );
        Ok(report)
    }

    /// Insert a feed item unless its URL or content hash is already known.
    ///
    /// The URL check is repeated by the insert itself, so a concurrent
    /// writer storing the same URL yields a duplicate, not an error.
    async fn store_item(&self, source: &RssSource, item: FeedItem) -> Result<bool, NewsServiceError> {
        let content = if item.content.is_empty() {
            item.title.clone()
        } else {
            item.content
        };
        let hash = content_hash(&item.title, &content);

        if self.repo.exists_by_url(&item.link).await? || self.repo.exists_by_hash(&hash).await? {
            debug!(url = %item.link, "Skipping duplicate");
            return Ok(false);
        }

        let url = item.link;
        let created = self
            .repo
            .create_if_new(&CreateNewsInput {
                source_id: Some(source.id),
                title: item.title,
                content,
                url: url.clone(),
                image_url: item.image_url,
                content_hash: hash,
                source_published_at: item.published_at,
            })
            .await?;
        match created {
            Some(created) => {
                debug!(news_id = created.id, source_id = source.id, "Stored news item");
                Ok(true)
            }
            None => {
                debug!(url = %url, "Stored concurrently, counting as duplicate");
                Ok(false)
            }
        }
    }

    // ---------------------------------------------------------------------
    // AI processing
    // ---------------------------------------------------------------------

    /// Pre-moderate a single item and persist the verdict.
    ///
    /// Pre-rejected items are rejected outright; pre-approved items stay
    /// pending and are announced to reviewers.
    pub async fn pre_moderate(&self, id: i64) -> Result<ModerationVerdict, NewsServiceError> {
        let item = self.get(id).await?;
        let verdict = self.apply_pre_moderation(&item).await?;
        if verdict.approved && item.moderation_status == ModerationStatus::Pending {
            let item = self.get(id).await?;
            self.notify_reviewers(std::slice::from_ref(&item)).await;
        }
        Ok(verdict)
    }

    /// Pre-moderate up to `limit` waiting items without running analysis
    pub async fn pre_moderate_pending(&self, limit: i64) -> Result<ProcessReport, NewsServiceError> {
        self.run_batch(limit, false).await
    }

    async fn apply_pre_moderation(&self, item: &NewsItem) -> Result<ModerationVerdict, NewsServiceError> {
        let verdict = self.moderator.moderate(item).await;
        let status = if verdict.approved {
            PreModerationStatus::Approved
        } else {
            PreModerationStatus::Rejected
        };
        let moderation_status = (!verdict.approved && item.moderation_status == ModerationStatus::Pending)
            .then_some(ModerationStatus::Rejected);

        self.repo
            .update_pre_moderation(
                item.id,
                &PreModerationUpdate {
                    status,
                    reason: Some(verdict.reason.clone()).filter(|r| !r.is_empty()),
                    confidence: Some(verdict.confidence),
                    moderation_status,
                },
            )
            .await?;
        Ok(verdict)
    }

    /// Run analysis on a stored item and persist the result
    pub async fn analyze(&self, id: i64) -> Result<ArticleAnalysis, NewsServiceError> {
        let analyzer = self.analyzer.as_ref().ok_or(NewsServiceError::AiUnavailable)?;
        let item = self.get(id).await?;
        let analysis = analyzer.analyze(&item.title, &item.content, &item.url).await?;
        self.store_analysis(id, &analysis).await?;
        Ok(analysis)
    }

    /// Analyze an article that is not stored
    pub async fn analyze_adhoc(
        &self,
        title: &str,
        content: &str,
        url: &str,
    ) -> Result<ArticleAnalysis, NewsServiceError> {
        if title.trim().is_empty() || content.trim().is_empty() {
            return Err(NewsServiceError::ValidationError(
                "Title and content are required".into(),
            ));
        }
        let analyzer = self.analyzer.as_ref().ok_or(NewsServiceError::AiUnavailable)?;
        Ok(analyzer.analyze(title, content, url).await?)
    }

    async fn store_analysis(&self, id: i64, analysis: &ArticleAnalysis) -> Result<(), NewsServiceError> {
        self.repo
            .update_analysis(
                id,
                &NewsAnalysisUpdate {
                    summary: Some(analysis.summary.clone()),
                    category: analysis.category.clone(),
                    tags: analysis.tags.clone(),
                    social_text: analysis.social_text.clone(),
                },
            )
            .await?;
        self.invalidate_cache().await;
        Ok(())
    }

    /// Pre-moderate and analyze up to `limit` waiting items
    pub async fn process_pending(&self, limit: i64) -> Result<ProcessReport, NewsServiceError> {
        self.run_batch(limit, true).await
    }

    async fn run_batch(&self, limit: i64, with_analysis: bool) -> Result<ProcessReport, NewsServiceError> {
        let settings = self.settings.get().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load settings, using defaults");
            Default::default()
        });
        let mut report = ProcessReport::default();

        if !settings.auto_pre_moderation {
            debug!("Automatic pre-moderation disabled");
            return Ok(report);
        }

        let analyzer = if with_analysis && settings.auto_analyze {
            self.analyzer.clone()
        } else {
            None
        };

        let items = self.repo.list_awaiting_pre_moderation(limit).await?;
        let mut approved_items = Vec::new();

        for item in items {
            report.processed += 1;
            let verdict = match self.apply_pre_moderation(&item).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(news_id = item.id, error = %e, "Failed to store pre-moderation");
                    report.failed += 1;
                    continue;
                }
            };

            if !verdict.approved {
                report.rejected += 1;
                continue;
            }
            report.approved += 1;

            if let Some(analyzer) = &analyzer {
                match analyzer.analyze(&item.title, &item.content, &item.url).await {
                    Ok(analysis) => match self.store_analysis(item.id, &analysis).await {
                        Ok(()) => report.analyzed += 1,
                        Err(e) => {
                            warn!(news_id = item.id, error = %e, "Failed to store analysis");
                            report.failed += 1;
                        }
                    },
                    Err(e) => {
                        warn!(news_id = item.id, error = %e, "Analysis failed");
                        report.failed += 1;
                    }
                }
            }

            match self.repo.get_by_id(item.id).await {
                Ok(Some(fresh)) => approved_items.push(fresh),
                Ok(None) => {}
                Err(e) => warn!(news_id = item.id, error = %e, "Failed to reload item"),
            }
        }

        if !approved_items.is_empty() {
            self.notify_with(&approved_items, settings.notify_telegram, settings.notify_email)
                .await;
        }

        info!(
            processed = report.processed,
            approved = report.approved,
            rejected = report.rejected,
            analyzed = report.analyzed,
            failed = report.failed,
            "Processing finished"
        );
        Ok(report)
    }

    /// Fetch all sources, then process what came in
    pub async fn process_rss_news(&self, limit: i64) -> Result<PipelineReport, NewsServiceError> {
        let Ok(_guard) = self.fetch_lock.try_lock() else {
            return Err(NewsServiceError::PipelineBusy);
        };
        let fetch = self.fetch_sources().await?;
        let process = self.process_pending(limit).await?;
        Ok(PipelineReport { fetch, process })
    }

    async fn notify_reviewers(&self, items: &[NewsItem]) {
        let settings = self.settings.get().await.unwrap_or_default();
        self.notify_with(items, settings.notify_telegram, settings.notify_email).await;
    }

    async fn notify_with(&self, items: &[NewsItem], telegram: bool, email: bool) {
        let channels = [(telegram, &self.telegram, "telegram"), (email, &self.email, "email")];
        for (enabled, notifier, name) in channels {
            let Some(notifier) = notifier.as_ref().filter(|_| enabled) else {
                continue;
            };
            if let Err(e) = notifier.notify(items).await {
                warn!(channel = name, error = %e, "Review notification failed");
            }
        }
    }

    // ---------------------------------------------------------------------
    // Human moderation
    // ---------------------------------------------------------------------

    pub async fn approve(&self, id: i64) -> Result<NewsItem, NewsServiceError> {
        self.transition(id, ModerationStatus::Approved, None).await
    }

    pub async fn reject(&self, id: i64, reason: Option<&str>) -> Result<NewsItem, NewsServiceError> {
        self.transition(id, ModerationStatus::Rejected, reason).await
    }

    pub async fn publish(&self, id: i64) -> Result<NewsItem, NewsServiceError> {
        self.transition(id, ModerationStatus::Published, None).await
    }

    async fn transition(
        &self,
        id: i64,
        to: ModerationStatus,
        reason: Option<&str>,
    ) -> Result<NewsItem, NewsServiceError> {
        let item = self.get(id).await?;
        let from = item.moderation_status;
        if !from.can_transition_to(to) {
            return Err(NewsServiceError::InvalidTransition { from, to });
        }

        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        self.repo.update_status(id, to, reason).await?;
        self.invalidate_cache().await;
        info!(news_id = id, from = %from, to = %to, "News status changed");
        self.get(id).await
    }

    async fn invalidate_cache(&self) {
        let _ = self.cache.delete_pattern(CACHE_PATTERN).await;
    }
}

#[cfg(test)]
impl NewsService {
    pub(crate) fn fetch_lock(&self) -> &Mutex<()> {
        &self.fetch_lock
    }
}
