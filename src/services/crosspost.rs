//! Cross-posting
//!
//! Sends published news, blog posts and relayed videos to the configured
//! social networks and keeps one `social_media_posts` row per attempt.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::settings::SettingsService;
use super::social::{PublishError, PublishedRef, Publisher, SocialContent, VideoUpload};
use crate::db::repositories::{BlogPostRepository, NewSocialPost, NewsRepository, SocialPostRepository};
use crate::models::{
    BlogPost, BlogPostStatus, ContentKind, ListParams, ModerationStatus, NewsItem, PagedResult, Platform,
    SocialMediaPost,
};

#[derive(Debug, Error)]
pub enum CrossPostError {
    #[error("{0} {1} not found")]
    NotFound(ContentKind, i64),

    #[error("{0} {1} is not published")]
    NotPublished(ContentKind, i64),

    #[error("No target platforms")]
    NoPlatforms,

    #[error("Database error: {0}")]
    DatabaseError(#[from] anyhow::Error),
}

/// Outcome for one platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformResult {
    pub platform: Platform,
    pub success: bool,
    /// Row id in `social_media_posts`
    pub post_id: i64,
    pub external_id: Option<String>,
    pub url: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrossPostReport {
    pub results: Vec<PlatformResult>,
}

impl CrossPostReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

/// Post text for a news item: the AI social text, or title, summary and link
pub fn news_message(item: &NewsItem) -> String {
    if let Some(text) = item.social_text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        if text.contains(&item.url) {
            return text.to_string();
        }
        return format!("{}\n\n{}", text, item.url);
    }

    let mut parts = vec![item.title.trim().to_string()];
    if let Some(summary) = item.summary.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        parts.push(summary.to_string());
    }
    parts.push(item.url.clone());
    parts.join("\n\n")
}

pub fn blog_message(post: &BlogPost, link: &str) -> String {
    let mut parts = vec![post.title.trim().to_string()];
    if let Some(excerpt) = post.excerpt.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        parts.push(excerpt.to_string());
    }
    parts.push(link.to_string());
    parts.join("\n\n")
}

pub struct CrossPostService {
    publishers: Vec<Arc<dyn Publisher>>,
    news: Arc<dyn NewsRepository>,
    blog: Arc<dyn BlogPostRepository>,
    posts: Arc<dyn SocialPostRepository>,
    settings: Arc<SettingsService>,
    site_url: String,
}

impl CrossPostService {
    pub fn new(
        publishers: Vec<Arc<dyn Publisher>>,
        news: Arc<dyn NewsRepository>,
        blog: Arc<dyn BlogPostRepository>,
        posts: Arc<dyn SocialPostRepository>,
        settings: Arc<SettingsService>,
        site_url: impl Into<String>,
    ) -> Self {
        Self {
            publishers,
            news,
            blog,
            posts,
            settings,
            site_url: site_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Platforms that have a publisher
    pub fn available_platforms(&self) -> Vec<Platform> {
        self.publishers.iter().map(|p| p.platform()).collect()
    }

    fn publisher(&self, platform: Platform) -> Option<&Arc<dyn Publisher>> {
        self.publishers.iter().find(|p| p.platform() == platform)
    }

    /// Configured default platforms that also have a publisher
    async fn default_platforms(&self) -> Vec<Platform> {
        let defaults = match self.settings.get().await {
            Ok(settings) => settings.crosspost_platforms,
            Err(e) => {
                warn!(error = %e, "Failed to load settings, using defaults");
                Default::default()
            }
        };
        let (targets, skipped): (Vec<Platform>, Vec<Platform>) =
            defaults.into_iter().partition(|p| self.publisher(*p).is_some());
        if !skipped.is_empty() {
            debug!(skipped = ?skipped, "Default platforms without a publisher");
        }
        targets
    }

    pub async fn publish_news(
        &self,
        id: i64,
        platforms: Option<&[Platform]>,
    ) -> Result<CrossPostReport, CrossPostError> {
        let item = self
            .news
            .get_by_id(id)
            .await?
            .ok_or(CrossPostError::NotFound(ContentKind::News, id))?;
        if item.moderation_status != ModerationStatus::Published {
            return Err(CrossPostError::NotPublished(ContentKind::News, id));
        }

        let content = SocialContent {
            message: news_message(&item),
            link: Some(item.url.clone()),
            title: Some(item.title.clone()),
            image_url: item.image_url.clone(),
        };
        let targets = match platforms {
            Some(p) => p.to_vec(),
            None => self.default_platforms().await,
        };
        self.publish_text(ContentKind::News, id, &content, &targets).await
    }

    pub async fn publish_blog(
        &self,
        id: i64,
        platforms: Option<&[Platform]>,
    ) -> Result<CrossPostReport, CrossPostError> {
        let post = self
            .blog
            .get_by_id(id)
            .await?
            .ok_or(CrossPostError::NotFound(ContentKind::Blog, id))?;
        if post.status != BlogPostStatus::Published {
            return Err(CrossPostError::NotPublished(ContentKind::Blog, id));
        }

        let link = format!("{}/blog/{}", self.site_url, post.slug);
        let content = SocialContent {
            message: blog_message(&post, &link),
            link: Some(link),
            title: Some(post.title.clone()),
            image_url: post.cover_image.clone(),
        };
        let targets = match platforms {
            Some(p) => p.to_vec(),
            None => self.default_platforms().await,
        };
        self.publish_text(ContentKind::Blog, id, &content, &targets).await
    }

    /// Upload a video everywhere it can go; `None` means every configured
    /// platform that accepts video.
    pub async fn publish_video(
        &self,
        video: &VideoUpload,
        platforms: Option<&[Platform]>,
    ) -> Result<CrossPostReport, CrossPostError> {
        let targets: Vec<Platform> = match platforms {
            Some(p) => p.to_vec(),
            None => self
                .available_platforms()
                .into_iter()
                .filter(|p| *p != Platform::Telegram)
                .collect(),
        };
        if targets.is_empty() {
            return Err(CrossPostError::NoPlatforms);
        }

        let message = if video.description.is_empty() {
            video.title.clone()
        } else {
            format!("{}\n\n{}", video.title, video.description)
        };

        let mut report = CrossPostReport::default();
        for platform in dedupe(&targets) {
            let row = self
                .posts
                .create(&NewSocialPost {
                    platform,
                    content_kind: ContentKind::Video,
                    content_id: None,
                    message: message.clone(),
                    media_url: None,
                })
                .await?;
            let outcome = match self.publisher(platform) {
                Some(publisher) => publisher.publish_video(video).await,
                None => Err(PublishError::NotConfigured(platform)),
            };
            report.results.push(self.record(row.id, platform, outcome).await?);
        }

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            size = video.bytes.len(),
            "Video cross-posted"
        );
        Ok(report)
    }

    async fn publish_text(
        &self,
        kind: ContentKind,
        id: i64,
        content: &SocialContent,
        targets: &[Platform],
    ) -> Result<CrossPostReport, CrossPostError> {
        if targets.is_empty() {
            return Err(CrossPostError::NoPlatforms);
        }

        let mut report = CrossPostReport::default();
        for platform in dedupe(targets) {
            let row = self
                .posts
                .create(&NewSocialPost {
                    platform,
                    content_kind: kind,
                    content_id: Some(id),
                    message: content.message.clone(),
                    media_url: content.image_url.clone(),
                })
                .await?;
            let outcome = match self.publisher(platform) {
                Some(publisher) => publisher.publish_text(content).await,
                None => Err(PublishError::NotConfigured(platform)),
            };
            report.results.push(self.record(row.id, platform, outcome).await?);
        }

        info!(
            kind = %kind,
            content_id = id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Cross-posted"
        );
        Ok(report)
    }

    async fn record(
        &self,
        post_id: i64,
        platform: Platform,
        outcome: Result<PublishedRef, PublishError>,
    ) -> Result<PlatformResult, CrossPostError> {
        match outcome {
            Ok(published) => {
                self.posts
                    .mark_published(post_id, &published.external_id, published.url.as_deref())
                    .await?;
                Ok(PlatformResult {
                    platform,
                    success: true,
                    post_id,
                    external_id: Some(published.external_id),
                    url: published.url,
                    error: None,
                })
            }
            Err(e) => {
                warn!(platform = %platform, post_id, error = %e, "Cross-post failed");
                let error = e.to_string();
                self.posts.mark_failed(post_id, &error).await?;
                Ok(PlatformResult {
                    platform,
                    success: false,
                    post_id,
                    external_id: None,
                    url: None,
                    error: Some(error),
                })
            }
        }
    }

    pub async fn list_posts(
        &self,
        platform: Option<Platform>,
        params: &ListParams,
    ) -> Result<PagedResult<SocialMediaPost>, CrossPostError> {
        let items = self.posts.list(platform, params.offset(), params.limit()).await?;
        let total = self.posts.count(platform).await?;
        Ok(PagedResult::new(items, total, params))
    }
}

fn dedupe(platforms: &[Platform]) -> Vec<Platform> {
    let mut out = Vec::with_capacity(platforms.len());
    for p in platforms {
        if !out.contains(p) {
            out.push(*p);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxBlogPostRepository, SqlxNewsRepository, SqlxSettingsRepository, SqlxSocialPostRepository,
    };
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::{CreateNewsInput, SocialPostStatus};
    use crate::services::social::testing::RecordingPublisher;
    use chrono::Utc;

    struct Fixture {
        pool: DynDatabasePool,
        service: CrossPostService,
        linkedin: Arc<RecordingPublisher>,
    }

    async fn fixture() -> Fixture {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let linkedin = Arc::new(RecordingPublisher::new(Platform::LinkedIn));
        let facebook = Arc::new(RecordingPublisher::failing(Platform::Facebook));
        let service = CrossPostService::new(
            vec![linkedin.clone() as Arc<dyn Publisher>, facebook as Arc<dyn Publisher>],
            SqlxNewsRepository::boxed(pool.clone()),
            SqlxBlogPostRepository::boxed(pool.clone()),
            SqlxSocialPostRepository::boxed(pool.clone()),
            Arc::new(SettingsService::new(SqlxSettingsRepository::boxed(pool.clone()))),
            "https://me.example/",
        );
        Fixture { pool, service, linkedin }
    }

    async fn published_news(pool: &DynDatabasePool, social_text: Option<&str>) -> NewsItem {
        let repo = SqlxNewsRepository::new(pool.clone());
        let item = repo
            .create(&CreateNewsInput {
                source_id: None,
                title: "Rust 2.0".into(),
                content: "Body".into(),
                url: "https://news.example/rust".into(),
                image_url: None,
                content_hash: "hash".into(),
                source_published_at: None,
            })
            .await
            .unwrap();
        if let Some(text) = social_text {
            repo.update_analysis(
                item.id,
                &crate::db::repositories::NewsAnalysisUpdate {
                    summary: Some("Summary".into()),
                    category: None,
                    tags: vec![],
                    social_text: Some(text.into()),
                },
            )
            .await
            .unwrap();
        }
        repo.update_status(item.id, ModerationStatus::Published, None).await.unwrap();
        repo.get_by_id(item.id).await.unwrap().unwrap()
    }

    fn news_item(social_text: Option<&str>, summary: Option<&str>) -> NewsItem {
        NewsItem {
            id: 1,
            source_id: None,
            title: "Title".into(),
            content: "Body".into(),
            summary: summary.map(str::to_string),
            url: "https://n.example/1".into(),
            image_url: None,
            category: None,
            tags: vec![],
            social_text: social_text.map(str::to_string),
            content_hash: "h".into(),
            moderation_status: ModerationStatus::Published,
            pre_moderation_status: Default::default(),
            pre_moderation_reason: None,
            pre_moderation_confidence: None,
            rejection_reason: None,
            source_published_at: None,
            analyzed_at: None,
            published_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_news_message() {
        assert_eq!(
            news_message(&news_item(Some("Big news!"), Some("ignored"))),
            "Big news!\n\nhttps://n.example/1"
        );
        assert_eq!(
            news_message(&news_item(Some("See https://n.example/1"), None)),
            "See https://n.example/1"
        );
        assert_eq!(
            news_message(&news_item(None, Some("Sum"))),
            "Title\n\nSum\n\nhttps://n.example/1"
        );
        assert_eq!(news_message(&news_item(Some("  "), None)), "Title\n\nhttps://n.example/1");
    }

    #[tokio::test]
    async fn test_publish_news_records_each_platform() {
        let fx = fixture().await;
        let item = published_news(&fx.pool, Some("Post this")).await;

        let report = fx.service.publish_news(item.id, None).await.unwrap();
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);

        let texts = fx.linkedin.texts.lock().unwrap().clone();
        assert_eq!(texts[0].message, "Post this\n\nhttps://news.example/rust");
        assert_eq!(texts[0].link.as_deref(), Some("https://news.example/rust"));

        let rows = fx
            .service
            .list_posts(None, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(rows.total, 2);
        let linkedin = rows.items.iter().find(|p| p.platform == Platform::LinkedIn).unwrap();
        assert_eq!(linkedin.status, SocialPostStatus::Published);
        assert_eq!(linkedin.external_id.as_deref(), Some("linkedin-1"));
        let facebook = rows.items.iter().find(|p| p.platform == Platform::Facebook).unwrap();
        assert_eq!(facebook.status, SocialPostStatus::Failed);
        assert!(facebook.error.as_deref().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_default_platforms_skip_unconfigured() {
        let fx = fixture().await;
        let item = published_news(&fx.pool, Some("Post this")).await;
        // defaults are linkedin and facebook; only linkedin has a publisher here
        let service = CrossPostService::new(
            vec![fx.linkedin.clone() as Arc<dyn Publisher>],
            SqlxNewsRepository::boxed(fx.pool.clone()),
            SqlxBlogPostRepository::boxed(fx.pool.clone()),
            SqlxSocialPostRepository::boxed(fx.pool.clone()),
            Arc::new(SettingsService::new(SqlxSettingsRepository::boxed(fx.pool.clone()))),
            "https://me.example",
        );

        let report = service.publish_news(item.id, None).await.unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].platform, Platform::LinkedIn);
        assert_eq!(report.failed(), 0);

        let rows = service.list_posts(None, &ListParams::default()).await.unwrap();
        assert_eq!(rows.total, 1);
    }

    #[tokio::test]
    async fn test_unconfigured_platform_is_recorded_as_failed() {
        let fx = fixture().await;
        let item = published_news(&fx.pool, None).await;

        let report = fx
            .service
            .publish_news(item.id, Some(&[Platform::YouTube, Platform::LinkedIn, Platform::LinkedIn]))
            .await
            .unwrap();
        assert_eq!(report.results.len(), 2);
        assert!(!report.results[0].success);
        assert!(report.results[0].error.as_deref().unwrap().contains("not configured"));
        assert!(report.results[1].success);
    }

    #[tokio::test]
    async fn test_news_must_be_published() {
        let fx = fixture().await;
        let repo = SqlxNewsRepository::new(fx.pool.clone());
        let item = repo
            .create(&CreateNewsInput {
                source_id: None,
                title: "Draft".into(),
                content: "Body".into(),
                url: "https://news.example/draft".into(),
                image_url: None,
                content_hash: "h2".into(),
                source_published_at: None,
            })
            .await
            .unwrap();

        assert!(matches!(
            fx.service.publish_news(item.id, None).await,
            Err(CrossPostError::NotPublished(ContentKind::News, _))
        ));
        assert!(matches!(
            fx.service.publish_news(404, None).await,
            Err(CrossPostError::NotFound(ContentKind::News, 404))
        ));
        assert!(matches!(
            fx.service.publish_blog(404, None).await,
            Err(CrossPostError::NotFound(ContentKind::Blog, 404))
        ));
    }

    #[tokio::test]
    async fn test_publish_blog_links_to_site() {
        let fx = fixture().await;
        let now = Utc::now();
        let post = SqlxBlogPostRepository::new(fx.pool.clone())
            .create(&BlogPost {
                id: 0,
                slug: "hello-world".into(),
                title: "Hello world".into(),
                content: "Hi".into(),
                content_html: "<p>Hi</p>".into(),
                excerpt: Some("Hi there".into()),
                cover_image: None,
                status: BlogPostStatus::Published,
                published_at: Some(now),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        let report = fx
            .service
            .publish_blog(post.id, Some(&[Platform::LinkedIn]))
            .await
            .unwrap();
        assert_eq!(report.succeeded(), 1);
        let texts = fx.linkedin.texts.lock().unwrap().clone();
        assert_eq!(texts[0].link.as_deref(), Some("https://me.example/blog/hello-world"));
        assert_eq!(texts[0].message, "Hello world\n\nHi there\n\nhttps://me.example/blog/hello-world");
    }

    #[tokio::test]
    async fn test_publish_video_to_video_platforms() {
        let fx = fixture().await;
        let report = fx
            .service
            .publish_video(
                &VideoUpload {
                    bytes: bytes::Bytes::from_static(b"data"),
                    file_name: "v.mp4".into(),
                    mime_type: "video/mp4".into(),
                    title: "Clip".into(),
                    description: String::new(),
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(*fx.linkedin.videos.lock().unwrap(), vec!["Clip".to_string()]);
    }
}
