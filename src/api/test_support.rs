//! Router-level test harness backed by an in-memory database

use axum_test::TestServer;
use std::sync::Arc;
use std::time::Duration;

use crate::api::{build_router, AppState, RequestStats};
use crate::cache::MemoryCache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxAiPromptRepository, SqlxBlogPostRepository, SqlxNewsRepository, SqlxRssSourceRepository,
    SqlxSettingsRepository, SqlxSocialPostRepository,
};
use crate::db::{create_test_pool, migrations, DynDatabasePool};
use crate::models::{NewsItem, Platform};
use crate::services::ai::{testing::ScriptedModel, ChatModel};
use crate::services::email::testing::{mailer, MemoryTransport};
use crate::services::social::testing::RecordingPublisher;
use crate::services::social::Publisher;
use crate::services::telegram::testing::{spawn, FakeBotApi};
use crate::services::{
    ArticleAnalyzer, BlogService, ContactService, CrossPostService, FeedFetcher, NewsService,
    PreModerator, PromptService, SearchService, SettingsService, SlidingWindowLimiter, TelegramBot,
    TelegramClient,
};

pub const ADMIN_TOKEN: &str = "admin-token";
pub const CRON_SECRET: &str = "cron-secret";
pub const WEBHOOK_SECRET: &str = "hook-secret";

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub pool: DynDatabasePool,
    pub mail: Arc<MemoryTransport>,
    pub linkedin: Arc<RecordingPublisher>,
    pub bot_api: Option<FakeBotApi>,
}

impl TestApp {
    /// App whose model always fails (AI-dependent routes fail open or 502)
    pub async fn new() -> Self {
        Self::build(ScriptedModel::failing("no model"), false).await
    }

    pub async fn with_model(model: ScriptedModel) -> Self {
        Self::build(model, false).await
    }

    /// App with a bot talking to a fake Bot API; admin chat id is 1
    pub async fn with_telegram() -> Self {
        Self::build(ScriptedModel::failing("no model"), true).await
    }

    async fn build(model: ScriptedModel, telegram: bool) -> Self {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();

        let mut config = Config::default();
        config.server.admin_token = Some(ADMIN_TOKEN.to_string());
        config.server.cron_secret = Some(CRON_SECRET.to_string());
        config.server.site_url = "https://me.example".to_string();
        config.server.cors_origin = "https://me.example".to_string();

        let bot_api = if telegram {
            let (api, telegram_config) = spawn().await;
            config.telegram = telegram_config;
            Some(api)
        } else {
            None
        };
        config.telegram.webhook_secret = Some(WEBHOOK_SECRET.to_string());
        let config = Arc::new(config);

        let cache = Arc::new(MemoryCache::new());
        let chat: Arc<dyn ChatModel> = Arc::new(model);
        let prompts = Arc::new(PromptService::new(SqlxAiPromptRepository::boxed(pool.clone())));
        let settings = Arc::new(SettingsService::new(SqlxSettingsRepository::boxed(pool.clone())));
        let news_repo = SqlxNewsRepository::boxed(pool.clone());
        let blog_repo = SqlxBlogPostRepository::boxed(pool.clone());

        let news_service = Arc::new(NewsService::new(
            news_repo.clone(),
            SqlxRssSourceRepository::boxed(pool.clone()),
            settings.clone(),
            FeedFetcher::new(Duration::from_secs(5)).unwrap(),
            Arc::new(PreModerator::new(chat.clone(), prompts.clone())),
            Some(Arc::new(ArticleAnalyzer::new(chat, prompts.clone()))),
            cache.clone(),
        ));

        let linkedin = Arc::new(RecordingPublisher::new(Platform::LinkedIn));
        let publishers: Vec<Arc<dyn Publisher>> = vec![linkedin.clone()];
        let crosspost_service = Arc::new(CrossPostService::new(
            publishers,
            news_repo.clone(),
            blog_repo.clone(),
            SqlxSocialPostRepository::boxed(pool.clone()),
            settings.clone(),
            config.server.site_url.clone(),
        ));

        let (mailer, mail) = mailer();
        let telegram_bot = if telegram {
            let client = Arc::new(TelegramClient::new(&config.telegram).unwrap());
            Some(Arc::new(TelegramBot::new(
                client,
                news_service.clone(),
                Some(crosspost_service.clone()),
                Arc::new(SlidingWindowLimiter::per_minute(config.telegram.rate_limit_per_minute)),
                config.telegram.admin_chat_ids.clone(),
                config.scheduler.process_batch_size,
            )))
        } else {
            None
        };

        let state = AppState {
            pool: pool.clone(),
            config,
            news_service,
            blog_service: Arc::new(BlogService::new(blog_repo.clone(), cache)),
            search_service: Arc::new(SearchService::new(news_repo, blog_repo)),
            contact_service: Arc::new(ContactService::new(Some(mailer))),
            crosspost_service,
            settings_service: settings,
            prompt_service: prompts,
            telegram_bot,
            request_stats: Arc::new(RequestStats::new()),
        };

        let server = TestServer::new(build_router(state.clone())).unwrap();
        Self {
            server,
            state,
            pool,
            mail,
            linkedin,
            bot_api,
        }
    }

    pub async fn insert_news(&self, url: &str) -> NewsItem {
        crate::services::news::test_support::insert_news(&self.pool, url).await
    }
}
