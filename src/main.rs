//! Newsdesk - content automation backend for a personal portfolio

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newsdesk::{
    api::{self, middleware::RequestStats, AppState},
    cache::create_cache,
    config::Config,
    db::{
        self,
        repositories::{
            SqlxAiPromptRepository, SqlxBlogPostRepository, SqlxNewsRepository,
            SqlxRssSourceRepository, SqlxSettingsRepository, SqlxSocialPostRepository,
        },
    },
    scheduler::{spawn_limiter_cleanup, PipelineScheduler, LIMITER_CLEANUP_INTERVAL},
    services::{
        social::{configured_publishers, Publisher},
        telegram::{TelegramChannelPublisher, TelegramNotifier},
        ArticleAnalyzer, AzureOpenAi, BlogService, ChatModel, ContactService, CrossPostService,
        EmailDigestNotifier, FeedFetcher, Mailer, NewsService, PreModerator, PromptService,
        SearchService, SettingsService, SlidingWindowLimiter, TelegramBot, TelegramClient,
    },
};

const FEED_TIMEOUT: Duration = Duration::from_secs(20);
const SOCIAL_TIMEOUT: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newsdesk=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Newsdesk...");

    let config = Arc::new(Config::load_with_env(Path::new("config.yml"))?);
    tracing::info!("Configuration loaded");
    if config.server.admin_token.as_deref().unwrap_or_default().is_empty() {
        tracing::warn!("No admin token configured: admin endpoints will reject every request");
    }

    let pool = db::create_pool(&config.database).await?;
    tracing::info!(url = %config.database.url, "Database connected");

    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let cache = create_cache(&config.cache);

    // Repositories
    let news_repo = SqlxNewsRepository::boxed(pool.clone());
    let blog_repo = SqlxBlogPostRepository::boxed(pool.clone());

    // AI
    let chat: Arc<dyn ChatModel> = Arc::new(AzureOpenAi::new(config.ai.clone())?);
    let prompt_service = Arc::new(PromptService::new(SqlxAiPromptRepository::boxed(pool.clone())));
    let analyzer = if config.ai.is_configured() {
        Some(Arc::new(ArticleAnalyzer::new(chat.clone(), prompt_service.clone())))
    } else {
        tracing::warn!("AI is not configured: pre-moderation fails open, analysis is disabled");
        None
    };
    let moderator = Arc::new(PreModerator::new(chat, prompt_service.clone()));

    let settings_service = Arc::new(SettingsService::new(SqlxSettingsRepository::boxed(pool.clone())));

    // Email
    let mailer = Mailer::from_config(&config.email)?.map(Arc::new);
    if mailer.is_none() {
        tracing::warn!("Email is not configured: contact form and digests are disabled");
    }

    // Telegram client (bot, review notifier, channel publisher)
    let telegram_client = if config.telegram.is_configured() {
        Some(Arc::new(TelegramClient::new(&config.telegram)?))
    } else {
        tracing::warn!("Telegram bot token not set: bot disabled");
        None
    };

    let mut news_service = NewsService::new(
        news_repo.clone(),
        SqlxRssSourceRepository::boxed(pool.clone()),
        settings_service.clone(),
        FeedFetcher::new(FEED_TIMEOUT)?,
        moderator,
        analyzer,
        cache.clone(),
    );
    if let Some(client) = &telegram_client {
        news_service = news_service.with_telegram_notifier(Arc::new(TelegramNotifier::new(
            client.clone(),
            config.telegram.admin_chat_ids.clone(),
        )));
    }
    if let Some(mailer) = &mailer {
        news_service = news_service.with_email_notifier(Arc::new(EmailDigestNotifier::new(
            mailer.clone(),
            config.server.site_url.clone(),
        )));
    }
    let news_service = Arc::new(news_service);

    // Cross-posting
    let http = reqwest::Client::builder().timeout(SOCIAL_TIMEOUT).build()?;
    let mut publishers: Vec<Arc<dyn Publisher>> = configured_publishers(&config.social, &http);
    if let (Some(client), Some(channel_id)) = (&telegram_client, config.telegram.channel_id) {
        publishers.push(Arc::new(TelegramChannelPublisher::new(client.clone(), channel_id)));
    }
    let platforms: Vec<String> = publishers.iter().map(|p| p.platform().to_string()).collect();
    tracing::info!(platforms = ?platforms, "Cross-posting publishers ready");

    let crosspost_service = Arc::new(CrossPostService::new(
        publishers,
        news_repo.clone(),
        blog_repo.clone(),
        SqlxSocialPostRepository::boxed(pool.clone()),
        settings_service.clone(),
        config.server.site_url.clone(),
    ));

    let contact_service = Arc::new(ContactService::new(mailer));

    let telegram_bot = telegram_client.map(|client| {
        Arc::new(TelegramBot::new(
            client,
            news_service.clone(),
            Some(crosspost_service.clone()),
            Arc::new(SlidingWindowLimiter::per_minute(config.telegram.rate_limit_per_minute)),
            config.telegram.admin_chat_ids.clone(),
            config.scheduler.process_batch_size,
        ))
    });

    // Background jobs
    let mut limiters = vec![contact_service.limiter().clone()];
    if let Some(bot) = &telegram_bot {
        limiters.push(bot.limiter().clone());
    }
    spawn_limiter_cleanup(limiters, LIMITER_CLEANUP_INTERVAL);

    if config.scheduler.enabled {
        PipelineScheduler::new(
            news_service.clone(),
            Duration::from_secs(config.scheduler.fetch_interval_secs.max(1)),
            config.scheduler.process_batch_size,
        )
        .spawn();
    }

    let state = AppState {
        pool: pool.clone(),
        config: config.clone(),
        news_service,
        blog_service: Arc::new(BlogService::new(blog_repo.clone(), cache)),
        search_service: Arc::new(SearchService::new(news_repo, blog_repo)),
        contact_service,
        crosspost_service,
        settings_service,
        prompt_service,
        telegram_bot,
        request_stats: Arc::new(RequestStats::new()),
    };

    let app = api::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
