//! Configuration management
//!
//! This module handles loading and parsing configuration for the Newsdesk service.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults. Integrations whose
//! credentials are absent are simply disabled.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Azure OpenAI configuration
    #[serde(default)]
    pub ai: AiConfig,
    /// Telegram bot configuration
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// Social network credentials
    #[serde(default)]
    pub social: SocialConfig,
    /// Outgoing email configuration
    #[serde(default)]
    pub email: EmailConfig,
    /// Background job configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (the portfolio front end)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Public URL of the portfolio, used for links in posts and emails
    #[serde(default = "default_cors_origin")]
    pub site_url: String,
    /// Bearer token for admin and function endpoints
    #[serde(default)]
    pub admin_token: Option<String>,
    /// Bearer token accepted on function endpoints (external cron triggers)
    #[serde(default)]
    pub cron_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            site_url: default_cors_origin(),
            admin_token: None,
            cron_secret: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path or URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/newsdesk.db".to_string()
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
        }
    }
}

fn default_ttl() -> u64 {
    300
}

/// Azure OpenAI (or any OpenAI-compatible) chat completion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    /// Azure deployment name. When empty, `endpoint` is used verbatim as an
    /// OpenAI-compatible chat completions URL.
    #[serde(default)]
    pub deployment: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Model name sent for OpenAI-compatible endpoints
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_ai_timeout")]
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            deployment: String::new(),
            api_version: default_api_version(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_ai_timeout(),
        }
    }
}

impl AiConfig {
    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty() && !self.api_key.is_empty()
    }
}

fn default_api_version() -> String {
    "2024-02-15-preview".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    800
}

fn default_ai_timeout() -> u64 {
    60
}

/// Telegram Bot API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Bot API base URL
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
    /// Value expected in the `X-Telegram-Bot-Api-Secret-Token` header
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// Chats allowed to operate the bot
    #[serde(default)]
    pub admin_chat_ids: Vec<i64>,
    /// Public channel that receives published news
    #[serde(default)]
    pub channel_id: Option<i64>,
    /// Updates accepted per chat per minute
    #[serde(default = "default_telegram_rate_limit")]
    pub rate_limit_per_minute: usize,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: default_telegram_api_base(),
            webhook_secret: None,
            admin_chat_ids: Vec::new(),
            channel_id: None,
            rate_limit_per_minute: default_telegram_rate_limit(),
        }
    }
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        !self.bot_token.is_empty()
    }
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_telegram_rate_limit() -> usize {
    20
}

/// Social network credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SocialConfig {
    #[serde(default)]
    pub linkedin: LinkedInConfig,
    #[serde(default)]
    pub facebook: FacebookConfig,
    #[serde(default)]
    pub youtube: YouTubeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedInConfig {
    #[serde(default)]
    pub access_token: String,
    /// `urn:li:person:...` or `urn:li:organization:...`
    #[serde(default)]
    pub author_urn: String,
    #[serde(default = "default_linkedin_api_base")]
    pub api_base: String,
    /// Value of the `LinkedIn-Version` header (YYYYMM)
    #[serde(default = "default_linkedin_version")]
    pub version: String,
}

impl Default for LinkedInConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            author_urn: String::new(),
            api_base: default_linkedin_api_base(),
            version: default_linkedin_version(),
        }
    }
}

impl LinkedInConfig {
    pub fn is_configured(&self) -> bool {
        !self.access_token.is_empty() && !self.author_urn.is_empty()
    }
}

fn default_linkedin_api_base() -> String {
    "https://api.linkedin.com".to_string()
}

fn default_linkedin_version() -> String {
    "202401".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacebookConfig {
    #[serde(default)]
    pub page_id: String,
    #[serde(default)]
    pub page_access_token: String,
    /// Enables `appsecret_proof` on every Graph API call
    #[serde(default)]
    pub app_secret: Option<String>,
    #[serde(default = "default_graph_api_base")]
    pub api_base: String,
    #[serde(default = "default_graph_video_base")]
    pub video_api_base: String,
    #[serde(default = "default_graph_version")]
    pub graph_version: String,
}

impl Default for FacebookConfig {
    fn default() -> Self {
        Self {
            page_id: String::new(),
            page_access_token: String::new(),
            app_secret: None,
            api_base: default_graph_api_base(),
            video_api_base: default_graph_video_base(),
            graph_version: default_graph_version(),
        }
    }
}

impl FacebookConfig {
    pub fn is_configured(&self) -> bool {
        !self.page_id.is_empty() && !self.page_access_token.is_empty()
    }
}

fn default_graph_api_base() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_graph_video_base() -> String {
    "https://graph-video.facebook.com".to_string()
}

fn default_graph_version() -> String {
    "v19.0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YouTubeConfig {
    /// OAuth access token with the `youtube.upload` scope
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_youtube_upload_base")]
    pub upload_base: String,
    #[serde(default = "default_privacy_status")]
    pub privacy_status: String,
    /// YouTube category id ("28" = Science & Technology)
    #[serde(default = "default_youtube_category")]
    pub category_id: String,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            upload_base: default_youtube_upload_base(),
            privacy_status: default_privacy_status(),
            category_id: default_youtube_category(),
        }
    }
}

impl YouTubeConfig {
    pub fn is_configured(&self) -> bool {
        !self.access_token.is_empty()
    }
}

fn default_youtube_upload_base() -> String {
    "https://www.googleapis.com".to_string()
}

fn default_privacy_status() -> String {
    "public".to_string()
}

fn default_youtube_category() -> String {
    "28".to_string()
}

/// Email provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmailProvider {
    /// Resend HTTP API (default)
    #[default]
    Resend,
    /// Plain SMTP relay
    Smtp,
}

/// Outgoing email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub provider: EmailProvider,
    #[serde(default)]
    pub resend_api_key: String,
    #[serde(default = "default_resend_api_base")]
    pub resend_api_base: String,
    /// Sender, e.g. `Portfolio <noreply@example.com>`
    #[serde(default)]
    pub from: String,
    /// Recipient of contact form messages and digests
    #[serde(default)]
    pub admin_email: String,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: String,
    #[serde(default)]
    pub smtp_password: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            provider: EmailProvider::default(),
            resend_api_key: String::new(),
            resend_api_base: default_resend_api_base(),
            from: String::new(),
            admin_email: String::new(),
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
        }
    }
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        if self.from.is_empty() || self.admin_email.is_empty() {
            return false;
        }
        match self.provider {
            EmailProvider::Resend => !self.resend_api_key.is_empty(),
            EmailProvider::Smtp => !self.smtp_host.is_empty(),
        }
    }
}

fn default_resend_api_base() -> String {
    "https://api.resend.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

/// Background job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,
    /// Interval between RSS runs
    #[serde(default = "default_fetch_interval")]
    pub fetch_interval_secs: u64,
    /// Items pre-moderated per run
    #[serde(default = "default_batch_size")]
    pub process_batch_size: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
            fetch_interval_secs: default_fetch_interval(),
            process_batch_size: default_batch_size(),
        }
    }
}

fn default_scheduler_enabled() -> bool {
    true
}

fn default_fetch_interval() -> u64 {
    1800
}

fn default_batch_size() -> i64 {
    20
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern `NEWSDESK_<SECTION>_<KEY>`:
    /// - NEWSDESK_SERVER_HOST, NEWSDESK_SERVER_PORT, NEWSDESK_SERVER_ADMIN_TOKEN
    /// - NEWSDESK_DATABASE_URL
    /// - NEWSDESK_AI_ENDPOINT, NEWSDESK_AI_API_KEY, NEWSDESK_AI_DEPLOYMENT
    /// - NEWSDESK_TELEGRAM_BOT_TOKEN, NEWSDESK_TELEGRAM_ADMIN_CHAT_IDS (comma separated)
    /// - NEWSDESK_LINKEDIN_ACCESS_TOKEN, NEWSDESK_FACEBOOK_PAGE_ACCESS_TOKEN, ...
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server
        override_string("NEWSDESK_SERVER_HOST", &mut self.server.host);
        override_parsed("NEWSDESK_SERVER_PORT", &mut self.server.port);
        override_string("NEWSDESK_SERVER_CORS_ORIGIN", &mut self.server.cors_origin);
        override_string("NEWSDESK_SERVER_SITE_URL", &mut self.server.site_url);
        override_option("NEWSDESK_SERVER_ADMIN_TOKEN", &mut self.server.admin_token);
        override_option("NEWSDESK_SERVER_CRON_SECRET", &mut self.server.cron_secret);

        // Database and cache
        override_string("NEWSDESK_DATABASE_URL", &mut self.database.url);
        override_parsed("NEWSDESK_CACHE_TTL_SECONDS", &mut self.cache.ttl_seconds);

        // AI
        override_string("NEWSDESK_AI_ENDPOINT", &mut self.ai.endpoint);
        override_string("NEWSDESK_AI_API_KEY", &mut self.ai.api_key);
        override_string("NEWSDESK_AI_DEPLOYMENT", &mut self.ai.deployment);
        override_string("NEWSDESK_AI_API_VERSION", &mut self.ai.api_version);
        override_string("NEWSDESK_AI_MODEL", &mut self.ai.model);

        // Telegram
        override_string("NEWSDESK_TELEGRAM_BOT_TOKEN", &mut self.telegram.bot_token);
        override_option("NEWSDESK_TELEGRAM_WEBHOOK_SECRET", &mut self.telegram.webhook_secret);
        if let Ok(ids) = std::env::var("NEWSDESK_TELEGRAM_ADMIN_CHAT_IDS") {
            let parsed: Result<Vec<i64>, _> = ids
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::parse::<i64>)
                .collect();
            // Ignore the whole value if any id is malformed
            if let Ok(parsed) = parsed {
                self.telegram.admin_chat_ids = parsed;
            }
        }
        if let Ok(channel) = std::env::var("NEWSDESK_TELEGRAM_CHANNEL_ID") {
            if let Ok(channel) = channel.parse::<i64>() {
                self.telegram.channel_id = Some(channel);
            }
        }

        // Social
        override_string("NEWSDESK_LINKEDIN_ACCESS_TOKEN", &mut self.social.linkedin.access_token);
        override_string("NEWSDESK_LINKEDIN_AUTHOR_URN", &mut self.social.linkedin.author_urn);
        override_string("NEWSDESK_FACEBOOK_PAGE_ID", &mut self.social.facebook.page_id);
        override_string(
            "NEWSDESK_FACEBOOK_PAGE_ACCESS_TOKEN",
            &mut self.social.facebook.page_access_token,
        );
        override_option("NEWSDESK_FACEBOOK_APP_SECRET", &mut self.social.facebook.app_secret);
        override_string("NEWSDESK_YOUTUBE_ACCESS_TOKEN", &mut self.social.youtube.access_token);

        // Email
        if let Ok(provider) = std::env::var("NEWSDESK_EMAIL_PROVIDER") {
            match provider.to_lowercase().as_str() {
                "resend" => self.email.provider = EmailProvider::Resend,
                "smtp" => self.email.provider = EmailProvider::Smtp,
                _ => {} // Ignore invalid values
            }
        }
        override_string("NEWSDESK_EMAIL_RESEND_API_KEY", &mut self.email.resend_api_key);
        override_string("NEWSDESK_EMAIL_FROM", &mut self.email.from);
        override_string("NEWSDESK_EMAIL_ADMIN_EMAIL", &mut self.email.admin_email);
        override_string("NEWSDESK_EMAIL_SMTP_HOST", &mut self.email.smtp_host);
        override_parsed("NEWSDESK_EMAIL_SMTP_PORT", &mut self.email.smtp_port);
        override_string("NEWSDESK_EMAIL_SMTP_USERNAME", &mut self.email.smtp_username);
        override_string("NEWSDESK_EMAIL_SMTP_PASSWORD", &mut self.email.smtp_password);

        // Scheduler
        override_parsed("NEWSDESK_SCHEDULER_ENABLED", &mut self.scheduler.enabled);
        override_parsed(
            "NEWSDESK_SCHEDULER_FETCH_INTERVAL_SECS",
            &mut self.scheduler.fetch_interval_secs,
        );
    }
}

fn override_string(key: &str, target: &mut String) {
    if let Ok(value) = std::env::var(key) {
        *target = value;
    }
}

fn override_option(key: &str, target: &mut Option<String>) {
    if let Ok(value) = std::env::var(key) {
        *target = if value.is_empty() { None } else { Some(value) };
    }
}

/// Invalid values leave the current setting untouched.
fn override_parsed<T: std::str::FromStr>(key: &str, target: &mut T) {
    if let Ok(value) = std::env::var(key) {
        if let Ok(parsed) = value.parse::<T>() {
            *target = parsed;
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        super::CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn config_yaml_roundtrip_preserves_server(host in "[a-z]{1,10}(\\.[a-z]{1,10}){0,2}", port in 1u16..=65535) {
            let mut config = Config::default();
            config.server.host = host.clone();
            config.server.port = port;

            let yaml = serde_yaml::to_string(&config).unwrap();
            let parsed: Config = serde_yaml::from_str(&yaml).unwrap();

            prop_assert_eq!(parsed.server.host, host);
            prop_assert_eq!(parsed.server.port, port);
        }

        #[test]
        fn env_port_takes_precedence(port in 1u16..=65535) {
            let _guard = lock_env();
            std::env::set_var("NEWSDESK_SERVER_PORT", port.to_string());
            let config = Config::load_with_env(std::path::Path::new("missing.yml")).unwrap();
            std::env::remove_var("NEWSDESK_SERVER_PORT");
            prop_assert_eq!(config.server.port, port);
        }
    }
}
