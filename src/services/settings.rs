//! Settings service
//!
//! Typed view over the `api_settings` key-value rows that switch pipeline
//! stages on and off at runtime.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::db::repositories::SettingsRepository;
use crate::models::Platform;

/// Known setting keys
pub mod keys {
    pub const AUTO_PRE_MODERATION: &str = "auto_pre_moderation";
    pub const AUTO_ANALYZE: &str = "auto_analyze";
    pub const NOTIFY_TELEGRAM: &str = "notify_telegram";
    pub const NOTIFY_EMAIL: &str = "notify_email";
    pub const CROSSPOST_PLATFORMS: &str = "crosspost_platforms";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Run AI pre-moderation on freshly fetched items
    pub auto_pre_moderation: bool,
    /// Run AI analysis on items that pass pre-moderation
    pub auto_analyze: bool,
    /// Send review cards to Telegram admins
    pub notify_telegram: bool,
    /// Email the admin a digest of pre-approved items
    pub notify_email: bool,
    /// Default targets for cross-posting
    pub crosspost_platforms: Vec<Platform>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            auto_pre_moderation: true,
            auto_analyze: true,
            notify_telegram: true,
            notify_email: false,
            crosspost_platforms: vec![Platform::LinkedIn, Platform::Facebook],
        }
    }
}

/// Partial update; `None` keeps the stored value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePipelineSettings {
    pub auto_pre_moderation: Option<bool>,
    pub auto_analyze: Option<bool>,
    pub notify_telegram: Option<bool>,
    pub notify_email: Option<bool>,
    pub crosspost_platforms: Option<Vec<Platform>>,
}

#[derive(Debug, Error)]
pub enum SettingsServiceError {
    #[error("Failed to load settings: {0}")]
    LoadError(String),

    #[error("Failed to save settings: {0}")]
    SaveError(String),
}

pub struct SettingsService {
    repo: Arc<dyn SettingsRepository>,
}

impl SettingsService {
    pub fn new(repo: Arc<dyn SettingsRepository>) -> Self {
        Self { repo }
    }

    pub async fn get(&self) -> Result<PipelineSettings, SettingsServiceError> {
        let rows = self
            .repo
            .get_all()
            .await
            .map_err(|e| SettingsServiceError::LoadError(e.to_string()))?;
        let values: HashMap<String, String> = rows.into_iter().map(|s| (s.key, s.value)).collect();
        Ok(Self::from_map(&values))
    }

    pub async fn update(
        &self,
        update: &UpdatePipelineSettings,
    ) -> Result<PipelineSettings, SettingsServiceError> {
        let mut map = HashMap::new();
        let flags = [
            (keys::AUTO_PRE_MODERATION, update.auto_pre_moderation),
            (keys::AUTO_ANALYZE, update.auto_analyze),
            (keys::NOTIFY_TELEGRAM, update.notify_telegram),
            (keys::NOTIFY_EMAIL, update.notify_email),
        ];
        for (key, value) in flags {
            if let Some(value) = value {
                map.insert(key.to_string(), value.to_string());
            }
        }
        if let Some(platforms) = &update.crosspost_platforms {
            let list: Vec<&str> = platforms.iter().map(|p| p.as_str()).collect();
            map.insert(keys::CROSSPOST_PLATFORMS.to_string(), list.join(","));
        }

        if !map.is_empty() {
            self.repo
                .set_many(&map)
                .await
                .map_err(|e| SettingsServiceError::SaveError(e.to_string()))?;
        }
        self.get().await
    }

    fn from_map(values: &HashMap<String, String>) -> PipelineSettings {
        let defaults = PipelineSettings::default();
        let flag = |key: &str, default: bool| values.get(key).map(|v| parse_bool(v)).unwrap_or(default);

        PipelineSettings {
            auto_pre_moderation: flag(keys::AUTO_PRE_MODERATION, defaults.auto_pre_moderation),
            auto_analyze: flag(keys::AUTO_ANALYZE, defaults.auto_analyze),
            notify_telegram: flag(keys::NOTIFY_TELEGRAM, defaults.notify_telegram),
            notify_email: flag(keys::NOTIFY_EMAIL, defaults.notify_email),
            crosspost_platforms: values
                .get(keys::CROSSPOST_PLATFORMS)
                .map(|v| Platform::parse_list(v))
                .unwrap_or(defaults.crosspost_platforms),
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxSettingsRepository;
    use crate::db::{create_test_pool, migrations};

    async fn service() -> SettingsService {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        SettingsService::new(SqlxSettingsRepository::boxed(pool))
    }

    #[tokio::test]
    async fn test_seeded_values_match_defaults() {
        let service = service().await;
        assert_eq!(service.get().await.unwrap(), PipelineSettings::default());
    }

    #[tokio::test]
    async fn test_partial_update() {
        let service = service().await;
        let updated = service
            .update(&UpdatePipelineSettings {
                notify_email: Some(true),
                crosspost_platforms: Some(vec![Platform::YouTube]),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(updated.notify_email);
        assert!(updated.auto_analyze);
        assert_eq!(updated.crosspost_platforms, vec![Platform::YouTube]);
    }

    #[test]
    fn test_from_map_tolerates_garbage() {
        let mut values = HashMap::new();
        values.insert(keys::AUTO_ANALYZE.to_string(), "nope".to_string());
        values.insert(keys::NOTIFY_EMAIL.to_string(), "1".to_string());
        values.insert(keys::CROSSPOST_PLATFORMS.to_string(), "myspace".to_string());

        let settings = SettingsService::from_map(&values);
        assert!(!settings.auto_analyze);
        assert!(settings.notify_email);
        assert!(settings.crosspost_platforms.is_empty());
        assert!(settings.auto_pre_moderation);
    }
}
