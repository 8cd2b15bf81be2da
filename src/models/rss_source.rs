//! RSS source model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An external feed polled periodically for new articles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RssSource {
    pub id: i64,
    pub name: String,
    pub url: String,
    /// Default category applied before AI analysis
    pub category: Option<String>,
    pub is_active: bool,
    pub last_fetched_at: Option<DateTime<Utc>>,
    /// Error message from the last failed fetch, cleared on success
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for registering a new source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRssSourceInput {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub category: Option<String>,
}
