//! AI prompt model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prompt kinds understood by the pipelines
pub mod prompt_types {
    pub const PRE_MODERATION: &str = "pre_moderation";
    pub const ARTICLE_ANALYSIS: &str = "article_analysis";
    pub const SOCIAL_POST: &str = "social_post";

    pub const ALL: [&str; 3] = [PRE_MODERATION, ARTICLE_ANALYSIS, SOCIAL_POST];
}

/// Editable prompt template stored in `ai_prompts`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiPrompt {
    pub id: i64,
    pub prompt_type: String,
    /// Template with `{{placeholder}}` variables
    pub content: String,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}
