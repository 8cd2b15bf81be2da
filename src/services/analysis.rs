//! AI article analysis
//!
//! Produces the summary, category, tags and ready-to-post social text that
//! the public site and the cross-posting step use.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::ai::{extract_json, AiError, ChatMessage, ChatModel, ChatOptions};
use super::moderation::truncate_chars;
use super::prompts::PromptService;
use crate::models::prompt_types;

pub const MAX_SUMMARY_CHARS: usize = 600;
pub const MAX_TAGS: usize = 8;
const MAX_CONTENT_CHARS: usize = 6000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleAnalysis {
    pub summary: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub social_text: Option<String>,
}

#[derive(Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    social_text: Option<String>,
}

pub struct ArticleAnalyzer {
    model: Arc<dyn ChatModel>,
    prompts: Arc<PromptService>,
}

impl ArticleAnalyzer {
    pub fn new(model: Arc<dyn ChatModel>, prompts: Arc<PromptService>) -> Self {
        Self { model, prompts }
    }

    pub async fn analyze(&self, title: &str, content: &str, url: &str) -> Result<ArticleAnalysis, AiError> {
        let mut vars = HashMap::new();
        vars.insert("title", title.to_string());
        vars.insert("url", url.to_string());
        vars.insert("content", truncate_chars(content, MAX_CONTENT_CHARS));
        let prompt = self.prompts.render(prompt_types::ARTICLE_ANALYSIS, &vars).await;

        let reply = self
            .model
            .complete(
                &[ChatMessage::user(prompt)],
                ChatOptions {
                    json: true,
                    ..Default::default()
                },
            )
            .await?;

        let analysis = parse_analysis(&reply)?;
        tracing::debug!(url, tags = analysis.tags.len(), "Article analyzed");
        Ok(analysis)
    }
}

/// Parse and normalize the model reply
pub fn parse_analysis(reply: &str) -> Result<ArticleAnalysis, AiError> {
    let raw: RawAnalysis = serde_json::from_str(&extract_json(reply))
        .map_err(|e| AiError::InvalidOutput(e.to_string()))?;

    let summary = truncate_chars(raw.summary.trim(), MAX_SUMMARY_CHARS);
    if summary.is_empty() {
        return Err(AiError::InvalidOutput("empty summary".to_string()));
    }

    Ok(ArticleAnalysis {
        summary,
        category: raw
            .category
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty()),
        tags: normalize_tags(raw.tags),
        social_text: raw
            .social_text
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    })
}

/// Lowercase, trim, drop empties and duplicates, keep at most [`MAX_TAGS`]
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().trim_start_matches('#').to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
        if out.len() == MAX_TAGS {
            break;
        }
    }
    out
}
