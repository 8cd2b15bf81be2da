//! Prompt templates
//!
//! Prompts are editable through the admin API and stored in `ai_prompts`.
//! When no active row exists for a type the built-in template is used.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::repositories::AiPromptRepository;
use crate::models::{prompt_types, AiPrompt};

static PLACEHOLDER_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").unwrap());

const DEFAULT_PRE_MODERATION: &str = r#"You moderate a technology news feed for a personal portfolio site.
Decide whether the article below is suitable for publication. Reject spam, advertising,
clickbait, content unrelated to technology, and anything offensive or illegal.

Title: {{title}}
Source: {{url}}

{{content}}

Respond with JSON only:
{"approved": true|false, "reason": "short explanation", "confidence": 0.0-1.0}"#;

const DEFAULT_ARTICLE_ANALYSIS: &str = r#"Analyze the following news article.

Title: {{title}}
URL: {{url}}

{{content}}

Respond with JSON only:
{
  "summary": "2-3 sentence neutral summary",
  "category": "one word category, e.g. ai, security, web, mobile, cloud, hardware, business",
  "tags": ["up to 8 lowercase tags"],
  "social_text": "an engaging post of at most 280 characters for LinkedIn and Facebook"
}"#;

const DEFAULT_SOCIAL_POST: &str = r#"Write a short, engaging social media post (at most 280 characters)
about the article below. Do not use hashtags in the middle of sentences.

Title: {{title}}
Summary: {{summary}}
Link: {{url}}"#;

/// Built-in template for a prompt type
pub fn default_prompt(prompt_type: &str) -> Option<&'static str> {
    match prompt_type {
        prompt_types::PRE_MODERATION => Some(DEFAULT_PRE_MODERATION),
        prompt_types::ARTICLE_ANALYSIS => Some(DEFAULT_ARTICLE_ANALYSIS),
        prompt_types::SOCIAL_POST => Some(DEFAULT_SOCIAL_POST),
        _ => None,
    }
}

/// Substitute `{{name}}` placeholders. Unknown placeholders are left intact.
pub fn render(template: &str, vars: &HashMap<&str, String>) -> String {
    PLACEHOLDER_REGEX
        .replace_all(template, |caps: &regex::Captures| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

pub struct PromptService {
    repo: Arc<dyn AiPromptRepository>,
}

impl PromptService {
    pub fn new(repo: Arc<dyn AiPromptRepository>) -> Self {
        Self { repo }
    }

    /// Active template for `prompt_type`, falling back to the built-in one.
    ///
    /// Storage errors are logged and also fall back, so a broken prompts table
    /// never stops the pipelines.
    pub async fn template(&self, prompt_type: &str) -> String {
        match self.repo.get_active(prompt_type).await {
            Ok(Some(prompt)) if !prompt.content.trim().is_empty() => prompt.content,
            Ok(_) => default_prompt(prompt_type).unwrap_or_default().to_string(),
            Err(e) => {
                tracing::warn!(prompt_type, error = %e, "Failed to load prompt, using default");
                default_prompt(prompt_type).unwrap_or_default().to_string()
            }
        }
    }

    pub async fn render(&self, prompt_type: &str, vars: &HashMap<&str, String>) -> String {
        render(&self.template(prompt_type).await, vars)
    }

    pub async fn list(&self) -> anyhow::Result<Vec<AiPrompt>> {
        self.repo.list().await
    }

    pub async fn upsert(&self, prompt_type: &str, content: &str, is_active: bool) -> anyhow::Result<AiPrompt> {
        self.repo.upsert(prompt_type, content, is_active).await
    }
}
