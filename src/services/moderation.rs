//! AI pre-moderation
//!
//! Screens freshly fetched news before a human sees it. Pre-moderation is
//! fail-open: when the model is unreachable or replies with garbage the item
//! is approved and flagged, and the human review step catches the rest.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::ai::{extract_json, ChatMessage, ChatModel, ChatOptions};
use super::prompts::PromptService;
use crate::models::{prompt_types, NewsItem};

/// Longest slice of article body sent to the model
const MAX_CONTENT_CHARS: usize = 4000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationVerdict {
    pub approved: bool,
    pub reason: String,
    /// Model confidence in [0, 1]
    pub confidence: f64,
    /// Set when the verdict is the fail-open default rather than a model decision
    pub fail_open: bool,
}

impl ModerationVerdict {
    fn fail_open(reason: impl Into<String>) -> Self {
        Self {
            approved: true,
            reason: reason.into(),
            confidence: 0.0,
            fail_open: true,
        }
    }
}

#[derive(Deserialize)]
struct RawVerdict {
    approved: Option<bool>,
    decision: Option<String>,
    reason: Option<String>,
    confidence: Option<f64>,
}

pub struct PreModerator {
    model: Arc<dyn ChatModel>,
    prompts: Arc<PromptService>,
}

impl PreModerator {
    pub fn new(model: Arc<dyn ChatModel>, prompts: Arc<PromptService>) -> Self {
        Self { model, prompts }
    }

    /// Never fails; errors become an approving verdict with `fail_open` set.
    pub async fn moderate(&self, item: &NewsItem) -> ModerationVerdict {
        let mut vars = HashMap::new();
        vars.insert("title", item.title.clone());
        vars.insert("url", item.url.clone());
        vars.insert("content", truncate_chars(&item.content, MAX_CONTENT_CHARS));
        let prompt = self.prompts.render(prompt_types::PRE_MODERATION, &vars).await;

        let options = ChatOptions {
            temperature: Some(0.0),
            json: true,
            ..Default::default()
        };
        let reply = match self.model.complete(&[ChatMessage::user(prompt)], options).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(news_id = item.id, error = %e, "Pre-moderation failed, approving");
                return ModerationVerdict::fail_open(format!("AI unavailable: {}", e));
            }
        };

        let verdict = parse_verdict(&reply);
        info!(
            news_id = item.id,
            approved = verdict.approved,
            confidence = verdict.confidence,
            fail_open = verdict.fail_open,
            "Pre-moderation verdict"
        );
        verdict
    }
}

/// Interpret the model reply, falling back to fail-open on anything unusable
pub fn parse_verdict(reply: &str) -> ModerationVerdict {
    let json = extract_json(reply);
    let raw: RawVerdict = match serde_json::from_str(&json) {
        Ok(raw) => raw,
        Err(e) => return ModerationVerdict::fail_open(format!("Unparseable AI reply: {}", e)),
    };

    let approved = match (raw.approved, raw.decision.as_deref().map(str::to_lowercase)) {
        (Some(approved), _) => approved,
        (None, Some(d)) if d == "approve" || d == "approved" => true,
        (None, Some(d)) if d == "reject" || d == "rejected" => false,
        _ => return ModerationVerdict::fail_open("AI reply had no decision"),
    };

    ModerationVerdict {
        approved,
        reason: raw.reason.unwrap_or_default(),
        confidence: raw
            .confidence
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(0.5),
        fail_open: false,
    }
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
