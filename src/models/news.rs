//! News model
//!
//! This module provides:
//! - `NewsItem` entity representing an article ingested from an RSS source
//! - `ModerationStatus` / `PreModerationStatus` lifecycle flags
//! - Pagination types for list queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// News item ingested from an RSS source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    /// Unique identifier
    pub id: i64,
    /// Source the item was fetched from (None for manually created items)
    pub source_id: Option<i64>,
    pub title: String,
    /// Plain-text body extracted from the feed
    pub content: String,
    /// AI summary
    pub summary: Option<String>,
    /// Canonical article URL (unique)
    pub url: String,
    pub image_url: Option<String>,
    /// AI-assigned category
    pub category: Option<String>,
    /// AI-assigned tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Ready-to-post social text produced by the analysis step
    pub social_text: Option<String>,
    /// SHA-256 of the normalized title + content, used for deduplication
    pub content_hash: String,
    /// Human moderation status
    pub moderation_status: ModerationStatus,
    /// AI pre-moderation status
    pub pre_moderation_status: PreModerationStatus,
    pub pre_moderation_reason: Option<String>,
    pub pre_moderation_confidence: Option<f64>,
    /// Why a human rejected the item
    pub rejection_reason: Option<String>,
    /// Original publication date from the feed
    pub source_published_at: Option<DateTime<Utc>>,
    pub analyzed_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for inserting a freshly fetched item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNewsInput {
    pub source_id: Option<i64>,
    pub title: String,
    pub content: String,
    pub url: String,
    pub image_url: Option<String>,
    pub content_hash: String,
    pub source_published_at: Option<DateTime<Utc>>,
}

/// Human moderation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    /// Waiting for review
    #[default]
    Pending,
    /// Approved by a human, not yet public
    Approved,
    /// Rejected by a human or by pre-moderation
    Rejected,
    /// Visible on the public site
    Published,
}

impl ModerationStatus {
    pub const ALL: [ModerationStatus; 4] = [
        ModerationStatus::Pending,
        ModerationStatus::Approved,
        ModerationStatus::Rejected,
        ModerationStatus::Published,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Pending => "pending",
            ModerationStatus::Approved => "approved",
            ModerationStatus::Rejected => "rejected",
            ModerationStatus::Published => "published",
        }
    }

    /// Whether a human may move an item from `self` to `next`.
    ///
    /// Rejected items can be approved again; published items can only be
    /// withdrawn by rejecting them.
    pub fn can_transition_to(&self, next: ModerationStatus) -> bool {
        use ModerationStatus::*;
        match (self, next) {
            (Pending, Approved) | (Pending, Rejected) | (Pending, Published) => true,
            (Approved, Rejected) | (Approved, Published) => true,
            (Rejected, Approved) => true,
            (Published, Rejected) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ModerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModerationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "published" => Ok(Self::Published),
            _ => Err(format!("Invalid moderation status: {}", s)),
        }
    }
}

/// AI pre-moderation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PreModerationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for PreModerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for PreModerationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Invalid pre-moderation status: {}", s)),
        }
    }
}

/// Pagination parameters for list queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
        }
    }
}

impl ListParams {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    /// Calculate the offset for database queries
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// Paginated result container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
        }
    }

    /// Calculate the total number of pages
    pub fn total_pages(&self) -> u32 {
        if self.per_page == 0 || self.total <= 0 {
            return 0;
        }
        ((self.total as u64 + self.per_page as u64 - 1) / self.per_page as u64) as u32
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_moderation_status_roundtrip() {
        for status in ModerationStatus::ALL {
            assert_eq!(ModerationStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert_eq!(ModerationStatus::from_str("PUBLISHED").unwrap(), ModerationStatus::Published);
        assert!(ModerationStatus::from_str("draft").is_err());
    }

    #[test]
    fn test_moderation_transitions() {
        use ModerationStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Published));
        assert!(Approved.can_transition_to(Published));
        assert!(Rejected.can_transition_to(Approved));
        assert!(Published.can_transition_to(Rejected));

        assert!(!Rejected.can_transition_to(Published));
        assert!(!Published.can_transition_to(Pending));
        assert!(!Approved.can_transition_to(Approved));
        assert!(!Approved.can_transition_to(Pending));
    }

    #[test]
    fn test_list_params_clamping() {
        let params = ListParams::new(0, 1000);
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 100);
        assert_eq!(params.offset(), 0);

        let params = ListParams::new(3, 20);
        assert_eq!(params.offset(), 40);
        assert_eq!(params.limit(), 20);
    }

    #[test]
    fn test_paged_result_total_pages() {
        let params = ListParams::new(1, 10);
        assert_eq!(PagedResult::<i32>::new(vec![], 0, &params).total_pages(), 0);
        assert_eq!(PagedResult::<i32>::new(vec![], 10, &params).total_pages(), 1);
        assert_eq!(PagedResult::<i32>::new(vec![], 11, &params).total_pages(), 2);
    }
}
