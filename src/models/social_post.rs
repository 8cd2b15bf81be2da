//! Social media post model
//!
//! One row per (content, platform) cross-posting attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Target social platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    LinkedIn,
    Facebook,
    YouTube,
    Telegram,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::LinkedIn => "linkedin",
            Platform::Facebook => "facebook",
            Platform::YouTube => "youtube",
            Platform::Telegram => "telegram",
        }
    }

    /// Parse a comma separated list, skipping unknown names
    pub fn parse_list(s: &str) -> Vec<Platform> {
        let mut platforms = Vec::new();
        for name in s.split(',') {
            if let Ok(p) = name.trim().parse::<Platform>() {
                if !platforms.contains(&p) {
                    platforms.push(p);
                }
            }
        }
        platforms
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linkedin" => Ok(Self::LinkedIn),
            "facebook" => Ok(Self::Facebook),
            "youtube" => Ok(Self::YouTube),
            "telegram" => Ok(Self::Telegram),
            _ => Err(format!("Unknown platform: {}", s)),
        }
    }
}

/// What kind of content was posted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    News,
    Blog,
    Video,
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::News => write!(f, "news"),
            Self::Blog => write!(f, "blog"),
            Self::Video => write!(f, "video"),
        }
    }
}

impl std::str::FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "news" => Ok(Self::News),
            "blog" => Ok(Self::Blog),
            "video" => Ok(Self::Video),
            _ => Err(format!("Unknown content kind: {}", s)),
        }
    }
}

/// Outcome of a cross-posting attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SocialPostStatus {
    #[default]
    Pending,
    Published,
    Failed,
}

impl std::fmt::Display for SocialPostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Published => write!(f, "published"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for SocialPostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "published" => Ok(Self::Published),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid social post status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialMediaPost {
    pub id: i64,
    pub platform: Platform,
    pub content_kind: ContentKind,
    /// Id of the news item or blog post (None for relayed videos)
    pub content_id: Option<i64>,
    pub message: String,
    pub media_url: Option<String>,
    /// Id assigned by the platform
    pub external_id: Option<String>,
    pub external_url: Option<String>,
    pub status: SocialPostStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_platform_list() {
        assert_eq!(
            Platform::parse_list("linkedin, Facebook,unknown,linkedin"),
            vec![Platform::LinkedIn, Platform::Facebook]
        );
        assert!(Platform::parse_list("").is_empty());
    }

    #[test]
    fn test_platform_serde_lowercase() {
        let json = serde_json::to_string(&Platform::YouTube).unwrap();
        assert_eq!(json, "\"youtube\"");
        let parsed: Platform = serde_json::from_str("\"linkedin\"").unwrap();
        assert_eq!(parsed, Platform::LinkedIn);
    }
}
