//! Social network publishers
//!
//! One [`Publisher`] per platform. Each client takes its API base URL from
//! configuration so it can be pointed at a local stub.

pub mod facebook;
pub mod linkedin;
pub mod youtube;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::config::SocialConfig;
use crate::models::Platform;

pub use facebook::FacebookPublisher;
pub use linkedin::LinkedInPublisher;
pub use youtube::YouTubePublisher;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("{0} does not support this kind of post")]
    Unsupported(Platform),

    #[error("{0} is not configured")]
    NotConfigured(Platform),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{platform} API error {status}: {body}")]
    Api {
        platform: Platform,
        status: u16,
        body: String,
    },

    #[error("Unexpected {platform} response: {message}")]
    InvalidResponse { platform: Platform, message: String },
}

impl PublishError {
    pub(crate) fn invalid(platform: Platform, message: impl Into<String>) -> Self {
        PublishError::InvalidResponse {
            platform,
            message: message.into(),
        }
    }
}

/// Text post with an optional link preview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialContent {
    pub message: String,
    pub link: Option<String>,
    pub title: Option<String>,
    pub image_url: Option<String>,
}

/// Video file to upload
#[derive(Debug, Clone)]
pub struct VideoUpload {
    pub bytes: Bytes,
    pub file_name: String,
    pub mime_type: String,
    pub title: String,
    pub description: String,
}

/// Where the platform put the post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedRef {
    pub external_id: String,
    pub url: Option<String>,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    fn platform(&self) -> Platform;

    async fn publish_text(&self, content: &SocialContent) -> Result<PublishedRef, PublishError>;

    async fn publish_video(&self, video: &VideoUpload) -> Result<PublishedRef, PublishError>;
}

/// Turn a non-success response into [`PublishError::Api`]
pub(crate) async fn check_status(
    platform: Platform,
    response: reqwest::Response,
) -> Result<reqwest::Response, PublishError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(platform = %platform, status = %status, "Publish request rejected");
    Err(PublishError::Api {
        platform,
        status: status.as_u16(),
        body: body.chars().take(300).collect(),
    })
}

/// Publishers for every platform that has credentials
pub fn configured_publishers(
    config: &SocialConfig,
    client: &reqwest::Client,
) -> Vec<Arc<dyn Publisher>> {
    let mut publishers: Vec<Arc<dyn Publisher>> = Vec::new();
    if config.linkedin.is_configured() {
        publishers.push(Arc::new(LinkedInPublisher::new(config.linkedin.clone(), client.clone())));
    }
    if config.facebook.is_configured() {
        publishers.push(Arc::new(FacebookPublisher::new(config.facebook.clone(), client.clone())));
    }
    if config.youtube.is_configured() {
        publishers.push(Arc::new(YouTubePublisher::new(config.youtube.clone(), client.clone())));
    }
    publishers
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory publisher for service tests

    use super::*;
    use std::sync::Mutex;

    pub struct RecordingPublisher {
        platform: Platform,
        fail: bool,
        pub texts: Mutex<Vec<SocialContent>>,
        pub videos: Mutex<Vec<String>>,
    }

    impl RecordingPublisher {
        pub fn new(platform: Platform) -> Self {
            Self {
                platform,
                fail: false,
                texts: Mutex::new(Vec::new()),
                videos: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(platform: Platform) -> Self {
            Self {
                fail: true,
                ..Self::new(platform)
            }
        }
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        fn platform(&self) -> Platform {
            self.platform
        }

        async fn publish_text(&self, content: &SocialContent) -> Result<PublishedRef, PublishError> {
            if self.fail {
                return Err(PublishError::Api {
                    platform: self.platform,
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            let mut texts = self.texts.lock().unwrap();
            texts.push(content.clone());
            Ok(PublishedRef {
                external_id: format!("{}-{}", self.platform, texts.len()),
                url: Some(format!("https://{}.example/{}", self.platform, texts.len())),
            })
        }

        async fn publish_video(&self, video: &VideoUpload) -> Result<PublishedRef, PublishError> {
            if self.fail {
                return Err(PublishError::Unsupported(self.platform));
            }
            self.videos.lock().unwrap().push(video.title.clone());
            Ok(PublishedRef {
                external_id: format!("{}-video", self.platform),
                url: None,
            })
        }
    }
}
