//! YouTube Data API resumable upload

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{check_status, PublishError, PublishedRef, Publisher, SocialContent, VideoUpload};
use crate::config::YouTubeConfig;
use crate::models::Platform;

const MAX_TITLE_CHARS: usize = 100;
const MAX_DESCRIPTION_CHARS: usize = 5000;

#[derive(Deserialize)]
struct VideoResource {
    id: String,
}

/// YouTube rejects titles containing angle brackets
pub fn clean_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| *c != '<' && *c != '>')
        .take(MAX_TITLE_CHARS)
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "Untitled video".to_string()
    } else {
        cleaned.to_string()
    }
}

pub struct YouTubePublisher {
    config: YouTubeConfig,
    client: reqwest::Client,
}

impl YouTubePublisher {
    pub fn new(config: YouTubeConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn session_url(&self) -> String {
        format!(
            "{}/upload/youtube/v3/videos?uploadType=resumable&part=snippet,status",
            self.config.upload_base.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl Publisher for YouTubePublisher {
    fn platform(&self) -> Platform {
        Platform::YouTube
    }

    async fn publish_text(&self, _content: &SocialContent) -> Result<PublishedRef, PublishError> {
        Err(PublishError::Unsupported(Platform::YouTube))
    }

    async fn publish_video(&self, video: &VideoUpload) -> Result<PublishedRef, PublishError> {
        let metadata = json!({
            "snippet": {
                "title": clean_title(&video.title),
                "description": video.description.chars().take(MAX_DESCRIPTION_CHARS).collect::<String>(),
                "categoryId": self.config.category_id,
            },
            "status": {
                "privacyStatus": self.config.privacy_status,
                "selfDeclaredMadeForKids": false
            }
        });

        let response = self
            .client
            .post(self.session_url())
            .bearer_auth(&self.config.access_token)
            .header("X-Upload-Content-Type", &video.mime_type)
            .header("X-Upload-Content-Length", video.bytes.len())
            .json(&metadata)
            .send()
            .await?;
        let response = check_status(Platform::YouTube, response).await?;

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PublishError::invalid(Platform::YouTube, "missing upload Location header"))?;

        let response = self
            .client
            .put(&location)
            .bearer_auth(&self.config.access_token)
            .header(reqwest::header::CONTENT_TYPE, &video.mime_type)
            .body(video.bytes.clone())
            .send()
            .await?;
        let resource: VideoResource = check_status(Platform::YouTube, response).await?.json().await?;

        info!(video_id = %resource.id, size = video.bytes.len(), "Uploaded video to YouTube");
        Ok(PublishedRef {
            url: Some(format!("https://www.youtube.com/watch?v={}", resource.id)),
            external_id: resource.id,
        })
    }
}
