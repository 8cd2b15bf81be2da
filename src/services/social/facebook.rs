//! Facebook Page publisher (Graph API)

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, info};

use super::{check_status, PublishError, PublishedRef, Publisher, SocialContent, VideoUpload};
use crate::config::FacebookConfig;
use crate::models::Platform;

type HmacSha256 = Hmac<Sha256>;

/// Guard against an upstream that never reports completion
const MAX_TRANSFER_CHUNKS: usize = 10_000;

#[derive(Deserialize)]
struct PostResponse {
    id: String,
}

#[derive(Deserialize)]
struct StartResponse {
    video_id: String,
    upload_session_id: String,
    start_offset: String,
    end_offset: String,
}

#[derive(Deserialize)]
struct TransferResponse {
    start_offset: String,
    end_offset: String,
}

/// `appsecret_proof` for a page token
pub fn appsecret_proof(app_secret: &str, access_token: &str) -> Result<String, PublishError> {
    let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes())
        .map_err(|e| PublishError::invalid(Platform::Facebook, format!("bad app secret: {}", e)))?;
    mac.update(access_token.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn parse_offset(value: &str) -> Result<usize, PublishError> {
    value
        .parse()
        .map_err(|_| PublishError::invalid(Platform::Facebook, format!("bad offset '{}'", value)))
}

pub struct FacebookPublisher {
    config: FacebookConfig,
    client: reqwest::Client,
}

impl FacebookPublisher {
    pub fn new(config: FacebookConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn feed_url(&self) -> String {
        format!(
            "{}/{}/{}/feed",
            self.config.api_base.trim_end_matches('/'),
            self.config.graph_version,
            self.config.page_id
        )
    }

    fn videos_url(&self) -> String {
        format!(
            "{}/{}/{}/videos",
            self.config.video_api_base.trim_end_matches('/'),
            self.config.graph_version,
            self.config.page_id
        )
    }

    /// Token and proof fields sent with every call
    fn auth_params(&self) -> Result<Vec<(&'static str, String)>, PublishError> {
        let mut params = vec![("access_token", self.config.page_access_token.clone())];
        if let Some(secret) = self.config.app_secret.as_deref().filter(|s| !s.is_empty()) {
            params.push(("appsecret_proof", appsecret_proof(secret, &self.config.page_access_token)?));
        }
        Ok(params)
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<T, PublishError> {
        params.extend(self.auth_params()?);
        let response = self.client.post(url).form(&params).send().await?;
        Ok(check_status(Platform::Facebook, response).await?.json().await?)
    }
}

#[async_trait]
impl Publisher for FacebookPublisher {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    async fn publish_text(&self, content: &SocialContent) -> Result<PublishedRef, PublishError> {
        let mut params = vec![("message", content.message.clone())];
        if let Some(link) = &content.link {
            params.push(("link", link.clone()));
        }

        let post: PostResponse = self.post_form(&self.feed_url(), params).await?;
        info!(external_id = %post.id, "Published to Facebook");
        Ok(PublishedRef {
            url: Some(format!("https://www.facebook.com/{}", post.id)),
            external_id: post.id,
        })
    }

    async fn publish_video(&self, video: &VideoUpload) -> Result<PublishedRef, PublishError> {
        let url = self.videos_url();

        let start: StartResponse = self
            .post_form(
                &url,
                vec![
                    ("upload_phase", "start".to_string()),
                    ("file_size", video.bytes.len().to_string()),
                ],
            )
            .await?;

        let mut start_offset = parse_offset(&start.start_offset)?;
        let mut end_offset = parse_offset(&start.end_offset)?;
        let mut chunks = 0;

        while start_offset < end_offset {
            chunks += 1;
            if chunks > MAX_TRANSFER_CHUNKS || end_offset > video.bytes.len() {
                return Err(PublishError::invalid(
                    Platform::Facebook,
                    format!("transfer did not converge at {}..{}", start_offset, end_offset),
                ));
            }

            let chunk = reqwest::multipart::Part::bytes(video.bytes.slice(start_offset..end_offset).to_vec())
                .file_name(video.file_name.clone());
            let mut form = reqwest::multipart::Form::new()
                .text("upload_phase", "transfer")
                .text("upload_session_id", start.upload_session_id.clone())
                .text("start_offset", start_offset.to_string())
                .part("video_file_chunk", chunk);
            for (key, value) in self.auth_params()? {
                form = form.text(key, value);
            }

            let response = self.client.post(&url).multipart(form).send().await?;
            let transfer: TransferResponse = check_status(Platform::Facebook, response).await?.json().await?;
            debug!(start_offset, end_offset, "Transferred video chunk");
            start_offset = parse_offset(&transfer.start_offset)?;
            end_offset = parse_offset(&transfer.end_offset)?;
        }

        let _: serde_json::Value = self
            .post_form(
                &url,
                vec![
                    ("upload_phase", "finish".to_string()),
                    ("upload_session_id", start.upload_session_id.clone()),
                    ("title", video.title.clone()),
                    ("description", video.description.clone()),
                ],
            )
            .await?;

        info!(video_id = %start.video_id, chunks, "Published video to Facebook");
        Ok(PublishedRef {
            url: Some(format!(
                "https://www.facebook.com/{}/videos/{}",
                self.config.page_id, start.video_id
            )),
            external_id: start.video_id,
        })
    }
}
