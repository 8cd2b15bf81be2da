//! LinkedIn Posts API publisher

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::ops::Range;
use tracing::{debug, info};

use super::{check_status, PublishError, PublishedRef, Publisher, SocialContent, VideoUpload};
use crate::config::LinkedInConfig;
use crate::models::Platform;

const RESTLI_PROTOCOL_VERSION: &str = "2.0.0";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeUploadResponse {
    value: InitializeUploadValue,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeUploadValue {
    video: String,
    #[serde(default)]
    upload_token: String,
    upload_instructions: Vec<UploadInstruction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadInstruction {
    upload_url: String,
    first_byte: u64,
    last_byte: u64,
}

pub struct LinkedInPublisher {
    config: LinkedInConfig,
    client: reqwest::Client,
}

impl LinkedInPublisher {
    pub fn new(config: LinkedInConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.config.access_token)
            .header("LinkedIn-Version", &self.config.version)
            .header("X-Restli-Protocol-Version", RESTLI_PROTOCOL_VERSION)
    }

    /// Create a post and return its URN from the `x-restli-id` header
    async fn create_post(&self, commentary: &str, content: Option<Value>) -> Result<PublishedRef, PublishError> {
        let mut body = json!({
            "author": self.config.author_urn,
            "commentary": commentary,
            "visibility": "PUBLIC",
            "distribution": {
                "feedDistribution": "MAIN_FEED",
                "targetEntities": [],
                "thirdPartyDistributionChannels": []
            },
            "lifecycleState": "PUBLISHED",
            "isReshareDisabledByAuthor": false
        });
        if let Some(content) = content {
            body["content"] = content;
        }

        let response = self
            .request(reqwest::Method::POST, "/rest/posts")
            .json(&body)
            .send()
            .await?;
        let response = check_status(Platform::LinkedIn, response).await?;

        let urn = response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PublishError::invalid(Platform::LinkedIn, "missing x-restli-id header"))?;

        Ok(PublishedRef {
            url: Some(format!("https://www.linkedin.com/feed/update/{}", urn)),
            external_id: urn,
        })
    }
}

#[async_trait]
impl Publisher for LinkedInPublisher {
    fn platform(&self) -> Platform {
        Platform::LinkedIn
    }

    async fn publish_text(&self, content: &SocialContent) -> Result<PublishedRef, PublishError> {
        let article = content.link.as_ref().map(|link| {
            json!({
                "article": {
                    "source": link,
                    "title": content.title.clone().unwrap_or_default(),
                }
            })
        });
        let published = self.create_post(&content.message, article).await?;
        info!(external_id = %published.external_id, "Published to LinkedIn");
        Ok(published)
    }

    async fn publish_video(&self, video: &VideoUpload) -> Result<PublishedRef, PublishError> {
        let init = self
            .request(reqwest::Method::POST, "/rest/videos?action=initializeUpload")
            .json(&json!({
                "initializeUploadRequest": {
                    "owner": self.config.author_urn,
                    "fileSizeBytes": video.bytes.len(),
                    "uploadCaptions": false,
                    "uploadThumbnail": false
                }
            }))
            .send()
            .await?;
        let init: InitializeUploadResponse = check_status(Platform::LinkedIn, init).await?.json().await?;
        let upload = init.value;

        let mut etags = Vec::with_capacity(upload.upload_instructions.len());
        for part in &upload.upload_instructions {
            let Some(range) = part_range(part.first_byte, part.last_byte, video.bytes.len()) else {
                return Err(PublishError::invalid(
                    Platform::LinkedIn,
                    format!("bad upload range {}..={}", part.first_byte, part.last_byte),
                ));
            };

            let response = self
                .client
                .put(&part.upload_url)
                .bearer_auth(&self.config.access_token)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(video.bytes.slice(range))
                .send()
                .await?;
            let response = check_status(Platform::LinkedIn, response).await?;
            let etag = response
                .headers()
                .get(reqwest::header::ETAG)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim_matches('"').to_string())
                .ok_or_else(|| PublishError::invalid(Platform::LinkedIn, "upload part without ETag"))?;
            debug!(first_byte = part.first_byte, last_byte = part.last_byte, "Uploaded video part");
            etags.push(etag);
        }

        let finalize = self
            .request(reqwest::Method::POST, "/rest/videos?action=finalizeUpload")
            .json(&json!({
                "finalizeUploadRequest": {
                    "video": upload.video,
                    "uploadToken": upload.upload_token,
                    "uploadedPartIds": etags
                }
            }))
            .send()
            .await?;
        check_status(Platform::LinkedIn, finalize).await?;

        let commentary = if video.description.is_empty() {
            video.title.clone()
        } else {
            video.description.clone()
        };
        let published = self
            .create_post(
                &commentary,
                Some(json!({ "media": { "id": upload.video, "title": video.title } })),
            )
            .await?;
        info!(external_id = %published.external_id, "Published video to LinkedIn");
        Ok(published)
    }
}

/// Byte range of one upload part, clamped to the file; `None` if empty
fn part_range(first_byte: u64, last_byte: u64, len: usize) -> Option<Range<usize>> {
    let start = usize::try_from(first_byte).ok()?;
    let end = usize::try_from(last_byte)
        .unwrap_or(usize::MAX)
        .saturating_add(1)
        .min(len);
    (start < end).then_some(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Bytes as BodyBytes,
        extract::{Path, Query, State},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::{post, put},
        Json, Router,
    };
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Stub {
        base: String,
        posts: Arc<Mutex<Vec<Value>>>,
        parts: Arc<Mutex<Vec<(usize, usize)>>>,
        finalized: Arc<Mutex<Vec<Value>>>,
    }

    async fn posts(State(stub): State<Stub>, headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
        assert_eq!(headers.get("linkedin-version").unwrap(), "202401");
        assert_eq!(headers.get("x-restli-protocol-version").unwrap(), "2.0.0");
        assert_eq!(headers.get("authorization").unwrap(), "Bearer token");
        stub.posts.lock().unwrap().push(body);
        (StatusCode::CREATED, [("x-restli-id", "urn:li:share:77")])
    }

    async fn videos(
        State(stub): State<Stub>,
        Query(q): Query<HashMap<String, String>>,
        Json(body): Json<Value>,
    ) -> impl IntoResponse {
        match q.get("action").map(String::as_str) {
            Some("initializeUpload") => {
                assert_eq!(body["initializeUploadRequest"]["fileSizeBytes"], 10);
                Json(json!({
                    "value": {
                        "video": "urn:li:video:9",
                        "uploadToken": "tok",
                        "uploadInstructions": [
                            {"uploadUrl": format!("{}/upload/0", stub.base), "firstByte": 0, "lastByte": 5},
                            {"uploadUrl": format!("{}/upload/1", stub.base), "firstByte": 6, "lastByte": 9}
                        ]
                    }
                }))
                .into_response()
            }
            Some("finalizeUpload") => {
                stub.finalized.lock().unwrap().push(body);
                StatusCode::OK.into_response()
            }
            _ => StatusCode::BAD_REQUEST.into_response(),
        }
    }

    async fn upload(State(stub): State<Stub>, Path(part): Path<usize>, body: BodyBytes) -> impl IntoResponse {
        stub.parts.lock().unwrap().push((part, body.len()));
        [("etag", format!("\"etag-{}\"", part))]
    }

    async fn spawn() -> (Stub, LinkedInPublisher) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let stub = Stub {
            base: base.clone(),
            ..Default::default()
        };
        let app = Router::new()
            .route("/rest/posts", post(posts))
            .route("/rest/videos", post(videos))
            .route("/upload/{part}", put(upload))
            .with_state(stub.clone());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let publisher = LinkedInPublisher::new(
            LinkedInConfig {
                access_token: "token".into(),
                author_urn: "urn:li:person:abc".into(),
                api_base: base,
                ..Default::default()
            },
            reqwest::Client::new(),
        );
        (stub, publisher)
    }

    #[test]
    fn test_part_range_is_clamped() {
        assert_eq!(part_range(0, 9, 100), Some(0..10));
        assert_eq!(part_range(90, 199, 100), Some(90..100));
        assert_eq!(part_range(0, u64::MAX, 10), Some(0..10));
        assert_eq!(part_range(10, 20, 10), None);
        assert_eq!(part_range(5, 3, 10), None);
    }

    #[tokio::test]
    async fn test_publish_text_with_article() {
        let (stub, publisher) = spawn().await;
        let published = publisher
            .publish_text(&SocialContent {
                message: "Hello".into(),
                link: Some("https://site.example/news/1".into()),
                title: Some("Title".into()),
                image_url: None,
            })
            .await
            .unwrap();

        assert_eq!(published.external_id, "urn:li:share:77");
        assert_eq!(
            published.url.as_deref(),
            Some("https://www.linkedin.com/feed/update/urn:li:share:77")
        );
        let posts = stub.posts.lock().unwrap();
        assert_eq!(posts[0]["author"], "urn:li:person:abc");
        assert_eq!(posts[0]["commentary"], "Hello");
        assert_eq!(posts[0]["content"]["article"]["source"], "https://site.example/news/1");
    }

    #[tokio::test]
    async fn test_publish_video_uploads_parts_and_finalizes() {
        let (stub, publisher) = spawn().await;
        let published = publisher
            .publish_video(&VideoUpload {
                bytes: bytes::Bytes::from_static(b"0123456789"),
                file_name: "clip.mp4".into(),
                mime_type: "video/mp4".into(),
                title: "Clip".into(),
                description: "".into(),
            })
            .await
            .unwrap();

        assert_eq!(published.external_id, "urn:li:share:77");
        assert_eq!(*stub.parts.lock().unwrap(), vec![(0, 6), (1, 4)]);
        let finalized = stub.finalized.lock().unwrap();
        assert_eq!(
            finalized[0]["finalizeUploadRequest"]["uploadedPartIds"],
            json!(["etag-0", "etag-1"])
        );
        let posts = stub.posts.lock().unwrap();
        assert_eq!(posts[0]["content"]["media"]["id"], "urn:li:video:9");
        assert_eq!(posts[0]["commentary"], "Clip");
    }

    #[tokio::test]
    async fn test_api_error() {
        let app = Router::new().route(
            "/rest/posts",
            post(|| async { (StatusCode::UNAUTHORIZED, "expired token") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let publisher = LinkedInPublisher::new(
            LinkedInConfig {
                access_token: "t".into(),
                author_urn: "urn:li:person:1".into(),
                api_base: base,
                ..Default::default()
            },
            reqwest::Client::new(),
        );
        let err = publisher
            .publish_text(&SocialContent {
                message: "x".into(),
                link: None,
                title: None,
                image_url: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Api { status: 401, .. }));
    }
}
