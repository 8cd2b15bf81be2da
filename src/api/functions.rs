//! Function endpoints
//!
//! Single-purpose pipeline triggers called by cron jobs and the admin UI:
//! - POST /functions/v1/fetch-news
//! - POST /functions/v1/process-rss-news
//! - POST /functions/v1/pre-moderate-news
//! - POST /functions/v1/analyze-rss-article
//! - POST /functions/v1/crosspost
//! - POST /functions/v1/crosspost-video (multipart)
//!
//! The Telegram webhook lives here too but authenticates with the webhook
//! secret instead of a bearer token.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::OkResponse;
use crate::models::{ContentKind, Platform};
use crate::services::analysis::ArticleAnalysis;
use crate::services::crosspost::CrossPostReport;
use crate::services::moderation::ModerationVerdict;
use crate::services::news::{FetchReport, PipelineReport, ProcessReport};
use crate::services::social::VideoUpload;
use crate::services::telegram::Update;

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";
const MAX_VIDEO_BYTES: usize = 256 * 1024 * 1024;

/// Bearer-protected pipeline routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/fetch-news", post(fetch_news))
        .route("/process-rss-news", post(process_rss_news))
        .route("/pre-moderate-news", post(pre_moderate_news))
        .route("/analyze-rss-article", post(analyze_rss_article))
        .route("/crosspost", post(crosspost))
        .route(
            "/crosspost-video",
            post(crosspost_video).layer(DefaultBodyLimit::max(MAX_VIDEO_BYTES)),
        )
}

/// Routes with their own authentication
pub fn webhook_router() -> Router<AppState> {
    Router::new().route("/telegram-webhook", post(telegram_webhook))
}

#[derive(Debug, Default, Deserialize)]
pub struct BatchRequest {
    pub limit: Option<i64>,
}

impl BatchRequest {
    fn limit(&self, state: &AppState) -> i64 {
        self.limit
            .unwrap_or(state.config.scheduler.process_batch_size)
            .clamp(1, 100)
    }
}

/// POST /functions/v1/fetch-news
pub async fn fetch_news(State(state): State<AppState>) -> Result<Json<FetchReport>, ApiError> {
    Ok(Json(state.news_service.fetch_news().await?))
}

/// POST /functions/v1/process-rss-news - fetch, then pre-moderate and analyze
pub async fn process_rss_news(
    State(state): State<AppState>,
    body: Option<Json<BatchRequest>>,
) -> Result<Json<PipelineReport>, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let report = state.news_service.process_rss_news(request.limit(&state)).await?;
    info!(
        inserted = report.fetch.inserted,
        processed = report.process.processed,
        "process-rss-news finished"
    );
    Ok(Json(report))
}

#[derive(Debug, Default, Deserialize)]
pub struct PreModerateRequest {
    pub news_id: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreModerateResponse {
    Single { news_id: i64, verdict: ModerationVerdict },
    Batch(ProcessReport),
}

/// POST /functions/v1/pre-moderate-news - one item by id, or a batch
pub async fn pre_moderate_news(
    State(state): State<AppState>,
    body: Option<Json<PreModerateRequest>>,
) -> Result<Json<PreModerateResponse>, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    if let Some(news_id) = request.news_id {
        let verdict = state.news_service.pre_moderate(news_id).await?;
        return Ok(Json(PreModerateResponse::Single { news_id, verdict }));
    }
    let limit = BatchRequest { limit: request.limit }.limit(&state);
    let report = state.news_service.pre_moderate_pending(limit).await?;
    Ok(Json(PreModerateResponse::Batch(report)))
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub news_id: Option<i64>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
}

/// POST /functions/v1/analyze-rss-article - stored item or ad-hoc text
pub async fn analyze_rss_article(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<ArticleAnalysis>, ApiError> {
    let analysis = match request.news_id {
        Some(id) => state.news_service.analyze(id).await?,
        None => {
            let (Some(title), Some(content)) = (request.title.as_deref(), request.content.as_deref()) else {
                return Err(ApiError::validation_error(
                    "Provide news_id, or title and content",
                ));
            };
            state
                .news_service
                .analyze_adhoc(title, content, request.url.as_deref().unwrap_or_default())
                .await?
        }
    };
    Ok(Json(analysis))
}

#[derive(Debug, Deserialize)]
pub struct CrossPostRequest {
    pub kind: ContentKind,
    pub id: i64,
    pub platforms: Option<Vec<Platform>>,
}

/// POST /functions/v1/crosspost
pub async fn crosspost(
    State(state): State<AppState>,
    Json(request): Json<CrossPostRequest>,
) -> Result<Json<CrossPostReport>, ApiError> {
    let platforms = request.platforms.as_deref();
    let report = match request.kind {
        ContentKind::News => state.crosspost_service.publish_news(request.id, platforms).await?,
        ContentKind::Blog => state.crosspost_service.publish_blog(request.id, platforms).await?,
        ContentKind::Video => {
            return Err(ApiError::validation_error(
                "Videos are uploaded through /crosspost-video",
            ))
        }
    };
    Ok(Json(report))
}

/// POST /functions/v1/crosspost-video
///
/// Multipart fields: `file` (required), `title`, `description`,
/// `platforms` (comma separated).
pub async fn crosspost_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<CrossPostReport>, ApiError> {
    let mut file = None;
    let mut title = String::new();
    let mut description = String::new();
    let mut platforms = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("video.mp4").to_string();
                let mime_type = field.content_type().unwrap_or("video/mp4").to_string();
                if !mime_type.starts_with("video/") {
                    return Err(ApiError::validation_error(format!("Not a video: {}", mime_type)));
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation_error(format!("Failed to read file: {}", e)))?;
                file = Some((bytes, file_name, mime_type));
            }
            "title" | "description" | "platforms" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation_error(format!("Failed to read {}: {}", name, e)))?;
                match name.as_str() {
                    "title" => title = text,
                    "description" => description = text,
                    _ => platforms = Some(Platform::parse_list(&text)),
                }
            }
            _ => {}
        }
    }

    let (bytes, file_name, mime_type) = file.ok_or_else(|| ApiError::validation_error("No file provided"))?;
    if bytes.is_empty() {
        return Err(ApiError::validation_error("Empty file"));
    }
    let video = VideoUpload {
        bytes,
        title: if title.trim().is_empty() { file_name.clone() } else { title },
        file_name,
        mime_type,
        description,
    };
    let report = state
        .crosspost_service
        .publish_video(&video, platforms.as_deref())
        .await?;
    Ok(Json(report))
}

/// POST /functions/v1/telegram-webhook
///
/// Answers 200 once the secret matches, whatever happens while handling
/// the update; Telegram would otherwise redeliver it.
pub async fn telegram_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<OkResponse>, ApiError> {
    if let Some(expected) = state.config.telegram.webhook_secret.as_deref().filter(|s| !s.is_empty()) {
        let given = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(expected) {
            warn!("Telegram webhook called with a bad secret");
            return Err(ApiError::unauthorized("Invalid webhook secret"));
        }
    }

    let bot = state
        .telegram_bot
        .as_ref()
        .ok_or_else(|| ApiError::not_configured("Telegram bot is not configured"))?;

    match serde_json::from_value::<Update>(payload) {
        Ok(update) => {
            let update_id = update.update_id;
            if let Err(e) = bot.handle_update(update).await {
                warn!(update_id, error = %e, "Failed to handle Telegram update");
            }
        }
        Err(e) => warn!(error = %e, "Unparseable Telegram update"),
    }
    Ok(Json(OkResponse::ok()))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::*;
    use crate::models::ModerationStatus;
    use crate::services::ai::testing::ScriptedModel;
    use axum::http::{HeaderName, HeaderValue, StatusCode};
    use axum_test::multipart::{MultipartForm, Part};
    use serde_json::{json, Value};

    const APPROVE: &str = r#"{"approved": true, "reason": "relevant", "confidence": 0.9}"#;

    #[tokio::test]
    async fn test_requires_bearer_token() {
        let ctx = TestApp::new().await;
        ctx.server
            .post("/functions/v1/fetch-news")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        ctx.server
            .post("/functions/v1/fetch-news")
            .authorization_bearer("wrong")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        for token in [CRON_SECRET, ADMIN_TOKEN] {
            let report: Value = ctx
                .server
                .post("/functions/v1/fetch-news")
                .authorization_bearer(token)
                .await
                .json();
            assert_eq!(report["sources"], 0);
        }
    }

    #[tokio::test]
    async fn test_fetch_conflicts_with_running_pipeline() {
        let ctx = TestApp::new().await;
        let _held = ctx.state.news_service.fetch_lock().lock().await;

        for path in ["/functions/v1/fetch-news", "/functions/v1/process-rss-news"] {
            let response = ctx.server.post(path).authorization_bearer(CRON_SECRET).await;
            response.assert_status(StatusCode::CONFLICT);
            let body: Value = response.json();
            assert_eq!(body["error"]["code"], "CONFLICT");
        }
    }

    #[tokio::test]
    async fn test_pre_moderate_single_and_batch() {
        let ctx = TestApp::with_model(ScriptedModel::always(APPROVE)).await;
        let first = ctx.insert_news("https://n.example/1").await;
        ctx.insert_news("https://n.example/2").await;

        let single: Value = ctx
            .server
            .post("/functions/v1/pre-moderate-news")
            .authorization_bearer(CRON_SECRET)
            .json(&json!({"news_id": first.id}))
            .await
            .json();
        assert_eq!(single["news_id"], first.id);
        assert_eq!(single["verdict"]["approved"], true);

        let batch: Value = ctx
            .server
            .post("/functions/v1/pre-moderate-news")
            .authorization_bearer(CRON_SECRET)
            .await
            .json();
        assert_eq!(batch["processed"], 1);
        assert_eq!(batch["approved"], 1);
    }

    #[tokio::test]
    async fn test_analyze_adhoc_requires_fields() {
        let ctx = TestApp::with_model(ScriptedModel::always(
            r#"{"summary": "Short", "category": "ai", "tags": ["ML"], "social_text": "Read this"}"#,
        ))
        .await;

        ctx.server
            .post("/functions/v1/analyze-rss-article")
            .authorization_bearer(CRON_SECRET)
            .json(&json!({"title": "Only title"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let analysis: Value = ctx
            .server
            .post("/functions/v1/analyze-rss-article")
            .authorization_bearer(CRON_SECRET)
            .json(&json!({"title": "T", "content": "C"}))
            .await
            .json();
        assert_eq!(analysis["summary"], "Short");
        assert_eq!(analysis["category"], "ai");
    }

    #[tokio::test]
    async fn test_crosspost_requires_published() {
        let ctx = TestApp::new().await;
        let item = ctx.insert_news("https://n.example/x").await;

        ctx.server
            .post("/functions/v1/crosspost")
            .authorization_bearer(ADMIN_TOKEN)
            .json(&json!({"kind": "news", "id": item.id}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        ctx.state.news_service.publish(item.id).await.unwrap();
        let report: Value = ctx
            .server
            .post("/functions/v1/crosspost")
            .authorization_bearer(ADMIN_TOKEN)
            .json(&json!({"kind": "news", "id": item.id, "platforms": ["linkedin"]}))
            .await
            .json();
        assert_eq!(report["results"][0]["platform"], "linkedin");
        assert_eq!(report["results"][0]["success"], true);
        assert_eq!(ctx.linkedin.texts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_crosspost_video_multipart() {
        let ctx = TestApp::new().await;
        let form = MultipartForm::new()
            .add_text("title", "Demo")
            .add_text("platforms", "linkedin")
            .add_part(
                "file",
                Part::bytes(b"fake video".to_vec())
                    .file_name("demo.mp4")
                    .mime_type("video/mp4"),
            );

        let report: Value = ctx
            .server
            .post("/functions/v1/crosspost-video")
            .authorization_bearer(ADMIN_TOKEN)
            .multipart(form)
            .await
            .json();
        assert_eq!(report["results"][0]["success"], true);
        assert_eq!(ctx.linkedin.videos.lock().unwrap().as_slice(), ["Demo"]);
    }

    #[tokio::test]
    async fn test_telegram_webhook_secret_and_ack() {
        let ctx = TestApp::with_telegram().await;
        let secret = HeaderName::from_static("x-telegram-bot-api-secret-token");
        let update = json!({
            "update_id": 1,
            "message": {"message_id": 1, "chat": {"id": 1}, "text": "/start"}
        });

        ctx.server
            .post("/functions/v1/telegram-webhook")
            .add_header(secret.clone(), HeaderValue::from_static("wrong"))
            .json(&update)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        let ok: Value = ctx
            .server
            .post("/functions/v1/telegram-webhook")
            .add_header(secret.clone(), HeaderValue::from_static(WEBHOOK_SECRET))
            .json(&update)
            .await
            .json();
        assert_eq!(ok, json!({"ok": true}));
        let bot_api = ctx.bot_api.as_ref().unwrap();
        assert_eq!(bot_api.calls_to("sendMessage").len(), 1);

        // garbage still gets a 200
        ctx.server
            .post("/functions/v1/telegram-webhook")
            .add_header(secret, HeaderValue::from_static(WEBHOOK_SECRET))
            .json(&json!({"nonsense": true}))
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn test_telegram_callback_approves() {
        let ctx = TestApp::with_telegram().await;
        let item = ctx.insert_news("https://n.example/cb").await;

        ctx.server
            .post("/functions/v1/telegram-webhook")
            .add_header(
                HeaderName::from_static("x-telegram-bot-api-secret-token"),
                HeaderValue::from_static(WEBHOOK_SECRET),
            )
            .json(&json!({
                "update_id": 2,
                "callback_query": {
                    "id": "cb1",
                    "from": {"id": 1},
                    "message": {"message_id": 5, "chat": {"id": 1}, "text": "card"},
                    "data": format!("approve:{}", item.id)
                }
            }))
            .await
            .assert_status_ok();

        let stored = ctx.state.news_service.get(item.id).await.unwrap();
        assert_eq!(stored.moderation_status, ModerationStatus::Approved);
    }
}
