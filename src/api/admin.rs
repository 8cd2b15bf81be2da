//! Admin API endpoints
//!
//! Everything under /api/v1/admin requires the admin bearer token:
//! - news moderation (list, approve, reject, publish)
//! - RSS sources
//! - AI prompts
//! - pipeline settings
//! - blog posts
//! - cross-posting history

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::api::common::AdminListQuery;
use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::PageResponse;
use crate::models::{
    prompt_types, AiPrompt, BlogPost, BlogPostStatus, CreateBlogPostInput, CreateRssSourceInput,
    ModerationStatus, NewsItem, Platform, RssSource, SocialMediaPost, UpdateBlogPostInput,
};
use crate::services::crosspost::CrossPostReport;
use crate::services::settings::{PipelineSettings, UpdatePipelineSettings};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/news", get(list_news))
        .route("/news/stats", get(news_stats))
        .route("/news/{id}", get(get_news))
        .route("/news/{id}/approve", post(approve_news))
        .route("/news/{id}/reject", post(reject_news))
        .route("/news/{id}/publish", post(publish_news))
        .route("/sources", get(list_sources).post(create_source))
        .route("/sources/{id}", put(update_source).delete(delete_source))
        .route("/prompts", get(list_prompts))
        .route("/prompts/{prompt_type}", put(upsert_prompt))
        .route("/settings", get(get_settings).put(update_settings))
        .route("/blog", get(list_blog).post(create_blog_post))
        .route(
            "/blog/{id}",
            get(get_blog_post).put(update_blog_post).delete(delete_blog_post),
        )
        .route("/social/posts", get(list_social_posts))
        .route("/social/platforms", get(list_platforms))
}

fn parse_filter<T: std::str::FromStr<Err = String>>(value: Option<&str>) -> Result<Option<T>, ApiError> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| v.parse::<T>().map_err(ApiError::validation_error))
        .transpose()
}

// ============================================================================
// News
// ============================================================================

/// GET /api/v1/admin/news?status=
pub async fn list_news(
    State(state): State<AppState>,
    Query(query): Query<AdminListQuery>,
) -> Result<Json<PageResponse<NewsItem>>, ApiError> {
    let status = parse_filter::<ModerationStatus>(query.status.as_deref())?;
    let result = state.news_service.list(status, &query.params()).await?;
    Ok(Json(result.into()))
}

/// GET /api/v1/admin/news/stats - counts by moderation status
pub async fn news_stats(State(state): State<AppState>) -> Result<Json<HashMap<String, i64>>, ApiError> {
    let counts = state.news_service.stats().await?;
    let mut out: HashMap<String, i64> = ModerationStatus::ALL
        .iter()
        .map(|s| (s.to_string(), 0))
        .collect();
    for (status, count) in counts {
        out.insert(status.to_string(), count);
    }
    Ok(Json(out))
}

pub async fn get_news(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<NewsItem>, ApiError> {
    Ok(Json(state.news_service.get(id).await?))
}

pub async fn approve_news(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<NewsItem>, ApiError> {
    Ok(Json(state.news_service.approve(id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

pub async fn reject_news(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<RejectRequest>>,
) -> Result<Json<NewsItem>, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    Ok(Json(state.news_service.reject(id, request.reason.as_deref()).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct PublishRequest {
    /// Cross-post right after publishing
    #[serde(default)]
    pub crosspost: bool,
    pub platforms: Option<Vec<Platform>>,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub item: NewsItem,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crosspost: Option<CrossPostReport>,
}

/// POST /api/v1/admin/news/{id}/publish
///
/// A cross-posting failure does not undo the publish; it is logged and the
/// report is omitted.
pub async fn publish_news(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<PublishRequest>>,
) -> Result<Json<PublishResponse>, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let item = state.news_service.publish(id).await?;

    let crosspost = if request.crosspost {
        match state
            .crosspost_service
            .publish_news(id, request.platforms.as_deref())
            .await
        {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(news_id = id, error = %e, "Cross-posting after publish failed");
                None
            }
        }
    } else {
        None
    };
    Ok(Json(PublishResponse { item, crosspost }))
}

// ============================================================================
// Sources
// ============================================================================

pub async fn list_sources(State(state): State<AppState>) -> Result<Json<Vec<RssSource>>, ApiError> {
    Ok(Json(state.news_service.list_sources().await?))
}

pub async fn create_source(
    State(state): State<AppState>,
    Json(input): Json<CreateRssSourceInput>,
) -> Result<(StatusCode, Json<RssSource>), ApiError> {
    let source = state.news_service.create_source(input).await?;
    Ok((StatusCode::CREATED, Json(source)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSourceRequest {
    pub is_active: bool,
}

pub async fn update_source(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateSourceRequest>,
) -> Result<Json<RssSource>, ApiError> {
    Ok(Json(state.news_service.set_source_active(id, request.is_active).await?))
}

pub async fn delete_source(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.news_service.delete_source(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Prompts
// ============================================================================

pub async fn list_prompts(State(state): State<AppState>) -> Result<Json<Vec<AiPrompt>>, ApiError> {
    Ok(Json(state.prompt_service.list().await?))
}

#[derive(Debug, Deserialize)]
pub struct UpsertPromptRequest {
    pub content: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

pub async fn upsert_prompt(
    State(state): State<AppState>,
    Path(prompt_type): Path<String>,
    Json(request): Json<UpsertPromptRequest>,
) -> Result<Json<AiPrompt>, ApiError> {
    if !prompt_types::ALL.contains(&prompt_type.as_str()) {
        return Err(ApiError::with_details(
            "VALIDATION_ERROR",
            format!("Unknown prompt type: {}", prompt_type),
            serde_json::json!({ "allowed": prompt_types::ALL }),
        ));
    }
    if request.content.trim().is_empty() {
        return Err(ApiError::validation_error("Prompt content cannot be empty"));
    }
    let prompt = state
        .prompt_service
        .upsert(&prompt_type, &request.content, request.is_active)
        .await?;
    Ok(Json(prompt))
}

// ============================================================================
// Settings
// ============================================================================

pub async fn get_settings(State(state): State<AppState>) -> Result<Json<PipelineSettings>, ApiError> {
    Ok(Json(state.settings_service.get().await?))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<UpdatePipelineSettings>,
) -> Result<Json<PipelineSettings>, ApiError> {
    Ok(Json(state.settings_service.update(&update).await?))
}

// ============================================================================
// Blog
// ============================================================================

pub async fn list_blog(
    State(state): State<AppState>,
    Query(query): Query<AdminListQuery>,
) -> Result<Json<PageResponse<BlogPost>>, ApiError> {
    let status = parse_filter::<BlogPostStatus>(query.status.as_deref())?;
    Ok(Json(state.blog_service.list(status, &query.params()).await?.into()))
}

pub async fn get_blog_post(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<BlogPost>, ApiError> {
    Ok(Json(state.blog_service.get(id).await?))
}

pub async fn create_blog_post(
    State(state): State<AppState>,
    Json(input): Json<CreateBlogPostInput>,
) -> Result<(StatusCode, Json<BlogPost>), ApiError> {
    let post = state.blog_service.create(input).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn update_blog_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateBlogPostInput>,
) -> Result<Json<BlogPost>, ApiError> {
    Ok(Json(state.blog_service.update(id, input).await?))
}

pub async fn delete_blog_post(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.blog_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Social
// ============================================================================

pub async fn list_social_posts(
    State(state): State<AppState>,
    Query(query): Query<AdminListQuery>,
) -> Result<Json<PageResponse<SocialMediaPost>>, ApiError> {
    let platform = parse_filter::<Platform>(query.platform.as_deref())?;
    Ok(Json(state.crosspost_service.list_posts(platform, &query.params()).await?.into()))
}

pub async fn list_platforms(State(state): State<AppState>) -> Json<Vec<Platform>> {
    Json(state.crosspost_service.available_platforms())
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::*;
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_requires_admin_token() {
        let ctx = TestApp::new().await;
        ctx.server
            .get("/api/v1/admin/news")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        // the cron secret is not an admin credential
        ctx.server
            .get("/api/v1/admin/news")
            .authorization_bearer(CRON_SECRET)
            .await
            .assert_status(StatusCode::FORBIDDEN);
        ctx.server
            .get("/api/v1/admin/news")
            .authorization_bearer(ADMIN_TOKEN)
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn test_moderation_flow() {
        let ctx = TestApp::new().await;
        let item = ctx.insert_news("https://n.example/m").await;

        let rejected: Value = ctx
            .server
            .post(&format!("/api/v1/admin/news/{}/reject", item.id))
            .authorization_bearer(ADMIN_TOKEN)
            .json(&json!({"reason": "off topic"}))
            .await
            .json();
        assert_eq!(rejected["moderation_status"], "rejected");
        assert_eq!(rejected["rejection_reason"], "off topic");

        // rejected items cannot be published directly
        ctx.server
            .post(&format!("/api/v1/admin/news/{}/publish", item.id))
            .authorization_bearer(ADMIN_TOKEN)
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        ctx.server
            .post(&format!("/api/v1/admin/news/{}/approve", item.id))
            .authorization_bearer(ADMIN_TOKEN)
            .await
            .assert_status_ok();
        let published: Value = ctx
            .server
            .post(&format!("/api/v1/admin/news/{}/publish", item.id))
            .authorization_bearer(ADMIN_TOKEN)
            .json(&json!({"crosspost": true, "platforms": ["linkedin"]}))
            .await
            .json();
        assert_eq!(published["item"]["moderation_status"], "published");
        assert_eq!(published["crosspost"]["results"][0]["success"], true);

        let stats: Value = ctx
            .server
            .get("/api/v1/admin/news/stats")
            .authorization_bearer(ADMIN_TOKEN)
            .await
            .json();
        assert_eq!(stats["published"], 1);
        assert_eq!(stats["pending"], 0);

        let filtered: Value = ctx
            .server
            .get("/api/v1/admin/news")
            .add_query_param("status", "bogus")
            .authorization_bearer(ADMIN_TOKEN)
            .await
            .json();
        assert_eq!(filtered["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_sources_crud() {
        let ctx = TestApp::new().await;
        let created = ctx
            .server
            .post("/api/v1/admin/sources")
            .authorization_bearer(ADMIN_TOKEN)
            .json(&json!({"name": "Blog", "url": "https://feeds.example/rss"}))
            .await;
        created.assert_status(StatusCode::CREATED);
        let id = created.json::<Value>()["id"].as_i64().unwrap();

        ctx.server
            .post("/api/v1/admin/sources")
            .authorization_bearer(ADMIN_TOKEN)
            .json(&json!({"name": "Again", "url": "https://feeds.example/rss"}))
            .await
            .assert_status(StatusCode::CONFLICT);

        let toggled: Value = ctx
            .server
            .put(&format!("/api/v1/admin/sources/{}", id))
            .authorization_bearer(ADMIN_TOKEN)
            .json(&json!({"is_active": false}))
            .await
            .json();
        assert_eq!(toggled["is_active"], false);

        ctx.server
            .delete(&format!("/api/v1/admin/sources/{}", id))
            .authorization_bearer(ADMIN_TOKEN)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        let list: Value = ctx
            .server
            .get("/api/v1/admin/sources")
            .authorization_bearer(ADMIN_TOKEN)
            .await
            .json();
        assert_eq!(list, json!([]));
    }

    #[tokio::test]
    async fn test_prompts_and_settings() {
        let ctx = TestApp::new().await;
        ctx.server
            .put("/api/v1/admin/prompts/unknown")
            .authorization_bearer(ADMIN_TOKEN)
            .json(&json!({"content": "x"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let prompt: Value = ctx
            .server
            .put("/api/v1/admin/prompts/pre_moderation")
            .authorization_bearer(ADMIN_TOKEN)
            .json(&json!({"content": "Judge {{title}}"}))
            .await
            .json();
        assert_eq!(prompt["prompt_type"], "pre_moderation");

        let settings: Value = ctx
            .server
            .put("/api/v1/admin/settings")
            .authorization_bearer(ADMIN_TOKEN)
            .json(&json!({"notify_email": true, "crosspost_platforms": ["youtube"]}))
            .await
            .json();
        assert_eq!(settings["notify_email"], true);
        assert_eq!(settings["crosspost_platforms"], json!(["youtube"]));
        assert_eq!(settings["auto_pre_moderation"], true);
    }

    #[tokio::test]
    async fn test_blog_crud() {
        let ctx = TestApp::new().await;
        let created = ctx
            .server
            .post("/api/v1/admin/blog")
            .authorization_bearer(ADMIN_TOKEN)
            .json(&json!({"title": "Draft post", "content": "Hello"}))
            .await;
        created.assert_status(StatusCode::CREATED);
        let post = created.json::<Value>();
        assert_eq!(post["status"], "draft");
        let id = post["id"].as_i64().unwrap();

        ctx.server
            .post("/api/v1/admin/blog")
            .authorization_bearer(ADMIN_TOKEN)
            .json(&json!({"title": "Draft post", "content": "Again"}))
            .await
            .assert_status(StatusCode::CONFLICT);

        ctx.server
            .put(&format!("/api/v1/admin/blog/{}", id))
            .authorization_bearer(ADMIN_TOKEN)
            .json(&json!({"status": "published"}))
            .await
            .assert_status_ok();
        ctx.server.get("/api/v1/blog/draft-post").await.assert_status_ok();

        ctx.server
            .delete(&format!("/api/v1/admin/blog/{}", id))
            .authorization_bearer(ADMIN_TOKEN)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        ctx.server
            .get("/api/v1/blog/draft-post")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_social_history() {
        let ctx = TestApp::new().await;
        let platforms: Value = ctx
            .server
            .get("/api/v1/admin/social/platforms")
            .authorization_bearer(ADMIN_TOKEN)
            .await
            .json();
        assert_eq!(platforms, json!(["linkedin"]));

        let item = ctx.insert_news("https://n.example/s").await;
        ctx.state.news_service.publish(item.id).await.unwrap();
        ctx.state
            .crosspost_service
            .publish_news(item.id, Some(&[crate::models::Platform::LinkedIn]))
            .await
            .unwrap();

        let posts: Value = ctx
            .server
            .get("/api/v1/admin/social/posts")
            .add_query_param("platform", "linkedin")
            .authorization_bearer(ADMIN_TOKEN)
            .await
            .json();
        assert_eq!(posts["total"], 1);
        assert_eq!(posts["items"][0]["status"], "published");
    }
}
