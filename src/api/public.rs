//! Public API endpoints
//!
//! - GET /api/v1/health
//! - GET /api/v1/news, GET /api/v1/news/{id}
//! - GET /api/v1/blog, GET /api/v1/blog/{slug}
//! - GET /api/v1/search?q=
//! - POST /api/v1/contact

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{extract_ip, PaginationQuery};
use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::{
    BlogPostResponse, BlogSummary, HealthResponse, OkResponse, PageResponse, PublicNews,
};
use crate::services::email::ContactForm;
use crate::services::search::SearchResult;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/news", get(list_news))
        .route("/news/{id}", get(get_news))
        .route("/blog", get(list_blog))
        .route("/blog/{slug}", get(get_blog_post))
        .route("/search", get(search))
        .route("/contact", post(contact))
}

/// GET /api/v1/health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = state.pool.ping().await.is_ok();
    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" }.to_string(),
        database,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.request_stats.uptime_seconds(),
        total_requests: state.request_stats.total_requests(),
        avg_response_time_ms: state.request_stats.avg_response_time_us() / 1000.0,
    })
}

/// GET /api/v1/news - published news, newest first
pub async fn list_news(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PageResponse<PublicNews>>, ApiError> {
    let result = state.news_service.list_published(&query.params()).await?;
    Ok(Json(result.map(PublicNews::from).into()))
}

/// GET /api/v1/news/{id}
pub async fn get_news(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PublicNews>, ApiError> {
    let item = state.news_service.get_published(id).await?;
    Ok(Json(item.into()))
}

/// GET /api/v1/blog
pub async fn list_blog(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PageResponse<BlogSummary>>, ApiError> {
    let result = state.blog_service.list_published(&query.params()).await?;
    Ok(Json(result.map(BlogSummary::from).into()))
}

/// GET /api/v1/blog/{slug} - drafts answer 404
pub async fn get_blog_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<BlogPostResponse>, ApiError> {
    let post = state.blog_service.get_by_slug(&slug).await?;
    Ok(Json(post.into()))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
}

/// GET /api/v1/search?q=
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, ApiError> {
    let results = state.search_service.search(&query.q, query.limit).await?;
    Ok(Json(SearchResponse {
        query: query.q.trim().to_string(),
        results,
    }))
}

/// POST /api/v1/contact
pub async fn contact(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<ContactForm>,
) -> Result<Json<OkResponse>, ApiError> {
    let ip = extract_ip(&headers).unwrap_or_else(|| "unknown".to_string());
    state.contact_service.submit(&form, &ip).await?;
    Ok(Json(OkResponse::ok()))
}
