//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error envelope and service error mapping
//! - Bearer token checks for admin and function routes
//! - Request statistics

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

use crate::config::Config;
use crate::db::DynDatabasePool;
use crate::services::blog::{BlogService, BlogServiceError};
use crate::services::crosspost::{CrossPostError, CrossPostService};
use crate::services::email::{ContactError, ContactService};
use crate::services::news::{NewsService, NewsServiceError};
use crate::services::prompts::PromptService;
use crate::services::search::{SearchError, SearchService};
use crate::services::settings::{SettingsService, SettingsServiceError};
use crate::services::telegram::TelegramBot;

// ============================================================================
// Request Statistics
// ============================================================================

/// Lightweight request statistics using atomic operations (no locks)
pub struct RequestStats {
    total_requests: AtomicU64,
    /// Total response time in microseconds (for calculating average)
    total_response_time_us: AtomicU64,
    start_time: Instant,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record(&self, duration_us: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us.fetch_add(duration_us, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn avg_response_time_us(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.total_response_time_us.load(Ordering::Relaxed) as f64 / total as f64
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub config: Arc<Config>,
    pub news_service: Arc<NewsService>,
    pub blog_service: Arc<BlogService>,
    pub search_service: Arc<SearchService>,
    pub contact_service: Arc<ContactService>,
    pub crosspost_service: Arc<CrossPostService>,
    pub settings_service: Arc<SettingsService>,
    pub prompt_service: Arc<PromptService>,
    /// `None` when no bot token is configured
    pub telegram_bot: Option<Arc<TelegramBot>>,
    pub request_stats: Arc<RequestStats>,
}

// ============================================================================
// Errors
// ============================================================================

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new("RATE_LIMITED", message)
    }

    pub fn upstream_error(message: impl Into<String>) -> Self {
        Self::new("UPSTREAM_ERROR", message)
    }

    pub fn not_configured(message: impl Into<String>) -> Self {
        Self::new("NOT_CONFIGURED", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMITED" => StatusCode::TOO_MANY_REQUESTS,
            "UPSTREAM_ERROR" => StatusCode::BAD_GATEWAY,
            "NOT_CONFIGURED" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// Database failures are logged in full and reported generically
fn internal(e: impl std::fmt::Display) -> ApiError {
    error!(error = %e, "Request failed");
    ApiError::internal_error("Internal server error")
}

impl From<NewsServiceError> for ApiError {
    fn from(e: NewsServiceError) -> Self {
        match e {
            NewsServiceError::NotFound(_) | NewsServiceError::SourceNotFound(_) => {
                ApiError::not_found(e.to_string())
            }
            NewsServiceError::InvalidTransition { .. } | NewsServiceError::ValidationError(_) => {
                ApiError::validation_error(e.to_string())
            }
            NewsServiceError::DuplicateSource(_) | NewsServiceError::PipelineBusy => {
                ApiError::conflict(e.to_string())
            }
            NewsServiceError::AiUnavailable => ApiError::not_configured(e.to_string()),
            NewsServiceError::Ai(_) => ApiError::upstream_error(e.to_string()),
            NewsServiceError::DatabaseError(_) => internal(e),
        }
    }
}

impl From<BlogServiceError> for ApiError {
    fn from(e: BlogServiceError) -> Self {
        match e {
            BlogServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            BlogServiceError::ValidationError(_) => ApiError::validation_error(e.to_string()),
            BlogServiceError::DuplicateSlug(_) => ApiError::conflict(e.to_string()),
            BlogServiceError::DatabaseError(_) => internal(e),
        }
    }
}

impl From<SearchError> for ApiError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::ValidationError(_) => ApiError::validation_error(e.to_string()),
            SearchError::DatabaseError(_) => internal(e),
        }
    }
}

impl From<ContactError> for ApiError {
    fn from(e: ContactError) -> Self {
        match e {
            ContactError::Validation(_) => ApiError::validation_error(e.to_string()),
            ContactError::RateLimited => ApiError::rate_limited(e.to_string()),
            ContactError::NotConfigured => ApiError::not_configured(e.to_string()),
            ContactError::Send(_) => {
                error!(error = %e, "Contact email failed");
                ApiError::upstream_error("Failed to send message")
            }
        }
    }
}

impl From<CrossPostError> for ApiError {
    fn from(e: CrossPostError) -> Self {
        match e {
            CrossPostError::NotFound(..) => ApiError::not_found(e.to_string()),
            CrossPostError::NotPublished(..) | CrossPostError::NoPlatforms => {
                ApiError::validation_error(e.to_string())
            }
            CrossPostError::DatabaseError(_) => internal(e),
        }
    }
}

impl From<SettingsServiceError> for ApiError {
    fn from(e: SettingsServiceError) -> Self {
        internal(e)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        internal(e)
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Token from an `Authorization: Bearer ...` header
pub fn extract_bearer(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Compare without short-circuiting on the first differing byte
fn token_matches(given: &str, expected: &str) -> bool {
    if expected.is_empty() || given.len() != expected.len() {
        return false;
    }
    given
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Admin routes: bearer token must equal `server.admin_token`
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(&request).ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?;
    if !token_matches(token, state.config.server.admin_token.as_deref().unwrap_or_default()) {
        return Err(ApiError::forbidden("Admin privileges required"));
    }
    Ok(next.run(request).await)
}

/// Function routes: bearer token must be the cron secret or the admin token
pub async fn require_function_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(&request).ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?;
    let server = &state.config.server;
    let cron_secret = server.cron_secret.as_deref().unwrap_or_default();
    let admin_token = server.admin_token.as_deref().unwrap_or_default();
    if !token_matches(token, cron_secret) && !token_matches(token, admin_token) {
        return Err(ApiError::unauthorized("Invalid token"));
    }
    Ok(next.run(request).await)
}

/// Records request count and response time
pub async fn request_stats_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    state.request_stats.record(start.elapsed().as_micros() as u64);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request as HttpRequest};
    use proptest::prelude::*;

    fn request_with_auth(value: &str) -> Request {
        HttpRequest::builder()
            .header(header::AUTHORIZATION, value)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer(&request_with_auth("Bearer abc")), Some("abc"));
        assert_eq!(extract_bearer(&request_with_auth("Basic abc")), None);
        assert_eq!(extract_bearer(&HttpRequest::new(Body::empty())), None);
    }

    #[test]
    fn test_empty_expected_token_never_matches() {
        assert!(!token_matches("", ""));
        assert!(!token_matches("x", ""));
        assert!(token_matches("secret", "secret"));
        assert!(!token_matches("secreT", "secret"));
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            ("UNAUTHORIZED", 401),
            ("FORBIDDEN", 403),
            ("NOT_FOUND", 404),
            ("VALIDATION_ERROR", 400),
            ("CONFLICT", 409),
            ("RATE_LIMITED", 429),
            ("UPSTREAM_ERROR", 502),
            ("SOMETHING_ELSE", 500),
        ];
        for (code, status) in cases {
            assert_eq!(ApiError::new(code, "m").status().as_u16(), status, "{}", code);
        }
    }

    #[test]
    fn test_api_error_with_details() {
        let err = ApiError::with_details("VALIDATION_ERROR", "bad", serde_json::json!({"field": "q"}));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(json["error"]["details"]["field"], "q");
    }

    #[test]
    fn test_request_stats_average() {
        let stats = RequestStats::new();
        assert_eq!(stats.avg_response_time_us(), 0.0);
        stats.record(1_000);
        stats.record(3_000);
        assert_eq!(stats.total_requests(), 2);
        assert_eq!(stats.avg_response_time_us(), 2_000.0);
    }

    #[test]
    fn test_service_error_mapping() {
        assert_eq!(ApiError::from(NewsServiceError::NotFound(1)).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(BlogServiceError::DuplicateSlug("a".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(ApiError::from(ContactError::RateLimited).status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::from(NewsServiceError::PipelineBusy).status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(NewsServiceError::DatabaseError(anyhow::anyhow!("db down"))).error.message,
            "Internal server error"
        );
    }

    proptest! {
        #[test]
        fn prop_token_matches_only_itself(a in "[a-z0-9]{1,16}", b in "[a-z0-9]{1,16}") {
            prop_assert!(token_matches(&a, &a));
            prop_assert_eq!(token_matches(&a, &b), a == b);
        }
    }
}
