//! API layer - HTTP handlers and routing
//!
//! Two route trees:
//! - `/api/v1` for the portfolio front end (public reads, contact form) and
//!   the admin panel (`/api/v1/admin`, admin bearer token)
//! - `/functions/v1` for pipeline triggers (cron secret or admin token) and
//!   the Telegram webhook (webhook secret)

pub mod admin;
pub mod common;
pub mod functions;
pub mod middleware;
pub mod public;
pub mod responses;

#[cfg(test)]
pub(crate) mod test_support;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub use middleware::{ApiError, AppState, RequestStats};

/// Build the `/api/v1` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let admin_routes = admin::router().route_layer(axum_middleware::from_fn_with_state(
        state,
        middleware::require_admin,
    ));

    public::router().nest("/admin", admin_routes)
}

/// Build the `/functions/v1` router
pub fn build_functions_router(state: AppState) -> Router<AppState> {
    functions::router()
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_function_auth,
        ))
        .merge(functions::webhook_router())
}

fn cors_layer(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if origin == "*" {
        return cors.allow_origin(Any);
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => cors.allow_origin(value),
        Err(_) => {
            warn!(origin, "Invalid CORS origin, allowing any");
            cors.allow_origin(Any)
        }
    }
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origin);

    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .nest("/functions/v1", build_functions_router(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        // Request stats middleware (outermost layer, runs for all requests)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_stats_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use axum::http::{HeaderName, HeaderValue, StatusCode};

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let ctx = TestApp::new().await;
        ctx.server.get("/api/v1/nope").await.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let ctx = TestApp::new().await;
        let response = ctx
            .server
            .method(axum::http::Method::OPTIONS, "/api/v1/news")
            .add_header(HeaderName::from_static("origin"), HeaderValue::from_static("https://me.example"))
            .add_header(
                HeaderName::from_static("access-control-request-method"),
                HeaderValue::from_static("GET"),
            )
            .await;
        assert_eq!(
            response.header("access-control-allow-origin"),
            HeaderValue::from_static("https://me.example")
        );
    }

    #[tokio::test]
    async fn test_requests_are_counted() {
        let ctx = TestApp::new().await;
        ctx.server.get("/api/v1/news").await.assert_status_ok();
        ctx.server.get("/api/v1/news").await.assert_status_ok();
        assert!(ctx.state.request_stats.total_requests() >= 2);
    }

    #[test]
    fn test_cors_layer_accepts_bad_origin() {
        // must not panic
        let _ = super::cors_layer("bad\norigin");
        let _ = super::cors_layer("*");
    }
}
