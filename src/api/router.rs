//! Router construction, CORS and optional rate limiting.

use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Request, State},
    http::{
        HeaderName, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::app::AppState;
use crate::domain::AppError;

use super::handlers::{
    ApiDoc, fee_quote_handler, health_check_handler, multi_transaction_status_handler,
    query_transaction_status_handler, submit_transaction_handler,
};

/// Largest accepted request body
pub const MAX_REQUEST_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Rate limiting settings
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst_size: 20,
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        use std::env;

        let defaults = Self::default();

        let requests_per_second = env::var("RATE_LIMIT_RPS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.requests_per_second);

        let burst_size = env::var("RATE_LIMIT_BURST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.burst_size);

        Self {
            requests_per_second,
            burst_size,
        }
    }

    fn quota(&self) -> Quota {
        let rps = NonZeroU32::new(self.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(self.burst_size).unwrap_or(rps);
        Quota::per_second(rps).allow_burst(burst)
    }
}

/// Create the router without rate limiting
pub fn create_router(state: Arc<AppState>) -> Router {
    build_router(state, None)
}

/// Create the router with a process-wide rate limit on the merchant API routes
pub fn create_router_with_rate_limit(state: Arc<AppState>, config: RateLimitConfig) -> Router {
    build_router(state, Some(config))
}

fn build_router(state: Arc<AppState>, rate_limit: Option<RateLimitConfig>) -> Router {
    let mut mapi = Router::new()
        .route("/mapi/feeQuote", get(fee_quote_handler))
        .route("/mapi/tx", post(submit_transaction_handler))
        .route("/mapi/tx/{id}", get(query_transaction_status_handler))
        .route("/mapi/txs", post(multi_transaction_status_handler));

    if let Some(config) = rate_limit {
        let limiter = Arc::new(RateLimiter::direct(config.quota()));
        mapi = mapi.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("x-requested-with"),
            CONTENT_TYPE,
            AUTHORIZATION,
        ]);

    Router::new()
        .merge(mapi)
        .route("/health", get(health_check_handler))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn rate_limit_middleware(
    State(limiter): State<Arc<DefaultDirectRateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if limiter.check().is_err() {
        warn!(path = %request.uri().path(), "Rate limit exceeded");
        return Err(AppError::RateLimited);
    }
    Ok(next.run(request).await)
}
