//! HTTP request handlers with OpenAPI documentation.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::IntoResponse,
};
use tracing::{error, info};
use utoipa::OpenApi;
use validator::Validate;

use crate::app::AppState;
use crate::domain::{
    AppError, ConfigError, ErrorResponse, Fee, FeeQuote, FeeType, FeeUnit, HealthResponse,
    HealthStatus, JsonEnvelope, MultiTransactionStatusResponse, ReturnResult,
    SubmitTransactionRequest, TransactionError, TransactionResponse, TransactionStatus,
    TxQueryData, UpstreamError, ValidationError,
};

/// Request header selecting the fee profile
pub const PROFILE_HEADER: &str = "name";

const MIME_JSON: &str = "application/json";
const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Merchant Gateway API",
        version = "0.1.0",
        description = "Merchant API in front of a pool of bitcoin full nodes",
        license(
            name = "MIT"
        )
    ),
    paths(
        fee_quote_handler,
        submit_transaction_handler,
        query_transaction_status_handler,
        multi_transaction_status_handler,
        health_check_handler,
    ),
    components(
        schemas(
            JsonEnvelope,
            FeeQuote,
            Fee,
            FeeType,
            FeeUnit,
            SubmitTransactionRequest,
            TransactionResponse,
            TransactionStatus,
            TxQueryData,
            MultiTransactionStatusResponse,
            ReturnResult,
            HealthResponse,
            HealthStatus,
            ErrorResponse,
        )
    ),
    tags(
        (name = "mapi", description = "Merchant API endpoints"),
        (name = "health", description = "Health check endpoints")
    )
)]
pub struct ApiDoc;

/// Fee profile named by the `name` header, if any
fn profile(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(PROFILE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Media type of the request without parameters such as `charset`
fn media_type(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

fn unsupported(media_type: String) -> AppError {
    AppError::Validation(ValidationError::UnsupportedContentType(format!(
        "'{}', expected '{}' or '{}'",
        media_type, MIME_JSON, MIME_OCTET_STREAM
    )))
}

/// Get a signed fee quote
///
/// Returns the fee schedule for the caller's profile together with the
/// current chain tip and the time until which the quote is honoured.
#[utoipa::path(
    get,
    path = "/mapi/feeQuote",
    tag = "mapi",
    params(
        ("name" = Option<String>, Header, description = "Fee profile; selects fees_<name>.json")
    ),
    responses(
        (status = 200, description = "Envelope whose payload is a FeeQuote", body = JsonEnvelope),
        (status = 500, description = "Fee schedule missing or invalid", body = ErrorResponse),
        (status = 503, description = "No node reachable", body = ErrorResponse)
    )
)]
pub async fn fee_quote_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<JsonEnvelope>, AppError> {
    let quote = state.service.get_fee_quote(profile(&headers)).await?;
    Ok(Json(state.signer.wrap(&quote)?))
}

/// Submit a transaction
///
/// Accepts `application/json` (`{"rawtx": "<hex>"}`) or
/// `application/octet-stream` (raw transaction bytes). The transaction is
/// broadcast only if its fee satisfies the caller's fee profile.
#[utoipa::path(
    post,
    path = "/mapi/tx",
    tag = "mapi",
    request_body(content = SubmitTransactionRequest, content_type = "application/json"),
    params(
        ("name" = Option<String>, Header, description = "Fee profile; selects fees_<name>.json")
    ),
    responses(
        (status = 200, description = "Envelope whose payload is a TransactionResponse", body = JsonEnvelope),
        (status = 400, description = "Malformed request or transaction", body = ErrorResponse),
        (status = 422, description = "Parent transaction not found", body = ErrorResponse),
        (status = 503, description = "No node reachable", body = ErrorResponse)
    )
)]
pub async fn submit_transaction_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<JsonEnvelope>, AppError> {
    let raw_hex = match media_type(&headers).as_str() {
        MIME_JSON => {
            let request: SubmitTransactionRequest = serde_json::from_slice(&body).map_err(|e| {
                AppError::Validation(ValidationError::InvalidField {
                    field: "body".to_string(),
                    message: e.to_string(),
                })
            })?;
            request
                .validate()
                .map_err(|e| AppError::Validation(ValidationError::Multiple(e.to_string())))?;
            request.rawtx
        }
        MIME_OCTET_STREAM => {
            if body.is_empty() {
                return Err(ValidationError::MissingField("body".to_string()).into());
            }
            hex::encode(&body)
        }
        other => return Err(unsupported(other.to_string())),
    };

    let response = state
        .service
        .submit_transaction(&raw_hex, profile(&headers))
        .await?;

    info!(
        txid = %response.txid,
        result = ?response.return_result,
        description = %response.result_description,
        "Transaction submission handled"
    );

    Ok(Json(state.signer.wrap(&response)?))
}

/// Query the status of a transaction
#[utoipa::path(
    get,
    path = "/mapi/tx/{id}",
    tag = "mapi",
    params(
        ("id" = String, Path, description = "Transaction id")
    ),
    responses(
        (status = 200, description = "Envelope whose payload is a TransactionStatus", body = JsonEnvelope),
        (status = 400, description = "Missing txid", body = ErrorResponse)
    )
)]
pub async fn query_transaction_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JsonEnvelope>, AppError> {
    let status = state.service.query_transaction_status(&id).await?;
    Ok(Json(state.signer.wrap(&status)?))
}

/// Query the status of several transactions
#[utoipa::path(
    post,
    path = "/mapi/txs",
    tag = "mapi",
    request_body(content = Vec<String>, content_type = "application/json"),
    responses(
        (status = 200, description = "Envelope whose payload is a MultiTransactionStatusResponse", body = JsonEnvelope),
        (status = 400, description = "Malformed request or empty txid list", body = ErrorResponse)
    )
)]
pub async fn multi_transaction_status_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<JsonEnvelope>, AppError> {
    let media_type = media_type(&headers);
    if media_type != MIME_JSON {
        return Err(unsupported(media_type));
    }

    let txids: Vec<String> = serde_json::from_slice(&body).map_err(|e| {
        AppError::Validation(ValidationError::InvalidField {
            field: "txids".to_string(),
            message: e.to_string(),
        })
    })?;

    let response = state.service.multi_transaction_status(&txids).await?;
    Ok(Json(state.signer.wrap(&response)?))
}

/// Node pool health
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Health status", body = HealthResponse),
        (status = 503, description = "No node reachable", body = HealthResponse)
    )
)]
pub async fn health_check_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.service.health_check().await;
    let status = match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(health))
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Config(ConfigError::Missing(_))
            | AppError::Config(ConfigError::Invalid { .. })
            | AppError::Config(ConfigError::FeeSchedule(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Upstream(upstream) => match upstream {
                UpstreamError::NoResults => StatusCode::SERVICE_UNAVAILABLE,
                UpstreamError::Rpc(_) | UpstreamError::Mixed => StatusCode::BAD_GATEWAY,
            },
            AppError::Transaction(tx_err) => match tx_err {
                TransactionError::Parse(_) => StatusCode::BAD_REQUEST,
                TransactionError::PreviousTxNotFound(_) => StatusCode::UNPROCESSABLE_ENTITY,
                TransactionError::InsufficientFee => StatusCode::PAYMENT_REQUIRED,
            },
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        };

        let code = self.code();
        let message = self.to_string();

        if status.is_server_error() {
            error!(code, message = %message, "Server error");
        }

        let body = Json(ErrorResponse {
            status: status.as_u16(),
            code,
            error: message,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_profile_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(profile(&headers), None);
        headers.insert(PROFILE_HEADER, HeaderValue::from_static("  "));
        assert_eq!(profile(&headers), None);
        headers.insert(PROFILE_HEADER, HeaderValue::from_static("gold"));
        assert_eq!(profile(&headers), Some("gold"));
    }

    #[test]
    fn test_media_type_strips_parameters() {
        let mut headers = HeaderMap::new();
        assert_eq!(media_type(&headers), "");
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("Application/JSON; charset=utf-8"),
        );
        assert_eq!(media_type(&headers), MIME_JSON);
    }

    #[test]
    fn test_error_statuses() {
        let cases = [
            (
                AppError::Upstream(UpstreamError::NoResults),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::Upstream(UpstreamError::Mixed),
                StatusCode::BAD_GATEWAY,
            ),
            (
                AppError::Transaction(TransactionError::Parse("bad".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Transaction(TransactionError::PreviousTxNotFound("x".into())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                AppError::Config(ConfigError::Missing("fees.json".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (AppError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
