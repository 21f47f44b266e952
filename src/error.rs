//! Error kinds the core recognizes.
//!
//! C2/C3/C4 never surface errors to clients; they log and, where safe,
//! retry. C5 surfaces a concise detail message to HTTP clients with no
//! stack trace (the debug middleware in `main.rs` is the one exception,
//! and it is documented as a debugging aid, not a contract).

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("configuration invalid: {0}")]
    ConfigInvalid(String),

    #[error("database schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("invalid request: {0}")]
    RelayInvalidRequest(String),

    #[error("error forwarding to validator")]
    RelayValidatorTransport(#[source] reqwest::Error),

    #[error("transaction rejected: {0}")]
    RelayValidatorRejected(String),

    #[error("malformed validator response")]
    RelayMalformedResult,

    #[error("ingest: malformed block payload: {0}")]
    IngestMalformed(String),

    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        let (status, detail) = match &self {
            ProxyError::RelayValidatorRejected(msg) => {
                (StatusCode::BAD_REQUEST, format!("Transaction rejected: {msg}"))
            }
            ProxyError::RelayMalformedResult => {
                (StatusCode::BAD_REQUEST, "malformed validator response".to_string())
            }
            ProxyError::ConfigInvalid(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            ProxyError::RelayInvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            ProxyError::RelayValidatorTransport(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Error forwarding to validator".to_string())
            }
            ProxyError::Store(e) => {
                tracing::error!(error = %e, "store error in request path");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
            ProxyError::SchemaMismatch(_) | ProxyError::IngestMalformed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
