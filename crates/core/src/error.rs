//! Error types shared across the Mood Gateway workspace
//!
//! The error set mirrors the propagation policy of the recommendation
//! pipeline: per-item enrichment failures are `Transient` and are swallowed
//! at the call site; room state-machine violations map to client errors;
//! everything else bubbles up.

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde_json::json;

/// Error type for all Mood Gateway operations
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("room is full")]
    RoomFull,

    #[error("voting already started")]
    RoomAlreadyStarted,

    #[error("invalid room action: {0}")]
    InvalidRoomAction(String),

    #[error("no emotional profile exists for this user")]
    NoProfile,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("transient upstream failure: {0}")]
    Transient(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl GatewayError {
    /// Whether callers should treat this as a skippable per-item failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

impl actix_web::ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::NotFound(_) | GatewayError::NoProfile => StatusCode::NOT_FOUND,
            GatewayError::Conflict(_)
            | GatewayError::RoomFull
            | GatewayError::RoomAlreadyStarted => StatusCode::CONFLICT,
            GatewayError::InvalidRoomAction(_) | GatewayError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Configuration(_)
            | GatewayError::Database(_)
            | GatewayError::Serialization(_)
            | GatewayError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "detail": self.to_string() }))
    }
}
