use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use interview_core::session_store::StoreError;
use serde::Serialize;

pub const ELEVENLABS_KEY_MISSING: &str = "ElevenLabs API key is required. \
     Please configure ELEVENLABS_API_KEY in your environment variables.";

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Failures a handler reports to the browser. Upstream errors are logged in
/// full but only their public message leaves the service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{error}")]
    BadRequest {
        error: &'static str,
        details: Option<String>,
    },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Misconfigured(&'static str),
    #[error("{message}: {source:#}")]
    Upstream {
        message: &'static str,
        source: anyhow::Error,
    },
}

impl ApiError {
    pub fn bad_request(error: &'static str) -> Self {
        ApiError::BadRequest {
            error,
            details: None,
        }
    }

    pub fn upstream(message: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| ApiError::Upstream { message, source }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => ApiError::NotFound(e.to_string()),
            StoreError::AlreadyCompleted(_) => ApiError::Conflict(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            ApiError::BadRequest { error, details } => {
                (StatusCode::BAD_REQUEST, error.to_string(), details)
            }
            ApiError::NotFound(error) => (StatusCode::NOT_FOUND, error, None),
            ApiError::Conflict(error) => (StatusCode::CONFLICT, error, None),
            ApiError::Misconfigured(error) => {
                (StatusCode::INTERNAL_SERVER_ERROR, error.to_string(), None)
            }
            ApiError::Upstream { message, source } => {
                tracing::error!("{}: {:#}", message, source);
                (StatusCode::INTERNAL_SERVER_ERROR, message.to_string(), None)
            }
        };
        (status, Json(ErrorResponse { error, details })).into_response()
    }
}
