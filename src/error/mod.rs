use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or invalid configuration; the message is shown as-is.
    #[error("{message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Tally(#[from] TallyError),

    #[error("Language model error: {0}")]
    Llm(#[from] LlmError),

    #[error("LinkedIn agent error: {0}")]
    Linkedin(#[from] LinkedinError),

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Participant not found: {id}")]
    ParticipantNotFound { id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Failed to persist Tally submissions: {message}")]
    Persist { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Tally forms API errors
#[derive(Debug, Error)]
pub enum TallyError {
    #[error("Failed to fetch Tally responses (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid Tally response: {message}")]
    InvalidResponse { message: String },

    #[error("Tally request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Tally HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Language model API errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Model returned no choices")]
    EmptyCompletion,

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// LinkedIn agent service errors
#[derive(Debug, Error)]
pub enum LinkedinError {
    #[error("LinkedIn Agent Service error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("{message}")]
    MissingProfiles { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Structured-output parse failures, recovered by the caller
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("No JSON object found in model output")]
    NoJson,

    #[error("Failed to parse analysis JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// HTTP-facing errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound { message } => ApiError::NotFound(message),
            AppError::Storage(StorageError::ParticipantNotFound { id }) => {
                ApiError::NotFound(format!("Participant not found: {}", id))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        AppError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for Tally operations
pub type TallyResult<T> = Result<T, TallyError>;

/// Result type alias for language model operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Result type alias for LinkedIn agent operations
pub type LinkedinResult<T> = Result<T, LinkedinError>;

/// Result type alias for HTTP handlers
pub type ApiResult<T> = Result<T, ApiError>;
