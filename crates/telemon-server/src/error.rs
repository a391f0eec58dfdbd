use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use telemon_common::error::ModelError;
use telemon_storage::error::StorageError;

/// Handler errors, rendered as a plain-text body with a matching status.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed input: bad path value, bad JSON, unknown type, empty ID.
    #[error("{0}")]
    BadRequest(String),

    /// No metric with the requested identity.
    #[error("metric not found")]
    NotFound,

    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ModelError> for ApiError {
    fn from(err: ModelError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Validation(e) => e.into(),
            StorageError::CounterOverflow { .. } => ApiError::BadRequest(err.to_string()),
            other => ApiError::Storage(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, self.to_string()).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
