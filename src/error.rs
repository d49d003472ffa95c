use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Missing required columns: {0:?}")]
    MissingColumns(Vec<String>),
}

#[derive(Error, Debug)]
pub enum MLError {
    #[error("Model is not fitted")]
    NotFitted,

    #[error("Dimension mismatch: {rows} feature rows but {targets} targets")]
    DimensionMismatch {
        rows: usize,
        targets: usize,
    },

    #[error("Insufficient training data: {0}")]
    InsufficientData(String),

    #[error("Non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("Training failed: {0}")]
    TrainingError(String),

    #[error("Model persistence failed: {0}")]
    PersistenceError(#[from] std::io::Error),

    #[error("Model serialization failed: {0}")]
    SerializationError(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unknown violation: {0}")]
    UnknownViolation(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: i32,
        min: i32,
        max: i32,
    },

    #[error("No model metadata for {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::UnknownViolation(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidQuery(_) | ApiError::OutOfRange { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::InvalidQuery(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "detail": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}
