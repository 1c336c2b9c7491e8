use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::session::SessionError;

#[derive(Error, Debug)]
pub enum AppError {
    /// Missing, malformed, or wrong credential. Retryable by the caller,
    /// never conflated with a server failure.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Malformed payload")]
    MalformedPayload,

    /// Duplicate session records detected. Operator territory.
    #[error("Session record integrity violation")]
    IntegrityViolation,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::AmbiguousRecord => AppError::IntegrityViolation,
            SessionError::Store(message) => AppError::Internal(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::MalformedPayload => StatusCode::BAD_REQUEST,
            AppError::IntegrityViolation | AppError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, self.to_string()).into_response()
    }
}
