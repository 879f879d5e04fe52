// Error handling for the dubbing API
//
// Handler errors and their mapping onto HTTP responses. Lower layers keep
// their own error enums and convert into `HandlerError` at the boundary.

use thiserror::Error;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};

use crate::models::ErrorResponse;
use crate::run_manager::QueueError;

/// Errors that can occur in the dubbing API handlers
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The request body or its parameters are unusable
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No run with this id
    #[error("Run not found: {0}")]
    RunNotFound(String),

    /// The run is already finished
    #[error("Cannot cancel run: {0}")]
    CannotCancel(String),

    /// The run has no result yet
    #[error("Result not ready: {0}")]
    NotReady(String),

    /// Anything the client cannot fix
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    pub fn invalid_request<S: Into<String>>(msg: S) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Short machine-readable label for the `status` field of error bodies
    fn label(&self) -> &'static str {
        match self {
            HandlerError::InvalidRequest(_) => "invalid_request",
            HandlerError::RunNotFound(_) => "not_found",
            HandlerError::CannotCancel(_) => "already_finished",
            HandlerError::NotReady(_) => "not_ready",
            HandlerError::Internal(_) => "internal",
        }
    }
}

impl ResponseError for HandlerError {
    fn status_code(&self) -> StatusCode {
        match self {
            HandlerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            HandlerError::RunNotFound(_) => StatusCode::NOT_FOUND,
            HandlerError::CannotCancel(_) | HandlerError::NotReady(_) => StatusCode::CONFLICT,
            HandlerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
            status: Some(self.label().to_string()),
        })
    }
}

/// Convert QueueError to HandlerError
impl From<QueueError> for HandlerError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::RunNotFound(id) => HandlerError::RunNotFound(id),
            QueueError::InvalidRequest(reason) => HandlerError::InvalidRequest(reason),
            QueueError::CannotCancel(reason) => HandlerError::CannotCancel(reason),
            QueueError::NotReady(reason) => HandlerError::NotReady(reason),
            QueueError::QueueClosed(reason) => HandlerError::Internal(reason),
        }
    }
}
