use axum::{
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use super::types::ErrorBody;
use crate::utils::fetch::FetchError;
use crate::utils::pdf::PdfError;

/// Terminal failures of one extraction request, reported as an
/// `{"error": ...}` body. Everything the caller can trigger is a 400, except
/// an oversized body (413).
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid JSON data")]
    InvalidJson(String),

    #[error("Request body too large")]
    BodyTooLarge(String),

    #[error("No url provided")]
    MissingUrl,

    #[error("Invalid URL provided")]
    InvalidUrl(String),

    #[error("URL host is not allowed")]
    HostNotAllowed(String),

    #[error("HTTP Error: {0}")]
    Http(String),

    #[error("Error Connecting: {0}")]
    Connection(String),

    #[error("Timeout Error: {0}")]
    Timeout(String),

    #[error("Something went wrong: {0}")]
    Request(String),

    #[error("Failed to extract text from PDF: {0}")]
    Pdf(#[from] PdfError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::InvalidUrl(msg) => ApiError::InvalidUrl(msg),
            FetchError::Forbidden(host) => ApiError::HostNotAllowed(host),
            FetchError::Http(msg) => ApiError::Http(msg),
            FetchError::Connection(msg) => ApiError::Connection(msg),
            FetchError::Timeout(msg) => ApiError::Timeout(msg),
            FetchError::Request(msg) => ApiError::Request(msg),
        }
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::BodyTooLarge(rejection.body_text())
        } else {
            ApiError::InvalidJson(rejection.body_text())
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Underlying cause for the log line, when the client message omits it.
    fn cause(&self) -> Option<&str> {
        match self {
            ApiError::InvalidJson(cause)
            | ApiError::BodyTooLarge(cause)
            | ApiError::InvalidUrl(cause)
            | ApiError::HostNotAllowed(cause) => Some(cause),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        match self.cause() {
            Some(cause) => error!(cause = cause, "{}", message),
            None => error!("{}", message),
        }
        (self.status(), Json(ErrorBody { error: message })).into_response()
    }
}
