//! HTTP error mapping.

use crate::annunciator::AnnounceError;
use crate::error::{PlaybackError, SyncError};
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Error body returned by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Debug)]
pub enum AppError {
    /// The request itself is wrong (400).
    BadRequest(ApiError),
    /// Persistence or playback failed (500).
    Internal(ApiError),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(ApiError::new(message))
    }

    /// The persisted schedule could not be read. Never the caller's fault.
    pub fn schedule_load(err: SyncError) -> Self {
        AppError::Internal(ApiError::new("Failed to load schedule").with_details(err.to_string()))
    }

    pub fn schedule_save(err: SyncError) -> Self {
        AppError::Internal(ApiError::new("Failed to save schedule").with_details(err.to_string()))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> &ApiError {
        match self {
            AppError::BadRequest(b) | AppError::Internal(b) => b,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::BadRequest(b) => {
                warn!(error = %b.error, "rejected request");
                b
            }
            AppError::Internal(b) => {
                error!(error = %b.error, details = ?b.details, "request failed");
                b
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(ApiError::new("Invalid JSON body").with_details(rejection.body_text()))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(ApiError::new("Task join error").with_details(err.to_string()))
    }
}

impl From<PlaybackError> for AppError {
    fn from(err: PlaybackError) -> Self {
        AppError::Internal(ApiError::new("Playback failed").with_details(err.to_string()))
    }
}

impl From<AnnounceError> for AppError {
    fn from(err: AnnounceError) -> Self {
        match err {
            AnnounceError::Catalog(e) => AppError::bad_request(e.to_string()),
            AnnounceError::Playback(e) => e.into(),
        }
    }
}
