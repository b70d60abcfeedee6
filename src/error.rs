// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid client credentials: {0}")]
    InvalidCredentials(&'static str),

    #[error("No token: {0}")]
    NoToken(String),

    #[error("Campus API rejected the credentials (401)")]
    IntraUnauthorized,

    #[error("Campus API denied access to {0} (403)")]
    IntraForbidden(String),

    #[error("Campus API rate limit hit (retry after {retry_after:?})")]
    IntraRateLimited { retry_after: Option<Duration> },

    #[error("Campus API error: HTTP {status}: {body}")]
    IntraStatus { status: u16, body: String },

    #[error("Campus API request failed: {0}")]
    IntraTransport(String),

    #[error("Campus API returned malformed data: {0}")]
    IntraDecode(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True for a 429 that survived the retry policy.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AppError::IntraRateLimited { .. })
    }

    /// Network-level failures (connect, timeout, reset) worth a short retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::IntraTransport(_))
    }

    /// Errors meaning the bearer token is missing, rejected or unobtainable.
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            AppError::IntraUnauthorized | AppError::NoToken(_) | AppError::InvalidCredentials(_)
        )
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AppError::IntraDecode(err.to_string())
        } else {
            AppError::IntraTransport(err.to_string())
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::InvalidCredentials(msg) => {
                tracing::error!(error = %msg, "Credential configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "invalid_credentials",
                    Some(msg.to_string()),
                )
            }
            AppError::NoToken(msg) => (StatusCode::BAD_GATEWAY, "no_token", Some(msg.clone())),
            AppError::IntraUnauthorized => (StatusCode::BAD_GATEWAY, "intra_unauthorized", None),
            AppError::IntraForbidden(path) => {
                (StatusCode::BAD_GATEWAY, "intra_forbidden", Some(path.clone()))
            }
            AppError::IntraRateLimited { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "intra_rate_limited", None)
            }
            AppError::IntraStatus { status, .. } => (
                StatusCode::BAD_GATEWAY,
                "intra_error",
                Some(format!("upstream status {}", status)),
            ),
            AppError::IntraTransport(msg) => {
                (StatusCode::GATEWAY_TIMEOUT, "intra_unreachable", Some(msg.clone()))
            }
            AppError::IntraDecode(msg) => {
                (StatusCode::BAD_GATEWAY, "intra_malformed", Some(msg.clone()))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
