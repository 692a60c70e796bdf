//! Request-level error kinds and their HTTP translation.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Why a request was refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GuardError {
    /// Missing bearer credentials, invalid credentials, or a failed same-origin check.
    #[error("authentication required: {0}")]
    Unauthorized(&'static str),

    /// CSRF mismatch, or authenticated but not permitted.
    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("webhook signature verification failed")]
    SignatureInvalid,

    /// A collaborator (identity provider, mailer) failed.
    #[error("upstream service failure")]
    Upstream,
}

/// JSON body for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl GuardError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) | Self::SignatureInvalid => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::Upstream => "UPSTREAM_ERROR",
        }
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let retry_after_secs = match self {
            Self::RateLimited { retry_after_secs } => Some(retry_after_secs),
            _ => None,
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code(),
            retry_after_secs,
        };
        let mut response = (self.status(), Json(body)).into_response();

        if let Some(secs) = retry_after_secs {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
