//! Error types for the gateway.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use thiserror::Error;

use crate::translate::anthropic_types::ErrorResponse;

pub const AUTH_MISSING_MESSAGE: &str = "Bearer token is required. Please provide x-api-key header, \
     Authorization header, or set DEFAULT_BEARER_TOKEN environment variable.";

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{}", AUTH_MISSING_MESSAGE)]
    AuthMissing,

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Non-2xx answer from the upstream, relayed to the client untouched.
    #[error("Upstream returned status {status}")]
    Upstream {
        status: StatusCode,
        content_type: Option<String>,
        body: Bytes,
    },

    #[error("Translation error: {message}")]
    Translation { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl GatewayError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: msg.into(),
        }
    }

    pub fn translation(msg: impl Into<String>) -> Self {
        Self::Translation {
            message: msg.into(),
        }
    }

    /// Status code the client sees for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::AuthMissing => StatusCode::UNAUTHORIZED,
            Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Upstream { status, .. } => *status,
            Self::Translation { .. } | Self::Http(_) => StatusCode::BAD_GATEWAY,
            Self::Config { .. } | Self::Io(_) | Self::Json(_) | Self::Toml(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::AuthMissing => (
                status,
                [(header::CONTENT_TYPE, "text/plain")],
                AUTH_MISSING_MESSAGE,
            )
                .into_response(),
            Self::Upstream {
                content_type, body, ..
            } => {
                let mut response = Response::new(Body::from(body));
                *response.status_mut() = status;
                if let Some(value) = content_type.and_then(|ct| ct.parse().ok()) {
                    response.headers_mut().insert(header::CONTENT_TYPE, value);
                }
                response
            }
            Self::InvalidRequest { message } => {
                (status, Json(ErrorResponse::invalid_request(message))).into_response()
            }
            other => (status, Json(ErrorResponse::api_error(other.to_string()))).into_response(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
