//! Resolve the bearer token forwarded to the upstream.
//!
//! Precedence: `x-api-key` header, then `Authorization: Bearer <token>`, then the
//! default token configured at startup. The default-token fallback lets any caller
//! spend a shared credential; leave `DEFAULT_BEARER_TOKEN` unset on public deployments.

use axum::http::{header, HeaderMap};

use crate::error::{GatewayError, Result};

const BEARER_PREFIX: &str = "Bearer ";

pub fn resolve_bearer_token(headers: &HeaderMap, default_token: Option<&str>) -> Result<String> {
    let from_api_key = header_str(headers, "x-api-key");

    let from_authorization = || {
        header_str(headers, header::AUTHORIZATION.as_str())
            .and_then(|v| v.strip_prefix(BEARER_PREFIX))
            .filter(|t| !t.is_empty())
    };

    from_api_key
        .or_else(from_authorization)
        .or_else(|| default_token.filter(|t| !t.is_empty()))
        .map(str::to_string)
        .ok_or(GatewayError::AuthMissing)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}
