use crate::api::AppState;
use crate::errors::ApiError;
use crate::metrics_defs::AUTH_REJECTED;
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use shared::counter;
use subtle::ConstantTimeEq;

pub const ACCESS_KEY_HEADER: &str = "x-access-key";
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Constant-time comparison of a header against the configured key. A
/// missing header or an empty configured key never matches.
pub fn key_matches(provided: Option<&HeaderValue>, expected: &str) -> bool {
    match provided {
        Some(provided) if !expected.is_empty() => {
            provided.as_bytes().ct_eq(expected.as_bytes()).into()
        }
        _ => false,
    }
}

pub async fn require_access_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    check(&request, ACCESS_KEY_HEADER, &state.keys().access_key, "access")?;
    Ok(next.run(request).await)
}

pub async fn require_admin_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    check(&request, ADMIN_KEY_HEADER, &state.keys().admin_key, "admin")?;
    Ok(next.run(request).await)
}

fn check(
    request: &Request,
    header: &str,
    expected: &str,
    scope: &'static str,
) -> Result<(), ApiError> {
    if key_matches(request.headers().get(header), expected) {
        return Ok(());
    }
    counter!(AUTH_REJECTED, "scope" => scope).increment(1);
    tracing::warn!(scope, uri = %request.uri(), "Rejected request with missing or wrong key");
    Err(ApiError::Forbidden)
}
