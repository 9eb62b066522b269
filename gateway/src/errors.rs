use crate::validation::RequestValidationError;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use resolver::ResolveError;
use serde::Serialize;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Forbidden")]
    Forbidden,

    #[error("Too many requests, please try again later.")]
    RateLimited { retry_after_secs: u64 },

    #[error("{0}")]
    Validation(#[from] RequestValidationError),

    #[error("Membership not found")]
    MembershipNotFound,

    #[error("Role not found")]
    RoleNotFound,

    #[error("Invalid system")]
    UnknownSystem,

    #[error("Failed to proxy request")]
    ProxyFailed,

    /// Details are logged where the failure happens, never sent to the client.
    #[error("Internal server error")]
    Internal,
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::MembershipNotFound => ApiError::MembershipNotFound,
            ResolveError::RoleNotFound => ApiError::RoleNotFound,
            ResolveError::Upstream(_) => ApiError::Internal,
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::MembershipNotFound | ApiError::RoleNotFound | ApiError::UnknownSystem => {
                StatusCode::NOT_FOUND
            }
            ApiError::ProxyFailed | ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ApiErrorResponse {
            error: self.to_string(),
        });
        let mut response = (status, body).into_response();

        if let ApiError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }

        response
    }
}
