use crate::api::AppState;
use crate::errors::ApiError;
use crate::metrics_defs::RATE_LIMITED;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use shared::counter;
use std::num::NonZeroU32;

/// One budget for the whole service, not per client.
pub fn global_limiter(requests_per_minute: u32) -> DefaultDirectRateLimiter {
    let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN));
    RateLimiter::direct(quota)
}

pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match state.limiter().check() {
        Ok(()) => Ok(next.run(request).await),
        Err(not_until) => {
            let retry_after_secs = not_until
                .wait_time_from(DefaultClock::default().now())
                .as_secs()
                .max(1);
            counter!(RATE_LIMITED).increment(1);
            tracing::warn!(retry_after_secs, uri = %request.uri(), "Rate limit exceeded");
            Err(ApiError::RateLimited { retry_after_secs })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_is_the_per_minute_budget() {
        let limiter = global_limiter(3);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }
}
