use crate::auth::{require_access_key, require_admin_key};
use crate::config::{AuthConfig, Config};
use crate::errors::ApiError;
use crate::metrics_defs::{PROXY_REQUESTS, RANK_CHANGE_DURATION};
use crate::rate_limit::{global_limiter, rate_limit};
use crate::validation::{RankChangeRequest, RequestValidationError};
use axum::{
    Json, Router,
    extract::{Path, Request, State, rejection::JsonRejection},
    http::{HeaderName, HeaderValue},
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, post},
};
use governor::DefaultDirectRateLimiter;
use notifier::{
    NotificationOutcome, Notifier, RankChangeNotifier, RetryPolicy, UserDirectory,
    WebhookTransport,
};
use resolver::types::{GroupId, UserId};
use resolver::{GroupsApi, RankUpdater, ResolutionCache, Resolver};
use serde::Serialize;
use serde_json::{Value, json};
use shared::metrics::{CacheStats, Metrics};
use shared::{counter, histogram};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tower_http::set_header::SetResponseHeaderLayer;
use url::Url;

const SERVICE_NAME: &str = "Custom Roblox Ranking and Webhook Proxy API";

/// Set on every response, including rejections from the limiter and auth.
pub(crate) const SECURITY_HEADERS: [(&str, &str); 9] = [
    ("content-security-policy", "default-src 'self'; frame-ancestors 'self'; object-src 'none'"),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=15552000; includeSubDomains"),
    ("x-content-type-options", "nosniff"),
    ("x-dns-prefetch-control", "off"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-permitted-cross-domain-policies", "none"),
];

/// Outbound collaborators, injected so tests can substitute fakes.
pub struct Services {
    pub groups: Arc<dyn GroupsApi>,
    pub webhooks: Arc<dyn WebhookTransport>,
    pub users: Arc<dyn UserDirectory>,
}

#[derive(Clone)]
pub struct AppState {
    group_id: GroupId,
    resolver: Resolver,
    updater: RankUpdater,
    cache: Arc<ResolutionCache>,
    metrics: Metrics,
    rank_notifier: Option<RankChangeNotifier>,
    webhooks: Arc<dyn WebhookTransport>,
    proxy_targets: Arc<HashMap<String, Url>>,
    keys: Arc<AuthConfig>,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl AppState {
    pub fn new(config: &Config, services: Services, metrics: Metrics) -> Self {
        let cache = Arc::new(ResolutionCache::new(&config.cache));
        let resolver = Resolver::new(services.groups.clone(), cache.clone(), metrics.clone());
        let updater = RankUpdater::new(services.groups);

        let rank_notifier = config.notifier.ranking_webhook.clone().map(|webhook| {
            let notifier = Notifier::new(
                services.webhooks.clone(),
                RetryPolicy::from(&config.notifier.retry),
            );
            RankChangeNotifier::new(notifier, services.users, webhook)
        });

        AppState {
            group_id: config.group_id,
            resolver,
            updater,
            cache,
            metrics,
            rank_notifier,
            webhooks: services.webhooks,
            proxy_targets: Arc::new(config.proxy_targets()),
            keys: Arc::new(config.auth.clone()),
            limiter: Arc::new(global_limiter(config.rate_limit_per_minute)),
        }
    }

    pub fn cache(&self) -> Arc<ResolutionCache> {
        self.cache.clone()
    }

    pub(crate) fn keys(&self) -> &AuthConfig {
        &self.keys
    }

    pub(crate) fn limiter(&self) -> &DefaultDirectRateLimiter {
        &self.limiter
    }
}

pub fn router(state: AppState) -> Router {
    let access = Router::new()
        .route("/update-rank", patch(update_rank))
        .route("/proxy-webhook/{system}", post(proxy_webhook))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_access_key,
        ));

    let admin = Router::new()
        .route("/metrics", get(metrics))
        .route("/clear-cache", post(clear_cache))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin_key,
        ));

    // Layers run bottom-up: the limiter sees a request before it is counted.
    let router = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .merge(access)
        .merge(admin)
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .with_state(state);

    SECURITY_HEADERS
        .into_iter()
        .fold(router, |router, (name, value)| {
            router.layer(SetResponseHeaderLayer::overriding(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            ))
        })
}

async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    state.metrics.request();
    tracing::info!(method = %request.method(), uri = %request.uri(), "Request received");
    next.run(request).await
}

async fn index() -> Json<Value> {
    Json(json!({ "type": SERVICE_NAME, "status": "OK" }))
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RankChangeResponse {
    success: bool,
    user_id: UserId,
    group_id: GroupId,
    role_id: String,
    role_name: String,
}

async fn update_rank(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<RankChangeResponse>, ApiError> {
    let Json(body) =
        body.map_err(|rejection| RequestValidationError::MalformedBody(rejection.body_text()))?;
    let request = RankChangeRequest::from_json(&body)?;

    // Once started, the change runs to completion even if the client goes away.
    let change = tokio::spawn(apply_rank_change(state, request));
    let response = change.await.map_err(|err| {
        tracing::error!(error = %err, "Rank change task failed");
        ApiError::Internal
    })??;

    Ok(Json(response))
}

async fn apply_rank_change(
    state: AppState,
    request: RankChangeRequest,
) -> Result<RankChangeResponse, ApiError> {
    let start = Instant::now();
    let result = resolve_and_update(&state, request).await;

    let outcome = if result.is_ok() { "success" } else { "failure" };
    histogram!(RANK_CHANGE_DURATION, "result" => outcome).record(start.elapsed().as_secs_f64());

    let response = result?;
    if let Some(notifier) = &state.rank_notifier {
        notifier.notify(NotificationOutcome {
            user_id: response.user_id,
            group_id: response.group_id,
            role_display_name: response.role_name.clone(),
        });
    }
    Ok(response)
}

async fn resolve_and_update(
    state: &AppState,
    request: RankChangeRequest,
) -> Result<RankChangeResponse, ApiError> {
    let RankChangeRequest { user_id, rank } = request;
    let group_id = state.group_id;

    let resolution = state
        .resolver
        .resolve(group_id, user_id, rank)
        .await
        .inspect_err(|err| {
            tracing::warn!(group_id, user_id, rank, error = %err, "Rank resolution failed");
        })?;

    state
        .updater
        .update_rank(group_id, &resolution.membership_id, user_id, &resolution.role_id)
        .await
        .map_err(|err| {
            tracing::error!(group_id, user_id, rank, error = %err, "Rank update failed");
            ApiError::Internal
        })?;

    tracing::info!(
        group_id,
        user_id,
        rank,
        role = %resolution.role_display_name,
        "Rank updated"
    );

    Ok(RankChangeResponse {
        success: true,
        user_id,
        group_id,
        role_id: resolution.role_id,
        role_name: resolution.role_display_name,
    })
}

async fn proxy_webhook(
    State(state): State<AppState>,
    Path(system): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let system = system.to_uppercase();
    let url = state
        .proxy_targets
        .get(&system)
        .ok_or(ApiError::UnknownSystem)?;
    let Json(payload) =
        body.map_err(|rejection| RequestValidationError::MalformedBody(rejection.body_text()))?;

    // A single attempt: the caller owns any retrying.
    match state.webhooks.post(url, &payload).await {
        Ok(()) => {
            counter!(PROXY_REQUESTS, "system" => system.clone(), "result" => "success")
                .increment(1);
            Ok(Json(json!({ "message": "Message proxied successfully" })))
        }
        Err(err) => {
            counter!(PROXY_REQUESTS, "system" => system.clone(), "result" => "failure")
                .increment(1);
            tracing::error!(system = %system, error = %err, "Proxy failed");
            Err(ApiError::ProxyFailed)
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct MetricsResponse {
    uptime: String,
    total_requests: u64,
    cache: CacheStats,
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let snapshot = state.metrics.snapshot();
    Json(MetricsResponse {
        uptime: format!("{}s", snapshot.uptime.as_secs()),
        total_requests: snapshot.total_requests,
        cache: snapshot.cache,
    })
}

async fn clear_cache(State(state): State<AppState>) -> Json<Value> {
    state.cache.clear();
    tracing::info!("All caches cleared");
    Json(json!({ "message": "All caches cleared" }))
}
