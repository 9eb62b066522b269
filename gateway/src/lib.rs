//! HTTP surface of the rank service: authentication, validation, rate
//! limiting and wiring of the resolver and notifier.

mod api;
mod auth;
pub mod config;
mod errors;
pub mod metrics_defs;
mod rate_limit;
mod validation;

pub use api::{AppState, Services, router};
pub use errors::ApiError;

use notifier::{DeliveryError, HttpTransport, UsersClient, send_startup_status};
use resolver::cache::spawn_purge_task;
use resolver::{GroupsClient, UpstreamError};
use axum::Router;
use shared::metrics::Metrics;
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// How long in-flight requests may run once a shutdown signal arrives.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] config::ValidationError),
    #[error("could not build groups client: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("could not build webhook client: {0}")]
    Webhook(#[from] DeliveryError),
    #[error("could not build users client: {0}")]
    Users(#[from] reqwest::Error),
    #[error("connections still open {0:?} after shutdown signal")]
    ShutdownTimeout(Duration),
}

pub async fn run(config: config::Config) -> Result<(), GatewayError> {
    config.validate()?;

    let webhooks = Arc::new(HttpTransport::new(config.notifier.timeout())?);
    let services = Services {
        groups: Arc::new(GroupsClient::new(&config.upstream)?),
        webhooks: webhooks.clone(),
        users: Arc::new(UsersClient::new(
            config.notifier.users_base_url.clone(),
            config.notifier.timeout(),
        )?),
    };
    let state = AppState::new(&config, services, Metrics::new());
    let purge_task = spawn_purge_task(state.cache(), config.cache.purge_interval());

    let addr = format!("{}:{}", config.listener.host, config.listener.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, group_id = config.group_id, "API listening");

    if let Some(status_webhook) = config.notifier.status_webhook.clone() {
        let developer_ping = config.notifier.developer_ping.clone();
        tokio::spawn(async move {
            send_startup_status(webhooks.as_ref(), &status_webhook, developer_ping.as_deref())
                .await;
        });
    }

    let result = serve(listener, router(state), shutdown_signal(), SHUTDOWN_GRACE).await;
    purge_task.abort();
    result?;

    tracing::info!("Shut down");
    Ok(())
}

/// Serves until `signal` resolves, then gives open connections `grace` to
/// finish before giving up on them.
async fn serve<S>(
    listener: TcpListener,
    app: Router,
    signal: S,
    grace: Duration,
) -> Result<(), GatewayError>
where
    S: Future<Output = ()> + Send + 'static,
{
    let (signalled_tx, mut signalled_rx) = tokio::sync::oneshot::channel();
    let signal = async move {
        signal.await;
        let _ = signalled_tx.send(());
    };

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return Ok(result?),
        Ok(()) = &mut signalled_rx => {}
    }

    match tokio::time::timeout(grace, server).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            tracing::error!(?grace, "Connections did not close in time, forcing shutdown");
            Err(GatewayError::ShutdownTimeout(grace))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutting down...");
}
