use crate::config::{LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::{StatsdBuilder, StatsdError};
use sentry::types::{Dsn, ParseDsnError};
use shared::metrics_defs::describe_all;
use tracing_subscriber::filter::{EnvFilter, ParseError};
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(thiserror::Error, Debug)]
pub enum ObservabilityError {
    #[error("invalid log level: {0}")]
    LogLevel(#[from] ParseError),
    #[error("invalid sentry dsn: {0}")]
    SentryDsn(#[from] ParseDsnError),
    #[error("could not install tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
    #[error("could not build statsd recorder: {0}")]
    Statsd(#[from] StatsdError),
    #[error("a metrics recorder is already installed")]
    RecorderInstalled,
}

/// Installs the fmt subscriber, plus the sentry layer when a DSN is set.
///
/// The returned guard flushes pending sentry events on drop and must be kept
/// alive for the lifetime of the process.
pub fn init_logging(
    config: Option<&LoggingConfig>,
) -> Result<Option<sentry::ClientInitGuard>, ObservabilityError> {
    let level = config.map_or(DEFAULT_LOG_LEVEL, |c| c.level.as_str());
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)?,
    };

    let guard = match config.and_then(|c| c.sentry_dsn.as_deref()) {
        Some(dsn) => {
            let dsn: Dsn = dsn.parse()?;
            Some(sentry::init(sentry::ClientOptions {
                dsn: Some(dsn),
                release: sentry::release_name!(),
                ..Default::default()
            }))
        }
        None => None,
    };
    let sentry_layer = guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_layer)
        .try_init()?;

    Ok(guard)
}

/// Ships every metric from the `metrics` facade to statsd.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), ObservabilityError> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some(config.prefix.as_str()))?;
    metrics::set_global_recorder(recorder).map_err(|_| ObservabilityError::RecorderInstalled)?;

    for defs in [
        shared::metrics::ALL_METRICS,
        resolver::metrics_defs::ALL_METRICS,
        notifier::metrics_defs::ALL_METRICS,
        gateway::metrics_defs::ALL_METRICS,
    ] {
        describe_all(defs);
    }

    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "Statsd metrics enabled"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_dsn_is_an_error() {
        let config = LoggingConfig {
            sentry_dsn: Some("not a dsn".into()),
            level: "info".into(),
        };
        assert!(matches!(
            init_logging(Some(&config)),
            Err(ObservabilityError::SentryDsn(_))
        ));
    }
}
