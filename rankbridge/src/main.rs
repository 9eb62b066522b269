mod config;
mod observability;

use clap::{Args, Parser};
use config::{Config, ConfigError};
use observability::ObservabilityError;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "rankbridge", about = "Group rank change API")]
enum CliCommand {
    /// Run the HTTP API
    Serve(ConfigArgs),
    /// Load and validate the config file, then exit
    ValidateConfig(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long, short, default_value = "rankbridge.yaml")]
    config: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] gateway::config::ValidationError),
    #[error(transparent)]
    Observability(#[from] ObservabilityError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Gateway(#[from] gateway::GatewayError),
}

fn main() -> ExitCode {
    let cli = CliCommand::parse();

    let result = match cli {
        CliCommand::Serve(args) => serve(args),
        CliCommand::ValidateConfig(args) => validate(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "Exiting");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn validate(args: ConfigArgs) -> Result<(), CliError> {
    let config = Config::from_file(&args.config)?;
    config.gateway.validate()?;
    println!("{} is valid", args.config.display());
    Ok(())
}

fn serve(args: ConfigArgs) -> Result<(), CliError> {
    let config = Config::from_file(&args.config)?;
    config.gateway.validate()?;

    let _sentry = observability::init_logging(config.common.logging.as_ref())?;
    if let Some(metrics) = &config.common.metrics {
        observability::init_metrics(metrics)?;
    }

    tracing::info!(config = %args.config.display(), "Starting rankbridge");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(gateway::run(config.gateway))?;

    Ok(())
}
