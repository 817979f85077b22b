use std::{net::SocketAddr, process::ExitCode, sync::Arc};

use clap::Parser;
use lms_axum::AuthConfig;
use lms_mailer::{ConfigError, DeliveryConfig, DeliveryOrchestrator};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Command line interface for the LMS email service
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(clap::Subcommand)]
enum Commands {
    /// Serve the email API
    Serve {
        /// Port to listen on
        #[arg(long, env = "PORT", default_value_t = 8000)]
        port: u16,

        /// Secret used to verify access tokens
        #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
        jwt_secret: Option<String>,
    },
    /// Check the connection to the primary and fallback SMTP providers
    Verify,
    /// Print version information
    Version,
}

#[derive(Debug, Error)]
enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} of 2 SMTP providers failed verification")]
    Verification(usize),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { port, jwt_secret } => serve(port, jwt_secret).await,
        Commands::Verify => verify().await,
        Commands::Version => {
            println!("LMS email service v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exiting");
            ExitCode::FAILURE
        }
    }
}

async fn serve(port: u16, jwt_secret: Option<String>) -> Result<(), ServerError> {
    let jwt_secret = jwt_secret
        .filter(|secret| !secret.is_empty())
        .ok_or_else(|| ConfigError::Missing("JWT_SECRET".to_string()))?;
    let config = DeliveryConfig::from_env()?;

    tracing::info!(
        primary = %config.primary.host,
        fallback = %config.fallback.host,
        max_retries = config.max_retries,
        retry_delay_ms = config.retry_delay_ms,
        "Email delivery configured"
    );

    let orchestrator = Arc::new(DeliveryOrchestrator::smtp(config));
    let app: axum::Router = lms_axum::routes(orchestrator, AuthConfig::new(jwt_secret)).build();

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn verify() -> Result<(), ServerError> {
    let orchestrator = DeliveryOrchestrator::smtp(DeliveryConfig::from_env()?);

    let mut failures = 0;
    for (provider, result) in orchestrator.verify().await {
        match result {
            Ok(true) => println!("{provider}: ok"),
            Ok(false) => {
                failures += 1;
                println!("{provider}: connection refused");
            }
            Err(e) => {
                failures += 1;
                println!("{provider}: {e}");
            }
        }
    }

    if failures > 0 {
        return Err(ServerError::Verification(failures));
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
