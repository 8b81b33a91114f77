//! Spacegate Gateway - storage gateway server

use clap::Parser;
use spacegate_cli::{run_server_with_shutdown, ServerConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "spacegate-gateway")]
#[command(about = "Storage gateway routing requests to storage providers")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "SPACEGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(short = 'H', long, env = "SPACEGATE_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "SPACEGATE_PORT")]
    port: Option<u16>,

    /// Public endpoint of the data gateway, put in transfer tokens' place
    #[arg(long, env = "SPACEGATE_DATA_GATEWAY_ENDPOINT")]
    data_gateway_endpoint: Option<String>,

    /// Secret signing transfer tokens
    #[arg(long, env = "SPACEGATE_TRANSFER_SECRET", hide_env_values = true)]
    transfer_secret: Option<String>,

    /// Secret signing session tokens
    #[arg(long, env = "SPACEGATE_TOKEN_SECRET", hide_env_values = true)]
    token_secret: Option<String>,

    /// Run every collaborator in-process (data will not persist)
    #[arg(long, env = "SPACEGATE_MEMORY_BACKENDS")]
    memory_backends: bool,

    /// Disable authentication (for development only!)
    #[arg(long, env = "SPACEGATE_NO_AUTH")]
    no_auth: bool,

    /// Enable debug logging
    #[arg(short, long, env = "SPACEGATE_DEBUG")]
    debug: bool,

    /// Log as JSON lines
    #[arg(long, env = "SPACEGATE_LOG_JSON")]
    log_json: bool,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("spacegate_cli={log_level},spacegate_core={log_level},tower_http=debug").into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let mut config = ServerConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(endpoint) = args.data_gateway_endpoint {
        config.gateway.data_gateway_endpoint = endpoint;
    }
    if let Some(secret) = args.transfer_secret {
        config.gateway.transfer_shared_secret = secret;
    }
    if let Some(secret) = args.token_secret {
        config.gateway.token_secret = secret;
    }
    config.memory_backends |= args.memory_backends;
    if args.no_auth {
        config.auth_enabled = false;
        tracing::warn!("Authentication is DISABLED - for development only!");
    }

    tracing::info!(
        bind = %config.bind_addr(),
        data_gateway = %config.gateway.data_gateway_endpoint,
        "Starting Spacegate gateway"
    );

    run_server_with_shutdown(config, shutdown_signal()).await
}
