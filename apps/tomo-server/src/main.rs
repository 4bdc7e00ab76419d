use std::sync::Arc;
use tomo_server::config::ServerConfig;
use tomo_server::context::AppContext;
use tomo_server::http::HttpServer;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Parse CLI args for config file path
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tomo.yaml".to_string());

    tracing::info!("Loading configuration from: {}", config_path);

    // Load configuration (try file first, fall back to env)
    let config = if std::path::Path::new(&config_path).exists() {
        ServerConfig::load_from_file(&config_path)?
    } else {
        tracing::warn!("Config file not found, loading from environment variables");
        ServerConfig::load_from_env()?
    };

    tracing::info!("Corpus: {}", config.corpus.display());
    tracing::info!("HTTP address: {}", config.http_addr);

    // The embedding and generation clients block; build them before the
    // runtime exists and drop them after it is gone.
    let context = Arc::new(AppContext::from_config(&config)?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(serve(&config, Arc::clone(&context)));
    drop(runtime);
    drop(context);

    result
}

async fn serve(config: &ServerConfig, context: Arc<AppContext>) -> anyhow::Result<()> {
    let mut server = HttpServer::new(config.socket_addr()?, context).with_cors(config.enable_cors);
    server.start().await?;

    tracing::info!("Tomo server is ready");

    // Wait for shutdown signal (SIGINT/SIGTERM)
    tokio::signal::ctrl_c().await?;

    tracing::info!("Received shutdown signal, gracefully shutting down...");

    server.shutdown().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
