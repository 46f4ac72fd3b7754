//! netbin server binary.
//!
//! Wires configuration, logging, and the tokio runtime together, then
//! serves the TCP ingestion and HTTP retrieval listeners until one of
//! them fails.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use netbin::config::Config;
use netbin::http::HttpServer;
use netbin::store::PasteStore;
use netbin::tcp::TcpServer;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        tcp = %config.tcp_listen,
        http = %config.http_listen,
        workers = ?config.workers,
        "Starting netbin server"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.build()?;

    runtime.block_on(serve(config))
}

/// Serve both listeners; a failure in either brings the process down.
async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let store = PasteStore::new();

    let tcp = TcpServer::bind(&config.tcp_listen, Arc::clone(&store)).await?;
    let http = HttpServer::bind(&config.http_listen, store).await?;

    tokio::try_join!(tcp.run(), http.run())?;
    Ok(())
}
