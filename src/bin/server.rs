//! Process entry point: binds the PostgreSQL wire endpoint and serves
//! connections against one shared, in-memory `Database` (§1 "out of
//! scope: ... the command-line entry point, process signal handling").

use std::sync::Arc;

use mskql::wire::MskqlHandlerFactory;
use mskql::{Config, Database};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::from_env();
    let db = Arc::new(Mutex::new(Database::new("mskql")));
    let factory = Arc::new(MskqlHandlerFactory::new(db, config.max_message_bytes));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr, max_clients = config.max_clients, "mskql listening");

    let semaphore = Arc::new(tokio::sync::Semaphore::new(config.max_clients));

    let mut shutdown = std::pin::pin!(shutdown_signal());
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received, stopping accept loop");
                break;
            }
            accepted = listener.accept() => {
                let (socket, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };
                let permit = semaphore.clone().acquire_owned().await?;
                let factory = factory.clone();
                tokio::spawn(async move {
                    tracing::debug!(%peer, "client connected");
                    if let Err(e) = pgwire::tokio::process_socket(socket, None, factory).await {
                        tracing::warn!(%peer, error = %e, "connection ended with error");
                    }
                    drop(permit);
                });
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
