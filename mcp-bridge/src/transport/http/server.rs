//! HTTP listener and shutdown wiring.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::service::BridgeService;

use super::routes::routes;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// What ended the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopCause {
    Interrupt,
    Terminate,
    Requested,
}

/// Bind `config.host:config.port` and serve until a stop signal arrives.
pub async fn serve(config: ServerConfig, service: Arc<BridgeService>) -> anyhow::Result<()> {
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    serve_listener(listener, service).await
}

/// Serve on an already-bound listener. Stops the child once the server is down.
pub async fn serve_listener(
    listener: TcpListener,
    service: Arc<BridgeService>,
) -> anyhow::Result<()> {
    let stop_rx = service.shutdown_rx();
    let addr = listener.local_addr()?;
    info!(%addr, "MCP bridge listening");

    axum::serve(listener, routes(Arc::clone(&service)))
        .with_graceful_shutdown(async move {
            let cause = stop_signal(stop_rx).await;
            info!(?cause, "Stopping HTTP server");
        })
        .await?;

    service.shutdown().await;
    info!("MCP bridge stopped");
    Ok(())
}

/// Resolves on SIGINT, SIGTERM (unix) or a `/shutdown` request.
///
/// A signal whose handler cannot be installed is logged and never fires.
async fn stop_signal(mut stop_rx: watch::Receiver<bool>) -> StopCause {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    // A dropped sender means the service is gone; nobody can ask any more.
    let requested = async {
        let closed = stop_rx.wait_for(|stop| *stop).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = interrupt => StopCause::Interrupt,
        _ = terminate => StopCause::Terminate,
        _ = requested => StopCause::Requested,
    }
}
