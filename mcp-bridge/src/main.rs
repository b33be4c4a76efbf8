//! mcp-bridge binary: configure from the environment and serve until shutdown.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use mcp_bridge::{BridgeConfig, BridgeService, transport};

/// Initialize tracing with BRIDGE_LOG and LOG_FORMAT support.
fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let base_level = match std::env::var("BRIDGE_LOG").as_deref() {
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("mcp_bridge={level}", level = base_level))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = BridgeConfig::from_env()?;
    tracing::info!(
        version = mcp_bridge::BRIDGE_VERSION,
        host = %config.host,
        port = config.port,
        call_timeout_ms = config.call_timeout.as_millis() as u64,
        "Starting mcp-bridge"
    );

    let service = BridgeService::spawn(&config);
    transport::serve(config.server_config(), service).await
}
