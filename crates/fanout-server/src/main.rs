//! WebSocket fan-out hub server.

use fanout_server::config::Config;
use fanout_server::server;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    tracing::info!(
        bind_addr = %config.bind_addr,
        ws_port = config.ws_port,
        rpc_port = config.rpc_port,
        "starting fanout-server"
    );

    if let Err(e) = server::run(config).await {
        error!(error = ?e, "server stopped");
        return Err(e);
    }
    Ok(())
}
