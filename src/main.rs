#![cfg_attr(not(test), deny(clippy::panic))]

use clap::Parser;
use mafia_server::config::Config;
use mafia_server::server::GameServer;
use mafia_server::{logging, websocket};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::Duration;

/// How long in-flight connections get to finish after a shutdown signal.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);

/// Mafia server -- authoritative game server with SFU voice signaling
#[derive(Parser, Debug)]
#[command(name = "mafia-server")]
#[command(about = "Authoritative WebSocket server for a real-time social-deduction game")]
#[command(version)]
struct Cli {
    /// Print the loaded configuration to stdout (as JSON) and exit.
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(Config::load());

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&*config)?);
        return Ok(());
    }

    logging::init(&config);

    let addr: SocketAddr = config
        .addr()
        .parse()
        .map_err(|err| anyhow::anyhow!("invalid listen address {}: {err}", config.addr()))?;

    tracing::info!(
        %addr,
        env = ?config.env,
        static_dir = %config.static_dir,
        "starting server"
    );

    let server = GameServer::new(Arc::clone(&config));
    let app = websocket::create_router(Arc::clone(&server));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let serve_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down server");

    // Close the listener and give in-flight connections a bounded drain.
    let _ = shutdown_tx.send(());
    match tokio::time::timeout(SHUTDOWN_DRAIN, serve_task).await {
        Ok(result) => result??,
        Err(_) => tracing::warn!(
            drain_secs = SHUTDOWN_DRAIN.as_secs(),
            "drain window elapsed, forcing shutdown"
        ),
    }

    server.shutdown();
    tracing::info!("server stopped");
    Ok(())
}
