use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use walletbridge::broker::SessionBroker;
use walletbridge::cli::{Cli, Command, doctor::run_doctor_command, run_client_command};
use walletbridge::config::Config;
use walletbridge::relay::HttpRelayBridge;
use walletbridge::rpc::HttpRpcClient;
use walletbridge::server::{router, start_server};

/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config } => {
            init_tracing("walletbridge=info,tower_http=info");
            serve(config).await
        }
        Command::Doctor => {
            init_tracing("walletbridge=warn");
            run_doctor_command().await
        }
        command => {
            init_tracing("walletbridge=warn");
            run_client_command(command, cli.api_url, cli.token, cli.raw).await
        }
    }
}

async fn serve(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = Config::from_env_with_toml(config_path.as_deref())?;

    let rpc = Arc::new(HttpRpcClient::new(
        config.rpc.url.clone(),
        config.rpc.timeout,
    ));
    let bridge = Arc::new(HttpRelayBridge::new(
        config.relay.bridge_url.clone(),
        config.relay.timeout,
    ));
    let (broker, broker_task) = SessionBroker::spawn(config.broker_settings(), bridge.clone(), rpc);

    let bind_addr = config.server.bind_addr();
    let addr: SocketAddr = tokio::net::lookup_host(&bind_addr)
        .await
        .with_context(|| format!("cannot resolve listen address {bind_addr}"))?
        .next()
        .with_context(|| format!("no address found for {bind_addr}"))?;

    let app = router(broker, &config.server);
    let (bound, server_task) = start_server(addr, app, shutdown_signal()).await?;

    // The API must be reachable before the bridge starts pushing events.
    bridge
        .init(
            &config.relay.project_id,
            &config.relay.metadata,
            &config.server.events_url(),
            config.server.events_token.as_ref(),
        )
        .await
        .context("relay bridge initialization failed")?;

    tracing::info!(
        addr = %bound,
        base_url = %config.server.base_url,
        rpc = %config.rpc.url,
        "Wallet service ready"
    );

    server_task.await.context("HTTP server task panicked")?;
    // The router held the last broker handles; the broker winds down now.
    if let Err(e) = broker_task.await {
        tracing::warn!(error = %e, "Broker task ended abnormally");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
