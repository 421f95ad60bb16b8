//! `walletbridge doctor` - active health diagnostics.
//!
//! Validates configuration and checks the node and relay bridge so problems
//! surface before a dApp is waiting on the wallet.

use crossterm::style::Stylize;
use serde_json::json;

use crate::config::Config;
use crate::relay::HttpRelayBridge;
use crate::rpc::{HttpRpcClient, RpcClient, quantity_to_u64};

enum CheckResult {
    Pass(String),
    Fail(String),
    Skip(String),
}

fn check(name: &str, result: CheckResult, passed: &mut u32, failed: &mut u32) {
    match result {
        CheckResult::Pass(detail) => {
            *passed += 1;
            println!("  [{}] {name}: {detail}", "pass".green());
        }
        CheckResult::Fail(detail) => {
            *failed += 1;
            println!("  [{}] {name}: {detail}", "FAIL".red());
        }
        CheckResult::Skip(reason) => {
            println!("  [{}] {name}: {reason}", "skip".yellow());
        }
    }
}

/// Run diagnostic checks and print results.
pub async fn run_doctor_command() -> anyhow::Result<()> {
    println!("walletbridge doctor");
    println!("===================\n");

    let mut passed = 0u32;
    let mut failed = 0u32;

    let config = Config::from_env();
    match &config {
        Ok(config) => check(
            "Configuration",
            CheckResult::Pass(format!(
                "listening on {}, advertised as {}",
                config.server.bind_addr(),
                config.server.base_url
            )),
            &mut passed,
            &mut failed,
        ),
        Err(e) => check(
            "Configuration",
            CheckResult::Fail(e.to_string()),
            &mut passed,
            &mut failed,
        ),
    }

    match &config {
        Ok(config) => {
            check(
                "JSON-RPC node",
                check_rpc(config).await,
                &mut passed,
                &mut failed,
            );
            check(
                "Relay bridge",
                check_relay_bridge(config).await,
                &mut passed,
                &mut failed,
            );
            check(
                "API port",
                check_port_available(config),
                &mut passed,
                &mut failed,
            );
        }
        Err(_) => {
            for name in ["JSON-RPC node", "Relay bridge", "API port"] {
                check(
                    name,
                    CheckResult::Skip("configuration did not load".to_string()),
                    &mut passed,
                    &mut failed,
                );
            }
        }
    }

    println!("\n  {passed} passed, {failed} failed");
    if failed > 0 {
        anyhow::bail!("{failed} check(s) failed");
    }
    Ok(())
}

async fn check_rpc(config: &Config) -> CheckResult {
    let client = HttpRpcClient::new(config.rpc.url.clone(), config.rpc.timeout);
    match client.send("eth_chainId", json!([])).await {
        Ok(value) => match quantity_to_u64("eth_chainId", &value) {
            Ok(chain_id) => CheckResult::Pass(format!("{} (chain id {chain_id})", config.rpc.url)),
            Err(e) => CheckResult::Fail(e.to_string()),
        },
        Err(e) => CheckResult::Fail(format!("{} unreachable: {e}", config.rpc.url)),
    }
}

async fn check_relay_bridge(config: &Config) -> CheckResult {
    let bridge = HttpRelayBridge::new(config.relay.bridge_url.clone(), config.relay.timeout);
    match bridge.health().await {
        Ok(()) => CheckResult::Pass(format!("{} is healthy", bridge.base_url())),
        Err(e) => CheckResult::Fail(format!(
            "{e}; start the relay bridge or set RELAY_BRIDGE_URL"
        )),
    }
}

fn check_port_available(config: &Config) -> CheckResult {
    match std::net::TcpListener::bind(config.server.bind_addr()) {
        Ok(listener) => {
            drop(listener);
            CheckResult::Pass(format!("{} is available", config.server.bind_addr()))
        }
        Err(error) => CheckResult::Fail(format!(
            "{} is unavailable ({error}); stop the other process or change PORT",
            config.server.bind_addr()
        )),
    }
}
