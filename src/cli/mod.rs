//! Command-line interface.
//!
//! `serve` runs the wallet service. Every other command (except `doctor`)
//! is a client of a running service's HTTP API.

pub mod client;
pub mod doctor;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use crossterm::style::Stylize;
use serde_json::{Value, json};

use self::client::{ApiClient, has_pending_proposal};

#[derive(Parser, Debug)]
#[command(
    name = "walletbridge",
    version,
    about = "Operator-controlled EVM wallet for dApps over a session relay"
)]
pub struct Cli {
    /// Output raw JSON without formatting
    #[arg(long, global = true)]
    pub raw: bool,

    /// Base URL of a running wallet service
    #[arg(long, global = true, env = "WALLET_API_URL")]
    pub api_url: Option<String>,

    /// Bearer token for the wallet API
    #[arg(long, global = true, env = "WALLET_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the wallet service (broker and HTTP API)
    Serve {
        /// TOML config file (default: ~/.walletbridge/config.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create a new wallet
    Create {
        /// Optional mnemonic phrase
        #[arg(short, long)]
        mnemonic: Option<String>,
        /// Optional address to impersonate
        #[arg(short, long)]
        address: Option<String>,
    },

    /// Connect to a dApp using a pairing URI
    Connect {
        /// Pairing URI
        #[arg(short, long)]
        uri: String,
        /// Only pair; approve the proposal later with `approve-session`
        #[arg(long)]
        no_approve: bool,
        /// How long to wait for the dApp's session proposal
        #[arg(long, default_value_t = 30)]
        wait_secs: u64,
    },

    /// Approve the pending session proposal
    ApproveSession,

    /// Reject the pending session proposal
    RejectSession,

    /// Approve a pending request
    ApproveRequest {
        /// Request id (defaults to the most recent request)
        #[arg(short, long)]
        id: Option<String>,
    },

    /// Reject a pending request
    RejectRequest {
        /// Request id (defaults to the most recent request)
        #[arg(short, long)]
        id: Option<String>,
    },

    /// Show wallet status
    Status,

    /// Check configuration and collaborator reachability
    Doctor,
}

/// Default API URL: `http://localhost:$PORT`.
pub fn default_api_url() -> String {
    let port = crate::config::helpers::optional_env("PORT")
        .ok()
        .flatten()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(crate::config::DEFAULT_PORT);
    format!("http://localhost:{port}")
}

fn print_output(title: &str, data: &Value, raw: bool) {
    if raw {
        println!("{data}");
        return;
    }
    println!("{}", title.green());
    match serde_json::to_string_pretty(data) {
        Ok(pretty) => println!("{pretty}"),
        Err(_) => println!("{data}"),
    }
}

fn selector(id: Option<String>) -> Value {
    match id {
        Some(id) => json!({ "requestId": id }),
        None => json!({}),
    }
}

/// Run one of the API client commands.
pub async fn run_client_command(
    command: Command,
    api_url: Option<String>,
    token: Option<String>,
    raw: bool,
) -> anyhow::Result<()> {
    let api_url = api_url.unwrap_or_else(default_api_url);
    let client = ApiClient::new(&api_url, token)?;

    match command {
        Command::Create { mnemonic, address } => {
            let mut payload = serde_json::Map::new();
            if let Some(mnemonic) = mnemonic {
                payload.insert("mnemonic".to_string(), json!(mnemonic));
            }
            if let Some(address) = address {
                payload.insert("address".to_string(), json!(address));
            }
            let data = client.post("/wallet/create", Value::Object(payload)).await?;
            print_output("Wallet created successfully:", &data, raw);
        }
        Command::Connect {
            uri,
            no_approve,
            wait_secs,
        } => {
            let data = client.post("/wallet/connect", json!({ "uri": uri })).await?;
            print_output("Connection initiated:", &data, raw);
            if !no_approve {
                wait_for_proposal(&client, Duration::from_secs(wait_secs)).await?;
                let data = client.post("/wallet/approve-session", json!({})).await?;
                print_output("Session approved:", &data, raw);
            }
        }
        Command::ApproveSession => {
            let data = client.post("/wallet/approve-session", json!({})).await?;
            print_output("Session approved:", &data, raw);
        }
        Command::RejectSession => {
            let data = client.post("/wallet/reject-session", json!({})).await?;
            print_output("Session rejected:", &data, raw);
        }
        Command::ApproveRequest { id } => {
            let data = client.post("/wallet/approve-request", selector(id)).await?;
            print_output("Request approved:", &data, raw);
        }
        Command::RejectRequest { id } => {
            let data = client.post("/wallet/reject-request", selector(id)).await?;
            print_output("Request rejected:", &data, raw);
        }
        Command::Status => {
            let data = client.get("/wallet/status").await?;
            print_output("Wallet status:", &data, raw);
        }
        Command::Serve { .. } | Command::Doctor => {
            anyhow::bail!("not an API client command");
        }
    }
    Ok(())
}

async fn wait_for_proposal(client: &ApiClient, timeout: Duration) -> anyhow::Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let status = client.get("/wallet/status").await?;
        if has_pending_proposal(&status) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            anyhow::bail!(
                "no session proposal arrived within {}s; run `walletbridge approve-session` once it does",
                timeout.as_secs()
            );
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_request_commands() {
        let cli = Cli::try_parse_from(["walletbridge", "--raw", "approve-request", "-i", "42"])
            .unwrap();
        assert!(cli.raw);
        match cli.command {
            Command::ApproveRequest { id } => assert_eq!(id.as_deref(), Some("42")),
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::try_parse_from(["walletbridge", "connect", "-u", "wc:abc@2", "--no-approve"])
            .unwrap();
        match cli.command {
            Command::Connect {
                uri,
                no_approve,
                wait_secs,
            } => {
                assert_eq!(uri, "wc:abc@2");
                assert!(no_approve);
                assert_eq!(wait_secs, 30);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn connect_requires_uri() {
        assert!(Cli::try_parse_from(["walletbridge", "connect"]).is_err());
    }

    #[test]
    fn selector_omits_missing_id() {
        assert_eq!(selector(None), json!({}));
        assert_eq!(selector(Some("7".to_string())), json!({ "requestId": "7" }));
    }
}
