use std::time::Duration;

use secrecy::SecretString;

use crate::config::helpers::{
    optional_env, parse_optional_env, positive_ms, required_env, validate_http_url,
};
use crate::error::ConfigError;
use crate::relay::WalletMetadata;
use crate::settings::Settings;

const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:4100";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_WALLET_NAME: &str = "CLI & HTTP Wallet";
const DEFAULT_WALLET_DESCRIPTION: &str = "A CLI & HTTP API-controlled Ethereum wallet";
const DEFAULT_WALLET_ICON: &str = "https://walletconnect.org/walletconnect-logo.png";

/// Relay bridge sidecar configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub project_id: SecretString,
    pub bridge_url: String,
    pub timeout: Duration,
    pub metadata: WalletMetadata,
}

impl RelayConfig {
    pub(crate) fn resolve(settings: &Settings, base_url: &str) -> Result<Self, ConfigError> {
        let project_id = required_env(
            "WALLET_CONNECT_PROJECT_ID",
            "Create a project id in the WalletConnect dashboard and export it.",
        )?;

        let bridge_url = optional_env("RELAY_BRIDGE_URL")?
            .or_else(|| settings.relay.bridge_url.clone())
            .unwrap_or_else(|| DEFAULT_BRIDGE_URL.to_string());
        validate_http_url("RELAY_BRIDGE_URL", &bridge_url)?;

        let timeout_ms = parse_optional_env::<u64>("RELAY_TIMEOUT_MS", "a positive integer")?
            .or(settings.relay.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        let meta = &settings.metadata;
        let metadata = WalletMetadata {
            name: meta
                .name
                .clone()
                .unwrap_or_else(|| DEFAULT_WALLET_NAME.to_string()),
            description: meta
                .description
                .clone()
                .unwrap_or_else(|| DEFAULT_WALLET_DESCRIPTION.to_string()),
            url: meta.url.clone().unwrap_or_else(|| base_url.to_string()),
            icons: meta
                .icons
                .clone()
                .unwrap_or_else(|| vec![DEFAULT_WALLET_ICON.to_string()]),
        };

        Ok(Self {
            project_id: SecretString::from(project_id),
            bridge_url,
            timeout: Duration::from_millis(positive_ms("RELAY_TIMEOUT_MS", timeout_ms)?),
            metadata,
        })
    }
}

/// JSON-RPC node configuration.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub url: String,
    pub timeout: Duration,
}

impl RpcConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let url = match optional_env("JSON_RPC_URL")? {
            Some(url) => url,
            None => settings
                .rpc
                .url
                .clone()
                .ok_or_else(|| ConfigError::MissingRequired {
                    key: "JSON_RPC_URL".to_string(),
                    hint: "Point it at the node the wallet signs for, e.g. http://127.0.0.1:8545."
                        .to_string(),
                })?,
        };
        validate_http_url("JSON_RPC_URL", &url)?;

        let timeout_ms = parse_optional_env::<u64>("RPC_TIMEOUT_MS", "a positive integer")?
            .or(settings.rpc.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        Ok(Self {
            url,
            timeout: Duration::from_millis(positive_ms("RPC_TIMEOUT_MS", timeout_ms)?),
        })
    }
}
