//! Configuration for walletbridge.
//!
//! Settings are loaded with priority: env var > TOML file > default.
//! `./.env` and `~/.walletbridge/.env` are loaded via dotenvy early in
//! startup; `~/.walletbridge/config.toml` fills in anything still unset.

pub(crate) mod helpers;
mod relay;
mod server;
mod wallet;

use std::path::{Path, PathBuf};

use crate::broker::{BrokerSettings, NamespacePolicy};
use crate::error::ConfigError;
use crate::settings::Settings;

pub use self::relay::{RelayConfig, RpcConfig};
pub use self::server::{DEFAULT_PORT, ServerConfig};
pub use self::wallet::WalletConfig;

/// Main configuration for the wallet service.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub relay: RelayConfig,
    pub rpc: RpcConfig,
    pub wallet: WalletConfig,
}

impl Config {
    /// Load configuration from env files, the process environment and the
    /// default TOML file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_toml(None)
    }

    /// Load with an explicit TOML path. A missing explicit file is an error.
    pub fn from_env_with_toml(toml_path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        crate::bootstrap::load_walletbridge_env();
        let settings = Self::load_settings(toml_path)?;
        Self::build(&settings)
    }

    /// Load the TOML overlay.
    ///
    /// If `explicit_path` is `Some`, loads from that path (errors are fatal).
    /// If `None`, tries `~/.walletbridge/config.toml` (a missing or broken
    /// file is logged and ignored).
    pub fn load_settings(explicit_path: Option<&Path>) -> Result<Settings, ConfigError> {
        let path = explicit_path
            .map(PathBuf::from)
            .unwrap_or_else(Settings::default_toml_path);

        match Settings::load_toml(&path) {
            Ok(Some(settings)) => {
                tracing::debug!("Loaded TOML config from {}", path.display());
                Ok(settings)
            }
            Ok(None) if explicit_path.is_some() => Err(ConfigError::ParseError(format!(
                "Config file not found: {}",
                path.display()
            ))),
            Ok(None) => Ok(Settings::default()),
            Err(e) if explicit_path.is_some() => Err(ConfigError::ParseError(e)),
            Err(e) => {
                tracing::warn!("Failed to load default config file: {}", e);
                Ok(Settings::default())
            }
        }
    }

    /// Resolve every section against the environment and `settings`.
    pub fn build(settings: &Settings) -> Result<Self, ConfigError> {
        let server = ServerConfig::resolve(settings)?;
        let relay = RelayConfig::resolve(settings, &server.base_url)?;
        Ok(Self {
            relay,
            rpc: RpcConfig::resolve(settings)?,
            wallet: WalletConfig::resolve(settings)?,
            server,
        })
    }

    pub fn broker_settings(&self) -> BrokerSettings {
        BrokerSettings {
            policy: NamespacePolicy {
                rpc_url: self.rpc.url.clone(),
                reserved_methods: self.wallet.reserved_methods.clone(),
            },
            word_count: self.wallet.word_count,
            queue_capacity: self.wallet.queue_capacity,
        }
    }
}
