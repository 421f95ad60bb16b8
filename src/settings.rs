//! File-backed settings overlay.
//!
//! `~/.walletbridge/config.toml` supplies values that are not set in the
//! environment. Every field is optional: a missing key falls through to the
//! built-in default. Secrets (project id, API token) are only read from the
//! environment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub relay: RelaySettings,
    pub rpc: RpcSettings,
    pub wallet: WalletSettings,
    pub metadata: MetadataSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub base_url: Option<String>,
    pub public_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    pub bridge_url: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcSettings {
    pub url: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletSettings {
    /// 12 or 24.
    pub mnemonic_word_count: Option<u32>,
    pub reserved_methods: Option<Vec<String>>,
    pub queue_capacity: Option<usize>,
}

/// Wallet metadata advertised to dApps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSettings {
    pub name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub icons: Option<Vec<String>>,
}

impl Settings {
    /// Default TOML config path: `~/.walletbridge/config.toml`.
    pub fn default_toml_path() -> PathBuf {
        crate::bootstrap::walletbridge_home().join("config.toml")
    }

    /// Load settings from a TOML file.
    ///
    /// Returns `None` if the file doesn't exist. Returns an error only
    /// if the file exists but can't be read or parsed.
    pub fn load_toml(path: &Path) -> Result<Option<Self>, String> {
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("failed to read {}: {}", path.display(), e)),
        };

        toml::from_str(&data)
            .map(Some)
            .map_err(|e| format!("invalid TOML in {}: {}", path.display(), e))
    }
}
