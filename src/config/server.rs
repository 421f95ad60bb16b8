use std::path::PathBuf;

use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::SecretString;

use crate::config::helpers::{optional_env, parse_optional_env, validate_http_url};
use crate::error::ConfigError;
use crate::settings::Settings;

pub const DEFAULT_PORT: u16 = 4000;
const DEFAULT_HOST: &str = "0.0.0.0";

/// HTTP API listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Public URL of this service. Advertised to dApps and used to build the
    /// relay bridge callback URL.
    pub base_url: String,
    /// Directory served as static files. Disabled when unset.
    pub public_dir: Option<PathBuf>,
    /// Bearer token guarding `/wallet/*`. Open when unset.
    pub api_token: Option<SecretString>,
    /// Bearer token the relay bridge presents on `/relay/events`. Handed to
    /// the bridge when it is initialized. Open when unset.
    pub events_token: Option<SecretString>,
}

impl ServerConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let host = optional_env("HOST")?
            .or_else(|| settings.server.host.clone())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = parse_optional_env::<u16>("PORT", "a valid port number")?
            .or(settings.server.port)
            .unwrap_or(DEFAULT_PORT);

        let base_url = optional_env("BASE_URL")?
            .or_else(|| settings.server.base_url.clone())
            .unwrap_or_else(|| format!("http://localhost:{port}"));
        validate_http_url("BASE_URL", &base_url)?;

        let public_dir = optional_env("PUBLIC_DIR")?
            .map(PathBuf::from)
            .or_else(|| settings.server.public_dir.clone());

        let api_token = optional_env("WALLET_API_TOKEN")?.map(SecretString::from);
        // With the API locked down, relay events need a credential too.
        let events_token = match optional_env("RELAY_EVENTS_TOKEN")? {
            Some(token) => Some(SecretString::from(token)),
            None if api_token.is_some() => Some(generate_events_token()),
            None => None,
        };

        Ok(Self {
            host,
            port,
            base_url: base_url.trim_end_matches('/').to_string(),
            public_dir,
            api_token,
            events_token,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Where the relay bridge should push inbound events.
    pub fn events_url(&self) -> String {
        format!("{}/relay/events", self.base_url)
    }
}

fn generate_events_token() -> SecretString {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    SecretString::from(hex::encode(bytes))
}
