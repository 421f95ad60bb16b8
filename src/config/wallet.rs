use crate::config::helpers::{optional_env, parse_list, parse_optional_env};
use crate::error::ConfigError;
use crate::settings::Settings;
use crate::wallet::WordCount;

const DEFAULT_RESERVED_METHODS: &[&str] = &["anvil_sign"];
const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Wallet and broker behaviour.
#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub word_count: WordCount,
    /// Extension methods the wallet supports on top of what dApps request.
    pub reserved_methods: Vec<String>,
    pub queue_capacity: usize,
}

impl WalletConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let raw_words = optional_env("MNEMONIC_WORD_COUNT")?.or_else(|| {
            settings
                .wallet
                .mnemonic_word_count
                .map(|count| count.to_string())
        });
        let word_count = match raw_words {
            None => WordCount::default(),
            Some(raw) => WordCount::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "MNEMONIC_WORD_COUNT".to_string(),
                message: format!("expected 12 or 24, got '{raw}'"),
            })?,
        };

        let reserved_methods = match optional_env("RESERVED_METHODS")? {
            Some(raw) => parse_list(&raw),
            None => settings.wallet.reserved_methods.clone().unwrap_or_else(|| {
                DEFAULT_RESERVED_METHODS
                    .iter()
                    .map(|m| m.to_string())
                    .collect()
            }),
        };

        let queue_capacity =
            parse_optional_env::<usize>("BROKER_QUEUE_CAPACITY", "a positive integer")?
                .or(settings.wallet.queue_capacity)
                .unwrap_or(DEFAULT_QUEUE_CAPACITY);
        if queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "BROKER_QUEUE_CAPACITY".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        Ok(Self {
            word_count,
            reserved_methods,
            queue_capacity,
        })
    }
}
