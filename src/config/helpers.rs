use std::str::FromStr;

use crate::error::ConfigError;

/// Read an env var, treating unset and blank values alike.
pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be valid UTF-8".to_string(),
        }),
    }
}

/// Read an env var that must be present.
pub(crate) fn required_env(key: &str, hint: &str) -> Result<String, ConfigError> {
    optional_env(key)?.ok_or_else(|| ConfigError::MissingRequired {
        key: key.to_string(),
        hint: hint.to_string(),
    })
}

/// Parse an optional env var with `FromStr`, reporting `expected` on failure.
pub(crate) fn parse_optional_env<T>(key: &str, expected: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)?
        .map(|s| s.parse::<T>())
        .transpose()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be {expected}: {e}"),
        })
}

/// Split a comma-separated list, dropping empty items.
pub(crate) fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

/// Check that `value` is an absolute http(s) URL.
pub(crate) fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("must be a valid URL: {e}"),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected an http or https URL, got scheme '{other}'"),
        }),
    }
}

/// Milliseconds that must be non-zero.
pub(crate) fn positive_ms(key: &str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be > 0".to_string(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_lists() {
        assert_eq!(
            parse_list(" anvil_sign, ,eth_accounts "),
            vec!["anvil_sign".to_string(), "eth_accounts".to_string()]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn validates_urls() {
        assert!(validate_http_url("JSON_RPC_URL", "http://127.0.0.1:8545").is_ok());
        assert!(validate_http_url("JSON_RPC_URL", "https://rpc.example.org/v1").is_ok());
        assert!(validate_http_url("JSON_RPC_URL", "ws://127.0.0.1:8545").is_err());
        assert!(validate_http_url("JSON_RPC_URL", "localhost").is_err());
    }

    #[test]
    fn rejects_zero_timeouts() {
        assert_eq!(positive_ms("RPC_TIMEOUT_MS", 10).unwrap(), 10);
        assert!(matches!(
            positive_ms("RPC_TIMEOUT_MS", 0),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
