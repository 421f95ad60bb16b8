//! Error types for walletbridge.

use serde::Serialize;

/// Configuration-related errors. Fatal at startup only.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP server errors. Fatal at startup only.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Server failed to start: {reason}")]
    StartupFailed { reason: String },
}

/// Relay bridge errors (pairing, session settlement, responses).
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Relay {operation} failed: {reason}")]
    RequestFailed { operation: String, reason: String },

    #[error("Relay {operation} returned status {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from relay for {operation}: {reason}")]
    InvalidResponse { operation: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// JSON-RPC node errors.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("RPC {method} failed with code {code}: {message}")]
    Node {
        method: String,
        code: i64,
        message: String,
    },

    #[error("RPC {method} returned an invalid response: {reason}")]
    InvalidResponse { method: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Signer backend errors.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("{0}")]
    Unsupported(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Node rejected transaction: {0}")]
    Rpc(#[from] RpcError),
}

/// Key material errors raised while building a wallet identity.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Mnemonic generation failed: {0}")]
    Generation(String),

    #[error("Key derivation failed: {0}")]
    Derivation(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// Operation-level errors returned by the session broker.
///
/// None of these are process-fatal: the command boundary turns them into a
/// structured failure for the caller.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("{0}")]
    NotInitialized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    UnsupportedOperation(String),

    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("{0} not implemented")]
    NotImplemented(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Non conforming namespaces: {0}")]
    NonConformingNamespaces(String),

    #[error("{0}")]
    AlreadyInProgress(String),

    #[error("{0}")]
    CollaboratorFailure(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Session broker is not running")]
    Unavailable,
}

impl From<RelayError> for BrokerError {
    fn from(err: RelayError) -> Self {
        Self::CollaboratorFailure(err.to_string())
    }
}

impl From<RpcError> for BrokerError {
    fn from(err: RpcError) -> Self {
        Self::CollaboratorFailure(err.to_string())
    }
}

impl From<SignerError> for BrokerError {
    fn from(err: SignerError) -> Self {
        match err {
            SignerError::Unsupported(message) => Self::UnsupportedOperation(message),
            SignerError::InvalidTransaction(message) => Self::InvalidRequest(message),
            other => Self::CollaboratorFailure(other.to_string()),
        }
    }
}

impl From<KeyError> for BrokerError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::Generation(_) => Self::ConfigurationError(err.to_string()),
            other => Self::InvalidRequest(other.to_string()),
        }
    }
}

/// Structured error payload for command-surface consumers.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorPayload {
    pub code: &'static str,
    pub retryable: bool,
    #[serde(rename = "error")]
    pub message: String,
}

impl BrokerError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInitialized(_) => "not_initialized",
            Self::NotFound(_) => "not_found",
            Self::UnsupportedOperation(_) => "unsupported_operation",
            Self::UnsupportedMethod(_) => "unsupported_method",
            Self::NotImplemented(_) => "not_implemented",
            Self::InvalidRequest(_) => "invalid_request",
            Self::NonConformingNamespaces(_) => "non_conforming_namespaces",
            Self::AlreadyInProgress(_) => "already_in_progress",
            Self::CollaboratorFailure(_) => "collaborator_failure",
            Self::ConfigurationError(_) => "configuration_error",
            Self::Unavailable => "unavailable",
        }
    }

    /// Whether repeating the same command later could succeed.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::AlreadyInProgress(_) | Self::CollaboratorFailure(_) | Self::Unavailable
        )
    }

    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code(),
            retryable: self.retryable(),
            message: self.to_string(),
        }
    }
}

/// Result type alias for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
