//! walletbridge: an operator-controlled EVM wallet that pairs with dApps over
//! a session relay.
//!
//! A single [`broker::SessionBroker`] task owns the wallet identity, the active
//! session and every pending proposal or request. The HTTP API in [`server`]
//! and the inbound relay events both talk to it through its handle; signing
//! happens in [`wallet`] and node access goes through [`rpc`].

pub mod bootstrap;
pub mod broker;
pub mod cli;
pub mod config;
pub mod error;
pub mod relay;
pub mod rpc;
pub mod server;
pub mod settings;
pub mod testing;
pub mod wallet;

pub use config::Config;
pub use error::{BrokerError, ConfigError};
