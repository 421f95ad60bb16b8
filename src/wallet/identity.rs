//! The wallet identity the broker acts as.

use std::fmt;

use bip39::Mnemonic;
use k256::ecdsa::SigningKey;
use secrecy::{ExposeSecret, SecretString};

use super::Address;
use super::keys::{ETHEREUM_DERIVATION_PATH, WordCount, derive_signing_key, generate_mnemonic};
use crate::error::KeyError;

/// Where the mnemonic of a key identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MnemonicSource {
    Provided,
    Generated,
}

impl MnemonicSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provided => "provided",
            Self::Generated => "generated",
        }
    }
}

/// A wallet that holds its own private key.
pub struct KeyIdentity {
    address: Address,
    signing_key: SigningKey,
    mnemonic: SecretString,
    source: MnemonicSource,
}

impl KeyIdentity {
    /// Derive the first Ethereum account of `mnemonic`.
    pub fn from_mnemonic(mnemonic: &Mnemonic, source: MnemonicSource) -> Result<Self, KeyError> {
        let signing_key = derive_signing_key(mnemonic, ETHEREUM_DERIVATION_PATH)?;
        Ok(Self {
            address: Address::from_verifying_key(signing_key.verifying_key()),
            signing_key,
            mnemonic: SecretString::from(mnemonic.to_string()),
            source,
        })
    }

    /// Parse `phrase`, or generate a fresh mnemonic when it is `None`.
    pub fn create(phrase: Option<&str>, words: WordCount) -> Result<Self, KeyError> {
        match phrase {
            Some(phrase) => {
                let mnemonic = super::keys::parse_mnemonic(phrase)?;
                Self::from_mnemonic(&mnemonic, MnemonicSource::Provided)
            }
            None => {
                let mnemonic = generate_mnemonic(words)?;
                Self::from_mnemonic(&mnemonic, MnemonicSource::Generated)
            }
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn mnemonic(&self) -> &SecretString {
        &self.mnemonic
    }

    pub fn source(&self) -> MnemonicSource {
        self.source
    }

    /// Mnemonic word count, for logs that must not reveal the phrase.
    pub fn word_count(&self) -> usize {
        self.mnemonic.expose_secret().split_whitespace().count()
    }
}

impl fmt::Debug for KeyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyIdentity")
            .field("address", &self.address)
            .field("signing_key", &"[REDACTED]")
            .field("mnemonic", &"[REDACTED]")
            .field("source", &self.source)
            .finish()
    }
}

/// A wallet whose signing is delegated to a development node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImpersonatedIdentity {
    address: Address,
}

impl ImpersonatedIdentity {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

/// The single live wallet identity.
#[derive(Debug)]
pub enum WalletIdentity {
    Key(KeyIdentity),
    Impersonated(ImpersonatedIdentity),
}

impl WalletIdentity {
    pub fn address(&self) -> Address {
        match self {
            Self::Key(identity) => identity.address(),
            Self::Impersonated(identity) => identity.address(),
        }
    }

    pub fn is_impersonated(&self) -> bool {
        matches!(self, Self::Impersonated(_))
    }
}
