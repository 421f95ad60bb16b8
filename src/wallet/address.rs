//! EVM account addresses with EIP-55 checksum rendering.

use std::fmt;
use std::str::FromStr;

use k256::ecdsa::VerifyingKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::keccak256;
use crate::error::KeyError;

/// A 20-byte EVM account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Address of a secp256k1 public key: last 20 bytes of keccak256 over the
    /// uncompressed point without its `0x04` prefix.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let encoded = key.to_encoded_point(false);
        let digest = keccak256(&[&encoded.as_bytes()[1..]]);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[12..]);
        Self(out)
    }

    /// Parse a `0x`-prefixed 40-digit hex address.
    ///
    /// All-lowercase and all-uppercase inputs are accepted as-is. Mixed-case
    /// inputs must carry a valid EIP-55 checksum.
    pub fn parse(value: &str) -> Result<Self, KeyError> {
        let trimmed = value.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| KeyError::InvalidAddress(format!("'{trimmed}' must be 0x-prefixed")))?;
        if digits.len() != 40 {
            return Err(KeyError::InvalidAddress(format!(
                "'{trimmed}' must have 40 hex digits"
            )));
        }
        let bytes = hex::decode(digits)
            .map_err(|e| KeyError::InvalidAddress(format!("'{trimmed}': {e}")))?;
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        let address = Self(out);

        let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
        if has_lower && has_upper && address.to_checksum()[2..] != *digits {
            return Err(KeyError::InvalidAddress(format!(
                "'{trimmed}' has an invalid EIP-55 checksum"
            )));
        }
        Ok(address)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// EIP-55 mixed-case rendering.
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = keccak256(&[lower.as_bytes()]);
        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_checksum())
    }
}

impl FromStr for Address {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_checksum())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
