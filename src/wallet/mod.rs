//! Wallet identities, key derivation and signer backends.

pub mod address;
pub mod identity;
pub mod keys;
pub mod rlp;
pub mod signer;
pub mod transaction;

pub use address::Address;
pub use identity::{ImpersonatedIdentity, KeyIdentity, WalletIdentity};
pub use keys::WordCount;
pub use signer::{ImpersonationSigner, KeySigner, Signer, SignerBackend};

use sha3::{Digest, Keccak256};

pub(crate) fn keccak256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Decode a `0x`-prefixed hex string. An empty payload (`0x`) decodes to no bytes.
pub(crate) fn decode_hex_prefixed(value: &str) -> Result<Vec<u8>, String> {
    let trimmed = value.trim();
    let Some(digits) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    else {
        return Err("hex string must be 0x-prefixed".to_string());
    };
    if !digits.len().is_multiple_of(2) {
        return Err("hex string must have an even number of characters".to_string());
    }
    hex::decode(digits).map_err(|e| format!("invalid hex: {e}"))
}

pub(crate) fn encode_hex_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_of_empty_input() {
        assert_eq!(
            encode_hex_prefixed(&keccak256(&[])),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn keccak_concatenates_parts() {
        assert_eq!(keccak256(&[b"hello ", b"world"]), keccak256(&[b"hello world"]));
    }

    #[test]
    fn hex_decoding_requires_prefix_and_even_length() {
        assert_eq!(decode_hex_prefixed("0x68656c6c6f").unwrap(), b"hello");
        assert_eq!(decode_hex_prefixed("0x").unwrap(), Vec::<u8>::new());
        assert!(decode_hex_prefixed("68656c6c6f").is_err());
        assert!(decode_hex_prefixed("0xabc").is_err());
        assert!(decode_hex_prefixed("0xzz").is_err());
    }
}
