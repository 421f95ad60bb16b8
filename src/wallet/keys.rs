//! BIP-39 mnemonics and BIP-32 secp256k1 key derivation.
//!
//! mnemonic → BIP-39 seed (empty passphrase) → BIP-32 master key →
//! `m/44'/60'/0'/0/0`, the first account of the standard Ethereum path.

use bip39::Mnemonic;
use hmac::{Hmac, Mac};
use k256::FieldBytes;
use k256::Scalar;
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::ff::{Field, PrimeField};
use sha2::Sha512;
use zeroize::Zeroizing;

use crate::error::KeyError;

/// Default Ethereum account path.
pub const ETHEREUM_DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";

const HARDENED_BIT: u32 = 0x8000_0000;

type HmacSha512 = Hmac<Sha512>;

/// Length of a generated mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WordCount {
    #[default]
    Twelve,
    TwentyFour,
}

impl WordCount {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "12" => Some(Self::Twelve),
            "24" => Some(Self::TwentyFour),
            _ => None,
        }
    }

    fn entropy_len(self) -> usize {
        match self {
            Self::Twelve => 16,
            Self::TwentyFour => 32,
        }
    }
}

/// Generate a fresh mnemonic from OS entropy.
pub fn generate_mnemonic(words: WordCount) -> Result<Mnemonic, KeyError> {
    let mut entropy = Zeroizing::new(vec![0u8; words.entropy_len()]);
    rand::RngCore::try_fill_bytes(&mut rand::rngs::OsRng, &mut entropy[..])
        .map_err(|e| KeyError::Generation(format!("OS entropy unavailable: {e}")))?;
    Mnemonic::from_entropy(&entropy[..])
        .map_err(|e| KeyError::Generation(format!("failed to generate mnemonic: {e}")))
}

/// Parse and validate a mnemonic phrase. Surrounding and repeated whitespace is ignored.
pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic, KeyError> {
    let normalized = phrase.split_whitespace().collect::<Vec<_>>().join(" ");
    Mnemonic::parse_normalized(&normalized).map_err(|e| KeyError::InvalidMnemonic(e.to_string()))
}

/// Derive the signing key at `path` from a mnemonic.
pub fn derive_signing_key(mnemonic: &Mnemonic, path: &str) -> Result<SigningKey, KeyError> {
    let seed = Zeroizing::new(mnemonic.to_seed(""));
    let mut key = ExtendedKey::master(&seed[..])?;
    for index in parse_path(path)? {
        key = key.derive_child(index)?;
    }
    SigningKey::from_slice(&key.secret[..]).map_err(|e| KeyError::Derivation(e.to_string()))
}

struct ExtendedKey {
    secret: Zeroizing<[u8; 32]>,
    chain_code: Zeroizing<[u8; 32]>,
}

impl ExtendedKey {
    fn master(seed: &[u8]) -> Result<Self, KeyError> {
        let mut mac = HmacSha512::new_from_slice(b"Bitcoin seed")
            .map_err(|e| KeyError::Derivation(format!("HMAC init failed: {e}")))?;
        mac.update(seed);
        let output = finalize(mac);

        let scalar = scalar_from_bytes(&output[..32])?;
        if bool::from(scalar.is_zero()) {
            return Err(KeyError::Derivation("master key is zero".to_string()));
        }
        Ok(Self::from_parts(&output[..32], &output[32..]))
    }

    fn derive_child(&self, index: u32) -> Result<Self, KeyError> {
        let mut mac = HmacSha512::new_from_slice(&self.chain_code[..])
            .map_err(|e| KeyError::Derivation(format!("HMAC init failed: {e}")))?;

        if index & HARDENED_BIT != 0 {
            mac.update(&[0x00]);
            mac.update(&self.secret[..]);
        } else {
            let signing_key = SigningKey::from_slice(&self.secret[..])
                .map_err(|e| KeyError::Derivation(e.to_string()))?;
            let public = signing_key.verifying_key().to_encoded_point(true);
            mac.update(public.as_bytes());
        }
        mac.update(&index.to_be_bytes());
        let output = finalize(mac);

        let tweak = scalar_from_bytes(&output[..32])?;
        let parent = scalar_from_bytes(&self.secret[..])?;
        let child = tweak + parent;
        if bool::from(child.is_zero()) {
            return Err(KeyError::Derivation(format!(
                "child key at index {index} is zero"
            )));
        }
        Ok(Self::from_parts(&child.to_bytes(), &output[32..]))
    }

    fn from_parts(secret: &[u8], chain_code: &[u8]) -> Self {
        let mut key = Self {
            secret: Zeroizing::new([0u8; 32]),
            chain_code: Zeroizing::new([0u8; 32]),
        };
        key.secret.copy_from_slice(secret);
        key.chain_code.copy_from_slice(chain_code);
        key
    }
}

fn finalize(mac: HmacSha512) -> Zeroizing<[u8; 64]> {
    let mut out = Zeroizing::new([0u8; 64]);
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

fn scalar_from_bytes(bytes: &[u8]) -> Result<Scalar, KeyError> {
    Option::<Scalar>::from(Scalar::from_repr(*FieldBytes::from_slice(bytes)))
        .ok_or_else(|| KeyError::Derivation("derived value exceeds curve order".to_string()))
}

fn parse_path(path: &str) -> Result<Vec<u32>, KeyError> {
    let mut segments = path.trim().split('/');
    if segments.next() != Some("m") {
        return Err(KeyError::Derivation(format!(
            "derivation path '{path}' must start with 'm'"
        )));
    }
    segments
        .map(|segment| {
            let (digits, hardened) = match segment.strip_suffix('\'') {
                Some(digits) => (digits, true),
                None => (segment, false),
            };
            let index: u32 = digits.parse().map_err(|_| {
                KeyError::Derivation(format!("invalid path segment '{segment}' in '{path}'"))
            })?;
            if index & HARDENED_BIT != 0 {
                return Err(KeyError::Derivation(format!(
                    "path index {index} out of range in '{path}'"
                )));
            }
            Ok(if hardened { index | HARDENED_BIT } else { index })
        })
        .collect()
}
