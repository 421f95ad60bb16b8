//! Signer backends: a local key signer and a node-impersonation signer.

use std::sync::Arc;

use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use serde_json::{Value, json};

use super::identity::WalletIdentity;
use super::transaction::{TransactionRequest, prepare};
use super::{Address, encode_hex_prefixed, keccak256};
use crate::error::{RpcError, SignerError};
use crate::rpc::RpcClient;

/// Produces signatures and submits transactions on behalf of one address.
#[async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> Address;

    /// EIP-191 `personal_sign` over `message`; returns a 65-byte `0x` hex signature.
    async fn sign_message(&self, message: &[u8]) -> Result<String, SignerError>;

    /// Submit an `eth_sendTransaction` object and return the transaction hash.
    async fn send_transaction(&self, transaction: &Value) -> Result<String, SignerError>;
}

/// EIP-191 version `0x45` hash of `message`.
pub fn personal_sign_hash(message: &[u8]) -> [u8; 32] {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    keccak256(&[prefix.as_bytes(), message])
}

fn transaction_hash(method: &str, value: Value) -> Result<String, SignerError> {
    match value {
        Value::String(hash) => Ok(hash),
        other => Err(SignerError::Rpc(RpcError::InvalidResponse {
            method: method.to_string(),
            reason: format!("expected transaction hash, got {other}"),
        })),
    }
}

/// Signs with a private key held in process memory.
pub struct KeySigner {
    address: Address,
    key: SigningKey,
    rpc: Arc<dyn RpcClient>,
}

impl KeySigner {
    pub fn new(key: SigningKey, rpc: Arc<dyn RpcClient>) -> Self {
        Self {
            address: Address::from_verifying_key(key.verifying_key()),
            key,
            rpc,
        }
    }
}

#[async_trait]
impl Signer for KeySigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_message(&self, message: &[u8]) -> Result<String, SignerError> {
        let hash = personal_sign_hash(message);
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&hash)
            .map_err(|e| SignerError::Signing(e.to_string()))?;

        let mut out = Vec::with_capacity(65);
        out.extend_from_slice(&signature.to_bytes());
        out.push(27 + recovery_id.to_byte());
        Ok(encode_hex_prefixed(&out))
    }

    async fn send_transaction(&self, transaction: &Value) -> Result<String, SignerError> {
        let request = TransactionRequest::from_json(transaction)?;
        let prepared = prepare(&request, self.address, self.rpc.as_ref()).await?;
        let raw = prepared.sign(&self.key)?;
        tracing::debug!(
            nonce = prepared.nonce,
            chain_id = prepared.chain_id,
            "Submitting locally signed transaction"
        );
        let result = self
            .rpc
            .send("eth_sendRawTransaction", json!([encode_hex_prefixed(&raw)]))
            .await?;
        transaction_hash("eth_sendRawTransaction", result)
    }
}

/// Delegates transactions to a node that impersonates the address.
pub struct ImpersonationSigner {
    address: Address,
    rpc: Arc<dyn RpcClient>,
}

impl ImpersonationSigner {
    pub fn new(address: Address, rpc: Arc<dyn RpcClient>) -> Self {
        Self { address, rpc }
    }
}

#[async_trait]
impl Signer for ImpersonationSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_message(&self, _message: &[u8]) -> Result<String, SignerError> {
        Err(SignerError::Unsupported(
            "cannot sign arbitrary messages for an impersonated account".to_string(),
        ))
    }

    async fn send_transaction(&self, transaction: &Value) -> Result<String, SignerError> {
        let Value::Object(fields) = transaction else {
            return Err(SignerError::InvalidTransaction(
                "transaction must be a JSON object".to_string(),
            ));
        };
        match fields.get("from") {
            None | Some(Value::Null) => {}
            Some(Value::String(from)) => {
                let requested = Address::parse(from)
                    .map_err(|e| SignerError::InvalidTransaction(format!("invalid from: {e}")))?;
                if requested != self.address {
                    return Err(SignerError::InvalidTransaction(format!(
                        "transaction sender {requested} does not match wallet address {}",
                        self.address
                    )));
                }
            }
            Some(other) => {
                return Err(SignerError::InvalidTransaction(format!(
                    "invalid from: expected address string, got {other}"
                )));
            }
        }
        let mut forwarded = fields.clone();
        forwarded.insert("from".to_string(), json!(self.address.to_checksum()));

        let result = self
            .rpc
            .send("eth_sendTransaction", json!([Value::Object(forwarded)]))
            .await?;
        transaction_hash("eth_sendTransaction", result)
    }
}

/// The signer chosen when the wallet identity is created.
pub enum SignerBackend {
    Key(KeySigner),
    Impersonation(ImpersonationSigner),
}

impl SignerBackend {
    pub fn for_identity(identity: &WalletIdentity, rpc: Arc<dyn RpcClient>) -> Self {
        match identity {
            WalletIdentity::Key(key) => {
                Self::Key(KeySigner::new(key.signing_key().clone(), rpc))
            }
            WalletIdentity::Impersonated(imp) => {
                Self::Impersonation(ImpersonationSigner::new(imp.address(), rpc))
            }
        }
    }

    fn inner(&self) -> &dyn Signer {
        match self {
            Self::Key(signer) => signer,
            Self::Impersonation(signer) => signer,
        }
    }
}

#[async_trait]
impl Signer for SignerBackend {
    fn address(&self) -> Address {
        self.inner().address()
    }

    async fn sign_message(&self, message: &[u8]) -> Result<String, SignerError> {
        self.inner().sign_message(message).await
    }

    async fn send_transaction(&self, transaction: &Value) -> Result<String, SignerError> {
        self.inner().send_transaction(transaction).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRpc;
    use crate::wallet::decode_hex_prefixed;
    use crate::wallet::identity::{ImpersonatedIdentity, KeyIdentity};
    use crate::wallet::keys::WordCount;
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

    const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";

    fn key_backend(rpc: Arc<dyn RpcClient>) -> SignerBackend {
        let identity = KeyIdentity::create(Some(TEST_MNEMONIC), WordCount::Twelve).unwrap();
        SignerBackend::for_identity(&WalletIdentity::Key(identity), rpc)
    }

    #[test]
    fn personal_sign_hash_prefixes_length() {
        assert_eq!(
            encode_hex_prefixed(&personal_sign_hash(b"hello")),
            encode_hex_prefixed(&keccak256(&[b"\x19Ethereum Signed Message:\n5hello"]))
        );
    }

    #[tokio::test]
    async fn key_signature_recovers_to_wallet_address() {
        let signer = key_backend(Arc::new(ScriptedRpc::new()));
        let signature = signer.sign_message(b"hello").await.unwrap();
        let bytes = decode_hex_prefixed(&signature).unwrap();
        assert_eq!(bytes.len(), 65);
        assert!(bytes[64] == 27 || bytes[64] == 28);

        let sig = Signature::from_slice(&bytes[..64]).unwrap();
        let recovery_id = RecoveryId::from_byte(bytes[64] - 27).unwrap();
        let recovered =
            VerifyingKey::recover_from_prehash(&personal_sign_hash(b"hello"), &sig, recovery_id)
                .unwrap();
        assert_eq!(Address::from_verifying_key(&recovered), signer.address());
    }

    #[tokio::test]
    async fn key_signatures_are_deterministic() {
        let signer = key_backend(Arc::new(ScriptedRpc::new()));
        let first = signer.sign_message(b"same message").await.unwrap();
        let second = signer.sign_message(b"same message").await.unwrap();
        assert_eq!(first, second);
        assert_ne!(first, signer.sign_message(b"other message").await.unwrap());
    }

    #[tokio::test]
    async fn key_signer_submits_raw_transaction() {
        let rpc = Arc::new(
            ScriptedRpc::new()
                .with("eth_getBlockByNumber", json!({"baseFeePerGas": "0x1"}))
                .with("eth_maxPriorityFeePerGas", json!("0x1"))
                .with("eth_sendRawTransaction", json!("0xfeed")),
        );
        let signer = key_backend(rpc.clone());

        let hash = signer
            .send_transaction(&json!({
                "to": "0x3535353535353535353535353535353535353535",
                "nonce": "0x0",
                "gas": "0x5208",
                "chainId": "0x7a69",
                "value": "0x1"
            }))
            .await
            .unwrap();

        assert_eq!(hash, "0xfeed");
        let raw = rpc.calls_to("eth_sendRawTransaction");
        assert_eq!(raw.len(), 1);
        assert!(raw[0][0].as_str().unwrap().starts_with("0x02"));
    }

    #[tokio::test]
    async fn impersonated_signer_refuses_messages() {
        let address = Address::from_bytes([0xab; 20]);
        let identity = WalletIdentity::Impersonated(ImpersonatedIdentity::new(address));
        let signer = SignerBackend::for_identity(&identity, Arc::new(ScriptedRpc::new()));

        let err = signer.sign_message(b"hello").await.unwrap_err();
        assert!(matches!(err, SignerError::Unsupported(_)));
    }

    #[tokio::test]
    async fn impersonated_signer_fills_in_its_own_sender() {
        let rpc = Arc::new(ScriptedRpc::new().with("eth_sendTransaction", json!("0xabc")));
        let address = Address::from_bytes([0xab; 20]);
        let signer = ImpersonationSigner::new(address, rpc.clone());

        let hash = signer
            .send_transaction(&json!({
                "to": "0x3535353535353535353535353535353535353535",
                "value": "0x1"
            }))
            .await
            .unwrap();
        signer
            .send_transaction(&json!({
                "from": "0xabababababababababababababababababababab",
                "to": "0x3535353535353535353535353535353535353535"
            }))
            .await
            .unwrap();

        assert_eq!(hash, "0xabc");
        let params = rpc.calls_to("eth_sendTransaction");
        assert_eq!(params.len(), 2);
        assert_eq!(params[0][0]["from"], json!(address.to_checksum()));
        assert_eq!(params[0][0]["value"], json!("0x1"));
        assert_eq!(params[1][0]["from"], json!(address.to_checksum()));
    }

    #[tokio::test]
    async fn impersonated_signer_rejects_a_foreign_sender() {
        let rpc = Arc::new(ScriptedRpc::new().with("eth_sendTransaction", json!("0xabc")));
        let signer = ImpersonationSigner::new(Address::from_bytes([0xab; 20]), rpc.clone());

        let err = signer
            .send_transaction(&json!({
                "from": "0x1111111111111111111111111111111111111111",
                "to": "0x3535353535353535353535353535353535353535",
                "value": "0x1"
            }))
            .await
            .unwrap_err();
        assert!(
            matches!(&err, SignerError::InvalidTransaction(m) if m.contains("does not match")),
            "{err}"
        );

        let err = signer
            .send_transaction(&json!({ "from": 7, "to": "0x3535353535353535353535353535353535353535" }))
            .await
            .unwrap_err();
        assert!(matches!(err, SignerError::InvalidTransaction(_)));
        assert!(rpc.calls_to("eth_sendTransaction").is_empty());
    }

    #[tokio::test]
    async fn impersonated_signer_rejects_non_object_transactions() {
        let signer = ImpersonationSigner::new(
            Address::from_bytes([0xab; 20]),
            Arc::new(ScriptedRpc::new()),
        );
        let err = signer.send_transaction(&json!("0x00")).await.unwrap_err();
        assert!(matches!(err, SignerError::InvalidTransaction(_)));
    }
}
