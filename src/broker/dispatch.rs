//! Routes an approved signing request to the wallet's signer backend.

use serde_json::Value;

use crate::error::BrokerError;
use crate::relay::SigningRequest;
use crate::wallet::{Signer, decode_hex_prefixed};

/// Execute `request` with `signer` and return the JSON-RPC result value.
pub async fn dispatch(signer: &dyn Signer, request: &SigningRequest) -> Result<Value, BrokerError> {
    match request.method() {
        "personal_sign" => {
            let message = request
                .call_params()
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    BrokerError::InvalidRequest(
                        "personal_sign expects a hex-encoded message as its first parameter"
                            .to_string(),
                    )
                })?;
            let bytes = decode_hex_prefixed(message)
                .map_err(|e| BrokerError::InvalidRequest(format!("personal_sign message: {e}")))?;
            let signature = signer.sign_message(&bytes).await?;
            Ok(Value::String(signature))
        }
        "eth_sendTransaction" => {
            let transaction = request.call_params().first().ok_or_else(|| {
                BrokerError::InvalidRequest(
                    "eth_sendTransaction expects a transaction object".to_string(),
                )
            })?;
            let hash = signer.send_transaction(transaction).await?;
            Ok(Value::String(hash))
        }
        "eth_signTransaction" => Err(BrokerError::NotImplemented(
            "eth_signTransaction".to_string(),
        )),
        other => Err(BrokerError::UnsupportedMethod(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::relay::{RpcRequest, SigningRequestParams};
    use crate::testing::ScriptedRpc;
    use crate::wallet::identity::{ImpersonatedIdentity, KeyIdentity};
    use crate::wallet::{Address, SignerBackend, WalletIdentity, WordCount};

    const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";

    fn request(method: &str, params: Vec<Value>) -> SigningRequest {
        SigningRequest {
            id: 1,
            topic: "topic".to_string(),
            params: SigningRequestParams {
                request: RpcRequest {
                    method: method.to_string(),
                    params,
                },
                chain_id: None,
            },
        }
    }

    fn backends() -> Vec<SignerBackend> {
        let rpc = Arc::new(ScriptedRpc::new());
        let key = KeyIdentity::create(Some(TEST_MNEMONIC), WordCount::Twelve).unwrap();
        vec![
            SignerBackend::for_identity(&WalletIdentity::Key(key), rpc.clone()),
            SignerBackend::for_identity(
                &WalletIdentity::Impersonated(ImpersonatedIdentity::new(Address::from_bytes(
                    [0xab; 20],
                ))),
                rpc,
            ),
        ]
    }

    #[tokio::test]
    async fn sign_transaction_is_not_implemented_for_every_backend() {
        for backend in backends() {
            let err = dispatch(&backend, &request("eth_signTransaction", vec![json!({})]))
                .await
                .unwrap_err();
            assert!(matches!(err, BrokerError::NotImplemented(_)));
            assert_eq!(err.to_string(), "eth_signTransaction not implemented");
        }
    }

    #[tokio::test]
    async fn unknown_methods_are_unsupported() {
        for backend in backends() {
            let err = dispatch(&backend, &request("eth_signTypedData_v4", vec![]))
                .await
                .unwrap_err();
            assert!(matches!(err, BrokerError::UnsupportedMethod(_)));
        }
    }

    #[tokio::test]
    async fn personal_sign_uses_key_backend() {
        let backends = backends();
        let result = dispatch(
            &backends[0],
            &request("personal_sign", vec![json!("0x68656c6c6f"), json!("0xf39f")]),
        )
        .await
        .unwrap();
        assert!(result.as_str().unwrap().starts_with("0x"));
        assert_eq!(result.as_str().unwrap().len(), 2 + 130);

        let err = dispatch(&backends[1], &request("personal_sign", vec![json!("0x68")]))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::UnsupportedOperation(_)));
    }

    #[tokio::test]
    async fn personal_sign_requires_hex_message() {
        let backends = backends();
        for params in [vec![], vec![json!("hello")], vec![json!(42)]] {
            let err = dispatch(&backends[0], &request("personal_sign", params))
                .await
                .unwrap_err();
            assert!(matches!(err, BrokerError::InvalidRequest(_)));
        }
    }

    #[tokio::test]
    async fn send_transaction_requires_a_parameter() {
        let err = dispatch(&backends()[1], &request("eth_sendTransaction", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::InvalidRequest(_)));
    }
}
