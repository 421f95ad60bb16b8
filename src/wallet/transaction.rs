//! Transaction requests as dApps send them, and locally signed envelopes.
//!
//! A [`TransactionRequest`] is the loosely typed object from an
//! `eth_sendTransaction` call. [`prepare`] fills the fields the dApp left out
//! by asking the node, producing a [`PreparedTransaction`] that can be signed
//! as a legacy EIP-155 transaction or an EIP-1559 (type 2) envelope.

use k256::ecdsa::SigningKey;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value, json};

use super::rlp::RlpList;
use super::{Address, decode_hex_prefixed, keccak256};
use crate::error::{RpcError, SignerError};
use crate::rpc::{RpcClient, quantity_to_u64};

const EIP1559_TX_TYPE: u8 = 0x02;

/// Unsigned integer up to 256 bits, stored as minimal big-endian bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Quantity(Vec<u8>);

impl Quantity {
    pub fn zero() -> Self {
        Self(Vec::new())
    }

    pub fn from_u128(value: u128) -> Self {
        Self::from_be_bytes(&value.to_be_bytes())
    }

    fn from_be_bytes(bytes: &[u8]) -> Self {
        let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        Self(bytes[start..].to_vec())
    }

    /// Parse a `0x`-hex or decimal string, or a JSON number.
    pub fn from_json(value: &Value) -> Result<Self, String> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .map(|v| Self::from_u128(u128::from(v)))
                .ok_or_else(|| format!("quantity {n} is not a non-negative integer")),
            Value::String(s) => Self::parse(s),
            other => Err(format!("expected quantity, got {other}")),
        }
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        if let Some(digits) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            if digits.is_empty() || digits.len() > 64 {
                return Err(format!("hex quantity '{text}' must have 1 to 64 digits"));
            }
            let padded = if digits.len() % 2 == 1 {
                format!("0{digits}")
            } else {
                digits.to_string()
            };
            let bytes = hex::decode(padded).map_err(|e| format!("hex quantity '{text}': {e}"))?;
            return Ok(Self::from_be_bytes(&bytes));
        }
        text.parse::<u128>()
            .map(Self::from_u128)
            .map_err(|e| format!("decimal quantity '{text}': {e}"))
    }

    pub fn to_u128(&self) -> Option<u128> {
        if self.0.len() > 16 {
            return None;
        }
        Some(self.0.iter().fold(0u128, |acc, b| (acc << 8) | u128::from(*b)))
    }

    pub fn to_u64(&self) -> Option<u64> {
        self.to_u128().and_then(|v| u64::try_from(v).ok())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        if self.0.is_empty() {
            return "0x0".to_string();
        }
        let digits = hex::encode(&self.0);
        format!("0x{}", digits.trim_start_matches('0'))
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Self::from_json(&raw).map_err(serde::de::Error::custom)
    }
}

/// An `eth_sendTransaction` parameter object. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    #[serde(default)]
    pub from: Option<Address>,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub value: Option<Quantity>,
    #[serde(default, alias = "input")]
    pub data: Option<String>,
    #[serde(default, alias = "gasLimit")]
    pub gas: Option<Quantity>,
    #[serde(default)]
    pub gas_price: Option<Quantity>,
    #[serde(default)]
    pub max_fee_per_gas: Option<Quantity>,
    #[serde(default)]
    pub max_priority_fee_per_gas: Option<Quantity>,
    #[serde(default)]
    pub nonce: Option<Quantity>,
    #[serde(default)]
    pub chain_id: Option<Quantity>,
    #[serde(default, rename = "type")]
    pub tx_type: Option<Quantity>,
}

impl TransactionRequest {
    pub fn from_json(value: &Value) -> Result<Self, SignerError> {
        serde_json::from_value(value.clone())
            .map_err(|e| SignerError::InvalidTransaction(e.to_string()))
    }

    /// Fields relevant to `eth_estimateGas`, with `from` set.
    fn call_object(&self, from: Address) -> Value {
        let mut call = Map::new();
        call.insert("from".to_string(), json!(from.to_checksum()));
        if let Some(to) = self.to {
            call.insert("to".to_string(), json!(to.to_checksum()));
        }
        if let Some(value) = &self.value {
            call.insert("value".to_string(), json!(value.to_hex()));
        }
        if let Some(data) = &self.data {
            call.insert("data".to_string(), json!(data));
        }
        Value::Object(call)
    }
}

/// Fee fields of a prepared transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeeModel {
    Legacy {
        gas_price: Quantity,
    },
    Eip1559 {
        max_fee_per_gas: Quantity,
        max_priority_fee_per_gas: Quantity,
    },
}

/// A fully specified transaction, ready to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTransaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_limit: u64,
    pub to: Option<Address>,
    pub value: Quantity,
    pub data: Vec<u8>,
    pub fees: FeeModel,
}

fn invalid(message: impl Into<String>) -> SignerError {
    SignerError::InvalidTransaction(message.into())
}

fn field_u64(name: &str, value: &Quantity) -> Result<u64, SignerError> {
    value
        .to_u64()
        .ok_or_else(|| invalid(format!("{name} does not fit in 64 bits")))
}

/// Fill in everything `request` leaves out, using the node.
///
/// Legacy pricing is used when the request carries `gasPrice`, asks for type
/// `0x0`, or the node reports no base fee. Otherwise the transaction is
/// EIP-1559 with `maxFeePerGas = 2 * baseFee + priorityFee` unless given.
pub async fn prepare(
    request: &TransactionRequest,
    from: Address,
    rpc: &dyn RpcClient,
) -> Result<PreparedTransaction, SignerError> {
    if let Some(requested) = request.from
        && requested != from
    {
        return Err(invalid(format!(
            "transaction sender {requested} does not match wallet address {from}"
        )));
    }

    let tx_type = match &request.tx_type {
        None => None,
        Some(t) => match t.to_u64() {
            Some(0) => Some(0u8),
            Some(2) => Some(EIP1559_TX_TYPE),
            _ => return Err(invalid(format!("unsupported transaction type {}", t.to_hex()))),
        },
    };

    let data = match &request.data {
        Some(data) => decode_hex_prefixed(data).map_err(|e| invalid(format!("data: {e}")))?,
        None => Vec::new(),
    };

    let chain_id = match &request.chain_id {
        Some(chain_id) => field_u64("chainId", chain_id)?,
        None => {
            let value = rpc.send("eth_chainId", json!([])).await?;
            quantity_to_u64("eth_chainId", &value)?
        }
    };

    let nonce = match &request.nonce {
        Some(nonce) => field_u64("nonce", nonce)?,
        None => {
            let value = rpc
                .send(
                    "eth_getTransactionCount",
                    json!([from.to_checksum(), "pending"]),
                )
                .await?;
            quantity_to_u64("eth_getTransactionCount", &value)?
        }
    };

    let gas_limit = match &request.gas {
        Some(gas) => field_u64("gas", gas)?,
        None => {
            let value = rpc
                .send("eth_estimateGas", json!([request.call_object(from)]))
                .await?;
            quantity_to_u64("eth_estimateGas", &value)?
        }
    };

    let fees = resolve_fees(request, tx_type, rpc).await?;

    Ok(PreparedTransaction {
        chain_id,
        nonce,
        gas_limit,
        to: request.to,
        value: request.value.clone().unwrap_or_default(),
        data,
        fees,
    })
}

async fn resolve_fees(
    request: &TransactionRequest,
    tx_type: Option<u8>,
    rpc: &dyn RpcClient,
) -> Result<FeeModel, SignerError> {
    if tx_type == Some(0) || request.gas_price.is_some() {
        let gas_price = match &request.gas_price {
            Some(price) => price.clone(),
            None => node_quantity(rpc, "eth_gasPrice").await?,
        };
        return Ok(FeeModel::Legacy { gas_price });
    }

    if let (Some(max_fee), Some(priority)) = (
        &request.max_fee_per_gas,
        &request.max_priority_fee_per_gas,
    ) {
        return Ok(FeeModel::Eip1559 {
            max_fee_per_gas: max_fee.clone(),
            max_priority_fee_per_gas: priority.clone(),
        });
    }

    let block = rpc
        .send("eth_getBlockByNumber", json!(["latest", false]))
        .await?;
    let base_fee = match block.get("baseFeePerGas") {
        Some(Value::Null) | None => None,
        Some(raw) => Some(Quantity::from_json(raw).map_err(|reason| {
            RpcError::InvalidResponse {
                method: "eth_getBlockByNumber".to_string(),
                reason,
            }
        })?),
    };

    let Some(base_fee) = base_fee else {
        if tx_type == Some(EIP1559_TX_TYPE) {
            return Err(invalid("node does not support EIP-1559 transactions"));
        }
        tracing::debug!("Node reports no base fee; using legacy pricing");
        let gas_price = node_quantity(rpc, "eth_gasPrice").await?;
        return Ok(FeeModel::Legacy { gas_price });
    };

    let priority = match &request.max_priority_fee_per_gas {
        Some(priority) => priority.clone(),
        None => node_quantity(rpc, "eth_maxPriorityFeePerGas").await?,
    };
    let max_fee = match &request.max_fee_per_gas {
        Some(max_fee) => max_fee.clone(),
        None => {
            let base = base_fee
                .to_u128()
                .ok_or_else(|| invalid("base fee out of range"))?;
            let tip = priority
                .to_u128()
                .ok_or_else(|| invalid("priority fee out of range"))?;
            let total = base
                .checked_mul(2)
                .and_then(|doubled| doubled.checked_add(tip))
                .ok_or_else(|| invalid("max fee overflows"))?;
            Quantity::from_u128(total)
        }
    };

    Ok(FeeModel::Eip1559 {
        max_fee_per_gas: max_fee,
        max_priority_fee_per_gas: priority,
    })
}

async fn node_quantity(rpc: &dyn RpcClient, method: &str) -> Result<Quantity, SignerError> {
    let value = rpc.send(method, json!([])).await?;
    Quantity::from_json(&value).map_err(|reason| {
        SignerError::Rpc(RpcError::InvalidResponse {
            method: method.to_string(),
            reason,
        })
    })
}

impl PreparedTransaction {
    fn to_field(&self) -> &[u8] {
        match &self.to {
            Some(address) => &address.as_bytes()[..],
            None => &[],
        }
    }

    fn base_fields(&self) -> RlpList {
        let mut list = RlpList::new();
        match &self.fees {
            FeeModel::Legacy { gas_price } => {
                list.append_u64(self.nonce)
                    .append_bytes(gas_price.as_bytes())
                    .append_u64(self.gas_limit)
                    .append_bytes(self.to_field())
                    .append_bytes(self.value.as_bytes())
                    .append_bytes(&self.data);
            }
            FeeModel::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                list.append_u64(self.chain_id)
                    .append_u64(self.nonce)
                    .append_bytes(max_priority_fee_per_gas.as_bytes())
                    .append_bytes(max_fee_per_gas.as_bytes())
                    .append_u64(self.gas_limit)
                    .append_bytes(self.to_field())
                    .append_bytes(self.value.as_bytes())
                    .append_bytes(&self.data)
                    .append_empty_list();
            }
        }
        list
    }

    /// Hash the signer commits to.
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut list = self.base_fields();
        match self.fees {
            FeeModel::Legacy { .. } => {
                list.append_u64(self.chain_id).append_u64(0).append_u64(0);
                keccak256(&[&list.finish()])
            }
            FeeModel::Eip1559 { .. } => keccak256(&[&[EIP1559_TX_TYPE], &list.finish()]),
        }
    }

    /// Sign with `key` and return the raw transaction bytes for
    /// `eth_sendRawTransaction`.
    pub fn sign(&self, key: &SigningKey) -> Result<Vec<u8>, SignerError> {
        let hash = self.signing_hash();
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(&hash)
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        let rs = signature.to_bytes();
        let (r, s) = rs.split_at(32);
        let r = Quantity::from_be_bytes(r);
        let s = Quantity::from_be_bytes(s);
        let parity = u64::from(recovery_id.to_byte());

        let mut list = self.base_fields();
        match self.fees {
            FeeModel::Legacy { .. } => {
                let v = self
                    .chain_id
                    .checked_mul(2)
                    .and_then(|c| c.checked_add(35 + parity))
                    .ok_or_else(|| invalid("chain id too large for EIP-155"))?;
                list.append_u64(v)
                    .append_bytes(r.as_bytes())
                    .append_bytes(s.as_bytes());
                Ok(list.finish())
            }
            FeeModel::Eip1559 { .. } => {
                list.append_u64(parity)
                    .append_bytes(r.as_bytes())
                    .append_bytes(s.as_bytes());
                let mut out = vec![EIP1559_TX_TYPE];
                out.extend_from_slice(&list.finish());
                Ok(out)
            }
        }
    }
}
