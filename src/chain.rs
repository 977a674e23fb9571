//! Blockchain RPC gateway: signing, broadcast and confirmation polling.
//!
//! Call-data arrives from the aggregator as a partially filled payload; this
//! gateway completes it (nonce, gas) against the node, signs an EIP-155
//! legacy transaction and submits it. Confirmation is a bounded poll where
//! "no receipt yet" is the only retryable condition.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use reqwest::Client;
use secrecy::SecretString;
use serde_json::{json, Value};
use sha3::{Digest, Keccak256};

use crate::config::RpcConfig;
use crate::error::ChainError;
use crate::wallet;

/// Transaction payload as produced by the market gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxPayload {
    pub to: String,
    /// 0x-prefixed call-data.
    pub data: String,
    /// Native value in wei, decimal string.
    pub value: String,
    pub gas: Option<u64>,
    pub gas_price: Option<u128>,
}

/// A fully signed, RLP-encoded transaction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx(pub Vec<u8>);

impl SignedTx {
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }
}

/// Terminal state of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Confirmed,
    Reverted,
}

/// Bounded receipt-polling contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval: Duration::from_secs(1),
        }
    }
}

#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Complete and sign a payload for the given chain.
    async fn sign(
        &self,
        chain_id: u64,
        payload: &TxPayload,
        secret: &SecretString,
    ) -> Result<SignedTx, ChainError>;

    /// Submit a signed transaction, returning its hash. Not deduplicated: a
    /// crash after broadcast can leave an on-chain effect with no
    /// notification.
    async fn broadcast(&self, chain_id: u64, tx: &SignedTx) -> Result<String, ChainError>;

    /// Poll until the transaction has a receipt or the budget is exhausted.
    async fn poll_receipt(
        &self,
        chain_id: u64,
        tx_hash: &str,
        policy: &PollPolicy,
    ) -> Result<TxStatus, ChainError>;
}

/// JSON-RPC 2.0 gateway over HTTP, one endpoint per supported chain.
pub struct JsonRpcChain {
    http: Client,
    endpoints: HashMap<u64, String>,
}

impl JsonRpcChain {
    pub fn new(config: &RpcConfig) -> Self {
        Self {
            http: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            endpoints: config.endpoints.clone(),
        }
    }

    async fn rpc(&self, chain_id: u64, method: &str, params: Value) -> Result<Value, ChainError> {
        let endpoint = self
            .endpoints
            .get(&chain_id)
            .ok_or(ChainError::UnknownChain(chain_id))?;

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response: Value = self
            .http
            .post(endpoint)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
            return Err(ChainError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }

        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn quantity(&self, chain_id: u64, method: &str, params: Value) -> Result<u128, ChainError> {
        let result = self.rpc(chain_id, method, params).await?;
        let raw = result
            .as_str()
            .ok_or_else(|| ChainError::Malformed(format!("{method} returned {result}")))?;
        parse_quantity(raw)
    }
}

fn parse_quantity(raw: &str) -> Result<u128, ChainError> {
    u128::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|e| ChainError::Malformed(format!("quantity '{raw}': {e}")))
}

fn parse_address(raw: &str) -> Result<Vec<u8>, ChainError> {
    let bytes = hex::decode(raw.trim_start_matches("0x"))
        .map_err(|e| ChainError::InvalidPayload(format!("address '{raw}': {e}")))?;
    if bytes.len() != 20 {
        return Err(ChainError::InvalidPayload(format!(
            "address '{raw}' is {} bytes, expected 20",
            bytes.len()
        )));
    }
    Ok(bytes)
}

fn parse_call_data(raw: &str) -> Result<Vec<u8>, ChainError> {
    hex::decode(raw.trim_start_matches("0x"))
        .map_err(|e| ChainError::InvalidPayload(format!("call-data: {e}")))
}

/// Minimal RLP encoding, just enough for a legacy transaction.
mod rlp {
    pub fn append_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
        if bytes.len() == 1 && bytes[0] < 0x80 {
            out.push(bytes[0]);
        } else {
            append_length(out, bytes.len(), 0x80);
            out.extend_from_slice(bytes);
        }
    }

    pub fn append_uint(out: &mut Vec<u8>, value: u128) {
        let bytes = value.to_be_bytes();
        let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
        append_bytes(out, &bytes[first..]);
    }

    pub fn into_list(payload: Vec<u8>) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() + 9);
        append_length(&mut out, payload.len(), 0xc0);
        out.extend(payload);
        out
    }

    fn append_length(out: &mut Vec<u8>, len: usize, offset: u8) {
        if len < 56 {
            out.push(offset + len as u8);
        } else {
            let be = len.to_be_bytes();
            let first = be.iter().position(|&b| b != 0).unwrap_or(be.len());
            let len_bytes = &be[first..];
            out.push(offset + 55 + len_bytes.len() as u8);
            out.extend_from_slice(len_bytes);
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn bytes(input: &[u8]) -> Vec<u8> {
            let mut out = Vec::new();
            append_bytes(&mut out, input);
            out
        }

        #[test]
        fn string_vectors() {
            assert_eq!(bytes(b"dog"), vec![0x83, b'd', b'o', b'g']);
            assert_eq!(bytes(b""), vec![0x80]);
            assert_eq!(bytes(&[0x0f]), vec![0x0f]);
            assert_eq!(bytes(&[0x80]), vec![0x81, 0x80]);
        }

        #[test]
        fn uint_vectors() {
            let mut out = Vec::new();
            append_uint(&mut out, 0);
            assert_eq!(out, vec![0x80]);

            let mut out = Vec::new();
            append_uint(&mut out, 1024);
            assert_eq!(out, vec![0x82, 0x04, 0x00]);
        }

        #[test]
        fn list_vectors() {
            assert_eq!(into_list(Vec::new()), vec![0xc0]);

            let mut payload = Vec::new();
            append_bytes(&mut payload, b"cat");
            append_bytes(&mut payload, b"dog");
            assert_eq!(
                into_list(payload),
                vec![0xc8, 0x83, b'c', b'a', b't', 0x83, b'd', b'o', b'g']
            );
        }

        #[test]
        fn long_string_uses_length_of_length() {
            let input = vec![0xab; 60];
            let encoded = bytes(&input);
            assert_eq!(&encoded[..2], &[0xb8, 60]);
            assert_eq!(encoded.len(), 62);
        }
    }
}

struct LegacyTx<'a> {
    nonce: u64,
    gas_price: u128,
    gas: u64,
    to: &'a [u8],
    value: u128,
    data: &'a [u8],
}

impl LegacyTx<'_> {
    fn append_fields(&self, payload: &mut Vec<u8>) {
        rlp::append_uint(payload, u128::from(self.nonce));
        rlp::append_uint(payload, self.gas_price);
        rlp::append_uint(payload, u128::from(self.gas));
        rlp::append_bytes(payload, self.to);
        rlp::append_uint(payload, self.value);
        rlp::append_bytes(payload, self.data);
    }

    /// EIP-155 signing preimage: the six fields plus (chain_id, 0, 0).
    fn signing_preimage(&self, chain_id: u64) -> Vec<u8> {
        let mut payload = Vec::new();
        self.append_fields(&mut payload);
        rlp::append_uint(&mut payload, u128::from(chain_id));
        rlp::append_bytes(&mut payload, &[]);
        rlp::append_bytes(&mut payload, &[]);
        rlp::into_list(payload)
    }

    fn encode_signed(&self, v: u64, r: &[u8], s: &[u8]) -> Vec<u8> {
        let mut payload = Vec::new();
        self.append_fields(&mut payload);
        rlp::append_uint(&mut payload, u128::from(v));
        rlp::append_bytes(&mut payload, trim_leading_zeros(r));
        rlp::append_bytes(&mut payload, trim_leading_zeros(s));
        rlp::into_list(payload)
    }
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

fn sign_legacy(
    signing_key: &SigningKey,
    chain_id: u64,
    tx: &LegacyTx<'_>,
) -> Result<Vec<u8>, ChainError> {
    let digest = Keccak256::digest(tx.signing_preimage(chain_id));
    let (signature, recovery_id) = signing_key
        .sign_prehash_recoverable(&digest)
        .map_err(|e| ChainError::Signing(e.to_string()))?;

    let v = chain_id * 2 + 35 + u64::from(recovery_id.to_byte());
    let sig_bytes = signature.to_bytes();
    Ok(tx.encode_signed(v, &sig_bytes[..32], &sig_bytes[32..]))
}

#[async_trait]
impl ChainGateway for JsonRpcChain {
    async fn sign(
        &self,
        chain_id: u64,
        payload: &TxPayload,
        secret: &SecretString,
    ) -> Result<SignedTx, ChainError> {
        let signing_key =
            wallet::signing_key_from_hex(secret).map_err(|e| ChainError::Signing(e.to_string()))?;
        let from = wallet::address_of(&signing_key);

        let to = parse_address(&payload.to)?;
        let data = parse_call_data(&payload.data)?;
        let value: u128 = payload
            .value
            .parse()
            .map_err(|e| ChainError::InvalidPayload(format!("value '{}': {e}", payload.value)))?;

        let nonce = self
            .quantity(chain_id, "eth_getTransactionCount", json!([from, "pending"]))
            .await? as u64;

        let gas_price = match payload.gas_price {
            Some(price) => price,
            None => self.quantity(chain_id, "eth_gasPrice", json!([])).await?,
        };

        let gas = match payload.gas {
            Some(gas) => gas,
            None => {
                let call = json!({
                    "from": from,
                    "to": payload.to,
                    "value": format!("0x{value:x}"),
                    "data": payload.data,
                });
                self.quantity(chain_id, "eth_estimateGas", json!([call])).await? as u64
            }
        };

        let tx = LegacyTx {
            nonce,
            gas_price,
            gas,
            to: &to,
            value,
            data: &data,
        };
        sign_legacy(&signing_key, chain_id, &tx).map(SignedTx)
    }

    async fn broadcast(&self, chain_id: u64, tx: &SignedTx) -> Result<String, ChainError> {
        let result = self
            .rpc(chain_id, "eth_sendRawTransaction", json!([tx.raw_hex()]))
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ChainError::Malformed(format!("broadcast returned {result}")))
    }

    async fn poll_receipt(
        &self,
        chain_id: u64,
        tx_hash: &str,
        policy: &PollPolicy,
    ) -> Result<TxStatus, ChainError> {
        let attempts = policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            let receipt = self
                .rpc(chain_id, "eth_getTransactionReceipt", json!([tx_hash]))
                .await?;

            if receipt.is_null() {
                tracing::debug!(tx_hash, attempt, "no receipt yet");
                if attempt < attempts {
                    tokio::time::sleep(policy.interval).await;
                }
                continue;
            }

            let status = receipt
                .get("status")
                .and_then(Value::as_str)
                .ok_or_else(|| ChainError::Malformed(format!("receipt missing status: {receipt}")))?;
            return Ok(if parse_quantity(status)? == 1 {
                TxStatus::Confirmed
            } else {
                TxStatus::Reverted
            });
        }

        Err(ChainError::ConfirmationTimeout {
            tx_hash: tx_hash.to_string(),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::VerifyingKey;

    // EIP-155 example transaction: nonce 9, 20 gwei, 21000 gas, 1 ether to
    // 0x3535...35 on chain 1.
    fn example_tx(to: &[u8]) -> LegacyTx<'_> {
        LegacyTx {
            nonce: 9,
            gas_price: 20_000_000_000,
            gas: 21_000,
            to,
            value: 1_000_000_000_000_000_000,
            data: &[],
        }
    }

    #[test]
    fn eip155_signing_preimage_matches_reference() {
        let to = [0x35u8; 20];
        let preimage = example_tx(&to).signing_preimage(1);
        assert_eq!(
            hex::encode(&preimage),
            "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080"
        );
        assert_eq!(
            hex::encode(Keccak256::digest(&preimage)),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn signed_tx_recovers_to_signer() {
        let signing_key = SigningKey::from_slice(&[0x46u8; 32]).unwrap();
        let to = [0x35u8; 20];
        let tx = example_tx(&to);

        let digest = Keccak256::digest(tx.signing_preimage(1));
        let (signature, recovery_id) = signing_key.sign_prehash_recoverable(&digest).unwrap();
        let recovered =
            VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id).unwrap();
        assert_eq!(recovered, *signing_key.verifying_key());

        let raw = sign_legacy(&signing_key, 1, &tx).unwrap();
        let encoded = hex::encode(&raw);
        // Two-byte list header, then the unsigned fields, unchanged by
        // signing; v for chain 1 is 0x25 or 0x26.
        assert_eq!(
            &encoded[4..86],
            "098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080"
        );
        assert!(encoded[86..88] == *"25" || encoded[86..88] == *"26");
    }

    #[test]
    fn quantity_parsing() {
        assert_eq!(parse_quantity("0x1").unwrap(), 1);
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x4a817c800").unwrap(), 20_000_000_000);
        assert!(parse_quantity("bogus").is_err());
    }

    #[test]
    fn address_parsing_enforces_length() {
        assert!(parse_address("0x3535353535353535353535353535353535353535").is_ok());
        assert!(parse_address("0x35").is_err());
        assert!(parse_address("not hex").is_err());
    }

    #[test]
    fn default_poll_policy_is_sixty_seconds() {
        let policy = PollPolicy::default();
        assert_eq!(policy.max_attempts, 60);
        assert_eq!(policy.interval, Duration::from_secs(1));
    }
}
