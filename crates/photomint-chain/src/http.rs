//! JSON-RPC 2.0 client over HTTPS.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use photomint_core::{Address, ChainId, EngineError, Result, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rpc::NodeRpc;

/// JSON-RPC client backed by a shared `reqwest` connection pool.
pub struct HttpRpc {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    data: Option<Value>,
}

#[derive(Serialize)]
struct CallParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<Address>,
    to: Address,
    data: String,
}

impl HttpRpc {
    /// Creates a client for the node at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let body = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        tracing::debug!(method, url = %self.url, "issuing node request");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::read_failed(format!("{method} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::read_failed(format!(
                "{method} returned HTTP {status}"
            )));
        }

        let decoded: RpcResponse = response
            .json()
            .await
            .map_err(|e| EngineError::read_failed(format!("{method} response malformed: {e}")))?;

        if let Some(error) = decoded.error {
            tracing::warn!(method, code = error.code, message = %error.message, "node returned error");
            return Err(map_rpc_error(error));
        }

        decoded
            .result
            .ok_or_else(|| EngineError::read_failed(format!("{method} response carried no result")))
    }

    async fn quantity(&self, method: &str, params: Value) -> Result<U256> {
        let value = self.request(method, params).await?;
        parse_quantity(method, &value)
    }
}

#[async_trait]
impl NodeRpc for HttpRpc {
    async fn call(&self, from: Option<Address>, to: Address, data: Vec<u8>) -> Result<Vec<u8>> {
        let params = CallParams {
            from,
            to,
            data: format!("0x{}", hex::encode(&data)),
        };
        let params = serde_json::to_value(&params)
            .map_err(|e| EngineError::read_failed(format!("eth_call params: {e}")))?;
        let value = self
            .request("eth_call", Value::Array(vec![params, Value::from("latest")]))
            .await?;
        parse_data("eth_call", &value)
    }

    async fn balance(&self, account: Address) -> Result<U256> {
        let params = Value::Array(vec![
            Value::from(format!("{account:?}")),
            Value::from("latest"),
        ]);
        self.quantity("eth_getBalance", params).await
    }

    async fn chain_id(&self) -> Result<ChainId> {
        let raw = self
            .quantity("eth_chainId", Value::Array(Vec::new()))
            .await?;
        let id = u64::try_from(raw)
            .map_err(|_| EngineError::read_failed("eth_chainId out of range".to_string()))?;
        Ok(ChainId(id))
    }
}

/// Maps a node-level error to the engine taxonomy.
///
/// Reverts surface either as an `execution reverted` message or as ABI
/// revert data; both become [`EngineError::CallReverted`] so callers can
/// show the contract's reason. Everything else is a transient read
/// failure.
fn map_rpc_error(error: RpcError) -> EngineError {
    if let Some(Value::String(data)) = &error.data {
        let stripped = data.strip_prefix("0x").unwrap_or(data);
        if let Ok(bytes) = hex::decode(stripped) {
            if let Some(reason) = photomint_abi::revert_reason(&bytes) {
                return EngineError::call_reverted(reason);
            }
        }
    }
    if error.message.contains("revert") {
        return EngineError::call_reverted(error.message);
    }
    EngineError::read_failed(format!("node error {}: {}", error.code, error.message))
}

/// Parses a `0x`-prefixed hex quantity as returned by the quantity RPCs.
fn parse_quantity(method: &str, value: &Value) -> Result<U256> {
    let text = value
        .as_str()
        .ok_or_else(|| EngineError::read_failed(format!("{method} result is not a string")))?;
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| EngineError::read_failed(format!("{method} result lacks 0x prefix")))?;
    U256::from_str_radix(digits, 16)
        .map_err(|e| EngineError::read_failed(format!("{method} result not hex: {e}")))
}

/// Parses a `0x`-prefixed hex blob as returned by `eth_call`.
fn parse_data(method: &str, value: &Value) -> Result<Vec<u8>> {
    let text = value
        .as_str()
        .ok_or_else(|| EngineError::read_failed(format!("{method} result is not a string")))?;
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| EngineError::read_failed(format!("{method} result lacks 0x prefix")))?;
    hex::decode(digits).map_err(|e| EngineError::read_failed(format!("{method} result not hex: {e}")))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn quantity_parsing_accepts_short_hex() {
        let value = json!("0x1b");
        assert_eq!(
            parse_quantity("eth_getBalance", &value).unwrap(),
            U256::from(27)
        );
    }

    #[test]
    fn quantity_parsing_rejects_missing_prefix() {
        let value = json!("1b");
        assert_matches!(
            parse_quantity("eth_getBalance", &value),
            Err(EngineError::ReadFailed { .. })
        );
    }

    #[test]
    fn revert_data_is_decoded_to_a_reason() {
        let mut blob = hex::decode("08c379a0").unwrap();
        let mut tail = vec![0u8; 96];
        tail[31] = 0x20;
        tail[63] = 6;
        tail[64..70].copy_from_slice(b"denied");
        blob.extend_from_slice(&tail);

        let error = RpcError {
            code: 3,
            message: "execution reverted".to_string(),
            data: Some(json!(format!("0x{}", hex::encode(blob)))),
        };
        assert_matches!(
            map_rpc_error(error),
            EngineError::CallReverted { reason } if reason == "denied"
        );
    }

    #[test]
    fn revert_message_without_data_keeps_the_message() {
        let error = RpcError {
            code: 3,
            message: "execution reverted: paused".to_string(),
            data: None,
        };
        assert_matches!(
            map_rpc_error(error),
            EngineError::CallReverted { reason } if reason.contains("paused")
        );
    }

    #[test]
    fn plain_node_errors_stay_transient() {
        let error = RpcError {
            code: -32000,
            message: "header not found".to_string(),
            data: None,
        };
        let mapped = map_rpc_error(error);
        assert!(mapped.is_transient_read());
        assert_matches!(mapped, EngineError::ReadFailed { .. });
    }

    #[test]
    fn call_params_omit_from_when_unset() {
        let params = CallParams {
            from: None,
            to: Address::ZERO,
            data: "0x00".to_string(),
        };
        let encoded = serde_json::to_value(&params).unwrap();
        assert!(encoded.get("from").is_none());
        assert!(encoded.get("to").is_some());
    }
}
