//! HTTP JSON-RPC transport to the validator node.
//!
//! Grounded in `avalanche/block_parser.py::get_cchain_block_by_number` and
//! `avalanche/ws_blocks.py::get_node_id`.

use serde_json::{json, Value};

use crate::error::ProxyError;

#[derive(Clone)]
pub struct ValidatorClient {
    http: reqwest::Client,
    rpc_url: String,
}

impl ValidatorClient {
    pub fn new(rpc_url: String) -> Self {
        ValidatorClient {
            http: reqwest::Client::new(),
            rpc_url,
        }
    }

    /// `eth_getBlockByNumber(hex, true)` — standard Ethereum-style reply,
    /// full transaction objects requested so C3 can read `from`/`nonce`.
    pub async fn get_block_by_number(&self, number: u64) -> Result<Option<Value>, ProxyError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getBlockByNumber",
            "params": [format!("0x{:x}", number), true],
        });

        let response = self
            .http
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(ProxyError::RelayValidatorTransport)?;

        let body: Value = response
            .json()
            .await
            .map_err(ProxyError::RelayValidatorTransport)?;

        Ok(body.get("result").cloned().filter(|v| !v.is_null()))
    }

    /// Forwards an `eth_sendRawTransaction` body verbatim to the validator
    /// and returns the raw JSON reply.
    pub async fn forward_raw(&self, body: &Value) -> Result<Value, ProxyError> {
        let response = self
            .http
            .post(&self.rpc_url)
            .json(body)
            .send()
            .await
            .map_err(ProxyError::RelayValidatorTransport)?;

        response
            .json::<Value>()
            .await
            .map_err(ProxyError::RelayValidatorTransport)
    }
}

/// `info.getNodeID` (HTTP POST to `/ext/info`) — derives the `/ext/info`
/// URL from a `ws(s)://` or `http(s)://` base, mirroring
/// `WebSocketListener.__get_node_id` in the original.
pub async fn get_node_id(base_url: &url::Url) -> Result<Option<String>, ProxyError> {
    let scheme = match base_url.scheme() {
        "wss" => "https",
        "ws" => "http",
        other => other,
    };
    let mut info_url = base_url.clone();
    let _ = info_url.set_scheme(scheme);
    info_url.set_path("/ext/info");

    let payload = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "info.getNodeID",
        "params": {},
    });

    let client = reqwest::Client::new();
    let response = client
        .post(info_url)
        .json(&payload)
        .send()
        .await
        .map_err(ProxyError::RelayValidatorTransport)?;

    if !response.status().is_success() {
        return Ok(None);
    }

    let body: Value = response
        .json()
        .await
        .map_err(ProxyError::RelayValidatorTransport)?;

    Ok(body
        .get("result")
        .and_then(|r| r.get("nodeID"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string()))
}
