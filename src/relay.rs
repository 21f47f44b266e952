//! RPC Relay (C5), grounded in
//! `avalanche/proxy_router.py::handle_send_raw_transaction`.

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::Value;

use crate::context::AppContext;
use crate::error::ProxyError;
use crate::store::models::{CommitmentStatus, UNKNOWN_SENDER};
use crate::store::{self};

#[derive(Debug, Deserialize)]
pub struct SendRawTransactionRequest {
    pub method: String,
    pub params: Vec<Value>,
}

/// `POST /eth_sendRawTransaction`. Validates the request shape, forwards
/// it verbatim to the configured validator, and on success records a
/// PENDING commitment and a SUBMITTED transaction in one session.
pub async fn handle_send_raw_transaction(
    State(ctx): State<AppContext>,
    body: Json<Value>,
) -> Result<Json<Value>, ProxyError> {
    let request: SendRawTransactionRequest =
        serde_json::from_value(body.0.clone()).map_err(|_| {
            ProxyError::RelayInvalidRequest("invalid request body".to_string())
        })?;

    if request.method != "eth_sendRawTransaction" {
        return Err(ProxyError::RelayInvalidRequest("Invalid method".to_string()));
    }
    if request.params.len() != 1 {
        return Err(ProxyError::RelayInvalidRequest("Invalid params".to_string()));
    }

    let response = ctx.validator.forward_raw(&body.0).await?;

    if let Some(error) = response.get("error") {
        let message = error
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("validator rejected the transaction");
        return Err(ProxyError::RelayValidatorRejected(message.to_string()));
    }

    let result = response
        .get("result")
        .ok_or(ProxyError::RelayMalformedResult)?;

    let (tx_hash, commitment_bytes, tx_index) = parse_extended_result(result)?;

    let from_address = decode_sender(&request.params[0]);
    let nonce = decode_nonce(&request.params[0]);

    let mut session = ctx.store.session().await?;

    store::upsert_submitted_transaction(
        session.conn(),
        &tx_hash,
        &from_address,
        nonce,
        None,
    )
    .await?;

    store::insert_commitment(
        session.conn(),
        &ctx.settings.network_name,
        &tx_hash,
        tx_index,
        Some(&commitment_bytes),
        CommitmentStatus::Pending,
    )
    .await?;

    store::bump_node_stats(session.conn(), &ctx.settings.network_name, 1, 0, 0).await?;

    session.commit().await?;

    Ok(Json(response))
}

fn parse_extended_result(result: &Value) -> Result<(Vec<u8>, Vec<u8>, i64), ProxyError> {
    let tx_hash_hex = result
        .get("txHash")
        .and_then(|v| v.as_str())
        .ok_or(ProxyError::RelayMalformedResult)?;
    let commitment_hex = result
        .get("commitment")
        .and_then(|v| v.as_str())
        .ok_or(ProxyError::RelayMalformedResult)?;
    let tx_index = result
        .get("txIndex")
        .and_then(|v| v.as_i64())
        .ok_or(ProxyError::RelayMalformedResult)?;

    let tx_hash = decode_hex(tx_hash_hex).map_err(|_| ProxyError::RelayMalformedResult)?;
    let commitment = decode_hex(commitment_hex).map_err(|_| ProxyError::RelayMalformedResult)?;

    Ok((tx_hash, commitment, tx_index))
}

fn decode_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s))
}

/// Best-effort extraction of sender/nonce from the raw transaction hex;
/// the original prototype does not decode the RLP payload either. The
/// sentinel returned here is overwritten by `upsert_submitted_transaction`
/// once the ingestor sees this transaction in a canonical block and upserts
/// its real `from`/`nonce`.
fn decode_sender(_raw_tx_param: &Value) -> String {
    UNKNOWN_SENDER.to_string()
}

fn decode_nonce(_raw_tx_param: &Value) -> i64 {
    0
}
