//! WebSocket `newHeads` subscriber variant of C2, grounded in
//! `avalanche/ws_blocks.py::WebSocketListener`.
//!
//! Unlike a flat retry delay, the backoff here grows exponentially up to
//! a ceiling, and a run of consecutive failures raises visibility via a
//! warning without ever exiting the process — the relay must keep
//! accepting writes regardless of how unhealthy the block feed is.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use super::BlockEvent;
use crate::rpc_client::get_node_id;

const INITIAL_BACKOFF: std::time::Duration = std::time::Duration::from_secs(5);
const MAX_BACKOFF: std::time::Duration = std::time::Duration::from_secs(60);
const FAILURES_BEFORE_WARNING: u32 = 5;

pub async fn run(url: &str, sender: mpsc::Sender<BlockEvent>) {
    let mut backoff = INITIAL_BACKOFF;
    let mut consecutive_failures: u32 = 0;

    loop {
        match connect_and_process(url, &sender).await {
            Ok(()) => {
                // The channel's receiver was dropped; nothing left to do.
                return;
            }
            Err(e) => {
                consecutive_failures += 1;
                tracing::error!(error = %e, consecutive_failures, "error in WebSocket connection");
                if consecutive_failures >= FAILURES_BEFORE_WARNING {
                    tracing::warn!(
                        consecutive_failures,
                        "block event source has failed repeatedly; relay continues accepting writes"
                    );
                }
            }
        }

        tracing::info!(backoff_secs = backoff.as_secs(), "reconnecting to validator WebSocket");
        tokio::time::sleep(backoff).await;
        backoff = std::cmp::min(backoff * 2, MAX_BACKOFF);
    }
}

async fn connect_and_process(
    url: &str,
    sender: &mpsc::Sender<BlockEvent>,
) -> anyhow::Result<()> {
    let parsed = url::Url::parse(url)?;
    let node_id = get_node_id(&parsed)
        .await?
        .ok_or_else(|| anyhow::anyhow!("validator did not return a node ID"))?;
    tracing::info!(node_id, "resolved validator node ID");

    let (mut socket, _response) = tokio_tungstenite::connect_async(url).await?;
    tracing::info!(url, "connected to validator WebSocket");

    let subscribe = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_subscribe",
        "params": ["newHeads"],
    });
    socket.send(Message::Text(subscribe.to_string())).await?;

    while let Some(message) = socket.next().await {
        let message = message?;
        let Message::Text(text) = message else {
            continue;
        };
        let data: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "could not parse WebSocket frame as JSON");
                continue;
            }
        };

        let Some(result) = data.get("params").and_then(|p| p.get("result")) else {
            tracing::debug!(frame = %text, "received non-notification WebSocket message");
            continue;
        };

        // `newHeads` notifications carry header fields only (`number`,
        // `hash`, `parentHash`, ...), never `transactions` — the full block
        // must still be fetched by number, the same as the DB-channel
        // source variant.
        match result.get("number").and_then(|v| v.as_str()) {
            Some(hex) => {
                let stripped = hex.strip_prefix("0x").unwrap_or(hex);
                match u64::from_str_radix(stripped, 16) {
                    Ok(number) => {
                        tracing::info!(number, "new block received");
                        if sender.send(BlockEvent::Number(number)).await.is_err() {
                            return Ok(());
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, hex, "malformed block number in newHeads frame"),
                }
            }
            None => tracing::warn!(frame = %text, "newHeads frame missing `number`"),
        }
    }

    anyhow::bail!("WebSocket connection closed")
}
