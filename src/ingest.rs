//! Block Ingestor (C3).
//!
//! On each block-number event, fetches the canonical block, upserts
//! `Block` + `BlockTransaction` rows in one session, and signals the
//! verification engine. Idempotent: re-ingesting an existing block number
//! is a no-op.

use serde_json::Value;

use crate::error::ProxyError;
use crate::rpc_client::ValidatorClient;
use crate::store::Store;

pub struct Ingestor {
    store: Store,
    validator: ValidatorClient,
    node_id: String,
}

impl Ingestor {
    pub fn new(store: Store, validator: ValidatorClient, node_id: String) -> Self {
        Ingestor {
            store,
            validator,
            node_id,
        }
    }

    /// Ingests block `number`, fetching it from the validator RPC. Returns
    /// `Ok(true)` if a new `Block` row was written, `Ok(false)` if the
    /// block was already present (idempotent no-op) or had no canonical
    /// representation yet.
    pub async fn ingest_block_number(&self, number: u64) -> Result<bool, ProxyError> {
        let Some(block) = self.validator.get_block_by_number(number).await? else {
            tracing::warn!(number, "validator has no block at this height yet");
            return Ok(false);
        };
        self.ingest_block_payload(&block).await
    }

    /// Ingests a block already extracted from a trusted push payload (the
    /// WebSocket `newHeads` path), avoiding a redundant RPC round-trip.
    pub async fn ingest_block_payload(&self, block: &Value) -> Result<bool, ProxyError> {
        let number = parse_hex_u64(block.get("number")).ok_or_else(|| {
            ProxyError::IngestMalformed("block missing or malformed `number`".to_string())
        })?;

        let hash_hex = block
            .get("hash")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProxyError::IngestMalformed("block missing `hash`".to_string()))?;
        let hash = decode_hex(hash_hex)
            .map_err(|e| ProxyError::IngestMalformed(format!("bad block hash: {e}")))?;

        let txs = block
            .get("transactions")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                ProxyError::IngestMalformed("`transactions` is missing or not a list".to_string())
            })?;

        let mut session = self.store.session().await?;

        let inserted = crate::store::upsert_block(
            session.conn(),
            number as i64,
            &hash,
            &self.node_id,
        )
        .await?;

        if !inserted {
            // Block already ingested; nothing else to do.
            session.rollback().await?;
            return Ok(false);
        }

        for (i, tx) in txs.iter().enumerate() {
            let order = (i + 1) as i64;
            let tx_hash_hex = match tx.get("hash").and_then(|v| v.as_str()) {
                Some(h) => h,
                None => continue,
            };
            let tx_hash = match decode_hex(tx_hash_hex) {
                Ok(h) => h,
                Err(_) => continue,
            };
            let from_address = tx
                .get("from")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string();
            let nonce = tx
                .get("nonce")
                .and_then(|v| v.as_str())
                .and_then(|s| parse_hex_u64_str(s))
                .unwrap_or(0) as i64;

            crate::store::upsert_submitted_transaction(
                session.conn(),
                &tx_hash,
                &from_address,
                nonce,
                None,
            )
            .await?;
            crate::store::insert_block_transaction(session.conn(), number as i64, &tx_hash, order)
                .await?;
        }

        session.commit().await?;
        tracing::info!(number, tx_count = txs.len(), "ingested block");
        Ok(true)
    }
}

fn parse_hex_u64(value: Option<&Value>) -> Option<u64> {
    value.and_then(|v| v.as_str()).and_then(parse_hex_u64_str)
}

fn parse_hex_u64_str(s: &str) -> Option<u64> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(stripped, 16).ok()
}

fn decode_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_block_number() {
        assert_eq!(parse_hex_u64_str("0x1b4"), Some(436));
        assert_eq!(parse_hex_u64_str("1b4"), Some(436));
        assert_eq!(parse_hex_u64_str("nope"), None);
    }

    #[test]
    fn decodes_prefixed_and_bare_hex() {
        assert_eq!(decode_hex("0xabcdef").unwrap(), vec![0xab, 0xcd, 0xef]);
        assert_eq!(decode_hex("abcdef").unwrap(), vec![0xab, 0xcd, 0xef]);
        assert!(decode_hex("zz").is_err());
    }
}
