//! Verification Engine (C4) — the core reconciliation algorithm.
//!
//! Per block number and node id, reconciles actual block contents against
//! prior commitments, mutates commitment status, updates per-node
//! statistics, and advances `BlockState`. Any failure inside the
//! reconciliation rolls back the whole session; `BlockState(N)` is then
//! never written and the event may be retried.

use std::collections::HashSet;

use crate::error::ProxyError;
use crate::store::models::{BlockState, CommitmentStatus, TransactionStatus};
use crate::store::{self, Store};

#[derive(Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// `Block(N)` has no row yet (`BLOCK_NOT_FOUND`); event may be re-delivered.
    BlockNotFound,
    /// `BlockState(N-1)` is missing for N > 1 (`PREV_STATE_MISSING`);
    /// requires operator intervention or out-of-order redelivery.
    PrevStateMissing,
    /// `BlockState(N)` already existed; re-delivery is a no-op.
    AlreadyProcessed,
    Processed(BlockState),
}

/// Reconciles block `block_number` under `node_id` against prior
/// commitments, advancing `BlockState` by one block.
pub async fn verify_block(
    store: &Store,
    node_id: &str,
    block_number: i64,
) -> Result<VerifyOutcome, ProxyError> {
    let mut session = store.session().await?;

    if store::get_block_state(session.conn(), block_number)
        .await?
        .is_some()
    {
        session.rollback().await?;
        return Ok(VerifyOutcome::AlreadyProcessed);
    }

    let Some(block) = store::get_block(session.conn(), block_number).await? else {
        tracing::warn!(block_number, "BLOCK_NOT_FOUND");
        session.rollback().await?;
        return Ok(VerifyOutcome::BlockNotFound);
    };

    let prev = if block_number == 1 {
        match store::get_block_state(session.conn(), 0).await? {
            Some(state) => state,
            None => BlockState::zero(0),
        }
    } else {
        match store::get_block_state(session.conn(), block_number - 1).await? {
            Some(state) => state,
            None => {
                tracing::warn!(block_number, "PREV_STATE_MISSING");
                session.rollback().await?;
                return Ok(VerifyOutcome::PrevStateMissing);
            }
        }
    };

    // Step 1.
    let offset = prev.offset_index;
    let shift = prev.shift_index;
    let start_range = offset + 1;
    let mut reordered_txs: i64 = 0;
    let mut processed_indexes: HashSet<i64> = HashSet::new();
    let mut current_order: i64 = 0;

    let tx_list = store::block_transactions_ordered(session.conn(), block.number).await?;

    // Step 2.
    for (_order, tx_hash) in &tx_list {
        store::set_transaction_status(session.conn(), tx_hash, TransactionStatus::InBlock)
            .await?;

        // Replacement rule (b).
        if let Some(tx) = store::get_transaction(session.conn(), tx_hash).await? {
            if let Some(replaces) = tx.replaces {
                if let Some(prior) = store::get_commitment(session.conn(), node_id, &replaces).await? {
                    if matches!(
                        prior.status(),
                        CommitmentStatus::Pending | CommitmentStatus::Omitted
                    ) {
                        store::set_commitment_status(
                            session.conn(),
                            prior.id,
                            CommitmentStatus::Revoked,
                        )
                        .await?;
                    }
                }
            }
        }

        // Lookup (c).
        match store::get_commitment(session.conn(), node_id, tx_hash).await? {
            None => {
                current_order += 1;
                store::insert_commitment(
                    session.conn(),
                    node_id,
                    tx_hash,
                    current_order,
                    None,
                    CommitmentStatus::Unexpected,
                )
                .await?;
            }
            Some(commitment) => match commitment.status() {
                CommitmentStatus::Omitted => {
                    store::set_commitment_status(
                        session.conn(),
                        commitment.id,
                        CommitmentStatus::Reordered,
                    )
                    .await?;
                    reordered_txs += 1;
                }
                CommitmentStatus::Pending => {
                    store::set_commitment_status(
                        session.conn(),
                        commitment.id,
                        CommitmentStatus::Fulfilled,
                    )
                    .await?;
                    processed_indexes.insert(commitment.index);
                }
                _ => {
                    tracing::warn!(
                        node = node_id,
                        tx_hash = %hex::encode(tx_hash),
                        "COMMITMENT_ALREADY_PROCESSED"
                    );
                }
            },
        }
    }

    // Step 3.
    let total_new_txs = tx_list.len() as i64 - reordered_txs;
    let end_range = start_range + total_new_txs + shift;

    // Step 4.
    let out_of_range_txs = processed_indexes
        .iter()
        .filter(|idx| **idx < start_range || **idx >= end_range)
        .count() as i64;

    // Step 5.
    let candidates = store::commitments_in_window(
        session.conn(),
        node_id,
        CommitmentStatus::Pending,
        start_range,
        end_range,
    )
    .await?;
    let sweep_count = total_new_txs.max(0) as usize;
    let mut censored_count: i64 = 0;
    for commitment in candidates.into_iter().take(sweep_count) {
        store::set_commitment_status(session.conn(), commitment.id, CommitmentStatus::Omitted)
            .await?;
        censored_count += 1;
    }

    // Step 6.
    let new_state = BlockState {
        block_number,
        offset_index: offset + total_new_txs,
        shift_index: shift + out_of_range_txs,
    };
    store::put_block_state(session.conn(), &new_state).await?;

    // Step 7.
    store::bump_node_stats(session.conn(), node_id, 0, reordered_txs, censored_count).await?;

    session.commit().await?;

    tracing::info!(
        block_number,
        node = node_id,
        offset_index = new_state.offset_index,
        shift_index = new_state.shift_index,
        reordered_txs,
        censored_count,
        "block verified"
    );

    Ok(VerifyOutcome::Processed(new_state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    async fn seed_block(pool: &PgPool, number: i64, node_id: &str, tx_hashes: &[&[u8]]) {
        let mut conn = pool.acquire().await.unwrap();
        store::upsert_block(&mut conn, number, format!("block{number}").as_bytes(), node_id)
            .await
            .unwrap();
        for (i, hash) in tx_hashes.iter().enumerate() {
            store::upsert_submitted_transaction(&mut conn, hash, "dummy", 0, None)
                .await
                .unwrap();
            store::insert_block_transaction(&mut conn, number, hash, (i + 1) as i64)
                .await
                .unwrap();
        }
    }

    async fn seed_commitment(pool: &PgPool, node: &str, index: i64, tx_hash: &[u8]) {
        let mut conn = pool.acquire().await.unwrap();
        store::upsert_submitted_transaction(&mut conn, tx_hash, "dummy", 0, None)
            .await
            .unwrap();
        store::insert_commitment(
            &mut conn,
            node,
            tx_hash,
            index,
            None,
            CommitmentStatus::Pending,
        )
        .await
        .unwrap();
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn sunny_day_all_fulfilled(pool: PgPool) {
        let store = Store::from_pool(pool.clone());
        seed_block(&pool, 1, "nodeF", &[b"abcdef", b"123456", b"deadbe"]).await;
        seed_commitment(&pool, "nodeF", 1, b"abcdef").await;
        seed_commitment(&pool, "nodeF", 2, b"123456").await;
        seed_commitment(&pool, "nodeF", 3, b"deadbe").await;

        let outcome = verify_block(&store, "nodeF", 1).await.unwrap();
        match outcome {
            VerifyOutcome::Processed(state) => {
                assert_eq!(state.offset_index, 3);
                assert_eq!(state.shift_index, 0);
            }
            other => panic!("expected Processed, got {other:?}"),
        }

        let mut conn = pool.acquire().await.unwrap();
        for hash in [b"abcdef".as_slice(), b"123456", b"deadbe"] {
            let c = store::get_commitment(&mut conn, "nodeF", hash)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(c.status(), CommitmentStatus::Fulfilled);
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn empty_block_is_a_no_op(pool: PgPool) {
        let store = Store::from_pool(pool.clone());
        seed_block(&pool, 1, "nodeX", &[]).await;

        let outcome = verify_block(&store, "nodeX", 1).await.unwrap();
        match outcome {
            VerifyOutcome::Processed(state) => {
                assert_eq!(state.offset_index, 0);
                assert_eq!(state.shift_index, 0);
            }
            other => panic!("expected Processed, got {other:?}"),
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn missing_commitment_creates_unexpected(pool: PgPool) {
        let store = Store::from_pool(pool.clone());
        seed_block(&pool, 1, "nodeB", &[b"ZZZZ", b"111111"]).await;
        seed_commitment(&pool, "nodeB", 2, b"111111").await;

        let outcome = verify_block(&store, "nodeB", 1).await.unwrap();
        match outcome {
            VerifyOutcome::Processed(state) => {
                assert_eq!(state.offset_index, 2);
                assert_eq!(state.shift_index, 0);
            }
            other => panic!("expected Processed, got {other:?}"),
        }

        let mut conn = pool.acquire().await.unwrap();
        let fulfilled = store::get_commitment(&mut conn, "nodeB", b"111111")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fulfilled.status(), CommitmentStatus::Fulfilled);

        let unexpected = store::get_commitment(&mut conn, "nodeB", b"ZZZZ")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unexpected.status(), CommitmentStatus::Unexpected);
        assert_eq!(unexpected.index, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn block_not_found_writes_no_state(pool: PgPool) {
        let store = Store::from_pool(pool.clone());
        let outcome = verify_block(&store, "nodeZ", 999).await.unwrap();
        assert_eq!(outcome, VerifyOutcome::BlockNotFound);

        let mut conn = pool.acquire().await.unwrap();
        assert!(store::get_block_state(&mut conn, 999).await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn replacement_revokes_prior_commitment(pool: PgPool) {
        let store = Store::from_pool(pool.clone());
        {
            let mut conn = pool.acquire().await.unwrap();
            store::upsert_submitted_transaction(&mut conn, b"oldtx000", "alice", 0, None)
                .await
                .unwrap();
            store::insert_commitment(
                &mut conn,
                "nodeC",
                b"oldtx000",
                1,
                None,
                CommitmentStatus::Pending,
            )
            .await
            .unwrap();
            store::upsert_submitted_transaction(
                &mut conn,
                b"newtx000",
                "alice",
                1,
                Some(b"oldtx000"),
            )
            .await
            .unwrap();
        }
        seed_block(&pool, 1, "nodeC", &[b"newtx000"]).await;

        verify_block(&store, "nodeC", 1).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let old = store::get_commitment(&mut conn, "nodeC", b"oldtx000")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(old.status(), CommitmentStatus::Revoked);

        let new_commitment = store::get_commitment(&mut conn, "nodeC", b"newtx000")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(new_commitment.status(), CommitmentStatus::Unexpected);

        let tx = store::get_transaction(&mut conn, b"newtx000")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.status(), TransactionStatus::InBlock);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn extra_pending_outside_window_stays_pending(pool: PgPool) {
        let store = Store::from_pool(pool.clone());
        {
            let mut conn = pool.acquire().await.unwrap();
            store::put_block_state(
                &mut conn,
                &BlockState {
                    block_number: 1,
                    offset_index: 1,
                    shift_index: 0,
                },
            )
            .await
            .unwrap();
        }
        seed_block(&pool, 2, "nodeD", &[b"222222", b"333333"]).await;
        seed_commitment(&pool, "nodeD", 2, b"222222").await;
        seed_commitment(&pool, "nodeD", 3, b"333333").await;
        seed_commitment(&pool, "nodeD", 4, b"444444").await;

        let outcome = verify_block(&store, "nodeD", 2).await.unwrap();
        match outcome {
            VerifyOutcome::Processed(state) => {
                assert_eq!(state.offset_index, 3);
                assert_eq!(state.shift_index, 0);
            }
            other => panic!("expected Processed, got {other:?}"),
        }

        let mut conn = pool.acquire().await.unwrap();
        let c2 = store::get_commitment(&mut conn, "nodeD", b"222222")
            .await
            .unwrap()
            .unwrap();
        let c3 = store::get_commitment(&mut conn, "nodeD", b"333333")
            .await
            .unwrap()
            .unwrap();
        let c4 = store::get_commitment(&mut conn, "nodeD", b"444444")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(c2.status(), CommitmentStatus::Fulfilled);
        assert_eq!(c3.status(), CommitmentStatus::Fulfilled);
        assert_eq!(c4.status(), CommitmentStatus::Pending);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn omission_then_reorder_across_blocks(pool: PgPool) {
        let store = Store::from_pool(pool.clone());

        seed_block(&pool, 1, "nodeF", &[b"aaaaaa", b"bbbbbb"]).await;
        seed_commitment(&pool, "nodeF", 1, b"aaaaaa").await;
        seed_commitment(&pool, "nodeF", 2, b"bbbbbb").await;
        verify_block(&store, "nodeF", 1).await.unwrap();

        seed_commitment(&pool, "nodeF", 3, b"cccccc").await;
        seed_commitment(&pool, "nodeF", 4, b"dddddd").await;
        seed_block(&pool, 2, "nodeF", &[b"dddddd"]).await;

        let outcome = verify_block(&store, "nodeF", 2).await.unwrap();
        match outcome {
            VerifyOutcome::Processed(state) => {
                assert_eq!(state.offset_index, 3);
                assert_eq!(state.shift_index, 1);
            }
            other => panic!("expected Processed, got {other:?}"),
        }

        {
            let mut conn = pool.acquire().await.unwrap();
            let c3 = store::get_commitment(&mut conn, "nodeF", b"cccccc")
                .await
                .unwrap()
                .unwrap();
            assert_eq!(c3.status(), CommitmentStatus::Omitted);
            let c4 = store::get_commitment(&mut conn, "nodeF", b"dddddd")
                .await
                .unwrap()
                .unwrap();
            assert_eq!(c4.status(), CommitmentStatus::Fulfilled);
        }

        seed_commitment(&pool, "nodeF", 5, b"eeeeee").await;
        seed_commitment(&pool, "nodeF", 6, b"ffffff").await;
        seed_commitment(&pool, "nodeF", 7, b"fffff2").await;
        seed_block(&pool, 3, "nodeF", &[b"eeeeee", b"cccccc", b"ffffaq"]).await;

        let outcome = verify_block(&store, "nodeF", 3).await.unwrap();
        match outcome {
            VerifyOutcome::Processed(state) => {
                assert_eq!(state.offset_index, 5);
                assert_eq!(state.shift_index, 1);
            }
            other => panic!("expected Processed, got {other:?}"),
        }

        let mut conn = pool.acquire().await.unwrap();
        let c3 = store::get_commitment(&mut conn, "nodeF", b"cccccc")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(c3.status(), CommitmentStatus::Reordered);

        let c5 = store::get_commitment(&mut conn, "nodeF", b"eeeeee")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(c5.status(), CommitmentStatus::Fulfilled);

        let unexpected = store::get_commitment(&mut conn, "nodeF", b"ffffaq")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unexpected.status(), CommitmentStatus::Unexpected);

        let c6 = store::get_commitment(&mut conn, "nodeF", b"ffffff")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(c6.status(), CommitmentStatus::Omitted);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn reprocessing_is_idempotent(pool: PgPool) {
        let store = Store::from_pool(pool.clone());
        seed_block(&pool, 1, "nodeI", &[b"abcdef"]).await;
        seed_commitment(&pool, "nodeI", 1, b"abcdef").await;

        verify_block(&store, "nodeI", 1).await.unwrap();
        let outcome = verify_block(&store, "nodeI", 1).await.unwrap();
        assert_eq!(outcome, VerifyOutcome::AlreadyProcessed);
    }
}
