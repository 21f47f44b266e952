//! Persistent Store (C1).
//!
//! Wraps a `PgPool` and hands out scoped transactional [`Session`]s to the
//! ingestor, the verification engine, and the relay. Consistency relies on
//! Postgres row-level conflict detection for the `(node, tx_hash)` and
//! `block_number` keys these components touch, not on an in-process lock.

pub mod models;
pub mod session;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::ProxyError;
use models::*;
pub use session::Session;

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(dsn: &str) -> Result<Self, ProxyError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(dsn)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
            ProxyError::SchemaMismatch(format!("failed to run migrations: {e}"))
        })?;
        Ok(Store { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Wraps an already-migrated pool, used by `#[sqlx::test]` fixtures
    /// that apply `./migrations` themselves before handing back the pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Store { pool }
    }

    pub async fn session(&self) -> Result<Session<'_>, ProxyError> {
        Ok(Session::begin(&self.pool).await?)
    }

    /// Checks `AuxiliaryData(dbVersion)`/`AuxiliaryData(network)` against
    /// the sentinels this binary was built for, grounded in
    /// `common/upgrade.py::check_db_version`. On a fresh database, seeds
    /// both sentinels instead of failing.
    pub async fn check_schema_version(&self, network_name: &str) -> Result<(), ProxyError> {
        let mut session = self.session().await?;

        let version_row = get_auxiliary_data(session.conn(), DB_VERSION_KEY).await?;

        match version_row {
            None => {
                set_auxiliary_data(session.conn(), DB_VERSION_KEY, CURRENT_DB_VERSION).await?;
                set_auxiliary_data(session.conn(), NETWORK_NAME_KEY, network_name).await?;
            }
            Some(version) => {
                let stored_network = get_auxiliary_data(session.conn(), NETWORK_NAME_KEY)
                    .await?
                    .and_then(|row| row.value)
                    .unwrap_or_default();

                if stored_network != network_name {
                    return Err(ProxyError::SchemaMismatch(format!(
                        "DB network name mismatch. Expected: {network_name}, Actual: {stored_network}"
                    )));
                }

                let version = version.value.unwrap_or_default();
                if version != CURRENT_DB_VERSION {
                    return Err(ProxyError::SchemaMismatch(format!(
                        "DB version mismatch. Expected: {CURRENT_DB_VERSION}, Actual: {version}. \
                         Upgrade not implemented, exiting."
                    )));
                }
            }
        }

        session.commit().await?;
        Ok(())
    }
}

// -- Transaction rows ---------------------------------------------------

pub async fn get_transaction(
    conn: &mut sqlx::PgConnection,
    hash: &[u8],
) -> Result<Option<Transaction>, sqlx::Error> {
    sqlx::query_as::<_, Transaction>(
        "SELECT hash, status, from_address, nonce, replaces, created_at \
         FROM transactions WHERE hash = $1",
    )
    .bind(hash)
    .fetch_optional(conn)
    .await
}

/// Inserts a transaction if absent. Used by C5 on relay and C3 on ingest.
/// If the existing row's `from_address` is still the relay's
/// [`UNKNOWN_SENDER`] sentinel, a later upsert (typically the ingestor,
/// which reads `from`/`nonce` off the canonical block) overwrites both
/// columns with the values supplied here.
pub async fn upsert_submitted_transaction(
    conn: &mut sqlx::PgConnection,
    hash: &[u8],
    from_address: &str,
    nonce: i64,
    replaces: Option<&[u8]>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO transactions (hash, status, from_address, nonce, replaces) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (hash) DO UPDATE SET \
           from_address = EXCLUDED.from_address, \
           nonce = EXCLUDED.nonce \
         WHERE transactions.from_address = $6",
    )
    .bind(hash)
    .bind(TransactionStatus::Submitted.as_i16())
    .bind(from_address)
    .bind(nonce)
    .bind(replaces)
    .bind(UNKNOWN_SENDER)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn set_transaction_status(
    conn: &mut sqlx::PgConnection,
    hash: &[u8],
    status: TransactionStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE transactions SET status = $2 WHERE hash = $1")
        .bind(hash)
        .bind(status.as_i16())
        .execute(conn)
        .await?;
    Ok(())
}

// -- Commitment rows ------------------------------------------------------

pub async fn get_commitment(
    conn: &mut sqlx::PgConnection,
    node: &str,
    tx_hash: &[u8],
) -> Result<Option<Commitment>, sqlx::Error> {
    sqlx::query_as::<_, Commitment>(
        "SELECT id, node, tx_hash, index, accumulator, status, created_at \
         FROM commitments WHERE node = $1 AND tx_hash = $2",
    )
    .bind(node)
    .bind(tx_hash)
    .fetch_optional(conn)
    .await
}

pub async fn insert_commitment(
    conn: &mut sqlx::PgConnection,
    node: &str,
    tx_hash: &[u8],
    index: i64,
    accumulator: Option<&[u8]>,
    status: CommitmentStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO commitments (node, tx_hash, index, accumulator, status) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(node)
    .bind(tx_hash)
    .bind(index)
    .bind(accumulator)
    .bind(status.as_i16())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn set_commitment_status(
    conn: &mut sqlx::PgConnection,
    id: i64,
    status: CommitmentStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE commitments SET status = $2 WHERE id = $1")
        .bind(id)
        .bind(status.as_i16())
        .execute(conn)
        .await?;
    Ok(())
}

/// Commitments at `node` with the given status whose index falls in
/// `[start, end)`, ordered by index ascending — used by Step 5's omission
/// sweep and callable with an arbitrary window for other status scans.
pub async fn commitments_in_window(
    conn: &mut sqlx::PgConnection,
    node: &str,
    status: CommitmentStatus,
    start: i64,
    end: i64,
) -> Result<Vec<Commitment>, sqlx::Error> {
    sqlx::query_as::<_, Commitment>(
        "SELECT id, node, tx_hash, index, accumulator, status, created_at \
         FROM commitments \
         WHERE node = $1 AND status = $2 AND index >= $3 AND index < $4 \
         ORDER BY index ASC",
    )
    .bind(node)
    .bind(status.as_i16())
    .bind(start)
    .bind(end)
    .fetch_all(conn)
    .await
}

// -- Block / BlockTransaction rows ---------------------------------------

pub async fn get_block(
    conn: &mut sqlx::PgConnection,
    number: i64,
) -> Result<Option<Block>, sqlx::Error> {
    sqlx::query_as::<_, Block>(
        "SELECT number, hash, node_id, created_at FROM blocks WHERE number = $1",
    )
    .bind(number)
    .fetch_optional(conn)
    .await
}

pub async fn upsert_block(
    conn: &mut sqlx::PgConnection,
    number: i64,
    hash: &[u8],
    node_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO blocks (number, hash, node_id) VALUES ($1, $2, $3) \
         ON CONFLICT (number) DO NOTHING",
    )
    .bind(number)
    .bind(hash)
    .bind(node_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn insert_block_transaction(
    conn: &mut sqlx::PgConnection,
    block: i64,
    transaction: &[u8],
    order: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO block_transactions (block, transaction, \"order\") \
         VALUES ($1, $2, $3) ON CONFLICT (block, transaction) DO NOTHING",
    )
    .bind(block)
    .bind(transaction)
    .bind(order)
    .execute(conn)
    .await?;
    Ok(())
}

/// The block's transactions joined with their hashes, in `order` ascending
/// for iterating a block's transactions in order ascending.
pub async fn block_transactions_ordered(
    conn: &mut sqlx::PgConnection,
    block: i64,
) -> Result<Vec<(i64, Vec<u8>)>, sqlx::Error> {
    let rows: Vec<(i64, Vec<u8>)> = sqlx::query_as(
        "SELECT \"order\", transaction FROM block_transactions \
         WHERE block = $1 ORDER BY \"order\" ASC",
    )
    .bind(block)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

// -- BlockState rows ------------------------------------------------------

pub async fn get_block_state(
    conn: &mut sqlx::PgConnection,
    block_number: i64,
) -> Result<Option<BlockState>, sqlx::Error> {
    sqlx::query_as::<_, BlockState>(
        "SELECT block_number, offset_index, shift_index FROM block_state \
         WHERE block_number = $1",
    )
    .bind(block_number)
    .fetch_optional(conn)
    .await
}

pub async fn put_block_state(
    conn: &mut sqlx::PgConnection,
    state: &BlockState,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO block_state (block_number, offset_index, shift_index) \
         VALUES ($1, $2, $3)",
    )
    .bind(state.block_number)
    .bind(state.offset_index)
    .bind(state.shift_index)
    .execute(conn)
    .await?;
    Ok(())
}

// -- NodeStats rows ---------------------------------------------------------

pub async fn get_node_stats(
    conn: &mut sqlx::PgConnection,
    node: &str,
) -> Result<Option<NodeStats>, sqlx::Error> {
    sqlx::query_as::<_, NodeStats>(
        "SELECT node, total_transactions, reordered_count, censored_count, last_updated \
         FROM node_stats WHERE node = $1",
    )
    .bind(node)
    .fetch_optional(conn)
    .await
}

/// `NodeStats` counters are monotonically increasing deltas applied inside
/// the same session as the commitment mutations that produced them.
pub async fn bump_node_stats(
    conn: &mut sqlx::PgConnection,
    node: &str,
    total_transactions_delta: i64,
    reordered_delta: i64,
    censored_delta: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO node_stats (node, total_transactions, reordered_count, censored_count, last_updated) \
         VALUES ($1, $2, $3, $4, now()) \
         ON CONFLICT (node) DO UPDATE SET \
           total_transactions = node_stats.total_transactions + EXCLUDED.total_transactions, \
           reordered_count = node_stats.reordered_count + EXCLUDED.reordered_count, \
           censored_count = node_stats.censored_count + EXCLUDED.censored_count, \
           last_updated = now()",
    )
    .bind(node)
    .bind(total_transactions_delta)
    .bind(reordered_delta)
    .bind(censored_delta)
    .execute(conn)
    .await?;
    Ok(())
}

// -- AuxiliaryData rows ------------------------------------------------------

pub async fn get_auxiliary_data(
    conn: &mut sqlx::PgConnection,
    key: &str,
) -> Result<Option<AuxiliaryData>, sqlx::Error> {
    sqlx::query_as::<_, AuxiliaryData>("SELECT key, value FROM auxiliary_data WHERE key = $1")
        .bind(key)
        .fetch_optional(conn)
        .await
}

pub async fn set_auxiliary_data(
    conn: &mut sqlx::PgConnection,
    key: &str,
    value: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO auxiliary_data (key, value) VALUES ($1, $2) \
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
    )
    .bind(key)
    .bind(value)
    .execute(conn)
    .await?;
    Ok(())
}

// -- Dashboard read queries (C1 read-only surface) ------------------------

pub async fn list_transactions(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Vec<Transaction>, sqlx::Error> {
    sqlx::query_as::<_, Transaction>(
        "SELECT hash, status, from_address, nonce, replaces, created_at \
         FROM transactions ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn list_commitments(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Vec<Commitment>, sqlx::Error> {
    sqlx::query_as::<_, Commitment>(
        "SELECT id, node, tx_hash, index, accumulator, status, created_at \
         FROM commitments ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn list_blocks(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Vec<Block>, sqlx::Error> {
    sqlx::query_as::<_, Block>(
        "SELECT number, hash, node_id, created_at \
         FROM blocks ORDER BY number DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn list_node_stats(pool: &PgPool) -> Result<Vec<NodeStats>, sqlx::Error> {
    sqlx::query_as::<_, NodeStats>(
        "SELECT node, total_transactions, reordered_count, censored_count, last_updated \
         FROM node_stats ORDER BY node ASC",
    )
    .fetch_all(pool)
    .await
}
