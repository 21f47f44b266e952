//! Entity graph for the persistent store.
//!
//! Dynamic integer status codes in the original become exhaustive Rust
//! enums, stored as `SMALLINT` and converted at the store boundary.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Submitted,
    InBlock,
    Error,
}

impl TransactionStatus {
    pub fn as_i16(self) -> i16 {
        match self {
            TransactionStatus::Submitted => 0,
            TransactionStatus::InBlock => 1,
            TransactionStatus::Error => 2,
        }
    }

    pub fn from_i16(v: i16) -> Self {
        match v {
            1 => TransactionStatus::InBlock,
            2 => TransactionStatus::Error,
            _ => TransactionStatus::Submitted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitmentStatus {
    Pending,
    Fulfilled,
    Omitted,
    Reordered,
    Revoked,
    Unexpected,
}

impl CommitmentStatus {
    pub fn as_i16(self) -> i16 {
        match self {
            CommitmentStatus::Pending => 0,
            CommitmentStatus::Fulfilled => 1,
            CommitmentStatus::Omitted => 2,
            CommitmentStatus::Reordered => 3,
            CommitmentStatus::Revoked => 4,
            CommitmentStatus::Unexpected => 5,
        }
    }

    pub fn from_i16(v: i16) -> Self {
        match v {
            1 => CommitmentStatus::Fulfilled,
            2 => CommitmentStatus::Omitted,
            3 => CommitmentStatus::Reordered,
            4 => CommitmentStatus::Revoked,
            5 => CommitmentStatus::Unexpected,
            _ => CommitmentStatus::Pending,
        }
    }

    /// Statuses that are terminal within the engine: once reached,
    /// a commitment is never mutated again except OMITTED -> REORDERED.
    pub fn is_terminal(self) -> bool {
        !matches!(self, CommitmentStatus::Pending)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Transaction {
    pub hash: Vec<u8>,
    #[sqlx(rename = "status")]
    pub status_raw: i16,
    pub from_address: String,
    pub nonce: i64,
    pub replaces: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn status(&self) -> TransactionStatus {
        TransactionStatus::from_i16(self.status_raw)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Commitment {
    pub id: i64,
    pub node: String,
    pub tx_hash: Vec<u8>,
    pub index: i64,
    pub accumulator: Option<Vec<u8>>,
    #[sqlx(rename = "status")]
    pub status_raw: i16,
    pub created_at: DateTime<Utc>,
}

impl Commitment {
    pub fn status(&self) -> CommitmentStatus {
        CommitmentStatus::from_i16(self.status_raw)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Block {
    pub number: i64,
    pub hash: Vec<u8>,
    pub node_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct BlockTransaction {
    pub block: i64,
    pub transaction: Vec<u8>,
    #[sqlx(rename = "order")]
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct BlockState {
    pub block_number: i64,
    pub offset_index: i64,
    pub shift_index: i64,
}

impl BlockState {
    /// Zeros synthesized for the block-1 precondition.
    pub fn zero(block_number: i64) -> Self {
        BlockState {
            block_number,
            offset_index: 0,
            shift_index: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct NodeStats {
    pub node: String,
    pub total_transactions: i64,
    pub reordered_count: i64,
    pub censored_count: i64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AuxiliaryData {
    pub key: String,
    pub value: Option<String>,
}

pub const DB_VERSION_KEY: &str = "dbVersion";
pub const NETWORK_NAME_KEY: &str = "network";
pub const CURRENT_DB_VERSION: &str = "20";

/// Sentinel `from_address` the relay writes when it cannot decode the
/// sender from a raw transaction; `Store::upsert_submitted_transaction`
/// overwrites a row still carrying this value once the real sender is
/// known.
pub const UNKNOWN_SENDER: &str = "unknown";
