//! Read-only dashboard surface (C1). The original prototype's
//! `dashboard.py` is a static stub, so these handlers are modeled on the
//! ORM queries the rest of the store performs rather than on existing
//! endpoint code.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::ProxyError;
use crate::store::{self, models};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageParams {
    fn bounded_limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    fn bounded_offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub hash: String,
    pub status: &'static str,
    pub from_address: String,
    pub nonce: i64,
    pub replaces: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<models::Transaction> for TransactionView {
    fn from(t: models::Transaction) -> Self {
        TransactionView {
            hash: hex::encode(&t.hash),
            status: status_label(t.status()),
            from_address: t.from_address,
            nonce: t.nonce,
            replaces: t.replaces.as_deref().map(hex::encode),
            created_at: t.created_at,
        }
    }
}

fn status_label(status: models::TransactionStatus) -> &'static str {
    match status {
        models::TransactionStatus::Submitted => "SUBMITTED",
        models::TransactionStatus::InBlock => "IN_BLOCK",
        models::TransactionStatus::Error => "ERROR",
    }
}

#[derive(Debug, Serialize)]
pub struct CommitmentView {
    pub id: i64,
    pub node: String,
    pub tx_hash: String,
    pub index: i64,
    pub accumulator: Option<String>,
    pub status: &'static str,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<models::Commitment> for CommitmentView {
    fn from(c: models::Commitment) -> Self {
        CommitmentView {
            id: c.id,
            node: c.node.clone(),
            tx_hash: hex::encode(&c.tx_hash),
            index: c.index,
            accumulator: c.accumulator.as_deref().map(hex::encode),
            status: commitment_status_label(c.status()),
            created_at: c.created_at,
        }
    }
}

fn commitment_status_label(status: models::CommitmentStatus) -> &'static str {
    match status {
        models::CommitmentStatus::Pending => "PENDING",
        models::CommitmentStatus::Fulfilled => "FULFILLED",
        models::CommitmentStatus::Omitted => "OMITTED",
        models::CommitmentStatus::Reordered => "REORDERED",
        models::CommitmentStatus::Revoked => "REVOKED",
        models::CommitmentStatus::Unexpected => "UNEXPECTED",
    }
}

#[derive(Debug, Serialize)]
pub struct BlockView {
    pub number: i64,
    pub hash: String,
    pub node_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<models::Block> for BlockView {
    fn from(b: models::Block) -> Self {
        BlockView {
            number: b.number,
            hash: hex::encode(&b.hash),
            node_id: b.node_id,
            created_at: b.created_at,
        }
    }
}

pub async fn list_transactions(
    State(ctx): State<AppContext>,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<TransactionView>>, ProxyError> {
    let rows = store::list_transactions(ctx.store.pool(), page.bounded_limit(), page.bounded_offset())
        .await?;
    Ok(Json(rows.into_iter().map(TransactionView::from).collect()))
}

pub async fn list_commitments(
    State(ctx): State<AppContext>,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<CommitmentView>>, ProxyError> {
    let rows = store::list_commitments(ctx.store.pool(), page.bounded_limit(), page.bounded_offset())
        .await?;
    Ok(Json(rows.into_iter().map(CommitmentView::from).collect()))
}

pub async fn list_blocks(
    State(ctx): State<AppContext>,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<BlockView>>, ProxyError> {
    let rows = store::list_blocks(ctx.store.pool(), page.bounded_limit(), page.bounded_offset())
        .await?;
    Ok(Json(rows.into_iter().map(BlockView::from).collect()))
}

pub async fn list_node_stats(
    State(ctx): State<AppContext>,
) -> Result<Json<Vec<models::NodeStats>>, ProxyError> {
    // NodeStats carries no byte-string fields, so the store row serializes
    // directly without a view type.
    let rows = store::list_node_stats(ctx.store.pool()).await?;
    Ok(Json(rows))
}
