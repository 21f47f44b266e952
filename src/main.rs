//! Trust-minimizing JSON-RPC commitment proxy entry point.
//!
//! Wires together the Persistent Store (C1), Block Event Source (C2),
//! Block Ingestor (C3), Verification Engine (C4), and RPC Relay (C5),
//! then serves the HTTP surface.

mod accumulator;
mod config;
mod context;
mod dashboard;
mod engine;
mod error;
mod ingest;
mod relay;
mod rpc_client;
mod source;
mod store;

use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use config::Settings;
use context::AppContext;
use engine::VerifyOutcome;
use ingest::Ingestor;
use rpc_client::ValidatorClient;
use source::BlockEvent;
use store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(settings.tracing_filter()))
        .init();

    tracing::info!(network = settings.network_name, "starting commitment proxy");

    let store = Store::connect(&settings.dsn).await?;
    store.check_schema_version(&settings.network_name).await?;

    let validator = ValidatorClient::new(settings.rpc_url.clone());

    let rpc_base = url::Url::parse(&settings.rpc_url)?;
    let node_id = rpc_client::get_node_id(&rpc_base)
        .await?
        .unwrap_or_else(|| {
            tracing::warn!("validator did not return a node ID, falling back to the RPC URL");
            settings.rpc_url.clone()
        });
    tracing::info!(node_id, "resolved validator node identity");

    let (sender, receiver) = source::channel();

    spawn_block_event_source(&settings, sender);

    let ingestor = Ingestor::new(store.clone(), validator.clone(), node_id.clone());
    tokio::spawn(run_pipeline(store.clone(), ingestor, node_id, receiver));

    let ctx = AppContext {
        store,
        validator,
        settings: settings.clone(),
    };

    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind((settings.host.as_str(), settings.port)).await?;
    tracing::info!(host = settings.host, port = settings.port, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Starts exactly one Block Event Source variant, chosen from
/// configuration. Neither variant runs if the operator left both unset
/// (dormant mode; blocks must be ingested out-of-band).
fn spawn_block_event_source(settings: &Settings, sender: tokio::sync::mpsc::Sender<BlockEvent>) {
    if let Some(channel_name) = settings.blocks_channel.clone() {
        let dsn = settings.dsn.clone();
        tokio::spawn(async move {
            source::db_channel::run(&dsn, &channel_name, sender).await;
        });
    } else if let Some(ws_url) = settings.blocks_websocket_url.clone() {
        tokio::spawn(async move {
            source::websocket::run(&ws_url, sender).await;
        });
    } else {
        tracing::warn!(
            "no block event source configured (BLOCKS_CHANNEL / BLOCKS_WEBSOCKET_URL both unset); \
             blocks must be ingested out-of-band"
        );
        drop(sender);
    }
}

/// Drains the Block Event Source channel: each event is ingested (C3), and
/// on a freshly-written block, the engine (C4) verifies it. Re-delivery of
/// an already-ingested block number is a silent no-op.
async fn run_pipeline(
    store: Store,
    ingestor: Ingestor,
    node_id: String,
    mut receiver: tokio::sync::mpsc::Receiver<BlockEvent>,
) {
    while let Some(event) = receiver.recv().await {
        let block_number = match block_number_of(&event) {
            Some(n) => n,
            None => {
                tracing::warn!("block event carried no recoverable block number, skipping");
                continue;
            }
        };

        let ingested = match event {
            BlockEvent::Number(number) => ingestor.ingest_block_number(number).await,
            BlockEvent::Payload(payload) => ingestor.ingest_block_payload(&payload).await,
        };

        match ingested {
            Ok(false) => continue,
            Err(e) => {
                tracing::error!(error = %e, block_number, "failed to ingest block");
                continue;
            }
            Ok(true) => {}
        }

        match engine::verify_block(&store, &node_id, block_number as i64).await {
            Ok(VerifyOutcome::Processed(_)) | Ok(VerifyOutcome::AlreadyProcessed) => {}
            Ok(VerifyOutcome::BlockNotFound) => {
                tracing::error!(
                    block_number,
                    "verification ran immediately after a successful ingest but found no block row"
                );
            }
            Ok(VerifyOutcome::PrevStateMissing) => {
                tracing::warn!(block_number, "verification deferred: previous block state missing");
            }
            Err(e) => {
                tracing::error!(error = %e, block_number, "verification failed");
            }
        }
    }
}

fn block_number_of(event: &BlockEvent) -> Option<u64> {
    match event {
        BlockEvent::Number(n) => Some(*n),
        BlockEvent::Payload(v) => v
            .get("number")
            .and_then(|v| v.as_str())
            .and_then(|s| u64::from_str_radix(s.strip_prefix("0x").unwrap_or(s), 16).ok()),
    }
}

fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/eth_sendRawTransaction", post(relay::handle_send_raw_transaction))
        .route("/dashboard/transactions", get(dashboard::list_transactions))
        .route("/dashboard/commitments", get(dashboard::list_commitments))
        .route("/dashboard/blocks", get(dashboard::list_blocks))
        .route("/dashboard/nodestats", get(dashboard::list_node_stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::custom(debug_panic_response))
        .with_state(ctx)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Renders a panic as the same `{detail}` JSON shape other errors use. This
/// is a debugging aid, not a contract: a panic here means a genuine bug,
/// not a client-facing error condition.
fn debug_panic_response(
    err: Box<dyn std::any::Any + Send + 'static>,
) -> axum::response::Response {
    let detail = if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(detail, "panic in request handler");
    (
        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "detail": detail })),
    )
        .into_response()
}
