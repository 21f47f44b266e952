//! Database-channel listener variant of C2, grounded in
//! `common/postgres_notify.py::create_notification_listener`.

use sqlx::postgres::PgListener;
use tokio::sync::mpsc;

use super::BlockEvent;

/// Subscribes to `channel_name` on the store's Postgres instance and
/// forwards each decimal block-number payload to `sender`. Runs until the
/// process shuts down or the channel closes; a notification timeout is
/// logged and ignored, not treated as a connection failure. A lost
/// connection is retried with a flat 5-second backoff, matching the
/// original's LISTEN loop.
pub async fn run(dsn: &str, channel_name: &str, sender: mpsc::Sender<BlockEvent>) {
    loop {
        match connect_and_listen(dsn, channel_name).await {
            Ok(mut listener) => {
                tracing::info!(channel = channel_name, "listening for Postgres block notifications");
                if !drain(&mut listener, &sender).await {
                    return; // receiver dropped, nothing left to feed
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "SOURCE_CONNECTION_LOST: failed to connect listener");
            }
        }
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    }
}

async fn connect_and_listen(dsn: &str, channel_name: &str) -> Result<PgListener, sqlx::Error> {
    let mut listener = PgListener::connect(dsn).await?;
    listener.listen(channel_name).await?;
    Ok(listener)
}

const NOTIFICATION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(3600);

/// Processes notifications until the connection drops or the receiver is
/// gone. Returns `false` when the caller should stop entirely (receiver
/// dropped), `true` when it should reconnect.
async fn drain(listener: &mut PgListener, sender: &mpsc::Sender<BlockEvent>) -> bool {
    loop {
        match tokio::time::timeout(NOTIFICATION_TIMEOUT, listener.recv()).await {
            Ok(Ok(notification)) => {
                let payload = notification.payload();
                match payload.parse::<u64>() {
                    Ok(number) => {
                        if sender.send(BlockEvent::Number(number)).await.is_err() {
                            tracing::warn!("block event channel closed, stopping listener");
                            return false;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, payload, "malformed block notification payload");
                    }
                }
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "SOURCE_CONNECTION_LOST: listener error, reconnecting");
                return true;
            }
            Err(_elapsed) => {
                tracing::warn!("timeout waiting for notification from Postgres");
            }
        }
    }
}
