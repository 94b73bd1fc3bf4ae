//! Bot library driven by botlet's integration tests.
//!
//! The behavior is picked from the connection id prefix (`sleep-1`,
//! `panic-2`, ...) so one library covers every case.

use std::sync::Arc;
use std::time::Duration;

use botlet::PeerConnection;
use botlet::bot::{BotHost, BotInitError, DEFAULT_HANDLER_ID};
use tokio::sync::oneshot;
use tracing::Level;

/// Swap the host's default handler for a verbose one.
fn install_logging(host: &BotHost) -> Result<(), BotInitError> {
    host.log_handlers().remove(DEFAULT_HANDLER_ID)?;
    host.log_handlers().add(Level::DEBUG);
    host.log(Level::INFO, "test bot initialized");
    Ok(())
}

async fn run_bot(connection: Arc<dyn PeerConnection>) -> anyhow::Result<()> {
    let mode = connection
        .pc_id()
        .as_str()
        .split('-')
        .next()
        .unwrap_or_default()
        .to_string();

    match mode.as_str() {
        "sleep" => tokio::time::sleep(Duration::from_millis(10)).await,
        "spawn" => {
            let pc_id = connection.pc_id().clone();
            let echoed = tokio::spawn(async move { pc_id }).await?;
            anyhow::ensure!(echoed == *connection.pc_id(), "spawned task saw {echoed}");
        }
        "panic" => panic!("bot bug"),
        "fail" => anyhow::bail!("bot gave up"),
        "close" => connection.close().await,
        "listen" => {
            let (tx, rx) = oneshot::channel();
            connection.on_closed(Box::new(move |pc_id| {
                let pc_id = pc_id.clone();
                tokio::spawn(async move {
                    let _ = tx.send(pc_id);
                });
            }));
            connection.close().await;
            let closed = rx.await?;
            anyhow::ensure!(closed == *connection.pc_id(), "listener saw {closed}");
        }
        "idle" => std::future::pending::<()>().await,
        _ => {}
    }
    Ok(())
}

botlet::export_bot!(init: install_logging, run_bot: run_bot);
