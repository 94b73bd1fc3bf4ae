//! Worker task: one bot run bound to one connection.
//!
//! Cancellation is cooperative. The bot future is raced against the task's
//! [`CancellationToken`] and dropped at its next await point once the token
//! fires, which releases everything the bot held for the connection.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::bot::Bot;
use crate::connection::{PcId, PeerConnection};

pub struct WorkerTask {
    pc_id: PcId,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl WorkerTask {
    /// Start `bot` against `connection` on the current runtime.
    pub fn spawn(bot: Arc<dyn Bot>, connection: Arc<dyn PeerConnection>) -> Self {
        let pc_id = connection.pc_id().clone();
        let cancel = CancellationToken::new();

        let token = cancel.clone();
        let task_pc_id = pc_id.clone();
        let handle = tokio::spawn(async move {
            info!(pc_id = %task_pc_id, "Bot worker started");
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!(pc_id = %task_pc_id, "Bot worker cancelled");
                }
                result = bot.run(connection) => match result {
                    Ok(()) => info!(pc_id = %task_pc_id, "Bot worker finished"),
                    Err(e) => error!(pc_id = %task_pc_id, error = %format!("{e:#}"), "Bot worker failed"),
                },
            }
        });

        Self {
            pc_id,
            cancel,
            handle,
        }
    }

    pub fn pc_id(&self) -> &PcId {
        &self.pc_id
    }

    /// Request cancellation without waiting for the task to end.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel and wait for the task to end.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await
            && e.is_panic()
        {
            error!(pc_id = %self.pc_id, "Bot worker panicked");
        }
    }
}

impl std::fmt::Debug for WorkerTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerTask")
            .field("pc_id", &self.pc_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}
