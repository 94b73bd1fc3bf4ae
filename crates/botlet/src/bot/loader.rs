//! Load-once cache in front of a [`BotSource`].

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::{Bot, BotError, BotHost, BotSource};

/// Loads the bot on first use and hands out the cached instance afterwards.
///
/// Concurrent callers during the first load wait for that load instead of
/// starting their own. A failed load is not cached, so a later call retries.
pub struct BotLoader {
    source: Arc<dyn BotSource>,
    host: BotHost,
    module: OnceCell<Arc<dyn Bot>>,
}

impl BotLoader {
    pub fn new(source: Arc<dyn BotSource>) -> Self {
        Self {
            source,
            host: BotHost::new(),
            module: OnceCell::new(),
        }
    }

    pub fn host(&self) -> &BotHost {
        &self.host
    }

    pub fn is_loaded(&self) -> bool {
        self.module.initialized()
    }

    /// Preflight the source without loading.
    pub fn check(&self) -> Result<(), BotError> {
        self.source.check()
    }

    pub async fn load_once(&self) -> Result<Arc<dyn Bot>, BotError> {
        self.module
            .get_or_try_init(|| self.load_with_recovery())
            .await
            .cloned()
    }

    /// One load attempt, plus a single retry when the bot's initialization
    /// removed a log handler that no longer exists.
    async fn load_with_recovery(&self) -> Result<Arc<dyn Bot>, BotError> {
        let source = self.source.describe();
        info!(%source, "Loading bot");

        let bot = match self.source.load(&self.host).await {
            Err(BotError::Load(e)) if e.is_log_handler_conflict() => {
                warn!(%source, error = %e, "Handling bot logging configuration conflict");
                let _tolerant = self.host.log_handlers().tolerate_missing();
                self.source.load(&self.host).await?
            }
            result => result?,
        };

        info!(%source, "Bot loaded");
        Ok(bot)
    }
}
