//! Strategies for obtaining a bot.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Bot, BotError, BotHost};

/// Where a bot comes from.
#[async_trait]
pub trait BotSource: Send + Sync {
    /// Cheap preflight run on every offer, before any connection is touched.
    fn check(&self) -> Result<(), BotError> {
        Ok(())
    }

    /// Load the bot and run its top-level initialization.
    async fn load(&self, host: &BotHost) -> Result<Arc<dyn Bot>, BotError>;

    /// Human-readable origin, for logs.
    fn describe(&self) -> String;
}

/// A bot linked into the host binary.
pub struct StaticBotSource {
    name: String,
    bot: Arc<dyn Bot>,
}

impl StaticBotSource {
    pub fn new(name: impl Into<String>, bot: Arc<dyn Bot>) -> Self {
        Self {
            name: name.into(),
            bot,
        }
    }
}

#[async_trait]
impl BotSource for StaticBotSource {
    async fn load(&self, _host: &BotHost) -> Result<Arc<dyn Bot>, BotError> {
        Ok(Arc::clone(&self.bot))
    }

    fn describe(&self) -> String {
        format!("static:{}", self.name)
    }
}
