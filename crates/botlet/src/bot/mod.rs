//! Bot modules: the behavior run against each new connection.
//!
//! A bot is loaded once through a [`BotSource`] strategy and cached by the
//! [`BotLoader`]:
//! - [`DylibBotSource`] opens a shared library built with [`export_bot!`]
//! - [`StaticBotSource`] wraps a bot linked into the host binary
//!
//! Library bots cross a std/tokio boundary; [`run_in_library`] and
//! [`HostConnection`] keep panics and runtime calls on the right side of it.

mod dylib;
mod host;
mod loader;
mod runtime;
mod source;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::connection::PeerConnection;

pub use dylib::{
    BOTLET_ABI_VERSION, BotDeclaration, BotFuture, BotInitFn, DECLARATION_SYMBOL,
    DylibBotSource, ENTRY_POINT_SYMBOL, RunBotFn, no_init,
};
pub use host::{BotHost, DEFAULT_HANDLER_ID, LogHandlerError, LogHandlers, TolerantRemoval};
pub use loader::BotLoader;
pub use runtime::{HostConnection, guard_init, run_in_library};
pub use source::{BotSource, StaticBotSource};

/// Bot entry point. Runs until the bot is done with the connection.
#[async_trait]
pub trait Bot: Send + Sync {
    async fn run(&self, connection: Arc<dyn PeerConnection>) -> anyhow::Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("No bot file specified")]
    NotConfigured,

    #[error("Bot file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to import bot: {0}")]
    Load(#[from] LoadError),

    #[error("Bot module does not have a run_bot function")]
    InvalidModule,
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Could not load module from file: {}: {reason}", path.display())]
    Library { path: PathBuf, reason: String },

    #[error("Module {} does not export a bot declaration", path.display())]
    MissingDeclaration { path: PathBuf },

    #[error("ABI version mismatch: bot has v{found}, host expects v{expected}")]
    AbiMismatch { found: u32, expected: u32 },

    #[error(transparent)]
    Init(#[from] BotInitError),
}

impl LoadError {
    /// Bot initialization tripped over a log handler it expected to exist.
    pub fn is_log_handler_conflict(&self) -> bool {
        matches!(
            self,
            LoadError::Init(BotInitError::LogHandler(LogHandlerError::NoSuchHandler(_)))
        )
    }
}

/// Failure raised by a bot's top-level initialization.
#[derive(Debug, thiserror::Error)]
pub enum BotInitError {
    #[error(transparent)]
    LogHandler(#[from] LogHandlerError),

    #[error("{0}")]
    Failed(String),
}
