//! Host services handed to a bot during initialization.
//!
//! Bots route their log output through numbered handlers. Handler 0 is
//! installed when the host is created; bots commonly remove it and add their
//! own. Lines that pass at least one handler are forwarded to `tracing` under
//! the `botlet::bot` target.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use tracing::Level;

/// Id of the handler installed at host creation.
pub const DEFAULT_HANDLER_ID: usize = 0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogHandlerError {
    #[error("There is no existing handler with id {0}")]
    NoSuchHandler(usize),
}

struct HandlerTable {
    next_id: usize,
    handlers: BTreeMap<usize, Level>,
    tolerate_missing: bool,
}

/// Registry of bot log handlers.
pub struct LogHandlers {
    table: Mutex<HandlerTable>,
}

impl LogHandlers {
    pub fn new() -> Self {
        let mut handlers = BTreeMap::new();
        handlers.insert(DEFAULT_HANDLER_ID, Level::INFO);
        Self {
            table: Mutex::new(HandlerTable {
                next_id: DEFAULT_HANDLER_ID + 1,
                handlers,
                tolerate_missing: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HandlerTable> {
        self.table.lock().unwrap_or_else(|poisoned| {
            tracing::error!("Log handler table mutex poisoned");
            poisoned.into_inner()
        })
    }

    /// Add a handler admitting events up to `max_level` verbosity.
    pub fn add(&self, max_level: Level) -> usize {
        let mut table = self.lock();
        let id = table.next_id;
        table.next_id += 1;
        table.handlers.insert(id, max_level);
        id
    }

    pub fn remove(&self, id: usize) -> Result<(), LogHandlerError> {
        let mut table = self.lock();
        if table.handlers.remove(&id).is_some() || table.tolerate_missing {
            return Ok(());
        }
        Err(LogHandlerError::NoSuchHandler(id))
    }

    pub fn contains(&self, id: usize) -> bool {
        self.lock().handlers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().handlers.is_empty()
    }

    /// Whether any handler admits an event at `level`.
    pub fn enabled(&self, level: Level) -> bool {
        self.lock().handlers.values().any(|max| level <= *max)
    }

    /// Make `remove` of unknown ids succeed until the guard drops.
    pub fn tolerate_missing(&self) -> TolerantRemoval<'_> {
        let previous = std::mem::replace(&mut self.lock().tolerate_missing, true);
        TolerantRemoval {
            handlers: self,
            previous,
        }
    }
}

impl Default for LogHandlers {
    fn default() -> Self {
        Self::new()
    }
}

/// Restores strict handler removal on drop.
pub struct TolerantRemoval<'a> {
    handlers: &'a LogHandlers,
    previous: bool,
}

impl Drop for TolerantRemoval<'_> {
    fn drop(&mut self) {
        self.handlers.lock().tolerate_missing = self.previous;
    }
}

/// Forward one bot log line to the host's `tracing` dispatcher.
fn emit(level: Level, message: &str) {
    if level == Level::ERROR {
        tracing::error!(target: "botlet::bot", "{message}");
    } else if level == Level::WARN {
        tracing::warn!(target: "botlet::bot", "{message}");
    } else if level == Level::INFO {
        tracing::info!(target: "botlet::bot", "{message}");
    } else if level == Level::DEBUG {
        tracing::debug!(target: "botlet::bot", "{message}");
    } else {
        tracing::trace!(target: "botlet::bot", "{message}");
    }
}

/// Services a bot may use from its initialization hook.
pub struct BotHost {
    log_handlers: LogHandlers,
    // Resolved in the host binary. A bot library calling `log` must reach the
    // host's dispatcher, not its own copy of `tracing`.
    emit: fn(Level, &str),
}

impl Default for BotHost {
    fn default() -> Self {
        Self {
            log_handlers: LogHandlers::new(),
            emit,
        }
    }
}

impl BotHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_handlers(&self) -> &LogHandlers {
        &self.log_handlers
    }

    /// Forward one bot log line if any handler admits `level`.
    pub fn log(&self, level: Level, message: &str) {
        if self.log_handlers.enabled(level) {
            (self.emit)(level, message);
        }
    }
}
