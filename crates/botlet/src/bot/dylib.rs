//! Bots shipped as dynamic libraries (.so/.dylib/.dll).
//!
//! A bot library exports two symbols, both generated by [`export_bot!`]:
//! - `BOTLET_BOT`: a [`BotDeclaration`] with the ABI version and the
//!   top-level initialization hook
//! - `botlet_run_bot`: the entry point, a [`RunBotFn`]
//!
//! The declaration uses Rust types, so bot libraries must be built with the
//! same compiler and `botlet` version as the host.
//!
//! A bot library carries its own std and tokio. `export_bot!` therefore runs
//! the bot on a runtime owned by the library and catches its panics there
//! (see [`run_in_library`](super::run_in_library)). Consequences for bot
//! authors:
//! - tokio APIs work inside `run_bot`, `init` and close listeners, but belong
//!   to the library runtime, not the host's
//! - `tracing` macros inside the library go to the library's own dispatcher;
//!   use [`BotHost::log`] during `init` to reach the host's logs
//! - a loaded library is never unloaded
//!
//! ```ignore
//! use std::sync::Arc;
//! use botlet::PeerConnection;
//!
//! async fn run_bot(connection: Arc<dyn PeerConnection>) -> anyhow::Result<()> {
//!     // Drive the conversation...
//!     Ok(())
//! }
//!
//! botlet::export_bot!(run_bot: run_bot);
//! ```

use std::mem::ManuallyDrop;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use libloading::Library;

use super::{Bot, BotError, BotHost, BotInitError, BotSource, HostConnection, LoadError};
use crate::connection::PeerConnection;

/// Current ABI version. Bot libraries must match exactly.
pub const BOTLET_ABI_VERSION: u32 = 1;

pub const DECLARATION_SYMBOL: &[u8] = b"BOTLET_BOT\0";
pub const ENTRY_POINT_SYMBOL: &[u8] = b"botlet_run_bot\0";

/// Future returned by a bot entry point.
pub type BotFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Top-level initialization, run once when the library is loaded.
pub type BotInitFn = fn(&BotHost) -> Result<(), BotInitError>;

/// Bot entry point.
pub type RunBotFn = fn(Arc<dyn PeerConnection>) -> BotFuture;

/// Declaration exported by bot libraries as `BOTLET_BOT`.
#[repr(C)]
pub struct BotDeclaration {
    pub abi_version: u32,
    pub init: BotInitFn,
}

/// Initialization hook for bots without top-level setup.
pub fn no_init(_host: &BotHost) -> Result<(), BotInitError> {
    Ok(())
}

/// Export a bot for dynamic loading.
///
/// ```ignore
/// botlet::export_bot!(run_bot: run_bot);
/// botlet::export_bot!(init: setup_logging, run_bot: run_bot);
/// ```
#[macro_export]
macro_rules! export_bot {
    (run_bot: $run:path $(,)?) => {
        $crate::export_bot!(init: $crate::bot::no_init, run_bot: $run);
    };
    (init: $init:path, run_bot: $run:path $(,)?) => {
        fn __botlet_init(
            host: &$crate::bot::BotHost,
        ) -> ::std::result::Result<(), $crate::bot::BotInitError> {
            $crate::bot::guard_init(host, $init)
        }

        #[unsafe(no_mangle)]
        pub static BOTLET_BOT: $crate::bot::BotDeclaration = $crate::bot::BotDeclaration {
            abi_version: $crate::bot::BOTLET_ABI_VERSION,
            init: __botlet_init,
        };

        #[unsafe(no_mangle)]
        pub fn botlet_run_bot(
            connection: ::std::sync::Arc<dyn $crate::PeerConnection>,
        ) -> $crate::bot::BotFuture {
            $crate::bot::run_in_library(connection, $run)
        }
    };
}

/// Loads a bot library from a configured path.
pub struct DylibBotSource {
    path: Option<PathBuf>,
}

impl DylibBotSource {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn existing_path(&self) -> Result<&Path, BotError> {
        let path = self.path.as_deref().ok_or(BotError::NotConfigured)?;
        if !path.exists() {
            return Err(BotError::NotFound(path.to_path_buf()));
        }
        Ok(path)
    }
}

#[async_trait]
impl BotSource for DylibBotSource {
    fn check(&self) -> Result<(), BotError> {
        self.existing_path().map(|_| ())
    }

    async fn load(&self, host: &BotHost) -> Result<Arc<dyn Bot>, BotError> {
        let path = self.existing_path()?;

        // SAFETY: loading runs the library's static constructors. The bot path
        // is operator configuration, trusted like the host binary itself.
        let library = unsafe { Library::new(path) }.map_err(|e| LoadError::Library {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        // Never closed, even on failure below: `init` may already have started
        // the library runtime.
        let library = ManuallyDrop::new(library);

        // SAFETY: `BOTLET_BOT` is a `BotDeclaration` static when produced by
        // `export_bot!`; the ABI version check below rejects stale layouts.
        let (abi_version, init) = unsafe {
            let symbol = library
                .get::<*const BotDeclaration>(DECLARATION_SYMBOL)
                .map_err(|_| LoadError::MissingDeclaration {
                    path: path.to_path_buf(),
                })?;
            let declaration: &BotDeclaration = &**symbol;
            (declaration.abi_version, declaration.init)
        };

        if abi_version != BOTLET_ABI_VERSION {
            return Err(LoadError::AbiMismatch {
                found: abi_version,
                expected: BOTLET_ABI_VERSION,
            }
            .into());
        }

        init(host).map_err(LoadError::from)?;

        // SAFETY: `botlet_run_bot` has the `RunBotFn` signature when produced
        // by `export_bot!`.
        let run_bot: RunBotFn = unsafe {
            *library
                .get::<RunBotFn>(ENTRY_POINT_SYMBOL)
                .map_err(|_| BotError::InvalidModule)?
        };

        tracing::debug!(path = %path.display(), "Resolved bot entry point");

        Ok(Arc::new(DylibBot {
            run_bot,
            _library: library,
        }))
    }

    fn describe(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => "<unset>".to_string(),
        }
    }
}

/// A bot living in a loaded library.
///
/// The library is never closed: its runtime threads keep executing library
/// code after the bot is dropped.
struct DylibBot {
    run_bot: RunBotFn,
    _library: ManuallyDrop<Library>,
}

#[async_trait]
impl Bot for DylibBot {
    async fn run(&self, connection: Arc<dyn PeerConnection>) -> anyhow::Result<()> {
        (self.run_bot)(HostConnection::wrap(connection)).await
    }
}
