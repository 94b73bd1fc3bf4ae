//! Execution across the bot library boundary.
//!
//! A bot library links its own copies of std and tokio. A panic unwinding
//! out of library code into the host aborts the process, and the library's
//! tokio cannot see the host runtime. So:
//!
//! - library side ([`run_in_library`], [`guard_init`]): the bot runs on a
//!   runtime owned by the library, panics are caught there and come back as
//!   errors, close listeners run inside that runtime
//! - host side ([`HostConnection`]): connection calls made by the bot are
//!   executed on the host runtime
//!
//! The library runtime lives until process exit, so bot libraries are never
//! unloaded.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::runtime::{Handle, Runtime};
use tokio::task::AbortHandle;

use super::{BotFuture, BotHost, BotInitError};
use crate::connection::{
    Answer, CloseListener, ConnectionState, NegotiationError, PcId, PeerConnection,
    SessionDescription,
};

static LIBRARY_RUNTIME: OnceLock<Result<Runtime, String>> = OnceLock::new();

fn library_runtime() -> Result<&'static Runtime, String> {
    LIBRARY_RUNTIME
        .get_or_init(|| {
            tokio::runtime::Builder::new_multi_thread()
                .thread_name("botlet-bot")
                .enable_all()
                .build()
                .map_err(|e| e.to_string())
        })
        .as_ref()
        .map_err(Clone::clone)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run a bot's initialization hook inside the library runtime, turning a
/// panic into [`BotInitError::Failed`]. Called by [`export_bot!`].
pub fn guard_init<F>(host: &BotHost, init: F) -> Result<(), BotInitError>
where
    F: FnOnce(&BotHost) -> Result<(), BotInitError>,
{
    let runtime = library_runtime()
        .map_err(|e| BotInitError::Failed(format!("failed to start bot runtime: {e}")))?;
    let _enter = runtime.enter();

    std::panic::catch_unwind(AssertUnwindSafe(|| init(host))).unwrap_or_else(|panic| {
        Err(BotInitError::Failed(format!(
            "bot initialization panicked: {}",
            panic_message(panic.as_ref())
        )))
    })
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Drive a bot entry point on the library runtime. Called by [`export_bot!`].
///
/// The returned future only waits on a channel, so the host can poll it from
/// its own runtime. Dropping it aborts the bot task.
pub fn run_in_library<F, Fut>(connection: Arc<dyn PeerConnection>, run_bot: F) -> BotFuture
where
    F: FnOnce(Arc<dyn PeerConnection>) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let runtime = match library_runtime() {
        Ok(runtime) => runtime,
        Err(e) => {
            return Box::pin(async move { Err(anyhow::anyhow!("failed to start bot runtime: {e}")) });
        }
    };

    let connection: Arc<dyn PeerConnection> = Arc::new(LibraryConnection {
        inner: connection,
        handle: runtime.handle().clone(),
    });

    let (tx, rx) = futures::channel::oneshot::channel();
    let task = runtime.spawn(async move {
        let result = AssertUnwindSafe(async move { run_bot(connection).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(anyhow::anyhow!("bot panicked: {}", panic_message(panic.as_ref())))
            });
        let _ = tx.send(result);
    });
    let abort = AbortOnDrop(task.abort_handle());

    Box::pin(async move {
        let _abort = abort;
        rx.await
            .unwrap_or_else(|_| Err(anyhow::anyhow!("bot task ended without a result")))
    })
}

/// Library-side view of the connection. Close listeners registered by the
/// bot run inside the library runtime, and their panics stay in the library.
struct LibraryConnection {
    inner: Arc<dyn PeerConnection>,
    handle: Handle,
}

#[async_trait]
impl PeerConnection for LibraryConnection {
    fn pc_id(&self) -> &PcId {
        self.inner.pc_id()
    }

    fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    async fn initialize(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, NegotiationError> {
        self.inner.initialize(offer).await
    }

    async fn renegotiate(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, NegotiationError> {
        self.inner.renegotiate(offer).await
    }

    async fn close(&self) {
        self.inner.close().await
    }

    fn answer(&self) -> Option<Answer> {
        self.inner.answer()
    }

    fn on_closed(&self, listener: CloseListener) {
        let handle = self.handle.clone();
        self.inner.on_closed(Box::new(move |pc_id| {
            let _enter = handle.enter();
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| listener(pc_id))) {
                tracing::error!(%pc_id, panic = %panic_message(panic.as_ref()), "Bot close listener panicked");
            }
        }));
    }
}

/// Host-side view of the connection handed to a bot library. Async calls are
/// spawned on the host runtime so they never depend on the caller's runtime.
pub struct HostConnection {
    inner: Arc<dyn PeerConnection>,
    handle: Handle,
}

impl HostConnection {
    /// Wrap `connection` for the current host runtime. Outside a runtime the
    /// connection is returned as is.
    pub fn wrap(connection: Arc<dyn PeerConnection>) -> Arc<dyn PeerConnection> {
        match Handle::try_current() {
            Ok(handle) => Arc::new(Self {
                inner: connection,
                handle,
            }),
            Err(_) => connection,
        }
    }
}

#[async_trait]
impl PeerConnection for HostConnection {
    fn pc_id(&self) -> &PcId {
        self.inner.pc_id()
    }

    fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    async fn initialize(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, NegotiationError> {
        let inner = Arc::clone(&self.inner);
        self.handle
            .spawn(async move { inner.initialize(offer).await })
            .await
            .map_err(|e| NegotiationError::Failed(format!("connection task failed: {e}")))?
    }

    async fn renegotiate(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, NegotiationError> {
        let inner = Arc::clone(&self.inner);
        self.handle
            .spawn(async move { inner.renegotiate(offer).await })
            .await
            .map_err(|e| NegotiationError::Failed(format!("connection task failed: {e}")))?
    }

    async fn close(&self) {
        let inner = Arc::clone(&self.inner);
        if let Err(e) = self.handle.spawn(async move { inner.close().await }).await {
            tracing::warn!(pc_id = %self.pc_id(), error = %e, "Connection close task failed");
        }
    }

    fn answer(&self) -> Option<Answer> {
        self.inner.answer()
    }

    fn on_closed(&self, listener: CloseListener) {
        self.inner.on_closed(listener);
    }
}
