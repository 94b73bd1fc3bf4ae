//! SessionSlot - the single active connection and its worker.
//!
//! The connection and its worker are stored, replaced and removed together.
//! Every method takes the mutex only for the state transition itself; closing
//! connections and awaiting workers happens after the lock is released, on
//! the [`ActiveSession`] the caller got back.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::connection::{PcId, PeerConnection};
use crate::worker::WorkerTask;

/// A connection paired with the worker running against it.
pub struct ActiveSession {
    connection: Arc<dyn PeerConnection>,
    worker: WorkerTask,
}

impl ActiveSession {
    pub fn new(connection: Arc<dyn PeerConnection>, worker: WorkerTask) -> Self {
        Self { connection, worker }
    }

    pub fn pc_id(&self) -> &PcId {
        self.connection.pc_id()
    }

    pub fn connection(&self) -> &Arc<dyn PeerConnection> {
        &self.connection
    }

    pub fn worker(&self) -> &WorkerTask {
        &self.worker
    }

    /// Cancel the worker, close the connection, wait for the worker to end.
    pub async fn shutdown(self) {
        self.worker.cancel();
        self.connection.close().await;
        self.worker.shutdown().await;
    }

    /// Cancel the worker and let the task wind down on its own. For contexts
    /// that cannot await, such as closed-event listeners.
    pub fn detach(self) {
        self.worker.cancel();
    }
}

impl std::fmt::Debug for ActiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveSession")
            .field("pc_id", self.pc_id())
            .field("state", &self.connection.state())
            .field("worker", &self.worker)
            .finish()
    }
}

/// Outcome of inspecting the slot for an incoming offer.
pub enum SlotDecision {
    /// The offer targets the current connection.
    Renegotiate(Arc<dyn PeerConnection>),
    /// The slot has been emptied for a new connection; carries what was there.
    Replace(Option<ActiveSession>),
}

#[derive(Default)]
pub struct SessionSlot {
    current: Mutex<Option<ActiveSession>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.current.lock().unwrap_or_else(|poisoned| {
            tracing::error!("Session slot mutex poisoned");
            poisoned.into_inner()
        })
    }

    /// Decide between renegotiation and replacement in one step.
    ///
    /// `Renegotiate` leaves the slot untouched. `Replace` empties it, so no
    /// other offer can also act on the previous session.
    pub fn acquire(&self, pc_id: Option<&PcId>) -> SlotDecision {
        let mut current = self.lock();
        if let Some(pc_id) = pc_id
            && let Some(session) = current.as_ref()
            && session.pc_id() == pc_id
        {
            return SlotDecision::Renegotiate(Arc::clone(&session.connection));
        }
        SlotDecision::Replace(current.take())
    }

    pub fn matches(&self, pc_id: &PcId) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|session| session.pc_id() == pc_id)
    }

    /// Install a session. Returns whatever it displaced.
    pub fn install(&self, session: ActiveSession) -> Option<ActiveSession> {
        self.lock().replace(session)
    }

    /// Remove the session only if it is still the one identified by `pc_id`.
    pub fn clear_if(&self, pc_id: &PcId) -> Option<ActiveSession> {
        let mut current = self.lock();
        if current
            .as_ref()
            .is_some_and(|session| session.pc_id() == pc_id)
        {
            current.take()
        } else {
            None
        }
    }

    pub fn take(&self) -> Option<ActiveSession> {
        self.lock().take()
    }

    pub fn current_id(&self) -> Option<PcId> {
        self.lock().as_ref().map(|session| session.pc_id().clone())
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }
}
