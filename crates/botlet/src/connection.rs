//! Peer connection capability consumed by the coordinator.
//!
//! The coordinator never touches ICE, SDP or DTLS itself. It drives a
//! [`PeerConnection`] through initialize/renegotiate/close and listens for its
//! closed notification. [`ConnectionEvents`] holds the state machine and the
//! listener list so adapters only have to wire their transport into it.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Correlation identifier of one peer connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PcId(String);

impl PcId {
    /// Fresh random identifier.
    pub fn new() -> Self {
        Self(format!("pc-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PcId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PcId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for PcId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

impl SdpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Pranswer => "pranswer",
            Self::Rollback => "rollback",
        }
    }
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An SDP payload together with its role in the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
}

impl SessionDescription {
    pub fn new(sdp: impl Into<String>, sdp_type: SdpType) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type,
        }
    }

    pub fn offer(sdp: impl Into<String>) -> Self {
        Self::new(sdp, SdpType::Offer)
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self::new(sdp, SdpType::Answer)
    }
}

/// Answer returned to the remote peer. Carries `pc_id` so the peer can
/// renegotiate the same connection later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub pc_id: PcId,
}

impl Answer {
    pub fn new(pc_id: PcId, description: SessionDescription) -> Self {
        Self {
            sdp: description.sdp,
            sdp_type: description.sdp_type,
            pc_id,
        }
    }
}

/// Lifecycle of a connection handle. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Negotiating,
    Connected,
    Closed,
}

impl ConnectionState {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    #[error("Negotiation failed: {0}")]
    Failed(String),

    #[error("Connection {0} is closed")]
    Closed(PcId),

    #[error("Unsupported session description type: {0}")]
    UnsupportedType(SdpType),
}

/// Callback fired once when a connection closes.
pub type CloseListener = Box<dyn FnOnce(&PcId) + Send + 'static>;

/// One peer connection, as seen by the coordinator.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    fn pc_id(&self) -> &PcId;

    fn state(&self) -> ConnectionState;

    /// Apply the first remote offer and produce the local answer.
    async fn initialize(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, NegotiationError>;

    /// Apply a follow-up offer on an established connection.
    async fn renegotiate(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, NegotiationError>;

    /// Close the connection. Idempotent.
    async fn close(&self);

    /// Most recent local answer, if negotiation has completed.
    fn answer(&self) -> Option<Answer>;

    /// Register a listener for the closed event. Listeners registered after
    /// the connection closed run immediately.
    fn on_closed(&self, listener: CloseListener);

    fn is_closed(&self) -> bool {
        self.state().is_closed()
    }
}

/// Creates connection handles for new sessions.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn PeerConnection>, NegotiationError>;
}

struct EventsInner {
    state: ConnectionState,
    answer: Option<SessionDescription>,
    listeners: Vec<CloseListener>,
}

/// State machine and closed-listener bookkeeping shared by adapters.
///
/// State becomes `Closed` before any listener runs, and listeners run outside
/// the internal lock so they may call back into the connection.
pub struct ConnectionEvents {
    pc_id: PcId,
    inner: Mutex<EventsInner>,
}

impl ConnectionEvents {
    pub fn new(pc_id: PcId) -> Self {
        Self {
            pc_id,
            inner: Mutex::new(EventsInner {
                state: ConnectionState::Negotiating,
                answer: None,
                listeners: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EventsInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::error!(pc_id = %self.pc_id, "Connection state mutex poisoned");
            poisoned.into_inner()
        })
    }

    pub fn pc_id(&self) -> &PcId {
        &self.pc_id
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn answer(&self) -> Option<Answer> {
        self.lock()
            .answer
            .clone()
            .map(|description| Answer::new(self.pc_id.clone(), description))
    }

    pub fn ensure_open(&self) -> Result<(), NegotiationError> {
        if self.state().is_closed() {
            return Err(NegotiationError::Closed(self.pc_id.clone()));
        }
        Ok(())
    }

    /// Record a completed negotiation: `Negotiating → Connected`.
    pub fn negotiated(&self, answer: SessionDescription) -> Result<(), NegotiationError> {
        let mut inner = self.lock();
        if inner.state.is_closed() {
            return Err(NegotiationError::Closed(self.pc_id.clone()));
        }
        inner.state = ConnectionState::Connected;
        inner.answer = Some(answer);
        Ok(())
    }

    pub fn subscribe(&self, listener: CloseListener) {
        let mut inner = self.lock();
        if inner.state.is_closed() {
            drop(inner);
            listener(&self.pc_id);
        } else {
            inner.listeners.push(listener);
        }
    }

    /// Transition to `Closed` and fire listeners. Returns false if the
    /// connection was already closed.
    pub fn mark_closed(&self) -> bool {
        let listeners = {
            let mut inner = self.lock();
            if inner.state.is_closed() {
                return false;
            }
            inner.state = ConnectionState::Closed;
            std::mem::take(&mut inner.listeners)
        };

        tracing::debug!(pc_id = %self.pc_id, listeners = listeners.len(), "Connection closed");
        for listener in listeners {
            listener(&self.pc_id);
        }
        true
    }
}
