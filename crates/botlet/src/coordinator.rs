//! Signaling coordinator: turns offers into answers while keeping exactly one
//! connection and one bot worker alive.
//!
//! An offer carrying the id of the current connection renegotiates it in
//! place. Any other offer replaces the session:
//!
//! 1. the previous session is taken out of the slot and shut down
//! 2. a new connection is created and negotiated
//! 3. a closed listener is registered that clears the slot for that id only
//! 4. the bot is loaded (first request only) and a worker started
//! 5. connection and worker are installed in the slot together
//!
//! The slot mutex is never held across negotiation, loading or shutdown.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::bot::BotLoader;
use crate::connection::{
    Answer, ConnectionFactory, NegotiationError, PcId, PeerConnection, SdpType,
    SessionDescription,
};
use crate::error::BotletError;
use crate::slot::{ActiveSession, SessionSlot, SlotDecision};
use crate::worker::WorkerTask;

/// Body of `POST /api/offer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferRequest {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    /// Id of the connection to renegotiate. Absent for a fresh connection.
    #[serde(default)]
    pub pc_id: Option<PcId>,
}

impl OfferRequest {
    pub fn new(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Offer,
            pc_id: None,
        }
    }

    pub fn with_pc_id(mut self, pc_id: PcId) -> Self {
        self.pc_id = Some(pc_id);
        self
    }

    fn description(&self) -> SessionDescription {
        SessionDescription::new(self.sdp.clone(), self.sdp_type)
    }
}

pub struct SignalingCoordinator {
    slot: Arc<SessionSlot>,
    factory: Arc<dyn ConnectionFactory>,
    loader: BotLoader,
}

impl SignalingCoordinator {
    pub fn new(factory: Arc<dyn ConnectionFactory>, loader: BotLoader) -> Self {
        Self {
            slot: Arc::new(SessionSlot::new()),
            factory,
            loader,
        }
    }

    pub fn slot(&self) -> &SessionSlot {
        &self.slot
    }

    pub fn loader(&self) -> &BotLoader {
        &self.loader
    }

    pub fn current_pc_id(&self) -> Option<PcId> {
        self.slot.current_id()
    }

    /// Negotiate an offer and return the answer for the remote peer.
    pub async fn handle_offer(&self, request: OfferRequest) -> Result<Answer, BotletError> {
        if request.sdp_type != SdpType::Offer {
            return Err(NegotiationError::UnsupportedType(request.sdp_type).into());
        }
        self.loader.check()?;

        let offer = request.description();

        let previous = match self.slot.acquire(request.pc_id.as_ref()) {
            SlotDecision::Renegotiate(connection) => {
                info!(pc_id = %connection.pc_id(), "Renegotiating existing connection");
                let answer = connection.renegotiate(offer).await?;
                return Ok(Answer::new(connection.pc_id().clone(), answer));
            }
            SlotDecision::Replace(previous) => previous,
        };

        if let Some(previous) = previous {
            info!(pc_id = %previous.pc_id(), "Replacing existing connection");
            previous.shutdown().await;
        }

        let connection = self.factory.create().await?;
        let pc_id = connection.pc_id().clone();
        debug!(%pc_id, "Created peer connection");

        let answer = match connection.initialize(offer).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(%pc_id, error = %e, "Initial negotiation failed");
                connection.close().await;
                return Err(e.into());
            }
        };

        self.watch_closed(&connection);

        let bot = match self.loader.load_once().await {
            Ok(bot) => bot,
            Err(e) => {
                error!(%pc_id, error = %e, "Bot could not be loaded");
                connection.close().await;
                return Err(e.into());
            }
        };

        let worker = WorkerTask::spawn(bot, Arc::clone(&connection));
        if let Some(displaced) = self
            .slot
            .install(ActiveSession::new(Arc::clone(&connection), worker))
        {
            info!(pc_id = %displaced.pc_id(), "Shutting down concurrently installed connection");
            displaced.shutdown().await;
        }

        // The closed listener may have fired before the session was installed.
        if connection.is_closed()
            && let Some(session) = self.slot.clear_if(&pc_id)
        {
            info!(%pc_id, "Connection closed during setup");
            session.shutdown().await;
        }

        info!(%pc_id, "Connection established");
        Ok(Answer::new(pc_id, answer))
    }

    /// Close the active connection and stop its worker.
    pub async fn shutdown(&self) {
        if let Some(session) = self.slot.take() {
            info!(pc_id = %session.pc_id(), "Closing active connection");
            session.shutdown().await;
        }
    }

    fn watch_closed(&self, connection: &Arc<dyn PeerConnection>) {
        let slot = Arc::downgrade(&self.slot);
        connection.on_closed(Box::new(move |pc_id| {
            if let Some(slot) = slot.upgrade()
                && let Some(session) = slot.clear_if(pc_id)
            {
                info!(%pc_id, "Peer connection closed, session cleared");
                session.detach();
            }
        }));
    }
}
