//! [`PeerConnection`] adapter over the `webrtc` crate.
//!
//! Negotiation is non-trickle: the answer is returned once ICE gathering has
//! completed, so it already carries every local candidate.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use crate::connection::{
    Answer, CloseListener, ConnectionEvents, ConnectionFactory, ConnectionState,
    NegotiationError, PcId, PeerConnection, SdpType, SessionDescription,
};

fn negotiation_error(e: webrtc::Error) -> NegotiationError {
    NegotiationError::Failed(e.to_string())
}

fn build_api() -> Result<API, webrtc::Error> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;

    let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

/// Creates webrtc-rs peer connections with a fixed ICE server list.
pub struct WebRtcConnectionFactory {
    api: API,
    ice_servers: Vec<RTCIceServer>,
}

impl WebRtcConnectionFactory {
    pub fn new(ice_servers: &[String]) -> Result<Self, NegotiationError> {
        let api = build_api().map_err(negotiation_error)?;
        let ice_servers = ice_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .collect();
        Ok(Self { api, ice_servers })
    }
}

#[async_trait]
impl ConnectionFactory for WebRtcConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn PeerConnection>, NegotiationError> {
        let config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        };
        let peer = Arc::new(
            self.api
                .new_peer_connection(config)
                .await
                .map_err(negotiation_error)?,
        );
        Ok(Arc::new(WebRtcConnection::new(PcId::new(), peer)))
    }
}

pub struct WebRtcConnection {
    events: Arc<ConnectionEvents>,
    peer: Arc<RTCPeerConnection>,
}

impl WebRtcConnection {
    fn new(pc_id: PcId, peer: Arc<RTCPeerConnection>) -> Self {
        let events = Arc::new(ConnectionEvents::new(pc_id));

        let state_events = Arc::clone(&events);
        let state_peer = Arc::downgrade(&peer);
        peer.on_peer_connection_state_change(Box::new(move |state| {
            on_state_change(&state_events, &state_peer, state);
            Box::pin(async {})
        }));

        Self { events, peer }
    }

    async fn negotiate(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, NegotiationError> {
        self.events.ensure_open()?;

        let remote = match offer.sdp_type {
            SdpType::Offer => RTCSessionDescription::offer(offer.sdp),
            other => return Err(NegotiationError::UnsupportedType(other)),
        }
        .map_err(negotiation_error)?;

        self.peer
            .set_remote_description(remote)
            .await
            .map_err(negotiation_error)?;

        let answer = self
            .peer
            .create_answer(None)
            .await
            .map_err(negotiation_error)?;

        let mut gathering_complete = self.peer.gathering_complete_promise().await;
        self.peer
            .set_local_description(answer)
            .await
            .map_err(negotiation_error)?;
        let _ = gathering_complete.recv().await;

        let local = self.peer.local_description().await.ok_or_else(|| {
            NegotiationError::Failed("no local description after negotiation".to_string())
        })?;
        if local.sdp_type != RTCSdpType::Answer {
            return Err(NegotiationError::Failed(format!(
                "unexpected local description type: {}",
                local.sdp_type
            )));
        }

        let answer = SessionDescription::answer(local.sdp);
        self.events.negotiated(answer.clone())?;
        Ok(answer)
    }
}

/// A failed connection is reported closed and its transports are torn down.
fn on_state_change(
    events: &Arc<ConnectionEvents>,
    peer: &Weak<RTCPeerConnection>,
    state: RTCPeerConnectionState,
) {
    tracing::debug!(pc_id = %events.pc_id(), ?state, "Peer connection state changed");
    match state {
        RTCPeerConnectionState::Failed => {
            events.mark_closed();
            if let Some(peer) = peer.upgrade() {
                let pc_id = events.pc_id().clone();
                tokio::spawn(async move {
                    if let Err(e) = peer.close().await {
                        tracing::warn!(%pc_id, error = %e, "Error closing failed peer connection");
                    }
                });
            }
        }
        RTCPeerConnectionState::Closed => {
            events.mark_closed();
        }
        _ => {}
    }
}

#[async_trait]
impl PeerConnection for WebRtcConnection {
    fn pc_id(&self) -> &PcId {
        self.events.pc_id()
    }

    fn state(&self) -> ConnectionState {
        self.events.state()
    }

    async fn initialize(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, NegotiationError> {
        self.negotiate(offer).await
    }

    async fn renegotiate(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, NegotiationError> {
        self.negotiate(offer).await
    }

    async fn close(&self) {
        // The peer may still hold transports after a remote failure marked
        // the connection closed. `RTCPeerConnection::close` is idempotent.
        if let Err(e) = self.peer.close().await {
            tracing::warn!(pc_id = %self.pc_id(), error = %e, "Error closing peer connection");
        }
        self.events.mark_closed();
    }

    fn answer(&self) -> Option<Answer> {
        self.events.answer()
    }

    fn on_closed(&self, listener: CloseListener) {
        self.events.subscribe(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use webrtc::peer_connection::signaling_state::RTCSignalingState;

    /// Browser stand-in: a peer with one data channel producing a complete
    /// offer.
    async fn remote_offer() -> (RTCPeerConnection, SessionDescription) {
        let api = build_api().unwrap();
        let remote = api
            .new_peer_connection(RTCConfiguration::default())
            .await
            .unwrap();
        remote.create_data_channel("chat", None).await.unwrap();

        let offer = remote.create_offer(None).await.unwrap();
        let mut gathering_complete = remote.gathering_complete_promise().await;
        remote.set_local_description(offer).await.unwrap();
        let _ = gathering_complete.recv().await;

        let sdp = remote.local_description().await.unwrap().sdp;
        (remote, SessionDescription::offer(sdp))
    }

    #[tokio::test]
    async fn answers_remote_offer() {
        let factory = WebRtcConnectionFactory::new(&[]).unwrap();
        let connection = factory.create().await.unwrap();
        assert!(connection.pc_id().as_str().starts_with("pc-"));
        assert_eq!(connection.state(), ConnectionState::Negotiating);

        let (remote, offer) = remote_offer().await;
        let answer = connection.initialize(offer).await.unwrap();

        assert_eq!(answer.sdp_type, SdpType::Answer);
        assert!(answer.sdp.starts_with("v=0"));
        assert_eq!(connection.state(), ConnectionState::Connected);
        assert_eq!(connection.answer().unwrap().pc_id, *connection.pc_id());

        remote
            .set_remote_description(RTCSessionDescription::answer(answer.sdp).unwrap())
            .await
            .unwrap();

        connection.close().await;
        remote.close().await.unwrap();
    }

    #[tokio::test]
    async fn invalid_offer_fails_without_state_change() {
        let factory = WebRtcConnectionFactory::new(&[]).unwrap();
        let connection = factory.create().await.unwrap();

        let err = connection
            .initialize(SessionDescription::offer("not sdp"))
            .await
            .unwrap_err();

        assert!(matches!(err, NegotiationError::Failed(_)));
        assert_eq!(connection.state(), ConnectionState::Negotiating);
        connection.close().await;
    }

    #[tokio::test]
    async fn rejects_non_offer_descriptions() {
        let factory = WebRtcConnectionFactory::new(&[]).unwrap();
        let connection = factory.create().await.unwrap();

        let err = connection
            .initialize(SessionDescription::answer("v=0"))
            .await
            .unwrap_err();
        assert!(matches!(err, NegotiationError::UnsupportedType(SdpType::Answer)));
        connection.close().await;
    }

    async fn wait_for_signaling_closed(peer: &RTCPeerConnection) -> bool {
        for _ in 0..100 {
            if peer.signaling_state() == RTCSignalingState::Closed {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn failed_state_closes_the_peer() {
        let api = build_api().unwrap();
        let peer = Arc::new(
            api.new_peer_connection(RTCConfiguration::default())
                .await
                .unwrap(),
        );
        let connection = WebRtcConnection::new(PcId::from("pc-failed"), Arc::clone(&peer));

        let count = Arc::new(AtomicUsize::new(0));
        let listener_count = Arc::clone(&count);
        connection.on_closed(Box::new(move |_| {
            listener_count.fetch_add(1, Ordering::SeqCst);
        }));

        on_state_change(
            &connection.events,
            &Arc::downgrade(&peer),
            RTCPeerConnectionState::Failed,
        );

        assert!(connection.is_closed());
        assert!(wait_for_signaling_closed(&peer).await);

        // Closing afterwards still reaches the peer and fires nothing new.
        connection.close().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_after_remote_close_still_closes_peer() {
        let api = build_api().unwrap();
        let peer = Arc::new(
            api.new_peer_connection(RTCConfiguration::default())
                .await
                .unwrap(),
        );
        let connection = WebRtcConnection::new(PcId::from("pc-closed"), Arc::clone(&peer));

        connection.events.mark_closed();
        assert_ne!(peer.signaling_state(), RTCSignalingState::Closed);

        connection.close().await;
        assert_eq!(peer.signaling_state(), RTCSignalingState::Closed);
    }

    #[tokio::test]
    async fn close_fires_listener_once() {
        let factory = WebRtcConnectionFactory::new(&[]).unwrap();
        let connection = factory.create().await.unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let listener_count = Arc::clone(&count);
        connection.on_closed(Box::new(move |_| {
            listener_count.fetch_add(1, Ordering::SeqCst);
        }));

        connection.close().await;
        connection.close().await;

        assert!(connection.is_closed());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(matches!(
            connection
                .renegotiate(SessionDescription::offer("v=0"))
                .await,
            Err(NegotiationError::Closed(_))
        ));
    }
}
