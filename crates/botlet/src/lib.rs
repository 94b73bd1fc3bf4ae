//! botlet: single-slot WebRTC signaling coordinator for conversational bots.

pub mod bot;
pub mod config;
pub mod connection;
pub mod coordinator;
mod error;
pub mod logging;
pub mod slot;
pub mod transport;
#[cfg(feature = "webrtc-rs")]
pub mod webrtc_rs;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use bot::{Bot, BotError, BotHost, BotLoader, BotSource, DylibBotSource, StaticBotSource};
pub use config::{BotletConfig, ConfigError};
pub use connection::{
    Answer, ConnectionFactory, ConnectionState, NegotiationError, PcId, PeerConnection, SdpType,
    SessionDescription,
};
pub use coordinator::{OfferRequest, SignalingCoordinator};
pub use error::BotletError;
pub use slot::SessionSlot;
pub use worker::WorkerTask;

/// Serve `POST /api/offer` with webrtc-rs connections and the configured bot
/// library until the process is signalled.
///
/// Installs the [`logging`] subscriber unless the caller already set one.
#[cfg(feature = "webrtc-rs")]
pub async fn run(config: BotletConfig) -> anyhow::Result<()> {
    use std::sync::Arc;

    logging::init_tracing();
    tracing::info!("botlet {}", env!("CARGO_PKG_VERSION"));

    let factory = webrtc_rs::WebRtcConnectionFactory::new(&config.ice_servers)?;
    let loader = BotLoader::new(Arc::new(DylibBotSource::new(config.bot_path.clone())));

    match &config.bot_path {
        Some(path) => tracing::info!(path = %path.display(), "Bot file configured"),
        None => tracing::warn!("BOT_FILE_PATH is not set, offers will be rejected"),
    }

    let coordinator = Arc::new(SignalingCoordinator::new(Arc::new(factory), loader));
    transport::serve(config.server, coordinator).await
}
