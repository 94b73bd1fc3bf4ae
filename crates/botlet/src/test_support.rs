//! In-memory connections, factories and bots for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::bot::{Bot, BotError, BotHost, BotSource};
use crate::connection::{
    Answer, CloseListener, ConnectionEvents, ConnectionFactory, ConnectionState,
    NegotiationError, PcId, PeerConnection, SessionDescription,
};

/// Connection that answers every offer with `answer:<offer sdp>`.
pub struct FakeConnection {
    events: ConnectionEvents,
    initialize_calls: AtomicUsize,
    renegotiate_calls: AtomicUsize,
    close_calls: AtomicUsize,
    fail_negotiation: AtomicBool,
}

impl FakeConnection {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self::build(PcId::from(id), false))
    }

    fn build(pc_id: PcId, fail_negotiation: bool) -> Self {
        Self {
            events: ConnectionEvents::new(pc_id),
            initialize_calls: AtomicUsize::new(0),
            renegotiate_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            fail_negotiation: AtomicBool::new(fail_negotiation),
        }
    }

    pub fn initialize_calls(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    pub fn renegotiate_calls(&self) -> usize {
        self.renegotiate_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Simulate the remote peer hanging up.
    pub fn remote_close(&self) {
        self.events.mark_closed();
    }

    async fn negotiate(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, NegotiationError> {
        self.events.ensure_open()?;
        if self.fail_negotiation.load(Ordering::SeqCst) {
            return Err(NegotiationError::Failed("remote description rejected".to_string()));
        }
        let answer = SessionDescription::answer(format!("answer:{}", offer.sdp));
        self.events.negotiated(answer.clone())?;
        Ok(answer)
    }
}

#[async_trait]
impl PeerConnection for FakeConnection {
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
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        self.negotiate(offer).await
    }

    async fn renegotiate(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, NegotiationError> {
        self.renegotiate_calls.fetch_add(1, Ordering::SeqCst);
        self.negotiate(offer).await
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.events.mark_closed();
    }

    fn answer(&self) -> Option<Answer> {
        self.events.answer()
    }

    fn on_closed(&self, listener: CloseListener) {
        self.events.subscribe(listener);
    }
}

/// Factory handing out `pc-1`, `pc-2`, ... and remembering every connection.
#[derive(Default)]
pub struct FakeFactory {
    created: Mutex<Vec<Arc<FakeConnection>>>,
    fail_negotiation: AtomicBool,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_negotiation(&self, fail: bool) {
        self.fail_negotiation.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<Arc<FakeConnection>> {
        self.created.lock().unwrap().clone()
    }

    pub fn connection(&self, index: usize) -> Arc<FakeConnection> {
        Arc::clone(&self.created.lock().unwrap()[index])
    }
}

#[async_trait]
impl ConnectionFactory for FakeFactory {
    async fn create(&self) -> Result<Arc<dyn PeerConnection>, NegotiationError> {
        let mut created = self.created.lock().unwrap();
        let pc_id = PcId::from(format!("pc-{}", created.len() + 1));
        let connection = Arc::new(FakeConnection::build(
            pc_id,
            self.fail_negotiation.load(Ordering::SeqCst),
        ));
        created.push(Arc::clone(&connection));
        Ok(connection)
    }
}

/// Bot that waits until cancelled.
pub struct IdleBot;

#[async_trait]
impl Bot for IdleBot {
    async fn run(&self, _connection: Arc<dyn PeerConnection>) -> anyhow::Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Bot that records which connections it ran against, then returns.
#[derive(Default)]
pub struct RecordingBot {
    runs: Mutex<Vec<PcId>>,
}

impl RecordingBot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> Vec<PcId> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Bot for RecordingBot {
    async fn run(&self, connection: Arc<dyn PeerConnection>) -> anyhow::Result<()> {
        self.runs.lock().unwrap().push(connection.pc_id().clone());
        Ok(())
    }
}

pub struct FailingBot;

#[async_trait]
impl Bot for FailingBot {
    async fn run(&self, _connection: Arc<dyn PeerConnection>) -> anyhow::Result<()> {
        anyhow::bail!("pipeline crashed")
    }
}

pub struct PanickingBot;

#[async_trait]
impl Bot for PanickingBot {
    async fn run(&self, _connection: Arc<dyn PeerConnection>) -> anyhow::Result<()> {
        panic!("bot panicked")
    }
}

/// Source with scripted failures, a load counter and an optional delay.
pub struct ScriptedSource {
    bot: Arc<dyn Bot>,
    loads: AtomicUsize,
    failures: Mutex<VecDeque<BotError>>,
    delay: Option<Duration>,
    configured: bool,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::with_bot(Arc::new(IdleBot))
    }

    pub fn with_bot(bot: Arc<dyn Bot>) -> Self {
        Self {
            bot,
            loads: AtomicUsize::new(0),
            failures: Mutex::new(VecDeque::new()),
            delay: None,
            configured: true,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_next(self, error: BotError) -> Self {
        self.failures.lock().unwrap().push_back(error);
        self
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BotSource for ScriptedSource {
    fn check(&self) -> Result<(), BotError> {
        if self.configured {
            Ok(())
        } else {
            Err(BotError::NotConfigured)
        }
    }

    async fn load(&self, _host: &BotHost) -> Result<Arc<dyn Bot>, BotError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failures.lock().unwrap().pop_front();
        match failure {
            Some(error) => Err(error),
            None => Ok(Arc::clone(&self.bot)),
        }
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}
