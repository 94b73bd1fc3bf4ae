//! Real bot libraries loaded through `DylibBotSource`.
//!
//! The libraries come from the `botlet-test-bots` crate, built once per test
//! run into a private target directory.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use botlet::bot::{Bot, BotError, BotHost, BotSource, DEFAULT_HANDLER_ID, LoadError};
use botlet::connection::{
    Answer, CloseListener, ConnectionEvents, ConnectionState, NegotiationError, PcId,
    PeerConnection, SessionDescription,
};
use botlet::{BotLoader, DylibBotSource, WorkerTask};

fn bots_dir() -> &'static Path {
    static DIR: OnceLock<PathBuf> = OnceLock::new();
    DIR.get_or_init(|| {
        let target_dir = Path::new(env!("CARGO_TARGET_TMPDIR")).join("bots");
        let manifest = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../Cargo.toml");
        let status = Command::new(env!("CARGO"))
            .args(["build", "-p", "botlet-test-bots", "--lib", "--examples"])
            .arg("--manifest-path")
            .arg(&manifest)
            .arg("--target-dir")
            .arg(&target_dir)
            .status()
            .expect("failed to run cargo");
        assert!(status.success(), "building botlet-test-bots failed");
        target_dir.join("debug")
    })
}

fn library_file(dir: &Path, name: &str) -> PathBuf {
    use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
    dir.join(format!("{DLL_PREFIX}{name}{DLL_SUFFIX}"))
}

fn test_bot() -> DylibBotSource {
    DylibBotSource::new(Some(library_file(bots_dir(), "botlet_test_bots")))
}

fn broken_bot(name: &str) -> DylibBotSource {
    DylibBotSource::new(Some(library_file(&bots_dir().join("examples"), name)))
}

/// Connection that records closes and never negotiates.
struct TestConnection {
    events: ConnectionEvents,
}

impl TestConnection {
    fn new(pc_id: &str) -> Arc<Self> {
        Arc::new(Self {
            events: ConnectionEvents::new(PcId::from(pc_id)),
        })
    }
}

#[async_trait]
impl PeerConnection for TestConnection {
    fn pc_id(&self) -> &PcId {
        self.events.pc_id()
    }

    fn state(&self) -> ConnectionState {
        self.events.state()
    }

    async fn initialize(
        &self,
        _offer: SessionDescription,
    ) -> Result<SessionDescription, NegotiationError> {
        Err(NegotiationError::Failed("not negotiable".to_string()))
    }

    async fn renegotiate(
        &self,
        _offer: SessionDescription,
    ) -> Result<SessionDescription, NegotiationError> {
        Err(NegotiationError::Failed("not negotiable".to_string()))
    }

    async fn close(&self) {
        self.events.mark_closed();
    }

    fn answer(&self) -> Option<Answer> {
        self.events.answer()
    }

    fn on_closed(&self, listener: CloseListener) {
        self.events.subscribe(listener);
    }
}

async fn run(pc_id: &str) -> anyhow::Result<()> {
    let bot = test_bot().load(&BotHost::new()).await.unwrap();
    bot.run(TestConnection::new(pc_id)).await
}

#[tokio::test]
async fn loads_and_runs_library_bot() {
    let host = BotHost::new();
    let bot = test_bot().load(&host).await.unwrap();

    // init swapped the default handler for a debug one
    assert!(!host.log_handlers().contains(DEFAULT_HANDLER_ID));
    assert!(host.log_handlers().enabled(tracing::Level::DEBUG));

    bot.run(TestConnection::new("done-1")).await.unwrap();
}

#[tokio::test]
async fn bot_can_use_tokio() {
    run("sleep-1").await.unwrap();
    run("spawn-1").await.unwrap();
}

#[tokio::test]
async fn bot_panic_is_an_error() {
    let err = run("panic-1").await.unwrap_err();
    assert_eq!(err.to_string(), "bot panicked: bot bug");

    // the host is still alive and the library still usable
    run("done-2").await.unwrap();
}

#[tokio::test]
async fn bot_failure_is_returned() {
    let err = run("fail-1").await.unwrap_err();
    assert_eq!(err.to_string(), "bot gave up");
}

#[tokio::test]
async fn bot_closes_connection() {
    let connection = TestConnection::new("close-1");
    let bot = test_bot().load(&BotHost::new()).await.unwrap();

    bot.run(connection.clone()).await.unwrap();
    assert!(connection.is_closed());
}

#[tokio::test]
async fn close_listener_runs_on_library_runtime() {
    let connection = TestConnection::new("listen-1");
    let bot = test_bot().load(&BotHost::new()).await.unwrap();

    bot.run(connection.clone()).await.unwrap();
    assert!(connection.is_closed());
}

#[tokio::test]
async fn worker_survives_library_panic() {
    let bot = test_bot().load(&BotHost::new()).await.unwrap();
    let worker = WorkerTask::spawn(bot, TestConnection::new("panic-2"));

    for _ in 0..100 {
        if worker.is_finished() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(worker.is_finished());
    worker.shutdown().await;
}

#[tokio::test]
async fn worker_shutdown_cancels_idle_library_bot() {
    let bot = test_bot().load(&BotHost::new()).await.unwrap();
    let worker = WorkerTask::spawn(bot, TestConnection::new("idle-1"));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!worker.is_finished());

    tokio::time::timeout(Duration::from_secs(5), worker.shutdown())
        .await
        .unwrap();
}

#[tokio::test]
async fn loader_recovers_from_logging_conflict() {
    let loader = BotLoader::new(Arc::new(test_bot()));
    // Simulates a previous bot load that already removed the default handler.
    loader
        .host()
        .log_handlers()
        .remove(DEFAULT_HANDLER_ID)
        .unwrap();

    let bot = loader.load_once().await.unwrap();
    assert!(loader.is_loaded());
    bot.run(TestConnection::new("done-3")).await.unwrap();
}

#[tokio::test]
async fn library_without_declaration_is_rejected() {
    let err = broken_bot("missing_declaration")
        .load(&BotHost::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err,
        BotError::Load(LoadError::MissingDeclaration { .. })
    ));
}

#[tokio::test]
async fn abi_mismatch_is_rejected() {
    let err = broken_bot("abi_mismatch")
        .load(&BotHost::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err,
        BotError::Load(LoadError::AbiMismatch {
            found: 999,
            expected: 1
        })
    ));
}

#[tokio::test]
async fn library_without_entry_point_is_invalid() {
    let err = broken_bot("missing_entry")
        .load(&BotHost::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, BotError::InvalidModule));
    assert_eq!(
        err.to_string(),
        "Bot module does not have a run_bot function"
    );
}
