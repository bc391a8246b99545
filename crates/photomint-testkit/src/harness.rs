//! A running engine wired to scripted transports.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use photomint_core::{Address, EngineConfig, EngineEvent};
use photomint_engine::{Engine, EngineDeps, EngineHandle};
use photomint_signer::{BridgeEvent, PersistedSession};

use crate::{
    init_tracing, CallLog, MemorySessionStore, RecordingHost, RecordingLauncher, ScriptedBridge,
    ScriptedLedger, ScriptedOffchain,
};

/// How long [`EngineHarness::next_event`] waits before declaring the
/// event missing. Under paused test time this fires immediately once
/// every task is idle.
const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// An engine task over scripted transports, plus handles to script and
/// observe every side of it.
pub struct EngineHarness {
    /// Front door of the running engine
    pub handle: EngineHandle,
    /// Subscribed before the engine started, so no event is missed
    pub events: broadcast::Receiver<EngineEvent>,
    /// Configuration the engine runs under
    pub config: EngineConfig,
    /// Scripted ledger reads
    pub ledger: Arc<ScriptedLedger>,
    /// Scripted signer bridge
    pub bridge: Arc<ScriptedBridge>,
    /// Scripted off-chain service
    pub offchain: Arc<ScriptedOffchain>,
    /// In-memory session store
    pub store: Arc<MemorySessionStore>,
    /// Recorded wallet launches
    pub launcher: Arc<RecordingLauncher>,
    /// Recorded suspension windows
    pub host: Arc<RecordingHost>,
    /// Ordering log shared by all scripted transports
    pub log: CallLog,
    /// The engine task itself
    pub task: JoinHandle<()>,
}

impl EngineHarness {
    /// Account most helpers connect as.
    pub fn test_account() -> Address {
        Address::repeat_byte(0x77)
    }

    /// Spawn an engine with testing timings and an empty store.
    pub fn spawn() -> Self {
        Self::spawn_with(EngineConfig::for_testing(), None)
    }

    /// Spawn an engine with `config`, optionally seeding the store as if
    /// a previous run had persisted `seed`.
    pub fn spawn_with(config: EngineConfig, seed: Option<PersistedSession>) -> Self {
        init_tracing();
        let log = CallLog::new();
        let ledger = Arc::new(ScriptedLedger::with_log(log.clone()));
        let bridge = Arc::new(ScriptedBridge::with_log(log.clone()));
        let offchain = Arc::new(ScriptedOffchain::with_log(log.clone()));
        let store = Arc::new(MemorySessionStore::new());
        if let Some(session) = seed {
            store.seed(session);
        }
        let launcher = Arc::new(RecordingLauncher::new());
        let host = Arc::new(RecordingHost::new());

        let deps = EngineDeps {
            ledger: ledger.clone(),
            bridge: bridge.clone(),
            offchain: offchain.clone(),
            store: store.clone(),
            launcher: launcher.clone(),
            host: host.clone(),
        };
        let (engine, handle) = Engine::new(config.clone(), deps);
        let events = handle.subscribe();
        let task = tokio::spawn(engine.run());

        Self {
            handle,
            events,
            config,
            ledger,
            bridge,
            offchain,
            store,
            launcher,
            host,
            log,
            task,
        }
    }

    /// Next event on the stream, or a panic after [`EVENT_TIMEOUT`].
    pub async fn next_event(&mut self) -> EngineEvent {
        tokio::time::timeout(EVENT_TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for an engine event")
            .expect("engine event stream closed")
    }

    /// Drain events until one satisfies `predicate`.
    pub async fn wait_for(&mut self, predicate: impl Fn(&EngineEvent) -> bool) -> EngineEvent {
        loop {
            let event = self.next_event().await;
            if predicate(&event) {
                return event;
            }
        }
    }

    /// Poll `predicate` until it holds, panicking after a bounded number
    /// of scheduler turns.
    pub async fn wait_until(&self, what: &str, predicate: impl Fn() -> bool) {
        for _ in 0..1_000 {
            if predicate() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("timed out waiting until {what}");
    }

    /// Connect and approve a session on the configured chain, returning
    /// the connected account once `SessionEstablished` was observed and
    /// the initial full refresh has finished. Draining the refresh here
    /// keeps its ledger reads from consuming scripts a test pushes next.
    pub async fn establish(&mut self) -> Address {
        let account = Self::test_account();
        self.handle.connect(None).await.expect("connect failed");
        self.bridge
            .emit(BridgeEvent::SessionApproved {
                account,
                chain: self.config.chain.chain_id,
                peer_id: Some("signer-peer".into()),
            })
            .await;
        self.wait_for(|event| matches!(event, EngineEvent::SessionEstablished { .. }))
            .await;
        self.wait_for(|event| matches!(event, EngineEvent::PrivateGalleryUpdated { .. }))
            .await;
        account
    }
}
