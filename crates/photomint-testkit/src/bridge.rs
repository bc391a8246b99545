//! Scripted signer bridge.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use photomint_core::{Address, EngineError, Result, TxHash, TxRequest};
use photomint_signer::{BridgeEvent, Handshake, PersistedSession, SignerBridge};

use crate::CallLog;

/// How the bridge answers one transaction hand-off.
#[derive(Debug, Clone)]
pub enum SendScript {
    /// Acknowledge with this hash
    Ack(TxHash),
    /// Fail with this error
    Fail(EngineError),
    /// Never resolve; the caller stays parked until aborted
    Hang,
}

struct BridgeState {
    events: Option<mpsc::Sender<BridgeEvent>>,
    sends: VecDeque<SendScript>,
    sent: Vec<(Address, TxRequest)>,
    open_error: Option<EngineError>,
    resume_error: Option<EngineError>,
    last_handshake: Option<Handshake>,
}

/// Bridge whose signer is the test itself.
///
/// `open` and `resume` capture the engine's event sender; the test then
/// plays the signer by emitting [`BridgeEvent`]s. Transaction hand-offs
/// pop the send script and fall back to a fixed acknowledgement.
pub struct ScriptedBridge {
    state: Mutex<BridgeState>,
    log: CallLog,
}

impl ScriptedBridge {
    /// Fixed acknowledgement hash used when no send script is queued.
    pub const DEFAULT_ACK: TxHash = TxHash::repeat_byte(0xac);

    /// A bridge that opens cleanly and acknowledges every send.
    pub fn new() -> Self {
        Self::with_log(CallLog::new())
    }

    /// A bridge recording into a shared `log`.
    pub fn with_log(log: CallLog) -> Self {
        Self {
            state: Mutex::new(BridgeState {
                events: None,
                sends: VecDeque::new(),
                sent: Vec::new(),
                open_error: None,
                resume_error: None,
                last_handshake: None,
            }),
            log,
        }
    }

    /// Queue the answer for the next transaction hand-off.
    pub fn script_send(&self, script: SendScript) {
        self.state.lock().sends.push_back(script);
    }

    /// Make the next `open` fail.
    pub fn fail_next_open(&self, error: EngineError) {
        self.state.lock().open_error = Some(error);
    }

    /// Make the next `resume` fail.
    pub fn fail_next_resume(&self, error: EngineError) {
        self.state.lock().resume_error = Some(error);
    }

    /// Play the signer: push `event` at the engine. Panics when no
    /// connection captured an event sender yet.
    pub async fn emit(&self, event: BridgeEvent) {
        let sender = self
            .state
            .lock()
            .events
            .clone()
            .expect("bridge not opened");
        sender.send(event).await.expect("engine gone");
    }

    /// Transactions handed to the signer, in order.
    pub fn sent(&self) -> Vec<(Address, TxRequest)> {
        self.state.lock().sent.clone()
    }

    /// Handshake of the most recent `open`.
    pub fn last_handshake(&self) -> Option<Handshake> {
        self.state.lock().last_handshake.clone()
    }
}

impl Default for ScriptedBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignerBridge for ScriptedBridge {
    async fn open(&self, handshake: Handshake, events: mpsc::Sender<BridgeEvent>) -> Result<()> {
        self.log.record("open");
        let mut state = self.state.lock();
        state.last_handshake = Some(handshake);
        if let Some(error) = state.open_error.take() {
            return Err(error);
        }
        state.events = Some(events);
        Ok(())
    }

    async fn resume(
        &self,
        _session: &PersistedSession,
        events: mpsc::Sender<BridgeEvent>,
    ) -> Result<()> {
        self.log.record("resume");
        let mut state = self.state.lock();
        if let Some(error) = state.resume_error.take() {
            return Err(error);
        }
        state.events = Some(events);
        Ok(())
    }

    async fn send_transaction(&self, from: Address, tx: &TxRequest) -> Result<TxHash> {
        self.log.record("send_transaction");
        let script = {
            let mut state = self.state.lock();
            state.sent.push((from, tx.clone()));
            state.sends.pop_front()
        };
        match script {
            None => Ok(Self::DEFAULT_ACK),
            Some(SendScript::Ack(hash)) => Ok(hash),
            Some(SendScript::Fail(error)) => Err(error),
            Some(SendScript::Hang) => std::future::pending().await,
        }
    }

    async fn close(&self) -> Result<()> {
        self.log.record("close");
        self.state.lock().events = None;
        Ok(())
    }
}
