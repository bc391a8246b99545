//! The engine actor.
//!
//! One task owns every piece of mutable state: the session machine, the
//! table of in-flight operations, and the persisted-session blob. It
//! drains two queues, commands from [`EngineHandle`]s and events from the
//! signer bridge, and never awaits I/O itself; dispatch, confirmation
//! polling, refresh, and faucet calls all run as spawned workers that
//! report back through the command queue. Workers carry the ticket they
//! were spawned under, so a report from a superseded incarnation is
//! recognized and dropped here rather than racing the current one.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use photomint_chain::{HttpRpc, LedgerReader, LedgerReads, NodeRpc};
use photomint_core::{
    Address, ChainId, DisconnectReason, EngineConfig, EngineError, EngineEvent, OperationKind,
    Result, SessionEpoch, TxHash,
};
use photomint_signer::{
    BridgeEvent, FileSessionStore, GuardPurpose, GuardRegistry, Handshake, HostSuspension,
    NullSessionStore, PersistedSession, RelayBridge, SessionState, SessionStore, SessionUpdate,
    SignerBridge, SignerSession, SuspensionGuard, WalletDescriptor, WalletLauncher,
};

use crate::dispatch::{self, DispatchContext, DispatchOutcome, OperationRequest};
use crate::observer::{self, ObservationContext, ObservationOutcome};
use crate::offchain::{FaucetStatus, HttpOffchain, OffchainApi};
use crate::refresh::{self, RefreshContext, RefreshPlan};

const COMMAND_QUEUE: usize = 64;
const BRIDGE_QUEUE: usize = 64;
const EVENT_QUEUE: usize = 256;

/// Point-in-time view of the session, for callers that poll instead of
/// subscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Session machine state
    pub state: SessionState,
    /// Epoch of the current incarnation
    pub epoch: SessionEpoch,
    /// True when a session exists but sits on the wrong chain
    pub wrong_chain: bool,
}

/// Everything the actor reacts to.
pub(crate) enum EngineCommand {
    Connect {
        wallet: Option<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<Result<()>>,
    },
    Submit {
        request: OperationRequest,
        reply: oneshot::Sender<Result<TxHash>>,
    },
    Refresh {
        reply: oneshot::Sender<Result<()>>,
    },
    FaucetAvailable {
        reply: oneshot::Sender<Result<bool>>,
    },
    FaucetStatus {
        reply: oneshot::Sender<Result<FaucetStatus>>,
    },
    SessionInfo {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    /// Host reports that a suspension window ran out
    GuardExpired { purpose: GuardPurpose },
    /// Relay opened (or failed to open) for a fresh connect attempt
    ConnectOpened { result: Result<()> },
    /// Relay resume for a persisted session finished
    ResumeFinished { result: Result<()> },
    /// A dispatch worker reached the signer hand-off
    SendStarted { kind: OperationKind, ticket: u64 },
    /// A dispatch worker finished
    DispatchDone(DispatchOutcome),
    /// A confirmation poller finished
    ObservationFinished {
        ticket: u64,
        kind: OperationKind,
        outcome: ObservationOutcome,
    },
    /// A refresh worker finished its read batch
    RefreshFinished {
        epoch: SessionEpoch,
        events: Vec<EngineEvent>,
    },
    Shutdown,
}

impl std::fmt::Debug for EngineCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EngineCommand::Connect { .. } => "Connect",
            EngineCommand::Disconnect { .. } => "Disconnect",
            EngineCommand::Submit { .. } => "Submit",
            EngineCommand::Refresh { .. } => "Refresh",
            EngineCommand::FaucetAvailable { .. } => "FaucetAvailable",
            EngineCommand::FaucetStatus { .. } => "FaucetStatus",
            EngineCommand::SessionInfo { .. } => "SessionInfo",
            EngineCommand::GuardExpired { .. } => "GuardExpired",
            EngineCommand::ConnectOpened { .. } => "ConnectOpened",
            EngineCommand::ResumeFinished { .. } => "ResumeFinished",
            EngineCommand::SendStarted { .. } => "SendStarted",
            EngineCommand::DispatchDone(_) => "DispatchDone",
            EngineCommand::ObservationFinished { .. } => "ObservationFinished",
            EngineCommand::RefreshFinished { .. } => "RefreshFinished",
            EngineCommand::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

/// Transports and host services the engine runs over.
pub struct EngineDeps {
    /// Contract read surface
    pub ledger: Arc<dyn LedgerReads>,
    /// Signer hand-off bridge
    pub bridge: Arc<dyn SignerBridge>,
    /// Faucet and contracts-config service
    pub offchain: Arc<dyn OffchainApi>,
    /// Session persistence
    pub store: Arc<dyn SessionStore>,
    /// Wallet deep-link opener
    pub launcher: Arc<dyn WalletLauncher>,
    /// Suspension keep-alive windows
    pub host: Arc<dyn HostSuspension>,
}

enum PendingPhase {
    /// Worker is building and handing the call to the signer; the caller
    /// is still awaiting the acknowledgement hash
    Dispatching {
        reply: oneshot::Sender<Result<TxHash>>,
        task: JoinHandle<()>,
    },
    /// Acknowledged; a poller is waiting for the metric to move
    Observing { task: JoinHandle<()> },
}

struct PendingOperation {
    ticket: u64,
    phase: PendingPhase,
}

struct ConnectAttempt {
    handshake: Handshake,
    wallet: Option<&'static WalletDescriptor>,
    guard: Option<SuspensionGuard>,
    reply: Option<oneshot::Sender<Result<()>>>,
    task: JoinHandle<()>,
}

/// The actor. Constructed with [`Engine::new`], consumed by
/// [`Engine::run`].
pub struct Engine {
    config: EngineConfig,
    ledger: Arc<dyn LedgerReads>,
    bridge: Arc<dyn SignerBridge>,
    offchain: Arc<dyn OffchainApi>,
    store: Arc<dyn SessionStore>,
    launcher: Arc<dyn WalletLauncher>,
    guards: Arc<GuardRegistry>,

    session: SignerSession,
    connect: Option<ConnectAttempt>,
    persisted: Option<PersistedSession>,
    restoring: bool,

    pending: HashMap<OperationKind, PendingOperation>,
    /// Operation currently inside the signer hand-off, by kind and ticket
    sending: Option<(OperationKind, u64)>,
    next_ticket: u64,

    commands: mpsc::Receiver<EngineCommand>,
    command_tx: mpsc::Sender<EngineCommand>,
    bridge_events: mpsc::Receiver<BridgeEvent>,
    bridge_tx: mpsc::Sender<BridgeEvent>,
    events: broadcast::Sender<EngineEvent>,
}

impl Engine {
    /// Build an engine over explicit transports. The engine does nothing
    /// until [`Engine::run`] is spawned.
    pub fn new(config: EngineConfig, deps: EngineDeps) -> (Engine, EngineHandle) {
        let (command_tx, commands) = mpsc::channel(COMMAND_QUEUE);
        let (bridge_tx, bridge_events) = mpsc::channel(BRIDGE_QUEUE);
        let (events, _) = broadcast::channel(EVENT_QUEUE);

        let session = SignerSession::new(config.chain.chain_id);
        let handle = EngineHandle {
            commands: command_tx.clone(),
            events: events.clone(),
        };
        let engine = Engine {
            config,
            ledger: deps.ledger,
            bridge: deps.bridge,
            offchain: deps.offchain,
            store: deps.store,
            launcher: deps.launcher,
            guards: GuardRegistry::new(deps.host),
            session,
            connect: None,
            persisted: None,
            restoring: false,
            pending: HashMap::new(),
            sending: None,
            next_ticket: 1,
            commands,
            command_tx,
            bridge_events,
            bridge_tx,
            events,
        };
        (engine, handle)
    }

    /// Build an engine over the production transports: JSON-RPC reads,
    /// the websocket relay, the HTTP companion service, and a file-backed
    /// session store when the configuration names one.
    ///
    /// When `fetch_contracts` is set the service's contract addresses
    /// replace the configured ones; a fetch failure falls back with a
    /// warning. The node's chain id is checked once and only logged.
    pub async fn standard(
        mut config: EngineConfig,
        launcher: Arc<dyn WalletLauncher>,
        host: Arc<dyn HostSuspension>,
    ) -> (Engine, EngineHandle) {
        let offchain: Arc<dyn OffchainApi> =
            Arc::new(HttpOffchain::new(config.offchain.base_url.clone()));
        if config.offchain.fetch_contracts {
            match offchain.contracts().await {
                Ok(remote) => config.chain = remote.apply(config.chain),
                Err(error) => {
                    tracing::warn!(%error, "contracts fetch failed; using configured addresses");
                }
            }
        }

        let rpc: Arc<dyn NodeRpc> = Arc::new(HttpRpc::new(config.chain.rpc_url.clone()));
        match rpc.chain_id().await {
            Ok(reported) if reported != config.chain.chain_id => tracing::warn!(
                configured = %config.chain.chain_id,
                reported = %reported,
                "node reports a different chain id"
            ),
            Ok(_) => {}
            Err(error) => tracing::warn!(%error, "node chain id check failed"),
        }

        let ledger = Arc::new(LedgerReader::new(rpc, config.chain.clone()));
        let store: Arc<dyn SessionStore> = match &config.session_file {
            Some(path) => Arc::new(FileSessionStore::new(path.clone())),
            None => Arc::new(NullSessionStore),
        };
        let deps = EngineDeps {
            ledger,
            bridge: Arc::new(RelayBridge::new()),
            offchain,
            store,
            launcher,
            host,
        };
        Self::new(config, deps)
    }

    /// Drive the actor until shutdown. Restores a persisted session
    /// first, then serves commands and bridge events.
    pub async fn run(mut self) {
        self.start_restore();
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(EngineCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                event = self.bridge_events.recv() => {
                    // The engine holds a sender, so the channel outlives it.
                    if let Some(event) = event {
                        self.handle_bridge_event(event);
                    }
                }
            }
        }
        self.shutdown().await;
    }

    fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Connect { wallet, reply } => self.handle_connect(wallet, reply),
            EngineCommand::Disconnect { reply } => self.handle_disconnect(reply),
            EngineCommand::Submit { request, reply } => self.handle_submit(request, reply),
            EngineCommand::Refresh { reply } => self.handle_refresh(reply),
            EngineCommand::FaucetAvailable { reply } => self.handle_faucet_available(reply),
            EngineCommand::FaucetStatus { reply } => self.handle_faucet_status(reply),
            EngineCommand::SessionInfo { reply } => {
                let _ = reply.send(SessionSnapshot {
                    state: self.session.state(),
                    epoch: self.session.epoch(),
                    wrong_chain: self.session.wrong_chain(),
                });
            }
            EngineCommand::GuardExpired { purpose } => self.handle_guard_expired(purpose),
            EngineCommand::ConnectOpened { result } => self.handle_connect_opened(result),
            EngineCommand::ResumeFinished { result } => self.handle_resume_finished(result),
            EngineCommand::SendStarted { kind, ticket } => {
                if self.ticket_current(kind, ticket) {
                    self.sending = Some((kind, ticket));
                }
            }
            EngineCommand::DispatchDone(outcome) => self.handle_dispatch_done(outcome),
            EngineCommand::ObservationFinished {
                ticket,
                kind,
                outcome,
            } => self.handle_observation_finished(ticket, kind, outcome),
            EngineCommand::RefreshFinished { epoch, events } => {
                if epoch == self.session.epoch() {
                    for event in events {
                        self.publish(event);
                    }
                } else {
                    tracing::debug!(%epoch, "stale refresh batch dropped");
                }
            }
            EngineCommand::Shutdown => {}
        }
    }

    // Connect and session lifecycle

    fn handle_connect(&mut self, wallet: Option<String>, reply: oneshot::Sender<Result<()>>) {
        if self.restoring {
            let _ = reply.send(Err(EngineError::already_pending("restore")));
            return;
        }
        let wallet = match wallet {
            Some(id) => match WalletDescriptor::by_id(&id) {
                Some(descriptor) => Some(descriptor),
                None => {
                    let _ = reply.send(Err(EngineError::config(format!("unknown wallet: {id}"))));
                    return;
                }
            },
            None => None,
        };

        let guard = match self.guards.acquire(GuardPurpose::Connect) {
            Ok(guard) => guard,
            Err(error) => {
                let _ = reply.send(Err(error));
                return;
            }
        };
        if let Err(error) = self.session.begin_connect() {
            guard.release();
            let _ = reply.send(Err(error));
            return;
        }

        let handshake = Handshake::generate(self.config.relay.url.clone());
        tracing::info!(topic = %handshake.topic, "connect attempt started");

        let bridge = Arc::clone(&self.bridge);
        let bridge_tx = self.bridge_tx.clone();
        let commands = self.command_tx.clone();
        let opening = handshake.clone();
        let task = tokio::spawn(async move {
            let result = bridge.open(opening, bridge_tx).await;
            let _ = commands.send(EngineCommand::ConnectOpened { result }).await;
        });

        self.connect = Some(ConnectAttempt {
            handshake,
            wallet,
            guard: Some(guard),
            reply: Some(reply),
            task,
        });
    }

    fn handle_connect_opened(&mut self, result: Result<()>) {
        if self.connect.is_none() {
            tracing::debug!("relay opened for an abandoned connect attempt");
            return;
        }

        match result {
            Ok(()) => {
                self.session.link_ready();
                let (reply, connect_uri, wallet) = match self.connect.as_mut() {
                    Some(attempt) => (
                        attempt.reply.take(),
                        attempt.handshake.connect_uri(),
                        attempt.wallet,
                    ),
                    None => return,
                };
                let wallet_link = wallet.and_then(|wallet| {
                    wallet
                        .connect_link(&connect_uri)
                        .map_err(|error| tracing::warn!(%error, "wallet link build failed"))
                        .ok()
                });

                if let Some(link) = wallet_link.clone() {
                    let launcher = Arc::clone(&self.launcher);
                    let delay = self.config.relay.deep_link_delay();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        if let Err(error) = launcher.launch(&link) {
                            tracing::warn!(%error, "wallet launch failed");
                        }
                    });
                }

                self.publish(EngineEvent::ConnectLinkReady {
                    connect_uri,
                    wallet_link,
                });
                if let Some(reply) = reply {
                    let _ = reply.send(Ok(()));
                }
            }
            Err(error) => {
                tracing::warn!(%error, "relay open failed");
                let Some(attempt) = self.connect.take() else {
                    return;
                };
                attempt.task.abort();
                if let Some(guard) = attempt.guard {
                    guard.release();
                }
                self.session.disconnected();
                if let Some(reply) = attempt.reply {
                    let _ = reply.send(Err(error));
                }
            }
        }
    }

    fn handle_bridge_event(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::SessionApproved {
                account,
                chain,
                peer_id,
            } => self.on_session_approved(account, chain, peer_id),
            BridgeEvent::SessionRejected => self.on_session_rejected(),
            BridgeEvent::SessionUpdated {
                approved,
                account,
                chain,
            } => self.on_session_updated(approved, account, chain),
            BridgeEvent::Closed { reason } => self.on_bridge_closed(reason),
        }
    }

    fn on_session_approved(&mut self, account: Address, chain: ChainId, peer_id: Option<String>) {
        let Some(attempt) = self.connect.take() else {
            tracing::debug!("approval without a connect attempt ignored");
            return;
        };
        if let Some(guard) = attempt.guard {
            guard.release();
        }
        if let Some(reply) = attempt.reply {
            let _ = reply.send(Ok(()));
        }

        self.session.approved(account, chain);
        let wrong_chain = self.session.wrong_chain();
        tracing::info!(%account, %chain, wrong_chain, "session established");

        // Without a peer topic, follow-up requests go back to the
        // handshake topic.
        let handshake = attempt.handshake;
        let peer_id = peer_id.unwrap_or_else(|| handshake.topic.clone());
        let saved = PersistedSession {
            handshake,
            peer_id,
            account,
            chain,
        };
        if let Err(error) = self.store.save(&saved) {
            tracing::warn!(%error, "session not persisted");
        }
        self.persisted = Some(saved);

        self.publish(EngineEvent::SessionEstablished {
            account,
            chain,
            wrong_chain,
        });
        // The initial load waits until the session sits on the required
        // chain; correcting the chain triggers it.
        if !wrong_chain {
            self.spawn_refresh(RefreshPlan::Full);
        }
    }

    fn on_session_rejected(&mut self) {
        let Some(attempt) = self.connect.take() else {
            tracing::debug!("rejection without a connect attempt ignored");
            return;
        };
        attempt.task.abort();
        if let Some(guard) = attempt.guard {
            guard.release();
        }
        if let Some(reply) = attempt.reply {
            let _ = reply.send(Err(EngineError::SignerRejected));
        }

        tracing::info!("session proposal rejected");
        self.session.disconnected();
        self.spawn_close();
        self.publish(EngineEvent::Disconnected {
            reason: DisconnectReason::PeerEnded,
        });
    }

    fn on_session_updated(
        &mut self,
        approved: bool,
        account: Option<Address>,
        chain: Option<ChainId>,
    ) {
        match self.session.apply_update(approved, account, chain) {
            SessionUpdate::Ended => {
                tracing::info!("signer ended the session");
                self.cancel_all("session ended");
                self.clear_persisted();
                self.spawn_close();
                self.publish(EngineEvent::Disconnected {
                    reason: DisconnectReason::PeerEnded,
                });
            }
            SessionUpdate::AccountChanged { previous, current } => {
                tracing::info!(%previous, %current, "session account changed");
                self.cancel_all("account changed");
                self.update_persisted();
                self.publish(EngineEvent::AccountChanged { previous, current });
                if !self.session.wrong_chain() {
                    self.spawn_refresh(RefreshPlan::Full);
                }
            }
            SessionUpdate::ChainChanged { chain } => {
                let wrong_chain = self.session.wrong_chain();
                tracing::info!(%chain, wrong_chain, "session chain changed");
                self.cancel_all("chain changed");
                self.update_persisted();
                if let Some(account) = self.session.account() {
                    self.publish(EngineEvent::SessionUpdated {
                        account,
                        chain,
                        wrong_chain,
                    });
                }
                if !wrong_chain {
                    self.spawn_refresh(RefreshPlan::Full);
                }
            }
            SessionUpdate::Unchanged => {
                tracing::debug!("session update changed nothing");
            }
        }
    }

    fn on_bridge_closed(&mut self, reason: DisconnectReason) {
        if self.restoring {
            tracing::debug!("bridge close during restore ignored; the resume result decides");
            return;
        }
        if let Some(attempt) = self.connect.take() {
            tracing::warn!("bridge closed during connect");
            attempt.task.abort();
            if let Some(guard) = attempt.guard {
                guard.release();
            }
            if let Some(reply) = attempt.reply {
                let _ = reply.send(Err(EngineError::connection("bridge closed")));
            }
            self.session.disconnected();
            self.publish(EngineEvent::Disconnected { reason });
            return;
        }

        match self.session.state() {
            SessionState::Connected { .. } => match self.persisted.clone() {
                Some(saved) => {
                    tracing::warn!("bridge dropped under a session; resuming");
                    self.session.begin_resume();
                    self.spawn_resume(saved);
                }
                None => {
                    tracing::warn!("bridge dropped with nothing to resume");
                    self.session.disconnected();
                    self.cancel_all("bridge closed");
                    self.publish(EngineEvent::Disconnected { reason });
                }
            },
            SessionState::Disconnected => {
                tracing::debug!("bridge close after teardown ignored");
            }
            _ => {
                if self.session.disconnected() {
                    self.cancel_all("bridge closed");
                    self.publish(EngineEvent::Disconnected { reason });
                }
            }
        }
    }

    fn handle_resume_finished(&mut self, result: Result<()>) {
        if self.restoring {
            self.restoring = false;
            match (result, self.persisted.clone()) {
                (Ok(()), Some(saved)) => {
                    self.session.restored(saved.account, saved.chain);
                    let wrong_chain = self.session.wrong_chain();
                    tracing::info!(account = %saved.account, "persisted session restored");
                    self.publish(EngineEvent::SessionRestored {
                        account: saved.account,
                        chain: saved.chain,
                        wrong_chain,
                    });
                    if !wrong_chain {
                        self.spawn_refresh(RefreshPlan::Full);
                    }
                }
                (Ok(()), None) | (Err(_), None) => {
                    tracing::debug!("restore finished with no persisted session");
                }
                (Err(error), Some(_)) => {
                    tracing::warn!(%error, "session restore failed; clearing the blob");
                    self.session.disconnected();
                    self.clear_persisted();
                    self.publish(EngineEvent::Disconnected {
                        reason: DisconnectReason::RestoreFailed,
                    });
                }
            }
            return;
        }

        match result {
            Ok(()) => {
                self.session.resumed();
                tracing::info!("bridge resumed under the same session");
            }
            Err(error) => {
                tracing::warn!(%error, "bridge resume failed");
                if self.session.disconnected() {
                    self.cancel_all("bridge closed");
                    self.publish(EngineEvent::Disconnected {
                        reason: DisconnectReason::BridgeClosed,
                    });
                }
            }
        }
    }

    fn handle_disconnect(&mut self, reply: oneshot::Sender<Result<()>>) {
        if let Some(attempt) = self.connect.take() {
            attempt.task.abort();
            if let Some(guard) = attempt.guard {
                guard.release();
            }
            if let Some(pending) = attempt.reply {
                let _ = pending.send(Err(EngineError::NotConnected));
            }
        }

        let had_session = self.session.disconnected();
        self.cancel_all("disconnect requested");
        self.clear_persisted();
        self.spawn_close();
        if had_session {
            tracing::info!("session disconnected");
            self.publish(EngineEvent::Disconnected {
                reason: DisconnectReason::Requested,
            });
        }
        let _ = reply.send(Ok(()));
    }

    fn handle_guard_expired(&mut self, purpose: GuardPurpose) {
        if !self.guards.expire(purpose) {
            tracing::debug!(purpose = purpose.as_str(), "expiry for an idle guard ignored");
            return;
        }
        tracing::warn!(purpose = purpose.as_str(), "suspension window expired");

        match purpose {
            GuardPurpose::Connect => {
                if let Some(attempt) = self.connect.take() {
                    attempt.task.abort();
                    // The registry already freed the slot; dropping the
                    // guard is now a no-op.
                    drop(attempt.guard);
                    if let Some(reply) = attempt.reply {
                        let _ = reply.send(Err(EngineError::suspension_expired("connect")));
                    }
                    self.session.disconnected();
                    self.spawn_close();
                    self.publish(EngineEvent::Disconnected {
                        reason: DisconnectReason::BridgeClosed,
                    });
                }
            }
            GuardPurpose::Send => {
                let Some((kind, ticket)) = self.sending.take() else {
                    return;
                };
                if !self.ticket_current(kind, ticket) {
                    return;
                }
                let Some(entry) = self.pending.remove(&kind) else {
                    return;
                };
                let error = EngineError::suspension_expired("send");
                match entry.phase {
                    PendingPhase::Dispatching { reply, task } => {
                        task.abort();
                        let _ = reply.send(Err(error.clone()));
                    }
                    PendingPhase::Observing { task } => task.abort(),
                }
                self.publish(EngineEvent::OperationFailed { kind, error });
            }
        }
    }

    // Operations

    fn handle_submit(&mut self, request: OperationRequest, reply: oneshot::Sender<Result<TxHash>>) {
        let account = match self.session.ready() {
            Ok(account) => account,
            Err(error) => {
                let _ = reply.send(Err(error));
                return;
            }
        };
        let kind = request.kind();
        if self.pending.contains_key(&kind) {
            let _ = reply.send(Err(EngineError::already_pending(kind.as_str())));
            return;
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        tracing::info!(kind = kind.as_str(), ticket, "operation submitted");

        let task = tokio::spawn(dispatch::run(DispatchContext {
            ledger: Arc::clone(&self.ledger),
            bridge: Arc::clone(&self.bridge),
            offchain: Arc::clone(&self.offchain),
            guards: Arc::clone(&self.guards),
            profile: self.config.chain.clone(),
            account,
            request,
            ticket,
            commands: self.command_tx.clone(),
        }));
        self.pending.insert(
            kind,
            PendingOperation {
                ticket,
                phase: PendingPhase::Dispatching { reply, task },
            },
        );
    }

    fn handle_dispatch_done(&mut self, outcome: DispatchOutcome) {
        if matches!(self.sending, Some((_, ticket)) if ticket == outcome.ticket) {
            self.sending = None;
        }
        if !self.ticket_current(outcome.kind, outcome.ticket) {
            tracing::debug!(kind = outcome.kind.as_str(), "stale dispatch outcome dropped");
            return;
        }
        let Some(entry) = self.pending.remove(&outcome.kind) else {
            return;
        };
        let PendingPhase::Dispatching { reply, .. } = entry.phase else {
            tracing::debug!(kind = outcome.kind.as_str(), "duplicate dispatch outcome dropped");
            return;
        };

        match outcome.result {
            Ok(success) => {
                let _ = reply.send(Ok(success.tx_hash));
                if let Some(address) = success.predicted {
                    self.publish(EngineEvent::CollectionPredicted { address });
                }
                if let Some(tx_id) = success.grant_id {
                    self.publish(EngineEvent::FaucetGranted { tx_id });
                }
                self.publish(EngineEvent::OperationSubmitted {
                    kind: outcome.kind,
                    tx_hash: success.tx_hash,
                });

                let task = tokio::spawn(observer::run(ObservationContext {
                    ledger: Arc::clone(&self.ledger),
                    config: self.config.observer,
                    kind: outcome.kind,
                    account: outcome.account,
                    baseline: success.baseline,
                    target: success.target,
                    ticket: outcome.ticket,
                    commands: self.command_tx.clone(),
                }));
                self.pending.insert(
                    outcome.kind,
                    PendingOperation {
                        ticket: outcome.ticket,
                        phase: PendingPhase::Observing { task },
                    },
                );
            }
            Err(error) => {
                tracing::warn!(kind = outcome.kind.as_str(), %error, "dispatch failed");
                let _ = reply.send(Err(error.clone()));
                self.publish(EngineEvent::OperationFailed {
                    kind: outcome.kind,
                    error,
                });
            }
        }
    }

    fn handle_observation_finished(
        &mut self,
        ticket: u64,
        kind: OperationKind,
        outcome: ObservationOutcome,
    ) {
        if !self.ticket_current(kind, ticket) {
            tracing::debug!(kind = kind.as_str(), "stale observation outcome dropped");
            return;
        }
        self.pending.remove(&kind);

        match outcome {
            ObservationOutcome::Confirmed { reading, attempts } => {
                tracing::info!(kind = kind.as_str(), attempts, "operation confirmed");
                self.publish(EngineEvent::OperationConfirmed { kind, reading });
                self.spawn_refresh(RefreshPlan::AfterConfirm(kind));
            }
            ObservationOutcome::Expired { attempts } => {
                tracing::warn!(kind = kind.as_str(), attempts, "observation expired");
                self.publish(EngineEvent::OperationExpired { kind, attempts });
            }
        }
    }

    // Reads

    fn handle_refresh(&mut self, reply: oneshot::Sender<Result<()>>) {
        if self.session.account().is_none() {
            let _ = reply.send(Err(EngineError::NotConnected));
            return;
        }
        self.spawn_refresh(RefreshPlan::Full);
        let _ = reply.send(Ok(()));
    }

    fn handle_faucet_available(&mut self, reply: oneshot::Sender<Result<bool>>) {
        let Some(account) = self.session.account() else {
            let _ = reply.send(Err(EngineError::NotConnected));
            return;
        };
        let offchain = Arc::clone(&self.offchain);
        tokio::spawn(async move {
            let available = offchain.already_claimed(account).await.map(|used| !used);
            let _ = reply.send(available);
        });
    }

    fn handle_faucet_status(&mut self, reply: oneshot::Sender<Result<FaucetStatus>>) {
        let offchain = Arc::clone(&self.offchain);
        tokio::spawn(async move {
            let _ = reply.send(offchain.faucet_status().await);
        });
    }

    // Helpers

    fn ticket_current(&self, kind: OperationKind, ticket: u64) -> bool {
        matches!(self.pending.get(&kind), Some(entry) if entry.ticket == ticket)
    }

    fn publish(&self, event: EngineEvent) {
        // Send fails only without subscribers; events are fire and forget.
        let _ = self.events.send(event);
    }

    fn spawn_refresh(&self, plan: RefreshPlan) {
        let Some(account) = self.session.account() else {
            tracing::debug!("refresh without an account skipped");
            return;
        };
        tokio::spawn(refresh::run(RefreshContext {
            ledger: Arc::clone(&self.ledger),
            plan,
            account,
            epoch: self.session.epoch(),
            commands: self.command_tx.clone(),
        }));
    }

    fn spawn_resume(&self, saved: PersistedSession) {
        let bridge = Arc::clone(&self.bridge);
        let bridge_tx = self.bridge_tx.clone();
        let commands = self.command_tx.clone();
        tokio::spawn(async move {
            let result = bridge.resume(&saved, bridge_tx).await;
            let _ = commands.send(EngineCommand::ResumeFinished { result }).await;
        });
    }

    fn spawn_close(&self) {
        let bridge = Arc::clone(&self.bridge);
        tokio::spawn(async move {
            if let Err(error) = bridge.close().await {
                tracing::debug!(%error, "bridge close failed");
            }
        });
    }

    fn start_restore(&mut self) {
        match self.store.load() {
            Ok(Some(saved)) => {
                tracing::info!(account = %saved.account, "restoring persisted session");
                self.restoring = true;
                self.session.begin_restore(saved.account, saved.chain);
                self.persisted = Some(saved.clone());
                self.spawn_resume(saved);
            }
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(%error, "persisted session unreadable; clearing");
                if let Err(error) = self.store.clear() {
                    tracing::warn!(%error, "session blob not cleared");
                }
            }
        }
    }

    /// Drop every in-flight operation. Callers see `NotConnected`; the
    /// stream reports a cancellation per kind. Cancellation is not a
    /// failure, so no `OperationFailed` is published.
    fn cancel_all(&mut self, cause: &str) {
        if self.pending.is_empty() {
            self.sending = None;
            return;
        }
        tracing::info!(cause, count = self.pending.len(), "cancelling in-flight operations");
        for (kind, entry) in self.pending.drain() {
            match entry.phase {
                PendingPhase::Dispatching { reply, task } => {
                    task.abort();
                    let _ = reply.send(Err(EngineError::NotConnected));
                }
                PendingPhase::Observing { task } => task.abort(),
            }
            let _ = self.events.send(EngineEvent::OperationCancelled { kind });
        }
        self.sending = None;
    }

    fn update_persisted(&mut self) {
        let Some(saved) = self.persisted.as_mut() else {
            return;
        };
        if let Some(account) = self.session.account() {
            saved.account = account;
        }
        if let Some(chain) = self.session.chain() {
            saved.chain = chain;
        }
        if let Err(error) = self.store.save(saved) {
            tracing::warn!(%error, "session update not persisted");
        }
    }

    fn clear_persisted(&mut self) {
        self.persisted = None;
        if let Err(error) = self.store.clear() {
            tracing::warn!(%error, "session blob not cleared");
        }
    }

    async fn shutdown(mut self) {
        tracing::info!("engine shutting down");
        for (_, entry) in self.pending.drain() {
            match entry.phase {
                PendingPhase::Dispatching { task, .. } => task.abort(),
                PendingPhase::Observing { task } => task.abort(),
            }
        }
        if let Some(attempt) = self.connect.take() {
            attempt.task.abort();
        }
        if let Err(error) = self.bridge.close().await {
            tracing::debug!(%error, "bridge close failed");
        }
    }
}

/// Cloneable front door to a running engine.
///
/// Requests travel over the command queue and resolve when the actor
/// answers; the event stream is a broadcast any number of consumers can
/// subscribe to. Every method reports a stopped engine as a connection
/// error.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    events: broadcast::Sender<EngineEvent>,
}

impl EngineHandle {
    /// Subscribe to the event stream. A subscriber that falls behind the
    /// channel capacity observes a lag error, not engine backpressure.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Start a session hand-off. Resolves once the connect link is
    /// published (or the attempt fails); approval arrives as a
    /// [`EngineEvent::SessionEstablished`] event.
    ///
    /// `wallet` picks a known wallet for the deep-link launch; `None`
    /// publishes the raw URI only, for QR-style flows.
    pub async fn connect(&self, wallet: Option<&str>) -> Result<()> {
        let wallet = wallet.map(str::to_string);
        self.request(|reply| EngineCommand::Connect { wallet, reply })
            .await?
    }

    /// End the session, clear the persisted blob, and close the bridge.
    /// Succeeds when already disconnected.
    pub async fn disconnect(&self) -> Result<()> {
        self.request(|reply| EngineCommand::Disconnect { reply })
            .await?
    }

    /// Submit a write operation. Resolves with the signer acknowledgement
    /// hash; confirmation is reported later through the event stream.
    pub async fn submit(&self, request: OperationRequest) -> Result<TxHash> {
        self.request(|reply| EngineCommand::Submit { request, reply })
            .await?
    }

    /// Rebuild every snapshot for the connected account.
    pub async fn refresh(&self) -> Result<()> {
        self.request(|reply| EngineCommand::Refresh { reply }).await?
    }

    /// Whether the connected account can still claim the faucet grant.
    pub async fn faucet_available(&self) -> Result<bool> {
        self.request(|reply| EngineCommand::FaucetAvailable { reply })
            .await?
    }

    /// Faucet liveness and grant accounting.
    pub async fn faucet_status(&self) -> Result<FaucetStatus> {
        self.request(|reply| EngineCommand::FaucetStatus { reply })
            .await?
    }

    /// Current session state.
    pub async fn session(&self) -> Result<SessionSnapshot> {
        self.request(|reply| EngineCommand::SessionInfo { reply })
            .await
    }

    /// Report that the host's suspension window for `purpose` ran out.
    pub async fn suspension_expired(&self, purpose: GuardPurpose) -> Result<()> {
        self.commands
            .send(EngineCommand::GuardExpired { purpose })
            .await
            .map_err(|_| EngineError::connection("engine stopped"))
    }

    /// Stop the actor. Idempotent; a stopped engine swallows the request.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(EngineCommand::Shutdown).await;
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| EngineError::connection("engine stopped"))?;
        response
            .await
            .map_err(|_| EngineError::connection("engine stopped"))
    }
}
