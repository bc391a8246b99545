//! Relay bridge to the external signer.
//!
//! The relay is a plain pub/sub hub: both sides subscribe to a topic and
//! publish sealed envelopes at each other. [`RelayBridge`] owns the socket,
//! pairs our requests with the signer's responses by id, and pushes
//! everything unsolicited (approval, session updates, transport loss) into
//! the event channel handed to [`SignerBridge::open`]. The engine never
//! touches the socket; it sees only [`BridgeEvent`]s and the async request
//! methods.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use photomint_core::{
    parse_address, Address, Bytes, ChainId, DisconnectReason, EngineError, Result, TxHash,
    TxRequest, U256,
};

use crate::envelope::{self, Envelope, SessionKey};
use crate::handshake::Handshake;
use crate::store::PersistedSession;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Signer-side facts the bridge reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// The signer approved the session proposal
    SessionApproved {
        /// Account the signer exposed
        account: Address,
        /// Chain the signer is on
        chain: ChainId,
        /// Signer's own topic for follow-up requests
        peer_id: Option<String>,
    },
    /// The signer declined the session proposal
    SessionRejected,
    /// The signer pushed a session update
    SessionUpdated {
        /// False ends the session
        approved: bool,
        /// New account, when the signer switched
        account: Option<Address>,
        /// New chain, when the signer switched
        chain: Option<ChainId>,
    },
    /// The transport dropped without a local close
    Closed {
        /// Why the bridge considers the session gone
        reason: DisconnectReason,
    },
}

/// The hand-off surface the engine drives.
#[async_trait]
pub trait SignerBridge: Send + Sync {
    /// Open the relay, subscribe, and publish a session proposal. Events
    /// for this connection flow into `events` until the bridge closes.
    async fn open(&self, handshake: Handshake, events: mpsc::Sender<BridgeEvent>) -> Result<()>;

    /// Reopen the relay for a previously approved session; no proposal is
    /// published.
    async fn resume(
        &self,
        session: &PersistedSession,
        events: mpsc::Sender<BridgeEvent>,
    ) -> Result<()>;

    /// Ask the signer to approve and broadcast `tx`; resolves with the
    /// acknowledgement hash.
    async fn send_transaction(&self, from: Address, tx: &TxRequest) -> Result<TxHash>;

    /// End the session and drop the transport.
    async fn close(&self) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct RelayFrame {
    topic: String,
    #[serde(rename = "type")]
    kind: String,
    payload: String,
    #[serde(default)]
    silent: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct RpcEnvelope {
    id: u64,
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Clone, Serialize)]
struct PeerMeta {
    name: &'static str,
    description: &'static str,
    url: &'static str,
    icons: [&'static str; 0],
}

const CLIENT_META: PeerMeta = PeerMeta {
    name: "Photomint",
    description: "Photo minting over an external signer",
    url: "https://photomint.app",
    icons: [],
};

#[derive(Debug, Serialize)]
struct SessionRequestParams {
    #[serde(rename = "peerId")]
    peer_id: String,
    #[serde(rename = "peerMeta")]
    peer_meta: PeerMeta,
    #[serde(rename = "chainId")]
    chain_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SessionParams {
    approved: bool,
    #[serde(rename = "chainId")]
    chain_id: Option<u64>,
    #[serde(default)]
    accounts: Option<Vec<String>>,
    #[serde(rename = "peerId")]
    peer_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct TxParams {
    from: Address,
    to: Address,
    data: Bytes,
    value: U256,
}

struct Live {
    key: SessionKey,
    client_id: String,
    peer_topic: Mutex<String>,
    writer: mpsc::Sender<Message>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>,
    next_id: AtomicU64,
    session_request_id: AtomicU64,
    closing: AtomicBool,
}

/// Production bridge over a websocket relay.
pub struct RelayBridge {
    live: Mutex<Option<Arc<Live>>>,
}

impl RelayBridge {
    /// A bridge with no open transport.
    pub fn new() -> Self {
        Self {
            live: Mutex::new(None),
        }
    }

    fn current(&self) -> Result<Arc<Live>> {
        self.live.lock().clone().ok_or(EngineError::NotConnected)
    }

    async fn connect_transport(
        &self,
        url: &str,
        key: SessionKey,
        client_id: String,
        peer_topic: String,
        events: mpsc::Sender<BridgeEvent>,
    ) -> Result<Arc<Live>> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| EngineError::connection(format!("relay connect failed: {e}")))?;
        tracing::info!(url, "relay transport open");

        let (sink, source) = stream.split();
        let (writer, writer_rx) = mpsc::channel::<Message>(32);

        let live = Arc::new(Live {
            key,
            client_id,
            peer_topic: Mutex::new(peer_topic),
            writer,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            session_request_id: AtomicU64::new(0),
            closing: AtomicBool::new(false),
        });

        tokio::spawn(write_loop(writer_rx, sink));
        tokio::spawn(read_loop(source, Arc::clone(&live), events));

        *self.live.lock() = Some(Arc::clone(&live));

        subscribe(&live, &live.client_id).await?;
        Ok(live)
    }
}

impl Default for RelayBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignerBridge for RelayBridge {
    async fn open(&self, handshake: Handshake, events: mpsc::Sender<BridgeEvent>) -> Result<()> {
        let live = self
            .connect_transport(
                &handshake.bridge_url,
                handshake.key,
                handshake.client_id.clone(),
                handshake.topic.clone(),
                events,
            )
            .await?;

        let id = live.next_id.fetch_add(1, Ordering::Relaxed);
        live.session_request_id.store(id, Ordering::Relaxed);
        let request = RpcEnvelope {
            id,
            jsonrpc: "2.0".to_string(),
            method: Some("wc_sessionRequest".to_string()),
            params: Some(
                serde_json::to_value([SessionRequestParams {
                    peer_id: handshake.client_id,
                    peer_meta: CLIENT_META,
                    chain_id: None,
                }])
                .map_err(|e| EngineError::connection(format!("proposal encode: {e}")))?,
            ),
            result: None,
            error: None,
        };
        publish(&live, &handshake.topic, &request).await?;
        tracing::debug!(topic = %handshake.topic, "session proposal published");
        Ok(())
    }

    async fn resume(
        &self,
        session: &PersistedSession,
        events: mpsc::Sender<BridgeEvent>,
    ) -> Result<()> {
        self.connect_transport(
            &session.handshake.bridge_url,
            session.handshake.key,
            session.handshake.client_id.clone(),
            session.peer_id.clone(),
            events,
        )
        .await?;
        tracing::debug!(peer = %session.peer_id, "resumed relay subscription");
        Ok(())
    }

    async fn send_transaction(&self, from: Address, tx: &TxRequest) -> Result<TxHash> {
        let live = self.current()?;
        let id = live.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcEnvelope {
            id,
            jsonrpc: "2.0".to_string(),
            method: Some("eth_sendTransaction".to_string()),
            params: Some(
                serde_json::to_value([TxParams {
                    from,
                    to: tx.to,
                    data: tx.data.clone(),
                    value: tx.value,
                }])
                .map_err(|e| EngineError::connection(format!("transaction encode: {e}")))?,
            ),
            result: None,
            error: None,
        };

        let (reply, response) = oneshot::channel();
        live.pending.lock().insert(id, reply);

        let topic = live.peer_topic.lock().clone();
        if let Err(e) = publish(&live, &topic, &request).await {
            live.pending.lock().remove(&id);
            return Err(e);
        }

        let value = response
            .await
            .map_err(|_| EngineError::connection("bridge closed before acknowledgement"))??;
        parse_tx_hash(&value)
    }

    async fn close(&self) -> Result<()> {
        let Some(live) = self.live.lock().take() else {
            return Ok(());
        };
        live.closing.store(true, Ordering::Relaxed);

        // Best effort: tell the signer the session is over.
        let id = live.next_id.fetch_add(1, Ordering::Relaxed);
        let farewell = RpcEnvelope {
            id,
            jsonrpc: "2.0".to_string(),
            method: Some("wc_sessionUpdate".to_string()),
            params: Some(serde_json::json!([{
                "approved": false,
                "chainId": Value::Null,
                "accounts": Value::Null,
            }])),
            result: None,
            error: None,
        };
        let topic = live.peer_topic.lock().clone();
        if let Err(e) = publish(&live, &topic, &farewell).await {
            tracing::debug!(error = %e, "session farewell not delivered");
        }
        let _ = live.writer.send(Message::Close(None)).await;

        fail_pending(&live, "session closed locally");
        Ok(())
    }
}

async fn write_loop(mut rx: mpsc::Receiver<Message>, mut sink: WsSink) {
    while let Some(message) = rx.recv().await {
        if let Err(e) = sink.send(message).await {
            tracing::warn!(error = %e, "relay write failed");
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(mut source: WsSource, live: Arc<Live>, events: mpsc::Sender<BridgeEvent>) {
    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if let Err(e) = handle_frame(&live, &events, &text).await {
                    tracing::debug!(error = %e, "relay frame dropped");
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = live.writer.send(Message::Pong(payload)).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "relay read failed");
                break;
            }
        }
    }

    fail_pending(&live, "bridge closed");
    if !live.closing.load(Ordering::Relaxed) {
        tracing::warn!("relay transport dropped");
        let _ = events
            .send(BridgeEvent::Closed {
                reason: DisconnectReason::BridgeClosed,
            })
            .await;
    }
}

async fn handle_frame(
    live: &Arc<Live>,
    events: &mpsc::Sender<BridgeEvent>,
    text: &str,
) -> Result<()> {
    let frame: RelayFrame = serde_json::from_str(text)
        .map_err(|e| EngineError::connection(format!("relay frame malformed: {e}")))?;
    if frame.kind == "ack" {
        return Ok(());
    }
    if frame.topic != live.client_id {
        tracing::debug!(topic = %frame.topic, "frame for foreign topic ignored");
        return Ok(());
    }

    let sealed: Envelope = serde_json::from_str(&frame.payload)
        .map_err(|e| EngineError::connection(format!("envelope malformed: {e}")))?;
    let plain = envelope::open(&live.key, &sealed)?;
    let rpc: RpcEnvelope = serde_json::from_slice(&plain)
        .map_err(|e| EngineError::connection(format!("payload malformed: {e}")))?;

    // The proposal response establishes the session.
    if rpc.id == live.session_request_id.load(Ordering::Relaxed) && rpc.method.is_none() {
        live.session_request_id.store(0, Ordering::Relaxed);
        let event = match approval_event(&rpc) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "session approval malformed");
                BridgeEvent::SessionRejected
            }
        };
        if let BridgeEvent::SessionApproved {
            peer_id: Some(peer),
            ..
        } = &event
        {
            *live.peer_topic.lock() = peer.clone();
        }
        let _ = events.send(event).await;
        return Ok(());
    }

    match rpc.method.as_deref() {
        Some("wc_sessionUpdate") => {
            let event = session_update_event(&rpc)?;
            let _ = events.send(event).await;
        }
        Some(other) => {
            tracing::debug!(method = other, "unhandled signer request");
        }
        None => {
            let waiter = live.pending.lock().remove(&rpc.id);
            match waiter {
                Some(reply) => {
                    let _ = reply.send(response_value(rpc));
                }
                None => tracing::debug!(id = rpc.id, "response without a waiter"),
            }
        }
    }
    Ok(())
}

async fn subscribe(live: &Arc<Live>, topic: &str) -> Result<()> {
    send_frame(live, topic, "sub", String::new(), true).await
}

async fn publish(live: &Arc<Live>, topic: &str, rpc: &RpcEnvelope) -> Result<()> {
    let plain = serde_json::to_vec(rpc)
        .map_err(|e| EngineError::connection(format!("payload encode: {e}")))?;
    let sealed = envelope::seal(&live.key, &plain)?;
    let payload = serde_json::to_string(&sealed)
        .map_err(|e| EngineError::connection(format!("envelope encode: {e}")))?;
    send_frame(live, topic, "pub", payload, false).await
}

async fn send_frame(
    live: &Arc<Live>,
    topic: &str,
    kind: &str,
    payload: String,
    silent: bool,
) -> Result<()> {
    let frame = RelayFrame {
        topic: topic.to_string(),
        kind: kind.to_string(),
        payload,
        silent,
    };
    let text = serde_json::to_string(&frame)
        .map_err(|e| EngineError::connection(format!("frame encode: {e}")))?;
    live.writer
        .send(Message::Text(text))
        .await
        .map_err(|_| EngineError::connection("bridge writer closed"))
}

fn fail_pending(live: &Live, reason: &str) {
    let waiters = std::mem::take(&mut *live.pending.lock());
    for (_, reply) in waiters {
        let _ = reply.send(Err(EngineError::connection(reason)));
    }
}

fn response_value(rpc: RpcEnvelope) -> Result<Value> {
    if let Some(error) = rpc.error {
        return Err(map_signer_error(&error));
    }
    rpc.result
        .ok_or_else(|| EngineError::connection("response carried no result"))
}

/// A declined request is a rejection; anything else is a transport-level
/// failure.
fn map_signer_error(error: &RpcErrorBody) -> EngineError {
    if error.message.to_lowercase().contains("reject") {
        EngineError::SignerRejected
    } else {
        EngineError::connection(format!("signer error {}: {}", error.code, error.message))
    }
}

fn approval_event(rpc: &RpcEnvelope) -> Result<BridgeEvent> {
    if let Some(error) = &rpc.error {
        return match map_signer_error(error) {
            EngineError::SignerRejected => Ok(BridgeEvent::SessionRejected),
            other => Err(other),
        };
    }
    let result = rpc
        .result
        .as_ref()
        .ok_or_else(|| EngineError::connection("approval carried no result"))?;
    let params: SessionParams = serde_json::from_value(result.clone())
        .map_err(|e| EngineError::connection(format!("approval malformed: {e}")))?;
    if !params.approved {
        return Ok(BridgeEvent::SessionRejected);
    }
    let account = first_account(&params)?
        .ok_or_else(|| EngineError::connection("approval carried no account"))?;
    let chain = params
        .chain_id
        .map(ChainId)
        .ok_or_else(|| EngineError::connection("approval carried no chain id"))?;
    Ok(BridgeEvent::SessionApproved {
        account,
        chain,
        peer_id: params.peer_id,
    })
}

fn session_update_event(rpc: &RpcEnvelope) -> Result<BridgeEvent> {
    let params = rpc
        .params
        .as_ref()
        .and_then(|p| p.get(0))
        .ok_or_else(|| EngineError::connection("session update carried no params"))?;
    let params: SessionParams = serde_json::from_value(params.clone())
        .map_err(|e| EngineError::connection(format!("session update malformed: {e}")))?;
    Ok(BridgeEvent::SessionUpdated {
        approved: params.approved,
        account: first_account(&params)?,
        chain: params.chain_id.map(ChainId),
    })
}

fn first_account(params: &SessionParams) -> Result<Option<Address>> {
    match params.accounts.as_deref() {
        Some([first, ..]) => parse_address(first).map(Some),
        _ => Ok(None),
    }
}

fn parse_tx_hash(value: &Value) -> Result<TxHash> {
    let text = value
        .as_str()
        .ok_or_else(|| EngineError::connection("acknowledgement is not a string"))?;
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| EngineError::connection("acknowledgement lacks 0x prefix"))?;
    let bytes = hex::decode(digits)
        .map_err(|_| EngineError::connection("acknowledgement is not hex"))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| EngineError::connection("acknowledgement hash must be 32 bytes"))?;
    Ok(TxHash::from(bytes))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn rejection_message_maps_to_signer_rejected() {
        let rejected = RpcErrorBody {
            code: -32000,
            message: "User rejected the request".to_string(),
        };
        assert_matches!(map_signer_error(&rejected), EngineError::SignerRejected);

        let transport = RpcErrorBody {
            code: -32000,
            message: "session disconnected".to_string(),
        };
        assert_matches!(map_signer_error(&transport), EngineError::Connection { .. });
    }

    #[test]
    fn approval_result_yields_account_and_chain() {
        let rpc = RpcEnvelope {
            id: 1,
            jsonrpc: "2.0".to_string(),
            method: None,
            params: None,
            result: Some(json!({
                "approved": true,
                "chainId": 137,
                "accounts": ["0xe760Cf4Ef449139541d2674aCAAE22f906775baC"],
                "peerId": "wallet-peer",
            })),
            error: None,
        };
        assert_matches!(
            approval_event(&rpc).unwrap(),
            BridgeEvent::SessionApproved { account, chain, peer_id }
                if chain == ChainId::POLYGON
                    && peer_id.as_deref() == Some("wallet-peer")
                    && account == parse_address("0xe760Cf4Ef449139541d2674aCAAE22f906775baC").unwrap()
        );
    }

    #[test]
    fn unapproved_result_is_a_rejection() {
        let rpc = RpcEnvelope {
            id: 1,
            jsonrpc: "2.0".to_string(),
            method: None,
            params: None,
            result: Some(json!({"approved": false})),
            error: None,
        };
        assert_matches!(approval_event(&rpc).unwrap(), BridgeEvent::SessionRejected);
    }

    #[test]
    fn session_update_reports_chain_switch() {
        let rpc = RpcEnvelope {
            id: 7,
            jsonrpc: "2.0".to_string(),
            method: Some("wc_sessionUpdate".to_string()),
            params: Some(json!([{
                "approved": true,
                "chainId": 80001,
                "accounts": null,
            }])),
            result: None,
            error: None,
        };
        assert_matches!(
            session_update_event(&rpc).unwrap(),
            BridgeEvent::SessionUpdated { approved: true, account: None, chain: Some(chain) }
                if chain == ChainId::POLYGON_TESTNET
        );
    }

    #[test]
    fn acknowledgement_hash_parses_to_32_bytes() {
        let hash = format!("0x{}", hex::encode([0xabu8; 32]));
        assert_eq!(
            parse_tx_hash(&json!(hash)).unwrap(),
            TxHash::from([0xabu8; 32])
        );
        assert_matches!(
            parse_tx_hash(&json!("0x1234")),
            Err(EngineError::Connection { .. })
        );
        assert_matches!(parse_tx_hash(&json!(42)), Err(EngineError::Connection { .. }));
    }

    #[test]
    fn relay_frames_round_trip_with_type_field() {
        let frame = RelayFrame {
            topic: "t".to_string(),
            kind: "pub".to_string(),
            payload: "p".to_string(),
            silent: false,
        };
        let text = serde_json::to_string(&frame).unwrap();
        assert!(text.contains("\"type\":\"pub\""));
        let back: RelayFrame = serde_json::from_str(&text).unwrap();
        assert_eq!(back.topic, "t");

        // Frames without the silent flag still decode.
        let bare: RelayFrame =
            serde_json::from_str("{\"topic\":\"x\",\"type\":\"ack\",\"payload\":\"\"}").unwrap();
        assert!(!bare.silent);
    }

    #[test]
    fn transaction_params_serialize_for_the_wire() {
        let params = TxParams {
            from: Address::repeat_byte(0x11),
            to: Address::repeat_byte(0x22),
            data: Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb]),
            value: U256::ZERO,
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["value"], json!("0x0"));
        assert_eq!(value["data"], json!("0xa9059cbb"));
        assert!(value["from"].as_str().unwrap().starts_with("0x"));
    }
}
