//! Engine event stream payloads
//!
//! The engine publishes these on a broadcast channel; any number of
//! consumers subscribe. Events are facts about transitions that already
//! happened, so consumers can render them directly or fold them into their
//! own state. Snapshots travel as `Arc` so a broadcast clone stays cheap.

use std::sync::Arc;

use crate::error::EngineError;
use crate::records::{PrivateGallery, PublicGallery};
use crate::types::{Address, ChainId, OperationKind, TxHash, U256};

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The local side requested the disconnect
    Requested,
    /// The signer or relay ended the session
    PeerEnded,
    /// The bridge transport dropped and could not be resumed
    BridgeClosed,
    /// A persisted session failed to restore at startup
    RestoreFailed,
}

/// Everything the engine reports to its consumers
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Relay subscription is live; hand the connect URI to a wallet
    ConnectLinkReady {
        /// Raw connect URI for the handshake
        connect_uri: String,
        /// Wallet-specific launch link, when a wallet was chosen
        wallet_link: Option<String>,
    },
    /// Signer approved the session
    SessionEstablished {
        /// Connected account
        account: Address,
        /// Chain the session is on
        chain: ChainId,
        /// True when `chain` differs from the required chain
        wrong_chain: bool,
    },
    /// A persisted session was restored without a new hand-off
    SessionRestored {
        /// Connected account
        account: Address,
        /// Chain the session is on
        chain: ChainId,
        /// True when `chain` differs from the required chain
        wrong_chain: bool,
    },
    /// Session changed chain without changing account
    SessionUpdated {
        /// Connected account
        account: Address,
        /// Chain the session is now on
        chain: ChainId,
        /// True when `chain` differs from the required chain
        wrong_chain: bool,
    },
    /// Session switched to a different account; all dependents were
    /// invalidated before this event was published
    AccountChanged {
        /// Account before the switch
        previous: Address,
        /// Account after the switch
        current: Address,
    },
    /// Session ended
    Disconnected {
        /// Why it ended
        reason: DisconnectReason,
    },

    /// Signer acknowledged a submitted operation
    OperationSubmitted {
        /// Operation kind
        kind: OperationKind,
        /// Hash from the signer acknowledgement
        tx_hash: TxHash,
    },
    /// Deterministic address computed for a purchase about to be submitted
    CollectionPredicted {
        /// Address the new collection will deploy at
        address: Address,
    },
    /// Confirmation predicate held; fired exactly once per observation
    OperationConfirmed {
        /// Operation kind
        kind: OperationKind,
        /// Metric reading that satisfied the predicate
        reading: U256,
    },
    /// Observation cancelled by session change or explicit stop; not a failure
    OperationCancelled {
        /// Operation kind
        kind: OperationKind,
    },
    /// Observation exhausted its attempt bound without confirming
    OperationExpired {
        /// Operation kind
        kind: OperationKind,
        /// Attempts consumed
        attempts: u32,
    },
    /// Dispatch failed after validation (signer declined, bridge error,
    /// suspension expiry)
    OperationFailed {
        /// Operation kind
        kind: OperationKind,
        /// Terminal error
        error: EngineError,
    },

    /// New public-token snapshot
    PublicGalleryUpdated {
        /// Merged multi-version view
        gallery: Arc<PublicGallery>,
    },
    /// New private-collection snapshot
    PrivateGalleryUpdated {
        /// Collections with their tokens
        gallery: Arc<PrivateGallery>,
    },
    /// Native balance read completed
    BalanceUpdated {
        /// Balance in wei
        balance: U256,
    },
    /// Utility-token balance read completed
    TokenBalanceUpdated {
        /// Balance in token units
        balance: U256,
    },
    /// Allowance toward the access-token contract read completed
    AllowanceUpdated {
        /// Current allowance
        allowance: U256,
    },
    /// Collection price read completed
    PriceUpdated {
        /// Price in utility-token units
        price: U256,
    },

    /// Off-chain faucet granted native currency; balance observation starts
    FaucetGranted {
        /// Grant transaction id reported by the service
        tx_id: String,
    },
}
