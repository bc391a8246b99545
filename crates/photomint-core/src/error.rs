//! Unified error taxonomy for the photomint engine
//!
//! One enum covers every failure the engine can surface: validation failures
//! returned synchronously from `submit`, bridge and signer failures, contract
//! read/decode failures, and suspension expiry. Session invalidation (account
//! or chain switch) and observation expiry are deliberately absent: both are
//! reported through the event stream, not as errors.

use serde::{Deserialize, Serialize};

use crate::types::ChainId;

/// Structural violation found while decoding a contract return value.
///
/// Decoding is schema-first: each read declares the tuple arity and field
/// types it expects, and any mismatch produces this error naming the method
/// and the violation. A struct-parse failure aborts only the read that
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("Malformed return data from {method}: {detail}")]
pub struct StructParseError {
    /// Contract method whose return data failed to decode
    pub method: String,
    /// What was violated (arity, offset, field type)
    pub detail: String,
}

impl StructParseError {
    /// Create a struct-parse error for `method`
    pub fn new(method: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            detail: detail.into(),
        }
    }
}

/// Unified error type for all engine operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum EngineError {
    /// Bridge, relay, or node transport failure
    #[error("Connection failed: {message}")]
    Connection {
        /// What failed at the transport level
        message: String,
    },

    /// The external signer declined the request
    #[error("Rejected by signer")]
    SignerRejected,

    /// Session chain does not match the required chain
    #[error("Wrong chain: expected {expected}, connected to {actual}")]
    WrongChain {
        /// Chain the engine is configured for
        expected: ChainId,
        /// Chain the session is actually on
        actual: ChainId,
    },

    /// Operation requires an established session
    #[error("Not connected")]
    NotConnected,

    /// A flow of the same kind is already in flight
    #[error("Already pending: {what}")]
    AlreadyPending {
        /// Operation kind or guard purpose that is already held
        what: String,
    },

    /// Address input failed validation
    #[error("Invalid address: {address}")]
    InvalidAddress {
        /// The offending input
        address: String,
    },

    /// Contract read failed before decoding (transport, node error)
    #[error("Contract read failed: {message}")]
    ReadFailed {
        /// What the node or transport reported
        message: String,
    },

    /// Contract return data did not match the declared schema
    #[error(transparent)]
    StructParse(#[from] StructParseError),

    /// Contract call reverted with a reason
    #[error("Contract call reverted: {reason}")]
    CallReverted {
        /// Revert reason decoded from the error payload, if any
        reason: String,
    },

    /// OS suspension window expired before the hand-off completed
    #[error("Suspension window expired during {purpose}")]
    SuspensionExpired {
        /// Guard purpose that expired
        purpose: String,
    },

    /// Session persistence failed
    #[error("Session store failure: {message}")]
    Store {
        /// What the storage layer reported
        message: String,
    },

    /// Off-chain service returned an error body
    #[error("Off-chain service error {code}: {message}")]
    Offchain {
        /// Service error code
        code: i64,
        /// Service error message
        message: String,
    },

    /// Invalid engine configuration
    #[error("Invalid configuration: {message}")]
    Config {
        /// What is wrong with the configuration
        message: String,
    },
}

impl EngineError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a wrong-chain error
    pub fn wrong_chain(expected: ChainId, actual: ChainId) -> Self {
        Self::WrongChain { expected, actual }
    }

    /// Create an already-pending error
    pub fn already_pending(what: impl Into<String>) -> Self {
        Self::AlreadyPending { what: what.into() }
    }

    /// Create an invalid-address error
    pub fn invalid_address(address: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
        }
    }

    /// Create a contract read error
    pub fn read_failed(message: impl Into<String>) -> Self {
        Self::ReadFailed {
            message: message.into(),
        }
    }

    /// Create a revert error
    pub fn call_reverted(reason: impl Into<String>) -> Self {
        Self::CallReverted {
            reason: reason.into(),
        }
    }

    /// Create a suspension-expiry error
    pub fn suspension_expired(purpose: impl Into<String>) -> Self {
        Self::SuspensionExpired {
            purpose: purpose.into(),
        }
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create an off-chain service error
    pub fn offchain(code: i64, message: impl Into<String>) -> Self {
        Self::Offchain {
            code,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// True for failures of the read path that polling treats as transient
    pub fn is_transient_read(&self) -> bool {
        matches!(
            self,
            Self::ReadFailed { .. } | Self::StructParse(_) | Self::Connection { .. }
        )
    }
}

/// Standard Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::store(err.to_string())
    }
}
