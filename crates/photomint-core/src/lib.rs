//! Photomint Core - Shared Domain Model
//!
//! Foundation types for the write-then-confirm synchronization engine:
//! ledger value types, domain records, the unified error taxonomy, the
//! engine event stream payloads, and configuration.
//!
//! This crate is pure data: no I/O, no runtime. Every other photomint crate
//! depends on it and nothing here depends on them.

#![forbid(unsafe_code)]

/// Unified error taxonomy and `Result` alias
pub mod error;

/// Chain ids, operation kinds, epochs, and ledger value types
pub mod types;

/// Decoded ledger records and immutable snapshots
pub mod records;

/// Engine event stream payloads
pub mod events;

/// Engine, chain-profile, and observer configuration
pub mod config;

pub use config::{ChainProfile, EngineConfig, ObserverConfig, OffchainConfig, RelayConfig};
pub use error::{EngineError, Result, StructParseError};
pub use events::{DisconnectReason, EngineEvent};
pub use records::{
    CollectionPayload, PrivateCollectionRecord, PrivateGallery, PublicCollectionRecord,
    PublicGallery, TokenPayload, TokenRecord, TokenSource,
};
pub use types::{
    parse_address, Address, Bytes, ChainId, OperationKind, SessionEpoch, TxHash, TxRequest, B256,
    U256,
};
