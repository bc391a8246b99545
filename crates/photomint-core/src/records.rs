//! Decoded ledger records and immutable snapshots
//!
//! Everything here is a read-only value produced by one decode pass. A new
//! snapshot replaces the previous one atomically; nothing is ever patched in
//! place, so concurrent readers never observe a half-updated view.

use serde::{Deserialize, Serialize};

use crate::types::{Address, U256};

/// JSON document carried in a token's on-ledger `data` field.
///
/// Written at mint time and decoded on every read. A payload that fails
/// to decode rejects the read that returned it; records are never admitted
/// with a placeholder payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    /// Display name chosen at mint time
    pub name: String,
    /// Unix timestamp (seconds) of the mint request
    pub create_date: u64,
    /// Identifier of the uploaded media object backing the token
    pub media_id: String,
}

impl TokenPayload {
    /// Decode a payload from its on-ledger bytes
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Encode the payload into its on-ledger bytes
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// JSON document carried in a private collection's `data` field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionPayload {
    /// Collection display name
    pub name: String,
}

impl CollectionPayload {
    /// Decode a payload from its on-ledger bytes
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Encode the payload into its on-ledger bytes
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// One deployed public collection implementation behind the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicCollectionRecord {
    /// Collection contract address
    pub address: Address,
    /// Implementation version index; merged reads are ordered by this
    pub version: u64,
}

/// One private collection clone owned by the session account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateCollectionRecord {
    /// Access-token id of the collection
    pub id: U256,
    /// Deployed clone address
    pub address: Address,
    /// Decoded collection payload
    pub payload: CollectionPayload,
    /// Declared token count, used to size full-page token reads
    pub token_count: U256,
}

/// Which collection family a token came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenSource {
    /// Public collection, tagged with its implementation version
    Public {
        /// Originating implementation version
        version: u64,
    },
    /// Private collection, tagged with its display name
    Private {
        /// Originating collection name
        collection_name: String,
    },
}

/// One owned token with its decoded payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Token id within its collection
    pub id: U256,
    /// Metadata URI recorded at mint time
    pub meta_uri: String,
    /// Decoded on-ledger payload
    pub payload: TokenPayload,
    /// Collection contract the token lives in
    pub collection: Address,
    /// Originating collection family
    pub source: TokenSource,
}

/// Merged view of the account's public tokens across all router versions.
///
/// Tokens are ordered by implementation version, then by per-version page
/// order, matching the router's own concatenation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicGallery {
    /// Router implementations that contributed tokens
    pub collections: Vec<PublicCollectionRecord>,
    /// Flattened, ordered token list
    pub tokens: Vec<TokenRecord>,
    /// Total declared by the router
    pub total: U256,
}

/// View of the account's private collections and their tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateGallery {
    /// Owned collection clones
    pub collections: Vec<PrivateCollectionRecord>,
    /// Flattened token list, ordered by collection then page order
    pub tokens: Vec<TokenRecord>,
}
