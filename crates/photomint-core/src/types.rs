//! Chain ids, operation kinds, session epochs, and ledger value types
//!
//! Amounts, balances, token ids, and counters on the ledger are 256-bit
//! unsigned integers; accounts and contracts are 20-byte addresses. Both come
//! from `alloy_primitives` and are re-exported here so the rest of the
//! workspace shares one set of value types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, Result};

pub use alloy_primitives::{Address, Bytes, B256, U256};

/// Transaction hash returned by the signer acknowledgement
pub type TxHash = B256;

/// Expected length of a `0x`-prefixed hex address string
pub const ADDRESS_STR_LEN: usize = 42;

/// Numeric chain identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    /// Polygon mainnet
    pub const POLYGON: ChainId = ChainId(137);
    /// Polygon testnet
    pub const POLYGON_TESTNET: ChainId = ChainId(80001);
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        ChainId(id)
    }
}

/// Monotonic counter identifying one continuous (account, chain) tenure.
///
/// Bumped on every connect, disconnect, and account or chain change. Work
/// spawned under one epoch is stale under any later epoch; the owner drops
/// stale results by comparing stamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionEpoch(pub u64);

impl SessionEpoch {
    /// The epoch following this one
    pub fn next(self) -> SessionEpoch {
        SessionEpoch(self.0 + 1)
    }
}

impl fmt::Display for SessionEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch {}", self.0)
    }
}

/// The write operations the engine can dispatch and confirm.
///
/// At most one operation per kind is in flight at any time; the kind also
/// selects the poll metric and confirmation predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Mint into a public collection through the router
    PublicMint,
    /// Mint into the caller's own private collection
    PrivateMint,
    /// Grant the access-token contract an allowance on the utility token
    Approve,
    /// Purchase a private collection through the access token
    PurchaseCollection,
    /// Off-chain faucet grant of native currency
    FaucetClaim,
}

impl OperationKind {
    /// All kinds, in dispatch-table order
    pub const ALL: [OperationKind; 5] = [
        OperationKind::PublicMint,
        OperationKind::PrivateMint,
        OperationKind::Approve,
        OperationKind::PurchaseCollection,
        OperationKind::FaucetClaim,
    ];

    /// Stable lowercase name used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::PublicMint => "public_mint",
            OperationKind::PrivateMint => "private_mint",
            OperationKind::Approve => "approve",
            OperationKind::PurchaseCollection => "purchase_collection",
            OperationKind::FaucetClaim => "faucet_claim",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An encoded contract call ready for the signer.
///
/// `from` is supplied by the session at send time; `value` is always zero
/// here since every engine operation is fee-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRequest {
    /// Target contract
    pub to: Address,
    /// ABI-encoded calldata
    pub data: Bytes,
    /// Native value attached to the call
    pub value: U256,
}

impl TxRequest {
    /// A zero-value call to `to` with `data`
    pub fn call(to: Address, data: Bytes) -> Self {
        Self {
            to,
            data,
            value: U256::ZERO,
        }
    }
}

/// Parse an address string, normalizing case.
///
/// Accepts only the canonical `0x`-prefixed 40-hex-digit form. Comparison of
/// parsed addresses is on the raw bytes, so mixed-case inputs referring to
/// the same account compare equal.
pub fn parse_address(input: &str) -> Result<Address> {
    if input.len() != ADDRESS_STR_LEN || !input.starts_with("0x") {
        return Err(EngineError::invalid_address(input));
    }
    Address::from_str(input).map_err(|_| EngineError::invalid_address(input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn address_parsing_normalizes_case() {
        let lower = parse_address("0xe760cf4ef449139541d2674acaae22f906775bac").unwrap();
        let mixed = parse_address("0xe760Cf4Ef449139541d2674aCAAE22f906775baC").unwrap();
        assert_eq!(lower, mixed);
    }

    #[test]
    fn address_parsing_rejects_malformed_input() {
        assert_matches!(
            parse_address("e760Cf4Ef449139541d2674aCAAE22f906775baC"),
            Err(EngineError::InvalidAddress { .. })
        );
        assert_matches!(parse_address("0x1234"), Err(EngineError::InvalidAddress { .. }));
        assert_matches!(
            parse_address("0xZZ60cf4ef449139541d2674acaae22f906775bac"),
            Err(EngineError::InvalidAddress { .. })
        );
    }

    #[test]
    fn epochs_advance_monotonically() {
        let e0 = SessionEpoch::default();
        let e1 = e0.next();
        assert!(e1 > e0);
        assert_eq!(e1.next().0, 2);
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(OperationKind::PublicMint.to_string(), "public_mint");
        assert_eq!(OperationKind::ALL.len(), 5);
    }
}
