//! Minimal JSON-RPC surface over a ledger node.

use async_trait::async_trait;
use photomint_core::{Address, ChainId, Result, U256};

/// Read-only node operations the engine depends on.
///
/// Implementations must be shareable across tasks; the engine holds one
/// behind an `Arc` and issues reads from observer tasks concurrently.
#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// Executes `eth_call` against the latest block and returns the raw
    /// return data.
    ///
    /// `from` is set for contract views that scope their result to the
    /// caller account.
    async fn call(&self, from: Option<Address>, to: Address, data: Vec<u8>) -> Result<Vec<u8>>;

    /// Native coin balance of `account` at the latest block.
    async fn balance(&self, account: Address) -> Result<U256>;

    /// Chain id the node reports via `eth_chainId`.
    async fn chain_id(&self) -> Result<ChainId>;
}
