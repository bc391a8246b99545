//! Node transport and ledger reads for the Photomint engine.
//!
//! This crate owns everything that talks to a ledger node:
//!
//! - [`NodeRpc`]: the minimal JSON-RPC surface the engine needs
//!   (`eth_call`, balance, chain id), with [`HttpRpc`] as the production
//!   implementation.
//! - [`LedgerReads`]: the typed read surface over the deployed contracts.
//!   Each method encodes one call, decodes the return data against a fixed
//!   schema and maps malformed data to a structured parse failure instead
//!   of a panic.
//! - [`calls`]: builders for the unsigned transaction requests the signer
//!   is asked to approve.
//!
//! Reads that page through remote collections terminate on the reported
//! total (or a short page where the contract reports none), so a single
//! refresh issues a bounded number of calls.

#![forbid(unsafe_code)]

pub mod calls;
mod http;
mod reader;
mod rpc;

pub use http::HttpRpc;
pub use reader::{LedgerReader, LedgerReads, PublicTokensPage, DEFAULT_PAGE_SIZE};
pub use rpc::NodeRpc;
