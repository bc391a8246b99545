//! The write-then-confirm synchronization engine.
//!
//! This crate assembles the other photomint crates into one actor:
//!
//! - [`Engine`]: the actor task. It owns the session machine, the table
//!   of in-flight operations, and the persisted-session blob, and it is
//!   the only place any of them mutate.
//! - [`EngineHandle`]: the cloneable front door; commands in, broadcast
//!   events out.
//! - [`OperationRequest`]: the five write operations a caller can
//!   submit. Each is dispatched, acknowledged by the signer (or the
//!   faucet service), then confirmed by polling a per-kind ledger metric
//!   past the baseline captured before the hand-off.
//! - [`OffchainApi`]: the faucet and contracts-config companion service.
//!
//! Everything long-running happens in spawned workers that report back
//! over the engine's own command queue, so results from a superseded
//! session or submission are recognized by ticket and epoch and dropped
//! instead of corrupting newer state.

#![forbid(unsafe_code)]

pub mod dispatch;
pub mod engine;
mod observer;
pub mod offchain;
mod refresh;

pub use dispatch::OperationRequest;
pub use engine::{Engine, EngineDeps, EngineHandle, SessionSnapshot};
pub use offchain::{FaucetStatus, HttpOffchain, OffchainApi, RemoteContracts};
