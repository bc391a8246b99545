//! Signer session management for the Photomint engine.
//!
//! The external signer holds every private key; this crate owns the
//! hand-off to it and nothing else:
//!
//! - [`SignerSession`]: the session state machine, from handshake through
//!   approval, updates, account switches and teardown. Pure state; all I/O
//!   lives behind [`SignerBridge`].
//! - [`Handshake`] and [`envelope`]: connect-URI generation and the sealed
//!   frames that cross the relay.
//! - [`RelayBridge`]: the production bridge over a websocket relay, pairing
//!   requests with responses and pushing unsolicited session updates into
//!   an event channel.
//! - [`SessionStore`]: persistence so an approved session survives process
//!   restarts without a second wallet round-trip.
//! - [`suspension`]: keep-alive guards for the window where the host may
//!   suspend us while the signer app is in the foreground.

#![forbid(unsafe_code)]

pub mod bridge;
pub mod deeplink;
pub mod envelope;
mod handshake;
mod session;
pub mod store;
pub mod suspension;

pub use bridge::{BridgeEvent, RelayBridge, SignerBridge};
pub use deeplink::{known_wallets, WalletDescriptor, WalletLauncher};
pub use envelope::SessionKey;
pub use handshake::Handshake;
pub use session::{SessionState, SessionUpdate, SignerSession};
pub use store::{FileSessionStore, NullSessionStore, PersistedSession, SessionStore};
pub use suspension::{GuardPurpose, GuardRegistry, HostSuspension, NullSuspension, SuspensionGuard};
