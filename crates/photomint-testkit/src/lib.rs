//! Scripted transports and fixtures for photomint tests.
//!
//! Everything the engine talks to has a scripted stand-in here: ledger
//! reads, the signer bridge, the off-chain service, and the host
//! services (suspension, wallet launch, session store). The scripted
//! implementations share a [`CallLog`] so a test can assert ordering
//! across transports, e.g. that the confirmation baseline was read
//! before the transaction left for the signer.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

pub mod bridge;
pub mod harness;
pub mod host;
pub mod ledger;
pub mod offchain;

pub use bridge::{ScriptedBridge, SendScript};
pub use harness::EngineHarness;
pub use host::{MemorySessionStore, RecordingHost, RecordingLauncher};
pub use ledger::ScriptedLedger;
pub use offchain::ScriptedOffchain;

/// Install a test-writer tracing subscriber once per process.
pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_init(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Ordered record of calls across the scripted transports.
///
/// Clones share one underlying log.
#[derive(Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Snapshot of all entries in call order.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// First position of `entry`, if it was recorded.
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries.lock().iter().position(|e| e == entry)
    }

    /// Number of times `entry` was recorded.
    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().iter().filter(|e| *e == entry).count()
    }
}
