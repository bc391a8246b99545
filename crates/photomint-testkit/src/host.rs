//! Recording host services: suspension windows, wallet launches, and an
//! in-memory session store.

use parking_lot::Mutex;

use photomint_core::{EngineError, Result};
use photomint_signer::{GuardPurpose, HostSuspension, PersistedSession, SessionStore, WalletLauncher};

/// Host that records every suspension window transition.
#[derive(Default)]
pub struct RecordingHost {
    windows: Mutex<Vec<(&'static str, GuardPurpose)>>,
}

impl RecordingHost {
    /// A host with no recorded transitions.
    pub fn new() -> Self {
        Self::default()
    }

    /// `("begin" | "end", purpose)` pairs in call order.
    pub fn windows(&self) -> Vec<(&'static str, GuardPurpose)> {
        self.windows.lock().clone()
    }
}

impl HostSuspension for RecordingHost {
    fn begin(&self, purpose: GuardPurpose) {
        self.windows.lock().push(("begin", purpose));
    }

    fn end(&self, purpose: GuardPurpose) {
        self.windows.lock().push(("end", purpose));
    }
}

/// Launcher that records links instead of opening them.
#[derive(Default)]
pub struct RecordingLauncher {
    launched: Mutex<Vec<String>>,
}

impl RecordingLauncher {
    /// A launcher with no recorded links.
    pub fn new() -> Self {
        Self::default()
    }

    /// Links handed to the host, in call order.
    pub fn launched(&self) -> Vec<String> {
        self.launched.lock().clone()
    }
}

impl WalletLauncher for RecordingLauncher {
    fn launch(&self, link: &str) -> Result<()> {
        self.launched.lock().push(link.to_string());
        Ok(())
    }
}

/// Session store over a mutex, with scriptable failures.
#[derive(Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<PersistedSession>>,
    load_error: Mutex<Option<EngineError>>,
}

impl MemorySessionStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the store, as if a previous run saved a session.
    pub fn seed(&self, session: PersistedSession) {
        *self.session.lock() = Some(session);
    }

    /// Make the next `load` fail.
    pub fn fail_next_load(&self, error: EngineError) {
        *self.load_error.lock() = Some(error);
    }

    /// The currently stored session.
    pub fn stored(&self) -> Option<PersistedSession> {
        self.session.lock().clone()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<PersistedSession>> {
        if let Some(error) = self.load_error.lock().take() {
            return Err(error);
        }
        Ok(self.session.lock().clone())
    }

    fn save(&self, session: &PersistedSession) -> Result<()> {
        *self.session.lock() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.session.lock() = None;
        Ok(())
    }
}
