//! Suspension guards.
//!
//! Handing control to the signer app usually backgrounds this process, and
//! a suspended process cannot run its own continuation. The host exposes a
//! keep-alive hook; [`GuardRegistry`] wraps it in RAII guards keyed by
//! purpose, so every exit path from a hand-off (success, rejection,
//! transport failure, panic unwind) ends the window exactly once. At most
//! one guard per purpose exists at a time; a second acquire is refused.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use photomint_core::{EngineError, Result};

/// What a keep-alive window is protecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardPurpose {
    /// Session hand-off: connect link shown, waiting for approval
    Connect,
    /// Transaction hand-off: request sent, waiting for the acknowledgement
    Send,
}

impl GuardPurpose {
    /// Stable name used in errors and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardPurpose::Connect => "connect",
            GuardPurpose::Send => "send",
        }
    }
}

impl fmt::Display for GuardPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host keep-alive hook.
///
/// `begin` and `end` are paired per purpose by [`GuardRegistry`]; an
/// implementation only forwards them to the platform.
pub trait HostSuspension: Send + Sync {
    /// A window for `purpose` starts.
    fn begin(&self, purpose: GuardPurpose);

    /// The window for `purpose` is over.
    fn end(&self, purpose: GuardPurpose);
}

/// Host hook for platforms that never suspend the process.
pub struct NullSuspension;

impl HostSuspension for NullSuspension {
    fn begin(&self, _purpose: GuardPurpose) {}
    fn end(&self, _purpose: GuardPurpose) {}
}

/// Issues at most one [`SuspensionGuard`] per purpose.
pub struct GuardRegistry {
    host: Arc<dyn HostSuspension>,
    held: Mutex<HashMap<GuardPurpose, u64>>,
    next_token: AtomicU64,
}

impl GuardRegistry {
    /// Registry forwarding windows to `host`.
    pub fn new(host: Arc<dyn HostSuspension>) -> Arc<Self> {
        Arc::new(Self {
            host,
            held: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        })
    }

    /// Acquire the guard for `purpose`. Refused while one is outstanding.
    pub fn acquire(self: &Arc<Self>, purpose: GuardPurpose) -> Result<SuspensionGuard> {
        let token = {
            let mut held = self.held.lock();
            if held.contains_key(&purpose) {
                return Err(EngineError::already_pending(purpose.as_str()));
            }
            let token = self.next_token.fetch_add(1, Ordering::Relaxed);
            held.insert(purpose, token);
            token
        };
        self.host.begin(purpose);
        tracing::debug!(%purpose, "suspension guard acquired");
        Ok(SuspensionGuard {
            registry: Arc::clone(self),
            purpose,
            token,
        })
    }

    /// True while a guard for `purpose` is outstanding.
    pub fn is_held(&self, purpose: GuardPurpose) -> bool {
        self.held.lock().contains_key(&purpose)
    }

    /// The host reports the window lapsed on its own. Frees the purpose
    /// for a fresh acquire; the stale guard's eventual drop is a no-op.
    pub fn expire(&self, purpose: GuardPurpose) -> bool {
        let expired = self.held.lock().remove(&purpose).is_some();
        if expired {
            tracing::warn!(%purpose, "suspension window expired before release");
        }
        expired
    }

    fn release(&self, purpose: GuardPurpose, token: u64) {
        let released = {
            let mut held = self.held.lock();
            match held.get(&purpose) {
                Some(current) if *current == token => {
                    held.remove(&purpose);
                    true
                }
                _ => false,
            }
        };
        if released {
            self.host.end(purpose);
            tracing::debug!(%purpose, "suspension guard released");
        }
    }
}

/// Keep-alive window that ends when this value drops.
pub struct SuspensionGuard {
    registry: Arc<GuardRegistry>,
    purpose: GuardPurpose,
    token: u64,
}

impl SuspensionGuard {
    /// What this guard protects.
    pub fn purpose(&self) -> GuardPurpose {
        self.purpose
    }

    /// End the window now. Equivalent to dropping, but reads as intent at
    /// the acknowledgement site.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for SuspensionGuard {
    fn drop(&mut self) {
        self.registry.release(self.purpose, self.token);
    }
}

impl fmt::Debug for SuspensionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuspensionGuard")
            .field("purpose", &self.purpose)
            .finish()
    }
}
