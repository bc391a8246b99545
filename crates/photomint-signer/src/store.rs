//! Session persistence.
//!
//! An approved session is written out as JSON so a restart can resume it
//! without a second wallet round-trip. The file holds the handshake
//! (including the envelope key), the signer's topic, and the approved
//! account and chain; clearing it is part of every disconnect path.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use photomint_core::{Address, ChainId, EngineError, Result};

use crate::handshake::Handshake;

/// On-disk shape of one approved session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    /// Handshake the session was approved under
    pub handshake: Handshake,
    /// Signer's topic for follow-up requests
    pub peer_id: String,
    /// Approved account
    pub account: Address,
    /// Chain the session was on when last saved
    pub chain: ChainId,
}

/// Where approved sessions are kept between runs.
pub trait SessionStore: Send + Sync {
    /// The persisted session, if one exists.
    fn load(&self) -> Result<Option<PersistedSession>>;

    /// Persist `session`, replacing any previous one.
    fn save(&self, session: &PersistedSession) -> Result<()>;

    /// Remove the persisted session.
    fn clear(&self) -> Result<()>;
}

/// Store for hosts that never persist sessions. Loads nothing, saves
/// nowhere, and every call succeeds.
pub struct NullSessionStore;

impl SessionStore for NullSessionStore {
    fn load(&self) -> Result<Option<PersistedSession>> {
        Ok(None)
    }

    fn save(&self, _session: &PersistedSession) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }
}

/// JSON file store.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Store backed by the file at `path`. Parent directories are created
    /// on the first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The canonical session file under `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join("session.json"))
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<PersistedSession>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let session = serde_json::from_slice(&raw)
            .map_err(|e| EngineError::store(format!("session file malformed: {e}")))?;
        Ok(Some(session))
    }

    fn save(&self, session: &PersistedSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_vec_pretty(session)
            .map_err(|e| EngineError::store(format!("session encode: {e}")))?;
        fs::write(&self.path, raw)?;
        tracing::debug!(path = %self.path.display(), "session persisted");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn sample() -> PersistedSession {
        PersistedSession {
            handshake: Handshake::generate("wss://bridge.example.org"),
            peer_id: "wallet-peer".to_string(),
            account: Address::repeat_byte(0x42),
            chain: ChainId::POLYGON,
        }
    }

    #[test]
    fn save_load_clear_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::in_dir(dir.path());

        assert_eq!(store.load().unwrap(), None);

        let session = sample();
        store.save(&session).unwrap();
        assert_eq!(store.load().unwrap(), Some(session));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        // Clearing twice is not an error.
        store.clear().unwrap();
    }

    #[test]
    fn malformed_file_is_a_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, b"{broken").unwrap();

        let store = FileSessionStore::new(path);
        assert_matches!(store.load(), Err(EngineError::Store { .. }));
    }

    #[test]
    fn save_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("nested/deeper/session.json"));
        store.save(&sample()).unwrap();
        assert!(store.load().unwrap().is_some());
    }
}
