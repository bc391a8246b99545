//! Sealed relay envelopes.
//!
//! Every payload crossing the relay is AES-256-GCM sealed under the
//! session key from the handshake URI. The relay sees only topics and
//! ciphertext; a tampered or cross-session envelope fails authentication
//! and is dropped by the caller.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key,
};
use serde::{Deserialize, Serialize};

use photomint_core::{EngineError, Result};

/// Size of the GCM nonce carried alongside each envelope.
const NONCE_LEN: usize = 12;

/// 256-bit session key shared with the signer through the connect URI.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SessionKey([u8; 32]);

impl SessionKey {
    /// A fresh random key.
    pub fn generate() -> Self {
        Self(rand::random())
    }

    /// Key from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Lowercase hex form used in the connect URI.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the hex form back into a key.
    pub fn from_hex(text: &str) -> Result<Self> {
        let bytes = hex::decode(text)
            .map_err(|_| EngineError::connection("session key is not hex"))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| EngineError::connection("session key must be 32 bytes"))?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        f.write_str("SessionKey(..)")
    }
}

impl Serialize for SessionKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SessionKey {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        SessionKey::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

/// One sealed payload as it travels over the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Hex ciphertext including the GCM tag
    pub data: String,
    /// Hex 12-byte nonce, unique per envelope
    pub nonce: String,
}

/// Seal `plaintext` under `key` with a fresh nonce.
pub fn seal(key: &SessionKey, plaintext: &[u8]) -> Result<Envelope> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    let nonce: [u8; NONCE_LEN] = rand::random();
    let ciphertext = cipher
        .encrypt(&nonce.into(), plaintext)
        .map_err(|_| EngineError::connection("envelope seal failed"))?;
    Ok(Envelope {
        data: hex::encode(ciphertext),
        nonce: hex::encode(nonce),
    })
}

/// Open an envelope, authenticating it against `key`.
pub fn open(key: &SessionKey, envelope: &Envelope) -> Result<Vec<u8>> {
    let ciphertext = hex::decode(&envelope.data)
        .map_err(|_| EngineError::connection("envelope data is not hex"))?;
    let nonce = hex::decode(&envelope.nonce)
        .map_err(|_| EngineError::connection("envelope nonce is not hex"))?;
    let nonce: [u8; NONCE_LEN] = nonce
        .try_into()
        .map_err(|_| EngineError::connection("envelope nonce must be 12 bytes"))?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    cipher
        .decrypt(&nonce.into(), ciphertext.as_slice())
        .map_err(|_| EngineError::connection("envelope failed authentication"))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn sealed_envelope_opens_under_the_same_key() {
        let key = SessionKey::generate();
        let envelope = seal(&key, b"{\"id\":1}").unwrap();
        assert_eq!(open(&key, &envelope).unwrap(), b"{\"id\":1}");
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let envelope = seal(&SessionKey::generate(), b"payload").unwrap();
        assert_matches!(
            open(&SessionKey::generate(), &envelope),
            Err(EngineError::Connection { message }) if message.contains("authentication")
        );
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let key = SessionKey::generate();
        let mut envelope = seal(&key, b"payload").unwrap();
        let mut raw = hex::decode(&envelope.data).unwrap();
        raw[0] ^= 0x01;
        envelope.data = hex::encode(raw);
        assert!(open(&key, &envelope).is_err());
    }

    #[test]
    fn nonces_never_repeat_across_envelopes() {
        let key = SessionKey::generate();
        let a = seal(&key, b"x").unwrap();
        let b = seal(&key, b"x").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn key_hex_round_trips_through_serde() {
        let key = SessionKey::generate();
        let json = serde_json::to_string(&key).unwrap();
        let back: SessionKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, back);
        assert_matches!(SessionKey::from_hex("abcd"), Err(EngineError::Connection { .. }));
    }
}
