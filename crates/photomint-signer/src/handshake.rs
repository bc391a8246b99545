//! Connect-URI generation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope::SessionKey;

/// Protocol version advertised in the connect URI.
const PROTOCOL_VERSION: u32 = 1;

/// Everything a fresh session hand-off needs: the handshake topic the
/// proposal is published on, the symmetric key both sides will seal
/// envelopes with, and our own client id, which doubles as the topic we
/// listen on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    /// Topic the session proposal is published on
    pub topic: String,
    /// Symmetric envelope key shared through the URI
    pub key: SessionKey,
    /// Relay the signer should connect back through
    pub bridge_url: String,
    /// Our subscription topic; responses arrive here
    pub client_id: String,
}

impl Handshake {
    /// Generate a single-use handshake toward `bridge_url`.
    pub fn generate(bridge_url: impl Into<String>) -> Self {
        Self {
            topic: Uuid::new_v4().to_string(),
            key: SessionKey::generate(),
            bridge_url: bridge_url.into(),
            client_id: Uuid::new_v4().to_string(),
        }
    }

    /// The URI handed to the signer, either directly or inside a wallet
    /// deep link.
    pub fn connect_uri(&self) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("bridge", &self.bridge_url)
            .append_pair("key", &self.key.to_hex())
            .finish();
        format!("wc:{}@{PROTOCOL_VERSION}?{query}", self.topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_uri_carries_topic_bridge_and_key() {
        let handshake = Handshake::generate("wss://bridge.example.org");
        let uri = handshake.connect_uri();

        assert!(uri.starts_with(&format!("wc:{}@1?", handshake.topic)));
        assert!(uri.contains("bridge=wss%3A%2F%2Fbridge.example.org"));
        assert!(uri.contains(&format!("key={}", handshake.key.to_hex())));
    }

    #[test]
    fn handshakes_are_single_use() {
        let a = Handshake::generate("wss://bridge.example.org");
        let b = Handshake::generate("wss://bridge.example.org");
        assert_ne!(a.topic, b.topic);
        assert_ne!(a.key, b.key);
        assert_ne!(a.client_id, b.client_id);
    }
}
