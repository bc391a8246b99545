//! Engine configuration
//!
//! Configuration is plain data loadable from TOML; every section has a
//! `Default` tuned for mainnet and a `for_testing` constructor with short
//! timings. Addresses serialize as `0x`-hex strings, so a TOML profile reads
//! naturally.

use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy_primitives::address;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::types::{Address, ChainId};

/// One deployment of the contract suite on one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainProfile {
    /// Chain the profile targets; sessions on any other chain are gated
    pub chain_id: ChainId,
    /// JSON-RPC endpoint of a node on that chain
    pub rpc_url: String,
    /// Public-collections router contract
    pub router: Address,
    /// Access-token contract (private collections)
    pub access_token: Address,
    /// Utility-token contract (ERC-20 used for purchases)
    pub utility_token: Address,
}

impl ChainProfile {
    /// Polygon mainnet deployment
    pub fn mainnet() -> Self {
        Self {
            chain_id: ChainId::POLYGON,
            rpc_url: "https://polygon-rpc.com".into(),
            router: address!("e760Cf4Ef449139541d2674aCAAE22f906775baC"),
            access_token: address!("8dDAC2F23730E168C3684C2567338b6697B291e0"),
            utility_token: address!("580aeE9658cC4382cbFbCC32977379a3f4695D25"),
        }
    }

    /// Polygon testnet deployment
    pub fn testnet() -> Self {
        Self {
            chain_id: ChainId::POLYGON_TESTNET,
            rpc_url: "https://rpc-mumbai.maticvigil.com".into(),
            router: address!("551750045d9DeC7Fb5023E96c9543492395af946"),
            access_token: address!("e8e273aA17227972709B9FE389871C74e9f8C382"),
            utility_token: address!("3962276a988347A1DD8EBEa5f0ea44798d09803D"),
        }
    }

    /// Replace the contract addresses, e.g. from a remote contracts config
    pub fn with_contracts(mut self, router: Address, access_token: Address, utility_token: Address) -> Self {
        self.router = router;
        self.access_token = access_token;
        self.utility_token = utility_token;
        self
    }
}

impl Default for ChainProfile {
    fn default() -> Self {
        Self::mainnet()
    }
}

/// Signer-bridge relay settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// WebSocket URL of the relay
    pub url: String,
    /// Delay between relay subscription ack and the deep-link launch
    pub deep_link_delay_ms: u64,
}

impl RelayConfig {
    /// Deep-link launch delay as a `Duration`
    pub fn deep_link_delay(&self) -> Duration {
        Duration::from_millis(self.deep_link_delay_ms)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: "wss://bridge.walletconnect.org".into(),
            deep_link_delay_ms: 250,
        }
    }
}

/// Confirmation poller settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// Interval between poll ticks; a tick may land late, never early
    pub poll_interval_ms: u64,
    /// Attempts before an observation expires
    pub max_attempts: u32,
}

impl ObserverConfig {
    /// Poll interval as a `Duration`
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            max_attempts: 120,
        }
    }
}

/// Off-chain companion service settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffchainConfig {
    /// Base URL of the faucet/config REST service
    pub base_url: String,
    /// Fetch the deployed contract addresses from the service at startup
    pub fetch_contracts: bool,
}

impl Default for OffchainConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.photomint.app".into(),
            fetch_contracts: false,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Target chain and contract suite
    pub chain: ChainProfile,
    /// Relay settings
    pub relay: RelayConfig,
    /// Poller settings
    pub observer: ObserverConfig,
    /// Off-chain service settings
    pub offchain: OffchainConfig,
    /// Where to persist the session blob; `None` disables persistence
    pub session_file: Option<PathBuf>,
}

impl EngineConfig {
    /// Testnet profile with short timings for tests
    pub fn for_testing() -> Self {
        Self {
            chain: ChainProfile::testnet(),
            relay: RelayConfig {
                url: "ws://127.0.0.1:18546".into(),
                deep_link_delay_ms: 0,
            },
            observer: ObserverConfig {
                poll_interval_ms: 25,
                max_attempts: 5,
            },
            offchain: OffchainConfig {
                base_url: "http://127.0.0.1:18547".into(),
                fetch_contracts: false,
            },
            session_file: None,
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).map_err(|err| EngineError::config(err.to_string()))
    }

    /// Load a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| EngineError::config(format!("{}: {err}", path.display())))?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_mainnet() {
        let config = EngineConfig::default();
        assert_eq!(config.chain.chain_id, ChainId::POLYGON);
        assert_eq!(config.observer.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.observer.max_attempts, 120);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [observer]
            poll_interval_ms = 2000

            [chain]
            chain_id = 80001
            rpc_url = "https://rpc-mumbai.maticvigil.com"
            router = "0x551750045d9DeC7Fb5023E96c9543492395af946"
            access_token = "0xe8e273aA17227972709B9FE389871C74e9f8C382"
            utility_token = "0x3962276a988347A1DD8EBEa5f0ea44798d09803D"
            "#,
        )
        .unwrap();
        assert_eq!(config.observer.poll_interval_ms, 2_000);
        assert_eq!(config.observer.max_attempts, 120);
        assert_eq!(config.chain.chain_id, ChainId::POLYGON_TESTNET);
        assert_eq!(config.chain.router, ChainProfile::testnet().router);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let err = EngineConfig::from_toml_str("chain = 12").unwrap_err();
        assert!(matches!(err, EngineError::Config { .. }));
    }

    #[test]
    fn contract_override_replaces_all_three() {
        let profile = ChainProfile::testnet().with_contracts(
            ChainProfile::mainnet().router,
            ChainProfile::mainnet().access_token,
            ChainProfile::mainnet().utility_token,
        );
        assert_eq!(profile.chain_id, ChainId::POLYGON_TESTNET);
        assert_eq!(profile.router, ChainProfile::mainnet().router);
    }
}
