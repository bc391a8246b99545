//! Companion-service client.
//!
//! The off-chain backend hands out one native-gas grant per account and
//! serves the deployed contract addresses. Every route is a POST with a
//! JSON body; failures arrive as `{code, message, detail}` with the HTTP
//! status repeated in `code`, and are surfaced verbatim as
//! [`EngineError::Offchain`] so the caller can show the service's own
//! message.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use photomint_core::{Address, ChainProfile, EngineError, Result};

const ROUTE_CLAIM: &str = "/faucet/by_address";
const ROUTE_CLAIMED: &str = "/faucet/has";
const ROUTE_FAUCET_STATUS: &str = "/faucet/config";
const ROUTE_CONTRACTS: &str = "/config";

/// Whether the faucet accepts claims and how much of its budget is left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FaucetStatus {
    /// Claims are currently accepted
    pub open: bool,
    /// Grants paid out so far
    pub spent: u64,
    /// Total grant budget
    pub limit: u64,
}

impl FaucetStatus {
    /// True while the faucet accepts claims and has budget left.
    pub fn available(&self) -> bool {
        self.open && self.spent < self.limit
    }
}

/// Contract suite as the backend serves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RemoteContracts {
    /// Utility-token contract
    #[serde(rename = "token")]
    pub utility_token: Address,
    /// Access-token contract
    pub access_token: Address,
    /// Public-collections router
    #[serde(rename = "public_router")]
    pub router: Address,
}

impl RemoteContracts {
    /// `profile` with its contract addresses replaced by the served ones.
    pub fn apply(self, profile: ChainProfile) -> ChainProfile {
        profile.with_contracts(self.router, self.access_token, self.utility_token)
    }
}

/// The faucet and contracts surface of the companion backend.
#[async_trait]
pub trait OffchainApi: Send + Sync {
    /// Ask the faucet to fund `account`. Resolves with the grant
    /// transaction id.
    async fn claim_faucet(&self, account: Address) -> Result<String>;

    /// True when `account` already received its grant.
    async fn already_claimed(&self, account: Address) -> Result<bool>;

    /// Live faucet accounting.
    async fn faucet_status(&self) -> Result<FaucetStatus>;

    /// Deployed contract addresses, used to override a static profile.
    async fn contracts(&self) -> Result<RemoteContracts>;
}

#[derive(Debug, Serialize)]
struct AddressBody {
    address: Address,
}

#[derive(Debug, Deserialize)]
struct GrantBody {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UsageBody {
    has: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    detail: String,
}

/// REST client for the companion backend.
pub struct HttpOffchain {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOffchain {
    /// Client against the service at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn post<B, T>(&self, route: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}{route}", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| EngineError::connection(format!("offchain {route}: {e}")))?;
        let status = response.status();
        let raw = response
            .bytes()
            .await
            .map_err(|e| EngineError::connection(format!("offchain {route}: {e}")))?;
        if !status.is_success() {
            return Err(service_error(status.as_u16(), &raw));
        }
        serde_json::from_slice(&raw).map_err(|e| {
            EngineError::offchain(
                i64::from(status.as_u16()),
                format!("{route}: malformed response: {e}"),
            )
        })
    }
}

#[async_trait]
impl OffchainApi for HttpOffchain {
    async fn claim_faucet(&self, account: Address) -> Result<String> {
        let grant: GrantBody = self
            .post(ROUTE_CLAIM, &AddressBody { address: account })
            .await?;
        tracing::info!(%account, id = %grant.id, "faucet grant issued");
        Ok(grant.id)
    }

    async fn already_claimed(&self, account: Address) -> Result<bool> {
        let usage: UsageBody = self
            .post(ROUTE_CLAIMED, &AddressBody { address: account })
            .await?;
        Ok(usage.has)
    }

    async fn faucet_status(&self) -> Result<FaucetStatus> {
        self.post(ROUTE_FAUCET_STATUS, &serde_json::json!({})).await
    }

    async fn contracts(&self) -> Result<RemoteContracts> {
        self.post(ROUTE_CONTRACTS, &serde_json::json!({})).await
    }
}

/// Map a non-success response to the service's own error when the body
/// parses, otherwise to a generic one carrying the raw body.
fn service_error(status: u16, body: &[u8]) -> EngineError {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(err) if err.detail.is_empty() => EngineError::offchain(err.code, err.message),
        Ok(err) => EngineError::offchain(err.code, format!("{}: {}", err.message, err.detail)),
        Err(_) => EngineError::offchain(
            i64::from(status),
            String::from_utf8_lossy(body).into_owned(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn service_error_keeps_the_served_message() {
        let err = service_error(400, br#"{"code":400,"message":"already got faucet","detail":""}"#);
        assert_matches!(err, EngineError::Offchain { code: 400, message } => {
            assert_eq!(message, "already got faucet");
        });

        let err = service_error(
            400,
            br#"{"code":400,"message":"validation failed","detail":"address"}"#,
        );
        assert_matches!(err, EngineError::Offchain { message, .. } => {
            assert_eq!(message, "validation failed: address");
        });
    }

    #[test]
    fn unparseable_error_body_falls_back_to_the_status() {
        let err = service_error(502, b"<html>bad gateway</html>");
        assert_matches!(err, EngineError::Offchain { code: 502, message } => {
            assert!(message.contains("bad gateway"));
        });
    }

    #[test]
    fn contracts_decode_under_their_served_names() {
        let contracts: RemoteContracts = serde_json::from_str(
            r#"{
                "token": "0x3962276a988347A1DD8EBEa5f0ea44798d09803D",
                "access_token": "0xe8e273aA17227972709B9FE389871C74e9f8C382",
                "public_router": "0x551750045d9DeC7Fb5023E96c9543492395af946"
            }"#,
        )
        .unwrap();
        let profile = contracts.apply(ChainProfile::mainnet());
        assert_eq!(profile.utility_token, contracts.utility_token);
        assert_eq!(profile.router, contracts.router);
        // Everything but the contract addresses is untouched.
        assert_eq!(profile.chain_id, ChainProfile::mainnet().chain_id);
    }

    #[test]
    fn faucet_status_reports_availability() {
        let open: FaucetStatus = serde_json::from_str(r#"{"open":true,"spent":3,"limit":100}"#).unwrap();
        assert!(open.available());

        let exhausted: FaucetStatus =
            serde_json::from_str(r#"{"open":true,"spent":100,"limit":100}"#).unwrap();
        assert!(!exhausted.available());

        let closed: FaucetStatus = serde_json::from_str(r#"{"open":false,"spent":0,"limit":100}"#).unwrap();
        assert!(!closed.available());
    }

    #[test]
    fn address_body_matches_the_wire_shape() {
        let body = serde_json::to_value(AddressBody {
            address: Address::repeat_byte(0xab),
        })
        .unwrap();
        assert_eq!(
            body["address"].as_str().unwrap().to_lowercase(),
            format!("0x{}", "ab".repeat(20)),
        );
    }
}
