//! Wallet deep links.
//!
//! A connect URI only helps if a wallet opens it. Each known wallet
//! publishes a universal-link prefix that accepts the URI as a query
//! parameter; the host hands the launch link to the OS through
//! [`WalletLauncher`].

use photomint_core::{EngineError, Result};

/// One wallet the hand-off can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletDescriptor {
    /// Stable identifier used in configuration
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    /// Universal-link base the wallet registered
    pub universal_link: &'static str,
}

const WALLETS: &[WalletDescriptor] = &[
    WalletDescriptor {
        id: "metamask",
        name: "MetaMask",
        universal_link: "https://metamask.app.link",
    },
    WalletDescriptor {
        id: "trust",
        name: "Trust Wallet",
        universal_link: "https://link.trustwallet.com",
    },
    WalletDescriptor {
        id: "rainbow",
        name: "Rainbow",
        universal_link: "https://rnbwapp.com",
    },
];

/// Wallets the engine can generate launch links for, first entry is the
/// default.
pub fn known_wallets() -> &'static [WalletDescriptor] {
    WALLETS
}

impl WalletDescriptor {
    /// Look a wallet up by its configuration id.
    pub fn by_id(id: &str) -> Option<&'static WalletDescriptor> {
        WALLETS.iter().find(|w| w.id == id)
    }

    /// The launch link carrying `connect_uri` to this wallet.
    pub fn connect_link(&self, connect_uri: &str) -> Result<String> {
        let base = format!("{}/wc", self.universal_link);
        let url = url::Url::parse_with_params(&base, &[("uri", connect_uri)])
            .map_err(|e| EngineError::config(format!("wallet link for {}: {e}", self.id)))?;
        Ok(url.to_string())
    }
}

/// Hands a launch link to the host OS.
///
/// Opening the link foregrounds the wallet app, which usually suspends
/// this process; callers hold a suspension guard across the call.
pub trait WalletLauncher: Send + Sync {
    /// Open `link` in the wallet.
    fn launch(&self, link: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_link_percent_encodes_the_uri() {
        let wallet = WalletDescriptor::by_id("metamask").unwrap();
        let link = wallet
            .connect_link("wc:topic@1?bridge=wss%3A%2F%2Fb&key=aa")
            .unwrap();
        assert!(link.starts_with("https://metamask.app.link/wc?uri="));
        // The embedded URI must survive a decode round-trip intact.
        let parsed = url::Url::parse(&link).unwrap();
        let (_, uri) = parsed.query_pairs().next().unwrap();
        assert_eq!(uri, "wc:topic@1?bridge=wss%3A%2F%2Fb&key=aa");
    }

    #[test]
    fn unknown_wallet_id_finds_nothing() {
        assert!(WalletDescriptor::by_id("metamask").is_some());
        assert!(WalletDescriptor::by_id("abacus").is_none());
    }

    #[test]
    fn default_wallet_is_first() {
        assert_eq!(known_wallets()[0].id, "metamask");
    }
}
