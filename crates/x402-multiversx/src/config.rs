use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use x402::{
    FallbackPolicy, GasSchedule, PollConfig, X402Error, DEFAULT_FINALITY_TIMEOUT,
    DEFAULT_POLL_INTERVAL,
};

pub const CHAIN_ID_MAINNET: &str = "1";
pub const CHAIN_ID_DEVNET: &str = "D";
pub const CHAIN_ID_TESTNET: &str = "T";

pub const MAINNET_API_URL: &str = "https://api.multiversx.com";
pub const DEVNET_API_URL: &str = "https://devnet-api.multiversx.com";
pub const TESTNET_API_URL: &str = "https://testnet-api.multiversx.com";

/// Native asset ticker. Everything else is an ESDT token identifier.
pub const NATIVE_TOKEN: &str = "EGLD";

pub const TRANSFER_METHOD_DIRECT: &str = "direct";
pub const TRANSFER_METHOD_ESDT: &str = "esdt";

/// Default gas limit of a plain native transfer.
pub const GAS_LIMIT_STANDARD: u64 = 50_000;
/// Default gas limit of a multi-asset (ESDT) transfer.
pub const GAS_LIMIT_ESDT: u64 = 60_000_000;
/// Extra gas a relayed transaction consumes on top of the inner one.
pub const GAS_LIMIT_RELAYED_EXTRA: u64 = 100_000;
pub const GAS_PRICE_DEFAULT: u64 = 1_000_000_000;

/// Transaction version carrying a relayer field.
pub const TX_VERSION: u32 = 2;

/// Seconds an authorization is backdated to absorb clock skew.
pub const VALID_AFTER_SKEW: u64 = 600;

static TOKEN_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z0-9]{3,8}-[0-9a-fA-F]{6}$").expect("token identifier regex")
});

/// ESDT identifier grammar: `TICKER-abcdef`.
pub fn is_valid_token_id(asset: &str) -> bool {
    TOKEN_ID.is_match(asset)
}

/// An empty asset means the native token.
pub fn is_native(asset: &str) -> bool {
    asset.is_empty() || asset == NATIVE_TOKEN
}

/// Resolve a CAIP-2 network or a named alias to its chain id.
pub fn chain_id_for_network(network: &str) -> Result<&'static str, X402Error> {
    match network {
        "mainnet" | "multiversx-mainnet" | "multiversx:1" => Ok(CHAIN_ID_MAINNET),
        "devnet" | "multiversx-devnet" | "multiversx:D" => Ok(CHAIN_ID_DEVNET),
        "testnet" | "multiversx-testnet" | "multiversx:T" => Ok(CHAIN_ID_TESTNET),
        other => Err(X402Error::UnsupportedNetwork(format!(
            "unsupported MultiversX network '{other}'"
        ))),
    }
}

/// Public API gateway for a chain id; unknown ids fall back to mainnet.
pub fn api_url_for_chain(chain_id: &str) -> &'static str {
    match chain_id {
        CHAIN_ID_DEVNET => DEVNET_API_URL,
        CHAIN_ID_TESTNET => TESTNET_API_URL,
        _ => MAINNET_API_URL,
    }
}

/// Runtime configuration for one MultiversX chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiversXConfig {
    pub chain_id: String,
    /// CAIP-2 network identifier, `multiversx:<chain_id>`.
    pub network: String,
    pub api_url: String,
    pub gas: GasSchedule,
    pub gas_price: u64,
    pub poll_interval: Duration,
    pub finality_timeout: Duration,
    pub fallback: FallbackPolicy,
}

impl Default for MultiversXConfig {
    /// Mainnet with the public API gateway.
    fn default() -> Self {
        Self::for_chain(CHAIN_ID_MAINNET)
    }
}

impl MultiversXConfig {
    pub fn for_chain(chain_id: &str) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            network: format!("multiversx:{chain_id}"),
            api_url: api_url_for_chain(chain_id).to_string(),
            gas: GasSchedule::default(),
            gas_price: GAS_PRICE_DEFAULT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            finality_timeout: DEFAULT_FINALITY_TIMEOUT,
            fallback: FallbackPolicy::default(),
        }
    }

    /// Build from a CAIP-2 id or alias such as `devnet`.
    pub fn from_network(network: &str) -> Result<Self, X402Error> {
        Ok(Self::for_chain(chain_id_for_network(network)?))
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Whether `network` (CAIP-2 or alias) names this chain.
    pub fn serves(&self, network: &str) -> bool {
        chain_id_for_network(network).is_ok_and(|id| id == self.chain_id)
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: self.poll_interval,
            timeout: self.finality_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_networks_and_aliases() {
        assert_eq!(chain_id_for_network("multiversx:1").unwrap(), "1");
        assert_eq!(chain_id_for_network("devnet").unwrap(), "D");
        assert_eq!(chain_id_for_network("multiversx-testnet").unwrap(), "T");
        for bad in ["multiversx:X", "eip155:1", "multiversx", ""] {
            assert!(chain_id_for_network(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn token_identifiers() {
        for ok in ["USDC-123456", "WEGLD-bd4d79", "MEX-455c57", "ABC-ABCDEF"] {
            assert!(is_valid_token_id(ok), "{ok}");
        }
        for bad in ["EGLD", "usdc-123456", "AB-123456", "TOOLONGTK-123456", "USDC-12345", "USDC-12345g"] {
            assert!(!is_valid_token_id(bad), "{bad}");
        }
        assert!(is_native("EGLD"));
        assert!(is_native(""));
        assert!(!is_native("egld"));
    }

    #[test]
    fn api_urls_per_chain() {
        assert_eq!(api_url_for_chain("D"), DEVNET_API_URL);
        assert_eq!(api_url_for_chain("T"), TESTNET_API_URL);
        assert_eq!(api_url_for_chain("1"), MAINNET_API_URL);
        assert_eq!(api_url_for_chain("?"), MAINNET_API_URL);
    }

    #[test]
    fn config_from_alias() {
        let c = MultiversXConfig::from_network("devnet").unwrap();
        assert_eq!(c.network, "multiversx:D");
        assert_eq!(c.api_url, DEVNET_API_URL);
        assert!(c.serves("multiversx:D"));
        assert!(c.serves("multiversx-devnet"));
        assert!(!c.serves("multiversx:1"));
        assert_eq!(c.gas_price, 1_000_000_000);
    }
}
