//! Environment-driven service configuration.

use std::time::Duration;

use x402::{FallbackPolicy, X402Error};

pub const DEFAULT_PORT: u16 = 4022;
pub const DEFAULT_RATE_LIMIT_RPM: u64 = 120;

/// Settlement polls for up to two minutes; leave room for the broadcast.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(150);

/// Shared secrets shorter than this are accepted with a warning.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmSettings {
    pub private_key: String,
    pub rpc_url: Option<String>,
    pub settlement_contract: String,
    pub chain_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiversXSettings {
    /// CAIP-2 id or alias (`devnet`, `multiversx-mainnet`, ...).
    pub network: String,
    pub api_url: Option<String>,
    /// Hex Ed25519 key; without it relayed transactions are refused.
    pub relayer_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacilitatorConfig {
    pub port: u16,
    /// HMAC key for `/verify` and `/settle`. Mandatory.
    pub shared_secret: Vec<u8>,
    /// Bearer token for `/metrics`.
    pub metrics_token: Option<Vec<u8>>,
    /// Serve `/metrics` without a token when none is configured.
    pub public_metrics: bool,
    pub rate_limit_rpm: u64,
    pub allowed_origins: Vec<String>,
    pub request_timeout: Duration,
    pub fallback: FallbackPolicy,
    pub evm: Option<EvmSettings>,
    pub multiversx: Option<MultiversXSettings>,
}

impl FacilitatorConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, X402Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, X402Error> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let parse = |key: &str| -> Result<Option<u64>, X402Error> {
            get(key)
                .map(|v| {
                    v.parse::<u64>()
                        .map_err(|_| X402Error::ConfigError(format!("{key} must be an integer, got '{v}'")))
                })
                .transpose()
        };

        let shared_secret = get("FACILITATOR_SHARED_SECRET")
            .ok_or_else(|| {
                X402Error::ConfigError(
                    "FACILITATOR_SHARED_SECRET is required (e.g. `openssl rand -hex 32`)".to_string(),
                )
            })?
            .into_bytes();

        let port = match get("FACILITATOR_PORT").or_else(|| get("PORT")) {
            Some(p) => p
                .parse()
                .map_err(|_| X402Error::ConfigError(format!("invalid port '{p}'")))?,
            None => DEFAULT_PORT,
        };

        let fallback = match get("FALLBACK_POLICY") {
            Some(p) => p.parse()?,
            None => FallbackPolicy::default(),
        };

        let evm = match get("EVM_PRIVATE_KEY") {
            Some(private_key) => Some(EvmSettings {
                private_key,
                rpc_url: get("EVM_RPC_URL"),
                settlement_contract: get("EVM_SETTLEMENT_CONTRACT").ok_or_else(|| {
                    X402Error::ConfigError(
                        "EVM_SETTLEMENT_CONTRACT is required with EVM_PRIVATE_KEY".to_string(),
                    )
                })?,
                chain_id: parse("EVM_CHAIN_ID")?,
            }),
            None => None,
        };

        let multiversx = get("MULTIVERSX_NETWORK").map(|network| MultiversXSettings {
            network,
            api_url: get("MULTIVERSX_API_URL"),
            relayer_key: get("MULTIVERSX_RELAYER_KEY"),
        });

        if evm.is_none() && multiversx.is_none() {
            return Err(X402Error::ConfigError(
                "no ledger configured: set EVM_PRIVATE_KEY or MULTIVERSX_NETWORK".to_string(),
            ));
        }

        Ok(Self {
            port,
            shared_secret,
            metrics_token: get("METRICS_TOKEN").map(String::into_bytes),
            public_metrics: get("X402_PUBLIC_METRICS").is_some_and(|v| v == "true" || v == "1"),
            rate_limit_rpm: parse("RATE_LIMIT_RPM")?.unwrap_or(DEFAULT_RATE_LIMIT_RPM),
            allowed_origins: get("ALLOWED_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            request_timeout: parse("REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            fallback,
            evm,
            multiversx,
        })
    }
}
