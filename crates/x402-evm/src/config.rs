use std::time::Duration;

use alloy::primitives::Address;
use x402::{FallbackPolicy, PollConfig, DEFAULT_FINALITY_TIMEOUT, DEFAULT_POLL_INTERVAL};

/// Base mainnet chain ID.
pub const BASE_CHAIN_ID: u64 = 8453;

/// Default public RPC endpoint for Base.
pub const BASE_RPC_URL: &str = "https://mainnet.base.org";

pub const EIP712_DOMAIN_NAME: &str = "x402-settlement";
pub const EIP712_DOMAIN_VERSION: &str = "1";

/// EVM signatures produced by an EOA key; anything else is a contract-wallet signature.
pub const ECDSA_SIGNATURE_LEN: usize = 65;

/// Runtime chain configuration, so one scheme implementation serves any
/// EVM chain that has the settlement contract deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmChainConfig {
    pub chain_id: u64,
    /// CAIP-2 network identifier, `eip155:<chain_id>`.
    pub network: String,
    /// Settlement contract; also the EIP-712 verifying contract.
    pub settlement_contract: Address,
    pub rpc_url: String,
    pub eip712_domain_name: String,
    pub eip712_domain_version: String,
    pub poll_interval: Duration,
    pub finality_timeout: Duration,
    pub fallback: FallbackPolicy,
}

impl Default for EvmChainConfig {
    /// Base mainnet with no settlement contract configured.
    fn default() -> Self {
        Self::for_chain(BASE_CHAIN_ID, Address::ZERO)
    }
}

impl EvmChainConfig {
    pub fn for_chain(chain_id: u64, settlement_contract: Address) -> Self {
        Self {
            chain_id,
            network: format!("eip155:{chain_id}"),
            settlement_contract,
            rpc_url: BASE_RPC_URL.to_string(),
            eip712_domain_name: EIP712_DOMAIN_NAME.to_string(),
            eip712_domain_version: EIP712_DOMAIN_VERSION.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            finality_timeout: DEFAULT_FINALITY_TIMEOUT,
            fallback: FallbackPolicy::default(),
        }
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: self.poll_interval,
            timeout: self.finality_timeout,
        }
    }
}
