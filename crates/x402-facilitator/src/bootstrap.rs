//! Assemble the scheme registry and shared state from [`FacilitatorConfig`].
//!
//! Nothing here touches the network: providers and gateway clients connect
//! lazily on first use, so a misconfigured endpoint surfaces on the first
//! verify rather than at startup.

use std::sync::Arc;

use alloy::primitives::Address;
use alloy::providers::ProviderBuilder;
use alloy::signers::local::PrivateKeySigner;

use x402::{SchemeFacilitator, SchemeRegistry, X402Error, X402_VERSION};
use x402_evm::config::BASE_CHAIN_ID;
use x402_evm::{EvmChainConfig, EvmSchemeFacilitator};
use x402_multiversx::{ApiClient, Ed25519Signer, MultiversXConfig, MultiversXSchemeFacilitator};

use crate::config::{EvmSettings, FacilitatorConfig, MultiversXSettings, MIN_SECRET_LEN};
use crate::state::AppState;

pub fn evm_facilitator(
    settings: &EvmSettings,
    config: &FacilitatorConfig,
) -> Result<Arc<dyn SchemeFacilitator>, X402Error> {
    let signer: PrivateKeySigner = settings
        .private_key
        .parse()
        .map_err(|_| X402Error::ConfigError("invalid EVM_PRIVATE_KEY".to_string()))?;
    let address = signer.address();

    let contract: Address = settings.settlement_contract.parse().map_err(|_| {
        X402Error::ConfigError(format!(
            "invalid EVM_SETTLEMENT_CONTRACT '{}'",
            settings.settlement_contract
        ))
    })?;

    let mut chain = EvmChainConfig::for_chain(settings.chain_id.unwrap_or(BASE_CHAIN_ID), contract);
    if let Some(url) = &settings.rpc_url {
        chain.rpc_url = url.clone();
    }
    chain.fallback = config.fallback;

    let rpc_url = chain
        .rpc_url
        .parse()
        .map_err(|_| X402Error::ConfigError(format!("invalid EVM_RPC_URL '{}'", chain.rpc_url)))?;
    let provider = ProviderBuilder::new()
        .wallet(alloy::network::EthereumWallet::from(signer))
        .connect_http(rpc_url);

    tracing::info!(
        network = %chain.network,
        facilitator = %address,
        settlement_contract = %contract,
        rpc = %chain.rpc_url,
        "EVM settlement enabled"
    );
    Ok(Arc::new(EvmSchemeFacilitator::with_chain_config(
        provider, address, chain,
    )))
}

pub fn multiversx_facilitator(
    settings: &MultiversXSettings,
    config: &FacilitatorConfig,
) -> Result<Arc<dyn SchemeFacilitator>, X402Error> {
    let mut chain = MultiversXConfig::from_network(&settings.network)?;
    if let Some(url) = &settings.api_url {
        chain = chain.with_api_url(url.clone());
    }
    chain.fallback = config.fallback;

    let rpc = Arc::new(ApiClient::new(chain.api_url.clone()));
    let mut facilitator = MultiversXSchemeFacilitator::new(rpc, chain.clone());
    match &settings.relayer_key {
        Some(key) => {
            let relayer = Ed25519Signer::from_hex(key).map_err(|_| {
                X402Error::ConfigError("invalid MULTIVERSX_RELAYER_KEY".to_string())
            })?;
            facilitator = facilitator.with_relayer(Arc::new(relayer));
        }
        None => tracing::warn!(
            network = %chain.network,
            "MULTIVERSX_RELAYER_KEY not set; relayed payments will be refused"
        ),
    }

    tracing::info!(
        network = %chain.network,
        relayer = facilitator.relayer_address().map(|a| a.to_bech32()).unwrap_or_default(),
        api = %chain.api_url,
        "MultiversX settlement enabled"
    );
    Ok(Arc::new(facilitator))
}

/// One facilitator per configured ledger family.
pub fn build_registry(config: &FacilitatorConfig) -> Result<SchemeRegistry, X402Error> {
    let mut builder = SchemeRegistry::builder();
    if let Some(evm) = &config.evm {
        builder = builder.facilitator(X402_VERSION, evm_facilitator(evm, config)?);
    }
    if let Some(mvx) = &config.multiversx {
        builder = builder.facilitator(X402_VERSION, multiversx_facilitator(mvx, config)?);
    }
    Ok(builder.build())
}

pub fn build_state(config: &FacilitatorConfig) -> Result<AppState, X402Error> {
    if config.shared_secret.len() < MIN_SECRET_LEN {
        tracing::warn!(
            "FACILITATOR_SHARED_SECRET is shorter than {MIN_SECRET_LEN} bytes; use a longer random value"
        );
    }
    if config.metrics_token.is_none() && !config.public_metrics {
        tracing::warn!("METRICS_TOKEN not set; /metrics is disabled");
    }

    let mut state = AppState::new(build_registry(config)?, config.shared_secret.clone());
    state.metrics_token = config.metrics_token.clone();
    state.public_metrics = config.public_metrics;
    state.request_timeout = config.request_timeout;
    Ok(state)
}
