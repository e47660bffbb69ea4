use alloy::primitives::Address;
use x402::{
    parse_atomic_amount, parse_money_amount, AssetAmount, PaymentRequirements, SchemeServer,
    SupportedKind, X402Error, SCHEME_EXACT,
};

use crate::config::EvmChainConfig;

/// Server-side scheme: validates and enhances EVM payment requirements.
pub struct EvmSchemeServer {
    config: EvmChainConfig,
    /// Token used when a price is given in money units, with its decimals.
    default_asset: Option<(Address, u32)>,
}

impl EvmSchemeServer {
    pub fn new(config: EvmChainConfig) -> Self {
        Self {
            config,
            default_asset: None,
        }
    }

    pub fn with_default_asset(mut self, asset: Address, decimals: u32) -> Self {
        self.default_asset = Some((asset, decimals));
        self
    }

    /// Resolve a money price such as `"$0.001"` into the default asset's
    /// atomic units.
    pub fn parse_price(&self, price: &str) -> Result<AssetAmount, X402Error> {
        let (asset, decimals) = self.default_asset.ok_or_else(|| {
            X402Error::ConfigError("no default asset configured for money prices".to_string())
        })?;
        Ok(AssetAmount {
            asset: asset.to_string(),
            amount: parse_money_amount(price, decimals)?.to_string(),
        })
    }
}

impl SchemeServer for EvmSchemeServer {
    fn scheme(&self) -> &str {
        SCHEME_EXACT
    }

    fn network(&self) -> &str {
        &self.config.network
    }

    fn validate(&self, requirements: &PaymentRequirements) -> Result<(), X402Error> {
        if requirements.scheme != SCHEME_EXACT {
            return Err(X402Error::UnsupportedScheme(requirements.scheme.clone()));
        }
        if requirements.network != self.config.network {
            return Err(X402Error::UnsupportedNetwork(requirements.network.clone()));
        }
        requirements.pay_to.parse::<Address>().map_err(|e| {
            X402Error::InvalidRequirements(format!("invalid payTo '{}': {e}", requirements.pay_to))
        })?;
        requirements.asset.parse::<Address>().map_err(|e| {
            X402Error::InvalidRequirements(format!(
                "asset '{}' is not a token address: {e}",
                requirements.asset
            ))
        })?;
        parse_atomic_amount(&requirements.amount)?;
        Ok(())
    }

    fn enhance(
        &self,
        mut requirements: PaymentRequirements,
        kind: Option<&SupportedKind>,
    ) -> Result<PaymentRequirements, X402Error> {
        self.validate(&requirements)?;

        let defaults = [
            ("name", self.config.eip712_domain_name.clone()),
            ("version", self.config.eip712_domain_version.clone()),
            (
                "verifyingContract",
                self.config.settlement_contract.to_string(),
            ),
        ];
        for (key, value) in defaults {
            requirements
                .extra
                .entry(key)
                .or_insert_with(|| value.into());
        }
        if let Some(extra) = kind.and_then(|k| k.extra.as_ref()) {
            for (key, value) in extra {
                requirements
                    .extra
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
        }
        Ok(requirements)
    }
}
