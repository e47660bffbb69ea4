use x402::{
    parse_atomic_amount, parse_money_amount, AssetAmount, PaymentRequirements, SchemeServer,
    SupportedKind, X402Error, SCHEME_EXACT,
};

use crate::address::is_valid_address;
use crate::config::{
    is_native, is_valid_token_id, MultiversXConfig, GAS_LIMIT_ESDT, GAS_LIMIT_STANDARD,
    NATIVE_TOKEN, TRANSFER_METHOD_DIRECT, TRANSFER_METHOD_ESDT,
};

/// Decimals of the native asset.
pub const EGLD_DECIMALS: u32 = 18;

/// Server-side scheme: validates and enhances MultiversX payment requirements.
pub struct MultiversXSchemeServer {
    config: MultiversXConfig,
    /// Asset used for money prices, with its decimals. EGLD by default.
    default_asset: (String, u32),
}

impl MultiversXSchemeServer {
    pub fn new(config: MultiversXConfig) -> Self {
        Self {
            config,
            default_asset: (NATIVE_TOKEN.to_string(), EGLD_DECIMALS),
        }
    }

    pub fn with_default_asset(mut self, token: impl Into<String>, decimals: u32) -> Self {
        self.default_asset = (token.into(), decimals);
        self
    }

    /// Resolve a money price such as `"0.5"` into atomic units of the
    /// default asset.
    pub fn parse_price(&self, price: &str) -> Result<AssetAmount, X402Error> {
        let (asset, decimals) = &self.default_asset;
        Ok(AssetAmount {
            asset: asset.clone(),
            amount: parse_money_amount(price, *decimals)?.to_string(),
        })
    }
}

impl SchemeServer for MultiversXSchemeServer {
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
        if !self.config.serves(&requirements.network) {
            return Err(X402Error::UnsupportedNetwork(requirements.network.clone()));
        }
        if !is_valid_address(&requirements.pay_to) {
            return Err(X402Error::InvalidRequirements(format!(
                "invalid payTo '{}': expected an erd1 bech32 address",
                requirements.pay_to
            )));
        }
        let asset = requirements.asset.as_str();
        if !is_native(asset) && !is_valid_token_id(asset) {
            return Err(X402Error::InvalidRequirements(format!(
                "asset '{asset}' is neither {NATIVE_TOKEN} nor a token identifier"
            )));
        }
        parse_atomic_amount(&requirements.amount)?;
        Ok(())
    }

    fn enhance(
        &self,
        mut requirements: PaymentRequirements,
        kind: Option<&SupportedKind>,
    ) -> Result<PaymentRequirements, X402Error> {
        self.validate(&requirements)?;

        let (method, gas) = if is_native(&requirements.asset) {
            (TRANSFER_METHOD_DIRECT, GAS_LIMIT_STANDARD)
        } else {
            (TRANSFER_METHOD_ESDT, GAS_LIMIT_ESDT)
        };
        requirements
            .extra
            .entry("assetTransferMethod")
            .or_insert_with(|| method.into());
        requirements
            .extra
            .entry("gasLimit")
            .or_insert_with(|| gas.into());

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

#[cfg(test)]
mod tests {
    use super::*;

    const BOB: &str = "erd1spyavw0956vq68xj8y4tenjpq2wd5a9p2c6j8gsz7ztyrnpxrruqzu66jx";
    const RELAYER: &str = "erd1qyu5wthldzr8wx5c9ucg8kjagg0jfs53s8nr3zpz3hypefsdd8ssycr6th";

    fn server() -> MultiversXSchemeServer {
        MultiversXSchemeServer::new(MultiversXConfig::for_chain("D"))
    }

    fn requirements(asset: &str) -> PaymentRequirements {
        PaymentRequirements {
            scheme: SCHEME_EXACT.into(),
            network: "multiversx:D".into(),
            asset: asset.into(),
            amount: "1000000".into(),
            pay_to: BOB.into(),
            max_timeout_seconds: 120,
            extra: Default::default(),
        }
    }

    #[test]
    fn parses_egld_prices() {
        let p = server().parse_price("0.5").unwrap();
        assert_eq!(p.asset, "EGLD");
        assert_eq!(p.amount, "500000000000000000");

        let usdc = server().with_default_asset("USDC-c76f1f", 6);
        assert_eq!(usdc.parse_price("$1.25").unwrap().amount, "1250000");
        assert!(server().parse_price("a lot").is_err());
    }

    #[test]
    fn validates_grammar() {
        assert!(server().validate(&requirements("EGLD")).is_ok());
        assert!(server().validate(&requirements("USDC-123456")).is_ok());

        let mut aliased = requirements("EGLD");
        aliased.network = "devnet".into();
        assert!(server().validate(&aliased).is_ok());

        for asset in ["egld", "USDC", "usdc-123456", "USDC-12345z"] {
            assert!(server().validate(&requirements(asset)).is_err(), "{asset}");
        }

        let mut r = requirements("EGLD");
        r.pay_to = BOB.to_uppercase();
        assert!(server().validate(&r).is_err());

        let mut r = requirements("EGLD");
        r.amount = "0x10".into();
        assert!(server().validate(&r).is_err());

        let mut r = requirements("EGLD");
        r.network = "multiversx:1".into();
        assert!(matches!(
            server().validate(&r),
            Err(X402Error::UnsupportedNetwork(_))
        ));

        let mut r = requirements("EGLD");
        r.scheme = "upto".into();
        assert!(matches!(
            server().validate(&r),
            Err(X402Error::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn enhance_sets_method_and_gas() {
        let native = server().enhance(requirements("EGLD"), None).unwrap();
        assert_eq!(native.extra["assetTransferMethod"], "direct");
        assert_eq!(native.extra["gasLimit"], 50_000);

        let token = server().enhance(requirements("USDC-123456"), None).unwrap();
        assert_eq!(token.extra["assetTransferMethod"], "esdt");
        assert_eq!(token.extra["gasLimit"], 60_000_000);
    }

    #[test]
    fn enhance_merges_relayer_without_overwriting() {
        let mut kind_extra = serde_json::Map::new();
        kind_extra.insert("relayer".into(), RELAYER.into());
        kind_extra.insert("gasLimit".into(), 1.into());
        let kind = SupportedKind {
            x402_version: 2,
            scheme: SCHEME_EXACT.into(),
            network: "multiversx:D".into(),
            extra: Some(kind_extra),
        };

        let mut r = requirements("EGLD");
        r.extra.insert("assetTransferMethod".into(), "custom".into());
        let enhanced = server().enhance(r, Some(&kind)).unwrap();
        assert_eq!(enhanced.extra["relayer"], RELAYER);
        assert_eq!(enhanced.extra["assetTransferMethod"], "custom");
        assert_eq!(enhanced.extra["gasLimit"], 50_000);
    }

    #[test]
    fn invalid_requirements_are_not_enhanced() {
        let mut r = requirements("EGLD");
        r.pay_to = "0x1234".into();
        assert!(server().enhance(r, None).is_err());
    }

    #[test]
    fn requirements_for_price() {
        let s = server();
        let price = s.parse_price("0.001").unwrap();
        let r = s.requirements_for(&price, BOB, 60, None).unwrap();
        assert_eq!(r.amount, "1000000000000000");
        assert_eq!(r.network, "multiversx:D");
        assert_eq!(r.extra["assetTransferMethod"], "direct");
    }
}
