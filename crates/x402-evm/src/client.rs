use std::sync::Arc;

use alloy::primitives::{Address, Bytes};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;

use x402::{
    parse_atomic_amount, BuildError, Clock, Deadline, PaymentPayload, PaymentRequirements,
    SchemeClient, SystemClock, SCHEME_EXACT,
};

use crate::config::EvmChainConfig;
use crate::eip712::{encode_signature_hex, random_nonce, signing_hash};
use crate::payload::{EvmAuthorization, EvmPayload, EvmPermit};

/// Seconds an authorization is backdated so small clock skew between
/// payer and facilitator does not make it "too early".
const VALID_AFTER_SKEW: u64 = 60;

/// Payer-side builder: creates and signs EIP-712 payment authorizations.
///
/// EVM nonces are random 32-byte values consumed by the settlement
/// contract, so building needs no ledger read.
pub struct EvmSchemeClient {
    signer: PrivateKeySigner,
    config: EvmChainConfig,
    clock: Arc<dyn Clock>,
}

impl EvmSchemeClient {
    pub fn new(signer: PrivateKeySigner, config: EvmChainConfig) -> Self {
        Self {
            signer,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign an authorization whose binding bounds the amount at `amount_bound`.
    pub fn sign_authorization(
        &self,
        requirements: &PaymentRequirements,
        amount_bound: &str,
    ) -> Result<EvmPayload, BuildError> {
        if requirements.network != self.config.network {
            return Err(BuildError::InvalidRequirements(format!(
                "network '{}' is not served by this signer ({})",
                requirements.network, self.config.network
            )));
        }
        let token: Address = requirements.asset.parse().map_err(|e| {
            BuildError::InvalidRequirements(format!("invalid asset '{}': {e}", requirements.asset))
        })?;
        let destination: Address = requirements.pay_to.parse().map_err(|e| {
            BuildError::InvalidRequirements(format!("invalid payTo '{}': {e}", requirements.pay_to))
        })?;
        parse_atomic_amount(amount_bound)
            .map_err(|_| BuildError::InvalidAmount(amount_bound.to_string()))?;

        let now = self.clock.now_unix();
        let authorization = EvmAuthorization {
            from: self.signer.address(),
            token,
            nonce: random_nonce(),
            destination,
            amount_bound: amount_bound.to_string(),
            valid_after: now.saturating_sub(VALID_AFTER_SKEW),
            valid_before: now.saturating_add(requirements.max_timeout_seconds),
            extra: requirements
                .extra_str("resourceId")
                .map(|id| Bytes::copy_from_slice(id.as_bytes()))
                .unwrap_or_default(),
        };

        let typed = authorization
            .to_typed()
            .map_err(|_| BuildError::InvalidAmount(amount_bound.to_string()))?;
        let sig = self
            .signer
            .sign_hash_sync(&signing_hash(&typed, &self.config))
            .map_err(|e| BuildError::Signing(e.to_string()))?;

        Ok(EvmPayload {
            authorization,
            signature: encode_signature_hex(&sig),
            permit: None,
        })
    }

    /// Sign an authorization and carry an EIP-2612 permit alongside it, so
    /// settlement can approve the contract in the same transaction.
    ///
    /// The permit must approve at least `amount_bound`.
    pub fn sign_authorization_with_permit(
        &self,
        requirements: &PaymentRequirements,
        amount_bound: &str,
        permit: EvmPermit,
    ) -> Result<EvmPayload, BuildError> {
        let mut payload = self.sign_authorization(requirements, amount_bound)?;
        let approved = parse_atomic_amount(&permit.value)
            .map_err(|_| BuildError::InvalidAmount(permit.value.clone()))?;
        let bound = parse_atomic_amount(amount_bound)
            .map_err(|_| BuildError::InvalidAmount(amount_bound.to_string()))?;
        if approved < bound {
            return Err(BuildError::InvalidAmount(format!(
                "permit value {approved} is below the amount bound {bound}"
            )));
        }
        payload.permit = Some(permit);
        Ok(payload)
    }
}

#[async_trait]
impl SchemeClient for EvmSchemeClient {
    fn scheme(&self) -> &str {
        SCHEME_EXACT
    }

    async fn create_payment_payload(
        &self,
        x402_version: u32,
        requirements: &PaymentRequirements,
        deadline: Deadline,
    ) -> Result<PaymentPayload, BuildError> {
        if deadline.is_elapsed() {
            return Err(BuildError::DeadlineElapsed);
        }
        let payload = self.sign_authorization(requirements, &requirements.amount)?;
        tracing::debug!(
            payer = %payload.authorization.from,
            destination = %payload.authorization.destination,
            amount = %payload.authorization.amount_bound,
            "signed EVM authorization"
        );

        Ok(PaymentPayload {
            x402_version,
            accepted: Some(requirements.clone()),
            payload: payload
                .to_value()
                .map_err(|e| BuildError::Signing(e.to_string()))?,
        })
    }
}
