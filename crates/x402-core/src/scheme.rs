//! Capability traits for the three-party payment model.
//!
//! - [`SchemeClient`]: payer side, builds signed authorizations
//! - [`SchemeFacilitator`]: verifies and settles authorizations
//! - [`SchemeServer`]: negotiates and validates requirements
//!
//! Each ledger family provides one implementation of each. The traits are
//! object safe so a [`crate::registry::SchemeRegistry`] can hold them as
//! `Arc<dyn ...>` without branching on the family anywhere in shared code.

use async_trait::async_trait;

use crate::error::{BuildError, X402Error};
use crate::finality::Deadline;
use crate::payment::{AssetAmount, PaymentPayload, PaymentRequirements};
use crate::registry::SupportedKind;
use crate::response::{SettleResponse, VerifyResponse};

/// Client-side scheme: creates signed payment payloads.
#[async_trait]
pub trait SchemeClient: Send + Sync {
    fn scheme(&self) -> &str;

    /// Build a signed authorization for an already validated requirement.
    ///
    /// Performs at most one ledger read (the payer's sequence number) and one
    /// signature request. Never broadcasts.
    async fn create_payment_payload(
        &self,
        x402_version: u32,
        requirements: &PaymentRequirements,
        deadline: Deadline,
    ) -> Result<PaymentPayload, BuildError>;
}

/// Facilitator-side scheme: verifies and settles payments.
///
/// Expected invalidity is reported through the response values, never as
/// `Err`. `Err` is reserved for faults of the facilitator itself.
#[async_trait]
pub trait SchemeFacilitator: Send + Sync {
    fn scheme(&self) -> &str;

    /// Network pattern served, e.g. `eip155:*` or `multiversx:D`.
    fn caip_family(&self) -> String;

    /// Scheme-specific extra parameters advertised by `/supported`.
    fn extra(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        None
    }

    /// Addresses this facilitator pays fees from.
    fn signers(&self) -> Vec<String>;

    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
        deadline: Deadline,
    ) -> Result<VerifyResponse, X402Error>;

    /// Settle on the ledger. Re-verifies first since the window may have
    /// closed since the last verify.
    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
        deadline: Deadline,
    ) -> Result<SettleResponse, X402Error>;
}

/// Server-side scheme: turns a resolved price into a requirement.
pub trait SchemeServer: Send + Sync {
    fn scheme(&self) -> &str;

    /// Network this negotiator issues requirements for.
    fn network(&self) -> &str;

    /// Structural checks: destination grammar, integer amount, asset grammar.
    fn validate(&self, requirements: &PaymentRequirements) -> Result<(), X402Error>;

    /// Add scheme defaults without overwriting keys already present.
    /// Validates first; an invalid requirement is never enhanced.
    fn enhance(
        &self,
        requirements: PaymentRequirements,
        kind: Option<&SupportedKind>,
    ) -> Result<PaymentRequirements, X402Error>;

    /// Build, validate and enhance a requirement for `price`.
    fn requirements_for(
        &self,
        price: &AssetAmount,
        pay_to: &str,
        max_timeout_seconds: u64,
        kind: Option<&SupportedKind>,
    ) -> Result<PaymentRequirements, X402Error> {
        let requirements = PaymentRequirements {
            scheme: self.scheme().to_string(),
            network: self.network().to_string(),
            asset: price.asset.clone(),
            amount: price.amount.clone(),
            pay_to: pay_to.to_string(),
            max_timeout_seconds,
            extra: Default::default(),
        };
        self.enhance(requirements, kind)
    }
}
