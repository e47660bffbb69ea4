//! Requirement selection: filter to registered builders, apply ordered
//! policies, then let a selector pick exactly one.

use alloy::primitives::U256;
use thiserror::Error;

use crate::error::{BuildError, ErrorKind};
use crate::finality::Deadline;
use crate::payment::{parse_atomic_amount, PaymentPayload, PaymentRequirements};
use crate::registry::SchemeRegistry;

/// Ordered filter/transform applied to the remaining candidates.
pub trait SelectionPolicy: Send + Sync {
    fn apply(&self, candidates: Vec<PaymentRequirements>) -> Vec<PaymentRequirements>;
}

/// Picks one candidate out of the policy output.
pub trait Selector: Send + Sync {
    fn select(&self, candidates: &[PaymentRequirements]) -> Option<usize>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FirstMatch;

impl Selector for FirstMatch {
    fn select(&self, candidates: &[PaymentRequirements]) -> Option<usize> {
        if candidates.is_empty() {
            None
        } else {
            Some(0)
        }
    }
}

/// Moves candidates on `network` to the front, keeping relative order.
#[derive(Debug, Clone)]
pub struct PreferNetwork(pub String);

impl SelectionPolicy for PreferNetwork {
    fn apply(&self, candidates: Vec<PaymentRequirements>) -> Vec<PaymentRequirements> {
        let (mut preferred, rest): (Vec<_>, Vec<_>) =
            candidates.into_iter().partition(|c| c.network == self.0);
        preferred.extend(rest);
        preferred
    }
}

/// Stable sort by atomic amount, ascending. Only meaningful between
/// candidates of the same asset; unparseable amounts sort last.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferCheapest;

impl SelectionPolicy for PreferCheapest {
    fn apply(&self, mut candidates: Vec<PaymentRequirements>) -> Vec<PaymentRequirements> {
        candidates.sort_by_key(|c| parse_atomic_amount(&c.amount).unwrap_or(U256::MAX));
        candidates
    }
}

/// Drops candidates asking for more than the payer is willing to sign.
#[derive(Debug, Clone, Copy)]
pub struct MaxAmount(pub U256);

impl SelectionPolicy for MaxAmount {
    fn apply(&self, candidates: Vec<PaymentRequirements>) -> Vec<PaymentRequirements> {
        candidates
            .into_iter()
            .filter(|c| parse_atomic_amount(&c.amount).is_ok_and(|a| a <= self.0))
            .collect()
    }
}

pub struct Selection {
    policies: Vec<Box<dyn SelectionPolicy>>,
    selector: Box<dyn Selector>,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            policies: Vec::new(),
            selector: Box::new(FirstMatch),
        }
    }
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn policy(mut self, policy: impl SelectionPolicy + 'static) -> Self {
        self.policies.push(Box::new(policy));
        self
    }

    pub fn selector(mut self, selector: impl Selector + 'static) -> Self {
        self.selector = Box::new(selector);
        self
    }

    fn choose(&self, candidates: Vec<PaymentRequirements>) -> Option<PaymentRequirements> {
        let mut candidates = candidates;
        for policy in &self.policies {
            candidates = policy.apply(candidates);
        }
        let index = self.selector.select(&candidates)?;
        candidates.into_iter().nth(index)
    }
}

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("no offered requirement matches a registered scheme")]
    NoMatchingScheme,
    #[error(transparent)]
    Build(#[from] BuildError),
}

impl SelectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SelectError::NoMatchingScheme => ErrorKind::NoMatchingScheme,
            SelectError::Build(e) => e.kind(),
        }
    }
}

impl SchemeRegistry {
    /// Pick one of `accepts`. Empty after filtering is terminal, not retryable.
    pub fn select(
        &self,
        version: u32,
        accepts: &[PaymentRequirements],
        selection: &Selection,
    ) -> Result<PaymentRequirements, SelectError> {
        let supported: Vec<PaymentRequirements> = accepts
            .iter()
            .filter(|r| self.client(version, &r.network, &r.scheme).is_some())
            .cloned()
            .collect();
        selection.choose(supported).ok_or_else(|| {
            tracing::warn!(offered = accepts.len(), "no matching scheme for offered requirements");
            SelectError::NoMatchingScheme
        })
    }

    /// Select a requirement and have its registered builder sign it.
    pub async fn create_payment(
        &self,
        version: u32,
        accepts: &[PaymentRequirements],
        selection: &Selection,
        deadline: Deadline,
    ) -> Result<PaymentPayload, SelectError> {
        let chosen = self.select(version, accepts, selection)?;
        let client = self
            .client(version, &chosen.network, &chosen.scheme)
            .ok_or(SelectError::NoMatchingScheme)?;
        tracing::debug!(network = %chosen.network, scheme = %chosen.scheme, "building payment");
        Ok(client
            .create_payment_payload(version, &chosen, deadline)
            .await?)
    }
}
