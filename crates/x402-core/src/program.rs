//! Ledger-side settlement program.
//!
//! A ledger-independent model of the on-ledger entry points `settle` and
//! `settle_with_permit`, run against an [`AssetLedger`]. The program pulls
//! exactly `requested` from the payer and forwards it to the binding's
//! destination in the same call, so its own balance of the asset is the
//! same on exit as on entry. A busy flag rejects re-entry from transfer
//! hooks. Replay protection is the ledger's nonce table, consumed before
//! any funds move.

use std::sync::{Arc, RwLock};

use alloy::primitives::{B256, U256};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::binding::{Binding, BindingDecodeError};
use crate::guard::ExecutionGuard;
use crate::ErrorKind;

const AUTHORIZATION_DOMAIN: &[u8] = b"x402:authorization:v1";
const PERMIT_DOMAIN: &[u8] = b"x402:permit:v1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgramError {
    #[error("settlement program re-entered")]
    Reentrant,
    #[error("authorization not yet valid")]
    TooEarly,
    #[error("authorization expired")]
    Expired,
    #[error("requested amount exceeds binding bound")]
    AmountExceedsPermitted,
    #[error("invalid authorization signature")]
    InvalidSignature,
    #[error("nonce already consumed")]
    NonceUsed,
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("insufficient allowance")]
    InsufficientAllowance,
    #[error("invalid permit: {0}")]
    InvalidPermit(&'static str),
    #[error("program balance changed during settlement")]
    CustodyViolation,
    #[error(transparent)]
    Binding(#[from] BindingDecodeError),
}

impl ProgramError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProgramError::Reentrant => ErrorKind::Reentrant,
            ProgramError::TooEarly => ErrorKind::PaymentTooEarly,
            ProgramError::Expired => ErrorKind::PaymentExpired,
            ProgramError::AmountExceedsPermitted => ErrorKind::AmountExceedsPermitted,
            ProgramError::InvalidSignature => ErrorKind::InvalidSignature,
            ProgramError::Binding(_) => ErrorKind::InvalidPayload,
            _ => ErrorKind::ExecutionFailed,
        }
    }
}

impl From<ErrorKind> for ProgramError {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::PaymentTooEarly => ProgramError::TooEarly,
            ErrorKind::PaymentExpired => ProgramError::Expired,
            ErrorKind::AmountExceedsPermitted => ProgramError::AmountExceedsPermitted,
            ErrorKind::Reentrant => ProgramError::Reentrant,
            _ => ProgramError::InvalidSignature,
        }
    }
}

/// Asset and single-use nonce of an authorized transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDescriptor {
    pub asset: String,
    pub nonce: B256,
}

/// Off-ledger signed approval letting `spender` pull up to `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permit {
    pub value: U256,
    pub deadline: u64,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleReceipt {
    pub payer: Vec<u8>,
    pub destination: Vec<u8>,
    pub amount: U256,
}

/// Checks a signature by `signer` over a 32-byte digest.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, signer: &[u8], digest: &B256, signature: &[u8]) -> bool;
}

/// The asset ledger the program runs against.
pub trait AssetLedger: Send + Sync {
    fn balance_of(&self, asset: &str, account: &[u8]) -> U256;

    fn allowance(&self, asset: &str, owner: &[u8], spender: &[u8]) -> U256;

    /// Move funds owned by `from`. The ledger may call out to the recipient.
    fn transfer(&self, asset: &str, from: &[u8], to: &[u8], amount: U256)
        -> Result<(), ProgramError>;

    /// Move funds from `owner` to `to` against `spender`'s allowance.
    fn transfer_from(
        &self,
        asset: &str,
        spender: &[u8],
        owner: &[u8],
        to: &[u8],
        amount: U256,
    ) -> Result<(), ProgramError>;

    /// Mark `(payer, nonce)` consumed. Fails with `NonceUsed` the second time.
    fn consume_nonce(&self, payer: &[u8], nonce: B256) -> Result<(), ProgramError>;

    fn permit(
        &self,
        asset: &str,
        owner: &[u8],
        spender: &[u8],
        permit: &Permit,
        now: u64,
    ) -> Result<(), ProgramError>;
}

fn put_prefixed(h: &mut Sha256, bytes: &[u8]) {
    h.update((bytes.len() as u32).to_be_bytes());
    h.update(bytes);
}

/// Digest the payer signs: transfer descriptor, payer and binding together.
pub fn authorization_digest(
    transfer: &TransferDescriptor,
    payer: &[u8],
    binding: &Binding,
) -> Result<B256, BindingDecodeError> {
    let mut h = Sha256::new();
    h.update(AUTHORIZATION_DOMAIN);
    put_prefixed(&mut h, transfer.asset.as_bytes());
    h.update(transfer.nonce);
    put_prefixed(&mut h, payer);
    h.update(binding.to_bytes()?);
    Ok(B256::from_slice(&h.finalize()))
}

pub fn permit_digest(
    asset: &str,
    owner: &[u8],
    spender: &[u8],
    value: U256,
    nonce: u64,
    deadline: u64,
) -> B256 {
    let mut h = Sha256::new();
    h.update(PERMIT_DOMAIN);
    put_prefixed(&mut h, asset.as_bytes());
    put_prefixed(&mut h, owner);
    put_prefixed(&mut h, spender);
    h.update(value.to_be_bytes::<32>());
    h.update(nonce.to_be_bytes());
    h.update(deadline.to_be_bytes());
    B256::from_slice(&h.finalize())
}

pub struct SettlementProgram {
    address: Vec<u8>,
    ledger: Arc<dyn AssetLedger>,
    verifier: Arc<dyn SignatureVerifier>,
    guard: ExecutionGuard,
}

impl SettlementProgram {
    pub fn new(
        address: impl Into<Vec<u8>>,
        ledger: Arc<dyn AssetLedger>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            address: address.into(),
            ledger,
            verifier,
            guard: ExecutionGuard::new(),
        }
    }

    pub fn address(&self) -> &[u8] {
        &self.address
    }

    /// Pull `requested` from `payer` and forward it to the binding
    /// destination. The payer must have approved the program beforehand.
    pub fn settle(
        &self,
        transfer: &TransferDescriptor,
        requested: U256,
        payer: &[u8],
        binding: &Binding,
        signature: &[u8],
        now: u64,
    ) -> Result<SettleReceipt, ProgramError> {
        let _ticket = self.guard.enter()?;
        self.execute(transfer, requested, payer, binding, signature, now)
    }

    /// Like [`Self::settle`], applying `permit` as the approval first.
    ///
    /// A permit that fails (for instance because it was already submitted by
    /// someone else) is tolerated when the existing allowance covers the
    /// request.
    #[allow(clippy::too_many_arguments)]
    pub fn settle_with_permit(
        &self,
        transfer: &TransferDescriptor,
        requested: U256,
        payer: &[u8],
        binding: &Binding,
        signature: &[u8],
        permit: &Permit,
        now: u64,
    ) -> Result<SettleReceipt, ProgramError> {
        let _ticket = self.guard.enter()?;
        if let Err(e) = self
            .ledger
            .permit(&transfer.asset, payer, &self.address, permit, now)
        {
            if self.ledger.allowance(&transfer.asset, payer, &self.address) < requested {
                return Err(e);
            }
            tracing::debug!(error = %e, "permit failed, existing allowance suffices");
        }
        self.execute(transfer, requested, payer, binding, signature, now)
    }

    fn execute(
        &self,
        transfer: &TransferDescriptor,
        requested: U256,
        payer: &[u8],
        binding: &Binding,
        signature: &[u8],
        now: u64,
    ) -> Result<SettleReceipt, ProgramError> {
        let asset = transfer.asset.as_str();
        let before = self.ledger.balance_of(asset, &self.address);

        binding.check_window(now)?;
        binding.check_amount(requested)?;

        let digest = authorization_digest(transfer, payer, binding)?;
        if !self.verifier.verify(payer, &digest, signature) {
            return Err(ProgramError::InvalidSignature);
        }

        if self.ledger.balance_of(asset, payer) < requested {
            return Err(ProgramError::InsufficientBalance);
        }
        if self.ledger.allowance(asset, payer, &self.address) < requested {
            return Err(ProgramError::InsufficientAllowance);
        }

        self.ledger.consume_nonce(payer, transfer.nonce)?;

        self.ledger
            .transfer_from(asset, &self.address, payer, &self.address, requested)?;
        self.ledger
            .transfer(asset, &self.address, &binding.destination, requested)?;

        if self.ledger.balance_of(asset, &self.address) != before {
            return Err(ProgramError::CustodyViolation);
        }

        Ok(SettleReceipt {
            payer: payer.to_vec(),
            destination: binding.destination.clone(),
            amount: requested,
        })
    }
}

/// Callback fired after every credit, with `(asset, recipient, amount)`.
pub type TransferHook = Arc<dyn Fn(&str, &[u8], U256) + Send + Sync>;

/// In-process [`AssetLedger`] for tests and local simulation.
pub struct InMemoryLedger {
    balances: DashMap<(String, Vec<u8>), U256>,
    allowances: DashMap<(String, Vec<u8>, Vec<u8>), U256>,
    consumed: DashMap<(Vec<u8>, B256), ()>,
    permit_nonces: DashMap<(String, Vec<u8>), u64>,
    permit_verifier: Arc<dyn SignatureVerifier>,
    hook: RwLock<Option<TransferHook>>,
}

impl InMemoryLedger {
    pub fn new(permit_verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self {
            balances: DashMap::new(),
            allowances: DashMap::new(),
            consumed: DashMap::new(),
            permit_nonces: DashMap::new(),
            permit_verifier,
            hook: RwLock::new(None),
        }
    }

    pub fn mint(&self, asset: &str, account: &[u8], amount: U256) {
        let mut bal = self
            .balances
            .entry((asset.to_string(), account.to_vec()))
            .or_default();
        *bal = bal.saturating_add(amount);
    }

    pub fn approve(&self, asset: &str, owner: &[u8], spender: &[u8], amount: U256) {
        self.allowances
            .insert((asset.to_string(), owner.to_vec(), spender.to_vec()), amount);
    }

    pub fn permit_nonce(&self, asset: &str, owner: &[u8]) -> u64 {
        self.permit_nonces
            .get(&(asset.to_string(), owner.to_vec()))
            .map(|n| *n)
            .unwrap_or(0)
    }

    pub fn set_transfer_hook(&self, hook: TransferHook) {
        if let Ok(mut slot) = self.hook.write() {
            *slot = Some(hook);
        }
    }

    fn fire_hook(&self, asset: &str, to: &[u8], amount: U256) {
        let hook = self.hook.read().ok().and_then(|h| h.clone());
        if let Some(hook) = hook {
            hook(asset, to, amount);
        }
    }
}

impl AssetLedger for InMemoryLedger {
    fn balance_of(&self, asset: &str, account: &[u8]) -> U256 {
        self.balances
            .get(&(asset.to_string(), account.to_vec()))
            .map(|b| *b)
            .unwrap_or(U256::ZERO)
    }

    fn allowance(&self, asset: &str, owner: &[u8], spender: &[u8]) -> U256 {
        self.allowances
            .get(&(asset.to_string(), owner.to_vec(), spender.to_vec()))
            .map(|a| *a)
            .unwrap_or(U256::ZERO)
    }

    fn transfer(
        &self,
        asset: &str,
        from: &[u8],
        to: &[u8],
        amount: U256,
    ) -> Result<(), ProgramError> {
        {
            let mut bal = self
                .balances
                .entry((asset.to_string(), from.to_vec()))
                .or_default();
            if *bal < amount {
                return Err(ProgramError::InsufficientBalance);
            }
            *bal -= amount;
        }
        self.mint(asset, to, amount);
        self.fire_hook(asset, to, amount);
        Ok(())
    }

    fn transfer_from(
        &self,
        asset: &str,
        spender: &[u8],
        owner: &[u8],
        to: &[u8],
        amount: U256,
    ) -> Result<(), ProgramError> {
        {
            let mut allowance = self
                .allowances
                .entry((asset.to_string(), owner.to_vec(), spender.to_vec()))
                .or_default();
            if *allowance < amount {
                return Err(ProgramError::InsufficientAllowance);
            }
            *allowance -= amount;
        }
        self.transfer(asset, owner, to, amount)
    }

    fn consume_nonce(&self, payer: &[u8], nonce: B256) -> Result<(), ProgramError> {
        match self.consumed.entry((payer.to_vec(), nonce)) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ProgramError::NonceUsed),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
                Ok(())
            }
        }
    }

    fn permit(
        &self,
        asset: &str,
        owner: &[u8],
        spender: &[u8],
        permit: &Permit,
        now: u64,
    ) -> Result<(), ProgramError> {
        if now > permit.deadline {
            return Err(ProgramError::InvalidPermit("expired"));
        }
        let mut nonce = self
            .permit_nonces
            .entry((asset.to_string(), owner.to_vec()))
            .or_default();
        let digest = permit_digest(asset, owner, spender, permit.value, *nonce, permit.deadline);
        if !self.permit_verifier.verify(owner, &digest, &permit.signature) {
            return Err(ProgramError::InvalidPermit("bad signature"));
        }
        *nonce += 1;
        drop(nonce);
        self.approve(asset, owner, spender, permit.value);
        Ok(())
    }
}
