//! The binding construct: destination, amount bound and validity window
//! folded into the signed digest so none of them can change after signing.
//!
//! Ledgers with typed-data signing carry the binding as a typed sub-struct
//! (see the EVM family). Ledgers that sign raw transaction bytes embed
//! [`Binding::to_bytes`] in the transaction's data field, so the
//! transaction signature covers it.
//!
//! Canonical encoding, all integers big-endian:
//!
//! ```text
//! BINDING_DOMAIN | u16 len | destination | u256 amount_bound
//!                | u64 valid_after | u64 valid_before | u32 len | extra
//! ```
//!
//! `extra` is always length-prefixed, so an empty extra and an absent extra
//! cannot encode identically to a binding carrying extra bytes.

use alloy::primitives::{B256, U256};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::constants::BINDING_DOMAIN;
use crate::ErrorKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Raw destination identifier (address or public key bytes), always the
    /// logical recipient of funds.
    pub destination: Vec<u8>,
    pub amount_bound: U256,
    pub valid_after: u64,
    pub valid_before: u64,
    pub extra: Vec<u8>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindingDecodeError {
    #[error("missing binding domain tag")]
    BadDomain,
    #[error("binding truncated at {0}")]
    Truncated(&'static str),
    #[error("{0} trailing bytes after binding")]
    TrailingBytes(usize),
    #[error("binding field too large: {0}")]
    TooLarge(&'static str),
}

impl Binding {
    pub fn to_bytes(&self) -> Result<Vec<u8>, BindingDecodeError> {
        let dest_len = u16::try_from(self.destination.len())
            .map_err(|_| BindingDecodeError::TooLarge("destination"))?;
        let extra_len =
            u32::try_from(self.extra.len()).map_err(|_| BindingDecodeError::TooLarge("extra"))?;

        let mut out = Vec::with_capacity(
            BINDING_DOMAIN.len() + 2 + self.destination.len() + 32 + 16 + 4 + self.extra.len(),
        );
        out.extend_from_slice(BINDING_DOMAIN);
        out.extend_from_slice(&dest_len.to_be_bytes());
        out.extend_from_slice(&self.destination);
        out.extend_from_slice(&self.amount_bound.to_be_bytes::<32>());
        out.extend_from_slice(&self.valid_after.to_be_bytes());
        out.extend_from_slice(&self.valid_before.to_be_bytes());
        out.extend_from_slice(&extra_len.to_be_bytes());
        out.extend_from_slice(&self.extra);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BindingDecodeError> {
        let mut r = Reader(bytes);
        if r.take(BINDING_DOMAIN.len(), "domain")? != BINDING_DOMAIN {
            return Err(BindingDecodeError::BadDomain);
        }
        let dest_len = u16::from_be_bytes(r.array("destination length")?) as usize;
        let destination = r.take(dest_len, "destination")?.to_vec();
        let amount_bound = U256::from_be_bytes::<32>(r.array("amount bound")?);
        let valid_after = u64::from_be_bytes(r.array("valid after")?);
        let valid_before = u64::from_be_bytes(r.array("valid before")?);
        let extra_len = u32::from_be_bytes(r.array("extra length")?) as usize;
        let extra = r.take(extra_len, "extra")?.to_vec();
        if !r.0.is_empty() {
            return Err(BindingDecodeError::TrailingBytes(r.0.len()));
        }
        Ok(Self {
            destination,
            amount_bound,
            valid_after,
            valid_before,
            extra,
        })
    }

    /// Domain-separated SHA-256 of the canonical encoding.
    pub fn hash(&self) -> Result<B256, BindingDecodeError> {
        Ok(B256::from_slice(&Sha256::digest(self.to_bytes()?)))
    }

    pub fn check_window(&self, now: u64) -> Result<(), ErrorKind> {
        check_window(self.valid_after, self.valid_before, now)
    }

    /// Fails with `AmountExceedsPermitted` if `requested` is above the bound.
    pub fn check_amount(&self, requested: U256) -> Result<(), ErrorKind> {
        if requested > self.amount_bound {
            return Err(ErrorKind::AmountExceedsPermitted);
        }
        Ok(())
    }
}

/// Inclusive window check: `valid_after <= now <= valid_before`.
pub fn check_window(valid_after: u64, valid_before: u64, now: u64) -> Result<(), ErrorKind> {
    if now > valid_before {
        return Err(ErrorKind::PaymentExpired);
    }
    if now < valid_after {
        return Err(ErrorKind::PaymentTooEarly);
    }
    Ok(())
}

struct Reader<'a>(&'a [u8]);

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], BindingDecodeError> {
        if self.0.len() < n {
            return Err(BindingDecodeError::Truncated(field));
        }
        let (head, tail) = self.0.split_at(n);
        self.0 = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], BindingDecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Binding {
        Binding {
            destination: vec![0xaa; 32],
            amount_bound: U256::from(100u64),
            valid_after: 1_000,
            valid_before: 4_600,
            extra: vec![],
        }
    }

    #[test]
    fn encode_decode() {
        let b = Binding {
            extra: b"resource-42".to_vec(),
            ..sample()
        };
        let bytes = b.to_bytes().unwrap();
        assert!(bytes.starts_with(BINDING_DOMAIN));
        assert_eq!(Binding::from_bytes(&bytes).unwrap(), b);
    }

    #[test]
    fn destination_changes_hash() {
        let a = sample();
        let mut b = sample();
        b.destination[31] ^= 1;
        assert_ne!(a.hash().unwrap(), b.hash().unwrap());
    }

    #[test]
    fn empty_extra_is_hashed() {
        let empty = sample();
        let with_extra = Binding {
            extra: vec![0],
            ..sample()
        };
        assert_ne!(empty.hash().unwrap(), with_extra.hash().unwrap());
        // length prefix is present even when extra is empty
        assert_eq!(
            empty.to_bytes().unwrap().len(),
            BINDING_DOMAIN.len() + 2 + 32 + 32 + 8 + 8 + 4
        );
    }

    #[test]
    fn rejects_foreign_and_truncated_bytes() {
        let bytes = sample().to_bytes().unwrap();
        assert_eq!(
            Binding::from_bytes(b"not a binding at all, definitely"),
            Err(BindingDecodeError::BadDomain)
        );
        assert!(matches!(
            Binding::from_bytes(&bytes[..bytes.len() - 1]),
            Err(BindingDecodeError::Truncated(_))
        ));
        let mut longer = bytes.clone();
        longer.push(0);
        assert_eq!(
            Binding::from_bytes(&longer),
            Err(BindingDecodeError::TrailingBytes(1))
        );
    }

    #[test]
    fn window_is_inclusive() {
        let b = sample();
        assert_eq!(b.check_window(999), Err(ErrorKind::PaymentTooEarly));
        assert_eq!(b.check_window(1_000), Ok(()));
        assert_eq!(b.check_window(4_600), Ok(()));
        assert_eq!(b.check_window(4_601), Err(ErrorKind::PaymentExpired));
    }

    #[test]
    fn amount_bound() {
        let b = sample();
        assert_eq!(b.check_amount(U256::ZERO), Ok(()));
        assert_eq!(b.check_amount(U256::from(100u64)), Ok(()));
        assert_eq!(
            b.check_amount(U256::from(101u64)),
            Err(ErrorKind::AmountExceedsPermitted)
        );
    }
}
