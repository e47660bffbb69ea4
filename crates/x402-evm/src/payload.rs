//! Wire format of an EVM authorization (the `payload` field of a
//! [`x402::PaymentPayload`]).

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use x402::{parse_atomic_amount, X402Error};

use crate::{Binding, PaymentAuthorization, Permit, TransferDescriptor};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmAuthorization {
    pub from: Address,
    pub token: Address,
    pub nonce: B256,
    pub destination: Address,
    /// Atomic units, decimal string.
    pub amount_bound: String,
    pub valid_after: u64,
    pub valid_before: u64,
    #[serde(default)]
    pub extra: Bytes,
}

/// EIP-2612 approval signed by the payer for the settlement contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmPermit {
    pub value: String,
    pub deadline: u64,
    pub v: u8,
    pub r: B256,
    pub s: B256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmPayload {
    pub authorization: EvmAuthorization,
    /// 0x-prefixed hex. 65 bytes for EOAs, anything else for contract wallets.
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permit: Option<EvmPermit>,
}

impl EvmPayload {
    pub fn from_value(value: &serde_json::Value) -> Result<Self, X402Error> {
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn to_value(&self) -> Result<serde_json::Value, X402Error> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn signature_bytes(&self) -> Result<Vec<u8>, X402Error> {
        let hex = self
            .signature
            .strip_prefix("0x")
            .unwrap_or(&self.signature);
        alloy::hex::decode(hex)
            .map_err(|e| X402Error::SignatureError(format!("invalid hex signature: {e}")))
    }
}

impl EvmAuthorization {
    pub fn amount_bound(&self) -> Result<U256, X402Error> {
        parse_atomic_amount(&self.amount_bound)
    }

    pub fn typed_transfer(&self) -> TransferDescriptor {
        TransferDescriptor {
            token: self.token,
            nonce: self.nonce,
        }
    }

    pub fn typed_binding(&self) -> Result<Binding, X402Error> {
        Ok(Binding {
            destination: self.destination,
            amountBound: self.amount_bound()?,
            validAfter: U256::from(self.valid_after),
            validBefore: U256::from(self.valid_before),
            extra: self.extra.clone(),
        })
    }

    /// The EIP-712 message exactly as the payer signed it.
    pub fn to_typed(&self) -> Result<PaymentAuthorization, X402Error> {
        Ok(PaymentAuthorization {
            from: self.from,
            transfer: self.typed_transfer(),
            binding: self.typed_binding()?,
        })
    }

    /// Ledger-agnostic view of the binding.
    pub fn binding(&self) -> Result<x402::Binding, X402Error> {
        Ok(x402::Binding {
            destination: self.destination.to_vec(),
            amount_bound: self.amount_bound()?,
            valid_after: self.valid_after,
            valid_before: self.valid_before,
            extra: self.extra.to_vec(),
        })
    }
}

impl EvmPermit {
    pub fn to_typed(&self) -> Result<Permit, X402Error> {
        Ok(Permit {
            value: parse_atomic_amount(&self.value)?,
            deadline: U256::from(self.deadline),
            v: self.v,
            r: self.r,
            s: self.s,
        })
    }
}
