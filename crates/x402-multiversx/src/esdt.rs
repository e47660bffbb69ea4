//! Transaction data field codec.
//!
//! Token transfers are a zero-value call to the sender itself:
//!
//! ```text
//! MultiESDTNFTTransfer@<dest hex>@01@<token hex>@<token nonce hex>@<amount hex>[@args...]
//! ```
//!
//! The canonical binding bytes are always the last `@` argument, for native
//! and token transfers alike, so the payer's transaction signature covers them.

use alloy::primitives::U256;
use thiserror::Error;
use x402::binding::BindingDecodeError;
use x402::Binding;

use crate::address::Address;

pub const MULTI_ESDT_TRANSFER: &str = "MultiESDTNFTTransfer";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DataError {
    #[error("data is not a {MULTI_ESDT_TRANSFER} call")]
    NotMultiTransfer,
    #[error("transfer call needs at least 6 fields, got {0}")]
    TooFewFields(usize),
    #[error("field '{0}' is not valid hex")]
    InvalidHex(&'static str),
    #[error("destination must be a 32-byte public key")]
    InvalidDestination,
    #[error("only single-asset transfers are supported, got {0}")]
    UnsupportedTransferCount(u64),
    #[error("token identifier is not utf-8")]
    InvalidToken,
    #[error("numeric field '{0}' overflows")]
    Overflow(&'static str),
    #[error("data field carries no binding")]
    MissingBinding,
    #[error(transparent)]
    Binding(#[from] BindingDecodeError),
}

/// A single-asset `MultiESDTNFTTransfer` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsdtTransfer {
    /// Logical recipient of the tokens.
    pub destination: Address,
    pub token: String,
    /// 0 for fungible tokens.
    pub token_nonce: u64,
    pub amount: U256,
    /// Pre-encoded trailing arguments (hex, without `@`).
    pub arguments: Vec<String>,
}

/// Minimal even-length hex of a number; zero encodes as `00`.
fn even_hex(value: impl std::fmt::LowerHex) -> String {
    let h = format!("{value:x}");
    if h.len() % 2 == 1 {
        format!("0{h}")
    } else {
        h
    }
}

fn decode_hex(field: &'static str, s: &str) -> Result<Vec<u8>, DataError> {
    hex::decode(s).map_err(|_| DataError::InvalidHex(field))
}

impl EsdtTransfer {
    pub fn encode(&self) -> String {
        let mut data = format!(
            "{MULTI_ESDT_TRANSFER}@{}@01@{}@{}@{}",
            hex::encode(self.destination.as_bytes()),
            hex::encode(self.token.as_bytes()),
            even_hex(self.token_nonce),
            even_hex(self.amount),
        );
        for arg in &self.arguments {
            data.push('@');
            data.push_str(arg);
        }
        data
    }

    pub fn decode(data: &str) -> Result<Self, DataError> {
        let parts: Vec<&str> = data.split('@').collect();
        if parts[0] != MULTI_ESDT_TRANSFER {
            return Err(DataError::NotMultiTransfer);
        }
        if parts.len() < 6 {
            return Err(DataError::TooFewFields(parts.len()));
        }

        let dest: [u8; 32] = decode_hex("destination", parts[1])?
            .try_into()
            .map_err(|_| DataError::InvalidDestination)?;

        let count = be_u64("count", &decode_hex("count", parts[2])?)?;
        if count != 1 {
            return Err(DataError::UnsupportedTransferCount(count));
        }

        let token = String::from_utf8(decode_hex("token", parts[3])?)
            .map_err(|_| DataError::InvalidToken)?;
        let token_nonce = be_u64("token nonce", &decode_hex("token nonce", parts[4])?)?;

        let amount_bytes = decode_hex("amount", parts[5])?;
        if amount_bytes.len() > 32 {
            return Err(DataError::Overflow("amount"));
        }
        let amount = U256::from_be_slice(&amount_bytes);

        Ok(Self {
            destination: Address::from_bytes(dest),
            token,
            token_nonce,
            amount,
            arguments: parts[6..].iter().map(|s| s.to_string()).collect(),
        })
    }
}

fn be_u64(field: &'static str, bytes: &[u8]) -> Result<u64, DataError> {
    if bytes.len() > 8 {
        return Err(DataError::Overflow(field));
    }
    Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

/// Append the binding as the final `@` argument of `data`.
pub fn append_binding(data: &str, binding: &Binding) -> Result<String, BindingDecodeError> {
    let encoded = hex::encode(binding.to_bytes()?);
    Ok(if data.is_empty() {
        encoded
    } else {
        format!("{data}@{encoded}")
    })
}

/// Split `data` into the call prefix and the trailing binding.
pub fn split_binding(data: &str) -> Result<(&str, Binding), DataError> {
    let (prefix, last) = data.rsplit_once('@').unwrap_or(("", data));
    if last.is_empty() {
        return Err(DataError::MissingBinding);
    }
    let bytes = hex::decode(last).map_err(|_| DataError::MissingBinding)?;
    Ok((prefix, Binding::from_bytes(&bytes)?))
}
