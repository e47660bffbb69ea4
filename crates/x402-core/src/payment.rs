use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::X402Error;

/// A single entry in the `accepts` array of a 402 response: what a resource
/// server will take in exchange for access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    /// CAIP-2 network identifier, e.g. `eip155:8453` or `multiversx:D`.
    pub network: String,
    /// Native ticker or token identifier, in the ledger family's grammar.
    pub asset: String,
    /// Atomic units as a decimal integer string.
    pub amount: String,
    pub pay_to: String,
    pub max_timeout_seconds: u64,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PaymentRequirements {
    /// Requested amount in atomic units.
    pub fn amount_atomic(&self) -> Result<U256, X402Error> {
        parse_atomic_amount(&self.amount)
    }

    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }

    pub fn extra_u64(&self, key: &str) -> Option<u64> {
        self.extra.get(key).and_then(|v| v.as_u64())
    }
}

/// Wire-format payment payload (sent in the PAYMENT-SIGNATURE header,
/// base64-encoded JSON). The inner `payload` is scheme-specific.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted: Option<PaymentRequirements>,
    pub payload: serde_json::Value,
}

/// The 402 response body returned by the resource server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredBody {
    pub x402_version: u32,
    pub accepts: Vec<PaymentRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// An abstract price already resolved to an asset and atomic amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetAmount {
    pub asset: String,
    pub amount: String,
}

/// Parse a non-negative decimal integer string into atomic units.
///
/// Signs, whitespace, hex prefixes and fractional parts are rejected.
pub fn parse_atomic_amount(amount: &str) -> Result<U256, X402Error> {
    if amount.is_empty() || !amount.bytes().all(|b| b.is_ascii_digit()) {
        return Err(X402Error::InvalidPayment(format!(
            "invalid amount '{amount}': expected a non-negative integer string"
        )));
    }
    U256::from_str_radix(amount, 10)
        .map_err(|e| X402Error::InvalidPayment(format!("invalid amount '{amount}': {e}")))
}

/// Convert a money price such as `"$0.001"` or `"1.5 USD"` into atomic units
/// of a token with `decimals` decimals, using integer arithmetic only.
/// Fractional digits beyond the token's precision are dropped.
///
/// Accepts an optional leading `$` and an optional trailing currency ticker.
/// Signs, exponents and separators are rejected.
pub fn parse_money_amount(price: &str, decimals: u32) -> Result<U256, X402Error> {
    let bad = |why: &str| X402Error::InvalidPayment(format!("invalid price '{price}': {why}"));

    let trimmed = price.trim();
    let unprefixed = trimmed.strip_prefix('$').unwrap_or(trimmed);
    let numeric = unprefixed
        .trim_end_matches(|c: char| c.is_ascii_alphabetic())
        .trim_end();
    if numeric.is_empty() || !numeric.bytes().any(|b| b.is_ascii_digit()) {
        return Err(bad("no numeric content"));
    }
    if let Some(c) = numeric.chars().find(|c| !c.is_ascii_digit() && *c != '.') {
        return Err(bad(&format!("unexpected character '{c}'")));
    }

    let (whole, frac) = numeric.split_once('.').unwrap_or((numeric, ""));
    if frac.contains('.') {
        return Err(bad("more than one decimal point"));
    }
    let frac = &frac[..frac.len().min(decimals as usize)];
    let padded = format!("{frac:0<width$}", width = decimals as usize);

    let digits = |s: &str| -> Result<U256, X402Error> {
        if s.is_empty() {
            return Ok(U256::ZERO);
        }
        U256::from_str_radix(s, 10)
            .map_err(|e| X402Error::InvalidPayment(format!("invalid price '{price}': {e}")))
    };
    let overflow = || X402Error::InvalidPayment(format!("invalid price '{price}': overflow"));

    let multiplier = U256::from(10u64)
        .checked_pow(U256::from(decimals))
        .ok_or_else(overflow)?;
    digits(whole)?
        .checked_mul(multiplier)
        .ok_or_else(overflow)?
        .checked_add(digits(&padded)?)
        .ok_or_else(overflow)
}
