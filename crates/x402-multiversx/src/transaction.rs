//! Wire form of a signed MultiversX transaction and its canonical signing bytes.

use alloy::primitives::U256;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::address::Address;

/// The authorization a payer hands to the facilitator: a complete transfer
/// transaction, signed by the payer, with the binding in `data`.
///
/// `data` travels as plain text here. The gateway and the signing bytes use
/// its base64 form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub nonce: u64,
    /// Native value in atomic units, decimal.
    pub value: String,
    pub receiver: Address,
    pub sender: Address,
    pub gas_price: u64,
    pub gas_limit: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data: String,
    #[serde(rename = "chainID")]
    pub chain_id: String,
    pub version: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub options: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relayer: Option<Address>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub relayer_signature: String,
    /// Mirrors of the binding window, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_after: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_before: Option<u64>,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

fn is_blank(s: &&str) -> bool {
    s.is_empty()
}

/// Field order of this struct is the canonical signing order.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SigningView<'a> {
    nonce: u64,
    value: &'a str,
    receiver: String,
    sender: String,
    gas_price: u64,
    gas_limit: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(rename = "chainID")]
    chain_id: &'a str,
    version: u32,
    #[serde(skip_serializing_if = "is_zero")]
    options: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    relayer: Option<String>,
}

/// Body accepted by the gateway's send and simulate endpoints.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GatewayBody<'a> {
    nonce: u64,
    value: &'a str,
    receiver: String,
    sender: String,
    gas_price: u64,
    gas_limit: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(rename = "chainID")]
    chain_id: &'a str,
    version: u32,
    #[serde(skip_serializing_if = "is_zero")]
    options: u32,
    #[serde(skip_serializing_if = "is_blank")]
    signature: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    relayer: Option<String>,
    #[serde(skip_serializing_if = "is_blank")]
    relayer_signature: &'a str,
}

impl Transaction {
    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn value_atomic(&self) -> Option<U256> {
        if self.value.is_empty() || !self.value.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        U256::from_str_radix(&self.value, 10).ok()
    }

    pub fn is_relayed(&self) -> bool {
        self.relayer.is_some()
    }

    fn data_base64(&self) -> Option<String> {
        (!self.data.is_empty()).then(|| BASE64.encode(self.data.as_bytes()))
    }

    /// Bytes both the sender and the relayer sign. Signatures are excluded,
    /// so the relayer co-signs exactly what the payer signed.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&SigningView {
            nonce: self.nonce,
            value: &self.value,
            receiver: self.receiver.to_bech32(),
            sender: self.sender.to_bech32(),
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            data: self.data_base64(),
            chain_id: &self.chain_id,
            version: self.version,
            options: self.options,
            relayer: self.relayer.map(|r| r.to_bech32()),
        })
    }

    /// JSON body for `/transaction/send` and `/transaction/simulate`.
    pub fn gateway_body(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(GatewayBody {
            nonce: self.nonce,
            value: &self.value,
            receiver: self.receiver.to_bech32(),
            sender: self.sender.to_bech32(),
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            data: self.data_base64(),
            chain_id: &self.chain_id,
            version: self.version,
            options: self.options,
            signature: &self.signature,
            relayer: self.relayer.map(|r| r.to_bech32()),
            relayer_signature: &self.relayer_signature,
        })
    }
}
