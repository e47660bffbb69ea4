//! Bech32 account addresses (`erd1...`).

use std::fmt;
use std::str::FromStr;

use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32, Hrp};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const ADDRESS_HRP: &str = "erd";

/// Length of a bech32-encoded address string.
pub const ADDRESS_LEN: usize = 62;

/// Smart-contract addresses start with this many zero bytes.
const SC_ZERO_PREFIX: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must be {ADDRESS_LEN} characters, got {0}")]
    Length(usize),
    #[error("address must be lowercase")]
    Case,
    #[error("invalid bech32: {0}")]
    Bech32(String),
    #[error("expected hrp '{ADDRESS_HRP}', got '{0}'")]
    Hrp(String),
    #[error("address payload must be 32 bytes, got {0}")]
    PayloadLength(usize),
}

/// A 32-byte account public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 32]);

impl Address {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_bech32(s: &str) -> Result<Self, AddressError> {
        if s.len() != ADDRESS_LEN {
            return Err(AddressError::Length(s.len()));
        }
        if s.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(AddressError::Case);
        }
        let checked = CheckedHrpstring::new::<Bech32>(s)
            .map_err(|e| AddressError::Bech32(e.to_string()))?;
        let hrp = checked.hrp().to_string();
        if hrp != ADDRESS_HRP {
            return Err(AddressError::Hrp(hrp));
        }
        let payload: Vec<u8> = checked.byte_iter().collect();
        let bytes: [u8; 32] = payload
            .as_slice()
            .try_into()
            .map_err(|_| AddressError::PayloadLength(payload.len()))?;
        Ok(Self(bytes))
    }

    pub fn to_bech32(&self) -> String {
        let hrp = Hrp::parse_unchecked(ADDRESS_HRP);
        // A 32-byte payload under a 3-char hrp is far below the bech32 length
        // limit, so encoding cannot fail.
        bech32::encode::<Bech32>(hrp, &self.0).unwrap_or_default()
    }

    /// Contract accounts cannot produce Ed25519 signatures; only the ledger
    /// can judge a transaction they send.
    pub fn is_smart_contract(&self) -> bool {
        self.0[..SC_ZERO_PREFIX].iter().all(|b| *b == 0)
    }
}

pub fn is_valid_address(s: &str) -> bool {
    Address::from_bech32(s).is_ok()
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bech32(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_bech32())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_bech32())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_bech32())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_bech32(&s).map_err(serde::de::Error::custom)
    }
}
