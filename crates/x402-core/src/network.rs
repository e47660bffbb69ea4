//! CAIP-2 network identifiers (`<family>:<reference>`).
//!
//! The family selects the ledger implementation (`eip155`, `multiversx`),
//! the reference selects the chain within it (`8453`, `D`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::X402Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Network {
    family: String,
    reference: String,
}

impl Network {
    pub fn new(family: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            reference: reference.into(),
        }
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Pattern matching every chain of this network's family, e.g. `multiversx:*`.
    pub fn family_wildcard(&self) -> String {
        format!("{}:*", self.family)
    }
}

impl FromStr for Network {
    type Err = X402Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((family, reference))
                if !family.is_empty()
                    && !reference.is_empty()
                    && !reference.contains(':')
                    && family
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') =>
            {
                Ok(Network::new(family, reference))
            }
            _ => Err(X402Error::UnsupportedNetwork(format!(
                "'{s}' is not a CAIP-2 identifier"
            ))),
        }
    }
}

impl TryFrom<String> for Network {
    type Error = X402Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Network> for String {
    fn from(n: Network) -> Self {
        n.to_string()
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.family, self.reference)
    }
}
