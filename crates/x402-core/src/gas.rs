//! Formulaic fee estimation.
//!
//! `gas = base + per_byte * len(data) + per_transfer * transfers + relay_overhead`,
//! plus `contract_call` when the transfer also invokes a contract function.
//! The estimate is advisory: the ledger still enforces its own minimum.

use serde::{Deserialize, Serialize};

pub const GAS_BASE: u64 = 50_000;
pub const GAS_PER_DATA_BYTE: u64 = 1_500;
pub const GAS_PER_TRANSFER: u64 = 200_000;
pub const GAS_RELAY_OVERHEAD: u64 = 50_000;
pub const GAS_CONTRACT_CALL: u64 = 6_000_000;

/// Tunable constants for [`GasSchedule::estimate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasSchedule {
    pub base: u64,
    pub per_data_byte: u64,
    pub per_transfer: u64,
    pub relay_overhead: u64,
    pub contract_call: u64,
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            base: GAS_BASE,
            per_data_byte: GAS_PER_DATA_BYTE,
            per_transfer: GAS_PER_TRANSFER,
            relay_overhead: GAS_RELAY_OVERHEAD,
            contract_call: GAS_CONTRACT_CALL,
        }
    }
}

impl GasSchedule {
    /// Saturates at `u64::MAX` rather than wrapping.
    pub fn estimate(&self, data_len: usize, transfers: u64, calls_contract: bool) -> u64 {
        let mut gas = self
            .base
            .saturating_add(self.per_data_byte.saturating_mul(data_len as u64))
            .saturating_add(self.per_transfer.saturating_mul(transfers))
            .saturating_add(self.relay_overhead);
        if calls_contract {
            gas = gas.saturating_add(self.contract_call);
        }
        gas
    }
}
