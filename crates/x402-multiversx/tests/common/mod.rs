#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy::primitives::U256;
use async_trait::async_trait;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use x402::{LedgerError, PaymentRequirements, TxState, SCHEME_EXACT};
use x402_multiversx::esdt::split_binding;
use x402_multiversx::{Address, EsdtTransfer, MultiversXRpc, Transaction};

pub const BOB: &str = "erd1spyavw0956vq68xj8y4tenjpq2wd5a9p2c6j8gsz7ztyrnpxrruqzu66jx";
pub const NOW: u64 = 1_750_000_000;

pub fn requirements(asset: &str, amount: &str) -> PaymentRequirements {
    PaymentRequirements {
        scheme: SCHEME_EXACT.into(),
        network: "multiversx:D".into(),
        asset: asset.into(),
        amount: amount.into(),
        pay_to: BOB.into(),
        max_timeout_seconds: 300,
        extra: Default::default(),
    }
}

pub fn bob() -> Address {
    BOB.parse().unwrap()
}

#[derive(Default)]
struct State {
    nonces: HashMap<Address, u64>,
    balances: HashMap<(Address, String), U256>,
    statuses: HashMap<String, TxState>,
    broadcasts: u32,
    simulations: u32,
    simulation: Option<TxState>,
    forced_status: Option<TxState>,
}

/// In-process ledger: enforces account nonces and signatures on send,
/// moves balances, and reports statuses.
#[derive(Default)]
pub struct MockLedger {
    state: Mutex<State>,
}

fn verify(addr: &Address, msg: &[u8], sig_hex: &str) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(addr.as_bytes()) else {
        return false;
    };
    let Ok(raw) = hex::decode(sig_hex) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(&raw) else {
        return false;
    };
    key.verify(msg, &sig).is_ok()
}

impl MockLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fund(&self, who: Address, asset: &str, amount: u64) {
        let mut s = self.state.lock().unwrap();
        *s.balances.entry((who, asset.to_string())).or_default() += U256::from(amount);
    }

    pub fn balance(&self, who: Address, asset: &str) -> U256 {
        let s = self.state.lock().unwrap();
        s.balances
            .get(&(who, asset.to_string()))
            .copied()
            .unwrap_or_default()
    }

    pub fn nonce(&self, who: Address) -> u64 {
        let s = self.state.lock().unwrap();
        s.nonces.get(&who).copied().unwrap_or_default()
    }

    pub fn set_simulation(&self, result: TxState) {
        self.state.lock().unwrap().simulation = Some(result);
    }

    /// Every status query answers `status` from now on.
    pub fn force_status(&self, status: TxState) {
        self.state.lock().unwrap().forced_status = Some(status);
    }

    pub fn broadcasts(&self) -> u32 {
        self.state.lock().unwrap().broadcasts
    }

    pub fn simulations(&self) -> u32 {
        self.state.lock().unwrap().simulations
    }
}

fn execute(s: &mut State, tx: &Transaction) -> TxState {
    let Ok((call, _)) = split_binding(&tx.data) else {
        return TxState::Failed;
    };
    let (asset, to, amount) = match EsdtTransfer::decode(call) {
        Ok(t) => (t.token, t.destination, t.amount),
        Err(_) => match tx.value_atomic() {
            Some(v) => ("EGLD".to_string(), tx.receiver, v),
            None => return TxState::Failed,
        },
    };
    let from = s
        .balances
        .entry((tx.sender, asset.clone()))
        .or_default();
    if *from < amount {
        return TxState::Failed;
    }
    *from -= amount;
    *s.balances.entry((to, asset)).or_default() += amount;
    TxState::Success
}

#[async_trait]
impl MultiversXRpc for MockLedger {
    async fn get_account_nonce(&self, address: &Address) -> Result<u64, LedgerError> {
        Ok(self.nonce(*address))
    }

    async fn simulate(&self, _tx: &Transaction) -> Result<TxState, LedgerError> {
        let mut s = self.state.lock().unwrap();
        s.simulations += 1;
        Ok(s.simulation.unwrap_or(TxState::Success))
    }

    async fn send(&self, tx: &Transaction) -> Result<String, LedgerError> {
        let mut s = self.state.lock().unwrap();
        let expected = s.nonces.get(&tx.sender).copied().unwrap_or_default();
        if tx.nonce != expected {
            return Err(LedgerError::Rejected(format!(
                "bad nonce: expected {expected}, got {}",
                tx.nonce
            )));
        }
        let msg = tx.signing_bytes().map_err(|e| LedgerError::Decode(e.to_string()))?;
        if !tx.sender.is_smart_contract() && !verify(&tx.sender, &msg, &tx.signature) {
            return Err(LedgerError::Rejected("invalid signature".into()));
        }
        if let Some(relayer) = tx.relayer {
            if !verify(&relayer, &msg, &tx.relayer_signature) {
                return Err(LedgerError::Rejected("invalid relayer signature".into()));
            }
        }

        s.nonces.insert(tx.sender, expected + 1);
        s.broadcasts += 1;
        let hash = format!("{:064x}", s.broadcasts);
        let outcome = execute(&mut s, tx);
        s.statuses.insert(hash.clone(), outcome);
        Ok(hash)
    }

    async fn status(&self, hash: &str) -> Result<TxState, LedgerError> {
        let s = self.state.lock().unwrap();
        if let Some(forced) = s.forced_status {
            return Ok(forced);
        }
        s.statuses
            .get(hash)
            .copied()
            .ok_or_else(|| LedgerError::Rejected(format!("unknown transaction {hash}")))
    }
}
