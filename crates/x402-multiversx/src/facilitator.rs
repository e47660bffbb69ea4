use std::sync::Arc;

use alloy::primitives::U256;
use async_trait::async_trait;

use x402::finality::{poll_until_final, retry_transient};
use x402::{
    Clock, Deadline, ErrorKind, LedgerError, PaymentPayload, PaymentRequirements, PollOutcome,
    SchemeFacilitator, SettleResponse, SystemClock, TxState, VerifyResponse, X402Error,
    DRY_RUN_RETRY_DELAY, SCHEME_EXACT,
};

use crate::address::Address;
use crate::config::{is_native, MultiversXConfig};
use crate::esdt::{split_binding, DataError, EsdtTransfer};
use crate::rpc::MultiversXRpc;
use crate::signer::{check_sender_signature, co_sign, MultiversXSigner, SignatureCheck};
use crate::transaction::Transaction;

/// Facilitator-side scheme implementation: verifies signed transfer
/// transactions and broadcasts them.
///
/// With a relayer key configured, transactions naming that relayer are
/// co-signed so the facilitator pays their fees. Transactions without a
/// relayer are broadcast as they are, at the payer's expense.
pub struct MultiversXSchemeFacilitator {
    rpc: Arc<dyn MultiversXRpc>,
    relayer: Option<Arc<dyn MultiversXSigner>>,
    config: MultiversXConfig,
    clock: Arc<dyn Clock>,
}

/// A transaction that passed every check, ready to broadcast.
struct Prepared {
    tx: Transaction,
    payer: Address,
    requested: U256,
}

enum Verdict {
    Valid(Prepared),
    Invalid(VerifyResponse),
}

fn invalid(reason: ErrorKind, payer: Option<Address>) -> Verdict {
    Verdict::Invalid(VerifyResponse::invalid(
        reason,
        payer.map(|p| p.to_bech32()),
    ))
}

impl MultiversXSchemeFacilitator {
    pub fn new(rpc: Arc<dyn MultiversXRpc>, config: MultiversXConfig) -> Self {
        Self {
            rpc,
            relayer: None,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_relayer(mut self, relayer: Arc<dyn MultiversXSigner>) -> Self {
        self.relayer = Some(relayer);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &MultiversXConfig {
        &self.config
    }

    pub fn relayer_address(&self) -> Option<Address> {
        self.relayer.as_ref().map(|r| r.address())
    }

    async fn check(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
        deadline: Deadline,
    ) -> Result<Verdict, X402Error> {
        let tx = match Transaction::from_value(&payload.payload) {
            Ok(tx) => tx,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable MultiversX payload");
                return Ok(invalid(ErrorKind::InvalidPayload, None));
            }
        };
        let payer = Some(tx.sender);

        if !self.config.serves(&requirements.network) || tx.chain_id != self.config.chain_id {
            return Ok(invalid(ErrorKind::NetworkMismatch, payer));
        }

        let (call, binding) = match split_binding(&tx.data) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(payer = %tx.sender, error = %e, "no binding in data field");
                return Ok(invalid(ErrorKind::InvalidPayload, payer));
            }
        };
        if tx.valid_after.is_some_and(|v| v != binding.valid_after)
            || tx.valid_before.is_some_and(|v| v != binding.valid_before)
        {
            return Ok(invalid(ErrorKind::InvalidPayload, payer));
        }

        // Expiry first, then the lower bound.
        if let Err(kind) = binding.check_window(self.clock.now_unix()) {
            tracing::warn!(payer = %tx.sender, reason = %kind, "authorization outside its window");
            return Ok(invalid(kind, payer));
        }

        let pay_to: Address = match requirements.pay_to.parse() {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(pay_to = %requirements.pay_to, error = %e, "requirement payTo is not an address");
                return Ok(invalid(ErrorKind::DestinationMismatch, payer));
            }
        };
        let requested = match requirements.amount_atomic() {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(amount = %requirements.amount, error = %e, "requirement amount is not atomic units");
                return Ok(invalid(ErrorKind::InvalidPayload, payer));
            }
        };

        // Logical recipient and amount: the receiver and value for native
        // transfers, the decoded call for token transfers.
        let (destination, moved) = if is_native(&requirements.asset) {
            if EsdtTransfer::decode(call).is_ok() {
                return Ok(invalid(ErrorKind::AssetMismatch, payer));
            }
            match tx.value_atomic() {
                Some(v) => (tx.receiver, v),
                None => return Ok(invalid(ErrorKind::InvalidPayload, payer)),
            }
        } else {
            let transfer = match EsdtTransfer::decode(call) {
                Ok(t) => t,
                Err(DataError::NotMultiTransfer) => {
                    return Ok(invalid(ErrorKind::AssetMismatch, payer))
                }
                Err(e) => {
                    tracing::warn!(payer = %tx.sender, error = %e, "malformed token transfer call");
                    return Ok(invalid(ErrorKind::InvalidPayload, payer));
                }
            };
            if transfer.token != requirements.asset || transfer.token_nonce != 0 {
                return Ok(invalid(ErrorKind::AssetMismatch, payer));
            }
            if tx.receiver != tx.sender || tx.value_atomic() != Some(U256::ZERO) {
                return Ok(invalid(ErrorKind::InvalidPayload, payer));
            }
            (transfer.destination, transfer.amount)
        };

        if binding.destination.as_slice() != destination.as_bytes() || destination != pay_to {
            tracing::warn!(
                payer = %tx.sender,
                bound = %hex::encode(&binding.destination),
                destination = %destination,
                requested = %pay_to,
                "destination differs from binding or requirement"
            );
            return Ok(invalid(ErrorKind::DestinationMismatch, payer));
        }

        if binding.check_amount(requested).is_err()
            || moved < requested
            || moved > binding.amount_bound
        {
            tracing::warn!(
                payer = %tx.sender,
                requested = %requested,
                moved = %moved,
                bound = %binding.amount_bound,
                "amount outside binding"
            );
            return Ok(invalid(ErrorKind::AmountExceedsPermitted, payer));
        }

        if let Some(named) = tx.relayer {
            if self.relayer_address() != Some(named) {
                tracing::warn!(payer = %tx.sender, relayer = %named, "transaction names a foreign relayer");
                return Ok(invalid(ErrorKind::InvalidPayload, payer));
            }
        }

        let prepared = Prepared {
            payer: tx.sender,
            tx,
            requested,
        };

        let expressible = match check_sender_signature(&prepared.tx) {
            SignatureCheck::Valid => return Ok(Verdict::Valid(prepared)),
            SignatureCheck::Invalid(reason) => {
                tracing::debug!(payer = %prepared.payer, reason, "local signature check failed");
                true
            }
            SignatureCheck::NotExpressible => false,
        };

        if !self.config.fallback.should_dry_run(expressible) {
            return Ok(invalid(ErrorKind::InvalidSignature, payer));
        }

        match self.dry_run(&prepared.tx, deadline).await {
            Ok(TxState::Success) => Ok(Verdict::Valid(prepared)),
            Ok(state) => {
                tracing::warn!(payer = %prepared.payer, state = ?state, "simulation did not succeed");
                Ok(invalid(ErrorKind::SimulationFailed, payer))
            }
            Err(e) => {
                tracing::warn!(payer = %prepared.payer, error = %e, "simulation failed");
                Ok(invalid(ErrorKind::SimulationFailed, payer))
            }
        }
    }

    /// The fully signed form that goes on the ledger.
    fn finalize(&self, mut tx: Transaction) -> Result<Transaction, X402Error> {
        if tx.is_relayed() {
            let relayer = self.relayer.as_deref().ok_or_else(|| {
                X402Error::ConfigError("relayed transaction but no relayer key".to_string())
            })?;
            co_sign(relayer, &mut tx)?;
        }
        Ok(tx)
    }

    async fn dry_run(&self, tx: &Transaction, deadline: Deadline) -> Result<TxState, LedgerError> {
        let tx = self
            .finalize(tx.clone())
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;
        let rpc = &self.rpc;
        let tx = &tx;
        retry_transient(
            || async move { rpc.simulate(tx).await },
            DRY_RUN_RETRY_DELAY,
            deadline,
        )
        .await
    }
}

#[async_trait]
impl SchemeFacilitator for MultiversXSchemeFacilitator {
    fn scheme(&self) -> &str {
        SCHEME_EXACT
    }

    fn caip_family(&self) -> String {
        self.config.network.clone()
    }

    fn extra(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        let relayer = self.relayer_address()?;
        let mut extra = serde_json::Map::new();
        extra.insert("relayer".into(), relayer.to_bech32().into());
        Some(extra)
    }

    fn signers(&self) -> Vec<String> {
        self.relayer_address()
            .map(|a| vec![a.to_bech32()])
            .unwrap_or_default()
    }

    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
        deadline: Deadline,
    ) -> Result<VerifyResponse, X402Error> {
        match self.check(payload, requirements, deadline).await? {
            Verdict::Valid(p) => {
                tracing::info!(
                    payer = %p.payer,
                    amount = %p.requested,
                    nonce = p.tx.nonce,
                    "payment verification succeeded"
                );
                Ok(VerifyResponse::valid(p.payer.to_bech32()))
            }
            Verdict::Invalid(response) => Ok(response),
        }
    }

    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
        deadline: Deadline,
    ) -> Result<SettleResponse, X402Error> {
        let network = self.config.network.as_str();

        let p = match self.check(payload, requirements, deadline).await? {
            Verdict::Valid(p) => p,
            Verdict::Invalid(check) => {
                tracing::warn!(
                    payer = check.payer.as_deref().unwrap_or("unknown"),
                    reason = ?check.invalid_reason,
                    "settlement rejected after re-verification"
                );
                return Ok(SettleResponse::rejected(check, network));
            }
        };
        let payer = Some(p.payer.to_bech32());
        let tx = self.finalize(p.tx)?;

        let hash = match deadline.run(self.rpc.send(&tx)).await {
            Ok(Ok(hash)) => hash,
            Ok(Err(e)) => {
                tracing::warn!(payer = %p.payer, error = %e, "settlement broadcast failed");
                return Ok(SettleResponse::failure(
                    ErrorKind::BroadcastFailed,
                    payer,
                    None,
                    network,
                ));
            }
            Err(_) => {
                tracing::warn!(payer = %p.payer, "deadline elapsed during broadcast");
                return Ok(SettleResponse::failure(
                    ErrorKind::BroadcastFailed,
                    payer,
                    None,
                    network,
                ));
            }
        };
        tracing::debug!(payer = %p.payer, tx = %hash, "settlement broadcast accepted");

        let rpc = &self.rpc;
        let h = hash.as_str();
        let outcome = poll_until_final(
            || async move { rpc.status(h).await },
            self.config.poll_config(),
            deadline,
        )
        .await;

        Ok(match outcome {
            PollOutcome::Success => {
                tracing::info!(
                    payer = %p.payer,
                    amount = %p.requested,
                    nonce = tx.nonce,
                    tx = %hash,
                    relayed = tx.is_relayed(),
                    "payment settled successfully"
                );
                SettleResponse::success(payer, hash, network)
            }
            PollOutcome::Failed => {
                tracing::warn!(payer = %p.payer, tx = %hash, "settlement transaction failed");
                SettleResponse::failure(ErrorKind::ExecutionFailed, payer, Some(hash), network)
            }
            PollOutcome::TimedOut => {
                tracing::warn!(payer = %p.payer, tx = %hash, "no final status before timeout");
                SettleResponse::failure(ErrorKind::FinalityTimeout, payer, Some(hash), network)
            }
        })
    }
}
