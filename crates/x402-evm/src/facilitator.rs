use std::sync::Arc;

use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::Provider;
use alloy::transports::{RpcError, TransportError};
use async_trait::async_trait;

use x402::finality::{poll_until_final, retry_transient};
use x402::{
    Clock, Deadline, ErrorKind, LedgerError, PaymentPayload, PaymentRequirements, PollOutcome,
    SchemeFacilitator, SettleResponse, SystemClock, TxState, VerifyResponse, X402Error,
    DRY_RUN_RETRY_DELAY, SCHEME_EXACT,
};

use crate::config::EvmChainConfig;
use crate::eip712::{check_local, LocalCheck};
use crate::payload::EvmPayload;
use crate::{Binding, IX402Settlement, Permit, TransferDescriptor};

/// Facilitator-side scheme implementation: verifies authorizations and
/// settles them through the settlement contract.
///
/// `provider` must carry the facilitator's wallet for [`settle`] to send
/// transactions; verification only needs read access.
///
/// [`settle`]: SchemeFacilitator::settle
pub struct EvmSchemeFacilitator<P> {
    provider: P,
    facilitator_address: Address,
    config: EvmChainConfig,
    clock: Arc<dyn Clock>,
}

/// Everything the settlement contract call needs, after all local checks passed.
#[derive(Debug, Clone)]
struct Prepared {
    payer: Address,
    transfer: TransferDescriptor,
    binding: Binding,
    requested: U256,
    signature: Bytes,
    permit: Option<Permit>,
}

enum Verdict {
    Valid(Prepared),
    Invalid(VerifyResponse),
}

fn invalid(reason: ErrorKind, payer: Option<Address>) -> Verdict {
    Verdict::Invalid(VerifyResponse::invalid(
        reason,
        payer.map(|p| p.to_string()),
    ))
}

impl<P> EvmSchemeFacilitator<P> {
    pub fn new(provider: P, facilitator_address: Address) -> Self {
        Self::with_chain_config(provider, facilitator_address, EvmChainConfig::default())
    }

    pub fn with_chain_config(
        provider: P,
        facilitator_address: Address,
        config: EvmChainConfig,
    ) -> Self {
        Self {
            provider,
            facilitator_address,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EvmChainConfig {
        &self.config
    }

    pub fn facilitator_address(&self) -> Address {
        self.facilitator_address
    }
}

impl<P: Provider> EvmSchemeFacilitator<P> {
    /// Check RPC connectivity by fetching the latest block number.
    pub async fn health_check(&self) -> Result<u64, X402Error> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| X402Error::ChainError(format!("health check failed: {e}")))
    }

    async fn check(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
        deadline: Deadline,
    ) -> Result<Verdict, X402Error> {
        let evm = match EvmPayload::from_value(&payload.payload) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable EVM payload");
                return Ok(invalid(ErrorKind::InvalidPayload, None));
            }
        };
        let auth = &evm.authorization;
        let payer = Some(auth.from);

        if requirements.network != self.config.network {
            return Ok(invalid(ErrorKind::NetworkMismatch, payer));
        }

        let binding = match auth.binding() {
            Ok(b) => b,
            Err(_) => return Ok(invalid(ErrorKind::InvalidPayload, payer)),
        };

        // Expiry first, then the lower bound.
        if let Err(kind) = binding.check_window(self.clock.now_unix()) {
            tracing::warn!(payer = %auth.from, reason = %kind, "authorization outside its window");
            return Ok(invalid(kind, payer));
        }

        let Ok(pay_to) = requirements.pay_to.parse::<Address>() else {
            tracing::warn!(pay_to = %requirements.pay_to, "requirement payTo is not an address");
            return Ok(invalid(ErrorKind::DestinationMismatch, payer));
        };
        if auth.destination != pay_to {
            tracing::warn!(
                payer = %auth.from,
                bound = %auth.destination,
                requested = %pay_to,
                "destination differs from binding"
            );
            return Ok(invalid(ErrorKind::DestinationMismatch, payer));
        }

        let Ok(asset) = requirements.asset.parse::<Address>() else {
            tracing::warn!(asset = %requirements.asset, "requirement asset is not a token address");
            return Ok(invalid(ErrorKind::AssetMismatch, payer));
        };
        if auth.token != asset {
            return Ok(invalid(ErrorKind::AssetMismatch, payer));
        }

        let requested = match requirements.amount_atomic() {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(amount = %requirements.amount, error = %e, "requirement amount is not atomic units");
                return Ok(invalid(ErrorKind::InvalidPayload, payer));
            }
        };
        if let Err(kind) = binding.check_amount(requested) {
            tracing::warn!(
                payer = %auth.from,
                requested = %requested,
                bound = %binding.amount_bound,
                "requested amount exceeds binding"
            );
            return Ok(invalid(kind, payer));
        }

        let Ok(typed) = auth.to_typed() else {
            return Ok(invalid(ErrorKind::InvalidPayload, payer));
        };
        let permit = match evm.permit.as_ref().map(|p| p.to_typed()).transpose() {
            Ok(p) => p,
            Err(_) => return Ok(invalid(ErrorKind::InvalidPayload, payer)),
        };
        let signature = match evm.signature_bytes() {
            Ok(s) => s,
            Err(_) => return Ok(invalid(ErrorKind::InvalidSignature, payer)),
        };

        let prepared = Prepared {
            payer: auth.from,
            transfer: typed.transfer.clone(),
            binding: typed.binding.clone(),
            requested,
            signature: Bytes::from(signature),
            permit,
        };

        let expressible = match check_local(&typed, &prepared.signature, &self.config) {
            LocalCheck::Valid => return Ok(Verdict::Valid(prepared)),
            LocalCheck::Invalid(reason) => {
                tracing::debug!(payer = %auth.from, reason, "local signature check failed");
                true
            }
            LocalCheck::NotExpressible => false,
        };

        if !self.config.fallback.should_dry_run(expressible) {
            return Ok(invalid(ErrorKind::InvalidSignature, payer));
        }

        match self.dry_run(&prepared, deadline).await {
            Ok(()) => Ok(Verdict::Valid(prepared)),
            Err(e) => {
                tracing::warn!(payer = %auth.from, error = %e, "settlement dry-run failed");
                Ok(invalid(ErrorKind::SimulationFailed, payer))
            }
        }
    }

    /// Simulate the settlement call against current ledger state, retrying
    /// transient transport failures.
    async fn dry_run(&self, p: &Prepared, deadline: Deadline) -> Result<(), LedgerError> {
        let contract = IX402Settlement::new(self.config.settlement_contract, &self.provider);
        let contract = &contract;
        retry_transient(
            || async move {
                let result = match &p.permit {
                    Some(permit) => contract
                        .settleWithPermit(
                            p.transfer.clone(),
                            p.requested,
                            p.payer,
                            p.binding.clone(),
                            p.signature.clone(),
                            permit.clone(),
                        )
                        .from(self.facilitator_address)
                        .call()
                        .await
                        .map(|_| ()),
                    None => contract
                        .settle(
                            p.transfer.clone(),
                            p.requested,
                            p.payer,
                            p.binding.clone(),
                            p.signature.clone(),
                        )
                        .from(self.facilitator_address)
                        .call()
                        .await
                        .map(|_| ()),
                };
                result.map_err(|e| classify_contract_error(&e))
            },
            DRY_RUN_RETRY_DELAY,
            deadline,
        )
        .await
    }

    async fn broadcast(&self, p: &Prepared) -> Result<TxHash, alloy::contract::Error> {
        let contract = IX402Settlement::new(self.config.settlement_contract, &self.provider);
        let pending = match &p.permit {
            Some(permit) => {
                contract
                    .settleWithPermit(
                        p.transfer.clone(),
                        p.requested,
                        p.payer,
                        p.binding.clone(),
                        p.signature.clone(),
                        permit.clone(),
                    )
                    .from(self.facilitator_address)
                    .send()
                    .await?
            }
            None => {
                contract
                    .settle(
                        p.transfer.clone(),
                        p.requested,
                        p.payer,
                        p.binding.clone(),
                        p.signature.clone(),
                    )
                    .from(self.facilitator_address)
                    .send()
                    .await?
            }
        };
        Ok(*pending.tx_hash())
    }

    async fn tx_state(&self, hash: TxHash) -> Result<TxState, LedgerError> {
        use alloy::network::ReceiptResponse;

        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| classify_rpc_error(&e))?;
        Ok(match receipt {
            None => TxState::Pending,
            Some(r) if r.status() => TxState::Success,
            Some(_) => TxState::Failed,
        })
    }
}

/// Map a transport failure onto the engine's retry classes.
fn classify_rpc_error(e: &TransportError) -> LedgerError {
    match e {
        RpcError::Transport(_) => LedgerError::Transient(e.to_string()),
        RpcError::ErrorResp(_) => LedgerError::Rejected(e.to_string()),
        RpcError::DeserError { .. } | RpcError::NullResp => LedgerError::Decode(e.to_string()),
        _ => LedgerError::Rejected(e.to_string()),
    }
}

fn classify_contract_error(e: &alloy::contract::Error) -> LedgerError {
    match e {
        alloy::contract::Error::TransportError(t) => classify_rpc_error(t),
        alloy::contract::Error::AbiError(_) => LedgerError::Decode(e.to_string()),
        _ => LedgerError::Rejected(e.to_string()),
    }
}

#[async_trait]
impl<P> SchemeFacilitator for EvmSchemeFacilitator<P>
where
    P: Provider + Send + Sync + 'static,
{
    fn scheme(&self) -> &str {
        SCHEME_EXACT
    }

    fn caip_family(&self) -> String {
        self.config.network.clone()
    }

    fn extra(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        let mut extra = serde_json::Map::new();
        extra.insert(
            "verifyingContract".into(),
            self.config.settlement_contract.to_string().into(),
        );
        Some(extra)
    }

    fn signers(&self) -> Vec<String> {
        vec![self.facilitator_address.to_string()]
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
                    nonce = %format!("{:.8}", p.transfer.nonce),
                    "payment verification succeeded"
                );
                Ok(VerifyResponse::valid(p.payer.to_string()))
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
        let payer = Some(p.payer.to_string());

        let hash = match deadline.run(self.broadcast(&p)).await {
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
        let tx = hash.to_string();
        tracing::debug!(payer = %p.payer, tx = %tx, "settlement broadcast accepted");

        let outcome =
            poll_until_final(|| self.tx_state(hash), self.config.poll_config(), deadline).await;

        Ok(match outcome {
            PollOutcome::Success => {
                tracing::info!(
                    payer = %p.payer,
                    amount = %p.requested,
                    nonce = %format!("{:.8}", p.transfer.nonce),
                    tx = %tx,
                    "payment settled successfully"
                );
                SettleResponse::success(payer, tx, network)
            }
            PollOutcome::Failed => {
                tracing::warn!(payer = %p.payer, tx = %tx, "settlement transaction reverted");
                SettleResponse::failure(ErrorKind::ExecutionFailed, payer, Some(tx), network)
            }
            PollOutcome::TimedOut => {
                tracing::warn!(payer = %p.payer, tx = %tx, "settlement not final before timeout");
                SettleResponse::failure(ErrorKind::FinalityTimeout, payer, Some(tx), network)
            }
        })
    }
}
