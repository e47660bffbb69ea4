use std::sync::Arc;

use alloy::primitives::U256;
use async_trait::async_trait;

use x402::finality::retry_transient;
use x402::{
    Binding, BuildError, Clock, Deadline, PaymentPayload, PaymentRequirements, SchemeClient,
    SystemClock, DRY_RUN_RETRY_DELAY, SCHEME_EXACT,
};

use crate::address::Address;
use crate::config::{
    is_native, is_valid_token_id, MultiversXConfig, GAS_LIMIT_ESDT, GAS_LIMIT_RELAYED_EXTRA,
    GAS_LIMIT_STANDARD, TX_VERSION, VALID_AFTER_SKEW,
};
use crate::esdt::{append_binding, EsdtTransfer};
use crate::rpc::MultiversXRpc;
use crate::signer::{sign_transaction, MultiversXSigner};
use crate::transaction::Transaction;

/// Payer-side builder: signs a complete transfer transaction whose data
/// field carries the binding.
///
/// Reads the payer's account nonce once per payload. The transaction is
/// never broadcast here.
pub struct MultiversXSchemeClient {
    signer: Option<Arc<dyn MultiversXSigner>>,
    rpc: Arc<dyn MultiversXRpc>,
    config: MultiversXConfig,
    clock: Arc<dyn Clock>,
}

fn invalid(msg: String) -> BuildError {
    BuildError::InvalidRequirements(msg)
}

/// Hex arguments appended after the transfer call: `resourceId` first, then
/// any pre-encoded `arguments`.
fn call_arguments(requirements: &PaymentRequirements) -> Result<(Vec<String>, bool), BuildError> {
    let mut args = Vec::new();
    if let Some(id) = requirements.extra_str("resourceId").filter(|s| !s.is_empty()) {
        args.push(hex::encode(id.as_bytes()));
    }
    let mut calls_contract = false;
    if let Some(list) = requirements.extra.get("arguments").and_then(|v| v.as_array()) {
        for arg in list.iter().filter_map(|a| a.as_str()).filter(|a| !a.is_empty()) {
            if hex::decode(arg).is_err() {
                return Err(invalid(format!("argument '{arg}' is not hex")));
            }
            args.push(arg.to_string());
            calls_contract = true;
        }
    }
    Ok((args, calls_contract))
}

impl MultiversXSchemeClient {
    pub fn new(
        signer: Arc<dyn MultiversXSigner>,
        rpc: Arc<dyn MultiversXRpc>,
        config: MultiversXConfig,
    ) -> Self {
        Self {
            signer: Some(signer),
            rpc,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// A builder with no key; every build fails with `MissingSigner`.
    pub fn unsigned(rpc: Arc<dyn MultiversXRpc>, config: MultiversXConfig) -> Self {
        Self {
            signer: None,
            rpc,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn address(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address())
    }

    /// Assemble the unsigned transfer for `sender`. The nonce is left at 0
    /// for the caller to fill in.
    pub fn build_transaction(
        &self,
        sender: Address,
        requirements: &PaymentRequirements,
    ) -> Result<Transaction, BuildError> {
        if !self.config.serves(&requirements.network) {
            return Err(invalid(format!(
                "network '{}' is not served by this builder ({})",
                requirements.network, self.config.network
            )));
        }
        let pay_to: Address = requirements
            .pay_to
            .parse()
            .map_err(|e| invalid(format!("invalid payTo '{}': {e}", requirements.pay_to)))?;
        let amount = requirements
            .amount_atomic()
            .map_err(|_| BuildError::InvalidAmount(requirements.amount.clone()))?;
        let asset = requirements.asset.as_str();
        let native = is_native(asset);
        if !native && !is_valid_token_id(asset) {
            return Err(invalid(format!("asset '{asset}' is not EGLD or a token identifier")));
        }
        let relayer = requirements
            .extra_str("relayer")
            .map(|r| r.parse::<Address>())
            .transpose()
            .map_err(|e| invalid(format!("invalid relayer: {e}")))?;
        let options = requirements
            .extra_u64("options")
            .map(u32::try_from)
            .transpose()
            .map_err(|_| invalid("options out of range".to_string()))?
            .unwrap_or(0);

        let (args, calls_contract) = call_arguments(requirements)?;
        let (receiver, value, call) = if native {
            (pay_to, amount, args.join("@"))
        } else {
            let transfer = EsdtTransfer {
                destination: pay_to,
                token: asset.to_string(),
                token_nonce: 0,
                amount,
                arguments: args,
            };
            (sender, U256::ZERO, transfer.encode())
        };

        let now = self.clock.now_unix();
        let binding = Binding {
            destination: pay_to.as_bytes().to_vec(),
            amount_bound: amount,
            valid_after: now.saturating_sub(VALID_AFTER_SKEW),
            valid_before: now.saturating_add(requirements.max_timeout_seconds),
            extra: requirements
                .extra_str("resourceId")
                .map(|id| id.as_bytes().to_vec())
                .unwrap_or_default(),
        };
        let data = append_binding(&call, &binding)
            .map_err(|e| invalid(format!("binding does not encode: {e}")))?;

        let default_gas = if native { GAS_LIMIT_STANDARD } else { GAS_LIMIT_ESDT };
        let mut floor = requirements.extra_u64("gasLimit").unwrap_or(default_gas);
        if relayer.is_some() {
            floor = floor.saturating_add(GAS_LIMIT_RELAYED_EXTRA);
        }
        let transfers = if native { 0 } else { 1 };
        let estimate = self.config.gas.estimate(data.len(), transfers, calls_contract);

        Ok(Transaction {
            nonce: 0,
            value: value.to_string(),
            receiver,
            sender,
            gas_price: self.config.gas_price,
            gas_limit: floor.max(estimate),
            data,
            chain_id: self.config.chain_id.clone(),
            version: TX_VERSION,
            options,
            signature: String::new(),
            relayer,
            relayer_signature: String::new(),
            valid_after: Some(binding.valid_after),
            valid_before: Some(binding.valid_before),
        })
    }
}

#[async_trait]
impl SchemeClient for MultiversXSchemeClient {
    fn scheme(&self) -> &str {
        SCHEME_EXACT
    }

    async fn create_payment_payload(
        &self,
        x402_version: u32,
        requirements: &PaymentRequirements,
        deadline: Deadline,
    ) -> Result<PaymentPayload, BuildError> {
        if deadline.is_elapsed() {
            return Err(BuildError::DeadlineElapsed);
        }
        let signer = self.signer.as_deref().ok_or(BuildError::MissingSigner)?;
        let sender = signer.address();
        let mut tx = self.build_transaction(sender, requirements)?;

        let rpc = &self.rpc;
        tx.nonce = retry_transient(
            || async move { rpc.get_account_nonce(&sender).await },
            DRY_RUN_RETRY_DELAY,
            deadline,
        )
        .await
        .map_err(|e| {
            tracing::warn!(payer = %sender, error = %e, "could not read account nonce");
            BuildError::SequenceUnavailable(e)
        })?;

        sign_transaction(signer, &mut tx).map_err(|e| BuildError::Signing(e.to_string()))?;
        tracing::debug!(
            payer = %sender,
            nonce = tx.nonce,
            receiver = %tx.receiver,
            gas_limit = tx.gas_limit,
            relayed = tx.is_relayed(),
            "signed MultiversX transfer"
        );

        Ok(PaymentPayload {
            x402_version,
            accepted: Some(requirements.clone()),
            payload: tx
                .to_value()
                .map_err(|e| BuildError::Signing(e.to_string()))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::esdt::split_binding;
    use crate::signer::{check_sender_signature, Ed25519Signer, SignatureCheck};
    use std::sync::atomic::{AtomicU32, Ordering};
    use x402::{FixedClock, LedgerError, TxState};

    const BOB: &str = "erd1spyavw0956vq68xj8y4tenjpq2wd5a9p2c6j8gsz7ztyrnpxrruqzu66jx";

    /// Account reads only; answers `nonce` after `fail_first` transient errors.
    struct NonceOnly {
        nonce: u64,
        fail_first: u32,
        calls: AtomicU32,
        rejected: bool,
    }

    impl NonceOnly {
        fn ok(nonce: u64) -> Arc<Self> {
            Arc::new(Self {
                nonce,
                fail_first: 0,
                calls: AtomicU32::new(0),
                rejected: false,
            })
        }
    }

    #[async_trait]
    impl MultiversXRpc for NonceOnly {
        async fn get_account_nonce(&self, _: &Address) -> Result<u64, LedgerError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.rejected {
                return Err(LedgerError::Rejected("account not found".into()));
            }
            if n < self.fail_first {
                return Err(LedgerError::Transient("connection reset".into()));
            }
            Ok(self.nonce)
        }
        async fn simulate(&self, _: &Transaction) -> Result<TxState, LedgerError> {
            unreachable!("builder never simulates")
        }
        async fn send(&self, _: &Transaction) -> Result<String, LedgerError> {
            unreachable!("builder never broadcasts")
        }
        async fn status(&self, _: &str) -> Result<TxState, LedgerError> {
            unreachable!()
        }
    }

    fn requirements(asset: &str, amount: &str) -> PaymentRequirements {
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

    fn client(rpc: Arc<dyn MultiversXRpc>) -> MultiversXSchemeClient {
        MultiversXSchemeClient::new(
            Arc::new(Ed25519Signer::from_seed([1; 32])),
            rpc,
            MultiversXConfig::for_chain("D"),
        )
        .with_clock(Arc::new(FixedClock::new(1_000_000)))
    }

    async fn build(c: &MultiversXSchemeClient, r: &PaymentRequirements) -> Transaction {
        let payload = c.create_payment_payload(2, r, Deadline::none()).await.unwrap();
        Transaction::from_value(&payload.payload).unwrap()
    }

    #[tokio::test]
    async fn native_transfer_pays_destination_directly() {
        let c = client(NonceOnly::ok(42));
        let tx = build(&c, &requirements("EGLD", "100")).await;

        assert_eq!(tx.nonce, 42);
        assert_eq!(tx.receiver.to_bech32(), BOB);
        assert_eq!(tx.value, "100");
        assert_eq!(tx.chain_id, "D");
        assert_eq!(tx.version, 2);
        assert_eq!(check_sender_signature(&tx), SignatureCheck::Valid);

        let (prefix, binding) = split_binding(&tx.data).unwrap();
        assert_eq!(prefix, "");
        assert_eq!(binding.amount_bound, U256::from(100u64));
        assert_eq!(binding.valid_after, 1_000_000 - 600);
        assert_eq!(binding.valid_before, 1_000_300);
        assert_eq!(tx.valid_before, Some(1_000_300));
        assert_eq!(
            tx.gas_limit,
            c.config.gas.estimate(tx.data.len(), 0, false).max(GAS_LIMIT_STANDARD)
        );
    }

    #[tokio::test]
    async fn token_transfer_is_self_call() {
        let c = client(NonceOnly::ok(3));
        let mut r = requirements("USDC-123456", "1000000");
        r.extra.insert("resourceId".into(), "article-1".into());
        let tx = build(&c, &r).await;

        assert_eq!(tx.receiver, tx.sender);
        assert_eq!(tx.value, "0");
        assert_eq!(tx.gas_limit, GAS_LIMIT_ESDT);

        let (prefix, binding) = split_binding(&tx.data).unwrap();
        let call = EsdtTransfer::decode(prefix).unwrap();
        assert_eq!(call.destination.to_bech32(), BOB);
        assert_eq!(call.token, "USDC-123456");
        assert_eq!(call.amount, U256::from(1_000_000u64));
        assert_eq!(call.arguments, vec![hex::encode("article-1")]);
        assert_eq!(binding.extra, b"article-1".to_vec());
    }

    #[tokio::test]
    async fn relayer_and_gas_from_extra() {
        let c = client(NonceOnly::ok(0));
        let relayer = Ed25519Signer::from_seed([2; 32]).address();
        let mut r = requirements("EGLD", "1");
        r.extra.insert("relayer".into(), relayer.to_bech32().into());
        r.extra.insert("gasLimit".into(), 10_000_000u64.into());
        r.extra.insert("arguments".into(), serde_json::json!(["0a", "ff"]));
        let tx = build(&c, &r).await;

        assert_eq!(tx.relayer, Some(relayer));
        assert_eq!(tx.gas_limit, 10_000_000 + GAS_LIMIT_RELAYED_EXTRA);
        assert!(tx.data.starts_with("0a@ff@"));
        // payer signed over the relayer field
        assert_eq!(check_sender_signature(&tx), SignatureCheck::Valid);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_nonce_errors_are_retried() {
        let rpc = Arc::new(NonceOnly {
            nonce: 9,
            fail_first: 2,
            calls: AtomicU32::new(0),
            rejected: false,
        });
        let c = client(rpc.clone());
        let tx = build(&c, &requirements("EGLD", "5")).await;
        assert_eq!(tx.nonce, 9);
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn build_failures() {
        let rejected = Arc::new(NonceOnly {
            nonce: 0,
            fail_first: 0,
            calls: AtomicU32::new(0),
            rejected: true,
        });
        let err = client(rejected)
            .create_payment_payload(2, &requirements("EGLD", "5"), Deadline::none())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::SequenceUnavailable(LedgerError::Rejected(_))));

        let keyless = MultiversXSchemeClient::unsigned(NonceOnly::ok(0), MultiversXConfig::for_chain("D"));
        assert!(matches!(
            keyless
                .create_payment_payload(2, &requirements("EGLD", "5"), Deadline::none())
                .await,
            Err(BuildError::MissingSigner)
        ));

        let c = client(NonceOnly::ok(0));
        for (asset, amount) in [("EGLD", "1.5"), ("EGLD", "-1")] {
            assert!(matches!(
                c.create_payment_payload(2, &requirements(asset, amount), Deadline::none()).await,
                Err(BuildError::InvalidAmount(_))
            ));
        }
        let mut wrong_net = requirements("EGLD", "1");
        wrong_net.network = "multiversx:1".into();
        let mut bad_asset = requirements("usdc", "1");
        bad_asset.network = "devnet".into();
        let mut bad_dest = requirements("EGLD", "1");
        bad_dest.pay_to = "erd1nope".into();
        for r in [wrong_net, bad_asset, bad_dest] {
            assert!(matches!(
                c.create_payment_payload(2, &r, Deadline::none()).await,
                Err(BuildError::InvalidRequirements(_))
            ));
        }
    }
}
