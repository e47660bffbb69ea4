mod common;

use std::sync::Arc;

use alloy::primitives::U256;
use x402::{
    Deadline, ErrorKind, FixedClock, PaymentRequirements, SchemeClient, SchemeFacilitator,
    SchemeRegistry, SchemeServer, X402_VERSION,
};
use x402_multiversx::{
    Ed25519Signer, MultiversXConfig, MultiversXSchemeClient, MultiversXSchemeFacilitator,
    MultiversXSchemeServer, MultiversXSigner, Transaction,
};

use common::{bob, requirements, MockLedger, NOW};

fn relayer() -> Arc<Ed25519Signer> {
    Arc::new(Ed25519Signer::from_seed([7; 32]))
}

fn relayed(asset: &str, amount: &str, relayer: &dyn MultiversXSigner) -> PaymentRequirements {
    let mut r = requirements(asset, amount);
    r.extra
        .insert("relayer".into(), relayer.address().to_bech32().into());
    r
}

struct Parties {
    ledger: Arc<MockLedger>,
    client: MultiversXSchemeClient,
    payer: x402_multiversx::Address,
}

fn parties() -> Parties {
    let ledger = MockLedger::new();
    let signer = Arc::new(Ed25519Signer::from_seed([1; 32]));
    let payer = signer.address();
    ledger.fund(payer, "USDC-123456", 2_000_000);
    let client =
        MultiversXSchemeClient::new(signer, ledger.clone(), MultiversXConfig::for_chain("D"))
            .with_clock(Arc::new(FixedClock::new(NOW)));
    Parties {
        ledger,
        client,
        payer,
    }
}

fn facilitator(ledger: &Arc<MockLedger>, key: Option<Arc<Ed25519Signer>>) -> MultiversXSchemeFacilitator {
    let f = MultiversXSchemeFacilitator::new(ledger.clone(), MultiversXConfig::for_chain("D"))
        .with_clock(Arc::new(FixedClock::new(NOW)));
    match key {
        Some(k) => f.with_relayer(k),
        None => f,
    }
}

#[tokio::test(start_paused = true)]
async fn relayer_co_signs_and_settles() {
    let p = parties();
    let key = relayer();
    let r = relayed("USDC-123456", "1000000", key.as_ref());
    let payload = p
        .client
        .create_payment_payload(X402_VERSION, &r, Deadline::none())
        .await
        .unwrap();
    let tx = Transaction::from_value(&payload.payload).unwrap();
    assert_eq!(tx.relayer, Some(key.address()));
    assert!(tx.relayer_signature.is_empty());

    let f = facilitator(&p.ledger, Some(key.clone()));
    assert!(f.verify(&payload, &r, Deadline::none()).await.unwrap().is_valid);

    // the mock ledger rejects a relayed transaction without a valid relayer signature
    let settled = f.settle(&payload, &r, Deadline::none()).await.unwrap();
    assert!(settled.success, "{settled:?}");
    assert_eq!(settled.payer, Some(p.payer.to_bech32()));
    assert_eq!(p.ledger.balance(bob(), "USDC-123456"), U256::from(1_000_000u64));
}

#[tokio::test]
async fn foreign_relayer_is_refused() {
    let p = parties();
    let r = relayed("USDC-123456", "1000000", relayer().as_ref());
    let payload = p
        .client
        .create_payment_payload(X402_VERSION, &r, Deadline::none())
        .await
        .unwrap();

    let other = facilitator(&p.ledger, Some(Arc::new(Ed25519Signer::from_seed([8; 32]))));
    let v = other.verify(&payload, &r, Deadline::none()).await.unwrap();
    assert_eq!(v.invalid_reason, Some(ErrorKind::InvalidPayload));

    let keyless = facilitator(&p.ledger, None);
    let settled = keyless.settle(&payload, &r, Deadline::none()).await.unwrap();
    assert_eq!(settled.error_reason, Some(ErrorKind::InvalidPayload));
    assert_eq!(p.ledger.broadcasts(), 0);
}

#[tokio::test]
async fn stripping_the_relayer_breaks_the_signature() {
    let p = parties();
    let key = relayer();
    let r = relayed("USDC-123456", "1000000", key.as_ref());
    let payload = p
        .client
        .create_payment_payload(X402_VERSION, &r, Deadline::none())
        .await
        .unwrap();

    let mut tx = Transaction::from_value(&payload.payload).unwrap();
    tx.relayer = None;
    let stripped = x402::PaymentPayload {
        payload: tx.to_value().unwrap(),
        ..payload
    };
    let f = facilitator(&p.ledger, Some(key));
    let v = f.verify(&stripped, &r, Deadline::none()).await.unwrap();
    assert_eq!(v.invalid_reason, Some(ErrorKind::InvalidSignature));
}

#[tokio::test]
async fn supported_advertises_relayer_and_server_picks_it_up() {
    let p = parties();
    let key = relayer();
    let registry = SchemeRegistry::builder()
        .facilitator(X402_VERSION, Arc::new(facilitator(&p.ledger, Some(key.clone()))))
        .server(
            X402_VERSION,
            Arc::new(MultiversXSchemeServer::new(MultiversXConfig::for_chain("D"))),
        )
        .build();

    let supported = registry.supported();
    let kind = supported
        .kinds
        .iter()
        .find(|k| k.network == "multiversx:D")
        .unwrap();
    assert_eq!(
        kind.extra.as_ref().unwrap()["relayer"],
        key.address().to_bech32()
    );
    assert_eq!(
        supported.signers["multiversx:D"],
        vec![key.address().to_bech32()]
    );

    let server = registry.server(X402_VERSION, "multiversx:D", "exact").unwrap();
    let price = x402::AssetAmount {
        asset: "USDC-123456".into(),
        amount: "1000000".into(),
    };
    let r = server
        .requirements_for(&price, common::BOB, 120, Some(kind))
        .unwrap();
    assert_eq!(r.extra["relayer"], key.address().to_bech32());
    assert_eq!(r.extra["assetTransferMethod"], "esdt");

    let payload = p
        .client
        .create_payment_payload(X402_VERSION, &r, Deadline::none())
        .await
        .unwrap();
    let tx = Transaction::from_value(&payload.payload).unwrap();
    assert_eq!(tx.relayer, Some(key.address()));
}
