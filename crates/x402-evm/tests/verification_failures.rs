use std::sync::Arc;

use alloy::primitives::{Address, Bytes, FixedBytes, U256};
use alloy::providers::RootProvider;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;

use x402::{
    Deadline, ErrorKind, FixedClock, PaymentPayload, PaymentRequirements, SchemeClient,
    SchemeFacilitator, SchemeRegistry, SCHEME_EXACT, X402_VERSION,
};
use x402_evm::eip712::{self, check_local, LocalCheck};
use x402_evm::{
    Binding, EvmChainConfig, EvmPayload, EvmPermit, EvmSchemeClient, EvmSchemeFacilitator,
    EvmSchemeServer, PaymentAuthorization, TransferDescriptor,
};

const NOW: u64 = 1_750_000_000;

fn config() -> EvmChainConfig {
    EvmChainConfig::for_chain(84532, Address::repeat_byte(0x42))
}

fn requirements() -> PaymentRequirements {
    PaymentRequirements {
        scheme: SCHEME_EXACT.to_string(),
        network: "eip155:84532".to_string(),
        asset: Address::repeat_byte(0x11).to_string(),
        amount: "1000".to_string(),
        pay_to: Address::repeat_byte(0x22).to_string(),
        max_timeout_seconds: 30,
        extra: Default::default(),
    }
}

/// Helper: create a valid PaymentAuthorization and sign it.
fn make_signed_auth(signer: &PrivateKeySigner) -> (PaymentAuthorization, Vec<u8>) {
    let auth = PaymentAuthorization {
        from: signer.address(),
        transfer: TransferDescriptor {
            token: Address::repeat_byte(0x11),
            nonce: FixedBytes::ZERO,
        },
        binding: Binding {
            destination: Address::repeat_byte(0x22),
            amountBound: U256::from(1000u64),
            validAfter: U256::ZERO,
            validBefore: U256::from(u64::MAX),
            extra: Bytes::new(),
        },
    };
    let sig = signer
        .sign_hash_sync(&eip712::signing_hash(&auth, &config()))
        .unwrap();
    (auth, sig.as_bytes().to_vec())
}

fn facilitator() -> Arc<EvmSchemeFacilitator<RootProvider>> {
    let provider =
        RootProvider::<alloy::network::Ethereum>::new_http("http://localhost:1".parse().unwrap());
    Arc::new(
        EvmSchemeFacilitator::with_chain_config(provider, Address::repeat_byte(0xfa), config())
            .with_clock(Arc::new(FixedClock::new(NOW))),
    )
}

async fn signed_payload(signer: &PrivateKeySigner) -> PaymentPayload {
    EvmSchemeClient::new(signer.clone(), config())
        .with_clock(Arc::new(FixedClock::new(NOW)))
        .create_payment_payload(X402_VERSION, &requirements(), Deadline::none())
        .await
        .unwrap()
}

// -- Signature failure tests --

#[test]
fn test_verify_wrong_signer() {
    let signer_a = PrivateKeySigner::random();
    let signer_b = PrivateKeySigner::random();

    let (mut auth, sig_bytes) = make_signed_auth(&signer_a);
    // Claim the auth is from signer_b
    auth.from = signer_b.address();

    assert!(matches!(
        check_local(&auth, &sig_bytes, &config()),
        LocalCheck::Invalid(_)
    ));
}

#[test]
fn test_every_binding_field_is_covered() {
    let signer = PrivateKeySigner::random();
    let (auth, sig_bytes) = make_signed_auth(&signer);

    let tampers: Vec<Box<dyn Fn(&mut PaymentAuthorization)>> = vec![
        Box::new(|a| a.binding.destination = Address::repeat_byte(0x66)),
        Box::new(|a| a.binding.amountBound = U256::from(9999u64)),
        Box::new(|a| a.binding.validAfter = U256::from(1u64)),
        Box::new(|a| a.binding.validBefore = U256::from(2u64)),
        Box::new(|a| a.binding.extra = Bytes::from_static(b"resource-7")),
        Box::new(|a| a.transfer.nonce = FixedBytes::new([0xff; 32])),
        Box::new(|a| a.transfer.token = Address::repeat_byte(0x12)),
    ];
    for tamper in tampers {
        let mut t = auth.clone();
        tamper(&mut t);
        let recovered = eip712::recover_signer(&t, &sig_bytes, &config()).unwrap();
        assert_ne!(recovered, signer.address());
    }
}

#[test]
fn test_verify_invalid_signature_bytes() {
    let signer = PrivateKeySigner::random();
    let (auth, _) = make_signed_auth(&signer);

    // Too short for ECDSA: left to the ledger.
    assert_eq!(
        check_local(&auth, &[0xde, 0xad], &config()),
        LocalCheck::NotExpressible
    );
    assert!(eip712::recover_signer(&auth, &[0xde, 0xad], &config()).is_err());
}

// -- Through the registry --

#[tokio::test]
async fn test_registry_routes_to_evm_facilitator() {
    let registry = SchemeRegistry::builder()
        .facilitator(X402_VERSION, facilitator())
        .server(X402_VERSION, Arc::new(EvmSchemeServer::new(config())))
        .build();

    let signer = PrivateKeySigner::random();
    let payload = signed_payload(&signer).await;

    let f = registry
        .facilitator(X402_VERSION, "eip155:84532", SCHEME_EXACT)
        .expect("facilitator registered");
    let r = f.verify(&payload, &requirements(), Deadline::none()).await.unwrap();
    assert!(r.is_valid, "{r:?}");

    let supported = registry.supported();
    assert_eq!(supported.kinds.len(), 1);
    assert_eq!(supported.kinds[0].network, "eip155:84532");
    assert_eq!(
        supported.signers["eip155:84532"],
        vec![Address::repeat_byte(0xfa).to_string()]
    );

    assert!(registry
        .facilitator(X402_VERSION, "eip155:1", SCHEME_EXACT)
        .is_none());
}

// -- Time window tests (via verify) --

#[tokio::test]
async fn test_expired_authorization() {
    let signer = PrivateKeySigner::random();
    let mut payload = signed_payload(&signer).await;

    let mut evm = EvmPayload::from_value(&payload.payload).unwrap();
    evm.authorization.valid_before = 0;
    evm.authorization.valid_after = 0;
    let typed = evm.authorization.to_typed().unwrap();
    let sig = signer
        .sign_hash_sync(&eip712::signing_hash(&typed, &config()))
        .unwrap();
    evm.signature = eip712::encode_signature_hex(&sig);
    payload.payload = evm.to_value().unwrap();

    let result = facilitator()
        .verify(&payload, &requirements(), Deadline::none())
        .await
        .unwrap();
    assert!(!result.is_valid);
    assert_eq!(result.invalid_reason, Some(ErrorKind::PaymentExpired));
}

#[tokio::test]
async fn test_not_yet_valid_authorization() {
    let signer = PrivateKeySigner::random();
    let mut payload = signed_payload(&signer).await;

    let mut evm = EvmPayload::from_value(&payload.payload).unwrap();
    evm.authorization.valid_after = u64::MAX;
    evm.authorization.valid_before = u64::MAX;
    let typed = evm.authorization.to_typed().unwrap();
    let sig = signer
        .sign_hash_sync(&eip712::signing_hash(&typed, &config()))
        .unwrap();
    evm.signature = eip712::encode_signature_hex(&sig);
    payload.payload = evm.to_value().unwrap();

    let result = facilitator()
        .verify(&payload, &requirements(), Deadline::none())
        .await
        .unwrap();
    assert!(!result.is_valid);
    assert_eq!(result.invalid_reason, Some(ErrorKind::PaymentTooEarly));
}

// -- Malformed requirements are verdicts, not faults --

#[tokio::test]
async fn test_unparseable_requirement_fields_are_rejected() {
    let signer = PrivateKeySigner::random();
    let payload = signed_payload(&signer).await;
    let f = facilitator();

    let mut bad_pay_to = requirements();
    bad_pay_to.pay_to = "not-an-address".into();
    let mut bad_asset = requirements();
    bad_asset.asset = "not-a-token".into();
    let mut bad_amount = requirements();
    bad_amount.amount = "1e3".into();

    let cases = [
        (bad_pay_to, ErrorKind::DestinationMismatch),
        (bad_asset, ErrorKind::AssetMismatch),
        (bad_amount, ErrorKind::InvalidPayload),
    ];
    for (reqs, expected) in cases {
        let v = f.verify(&payload, &reqs, Deadline::none()).await.unwrap();
        assert!(!v.is_valid);
        assert_eq!(v.invalid_reason, Some(expected));
        assert_eq!(v.payer, Some(signer.address().to_string()));

        let s = f.settle(&payload, &reqs, Deadline::none()).await.unwrap();
        assert!(!s.success);
        assert_eq!(s.error_reason, Some(expected));
        assert!(s.transaction.is_none());
    }
}

// -- Permit-carrying payloads --

fn sample_permit() -> EvmPermit {
    EvmPermit {
        value: "1000".into(),
        deadline: NOW + 300,
        v: 27,
        r: FixedBytes::repeat_byte(0x0a),
        s: FixedBytes::repeat_byte(0x0b),
    }
}

fn with_permit(payload: &PaymentPayload, permit: EvmPermit) -> PaymentPayload {
    let mut evm = EvmPayload::from_value(&payload.payload).unwrap();
    evm.permit = Some(permit);
    let mut out = payload.clone();
    out.payload = evm.to_value().unwrap();
    out
}

#[tokio::test]
async fn test_permit_payload_verifies_locally() {
    let signer = PrivateKeySigner::random();
    let payload = with_permit(&signed_payload(&signer).await, sample_permit());

    let wire = serde_json::to_string(&payload).unwrap();
    let decoded: PaymentPayload = serde_json::from_str(&wire).unwrap();
    let evm = EvmPayload::from_value(&decoded.payload).unwrap();
    assert_eq!(evm.permit, Some(sample_permit()));

    // The local signature check accepts it, so no ledger call is made.
    let r = facilitator()
        .verify(&decoded, &requirements(), Deadline::none())
        .await
        .unwrap();
    assert!(r.is_valid, "{r:?}");
    assert_eq!(r.payer, Some(signer.address().to_string()));
}

#[tokio::test]
async fn test_malformed_permit_value_is_invalid_payload() {
    let signer = PrivateKeySigner::random();
    let permit = EvmPermit {
        value: "abc".into(),
        ..sample_permit()
    };
    let payload = with_permit(&signed_payload(&signer).await, permit);
    let f = facilitator();

    let v = f
        .verify(&payload, &requirements(), Deadline::none())
        .await
        .unwrap();
    assert!(!v.is_valid);
    assert_eq!(v.invalid_reason, Some(ErrorKind::InvalidPayload));

    let s = f
        .settle(&payload, &requirements(), Deadline::none())
        .await
        .unwrap();
    assert!(!s.success);
    assert_eq!(s.error_reason, Some(ErrorKind::InvalidPayload));
}

#[tokio::test]
async fn test_client_attached_permit_verifies() {
    let signer = PrivateKeySigner::random();
    let client = EvmSchemeClient::new(signer.clone(), config())
        .with_clock(Arc::new(FixedClock::new(NOW)));
    let evm = client
        .sign_authorization_with_permit(&requirements(), "1000", sample_permit())
        .unwrap();
    let payload = PaymentPayload {
        x402_version: X402_VERSION,
        accepted: Some(requirements()),
        payload: evm.to_value().unwrap(),
    };

    let r = facilitator()
        .verify(&payload, &requirements(), Deadline::none())
        .await
        .unwrap();
    assert!(r.is_valid, "{r:?}");
}
