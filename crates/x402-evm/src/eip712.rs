//! EIP-712 typed-data signing, signature verification, and nonce generation.
//!
//! Provides functions for:
//! - Building the settlement domain ([`payment_domain`])
//! - Computing signing hashes ([`signing_hash`])
//! - Recovering signers with EIP-2 malleability protection ([`recover_signer`])
//! - Classifying a signature for the verifier's local tier ([`check_local`])
//! - Generating cryptographically secure random nonces ([`random_nonce`])

use alloy::primitives::{Address, FixedBytes, Signature, B256, U256};
use alloy::sol_types::SolStruct;
use x402::X402Error;

use crate::config::{EvmChainConfig, ECDSA_SIGNATURE_LEN};
use crate::PaymentAuthorization;

/// Domain bound to the chain and the settlement contract, so an
/// authorization cannot be replayed against another deployment.
pub fn payment_domain(config: &EvmChainConfig) -> alloy::sol_types::Eip712Domain {
    alloy::sol_types::Eip712Domain {
        name: Some(std::borrow::Cow::Owned(config.eip712_domain_name.clone())),
        version: Some(std::borrow::Cow::Owned(
            config.eip712_domain_version.clone(),
        )),
        chain_id: Some(U256::from(config.chain_id)),
        verifying_contract: Some(config.settlement_contract),
        salt: None,
    }
}

/// EIP-712 signing hash covering the transfer and the binding together.
pub fn signing_hash(auth: &PaymentAuthorization, config: &EvmChainConfig) -> B256 {
    auth.eip712_signing_hash(&payment_domain(config))
}

/// secp256k1 curve order N / 2. Signatures with s above this are malleable (EIP-2).
const SECP256K1_N_DIV_2: U256 = U256::from_limbs([
    0xBFD25E8CD0364140,
    0xBAAEDCE6AF48A03B,
    0xFFFFFFFFFFFFFFFE,
    0x7FFFFFFFFFFFFFFF,
]);

/// Recover the signer of a 65-byte ECDSA signature.
/// Rejects high-s signatures to prevent malleability (EIP-2).
pub fn recover_signer(
    auth: &PaymentAuthorization,
    signature_bytes: &[u8],
    config: &EvmChainConfig,
) -> Result<Address, X402Error> {
    if signature_bytes.len() != ECDSA_SIGNATURE_LEN {
        return Err(X402Error::SignatureError(format!(
            "signature must be {ECDSA_SIGNATURE_LEN} bytes, got {}",
            signature_bytes.len()
        )));
    }

    // from_raw accepts v in {0, 1, 27, 28} and normalizes parity.
    let sig = Signature::from_raw(signature_bytes)
        .map_err(|e| X402Error::SignatureError(format!("invalid signature: {e}")))?;

    if sig.s() > SECP256K1_N_DIV_2 {
        return Err(X402Error::SignatureError(
            "high-s signature rejected (EIP-2 malleability)".to_string(),
        ));
    }

    let hash = signing_hash(auth, config);
    sig.recover_address_from_prehash(&hash)
        .map_err(|e| X402Error::SignatureError(format!("recovery failed: {e}")))
}

/// Outcome of the verifier's offline signature tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalCheck {
    /// Recovered signer equals the claimed payer.
    Valid,
    /// Conclusively wrong: bad encoding, high-s, or a different signer.
    Invalid(String),
    /// Not an ECDSA signature. Contract wallets (EIP-1271) sign this way
    /// and only the ledger can judge them.
    NotExpressible,
}

pub fn check_local(
    auth: &PaymentAuthorization,
    signature_bytes: &[u8],
    config: &EvmChainConfig,
) -> LocalCheck {
    if signature_bytes.len() != ECDSA_SIGNATURE_LEN {
        return LocalCheck::NotExpressible;
    }
    match recover_signer(auth, signature_bytes, config) {
        Ok(recovered) if recovered == auth.from => LocalCheck::Valid,
        Ok(recovered) => LocalCheck::Invalid(format!("recovered {recovered}")),
        Err(e) => LocalCheck::Invalid(e.to_string()),
    }
}

/// Generate a random 32-byte nonce (keccak256 of 32 random bytes).
/// Uses `rand::fill` which delegates to the OS CSPRNG.
pub fn random_nonce() -> FixedBytes<32> {
    use alloy::primitives::keccak256;
    let mut bytes = [0u8; 32];
    rand::fill(&mut bytes);
    keccak256(bytes)
}

/// Encode a Signature to a hex string with 0x prefix (65 bytes -> 0x + 130 hex).
/// Uses Electrum notation: v = 27 or 28 in the last byte.
pub fn encode_signature_hex(sig: &Signature) -> String {
    format!("0x{}", alloy::hex::encode(sig.as_bytes()))
}
