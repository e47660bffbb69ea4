//! Ed25519 signing for payers and relayers.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use x402::X402Error;

use crate::address::Address;
use crate::transaction::Transaction;

/// Anything that can sign MultiversX transactions for one account.
pub trait MultiversXSigner: Send + Sync {
    fn address(&self) -> Address;

    fn sign_message(&self, message: &[u8]) -> Result<[u8; 64], X402Error>;
}

/// In-process Ed25519 key.
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(&seed),
        }
    }

    /// Accepts a 32-byte seed, or the 64-byte `seed || public key` form
    /// found in wallet PEM files.
    pub fn from_hex(s: &str) -> Result<Self, X402Error> {
        let bytes = hex::decode(s.trim().trim_start_matches("0x"))
            .map_err(|e| X402Error::ConfigError(format!("invalid ed25519 key hex: {e}")))?;
        let seed: [u8; 32] = match bytes.len() {
            32 | 64 => bytes[..32]
                .try_into()
                .map_err(|_| X402Error::ConfigError("invalid ed25519 seed".to_string()))?,
            n => {
                return Err(X402Error::ConfigError(format!(
                    "ed25519 key must be 32 or 64 bytes, got {n}"
                )))
            }
        };
        let signer = Self::from_seed(seed);
        if bytes.len() == 64 && bytes[32..] != signer.key.verifying_key().to_bytes() {
            return Err(X402Error::ConfigError(
                "public key half does not match the seed".to_string(),
            ));
        }
        Ok(signer)
    }
}

impl MultiversXSigner for Ed25519Signer {
    fn address(&self) -> Address {
        Address::from_bytes(self.key.verifying_key().to_bytes())
    }

    fn sign_message(&self, message: &[u8]) -> Result<[u8; 64], X402Error> {
        Ok(self.key.sign(message).to_bytes())
    }
}

/// Sign `tx` as its sender.
pub fn sign_transaction(signer: &dyn MultiversXSigner, tx: &mut Transaction) -> Result<(), X402Error> {
    let sig = signer.sign_message(&tx.signing_bytes()?)?;
    tx.signature = hex::encode(sig);
    Ok(())
}

/// Add the relayer's signature over the same bytes the sender signed.
pub fn co_sign(signer: &dyn MultiversXSigner, tx: &mut Transaction) -> Result<(), X402Error> {
    if tx.relayer != Some(signer.address()) {
        return Err(X402Error::SignatureError(
            "transaction does not name this relayer".to_string(),
        ));
    }
    let sig = signer.sign_message(&tx.signing_bytes()?)?;
    tx.relayer_signature = hex::encode(sig);
    Ok(())
}

/// Result of checking a sender signature without the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureCheck {
    Valid,
    Invalid(&'static str),
    /// Contract accounts hold no key; only the ledger can judge them.
    NotExpressible,
}

pub fn check_sender_signature(tx: &Transaction) -> SignatureCheck {
    if tx.sender.is_smart_contract() {
        return SignatureCheck::NotExpressible;
    }
    let Ok(raw) = hex::decode(&tx.signature) else {
        return SignatureCheck::Invalid("signature is not hex");
    };
    let Ok(raw) = <[u8; 64]>::try_from(raw.as_slice()) else {
        return SignatureCheck::Invalid("signature must be 64 bytes");
    };
    let Ok(key) = VerifyingKey::from_bytes(tx.sender.as_bytes()) else {
        return SignatureCheck::Invalid("sender is not a valid ed25519 key");
    };
    let Ok(message) = tx.signing_bytes() else {
        return SignatureCheck::Invalid("transaction cannot be serialized");
    };
    match key.verify(&message, &Signature::from_bytes(&raw)) {
        Ok(()) => SignatureCheck::Valid,
        Err(_) => SignatureCheck::Invalid("signature does not match sender"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(b: u8) -> Ed25519Signer {
        Ed25519Signer::from_seed([b; 32])
    }

    fn tx(sender: Address, relayer: Option<Address>) -> Transaction {
        Transaction {
            nonce: 1,
            value: "100".into(),
            receiver: signer(9).address(),
            sender,
            gas_price: 1_000_000_000,
            gas_limit: 50_000,
            data: String::new(),
            chain_id: "D".into(),
            version: 2,
            options: 0,
            signature: String::new(),
            relayer,
            relayer_signature: String::new(),
            valid_after: None,
            valid_before: None,
        }
    }

    #[test]
    fn signed_transaction_verifies() {
        let payer = signer(1);
        let mut t = tx(payer.address(), None);
        sign_transaction(&payer, &mut t).unwrap();
        assert_eq!(t.signature.len(), 128);
        assert_eq!(check_sender_signature(&t), SignatureCheck::Valid);

        t.nonce += 1;
        assert!(matches!(check_sender_signature(&t), SignatureCheck::Invalid(_)));
    }

    #[test]
    fn garbage_signatures_are_invalid() {
        let mut t = tx(signer(1).address(), None);
        t.signature = "zz".into();
        assert_eq!(
            check_sender_signature(&t),
            SignatureCheck::Invalid("signature is not hex")
        );
        t.signature = "ab".repeat(10);
        assert_eq!(
            check_sender_signature(&t),
            SignatureCheck::Invalid("signature must be 64 bytes")
        );
    }

    #[test]
    fn contract_senders_are_not_expressible() {
        let mut raw = [0u8; 32];
        raw[31] = 1;
        let t = tx(Address::from_bytes(raw), None);
        assert_eq!(check_sender_signature(&t), SignatureCheck::NotExpressible);
    }

    #[test]
    fn co_sign_requires_named_relayer() {
        let payer = signer(1);
        let relayer = signer(2);
        let mut t = tx(payer.address(), Some(relayer.address()));
        sign_transaction(&payer, &mut t).unwrap();
        co_sign(&relayer, &mut t).unwrap();
        assert_eq!(t.relayer_signature.len(), 128);
        // payer signature still holds after co-signing
        assert_eq!(check_sender_signature(&t), SignatureCheck::Valid);

        let mut other = tx(payer.address(), Some(signer(3).address()));
        assert!(co_sign(&relayer, &mut other).is_err());
    }

    #[test]
    fn key_hex_forms() {
        let s = signer(4);
        let seed = hex::encode([4u8; 32]);
        assert_eq!(Ed25519Signer::from_hex(&seed).unwrap().address(), s.address());

        let full = format!("{seed}{}", hex::encode(s.address().as_bytes()));
        assert_eq!(Ed25519Signer::from_hex(&full).unwrap().address(), s.address());

        let mismatched = format!("{seed}{}", hex::encode([0u8; 32]));
        assert!(Ed25519Signer::from_hex(&mismatched).is_err());
        assert!(Ed25519Signer::from_hex("abcd").is_err());
    }
}
