use serde::{Deserialize, Serialize};

use crate::ErrorKind;

/// Outcome of a single verify call. Produced fresh, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl VerifyResponse {
    pub fn valid(payer: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            invalid_reason: None,
            payer: Some(payer.into()),
        }
    }

    pub fn invalid(reason: ErrorKind, payer: Option<String>) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason),
            payer,
        }
    }
}

/// Outcome of one settlement attempt. The ledger is the durable record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
    /// Transaction reference, present whenever a broadcast was accepted,
    /// including failed and timed-out settlements.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    pub network: String,
}

impl SettleResponse {
    pub fn success(payer: Option<String>, transaction: String, network: &str) -> Self {
        Self {
            success: true,
            error_reason: None,
            payer,
            transaction: Some(transaction),
            network: network.to_string(),
        }
    }

    pub fn failure(
        reason: ErrorKind,
        payer: Option<String>,
        transaction: Option<String>,
        network: &str,
    ) -> Self {
        Self {
            success: false,
            error_reason: Some(reason),
            payer,
            transaction,
            network: network.to_string(),
        }
    }

    /// Carry a failed re-verification through as a settlement failure.
    pub fn rejected(check: VerifyResponse, network: &str) -> Self {
        Self::failure(
            check.invalid_reason.unwrap_or(ErrorKind::InvalidPayload),
            check.payer,
            None,
            network,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_response_wire_format() {
        let v = VerifyResponse::invalid(ErrorKind::PaymentExpired, Some("erd1abc".into()));
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["isValid"], false);
        assert_eq!(json["invalidReason"], "payment_expired");
        assert_eq!(json["payer"], "erd1abc");

        let ok = serde_json::to_value(VerifyResponse::valid("erd1abc")).unwrap();
        assert!(ok.get("invalidReason").is_none());
    }

    #[test]
    fn timed_out_settlement_keeps_transaction() {
        let s = SettleResponse::failure(
            ErrorKind::FinalityTimeout,
            None,
            Some("abcd".into()),
            "multiversx:D",
        );
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["errorReason"], "finality_timeout");
        assert_eq!(json["transaction"], "abcd");
    }

    #[test]
    fn rejected_carries_verify_reason() {
        let check = VerifyResponse::invalid(ErrorKind::DestinationMismatch, None);
        let s = SettleResponse::rejected(check, "eip155:1");
        assert!(!s.success);
        assert_eq!(s.error_reason, Some(ErrorKind::DestinationMismatch));
        assert!(s.transaction.is_none());
    }
}
