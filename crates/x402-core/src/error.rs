use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by x402 operations that are not protocol verdicts.
#[derive(Debug, Error)]
pub enum X402Error {
    #[error("signature error: {0}")]
    SignatureError(String),

    #[error("chain error: {0}")]
    ChainError(String),

    #[error("invalid payment: {0}")]
    InvalidPayment(String),

    #[error("invalid requirements: {0}")]
    InvalidRequirements(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("unsupported network: {0}")]
    UnsupportedNetwork(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("http error: {0}")]
    HttpError(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

/// Structured reason carried by verify and settle results.
///
/// Serialized in snake_case, e.g. `"amount_exceeds_permitted"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidSignature,
    DestinationMismatch,
    AssetMismatch,
    AmountExceedsPermitted,
    PaymentTooEarly,
    PaymentExpired,
    SimulationFailed,
    BroadcastFailed,
    ExecutionFailed,
    FinalityTimeout,
    NoMatchingScheme,
    BuildError,
    /// The payload could not be decoded into the scheme's authorization shape.
    InvalidPayload,
    /// The requirement targets a network this scheme instance does not serve.
    NetworkMismatch,
    /// The settlement program was entered while already executing.
    Reentrant,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidSignature => "invalid_signature",
            ErrorKind::DestinationMismatch => "destination_mismatch",
            ErrorKind::AssetMismatch => "asset_mismatch",
            ErrorKind::AmountExceedsPermitted => "amount_exceeds_permitted",
            ErrorKind::PaymentTooEarly => "payment_too_early",
            ErrorKind::PaymentExpired => "payment_expired",
            ErrorKind::SimulationFailed => "simulation_failed",
            ErrorKind::BroadcastFailed => "broadcast_failed",
            ErrorKind::ExecutionFailed => "execution_failed",
            ErrorKind::FinalityTimeout => "finality_timeout",
            ErrorKind::NoMatchingScheme => "no_matching_scheme",
            ErrorKind::BuildError => "build_error",
            ErrorKind::InvalidPayload => "invalid_payload",
            ErrorKind::NetworkMismatch => "network_mismatch",
            ErrorKind::Reentrant => "reentrant",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure talking to a ledger node.
///
/// Only [`LedgerError::Transient`] is retried by the engine; the other
/// variants surface immediately.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("transient ledger error: {0}")]
    Transient(String),

    #[error("ledger rejected request: {0}")]
    Rejected(String),

    #[error("ledger response decode failed: {0}")]
    Decode(String),
}

impl LedgerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Transient(_))
    }
}

/// Errors produced while building a signed authorization on the payer side.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no signing capability configured")]
    MissingSigner,

    #[error("could not resolve payer sequence number: {0}")]
    SequenceUnavailable(#[source] LedgerError),

    #[error("invalid amount '{0}': expected a non-negative integer string")]
    InvalidAmount(String),

    #[error("invalid requirements: {0}")]
    InvalidRequirements(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("deadline elapsed before the authorization was built")]
    DeadlineElapsed,
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::BuildError
    }
}

impl From<BuildError> for X402Error {
    fn from(e: BuildError) -> Self {
        X402Error::InvalidPayment(e.to_string())
    }
}
