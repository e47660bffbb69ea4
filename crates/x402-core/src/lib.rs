//! Ledger-agnostic x402 authorization verification and settlement engine.
//!
//! A payer signs a bounded, single-use transfer to a fixed destination; a
//! facilitator verifies it and pays the ledger fees to settle it; a resource
//! server negotiates which requirements it accepts. This crate holds the
//! parts every ledger family shares:
//!
//! - [`binding`]: destination, amount bound and validity window folded
//!   into the signed digest
//! - [`scheme`]: the builder / verifier+settler / negotiator capabilities
//! - [`registry`] and [`selection`]: read-only lookup and requirement choice
//! - [`finality`]: deadlines, transient retry, finality polling
//! - [`program`]: the ledger-side settlement entry point
//!
//! Ledger families live in their own crates (`x402-evm`, `x402-multiversx`).
//!
//! # Quick example (payer)
//!
//! ```no_run
//! use std::sync::Arc;
//! use x402::{Deadline, PaymentRequirements, SchemeClient, SchemeRegistry, Selection};
//!
//! # async fn run(builder: Arc<dyn SchemeClient>, accepts: Vec<PaymentRequirements>) {
//! let registry = SchemeRegistry::builder()
//!     .client(x402::X402_VERSION, "multiversx:*", builder)
//!     .build();
//! let payload = registry
//!     .create_payment(x402::X402_VERSION, &accepts, &Selection::new(), Deadline::none())
//!     .await;
//! # }
//! ```

pub mod binding;
pub mod clock;
pub mod constants;
pub mod error;
pub mod finality;
pub mod gas;
pub mod guard;
pub mod network;
pub mod payment;
pub mod program;
pub mod registry;
pub mod response;
pub mod scheme;
pub mod selection;

pub use binding::Binding;
pub use clock::{Clock, FixedClock, SystemClock};
pub use constants::*;
pub use error::{BuildError, ErrorKind, LedgerError, X402Error};
pub use finality::{Deadline, PollConfig, PollOutcome, TxState};
pub use gas::GasSchedule;
pub use network::Network;
pub use payment::*;
pub use registry::{RegistryBuilder, SchemeRegistry, SupportedKind, SupportedResponse};
pub use response::*;
pub use scheme::*;
pub use selection::{Selection, SelectError};

use serde::{Deserialize, Serialize};

/// When a verifier may consult the ledger's dry-run after local checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Never dry-run; the local signature check is final.
    Never,
    /// Dry-run only for signer types the local check cannot express, such
    /// as contract wallets. A conclusive local failure is final.
    #[default]
    ContractSignersOnly,
    /// Dry-run whenever the local signature check fails.
    OnAnyLocalFailure,
}

impl FallbackPolicy {
    /// Whether a local check that did not pass may go to the dry-run.
    /// `locally_expressible` is false for signers the local check cannot model.
    pub fn should_dry_run(&self, locally_expressible: bool) -> bool {
        match self {
            FallbackPolicy::Never => false,
            FallbackPolicy::ContractSignersOnly => !locally_expressible,
            FallbackPolicy::OnAnyLocalFailure => true,
        }
    }
}

impl std::str::FromStr for FallbackPolicy {
    type Err = X402Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(Self::Never),
            "contract_signers_only" => Ok(Self::ContractSignersOnly),
            "on_any_local_failure" => Ok(Self::OnAnyLocalFailure),
            other => Err(X402Error::ConfigError(format!(
                "unknown fallback policy '{other}'"
            ))),
        }
    }
}
