//! x402 `exact` scheme for MultiversX.
//!
//! The payer signs a complete transfer transaction (Ed25519 over the
//! canonical JSON form). The binding's canonical bytes are the last `@`
//! argument of the data field, so the transaction signature covers the
//! destination, amount bound and validity window. Native EGLD moves as the
//! transaction value; ESDT tokens move through a `MultiESDTNFTTransfer`
//! self-call.
//!
//! A transaction may name a relayer. The facilitator co-signs those with
//! its own key and pays the fees; it refuses to co-sign for anyone else.
//! Replay protection is the ledger's account nonce.
//!
//! - **Builder** ([`MultiversXSchemeClient`]) signs transfers
//! - **Verifier/Settler** ([`MultiversXSchemeFacilitator`]) checks, co-signs
//!   and broadcasts them
//! - **Negotiator** ([`MultiversXSchemeServer`]) validates and enhances
//!   requirements
//!
//! Ledger access goes through [`MultiversXRpc`]; [`ApiClient`] implements
//! it over the public REST gateway.

pub mod address;
pub mod config;
pub mod esdt;
pub mod rpc;
pub mod signer;
pub mod transaction;

pub mod client;
pub mod facilitator;
pub mod server;

pub use address::{is_valid_address, Address, AddressError};
pub use client::MultiversXSchemeClient;
pub use config::{chain_id_for_network, is_valid_token_id, MultiversXConfig};
pub use esdt::EsdtTransfer;
pub use facilitator::MultiversXSchemeFacilitator;
pub use rpc::{classify_status, ApiClient, MultiversXRpc};
pub use server::MultiversXSchemeServer;
pub use signer::{Ed25519Signer, MultiversXSigner};
pub use transaction::Transaction;
