//! x402 `exact` scheme for EVM ledgers.
//!
//! The payer signs an EIP-712 [`PaymentAuthorization`] whose [`Binding`]
//! sub-struct carries the destination, amount bound and validity window, so
//! the facilitator cannot redirect funds without invalidating the signature.
//! Settlement goes through an on-chain [`IX402Settlement`] contract that
//! pulls the requested amount and forwards it to the binding destination in
//! one call.
//!
//! - **Builder** ([`EvmSchemeClient`]) signs authorizations
//! - **Verifier/Settler** ([`EvmSchemeFacilitator`]) checks and settles them
//! - **Negotiator** ([`EvmSchemeServer`]) validates and enhances requirements

pub mod config;
pub mod eip712;
pub mod payload;

pub mod client;
pub mod facilitator;
pub mod server;

use alloy::sol;

// EIP-712 types and the settlement contract, in one block so the interface
// can resolve the struct ABI. sol! derives SolStruct, which gives
// eip712_signing_hash() over the nested struct encoding.
sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct Binding {
        address destination;
        uint256 amountBound;
        uint256 validAfter;
        uint256 validBefore;
        bytes extra;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct TransferDescriptor {
        address token;
        bytes32 nonce;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct PaymentAuthorization {
        address from;
        TransferDescriptor transfer;
        Binding binding;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct Permit {
        uint256 value;
        uint256 deadline;
        uint8 v;
        bytes32 r;
        bytes32 s;
    }

    // Settlement contract entry points.
    #[sol(rpc)]
    interface IX402Settlement {
        function settle(
            TransferDescriptor transfer,
            uint256 requestedAmount,
            address payer,
            Binding binding,
            bytes signature
        ) external;

        function settleWithPermit(
            TransferDescriptor transfer,
            uint256 requestedAmount,
            address payer,
            Binding binding,
            bytes signature,
            Permit permit
        ) external;
    }
}

// ERC-20 subset used by the approval tool.
sol! {
    #[sol(rpc)]
    interface IERC20 {
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) external returns (bool);
    }
}

pub use client::EvmSchemeClient;
pub use config::EvmChainConfig;
pub use facilitator::EvmSchemeFacilitator;
pub use payload::{EvmAuthorization, EvmPayload, EvmPermit};
pub use server::EvmSchemeServer;
