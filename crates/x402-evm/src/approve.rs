//! One-off tool: grant the settlement contract an ERC-20 allowance so the
//! payer's authorizations can be settled without a permit.

use std::time::Duration;

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, U256};
use alloy::providers::ProviderBuilder;
use alloy::signers::local::PrivateKeySigner;

use x402_evm::config::BASE_RPC_URL;
use x402_evm::IERC20;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let payer_key = std::env::var("EVM_PRIVATE_KEY")
        .expect("EVM_PRIVATE_KEY environment variable is required");

    let settlement_contract: Address = std::env::var("EVM_SETTLEMENT_CONTRACT")
        .expect("EVM_SETTLEMENT_CONTRACT environment variable is required")
        .parse()
        .expect("invalid EVM_SETTLEMENT_CONTRACT");

    let token: Address = std::env::var("EVM_TOKEN")
        .expect("EVM_TOKEN environment variable is required")
        .parse()
        .expect("invalid EVM_TOKEN");

    let rpc_url = std::env::var("EVM_RPC_URL").unwrap_or_else(|_| BASE_RPC_URL.to_string());

    let approve_amount: U256 = match std::env::var("APPROVE_AMOUNT") {
        Ok(val) => x402::parse_atomic_amount(&val)
            .expect("invalid APPROVE_AMOUNT -- must be an integer in atomic units"),
        Err(_) => {
            tracing::warn!(
                "APPROVE_AMOUNT not set -- using U256::MAX. \
                 Authorizations still cap each transfer at their amount bound."
            );
            U256::MAX
        }
    };

    let signer: PrivateKeySigner = payer_key.parse().expect("invalid EVM_PRIVATE_KEY");
    let payer = signer.address();

    println!("Approving settlement contract for ERC-20 token...");
    println!("  Payer:      {payer}");
    println!("  Settlement: {settlement_contract}");
    println!("  Token:      {token}");
    println!("  Amount:     {approve_amount}");

    let provider = ProviderBuilder::new()
        .wallet(EthereumWallet::from(signer))
        .connect_http(rpc_url.parse().expect("invalid EVM_RPC_URL"));
    let erc20 = IERC20::new(token, &provider);

    let current = erc20
        .allowance(payer, settlement_contract)
        .call()
        .await
        .expect("failed to read allowance");
    println!("\nCurrent allowance: {current}");

    if current >= approve_amount {
        println!("Settlement contract already has sufficient allowance -- nothing to do.");
        return;
    }

    println!("Sending approval transaction...");
    let pending = erc20
        .approve(settlement_contract, approve_amount)
        .send()
        .await
        .expect("approve send failed");
    println!("  tx: {}", pending.tx_hash());

    let receipt = tokio::time::timeout(Duration::from_secs(60), pending.get_receipt())
        .await
        .expect("approval receipt timed out after 60s")
        .expect("approval receipt failed");

    if !receipt.status() {
        eprintln!("Approval reverted.");
        std::process::exit(1);
    }
    println!("Approval confirmed.");
}
