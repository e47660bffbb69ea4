//! Ledger access through the MultiversX REST API gateway.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use x402::{LedgerError, TxState};

use crate::address::Address;
use crate::transaction::Transaction;

/// Per-request timeout of [`ApiClient`].
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The four ledger calls the builder, verifier and settler need.
#[async_trait]
pub trait MultiversXRpc: Send + Sync {
    /// Next sequence number the ledger will accept from `address`.
    async fn get_account_nonce(&self, address: &Address) -> Result<u64, LedgerError>;

    /// Dry-run a fully signed transaction against current state.
    async fn simulate(&self, tx: &Transaction) -> Result<TxState, LedgerError>;

    /// Broadcast; returns the transaction hash.
    async fn send(&self, tx: &Transaction) -> Result<String, LedgerError>;

    async fn status(&self, hash: &str) -> Result<TxState, LedgerError>;
}

/// Map the gateway's status vocabulary onto [`TxState`].
pub fn classify_status(status: &str) -> TxState {
    match status.to_ascii_lowercase().as_str() {
        "success" | "successful" | "executed" => TxState::Success,
        "fail" | "failed" | "invalid" => TxState::Failed,
        _ => TxState::Pending,
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    error: String,
    #[serde(default)]
    code: String,
}

#[derive(Deserialize)]
struct AccountBody {
    nonce: Option<u64>,
    data: Option<AccountData>,
}

#[derive(Deserialize)]
struct AccountData {
    account: AccountNonce,
}

#[derive(Deserialize)]
struct AccountNonce {
    nonce: u64,
}

#[derive(Deserialize)]
struct SimulationData {
    result: SimulationResult,
}

#[derive(Deserialize)]
struct SimulationResult {
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendData {
    tx_hash: String,
}

#[derive(Deserialize)]
struct StatusData {
    status: String,
}

/// [`MultiversXRpc`] over the public REST API (`api.multiversx.com` and
/// friends) or a self-hosted proxy with the same routes.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn read<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, LedgerError> {
        let resp = request
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(classify_transport)?;
        let status = resp.status();
        let body = resp.text().await.map_err(classify_transport)?;

        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LedgerError::Transient(format!("gateway returned {status}")));
        }
        if status.is_client_error() {
            return Err(LedgerError::Rejected(format!(
                "gateway returned {status}: {}",
                truncate(&body)
            )));
        }
        serde_json::from_str(&body).map_err(|e| LedgerError::Decode(e.to_string()))
    }

    async fn read_envelope<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, LedgerError> {
        let envelope: Envelope<T> = self.read(request).await?;
        if !envelope.error.is_empty() {
            return Err(LedgerError::Rejected(if envelope.code.is_empty() {
                envelope.error
            } else {
                format!("{} ({})", envelope.error, envelope.code)
            }));
        }
        envelope
            .data
            .ok_or_else(|| LedgerError::Decode("response has no data".to_string()))
    }
}

fn classify_transport(e: reqwest::Error) -> LedgerError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        LedgerError::Transient(e.to_string())
    } else if e.is_decode() || e.is_body() {
        LedgerError::Decode(e.to_string())
    } else {
        LedgerError::Rejected(e.to_string())
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((i, _)) => &body[..i],
        None => body,
    }
}

#[async_trait]
impl MultiversXRpc for ApiClient {
    async fn get_account_nonce(&self, address: &Address) -> Result<u64, LedgerError> {
        let url = format!("{}/accounts/{}", self.base_url, address);
        let body: AccountBody = self.read(self.http.get(&url)).await?;
        body.nonce
            .or(body.data.map(|d| d.account.nonce))
            .ok_or_else(|| LedgerError::Decode("account response has no nonce".to_string()))
    }

    async fn simulate(&self, tx: &Transaction) -> Result<TxState, LedgerError> {
        let url = format!("{}/transaction/simulate", self.base_url);
        let body = tx
            .gateway_body()
            .map_err(|e| LedgerError::Decode(e.to_string()))?;
        let data: SimulationData = self
            .read_envelope(self.http.post(&url).json(&body))
            .await?;
        tracing::debug!(status = %data.result.status, "simulation finished");
        Ok(classify_status(&data.result.status))
    }

    async fn send(&self, tx: &Transaction) -> Result<String, LedgerError> {
        let url = format!("{}/transaction/send", self.base_url);
        let body = tx
            .gateway_body()
            .map_err(|e| LedgerError::Decode(e.to_string()))?;
        let data: SendData = self
            .read_envelope(self.http.post(&url).json(&body))
            .await?;
        Ok(data.tx_hash)
    }

    async fn status(&self, hash: &str) -> Result<TxState, LedgerError> {
        let url = format!("{}/transaction/{}/status", self.base_url, hash);
        let data: StatusData = self.read_envelope(self.http.get(&url)).await?;
        Ok(classify_status(&data.status))
    }
}
