use std::time::Duration;

use x402::{Deadline, SchemeRegistry};

/// Shared application state for the facilitator service.
pub struct AppState {
    /// Every ledger family this instance verifies and settles.
    pub registry: SchemeRegistry,
    /// HMAC key for `/verify` and `/settle`. Mandatory.
    pub hmac_secret: Vec<u8>,
    /// Bearer token for `/metrics`, separate from the HMAC key.
    pub metrics_token: Option<Vec<u8>>,
    pub public_metrics: bool,
    /// Upper bound on a single verify or settle call.
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(registry: SchemeRegistry, hmac_secret: Vec<u8>) -> Self {
        Self {
            registry,
            hmac_secret,
            metrics_token: None,
            public_metrics: false,
            request_timeout: crate::config::DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.request_timeout)
    }
}
