//! Request authentication: HMAC-SHA256 over the raw body for `/verify` and
//! `/settle`, bearer token for `/metrics`.

use actix_web::{HttpRequest, HttpResponse};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::metrics;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC of the request body.
pub const AUTH_HEADER: &str = "X-Facilitator-Auth";

/// Hex-encoded HMAC-SHA256 of `body`. Callers sign requests with this.
pub fn compute_hmac(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex HMAC. Undecodable hex is compared as zeros.
pub fn verify_hmac(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    let expected = hex::decode(signature).unwrap_or_else(|_| vec![0u8; 32]);
    mac.verify_slice(&expected).is_ok()
}

/// Compares SHA-256 digests so neither content nor length leaks through timing.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    Sha256::digest(a).ct_eq(&Sha256::digest(b)).into()
}

/// Reject the request unless it carries a valid body HMAC.
pub fn require_hmac(req: &HttpRequest, body: &[u8], secret: &[u8]) -> Result<(), HttpResponse> {
    match req.headers().get(AUTH_HEADER).and_then(|v| v.to_str().ok()) {
        Some(sig) if verify_hmac(secret, body, sig) => Ok(()),
        Some(_) => {
            tracing::warn!(path = %req.path(), "HMAC verification failed");
            metrics::AUTH_FAILURES.with_label_values(&["invalid"]).inc();
            Err(HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "authentication failed"
            })))
        }
        None => {
            tracing::warn!(path = %req.path(), "HMAC header missing");
            metrics::AUTH_FAILURES.with_label_values(&["missing"]).inc();
            Err(HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "authentication required"
            })))
        }
    }
}

/// Whether the request presents `token` as a bearer token.
pub fn bearer_matches(req: &HttpRequest, token: &[u8]) -> bool {
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|t| constant_time_eq(t.as_bytes(), token))
}
