use std::sync::Arc;
use std::time::Instant;

use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use x402::{
    ErrorKind, PaymentPayload, PaymentRequirements, SchemeFacilitator, SettleResponse,
    VerifyResponse,
};

use crate::auth;
use crate::metrics;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}

/// Route by the payload's protocol version and the requirement's network
/// and scheme.
fn resolve(state: &AppState, request: &PaymentRequest) -> Option<Arc<dyn SchemeFacilitator>> {
    state.registry.facilitator(
        request.payment_payload.x402_version,
        &request.payment_requirements.network,
        &request.payment_requirements.scheme,
    )
}

/// Authenticate and decode a `/verify` or `/settle` body.
fn accept(req: &HttpRequest, state: &AppState, body: &[u8]) -> Result<PaymentRequest, HttpResponse> {
    auth::require_hmac(req, body, &state.hmac_secret)?;
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "undecodable request body");
        HttpResponse::BadRequest().json(serde_json::json!({
            "error": "invalid request body",
            "isValid": false,
            "success": false,
            "invalidReason": ErrorKind::InvalidPayload,
            "errorReason": ErrorKind::InvalidPayload,
        }))
    })
}

#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let networks: Vec<String> = state
        .registry
        .supported()
        .kinds
        .into_iter()
        .map(|k| k.network)
        .collect();
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "x402-facilitator",
        "networks": networks,
    }))
}

#[get("/metrics")]
pub async fn metrics_endpoint(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    match &state.metrics_token {
        Some(token) => {
            if !auth::bearer_matches(&req, token) {
                return HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /metrics"
                }));
            }
        }
        None if !state.public_metrics => {
            return HttpResponse::Forbidden().json(serde_json::json!({
                "error": "forbidden",
                "message": "Set METRICS_TOKEN or X402_PUBLIC_METRICS=true to access /metrics"
            }));
        }
        None => {}
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::metrics_output())
}

#[get("/supported")]
pub async fn supported(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.registry.supported())
}

#[post("/verify")]
pub async fn verify(req: HttpRequest, state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    let parsed = match accept(&req, &state, &body) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let Some(facilitator) = resolve(&state, &parsed) else {
        metrics::VERIFY_REQUESTS
            .with_label_values(&["unknown", "invalid"])
            .inc();
        tracing::info!(
            network = %parsed.payment_requirements.network,
            scheme = %parsed.payment_requirements.scheme,
            version = parsed.payment_payload.x402_version,
            "no facilitator for requirement"
        );
        return HttpResponse::Ok().json(VerifyResponse::invalid(ErrorKind::NoMatchingScheme, None));
    };

    let network = facilitator.caip_family();
    let start = Instant::now();
    let outcome = facilitator
        .verify(&parsed.payment_payload, &parsed.payment_requirements, state.deadline())
        .await;
    metrics::VERIFY_LATENCY
        .with_label_values(&[network.as_str()])
        .observe(start.elapsed().as_secs_f64());

    match outcome {
        Ok(result) => {
            let label = if result.is_valid { "valid" } else { "invalid" };
            metrics::VERIFY_REQUESTS
                .with_label_values(&[network.as_str(), label])
                .inc();
            HttpResponse::Ok().json(result)
        }
        Err(e) => {
            metrics::VERIFY_REQUESTS
                .with_label_values(&[network.as_str(), "error"])
                .inc();
            tracing::error!(error = %e, network = %network, "verification internal error");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "isValid": false,
                "error": "verification failed",
            }))
        }
    }
}

#[post("/settle")]
pub async fn settle(req: HttpRequest, state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    let parsed = match accept(&req, &state, &body) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let Some(facilitator) = resolve(&state, &parsed) else {
        metrics::SETTLE_REQUESTS
            .with_label_values(&["unknown", "rejected"])
            .inc();
        return HttpResponse::Ok().json(SettleResponse::failure(
            ErrorKind::NoMatchingScheme,
            None,
            None,
            &parsed.payment_requirements.network,
        ));
    };

    let network = facilitator.caip_family();
    let start = Instant::now();
    let outcome = facilitator
        .settle(&parsed.payment_payload, &parsed.payment_requirements, state.deadline())
        .await;
    let elapsed = start.elapsed().as_secs_f64();

    match outcome {
        Ok(result) => {
            let label = if result.success { "success" } else { "rejected" };
            metrics::SETTLE_REQUESTS
                .with_label_values(&[network.as_str(), label])
                .inc();
            metrics::SETTLE_LATENCY
                .with_label_values(&[network.as_str(), label])
                .observe(elapsed);
            if result.success {
                tracing::info!(
                    payer = ?result.payer,
                    tx = ?result.transaction,
                    network = %result.network,
                    "settlement completed"
                );
            } else {
                tracing::warn!(
                    payer = ?result.payer,
                    tx = ?result.transaction,
                    reason = result.error_reason.map(|r| r.as_str()).unwrap_or("unknown"),
                    "settlement not completed"
                );
            }
            HttpResponse::Ok().json(result)
        }
        Err(e) => {
            metrics::SETTLE_REQUESTS
                .with_label_values(&[network.as_str(), "error"])
                .inc();
            metrics::SETTLE_LATENCY
                .with_label_values(&[network.as_str(), "error"])
                .observe(elapsed);
            tracing::error!(error = %e, network = %network, "settlement internal error");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "success": false,
                "error": "settlement failed",
                "network": parsed.payment_requirements.network,
            }))
        }
    }
}

/// Register every facilitator route on an app or scope.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(metrics_endpoint)
        .service(supported)
        .service(verify)
        .service(settle);
}
