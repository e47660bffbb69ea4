//! x402 facilitator service: verifies payment authorizations and settles
//! them on whichever ledgers this instance is configured for.
//!
//! Resource servers call it with HMAC-authenticated requests. Each request
//! is routed through a [`SchemeRegistry`](x402::SchemeRegistry) by protocol
//! version, network and scheme to the matching ledger family.
//!
//! # Modules
//!
//! - [`routes`]: `/verify`, `/settle`, `/supported`, `/health`, `/metrics`
//! - [`config`]: environment configuration
//! - [`bootstrap`]: registry and [`AppState`](state::AppState) assembly
//! - [`auth`]: body HMAC and bearer token checks
//! - [`metrics`]: Prometheus counters and histograms

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod metrics;
pub mod routes;
pub mod state;
