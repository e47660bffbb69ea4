//! Read-only scheme registry: `version -> network -> scheme -> implementation`.
//!
//! Populated once through [`RegistryBuilder`] at startup and never mutated
//! afterwards. Network keys are either exact CAIP-2 ids (`multiversx:D`) or
//! family wildcards (`multiversx:*`); an exact key wins over the wildcard.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::network::Network;
use crate::scheme::{SchemeClient, SchemeFacilitator, SchemeServer};

type SchemeMap<T> = BTreeMap<u32, BTreeMap<String, BTreeMap<String, Arc<T>>>>;

/// One (version, scheme, network) combination a facilitator can settle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    pub x402_version: u32,
    pub scheme: String,
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Body of `GET /supported`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupportedResponse {
    pub kinds: Vec<SupportedKind>,
    /// Fee-payer addresses keyed by network pattern.
    pub signers: BTreeMap<String, Vec<String>>,
}

pub struct RegistryBuilder {
    clients: SchemeMap<dyn SchemeClient>,
    facilitators: SchemeMap<dyn SchemeFacilitator>,
    servers: SchemeMap<dyn SchemeServer>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            clients: BTreeMap::new(),
            facilitators: BTreeMap::new(),
            servers: BTreeMap::new(),
        }
    }

    pub fn client(
        mut self,
        version: u32,
        network: impl Into<String>,
        client: Arc<dyn SchemeClient>,
    ) -> Self {
        let scheme = client.scheme().to_string();
        insert(&mut self.clients, version, network.into(), scheme, client);
        self
    }

    /// Registers under the facilitator's own [`SchemeFacilitator::caip_family`].
    pub fn facilitator(mut self, version: u32, facilitator: Arc<dyn SchemeFacilitator>) -> Self {
        let scheme = facilitator.scheme().to_string();
        let network = facilitator.caip_family();
        insert(&mut self.facilitators, version, network, scheme, facilitator);
        self
    }

    pub fn server(mut self, version: u32, server: Arc<dyn SchemeServer>) -> Self {
        let scheme = server.scheme().to_string();
        let network = server.network().to_string();
        insert(&mut self.servers, version, network, scheme, server);
        self
    }

    pub fn build(self) -> SchemeRegistry {
        SchemeRegistry {
            clients: self.clients,
            facilitators: self.facilitators,
            servers: self.servers,
        }
    }
}

fn insert<T: ?Sized>(
    map: &mut SchemeMap<T>,
    version: u32,
    network: String,
    scheme: String,
    value: Arc<T>,
) {
    let previous = map
        .entry(version)
        .or_default()
        .entry(network.clone())
        .or_default()
        .insert(scheme.clone(), value);
    if previous.is_some() {
        tracing::warn!(version, %network, %scheme, "scheme registered twice, keeping the last one");
    }
}

fn lookup<'a, T: ?Sized>(
    map: &'a SchemeMap<T>,
    version: u32,
    network: &str,
    scheme: &str,
) -> Option<&'a Arc<T>> {
    let networks = map.get(&version)?;
    if let Some(found) = networks.get(network).and_then(|s| s.get(scheme)) {
        return Some(found);
    }
    let wildcard = network.parse::<Network>().ok()?.family_wildcard();
    networks.get(&wildcard).and_then(|s| s.get(scheme))
}

/// Constructed once, then shared read-only (typically behind an `Arc`).
pub struct SchemeRegistry {
    clients: SchemeMap<dyn SchemeClient>,
    facilitators: SchemeMap<dyn SchemeFacilitator>,
    servers: SchemeMap<dyn SchemeServer>,
}

impl SchemeRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn client(&self, version: u32, network: &str, scheme: &str) -> Option<Arc<dyn SchemeClient>> {
        lookup(&self.clients, version, network, scheme).cloned()
    }

    pub fn facilitator(
        &self,
        version: u32,
        network: &str,
        scheme: &str,
    ) -> Option<Arc<dyn SchemeFacilitator>> {
        lookup(&self.facilitators, version, network, scheme).cloned()
    }

    pub fn server(&self, version: u32, network: &str, scheme: &str) -> Option<Arc<dyn SchemeServer>> {
        lookup(&self.servers, version, network, scheme).cloned()
    }

    /// Every registered facilitator kind, plus fee-payer addresses per network.
    pub fn supported(&self) -> SupportedResponse {
        let mut response = SupportedResponse::default();
        for (version, networks) in &self.facilitators {
            for (network, schemes) in networks {
                for (scheme, facilitator) in schemes {
                    response.kinds.push(SupportedKind {
                        x402_version: *version,
                        scheme: scheme.clone(),
                        network: network.clone(),
                        extra: facilitator.extra(),
                    });
                    let signers = response.signers.entry(network.clone()).or_default();
                    for s in facilitator.signers() {
                        if !signers.contains(&s) {
                            signers.push(s);
                        }
                    }
                }
            }
        }
        response
    }
}
