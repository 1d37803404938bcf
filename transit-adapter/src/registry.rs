//! Feed registry: `(region, system)` → upstream feed endpoint.
//!
//! Loaded once at startup from a JSON document and read-only afterwards.
//! Document order is preserved so the background refresher walks feeds in
//! the order an operator wrote them.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

/// Header used to send the feed credential when none is configured.
pub const DEFAULT_CREDENTIAL_HEADER: &str = "x-api-key";

/// A single upstream feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEndpoint {
    pub region: String,
    pub system: String,
    pub url: String,
    /// Name of the environment variable holding the credential.
    pub credential_env_name: Option<String>,
    /// Header the credential is sent in.
    pub credential_header_name: String,
    pub agency_id: Option<String>,
}

/// Errors from registry loading and lookup.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("region not found")]
    UnknownRegion(String),

    #[error("system or feed not found")]
    UnknownSystem { region: String, system: String },

    #[error("failed to read feed registry: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid feed registry: {0}")]
    Json(#[from] serde_json::Error),
}

/// One endpoint object as written in the registry document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndpointDoc {
    url: Option<String>,
    #[serde(alias = "credentialEnvName")]
    api_key_env: Option<String>,
    #[serde(alias = "credentialHeaderName")]
    api_key_header: Option<String>,
    agency_id: Option<String>,
}

/// Read-only registry of feed endpoints.
#[derive(Debug, Clone, Default)]
pub struct FeedRegistry {
    /// Addressable endpoints in document order.
    endpoints: Vec<FeedEndpoint>,

    /// region → system → index into `endpoints`. Systems without a URL are
    /// kept with `None` so the region still resolves.
    index: HashMap<String, HashMap<String, Option<usize>>>,
}

impl FeedRegistry {
    /// Load the registry from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Parse a registry document: `{ region: { system: { url, apiKeyEnv, ... } } }`.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let doc: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;

        let mut registry = Self::default();
        for (region, systems) in doc {
            let systems: serde_json::Map<String, serde_json::Value> =
                serde_json::from_value(systems)?;
            let region_index = registry.index.entry(region.clone()).or_default();

            for (system, entry) in systems {
                let entry: EndpointDoc = serde_json::from_value(entry)?;
                let Some(url) = entry.url.filter(|u| !u.is_empty()) else {
                    region_index.insert(system, None);
                    continue;
                };

                region_index.insert(system.clone(), Some(registry.endpoints.len()));
                registry.endpoints.push(FeedEndpoint {
                    region: region.clone(),
                    system,
                    url,
                    credential_env_name: entry.api_key_env.filter(|v| !v.is_empty()),
                    credential_header_name: entry
                        .api_key_header
                        .filter(|v| !v.is_empty())
                        .unwrap_or_else(|| DEFAULT_CREDENTIAL_HEADER.to_string()),
                    agency_id: entry.agency_id,
                });
            }
        }

        Ok(registry)
    }

    /// Build a registry directly from endpoints (used by tests and tooling).
    pub fn from_endpoints(endpoints: Vec<FeedEndpoint>) -> Self {
        let mut index: HashMap<String, HashMap<String, Option<usize>>> = HashMap::new();
        for (i, e) in endpoints.iter().enumerate() {
            index
                .entry(e.region.clone())
                .or_default()
                .insert(e.system.clone(), Some(i));
        }
        Self { endpoints, index }
    }

    /// Resolve a feed endpoint.
    pub fn lookup(&self, region: &str, system: &str) -> Result<&FeedEndpoint, RegistryError> {
        let systems = self
            .index
            .get(region)
            .ok_or_else(|| RegistryError::UnknownRegion(region.to_string()))?;

        systems
            .get(system)
            .copied()
            .flatten()
            .map(|i| &self.endpoints[i])
            .ok_or_else(|| RegistryError::UnknownSystem {
                region: region.to_string(),
                system: system.to_string(),
            })
    }

    /// Every addressable endpoint, in registry order.
    pub fn list_all(&self) -> &[FeedEndpoint] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Resolves the credential named by a feed endpoint.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns `None` when no credential is available under `name`.
    async fn resolve(&self, name: &str) -> Option<String>;
}

/// Reads credentials from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

#[async_trait]
impl CredentialStore for EnvCredentials {
    async fn resolve(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}

/// Resolve the credential for an endpoint, if it names one.
pub async fn resolve_credential(
    store: &dyn CredentialStore,
    endpoint: &FeedEndpoint,
) -> Option<String> {
    match &endpoint.credential_env_name {
        Some(name) => store.resolve(name).await,
        None => None,
    }
}
