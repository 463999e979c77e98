use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::DomainError;

// ── Identifiers ──────────────────────────────────────────────────────────────

/// Azure subscription the management client is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Rejects empty and whitespace-only values.
    pub fn new(s: impl Into<String>) -> Result<Self, DomainError> {
        let s = s.into();
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidSubscriptionId(s));
        }
        Ok(SubscriptionId(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A PostgreSQL flexible server, addressed by resource group and name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRef {
    pub resource_group: String,
    pub server_name: String,
}

impl ServerRef {
    pub fn new(
        resource_group: impl Into<String>,
        server_name: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let resource_group = resource_group.into();
        let server_name = server_name.into();
        if resource_group.trim().is_empty() {
            return Err(DomainError::InvalidServerRef("resource group name is empty".into()));
        }
        if server_name.trim().is_empty() {
            return Err(DomainError::InvalidServerRef("server name is empty".into()));
        }
        Ok(ServerRef { resource_group, server_name })
    }
}

impl std::fmt::Display for ServerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.resource_group, self.server_name)
    }
}

// ── Expected configuration ───────────────────────────────────────────────────

/// Configuration parameters the deployment declared for a server, keyed by
/// parameter name. Iteration is lexicographic so every run visits keys in the
/// same order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedConfiguration(pub BTreeMap<String, String>);

impl ExpectedConfiguration {
    pub fn new(entries: BTreeMap<String, String>) -> Self {
        ExpectedConfiguration(entries)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ExpectedConfiguration {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        ExpectedConfiguration(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// ── Deployment outputs ───────────────────────────────────────────────────────

/// Names of the deployment outputs consumed by the check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputNames {
    pub resource_group: String,
    pub server_name: String,
    pub configuration: String,
}

impl Default for OutputNames {
    fn default() -> Self {
        Self {
            resource_group: "resource_group_name".into(),
            server_name: "postgres_server_name".into(),
            configuration: "postgres_server_config".into(),
        }
    }
}

/// Where deployment outputs are read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputSource {
    /// Run `<binary> output -json` inside `dir`.
    Terraform { binary: String, dir: PathBuf },
    /// A document previously captured with `terraform output -json`.
    File { path: PathBuf },
}

impl Default for OutputSource {
    fn default() -> Self {
        OutputSource::Terraform { binary: "terraform".into(), dir: PathBuf::from(".") }
    }
}

// ── Check behaviour ──────────────────────────────────────────────────────────

/// How the expected value of each configuration key is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueMode {
    /// Only the echoed configuration name is asserted. Value differences are
    /// reported as drift but never fail the check.
    #[default]
    NameOnly,
    /// A differing live value fails the check.
    Strict,
}

impl ValueMode {
    pub fn from_compare_values(compare: bool) -> Self {
        if compare { ValueMode::Strict } else { ValueMode::NameOnly }
    }
}

// ── Azure authentication ─────────────────────────────────────────────────────

/// Ambient Azure identity settings gathered from the environment.
/// Secrets are redacted from the `Debug` output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AzureAuthSettings {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Path to a projected service-account token (AKS workload identity).
    pub federated_token_file: Option<PathBuf>,
    /// Set by App Service / Container Apps when a managed identity is attached.
    pub identity_endpoint: Option<String>,
    /// Shared secret that accompanies `identity_endpoint`.
    pub identity_header: Option<String>,
}

impl std::fmt::Debug for AzureAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureAuthSettings")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("federated_token_file", &self.federated_token_file)
            .field("identity_endpoint", &self.identity_endpoint)
            .field("identity_header", &self.identity_header.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Fully-resolved settings for one verification run.
#[derive(Debug, Clone)]
pub struct VerifySettings {
    pub subscription_id: SubscriptionId,
    pub auth: AzureAuthSettings,
    pub outputs: OutputSource,
    pub output_names: OutputNames,
    pub value_mode: ValueMode,
}
