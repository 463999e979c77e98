use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pgverify_domain::{ServerRef, SubscriptionId};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::cloud::CloudEndpoints;
use crate::credential::TokenProvider;
use crate::error::AzureError;

/// `Microsoft.DBforPostgreSQL/flexibleServers` API version.
pub const API_VERSION: &str = "2022-12-01";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on `nextLink` pages followed by `list_by_server`.
const MAX_PAGES: usize = 50;

// ── Resource model ────────────────────────────────────────────────────────────

/// One server parameter as returned by ARM. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfiguration {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub properties: ConfigurationProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationProperties {
    pub value: Option<String>,
    pub description: Option<String>,
    pub default_value: Option<String>,
    pub data_type: Option<String>,
    pub allowed_values: Option<String>,
    pub source: Option<String>,
    pub is_dynamic_config: Option<bool>,
    pub is_read_only: Option<bool>,
    pub is_config_pending_restart: Option<bool>,
    pub unit: Option<String>,
    pub documentation_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigurationPage {
    #[serde(default)]
    value: Vec<ServerConfiguration>,
    next_link: Option<String>,
}

// ── Lookup seam ───────────────────────────────────────────────────────────────

/// What the verification check needs from the management API.
#[async_trait]
pub trait ConfigurationLookup: Send + Sync {
    /// Acquire a credential without touching the server. Called once before
    /// any lookup so an auth failure surfaces on its own.
    async fn authenticate(&self) -> Result<(), AzureError>;

    async fn get_configuration(
        &self,
        server: &ServerRef,
        name: &str,
    ) -> Result<ServerConfiguration, AzureError>;
}

// ── Client ────────────────────────────────────────────────────────────────────

/// Reads flexible-server configurations in one subscription.
pub struct ConfigurationsClient {
    subscription: SubscriptionId,
    credential:   Arc<dyn TokenProvider>,
    client:       reqwest::Client,
    management:   Url,
}

impl ConfigurationsClient {
    pub fn new(
        subscription: SubscriptionId,
        credential: Arc<dyn TokenProvider>,
        endpoints: &CloudEndpoints,
    ) -> Result<Self, AzureError> {
        let management = Url::parse(&endpoints.management).map_err(|e| {
            AzureError::ClientConstruction(format!(
                "invalid management endpoint {:?}: {}",
                endpoints.management, e
            ))
        })?;
        if management.cannot_be_a_base() {
            return Err(AzureError::ClientConstruction(format!(
                "management endpoint {:?} cannot be a base URL",
                endpoints.management
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AzureError::ClientConstruction(e.to_string()))?;
        Ok(Self { subscription, credential, client, management })
    }

    pub fn subscription(&self) -> &SubscriptionId {
        &self.subscription
    }

    /// Fetch one named configuration of a server.
    pub async fn get(
        &self,
        server: &ServerRef,
        name: &str,
    ) -> Result<ServerConfiguration, AzureError> {
        let url = self.configurations_url(server, Some(name));
        let (status, body) = self.arm_get(&url).await?;

        if status == 404 {
            return Err(AzureError::NotFound {
                resource: format!("configuration '{}' on server {}", name, server),
                message: parse_arm_error(&body),
            });
        }
        if !(200..300).contains(&status) {
            return Err(AzureError::Api {
                url: url.to_string(),
                status,
                message: parse_arm_error(&body),
            });
        }
        serde_json::from_value(body).map_err(|e| AzureError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// Every configuration of a server, following `nextLink` paging.
    pub async fn list_by_server(
        &self,
        server: &ServerRef,
    ) -> Result<Vec<ServerConfiguration>, AzureError> {
        let mut out = Vec::new();
        let mut next = Some(self.configurations_url(server, None));
        let mut pages = 0;

        while let Some(url) = next.take() {
            pages += 1;
            if pages > MAX_PAGES {
                return Err(AzureError::Decode {
                    url: url.to_string(),
                    message: format!("more than {} pages of configurations", MAX_PAGES),
                });
            }

            let (status, body) = self.arm_get(&url).await?;
            if status == 404 {
                return Err(AzureError::NotFound {
                    resource: format!("server {}", server),
                    message: parse_arm_error(&body),
                });
            }
            if !(200..300).contains(&status) {
                return Err(AzureError::Api {
                    url: url.to_string(),
                    status,
                    message: parse_arm_error(&body),
                });
            }
            let page: ConfigurationPage =
                serde_json::from_value(body).map_err(|e| AzureError::Decode {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
            out.extend(page.value);

            next = match page.next_link {
                Some(link) if !link.is_empty() => {
                    Some(Url::parse(&link).map_err(|e| AzureError::Decode {
                        url: url.to_string(),
                        message: format!("invalid nextLink {:?}: {}", link, e),
                    })?)
                }
                _ => None,
            };
        }
        Ok(out)
    }

    fn configurations_url(&self, server: &ServerRef, name: Option<&str>) -> Url {
        let mut url = self.management.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "subscriptions",
                self.subscription.as_str(),
                "resourceGroups",
                server.resource_group.as_str(),
                "providers",
                "Microsoft.DBforPostgreSQL",
                "flexibleServers",
                server.server_name.as_str(),
                "configurations",
            ]);
            if let Some(name) = name {
                segments.push(name);
            }
        }
        url.query_pairs_mut().append_pair("api-version", API_VERSION);
        url
    }

    async fn arm_get(&self, url: &Url) -> Result<(u16, Value), AzureError> {
        let token = self.credential.token().await?;
        debug!(url = %url, "Azure ARM GET");
        let resp = self
            .client
            .get(url.clone())
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| AzureError::Transport { url: url.to_string(), source: e })?;

        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        Ok((status, body))
    }
}

#[async_trait]
impl ConfigurationLookup for ConfigurationsClient {
    async fn authenticate(&self) -> Result<(), AzureError> {
        self.credential.token().await.map(|_| ())
    }

    async fn get_configuration(
        &self,
        server: &ServerRef,
        name: &str,
    ) -> Result<ServerConfiguration, AzureError> {
        self.get(server, name).await
    }
}

// ── ARM error parsing ─────────────────────────────────────────────────────────

fn parse_arm_error(body: &Value) -> String {
    let err = body
        .get("error")
        .or_else(|| body.get("Error"))
        .unwrap_or(body);
    let code    = err["code"].as_str().unwrap_or("Unknown");
    let message = err["message"].as_str().unwrap_or("unknown error");
    format!("{}: {}", code, message)
}
