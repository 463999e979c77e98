use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pgverify_domain::AzureAuthSettings;
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cloud::CloudEndpoints;
use crate::error::AzureError;

/// IMDS is link-local; when it is absent the connect attempt should give up fast.
const IMDS_TIMEOUT: Duration = Duration::from_secs(2);
const MANAGED_IDENTITY_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ── Token provider ────────────────────────────────────────────────────────────

/// Source of bearer tokens for the management endpoint.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn token(&self) -> Result<String, AzureError>;
}

// ── Cache ─────────────────────────────────────────────────────────────────────

/// Holds one token until a minute before it expires.
#[derive(Default)]
struct TokenCache(Mutex<Option<(String, Instant)>>);

impl TokenCache {
    async fn get(&self) -> Option<String> {
        let guard = self.0.lock().await;
        match guard.as_ref() {
            Some((tok, expiry)) if Instant::now() < *expiry => Some(tok.clone()),
            _ => None,
        }
    }

    async fn put(&self, tok: &str, expires_in: u64) {
        let expiry = Instant::now() + Duration::from_secs(expires_in.saturating_sub(60));
        *self.0.lock().await = Some((tok.to_string(), expiry));
    }
}

/// `expires_in` is a number from Entra ID and a string from IMDS / App Service.
fn expires_in(resp: &Value) -> u64 {
    match &resp["expires_in"] {
        Value::Number(n) => n.as_u64().unwrap_or(3600),
        Value::String(s) => s.parse::<u64>().unwrap_or(3600),
        _ => 3600,
    }
}

fn access_token(resp: &Value, source: &str) -> Result<String, AzureError> {
    resp["access_token"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| {
            let detail = resp["error_description"]
                .as_str()
                .or_else(|| resp["error"].as_str())
                .unwrap_or("no access_token in response");
            AzureError::Credential(format!("{}: {}", source, detail))
        })
}

// ── Service Principal ─────────────────────────────────────────────────────────

/// Client-credentials grant with a client secret.
pub struct ServicePrincipalCredential {
    tenant_id:     String,
    client_id:     String,
    client_secret: String,
    endpoints:     CloudEndpoints,
    client:        reqwest::Client,
    cache:         TokenCache,
}

impl ServicePrincipalCredential {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        endpoints: CloudEndpoints,
    ) -> Self {
        Self {
            tenant_id:     tenant_id.into(),
            client_id:     client_id.into(),
            client_secret: client_secret.into(),
            endpoints,
            client:        reqwest::Client::new(),
            cache:         TokenCache::default(),
        }
    }
}

#[async_trait]
impl TokenProvider for ServicePrincipalCredential {
    fn kind(&self) -> &'static str {
        "service-principal"
    }

    async fn token(&self) -> Result<String, AzureError> {
        if let Some(tok) = self.cache.get().await {
            return Ok(tok);
        }

        let url = format!("{}/{}/oauth2/v2.0/token", self.endpoints.login, self.tenant_id);
        let scope = self.endpoints.management_scope();
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope.as_str()),
        ];
        let resp: Value = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AzureError::Credential(format!("SP token request: {}", e)))?
            .json()
            .await
            .map_err(|e| AzureError::Credential(format!("SP token decode: {}", e)))?;

        let tok = access_token(&resp, "SP token")?;
        self.cache.put(&tok, expires_in(&resp)).await;
        Ok(tok)
    }
}

// ── Workload Identity ─────────────────────────────────────────────────────────

/// Federated credential: exchanges a projected Kubernetes service-account
/// token for an Entra ID token.
pub struct WorkloadIdentityCredential {
    tenant_id:  String,
    client_id:  String,
    token_file: PathBuf,
    endpoints:  CloudEndpoints,
    client:     reqwest::Client,
    cache:      TokenCache,
}

impl WorkloadIdentityCredential {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        token_file: impl Into<PathBuf>,
        endpoints: CloudEndpoints,
    ) -> Self {
        Self {
            tenant_id:  tenant_id.into(),
            client_id:  client_id.into(),
            token_file: token_file.into(),
            endpoints,
            client:     reqwest::Client::new(),
            cache:      TokenCache::default(),
        }
    }
}

#[async_trait]
impl TokenProvider for WorkloadIdentityCredential {
    fn kind(&self) -> &'static str {
        "workload-identity"
    }

    async fn token(&self) -> Result<String, AzureError> {
        if let Some(tok) = self.cache.get().await {
            return Ok(tok);
        }

        // The projected token is rotated on disk; read it fresh every time.
        let assertion = tokio::fs::read_to_string(&self.token_file)
            .await
            .map_err(|e| {
                AzureError::Credential(format!(
                    "read federated token {}: {}",
                    self.token_file.display(),
                    e
                ))
            })?;

        let url = format!("{}/{}/oauth2/v2.0/token", self.endpoints.login, self.tenant_id);
        let scope = self.endpoints.management_scope();
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_assertion_type", "urn:ietf:params:oauth:client-assertion-type:jwt-bearer"),
            ("client_assertion", assertion.trim()),
            ("scope", scope.as_str()),
        ];
        let resp: Value = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AzureError::Credential(format!("workload identity token request: {}", e)))?
            .json()
            .await
            .map_err(|e| AzureError::Credential(format!("workload identity token decode: {}", e)))?;

        let tok = access_token(&resp, "workload identity token")?;
        self.cache.put(&tok, expires_in(&resp)).await;
        Ok(tok)
    }
}

// ── Managed Identity ──────────────────────────────────────────────────────────

enum ManagedIdentityFlavor {
    /// VM / VMSS / AKS node: Instance Metadata Service.
    Imds,
    /// App Service / Functions / Container Apps.
    AppService { endpoint: String, header: String },
}

pub struct ManagedIdentityCredential {
    flavor:    ManagedIdentityFlavor,
    /// Selects a user-assigned identity; `None` = system-assigned.
    client_id: Option<String>,
    endpoints: CloudEndpoints,
    client:    reqwest::Client,
    cache:     TokenCache,
}

impl ManagedIdentityCredential {
    pub fn imds(client_id: Option<String>, endpoints: CloudEndpoints) -> Self {
        Self {
            flavor: ManagedIdentityFlavor::Imds,
            client_id,
            endpoints,
            client: managed_identity_client(MANAGED_IDENTITY_REQUEST_TIMEOUT),
            cache: TokenCache::default(),
        }
    }

    pub fn app_service(
        endpoint: impl Into<String>,
        header: impl Into<String>,
        client_id: Option<String>,
        endpoints: CloudEndpoints,
    ) -> Self {
        Self {
            flavor: ManagedIdentityFlavor::AppService {
                endpoint: endpoint.into(),
                header:   header.into(),
            },
            client_id,
            endpoints,
            client: managed_identity_client(MANAGED_IDENTITY_REQUEST_TIMEOUT),
            cache: TokenCache::default(),
        }
    }

    /// Bound the whole token request, not only the connect.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.client = managed_identity_client(timeout);
        self
    }
}

fn managed_identity_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(IMDS_TIMEOUT)
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

#[async_trait]
impl TokenProvider for ManagedIdentityCredential {
    fn kind(&self) -> &'static str {
        "managed-identity"
    }

    async fn token(&self) -> Result<String, AzureError> {
        if let Some(tok) = self.cache.get().await {
            return Ok(tok);
        }

        let resource = self.endpoints.management_resource();
        let mut query: Vec<(&str, &str)> = vec![("resource", resource.as_str())];
        if let Some(cid) = self.client_id.as_deref() {
            query.push(("client_id", cid));
        }

        let request = match &self.flavor {
            ManagedIdentityFlavor::Imds => {
                query.push(("api-version", "2018-02-01"));
                self.client
                    .get(format!("{}/metadata/identity/oauth2/token", self.endpoints.imds))
                    .header("Metadata", "true")
            }
            ManagedIdentityFlavor::AppService { endpoint, header } => {
                query.push(("api-version", "2019-08-01"));
                self.client.get(endpoint).header("X-IDENTITY-HEADER", header)
            }
        };

        let resp: Value = request
            .query(&query)
            .send()
            .await
            .map_err(|e| AzureError::Credential(format!("managed identity token request: {}", e)))?
            .json()
            .await
            .map_err(|e| AzureError::Credential(format!("managed identity token decode: {}", e)))?;

        let tok = access_token(&resp, "managed identity token")?;
        self.cache.put(&tok, expires_in(&resp)).await;
        Ok(tok)
    }
}

// ── Azure CLI ─────────────────────────────────────────────────────────────────

pub struct AzureCliCredential {
    tenant_id: Option<String>,
}

impl AzureCliCredential {
    pub fn new(tenant_id: Option<String>) -> Self {
        Self { tenant_id }
    }
}

#[async_trait]
impl TokenProvider for AzureCliCredential {
    fn kind(&self) -> &'static str {
        "azure-cli"
    }

    async fn token(&self) -> Result<String, AzureError> {
        let mut args = vec![
            "account",
            "get-access-token",
            "--resource",
            "https://management.azure.com",
            "--output",
            "json",
        ];
        if let Some(tenant) = self.tenant_id.as_deref() {
            args.extend(["--tenant", tenant]);
        }

        let output = Command::new("az")
            .args(&args)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| AzureError::Credential(format!("az CLI not found: {}. Install Azure CLI or configure service principal credentials.", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AzureError::Credential(format!(
                "az account get-access-token failed: {}. Run 'az login' first.",
                stderr.trim()
            )));
        }

        let resp: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| AzureError::Credential(format!("az CLI output parse: {}", e)))?;
        resp["accessToken"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AzureError::Credential("az CLI: no accessToken in output".into()))
    }
}

// ── Static (tests) ────────────────────────────────────────────────────────────

pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    fn kind(&self) -> &'static str {
        "static"
    }

    async fn token(&self) -> Result<String, AzureError> {
        Ok(self.0.clone())
    }
}

// ── Default chain ─────────────────────────────────────────────────────────────

/// Tries each discovered provider in order and sticks with the first one that
/// yields a token.
pub struct DefaultCredential {
    chain:    Vec<Arc<dyn TokenProvider>>,
    selected: Mutex<Option<Arc<dyn TokenProvider>>>,
}

impl DefaultCredential {
    /// Build the chain from ambient settings:
    /// 1. tenant + client id + client secret → Service Principal
    /// 2. tenant + client id + federated token file → Workload Identity
    /// 3. `IDENTITY_ENDPOINT` + `IDENTITY_HEADER` → App Service managed identity,
    ///    otherwise IMDS managed identity
    /// 4. Azure CLI (`az account get-access-token`)
    pub fn discover(auth: &AzureAuthSettings, endpoints: &CloudEndpoints) -> Self {
        let mut chain: Vec<Arc<dyn TokenProvider>> = Vec::new();

        if let (Some(tenant), Some(cid), Some(secret)) = (
            auth.tenant_id.as_deref(),
            auth.client_id.as_deref(),
            auth.client_secret.as_deref(),
        ) {
            chain.push(Arc::new(ServicePrincipalCredential::new(
                tenant, cid, secret, endpoints.clone(),
            )));
        }

        if let (Some(tenant), Some(cid), Some(file)) = (
            auth.tenant_id.as_deref(),
            auth.client_id.as_deref(),
            auth.federated_token_file.as_ref(),
        ) {
            chain.push(Arc::new(WorkloadIdentityCredential::new(
                tenant, cid, file.clone(), endpoints.clone(),
            )));
        }

        match (auth.identity_endpoint.as_deref(), auth.identity_header.as_deref()) {
            (Some(endpoint), Some(header)) => chain.push(Arc::new(
                ManagedIdentityCredential::app_service(
                    endpoint, header, auth.client_id.clone(), endpoints.clone(),
                ),
            )),
            _ => chain.push(Arc::new(ManagedIdentityCredential::imds(
                auth.client_id.clone(),
                endpoints.clone(),
            ))),
        }

        chain.push(Arc::new(AzureCliCredential::new(auth.tenant_id.clone())));

        let kinds: Vec<&str> = chain.iter().map(|p| p.kind()).collect();
        debug!(?kinds, "discovered credential chain");
        Self::from_chain(chain)
    }

    pub fn from_chain(chain: Vec<Arc<dyn TokenProvider>>) -> Self {
        Self { chain, selected: Mutex::new(None) }
    }
}

#[async_trait]
impl TokenProvider for DefaultCredential {
    fn kind(&self) -> &'static str {
        "default"
    }

    async fn token(&self) -> Result<String, AzureError> {
        let selected = self.selected.lock().await.clone();
        if let Some(provider) = selected {
            return provider.token().await;
        }

        let mut failures = Vec::new();
        for provider in &self.chain {
            match provider.token().await {
                Ok(tok) => {
                    info!(credential = provider.kind(), "acquired Azure credential");
                    *self.selected.lock().await = Some(provider.clone());
                    return Ok(tok);
                }
                Err(e) => {
                    debug!(credential = provider.kind(), error = %e, "credential unavailable");
                    let reason = match e {
                        AzureError::Credential(m) => m,
                        other => other.to_string(),
                    };
                    failures.push(format!("{}: {}", provider.kind(), reason));
                }
            }
        }
        Err(AzureError::Credential(if failures.is_empty() {
            "no credential providers configured".into()
        } else {
            failures.join("; ")
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::{
        matchers::{body_string_contains, header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    struct Failing(&'static str);

    #[async_trait]
    impl TokenProvider for Failing {
        fn kind(&self) -> &'static str {
            self.0
        }

        async fn token(&self) -> Result<String, AzureError> {
            Err(AzureError::Credential(format!("{} not available", self.0)))
        }
    }

    struct Counting(AtomicUsize);

    #[async_trait]
    impl TokenProvider for Counting {
        fn kind(&self) -> &'static str {
            "counting"
        }

        async fn token(&self) -> Result<String, AzureError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            Ok(format!("tok-{}", n))
        }
    }

    #[tokio::test]
    async fn service_principal_posts_client_credentials_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=app-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "sp-token",
                "expires_in": 3599,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cred = ServicePrincipalCredential::new(
            "tenant-1", "app-1", "secret", CloudEndpoints::with_base(&server.uri()),
        );
        assert_eq!(cred.token().await.unwrap(), "sp-token");
        // Second call is served from the cache; `expect(1)` verifies on drop.
        assert_eq!(cred.token().await.unwrap(), "sp-token");
    }

    #[tokio::test]
    async fn service_principal_surfaces_entra_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_client",
                "error_description": "AADSTS7000215: Invalid client secret provided.",
            })))
            .mount(&server)
            .await;

        let cred = ServicePrincipalCredential::new(
            "tenant-1", "app-1", "wrong", CloudEndpoints::with_base(&server.uri()),
        );
        let err = cred.token().await.unwrap_err();
        assert!(err.to_string().contains("AADSTS7000215"), "got: {}", err);
    }

    #[tokio::test]
    async fn workload_identity_sends_assertion_from_file() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .and(body_string_contains("client_assertion=projected-jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "wi-token",
                "expires_in": 3600,
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("token");
        std::fs::write(&file, "projected-jwt\n").unwrap();

        let cred = WorkloadIdentityCredential::new(
            "tenant-1", "app-1", &file, CloudEndpoints::with_base(&server.uri()),
        );
        assert_eq!(cred.token().await.unwrap(), "wi-token");
    }

    #[tokio::test]
    async fn imds_requests_management_resource() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata/identity/oauth2/token"))
            .and(header("Metadata", "true"))
            .and(query_param("resource", "https://management.azure.com/"))
            .and(query_param("api-version", "2018-02-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "mi-token",
                "expires_in": "86399",
            })))
            .mount(&server)
            .await;

        let cred = ManagedIdentityCredential::imds(None, CloudEndpoints::with_base(&server.uri()));
        assert_eq!(cred.token().await.unwrap(), "mi-token");
    }

    #[tokio::test]
    async fn app_service_identity_sends_identity_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/msi/token"))
            .and(header("X-IDENTITY-HEADER", "shh"))
            .and(query_param("client_id", "user-assigned"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "as-token",
                "expires_in": "3600",
            })))
            .mount(&server)
            .await;

        let cred = ManagedIdentityCredential::app_service(
            format!("{}/msi/token", server.uri()),
            "shh",
            Some("user-assigned".into()),
            CloudEndpoints::with_base(&server.uri()),
        );
        assert_eq!(cred.token().await.unwrap(), "as-token");
    }

    #[tokio::test]
    async fn chain_falls_through_to_first_working_provider() {
        let counting = Arc::new(Counting(AtomicUsize::new(0)));
        let chain = DefaultCredential::from_chain(vec![
            Arc::new(Failing("first")),
            counting.clone() as Arc<dyn TokenProvider>,
            Arc::new(Failing("never-reached")),
        ]);
        assert_eq!(chain.token().await.unwrap(), "tok-0");
        // The working provider is remembered.
        assert_eq!(chain.token().await.unwrap(), "tok-1");
    }

    #[tokio::test]
    async fn chain_reports_every_failure() {
        let chain = DefaultCredential::from_chain(vec![
            Arc::new(Failing("first")),
            Arc::new(Failing("second")),
        ]);
        let err = chain.token().await.unwrap_err().to_string();
        assert!(err.contains("first not available"), "got: {}", err);
        assert!(err.contains("second not available"), "got: {}", err);
        assert_eq!(
            err,
            "unable to get credentials: first: first not available; second: second not available"
        );
    }

    #[tokio::test]
    async fn stalled_imds_times_out_and_chain_falls_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata/identity/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "access_token": "late", "expires_in": "3600" }))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let imds = ManagedIdentityCredential::imds(None, CloudEndpoints::with_base(&server.uri()))
            .with_request_timeout(Duration::from_millis(200));
        let chain = DefaultCredential::from_chain(vec![
            Arc::new(imds) as Arc<dyn TokenProvider>,
            Arc::new(StaticToken("cli-token".into())),
        ]);

        let started = Instant::now();
        assert_eq!(chain.token().await.unwrap(), "cli-token");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn discover_orders_providers() {
        let auth = AzureAuthSettings {
            tenant_id: Some("t".into()),
            client_id: Some("c".into()),
            client_secret: Some("s".into()),
            ..Default::default()
        };
        let cred = DefaultCredential::discover(&auth, &CloudEndpoints::public());
        let kinds: Vec<&str> = cred.chain.iter().map(|p| p.kind()).collect();
        assert_eq!(kinds, vec!["service-principal", "managed-identity", "azure-cli"]);

        let cred = DefaultCredential::discover(&AzureAuthSettings::default(), &CloudEndpoints::public());
        let kinds: Vec<&str> = cred.chain.iter().map(|p| p.kind()).collect();
        assert_eq!(kinds, vec!["managed-identity", "azure-cli"]);
    }
}
