use std::path::{Path, PathBuf};

use pgverify_domain::{
    AzureAuthSettings, OutputNames, OutputSource, SubscriptionId, ValueMode, VerifySettings,
};
use tracing::debug;

use crate::error::ConfigError;
use crate::raw::RawSettings;

/// Settings file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "pgverify.yml";

const SUBSCRIPTION_VAR: &str = "ARM_SUBSCRIPTION_ID";

/// Environment lookup. The binary passes [`EnvSource::process`]; tests pass a
/// fixed map so they never touch the real process environment.
pub struct EnvSource<'a>(Box<dyn Fn(&str) -> Option<String> + 'a>);

impl<'a> EnvSource<'a> {
    pub fn process() -> Self {
        EnvSource(Box::new(|key| std::env::var(key).ok()))
    }

    pub fn from_fn(f: impl Fn(&str) -> Option<String> + 'a) -> Self {
        EnvSource(Box::new(f))
    }

    /// First non-empty value among `keys`.
    fn first(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|k| (self.0)(k))
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty())
    }
}

/// Command-line overrides layered on top of the settings file.
#[derive(Debug, Clone, Default)]
pub struct OutputOverrides {
    pub terraform_dir: Option<PathBuf>,
    pub binary: Option<String>,
    pub outputs_file: Option<PathBuf>,
    pub compare_values: bool,
}

/// The output-related part of the settings: enough to read deployment outputs
/// without any Azure identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSettings {
    pub source: OutputSource,
    pub names: OutputNames,
    pub value_mode: ValueMode,
}

/// Resolve everything a verification run needs.
///
/// `ARM_SUBSCRIPTION_ID` is checked before anything else so a missing value
/// aborts the run before any file, subprocess or network access happens.
pub fn resolve_settings(
    config_path: Option<&Path>,
    overrides: &OutputOverrides,
    env: &EnvSource<'_>,
) -> Result<VerifySettings, ConfigError> {
    let (subscription_id, auth) = resolve_azure_settings(env)?;

    let outputs = resolve_output_settings(config_path, overrides)?;
    let settings = VerifySettings {
        subscription_id,
        auth,
        outputs: outputs.source,
        output_names: outputs.names,
        value_mode: outputs.value_mode,
    };
    debug!(?settings, "resolved verification settings");
    Ok(settings)
}

/// Resolve where deployment outputs come from and what they are called.
///
/// `config_path` = `None` means "use `pgverify.yml` if it exists"; an explicit
/// path that does not exist is an error. Relative paths in the file are
/// resolved against the file's directory.
pub fn resolve_output_settings(
    config_path: Option<&Path>,
    overrides: &OutputOverrides,
) -> Result<OutputSettings, ConfigError> {
    let (raw, base_dir) = match config_path {
        Some(p) => (load_settings_file(p)?, parent_dir(p)),
        None => {
            let p = Path::new(DEFAULT_CONFIG_FILE);
            if p.exists() {
                (load_settings_file(p)?, parent_dir(p))
            } else {
                (RawSettings::default(), PathBuf::from("."))
            }
        }
    };

    let terraform = raw.terraform.unwrap_or_default();
    let source = match (&overrides.outputs_file, &overrides.terraform_dir, &terraform.outputs_file) {
        (Some(file), _, _) => OutputSource::File { path: file.clone() },
        (None, None, Some(file)) => OutputSource::File { path: base_dir.join(file) },
        _ => {
            let dir = match &overrides.terraform_dir {
                Some(d) => d.clone(),
                None => base_dir.join(terraform.dir.as_deref().unwrap_or(".")),
            };
            let binary = overrides
                .binary
                .clone()
                .or_else(|| terraform.binary.clone())
                .unwrap_or_else(|| "terraform".into());
            OutputSource::Terraform { binary, dir }
        }
    };

    let defaults = OutputNames::default();
    let names = match raw.outputs {
        Some(o) => OutputNames {
            resource_group: o.resource_group.unwrap_or(defaults.resource_group),
            server_name: o.server_name.unwrap_or(defaults.server_name),
            configuration: o.configuration.unwrap_or(defaults.configuration),
        },
        None => defaults,
    };

    let compare_values =
        overrides.compare_values || raw.check.map(|c| c.compare_values).unwrap_or(false);

    Ok(OutputSettings {
        source,
        names,
        value_mode: ValueMode::from_compare_values(compare_values),
    })
}

/// Subscription and ambient identity only, for commands that talk to Azure
/// without reading deployment outputs.
pub fn resolve_azure_settings(
    env: &EnvSource<'_>,
) -> Result<(SubscriptionId, AzureAuthSettings), ConfigError> {
    let subscription = env
        .first(&[SUBSCRIPTION_VAR])
        .ok_or(ConfigError::MissingEnv { var: SUBSCRIPTION_VAR })?;
    Ok((SubscriptionId::new(subscription)?, auth_from_env(env)))
}

/// Read and parse a settings file.
pub(crate) fn load_settings_file(path: &Path) -> Result<RawSettings, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    debug!("Loading settings from {}", path.display());
    serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })
}

/// `ARM_*` names (Terraform azurerm convention) win over `AZURE_*` (SDK convention).
fn auth_from_env(env: &EnvSource<'_>) -> AzureAuthSettings {
    AzureAuthSettings {
        tenant_id: env.first(&["ARM_TENANT_ID", "AZURE_TENANT_ID"]),
        client_id: env.first(&["ARM_CLIENT_ID", "AZURE_CLIENT_ID"]),
        client_secret: env.first(&["ARM_CLIENT_SECRET", "AZURE_CLIENT_SECRET"]),
        federated_token_file: env.first(&["AZURE_FEDERATED_TOKEN_FILE"]).map(PathBuf::from),
        identity_endpoint: env.first(&["IDENTITY_ENDPOINT"]),
        identity_header: env.first(&["IDENTITY_HEADER"]),
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
