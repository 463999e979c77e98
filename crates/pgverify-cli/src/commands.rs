use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use pgverify_azure::{
    CloudEndpoints, ConfigurationLookup, ConfigurationsClient, DefaultCredential, TokenProvider,
};
use pgverify_check::{run_check, CheckError, CheckInputs, CHECK_NAME};
use pgverify_config::{
    resolve_azure_settings, resolve_output_settings, resolve_settings, EnvSource, OutputOverrides,
};
use pgverify_domain::{AzureAuthSettings, OutputSource, ServerRef, SubscriptionId};
use pgverify_terraform::{read_outputs, OutputSet};
use tracing::info;

use crate::cli::{OutputFormat, OutputSourceArgs};
use crate::output;

// ── Verify ────────────────────────────────────────────────────────────────────

pub async fn verify(
    config: Option<PathBuf>,
    source: OutputSourceArgs,
    strict_values: bool,
    format: OutputFormat,
) -> Result<()> {
    // Fails on a missing ARM_SUBSCRIPTION_ID before anything touches the network.
    let settings = resolve_settings(
        config.as_deref(),
        &overrides(source, strict_values),
        &EnvSource::process(),
    )?;

    let client = configurations_client(settings.subscription_id.clone(), &settings.auth)?;
    let outputs = authenticated_outputs(&client, &settings.outputs).await?;

    match run_check(&settings, &outputs, &client).await {
        Ok(report) => {
            match format {
                OutputFormat::Text => print!("{}", output::render_report(&report)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("--- FAIL: {}", CHECK_NAME);
            Err(e.into())
        }
    }
}

// ── Outputs ───────────────────────────────────────────────────────────────────

pub async fn outputs(
    config: Option<PathBuf>,
    source: OutputSourceArgs,
    format: OutputFormat,
) -> Result<()> {
    let settings = resolve_output_settings(config.as_deref(), &overrides(source, false))?;
    let outputs = read_outputs(&settings.source)
        .await
        .context("Failed to read deployment outputs")?;
    let inputs = CheckInputs::from_outputs(&outputs, &settings.names)?;

    match format {
        OutputFormat::Text => print!("{}", output::render_inputs(&inputs)),
        OutputFormat::Json => {
            let body = serde_json::json!({
                "resource_group": inputs.server.resource_group,
                "server_name": inputs.server.server_name,
                "configuration": inputs.expected,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }
    Ok(())
}

// ── Configs ───────────────────────────────────────────────────────────────────

pub async fn configs(resource_group: String, server: String, format: OutputFormat) -> Result<()> {
    let (subscription, auth) = resolve_azure_settings(&EnvSource::process())?;
    let server = ServerRef::new(resource_group, server)?;
    let client = configurations_client(subscription, &auth)?;

    let all = client
        .list_by_server(&server)
        .await
        .with_context(|| format!("Failed to list configurations of {}", server))?;
    info!(server = %server, count = all.len(), "listed server configurations");

    match format {
        OutputFormat::Text => print!("{}", output::render_configurations(&all)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&all)?),
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn overrides(source: OutputSourceArgs, compare_values: bool) -> OutputOverrides {
    OutputOverrides {
        terraform_dir: source.terraform_dir,
        binary: source.binary,
        outputs_file: source.outputs_file,
        compare_values,
    }
}

/// Acquire the credential, then read the deployment outputs.
async fn authenticated_outputs(
    lookup: &dyn ConfigurationLookup,
    source: &OutputSource,
) -> Result<OutputSet> {
    lookup.authenticate().await.map_err(CheckError::Credential)?;
    read_outputs(source)
        .await
        .context("Failed to read deployment outputs")
}

/// Public-cloud client backed by the default credential chain.
fn configurations_client(
    subscription: SubscriptionId,
    auth: &AzureAuthSettings,
) -> Result<ConfigurationsClient> {
    let endpoints = CloudEndpoints::public();
    let credential: Arc<dyn TokenProvider> = Arc::new(DefaultCredential::discover(auth, &endpoints));
    ConfigurationsClient::new(subscription, credential, &endpoints)
        .context("Error getting Postgres client")
}
