use chrono::Utc;
use pgverify_azure::ConfigurationLookup;
use pgverify_domain::{ValueMode, VerifySettings};
use pgverify_terraform::OutputSet;
use tracing::{debug, error, info, warn};

use crate::error::CheckError;
use crate::inputs::CheckInputs;
use crate::report::{CheckReport, NameMismatch, ValueDrift, VerifiedKey, CHECK_NAME};

/// Read the check inputs from deployment outputs and verify them against the
/// live server.
pub async fn run_check(
    settings: &VerifySettings,
    outputs: &OutputSet,
    lookup: &dyn ConfigurationLookup,
) -> Result<CheckReport, CheckError> {
    let inputs = CheckInputs::from_outputs(outputs, &settings.output_names)?;
    verify_configuration(lookup, &inputs, settings.value_mode).await
}

/// Confirm the server reports a configuration object for every expected key.
///
/// Authentication happens once up front. Keys are then looked up one at a
/// time in key order; a lookup failure ends the run and later keys are not
/// attempted. A key echoed back under another name is recorded and the loop
/// moves on; every such key is reported together once all keys are checked.
/// Only the echoed `name` is asserted unless `mode` is [`ValueMode::Strict`];
/// in the default mode a differing value is logged and recorded as drift.
pub async fn verify_configuration(
    lookup: &dyn ConfigurationLookup,
    inputs: &CheckInputs,
    mode: ValueMode,
) -> Result<CheckReport, CheckError> {
    lookup.authenticate().await.map_err(CheckError::Credential)?;

    let server = &inputs.server;
    let mut report = CheckReport::new(server.clone(), mode);
    info!(
        check = CHECK_NAME,
        resource_group = %server.resource_group,
        server = %server.server_name,
        keys = inputs.expected.len(),
        "verifying PostgreSQL server configuration"
    );
    if inputs.expected.is_empty() {
        warn!(check = CHECK_NAME, "deployment declares no configuration keys; nothing to verify");
    }

    let mut mismatched = Vec::new();
    for (key, expected) in inputs.expected.iter() {
        let live = lookup
            .get_configuration(server, key)
            .await
            .map_err(|e| CheckError::Lookup { key: key.to_string(), source: e })?;

        if live.name.as_deref() != Some(key) {
            error!(
                key,
                actual = live.name.as_deref().unwrap_or("<none>"),
                "server reported a different configuration name"
            );
            mismatched.push(NameMismatch { key: key.to_string(), actual: live.name });
            continue;
        }

        let observed = live.properties.value;
        if observed.as_deref() != Some(expected) {
            if mode == ValueMode::Strict {
                return Err(CheckError::ValueMismatch {
                    key: key.to_string(),
                    expected: expected.to_string(),
                    actual: observed,
                });
            }
            warn!(
                key,
                expected,
                observed = observed.as_deref().unwrap_or("<none>"),
                "configuration value differs from deployment output; not compared in name-only mode"
            );
            report.value_drift.push(ValueDrift {
                key: key.to_string(),
                expected: expected.to_string(),
                observed: observed.clone(),
            });
        }

        debug!(key, "configuration present");
        report.verified.push(VerifiedKey {
            key: key.to_string(),
            expected_value: expected.to_string(),
            observed_value: observed,
        });
    }

    if !mismatched.is_empty() {
        return Err(CheckError::NameMismatches(mismatched));
    }

    report.finished_at = Utc::now();
    info!(
        check = CHECK_NAME,
        verified = report.verified.len(),
        drift = report.value_drift.len(),
        "configuration check passed"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pgverify_azure::{AzureError, ServerConfiguration};
    use pgverify_domain::{ExpectedConfiguration, ServerRef};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory stand-in for the management API. Keys absent from `live`
    /// answer with NotFound; every lookup is recorded.
    #[derive(Default)]
    struct FakeServer {
        live: HashMap<String, ServerConfiguration>,
        auth_fails: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeServer {
        fn with(mut self, name: &str, value: &str) -> Self {
            self.live.insert(name.to_string(), live_config(name, value));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn live_config(name: &str, value: &str) -> ServerConfiguration {
        let mut cfg = ServerConfiguration {
            name: Some(name.to_string()),
            ..Default::default()
        };
        cfg.properties.value = Some(value.to_string());
        cfg
    }

    #[async_trait]
    impl ConfigurationLookup for FakeServer {
        async fn authenticate(&self) -> Result<(), AzureError> {
            if self.auth_fails {
                return Err(AzureError::Credential("no credential providers configured".into()));
            }
            Ok(())
        }

        async fn get_configuration(
            &self,
            server: &ServerRef,
            name: &str,
        ) -> Result<ServerConfiguration, AzureError> {
            self.calls.lock().unwrap().push(name.to_string());
            self.live.get(name).cloned().ok_or_else(|| AzureError::NotFound {
                resource: format!("configuration '{}' on server {}", name, server),
                message: "ConfigurationNotExists: not found".into(),
            })
        }
    }

    fn inputs(pairs: &[(&str, &str)]) -> CheckInputs {
        CheckInputs {
            server: ServerRef::new("rg-pg", "pg-01").unwrap(),
            expected: pairs.iter().copied().collect::<ExpectedConfiguration>(),
        }
    }

    #[tokio::test]
    async fn two_keys_two_lookups_pass() {
        let fake = FakeServer::default()
            .with("shared_buffers", "128MB")
            .with("max_connections", "100");
        let report = verify_configuration(
            &fake,
            &inputs(&[("shared_buffers", "128MB"), ("max_connections", "100")]),
            ValueMode::NameOnly,
        )
        .await
        .unwrap();

        assert_eq!(fake.calls(), vec!["max_connections", "shared_buffers"]);
        assert_eq!(report.check, CHECK_NAME);
        assert_eq!(report.verified.len(), 2);
        assert!(!report.has_drift());
    }

    #[tokio::test]
    async fn credential_failure_makes_no_lookups() {
        let fake = FakeServer { auth_fails: true, ..Default::default() }.with("shared_buffers", "128MB");
        let err = verify_configuration(&fake, &inputs(&[("shared_buffers", "128MB")]), ValueMode::NameOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckError::Credential(_)), "got: {}", err);
        assert!(err.to_string().starts_with("unable to get credentials"), "got: {}", err);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn lookup_failure_stops_at_that_key() {
        // `effective_cache_size` sorts first and is missing on the server.
        let fake = FakeServer::default()
            .with("max_connections", "100")
            .with("shared_buffers", "128MB");
        let err = verify_configuration(
            &fake,
            &inputs(&[
                ("effective_cache_size", "4GB"),
                ("max_connections", "100"),
                ("shared_buffers", "128MB"),
            ]),
            ValueMode::NameOnly,
        )
        .await
        .unwrap_err();

        assert_eq!(err.key(), Some("effective_cache_size"));
        assert!(matches!(err, CheckError::Lookup { source: AzureError::NotFound { .. }, .. }));
        assert_eq!(fake.calls(), vec!["effective_cache_size"]);
    }

    #[tokio::test]
    async fn mismatched_value_does_not_fail_in_name_only_mode() {
        // Known limitation: the expected value is not asserted, only reported.
        let fake = FakeServer::default().with("shared_buffers", "16384");
        let report = verify_configuration(
            &fake,
            &inputs(&[("shared_buffers", "128MB")]),
            ValueMode::NameOnly,
        )
        .await
        .unwrap();

        assert_eq!(report.verified.len(), 1);
        assert_eq!(
            report.value_drift,
            vec![ValueDrift {
                key: "shared_buffers".into(),
                expected: "128MB".into(),
                observed: Some("16384".into()),
            }]
        );
    }

    #[tokio::test]
    async fn mismatched_value_fails_in_strict_mode() {
        let fake = FakeServer::default()
            .with("max_connections", "50")
            .with("shared_buffers", "128MB");
        let err = verify_configuration(
            &fake,
            &inputs(&[("max_connections", "100"), ("shared_buffers", "128MB")]),
            ValueMode::Strict,
        )
        .await
        .unwrap_err();

        match &err {
            CheckError::ValueMismatch { key, expected, actual } => {
                assert_eq!(key, "max_connections");
                assert_eq!(expected, "100");
                assert_eq!(actual.as_deref(), Some("50"));
            }
            other => panic!("expected ValueMismatch, got {}", other),
        }
        assert_eq!(fake.calls(), vec!["max_connections"]);
    }

    #[tokio::test]
    async fn echoed_name_must_match_key() {
        let mut fake = FakeServer::default();
        fake.live.insert("shared_buffers".into(), live_config("work_mem", "4MB"));
        let err = verify_configuration(&fake, &inputs(&[("shared_buffers", "128MB")]), ValueMode::NameOnly)
            .await
            .unwrap_err();
        match &err {
            CheckError::NameMismatches(m) => assert_eq!(
                m,
                &vec![NameMismatch { key: "shared_buffers".into(), actual: Some("work_mem".into()) }]
            ),
            other => panic!("expected NameMismatches, got {}", other),
        }
    }

    #[tokio::test]
    async fn name_mismatch_does_not_stop_later_lookups() {
        let mut fake = FakeServer::default().with("shared_buffers", "128MB");
        fake.live.insert("max_connections".into(), live_config("work_mem", "4MB"));
        fake.live.insert("work_mem".into(), live_config("maintenance_work_mem", "64MB"));

        let err = verify_configuration(
            &fake,
            &inputs(&[
                ("max_connections", "100"),
                ("shared_buffers", "128MB"),
                ("work_mem", "4MB"),
            ]),
            ValueMode::NameOnly,
        )
        .await
        .unwrap_err();

        assert_eq!(fake.calls(), vec!["max_connections", "shared_buffers", "work_mem"]);
        assert_eq!(err.key(), Some("max_connections"));
        let text = err.to_string();
        assert!(text.contains("2 configuration(s)"), "got: {}", text);
        assert!(text.contains("'max_connections' (got \"work_mem\")"), "got: {}", text);
        assert!(text.contains("'work_mem' (got \"maintenance_work_mem\")"), "got: {}", text);
        assert!(!text.contains("shared_buffers"), "got: {}", text);
    }

    #[tokio::test]
    async fn lookup_failure_after_name_mismatch_still_stops() {
        let mut fake = FakeServer::default();
        fake.live.insert("max_connections".into(), live_config("work_mem", "4MB"));
        let err = verify_configuration(
            &fake,
            &inputs(&[("max_connections", "100"), ("shared_buffers", "128MB"), ("work_mem", "4MB")]),
            ValueMode::NameOnly,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CheckError::Lookup { ref key, .. } if key == "shared_buffers"), "got: {}", err);
        assert_eq!(fake.calls(), vec!["max_connections", "shared_buffers"]);
    }

    #[test]
    fn credential_error_is_not_repeated_in_source_chain() {
        use std::error::Error as _;
        let err = CheckError::Credential(AzureError::Credential("azure-cli: az not found".into()));
        assert_eq!(err.to_string(), "unable to get credentials: azure-cli: az not found");
        assert!(err.source().is_none());
    }

    #[tokio::test]
    async fn empty_expectation_passes_without_lookups() {
        let fake = FakeServer::default();
        let report = verify_configuration(&fake, &inputs(&[]), ValueMode::NameOnly).await.unwrap();
        assert!(report.verified.is_empty());
        assert!(fake.calls().is_empty());
    }
}
