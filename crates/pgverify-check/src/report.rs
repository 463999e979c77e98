use chrono::{DateTime, Utc};
use pgverify_domain::{ServerRef, ValueMode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name the check is reported under.
pub const CHECK_NAME: &str = "does_postgresql_server_configuration_exist";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedKey {
    pub key: String,
    pub expected_value: String,
    pub observed_value: Option<String>,
}

/// A key whose configuration object came back under a different name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameMismatch {
    pub key: String,
    pub actual: Option<String>,
}

/// A key whose live value differs from the deployment output. Only fails the
/// check in [`ValueMode::Strict`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueDrift {
    pub key: String,
    pub expected: String,
    pub observed: Option<String>,
}

/// Outcome of a passing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub run_id: Uuid,
    pub check: String,
    pub server: ServerRef,
    pub value_mode: ValueMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub verified: Vec<VerifiedKey>,
    pub value_drift: Vec<ValueDrift>,
}

impl CheckReport {
    pub fn new(server: ServerRef, value_mode: ValueMode) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            check: CHECK_NAME.to_string(),
            server,
            value_mode,
            started_at: now,
            finished_at: now,
            verified: Vec::new(),
            value_drift: Vec::new(),
        }
    }

    pub fn has_drift(&self) -> bool {
        !self.value_drift.is_empty()
    }
}
