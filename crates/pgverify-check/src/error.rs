use pgverify_azure::AzureError;
use thiserror::Error;

use crate::report::NameMismatch;

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("deployment outputs: {0}")]
    Outputs(#[from] pgverify_terraform::TerraformError),

    #[error("deployment outputs: {0}")]
    Domain(#[from] pgverify_domain::DomainError),

    #[error(transparent)]
    Credential(AzureError),

    #[error("error getting PostgreSQL server configuration '{key}': {source}")]
    Lookup {
        key: String,
        #[source]
        source: AzureError,
    },

    #[error("server reported a different name for {} configuration(s): {}", .0.len(), describe(.0))]
    NameMismatches(Vec<NameMismatch>),

    #[error("configuration '{key}': expected value {expected:?}, server reported {actual:?}")]
    ValueMismatch {
        key: String,
        expected: String,
        actual: Option<String>,
    },
}

impl CheckError {
    /// The configuration key the failure is attributed to, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            CheckError::Lookup { key, .. } | CheckError::ValueMismatch { key, .. } => Some(key),
            CheckError::NameMismatches(m) => m.first().map(|m| m.key.as_str()),
            _ => None,
        }
    }
}

fn describe(mismatches: &[NameMismatch]) -> String {
    mismatches
        .iter()
        .map(|m| format!("'{}' (got {:?})", m.key, m.actual.as_deref().unwrap_or("<none>")))
        .collect::<Vec<_>>()
        .join(", ")
}
