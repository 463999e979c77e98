use pgverify_domain::{ExpectedConfiguration, OutputNames, ServerRef};
use pgverify_terraform::OutputSet;

use crate::error::CheckError;

/// Everything the check reads from the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckInputs {
    pub server: ServerRef,
    pub expected: ExpectedConfiguration,
}

impl CheckInputs {
    pub fn from_outputs(outputs: &OutputSet, names: &OutputNames) -> Result<Self, CheckError> {
        let resource_group = outputs.string(&names.resource_group)?;
        let server_name = outputs.string(&names.server_name)?;
        let expected = ExpectedConfiguration::new(outputs.map(&names.configuration)?);
        Ok(Self {
            server: ServerRef::new(resource_group, server_name)?,
            expected,
        })
    }
}
