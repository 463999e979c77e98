use serde::{Deserialize, Serialize};

/// Raw YAML representation of `pgverify.yml`. Every section is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawSettings {
    pub terraform: Option<RawTerraform>,
    pub outputs: Option<RawOutputNames>,
    pub check: Option<RawCheck>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawTerraform {
    /// Working directory holding the applied configuration.
    pub dir: Option<String>,
    /// `terraform` (default) or `tofu`.
    pub binary: Option<String>,
    /// Pre-captured `terraform output -json` document. Wins over `dir`.
    pub outputs_file: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawOutputNames {
    pub resource_group: Option<String>,
    pub server_name: Option<String>,
    pub configuration: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawCheck {
    #[serde(default)]
    pub compare_values: bool,
}
