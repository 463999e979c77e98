use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::TerraformError;

/// One entry of a `terraform output -json` document.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputValue {
    pub value: Value,
    #[serde(rename = "type", default)]
    pub type_hint: Value,
    #[serde(default)]
    pub sensitive: bool,
}

/// The parsed `terraform output -json` document of an applied workspace.
#[derive(Debug, Clone, Default)]
pub struct OutputSet {
    outputs: BTreeMap<String, OutputValue>,
}

impl OutputSet {
    pub fn from_json(raw: &str) -> Result<Self, TerraformError> {
        let trimmed = raw.trim();
        // `terraform output -json` prints `{}` for an empty state, but some
        // wrappers print nothing at all.
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        let outputs: BTreeMap<String, OutputValue> = serde_json::from_str(trimmed)?;
        Ok(Self { outputs })
    }

    pub fn from_file(path: &Path) -> Result<Self, TerraformError> {
        let raw = std::fs::read_to_string(path).map_err(|e| TerraformError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json(&raw)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(|k| k.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&OutputValue> {
        self.outputs.get(name)
    }

    /// A scalar output rendered as text.
    pub fn string(&self, name: &str) -> Result<String, TerraformError> {
        let out = self
            .outputs
            .get(name)
            .ok_or_else(|| TerraformError::MissingOutput(name.to_string()))?;
        match &out.value {
            Value::Array(_) | Value::Object(_) => Err(TerraformError::WrongType {
                name: name.to_string(),
                expected: "string",
            }),
            v => Ok(render_value(v)),
        }
    }

    /// A map output with every value rendered as text.
    pub fn map(&self, name: &str) -> Result<BTreeMap<String, String>, TerraformError> {
        let out = self
            .outputs
            .get(name)
            .ok_or_else(|| TerraformError::MissingOutput(name.to_string()))?;
        match &out.value {
            Value::Object(obj) => Ok(obj
                .iter()
                .map(|(k, v)| (k.clone(), render_value(v)))
                .collect()),
            _ => Err(TerraformError::WrongType {
                name: name.to_string(),
                expected: "map",
            }),
        }
    }
}

/// Strings verbatim, scalars via display, null as empty, nested values as compact JSON.
fn render_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
