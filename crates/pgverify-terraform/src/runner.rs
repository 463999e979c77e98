use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::TerraformError;
use crate::outputs::OutputSet;

/// `terraform output` should return in seconds; anything past this is a hung
/// backend or a credential prompt.
const TIMEOUT_SECS: u64 = 300;

/// Reads outputs from an already-applied workspace by invoking the
/// `terraform` or `tofu` binary.
#[derive(Debug, Clone)]
pub struct TerraformCli {
    pub binary: String,
    pub dir: PathBuf,
}

impl TerraformCli {
    pub fn new(binary: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into(), dir: dir.into() }
    }

    /// Run `<binary> output -json -no-color` and parse the document.
    pub async fn read_outputs(&self) -> Result<OutputSet, TerraformError> {
        let stdout = self.run(&["output", "-json", "-no-color"]).await?;
        let set = OutputSet::from_json(&stdout)?;
        debug!(count = set.names().count(), "read deployment outputs");
        Ok(set)
    }

    /// Run a sub-command and return its stdout. Stderr is kept only for the
    /// error message.
    async fn run(&self, args: &[&str]) -> Result<String, TerraformError> {
        info!(binary = %self.binary, ?args, dir = %self.dir.display(), "running IaC command");

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Disable interactive prompts and colour
            .env("TF_IN_AUTOMATION", "1")
            .env("TF_INPUT", "0")
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| TerraformError::Spawn {
            binary: self.binary.clone(),
            source: e,
        })?;

        let output = match tokio::time::timeout(
            Duration::from_secs(TIMEOUT_SECS),
            child.wait_with_output(),
        )
        .await
        {
            Ok(res) => res.map_err(|e| TerraformError::Spawn {
                binary: self.binary.clone(),
                source: e,
            })?,
            Err(_) => {
                return Err(TerraformError::Timeout {
                    binary: self.binary.clone(),
                    secs: TIMEOUT_SECS,
                });
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            debug!(target: "pgverify::iac", "{}", line);
        }

        let code = output.status.code().unwrap_or(-1);
        if code != 0 {
            warn!(binary = %self.binary, code, "IaC command exited non-zero");
            return Err(TerraformError::Exit {
                binary: self.binary.clone(),
                code,
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
