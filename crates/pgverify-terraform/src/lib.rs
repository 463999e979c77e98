pub mod error;
pub mod outputs;
pub mod runner;

pub use error::TerraformError;
pub use outputs::OutputSet;
pub use runner::TerraformCli;

use pgverify_domain::OutputSource;

/// Load deployment outputs from whichever source the settings selected.
pub async fn read_outputs(source: &OutputSource) -> Result<OutputSet, TerraformError> {
    match source {
        OutputSource::Terraform { binary, dir } => {
            TerraformCli::new(binary.clone(), dir.clone()).read_outputs().await
        }
        OutputSource::File { path } => OutputSet::from_file(path),
    }
}
