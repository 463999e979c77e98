mod raw;
mod loader;
pub mod error;

pub use loader::{
    resolve_azure_settings, resolve_output_settings, resolve_settings, EnvSource, OutputOverrides,
    OutputSettings, DEFAULT_CONFIG_FILE,
};
pub use error::ConfigError;
