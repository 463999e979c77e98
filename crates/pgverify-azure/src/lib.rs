pub mod cloud;
pub mod configurations;
pub mod credential;
pub mod error;

pub use cloud::CloudEndpoints;
pub use configurations::{
    ConfigurationLookup, ConfigurationProperties, ConfigurationsClient, ServerConfiguration,
    API_VERSION,
};
pub use credential::{DefaultCredential, StaticToken, TokenProvider};
pub use error::AzureError;
