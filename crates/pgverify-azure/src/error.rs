use thiserror::Error;

#[derive(Debug, Error)]
pub enum AzureError {
    #[error("unable to get credentials: {0}")]
    Credential(String),

    #[error("error building configurations client: {0}")]
    ClientConstruction(String),

    #[error("GET {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{resource} not found: {message}")]
    NotFound { resource: String, message: String },

    #[error("GET {url}: status {status}: {message}")]
    Api { url: String, status: u16, message: String },

    #[error("decode {url}: {message}")]
    Decode { url: String, message: String },
}
