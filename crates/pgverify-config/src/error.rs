use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} environment variable is not set")]
    MissingEnv { var: &'static str },

    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("yaml parse error in {path}: {source}")]
    YamlParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("domain error: {0}")]
    Domain(#[from] pgverify_domain::DomainError),
}
