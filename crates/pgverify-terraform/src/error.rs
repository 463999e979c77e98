use thiserror::Error;

#[derive(Debug, Error)]
pub enum TerraformError {
    #[error("spawn {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{binary} output exited with code {code}: {stderr}")]
    Exit { binary: String, code: i32, stderr: String },

    #[error("{binary} output timed out after {secs}s")]
    Timeout { binary: String, secs: u64 },

    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse terraform output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("output '{0}' missing from terraform output")]
    MissingOutput(String),

    #[error("output '{name}' is not a {expected}")]
    WrongType { name: String, expected: &'static str },
}
