use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid subscription id: {0:?}")]
    InvalidSubscriptionId(String),

    #[error("invalid server reference: {0}")]
    InvalidServerRef(String),
}
