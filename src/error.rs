use thiserror::Error;

/// Errors surfaced by the fallible edges of the crate (configuration and
/// agent startup). The aggregation hot path never returns these.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
