use thiserror::Error;

pub type MmmResult<T> = Result<T, MmmError>;

#[derive(Error, Debug)]
pub enum MmmError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid tactic label: {0:?}")]
    InvalidTactic(String),

    #[error("Record is missing column {0}")]
    MissingColumn(String),

    #[error("Invalid date {value:?}: {reason}")]
    InvalidDate { value: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for MmmError {
    fn from(err: config::ConfigError) -> Self {
        MmmError::Config(err.to_string())
    }
}
