use mmm_core::MmmError;
use thiserror::Error;

pub type WarehouseResult<T> = Result<T, WarehouseError>;

#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("ClickHouse error: {0}")]
    ClickHouse(#[from] clickhouse::error::Error),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Malformed row in {table}: {reason}")]
    MalformedRow { table: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] MmmError),
}
