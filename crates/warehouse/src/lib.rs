//! Warehouse access for the MMM loader: a ClickHouse backend, a local
//! JSON-lines backend, and the loader that drives validate/build/preview.

#![warn(clippy::unwrap_used)]

pub mod clickhouse_backend;
pub mod error;
pub mod loader;
pub mod local;
pub mod warehouse;

pub use clickhouse_backend::ClickHouseWarehouse;
pub use error::{WarehouseError, WarehouseResult};
pub use loader::{LoadReport, Loader, Validation};
pub use local::LocalWarehouse;
pub use warehouse::Warehouse;
