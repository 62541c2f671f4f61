//! MMM reporting: weekly tactic pivot, tactic breakdowns, warehouse SQL,
//! preview rendering and sample data generation.

pub mod breakdown;
pub mod export;
pub mod sample;
pub mod sql;
pub mod weekly;

pub use breakdown::tactic_breakdown;
pub use sample::{SampleData, SampleDataConfig};
pub use sql::{Dialect, QueryRenderer};
pub use weekly::{aggregate, WeeklyTacticAggregator};
