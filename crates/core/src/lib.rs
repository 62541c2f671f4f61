pub mod config;
pub mod error;
pub mod tactic;
pub mod types;

pub use config::AppConfig;
pub use error::{MmmError, MmmResult};
pub use tactic::TacticCatalog;
pub use types::{CampaignResult, Namespace, TacticBreakdown, TacticSpend, WeeklyAggregate};
