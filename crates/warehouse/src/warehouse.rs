use crate::error::WarehouseResult;
use async_trait::async_trait;
use mmm_core::config::JoinMode;
use mmm_core::types::{CampaignResult, TacticBreakdown, TacticSpend, WeeklyAggregate};
use mmm_core::{Namespace, TacticCatalog};

/// A query engine holding the loader's input and output tables.
///
/// Table arguments are unqualified names; backends resolve them inside their
/// configured [`Namespace`]. Engine failures are returned as-is, nothing is
/// retried.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Short backend name used in logs and metrics.
    fn backend(&self) -> &'static str;

    fn namespace(&self) -> &Namespace;

    async fn count_rows(&self, table: &str) -> WarehouseResult<u64>;

    async fn tactic_breakdown(&self) -> WarehouseResult<Vec<TacticBreakdown>>;

    async fn campaign_results(&self) -> WarehouseResult<Vec<CampaignResult>>;

    async fn tactic_spends(&self) -> WarehouseResult<Vec<TacticSpend>>;

    /// Recompute the weekly output table inside the engine and return its
    /// row count.
    async fn build_weekly(&self, catalog: &TacticCatalog, join: JoinMode) -> WarehouseResult<u64>;

    /// Replace the weekly output table with rows computed by the caller.
    async fn replace_weekly(
        &self,
        rows: &[WeeklyAggregate],
        catalog: &TacticCatalog,
    ) -> WarehouseResult<u64>;

    /// First `limit` rows of the weekly output table.
    async fn preview_weekly(
        &self,
        catalog: &TacticCatalog,
        limit: usize,
    ) -> WarehouseResult<Vec<WeeklyAggregate>>;

    /// Replace both input tables.
    async fn replace_inputs(
        &self,
        results: &[CampaignResult],
        spends: &[TacticSpend],
    ) -> WarehouseResult<()>;
}
