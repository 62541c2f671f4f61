use crate::error::WarehouseResult;
use crate::warehouse::Warehouse;
use mmm_core::config::{AggregationMode, AppConfig, JoinMode, TableConfig};
use mmm_core::types::{TacticBreakdown, WeeklyAggregate};
use mmm_core::{Namespace, TacticCatalog};
use mmm_reporting::{SampleData, SampleDataConfig, WeeklyTacticAggregator};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Input table sanity check run before the weekly table is rebuilt.
#[derive(Debug, Clone, Serialize)]
pub struct Validation {
    pub campaign_results: u64,
    pub tactic_records: u64,
    pub breakdown: Vec<TacticBreakdown>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub run_id: Uuid,
    pub backend: &'static str,
    pub namespace: Namespace,
    /// Qualified name of the weekly output table.
    pub table: String,
    pub validation: Validation,
    pub tactics: TacticCatalog,
    pub rows_written: u64,
    pub preview: Vec<WeeklyAggregate>,
    pub elapsed_ms: u64,
}

/// Drives one load of the weekly MMM table against a [`Warehouse`].
pub struct Loader {
    warehouse: Arc<dyn Warehouse>,
    tables: TableConfig,
    tactics: TacticCatalog,
    discover_tactics: bool,
    join: JoinMode,
    mode: AggregationMode,
    preview_limit: usize,
}

impl Loader {
    pub fn new(warehouse: Arc<dyn Warehouse>, config: &AppConfig) -> Self {
        Self {
            warehouse,
            tables: config.tables.clone(),
            tactics: config.tactics.clone(),
            discover_tactics: config.discover_tactics,
            join: config.join,
            mode: config.mode,
            preview_limit: config.preview_limit,
        }
    }

    pub fn preview_limit(&self) -> usize {
        self.preview_limit
    }

    /// Count both input tables and summarize spend per tactic.
    pub async fn validate(&self) -> WarehouseResult<Validation> {
        let campaign_results = self.warehouse.count_rows(&self.tables.campaign_results).await?;
        let tactic_records = self.warehouse.count_rows(&self.tables.campaign_tactics).await?;
        let breakdown = self.warehouse.tactic_breakdown().await?;

        info!(campaign_results, tactic_records, "Input tables validated");
        for row in &breakdown {
            info!(
                tactic = %row.tactic,
                campaigns = row.campaigns,
                total_spend = row.total_spend,
                "Tactic spend"
            );
            if !self.discover_tactics && !self.tactics.contains(&row.tactic) {
                warn!(tactic = %row.tactic, "Tactic is not pivoted; its spend only reaches total_spend");
            }
        }

        Ok(Validation {
            campaign_results,
            tactic_records,
            breakdown,
        })
    }

    /// The pivot columns for this run.
    pub async fn resolve_tactics(&self) -> WarehouseResult<TacticCatalog> {
        if !self.discover_tactics {
            return Ok(self.tactics.clone());
        }
        let spends = self.warehouse.tactic_spends().await?;
        let catalog = TacticCatalog::discover(&spends)?;
        info!(tactics = ?catalog.iter().collect::<Vec<_>>(), "Discovered tactics");
        Ok(catalog)
    }

    /// Replace the weekly table and return the number of rows written.
    #[instrument(skip(self, catalog), fields(backend = self.warehouse.backend()))]
    pub async fn build(&self, catalog: &TacticCatalog) -> WarehouseResult<u64> {
        let rows = match self.mode {
            AggregationMode::Pushdown => self.warehouse.build_weekly(catalog, self.join).await?,
            AggregationMode::InProcess => {
                let results = self.warehouse.campaign_results().await?;
                let spends = self.warehouse.tactic_spends().await?;
                let weekly = WeeklyTacticAggregator::new(catalog.clone())
                    .with_join(self.join)
                    .aggregate(&results, &spends);
                self.warehouse.replace_weekly(&weekly, catalog).await?
            }
        };

        info!(
            table = %self.warehouse.namespace().qualify(&self.tables.weekly_output),
            rows,
            mode = ?self.mode,
            "Weekly MMM table built"
        );
        Ok(rows)
    }

    pub async fn preview(
        &self,
        catalog: &TacticCatalog,
        limit: usize,
    ) -> WarehouseResult<Vec<WeeklyAggregate>> {
        self.warehouse.preview_weekly(catalog, limit).await
    }

    /// Validate, build and preview in one pass.
    pub async fn run(&self) -> WarehouseResult<LoadReport> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        info!(%run_id, backend = self.warehouse.backend(), namespace = %self.warehouse.namespace(), "Load started");

        let validation = self.validate().await?;
        let tactics = self.resolve_tactics().await?;
        let rows_written = self.build(&tactics).await?;
        let preview = self.preview(&tactics, self.preview_limit).await?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(%run_id, rows_written, elapsed_ms, "Load finished");

        Ok(LoadReport {
            run_id,
            backend: self.warehouse.backend(),
            namespace: self.warehouse.namespace().clone(),
            table: self.warehouse.namespace().qualify(&self.tables.weekly_output),
            validation,
            tactics,
            rows_written,
            preview,
            elapsed_ms,
        })
    }

    /// Overwrite the input tables with generated sample data.
    pub async fn seed(&self, config: &SampleDataConfig) -> WarehouseResult<SampleData> {
        let data = mmm_reporting::sample::generate(config)?;
        self.warehouse
            .replace_inputs(&data.results, &data.spends)
            .await?;
        info!(
            campaigns = data.results.len(),
            tactic_rows = data.spends.len(),
            namespace = %self.warehouse.namespace(),
            "Input tables seeded"
        );
        Ok(data)
    }
}
