//! Local warehouse backed by JSON-lines files, one file per table under
//! `<data_dir>/[<catalog>/]<schema>/`. Tables are cached in memory after the
//! first read; writes replace the whole file.

use crate::error::{WarehouseError, WarehouseResult};
use crate::warehouse::Warehouse;
use async_trait::async_trait;
use dashmap::DashMap;
use mmm_core::config::{JoinMode, TableConfig};
use mmm_core::types::{CampaignResult, TacticBreakdown, TacticSpend, WeeklyAggregate};
use mmm_core::{Namespace, TacticCatalog};
use mmm_reporting::{tactic_breakdown, WeeklyTacticAggregator};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

type Record = Map<String, Value>;

pub struct LocalWarehouse {
    /// Namespace directory; `None` keeps every table in memory only.
    root: Option<PathBuf>,
    namespace: Namespace,
    tables: TableConfig,
    store: DashMap<String, Vec<Record>>,
}

impl LocalWarehouse {
    pub fn in_memory(namespace: Namespace, tables: TableConfig) -> Self {
        Self {
            root: None,
            namespace,
            tables,
            store: DashMap::new(),
        }
    }

    pub fn open(data_dir: &Path, namespace: Namespace, tables: TableConfig) -> Self {
        let mut root = data_dir.to_path_buf();
        if let Some(catalog) = &namespace.catalog {
            root.push(catalog);
        }
        root.push(&namespace.schema);
        info!(path = %root.display(), "Opened local warehouse");

        Self {
            root: Some(root),
            namespace,
            tables,
            store: DashMap::new(),
        }
    }

    pub fn directory(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn table_path(&self, table: &str) -> Option<PathBuf> {
        self.root.as_ref().map(|root| root.join(format!("{table}.jsonl")))
    }

    async fn read_table(&self, table: &str) -> WarehouseResult<Vec<Record>> {
        metrics::counter!("warehouse.queries", "backend" => "local").increment(1);
        if let Some(rows) = self.store.get(table) {
            return Ok(rows.clone());
        }

        let path = match self.table_path(table) {
            Some(path) => path,
            None => return Err(WarehouseError::TableNotFound(self.namespace.qualify(table))),
        };
        if !tokio::fs::try_exists(&path).await? {
            return Err(WarehouseError::TableNotFound(self.namespace.qualify(table)));
        }

        let contents = tokio::fs::read_to_string(&path).await?;
        let mut rows = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(Value::Object(record)) => rows.push(record),
                Ok(_) => return Err(malformed(table, index, "expected a JSON object")),
                Err(e) => return Err(malformed(table, index, &e.to_string())),
            }
        }

        debug!(table, rows = rows.len(), path = %path.display(), "Loaded local table");
        self.store.insert(table.to_string(), rows.clone());
        Ok(rows)
    }

    async fn write_table(&self, table: &str, rows: Vec<Record>) -> WarehouseResult<()> {
        if let Some(path) = self.table_path(table) {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut contents = String::new();
            for row in &rows {
                contents.push_str(&serde_json::to_string(row)?);
                contents.push('\n');
            }
            let staging = path.with_extension("jsonl.tmp");
            tokio::fs::write(&staging, contents).await?;
            tokio::fs::rename(&staging, &path).await?;
            debug!(table, rows = rows.len(), path = %path.display(), "Wrote local table");
        }

        metrics::counter!("warehouse.rows_written", "backend" => "local")
            .increment(rows.len() as u64);
        self.store.insert(table.to_string(), rows);
        Ok(())
    }

    async fn read_typed<T: DeserializeOwned>(&self, table: &str) -> WarehouseResult<Vec<T>> {
        self.read_table(table)
            .await?
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                serde_json::from_value(Value::Object(record))
                    .map_err(|e| malformed(table, index, &e.to_string()))
            })
            .collect()
    }
}

fn to_records<T: Serialize>(table: &str, rows: &[T]) -> WarehouseResult<Vec<Record>> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| -> WarehouseResult<Record> {
            match serde_json::to_value(row)? {
                Value::Object(record) => Ok(record),
                _ => Err(malformed(table, index, "expected a JSON object")),
            }
        })
        .collect()
}

fn malformed(table: &str, index: usize, reason: &str) -> WarehouseError {
    WarehouseError::MalformedRow {
        table: table.to_string(),
        reason: format!("row {}: {reason}", index + 1),
    }
}

#[async_trait]
impl Warehouse for LocalWarehouse {
    fn backend(&self) -> &'static str {
        "local"
    }

    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    async fn count_rows(&self, table: &str) -> WarehouseResult<u64> {
        Ok(self.read_table(table).await?.len() as u64)
    }

    async fn tactic_breakdown(&self) -> WarehouseResult<Vec<TacticBreakdown>> {
        Ok(tactic_breakdown(&self.tactic_spends().await?))
    }

    async fn campaign_results(&self) -> WarehouseResult<Vec<CampaignResult>> {
        self.read_typed(&self.tables.campaign_results).await
    }

    async fn tactic_spends(&self) -> WarehouseResult<Vec<TacticSpend>> {
        self.read_typed(&self.tables.campaign_tactics).await
    }

    async fn build_weekly(&self, catalog: &TacticCatalog, join: JoinMode) -> WarehouseResult<u64> {
        let results = self.campaign_results().await?;
        let spends = self.tactic_spends().await?;
        let rows = WeeklyTacticAggregator::new(catalog.clone())
            .with_join(join)
            .aggregate(&results, &spends);
        self.replace_weekly(&rows, catalog).await
    }

    async fn replace_weekly(
        &self,
        rows: &[WeeklyAggregate],
        _catalog: &TacticCatalog,
    ) -> WarehouseResult<u64> {
        let records = rows.iter().map(WeeklyAggregate::to_record).collect();
        self.write_table(&self.tables.weekly_output, records).await?;
        info!(
            table = %self.namespace.qualify(&self.tables.weekly_output),
            rows = rows.len(),
            "Weekly table replaced"
        );
        Ok(rows.len() as u64)
    }

    async fn preview_weekly(
        &self,
        catalog: &TacticCatalog,
        limit: usize,
    ) -> WarehouseResult<Vec<WeeklyAggregate>> {
        let records = self.read_table(&self.tables.weekly_output).await?;
        let mut rows = records
            .iter()
            .map(|record| WeeklyAggregate::from_record(record, catalog))
            .collect::<Result<Vec<_>, _>>()?;
        // Same order as the rendered preview query.
        rows.sort_by(|a, b| {
            (a.campaign_start_date, &a.campaign_week, &a.campaign_id).cmp(&(
                b.campaign_start_date,
                &b.campaign_week,
                &b.campaign_id,
            ))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    async fn replace_inputs(
        &self,
        results: &[CampaignResult],
        spends: &[TacticSpend],
    ) -> WarehouseResult<()> {
        let results_table = &self.tables.campaign_results;
        let tactics_table = &self.tables.campaign_tactics;
        self.write_table(results_table, to_records(results_table, results)?)
            .await?;
        self.write_table(tactics_table, to_records(tactics_table, spends)?)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn namespace() -> Namespace {
        Namespace::new(Some("main"), "marketing")
    }

    fn inputs() -> (Vec<CampaignResult>, Vec<TacticSpend>) {
        let result = CampaignResult {
            campaign_id: "C1".to_string(),
            campaign_week: "2024-W01".to_string(),
            campaign_start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            incremental_sales: 15.0,
            total_spend: 160.0,
            lift_percent: 2.5,
            iroas: 0.09,
            test_sales: None,
            control_sales: None,
        };
        let spends = vec![
            TacticSpend {
                campaign_id: "C1".to_string(),
                tactic: "video".to_string(),
                spend_amount: 100.0,
            },
            TacticSpend {
                campaign_id: "C1".to_string(),
                tactic: "search".to_string(),
                spend_amount: 50.0,
            },
        ];
        (vec![result], spends)
    }

    #[tokio::test]
    async fn test_missing_table_is_reported() {
        let warehouse = LocalWarehouse::in_memory(namespace(), TableConfig::default());
        let err = warehouse.count_rows("campaign_results").await.unwrap_err();
        match err {
            WarehouseError::TableNotFound(name) => {
                assert_eq!(name, "main.marketing.campaign_results")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_build_and_preview_in_memory() {
        let warehouse = LocalWarehouse::in_memory(namespace(), TableConfig::default());
        let (results, spends) = inputs();
        warehouse.replace_inputs(&results, &spends).await.unwrap();

        assert_eq!(warehouse.count_rows("campaign_results").await.unwrap(), 1);
        assert_eq!(warehouse.count_rows("campaign_tactics").await.unwrap(), 2);

        let catalog = TacticCatalog::default();
        let written = warehouse.build_weekly(&catalog, JoinMode::Inner).await.unwrap();
        assert_eq!(written, 1);

        let preview = warehouse.preview_weekly(&catalog, 10).await.unwrap();
        assert_eq!(preview.len(), 1);
        assert_eq!(preview[0].incremental_sales, 30.0);
        assert_eq!(preview[0].spend_for("video"), Some(100.0));
        assert_eq!(preview[0].spend_for("display"), Some(0.0));
        assert_eq!(preview[0].total_spend, 320.0);
    }

    #[tokio::test]
    async fn test_tables_persist_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let (results, spends) = inputs();

        let first = LocalWarehouse::open(dir.path(), namespace(), TableConfig::default());
        first.replace_inputs(&results, &spends).await.unwrap();
        first
            .build_weekly(&TacticCatalog::default(), JoinMode::Inner)
            .await
            .unwrap();

        let expected = dir.path().join("main").join("marketing").join("mmm_weekly_data.jsonl");
        assert_eq!(first.table_path("mmm_weekly_data"), Some(expected.clone()));
        assert!(expected.exists());

        let second = LocalWarehouse::open(dir.path(), namespace(), TableConfig::default());
        assert_eq!(second.campaign_results().await.unwrap(), results);
        assert_eq!(second.tactic_spends().await.unwrap(), spends);
        let preview = second
            .preview_weekly(&TacticCatalog::default(), 5)
            .await
            .unwrap();
        assert_eq!(preview[0].campaign_id, "C1");
    }

    #[tokio::test]
    async fn test_malformed_line_names_row() {
        let dir = tempfile::tempdir().unwrap();
        let warehouse = LocalWarehouse::open(dir.path(), Namespace::new(None, "default"), TableConfig::default());
        let path = warehouse.table_path("campaign_tactics").unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "{\"campaign_id\":\"C1\",\"tactic\":\"video\",\"spend_amount\":1.0}\n\n[1,2]\n",
        )
        .unwrap();

        let err = warehouse.tactic_spends().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Malformed row in campaign_tactics: row 3: expected a JSON object"
        );
    }

    #[tokio::test]
    async fn test_integer_campaign_ids_join() {
        let dir = tempfile::tempdir().unwrap();
        let warehouse = LocalWarehouse::open(dir.path(), namespace(), TableConfig::default());
        let results_path = warehouse.table_path("campaign_results").unwrap();
        std::fs::create_dir_all(results_path.parent().unwrap()).unwrap();
        std::fs::write(
            &results_path,
            "{\"campaign_id\":101,\"campaign_week\":\"2024-W01\",\"campaign_start_date\":\"2024-01-01\",\
             \"incremental_sales\":15.0,\"total_spend\":160.0,\"lift_percent\":2.5,\"iroas\":0.09}\n",
        )
        .unwrap();
        std::fs::write(
            warehouse.table_path("campaign_tactics").unwrap(),
            "{\"campaign_id\":101,\"tactic\":\"video\",\"spend_amount\":100.0}\n\
             {\"campaign_id\":101,\"tactic\":\"search\",\"spend_amount\":50.0}\n",
        )
        .unwrap();

        assert_eq!(warehouse.tactic_spends().await.unwrap()[0].campaign_id, "101");

        let catalog = TacticCatalog::default();
        assert_eq!(warehouse.build_weekly(&catalog, JoinMode::Inner).await.unwrap(), 1);
        let preview = warehouse.preview_weekly(&catalog, 10).await.unwrap();
        assert_eq!(preview[0].campaign_id, "101");
        assert_eq!(preview[0].spend_for("search"), Some(50.0));
        assert_eq!(preview[0].total_spend, 320.0);
    }

    #[tokio::test]
    async fn test_preview_sorts_before_limit() {
        let warehouse = LocalWarehouse::in_memory(namespace(), TableConfig::default());
        let catalog = TacticCatalog::new(["video"]).unwrap();
        let row = |week: &str, day: u32, id: &str| WeeklyAggregate {
            campaign_week: week.to_string(),
            campaign_start_date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            campaign_id: id.to_string(),
            incremental_sales: 1.0,
            tactic_spend: vec![mmm_core::types::TacticSpendColumn {
                tactic: "video".to_string(),
                amount: 1.0,
            }],
            total_spend: 1.0,
        };
        let unsorted = vec![
            row("2024-W03", 15, "C5"),
            row("2024-W02", 8, "C4"),
            row("2024-W01", 1, "C2"),
            row("2024-W01", 1, "C1"),
        ];
        warehouse.replace_weekly(&unsorted, &catalog).await.unwrap();

        let preview = warehouse.preview_weekly(&catalog, 3).await.unwrap();
        let ids: Vec<&str> = preview.iter().map(|r| r.campaign_id.as_str()).collect();
        assert_eq!(ids, vec!["C1", "C2", "C4"]);
    }

    #[tokio::test]
    async fn test_weekly_file_keeps_column_order() {
        let dir = tempfile::tempdir().unwrap();
        let warehouse = LocalWarehouse::open(dir.path(), namespace(), TableConfig::default());
        let (results, spends) = inputs();
        warehouse.replace_inputs(&results, &spends).await.unwrap();
        let catalog = TacticCatalog::new(["video", "search"]).unwrap();
        warehouse.build_weekly(&catalog, JoinMode::Inner).await.unwrap();

        let contents =
            std::fs::read_to_string(warehouse.table_path("mmm_weekly_data").unwrap()).unwrap();
        assert!(contents.starts_with(
            "{\"campaign_week\":\"2024-W01\",\"campaign_start_date\":\"2024-01-01\",\"campaign_id\":\"C1\",\
             \"incremental_sales\":30.0,\"video_spend\":100.0,\"search_spend\":50.0,\"total_spend\":320.0}"
        ));
    }

    #[tokio::test]
    async fn test_breakdown_from_files() {
        let warehouse = LocalWarehouse::in_memory(namespace(), TableConfig::default());
        let (results, spends) = inputs();
        warehouse.replace_inputs(&results, &spends).await.unwrap();

        let breakdown = warehouse.tactic_breakdown().await.unwrap();
        assert_eq!(breakdown[0].tactic, "video");
        assert_eq!(breakdown[1].total_spend, 50.0);
    }
}
