//! ClickHouse warehouse backend. Statements come from [`QueryRenderer`] in the
//! ClickHouse dialect; rows are written as `JSONEachRow` batches.

use crate::error::{WarehouseError, WarehouseResult};
use crate::warehouse::Warehouse;
use async_trait::async_trait;
use clickhouse::Row;
use mmm_core::config::{ClickHouseConfig, JoinMode, TableConfig};
use mmm_core::tactic::spend_column;
use mmm_core::types::{
    parse_date, CampaignResult, TacticBreakdown, TacticSpend, TacticSpendColumn, WeeklyAggregate,
};
use mmm_core::{MmmError, Namespace, TacticCatalog};
use mmm_reporting::{Dialect, QueryRenderer};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// Rows per `INSERT` statement.
const INSERT_BATCH_SIZE: usize = 10_000;

#[derive(Debug, Row, Deserialize)]
struct CampaignResultRow {
    campaign_id: String,
    campaign_week: String,
    campaign_start_date: String,
    incremental_sales: f64,
    total_spend: f64,
    lift_percent: f64,
    iroas: f64,
}

#[derive(Debug, Row, Deserialize)]
struct TacticSpendRow {
    campaign_id: String,
    tactic: String,
    spend_amount: f64,
}

#[derive(Debug, Row, Deserialize)]
struct BreakdownRow {
    tactic: String,
    campaigns: u64,
    total_spend: f64,
}

#[derive(Debug, Row, Deserialize)]
struct WeeklyRow {
    campaign_week: String,
    campaign_start_date: String,
    campaign_id: String,
    incremental_sales: f64,
    /// Spend columns packed into an array in catalog order.
    tactic_spend: Vec<f64>,
    total_spend: f64,
}

pub struct ClickHouseWarehouse {
    client: clickhouse::Client,
    renderer: QueryRenderer,
    tables: TableConfig,
}

impl ClickHouseWarehouse {
    /// Connect and verify the server answers. The namespace schema is used as
    /// the ClickHouse database; catalogs are not supported.
    pub async fn connect(
        config: &ClickHouseConfig,
        namespace: Namespace,
        tables: TableConfig,
    ) -> WarehouseResult<Self> {
        if let Some(catalog) = &namespace.catalog {
            return Err(MmmError::Config(format!(
                "ClickHouse has no catalogs, unset catalog {catalog:?} and use the schema as database"
            ))
            .into());
        }

        info!(url = %config.url, database = %namespace.schema, "Connecting to ClickHouse");

        let mut client = clickhouse::Client::default()
            .with_url(&config.url)
            .with_database(&namespace.schema);
        if let Some(user) = &config.user {
            client = client.with_user(user);
        }
        if let Some(password) = &config.password {
            client = client.with_password(password);
        }

        let ping: u8 = client.query("SELECT 1").fetch_one().await?;
        debug!(response = ping, "ClickHouse connection established");

        Ok(Self {
            client,
            renderer: QueryRenderer::new(namespace, tables.clone(), Dialect::ClickHouse),
            tables,
        })
    }

    async fn execute(&self, kind: &'static str, sql: &str) -> WarehouseResult<()> {
        debug!(kind, sql, "Executing ClickHouse statement");
        metrics::counter!("warehouse.queries", "backend" => "clickhouse", "kind" => kind)
            .increment(1);
        self.client
            .query(sql)
            .execute()
            .await
            .map_err(|e| query_failed(kind, e))
    }

    async fn fetch<T>(&self, kind: &'static str, sql: &str) -> WarehouseResult<Vec<T>>
    where
        T: Row + for<'b> Deserialize<'b>,
    {
        debug!(kind, sql, "Running ClickHouse query");
        metrics::counter!("warehouse.queries", "backend" => "clickhouse", "kind" => kind)
            .increment(1);
        self.client
            .query(sql)
            .fetch_all::<T>()
            .await
            .map_err(|e| query_failed(kind, e))
    }

    /// Insert rows as `JSONEachRow` batches.
    async fn insert_json<T: Serialize>(&self, table: &str, rows: &[T]) -> WarehouseResult<()> {
        for batch in rows.chunks(INSERT_BATCH_SIZE) {
            let mut lines = Vec::with_capacity(batch.len());
            for row in batch {
                lines.push(escape_placeholders(&serde_json::to_string(row)?));
            }
            let sql = format!("INSERT INTO {table} FORMAT JSONEachRow\n{}", lines.join("\n"));
            self.execute("insert", &sql).await?;
            metrics::counter!("warehouse.rows_written", "backend" => "clickhouse")
                .increment(batch.len() as u64);
        }
        Ok(())
    }

    fn preview_sql(&self, catalog: &TacticCatalog, limit: usize) -> String {
        let spend_columns: Vec<String> = catalog
            .iter()
            .map(|t| format!("toFloat64({})", spend_column(t)))
            .collect();
        let select = format!(
            "toString(campaign_week), toString(campaign_start_date), toString(campaign_id), \
             toFloat64(incremental_sales), [{}], toFloat64(total_spend)",
            spend_columns.join(", ")
        );
        self.renderer.preview(&select, limit)
    }
}

#[async_trait]
impl Warehouse for ClickHouseWarehouse {
    fn backend(&self) -> &'static str {
        "clickhouse"
    }

    fn namespace(&self) -> &Namespace {
        self.renderer.namespace()
    }

    async fn count_rows(&self, table: &str) -> WarehouseResult<u64> {
        let counts: Vec<u64> = self.fetch("count", &self.renderer.count_rows(table)).await?;
        counts
            .first()
            .copied()
            .ok_or_else(|| WarehouseError::MalformedRow {
                table: table.to_string(),
                reason: "count query returned no rows".to_string(),
            })
    }

    async fn tactic_breakdown(&self) -> WarehouseResult<Vec<TacticBreakdown>> {
        let sql = format!(
            "SELECT toString(tactic) AS tactic_name, toUInt64(campaigns), toFloat64(total_spend) AS spend \
             FROM ({}) ORDER BY spend DESC, tactic_name",
            self.renderer.tactic_breakdown()
        );
        let rows: Vec<BreakdownRow> = self.fetch("breakdown", &sql).await?;
        Ok(rows
            .into_iter()
            .map(|r| TacticBreakdown {
                tactic: r.tactic,
                campaigns: r.campaigns,
                total_spend: r.total_spend,
            })
            .collect())
    }

    async fn campaign_results(&self) -> WarehouseResult<Vec<CampaignResult>> {
        let sql = format!(
            "SELECT toString(campaign_id), toString(campaign_week), toString(campaign_start_date), \
             toFloat64(incremental_sales), toFloat64(total_spend), toFloat64(lift_percent), \
             toFloat64(iroas) FROM {}",
            self.renderer.campaign_results()
        );
        let rows: Vec<CampaignResultRow> = self.fetch("campaign_results", &sql).await?;
        rows.into_iter()
            .map(|r| -> WarehouseResult<CampaignResult> {
                Ok(CampaignResult {
                    campaign_start_date: parse_date(&r.campaign_start_date)?,
                    campaign_id: r.campaign_id,
                    campaign_week: r.campaign_week,
                    incremental_sales: r.incremental_sales,
                    total_spend: r.total_spend,
                    lift_percent: r.lift_percent,
                    iroas: r.iroas,
                    test_sales: None,
                    control_sales: None,
                })
            })
            .collect()
    }

    async fn tactic_spends(&self) -> WarehouseResult<Vec<TacticSpend>> {
        let sql = format!(
            "SELECT toString(campaign_id), toString(tactic), toFloat64(spend_amount) FROM {}",
            self.renderer.campaign_tactics()
        );
        let rows: Vec<TacticSpendRow> = self.fetch("campaign_tactics", &sql).await?;
        Ok(rows
            .into_iter()
            .map(|r| TacticSpend {
                campaign_id: r.campaign_id,
                tactic: r.tactic,
                spend_amount: r.spend_amount,
            })
            .collect())
    }

    async fn build_weekly(&self, catalog: &TacticCatalog, join: JoinMode) -> WarehouseResult<u64> {
        self.execute("build_weekly", &self.renderer.weekly_table(catalog, join))
            .await?;
        let rows = self.count_rows(&self.tables.weekly_output).await?;
        info!(table = %self.renderer.weekly_output(), rows, "Weekly table rebuilt in ClickHouse");
        Ok(rows)
    }

    async fn replace_weekly(
        &self,
        rows: &[WeeklyAggregate],
        catalog: &TacticCatalog,
    ) -> WarehouseResult<u64> {
        let table = self.renderer.weekly_output();
        self.execute("create_weekly", &weekly_ddl(&table, catalog))
            .await?;
        self.insert_json(&table, rows).await?;
        info!(table = %table, rows = rows.len(), "Weekly table replaced in ClickHouse");
        Ok(rows.len() as u64)
    }

    async fn preview_weekly(
        &self,
        catalog: &TacticCatalog,
        limit: usize,
    ) -> WarehouseResult<Vec<WeeklyAggregate>> {
        let rows: Vec<WeeklyRow> = self.fetch("preview", &self.preview_sql(catalog, limit)).await?;
        rows.into_iter()
            .map(|r| -> WarehouseResult<WeeklyAggregate> {
                Ok(WeeklyAggregate {
                    campaign_start_date: parse_date(&r.campaign_start_date)?,
                    campaign_week: r.campaign_week,
                    campaign_id: r.campaign_id,
                    incremental_sales: r.incremental_sales,
                    tactic_spend: catalog
                        .iter()
                        .zip(r.tactic_spend)
                        .map(|(tactic, amount)| TacticSpendColumn {
                            tactic: tactic.to_string(),
                            amount,
                        })
                        .collect(),
                    total_spend: r.total_spend,
                })
            })
            .collect()
    }

    async fn replace_inputs(
        &self,
        results: &[CampaignResult],
        spends: &[TacticSpend],
    ) -> WarehouseResult<()> {
        let results_table = self.renderer.campaign_results();
        let tactics_table = self.renderer.campaign_tactics();

        self.execute("create_inputs", &campaign_results_ddl(&results_table))
            .await?;
        self.execute("create_inputs", &campaign_tactics_ddl(&tactics_table))
            .await?;
        self.insert_json(&results_table, results).await?;
        self.insert_json(&tactics_table, spends).await?;

        info!(
            campaigns = results.len(),
            tactic_rows = spends.len(),
            "Input tables replaced in ClickHouse"
        );
        Ok(())
    }
}

fn campaign_results_ddl(table: &str) -> String {
    format!(
        "CREATE OR REPLACE TABLE {table} (
            campaign_id String,
            campaign_week String,
            campaign_start_date Date,
            incremental_sales Float64,
            total_spend Float64,
            lift_percent Float64,
            iroas Float64,
            test_sales Nullable(Float64),
            control_sales Nullable(Float64)
        ) ENGINE = MergeTree()
        ORDER BY (campaign_start_date, campaign_id)"
    )
}

fn campaign_tactics_ddl(table: &str) -> String {
    format!(
        "CREATE OR REPLACE TABLE {table} (
            campaign_id String,
            tactic LowCardinality(String),
            spend_amount Float64
        ) ENGINE = MergeTree()
        ORDER BY (campaign_id, tactic)"
    )
}

fn weekly_ddl(table: &str, catalog: &TacticCatalog) -> String {
    let spend_columns: String = catalog
        .iter()
        .map(|t| format!("            {} Float64,\n", spend_column(t)))
        .collect();
    format!(
        "CREATE OR REPLACE TABLE {table} (
            campaign_week String,
            campaign_start_date Date,
            campaign_id String,
            incremental_sales Float64,
{spend_columns}            total_spend Float64
        ) ENGINE = MergeTree()
        ORDER BY (campaign_start_date, campaign_id)"
    )
}

fn query_failed(kind: &'static str, e: clickhouse::error::Error) -> WarehouseError {
    metrics::counter!("warehouse.errors", "backend" => "clickhouse", "kind" => kind).increment(1);
    error!(error = %e, kind, "ClickHouse query failed");
    WarehouseError::from(e)
}

/// `?` marks a bind placeholder in the client's query templates. It can only
/// appear inside JSON strings, where the unicode escape is equivalent.
fn escape_placeholders(json: &str) -> String {
    json.replace('?', "\\u003f")
}
