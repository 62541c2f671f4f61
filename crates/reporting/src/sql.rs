//! SQL statements issued against the warehouse.

use mmm_core::config::{JoinMode, TableConfig};
use mmm_core::tactic::spend_column;
use mmm_core::{Namespace, TacticCatalog};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `CREATE OR REPLACE TABLE ... AS WITH ...` with catalog-qualified names.
    #[default]
    Ansi,
    /// MergeTree table engine and a derived table in place of the CTE.
    ClickHouse,
}

/// Renders the loader's statements for one namespace.
#[derive(Debug, Clone)]
pub struct QueryRenderer {
    namespace: Namespace,
    tables: TableConfig,
    dialect: Dialect,
}

impl QueryRenderer {
    pub fn new(namespace: Namespace, tables: TableConfig, dialect: Dialect) -> Self {
        Self {
            namespace,
            tables,
            dialect,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn campaign_results(&self) -> String {
        self.namespace.qualify(&self.tables.campaign_results)
    }

    pub fn campaign_tactics(&self) -> String {
        self.namespace.qualify(&self.tables.campaign_tactics)
    }

    pub fn weekly_output(&self) -> String {
        self.namespace.qualify(&self.tables.weekly_output)
    }

    pub fn count_rows(&self, table: &str) -> String {
        format!("SELECT COUNT(*) AS count FROM {}", self.namespace.qualify(table))
    }

    pub fn tactic_breakdown(&self) -> String {
        format!(
            "SELECT tactic, COUNT(*) AS campaigns, ROUND(SUM(spend_amount), 2) AS total_spend\n\
             FROM {}\n\
             GROUP BY tactic\n\
             ORDER BY total_spend DESC, tactic",
            self.campaign_tactics()
        )
    }

    /// Statement that recomputes and replaces the weekly output table.
    pub fn weekly_table(&self, catalog: &TacticCatalog, join: JoinMode) -> String {
        // ClickHouse resolves aliases before columns, so the campaign total
        // needs a name distinct from the aggregated output column.
        let total_column = match self.dialect {
            Dialect::Ansi => "total_spend",
            Dialect::ClickHouse => "campaign_total_spend",
        };
        let (join_keyword, spend_expr) = match join {
            JoinMode::Inner => ("JOIN", "t.spend_amount"),
            JoinMode::Left => ("LEFT JOIN", "COALESCE(t.spend_amount, 0)"),
        };

        let joined = format!(
            "  SELECT\n\
             \x20   c.campaign_week,\n\
             \x20   c.campaign_start_date,\n\
             \x20   c.campaign_id,\n\
             \x20   c.incremental_sales AS response_variable,\n\
             \x20   c.total_spend AS {total_column},\n\
             \x20   c.lift_percent,\n\
             \x20   c.iroas,\n\
             \x20   t.tactic,\n\
             \x20   {spend_expr} AS spend_amount\n\
             \x20 FROM {results} c\n\
             \x20 {join_keyword} {tactics} t ON c.campaign_id = t.campaign_id",
            results = self.campaign_results(),
            tactics = self.campaign_tactics(),
        );

        let mut select = String::from(
            "SELECT\n  campaign_week,\n  campaign_start_date,\n  campaign_id,\n  SUM(response_variable) AS incremental_sales,\n",
        );
        for tactic in catalog.iter() {
            select.push_str(&format!(
                "  SUM(CASE WHEN tactic = {} THEN spend_amount ELSE 0 END) AS {},\n",
                quote_literal(tactic),
                spend_column(tactic)
            ));
        }
        select.push_str(&format!("  SUM({total_column}) AS total_spend\n"));

        let grouping = "GROUP BY campaign_week, campaign_start_date, campaign_id\nORDER BY campaign_start_date";
        let output = self.weekly_output();

        match self.dialect {
            Dialect::Ansi => format!(
                "CREATE OR REPLACE TABLE {output} AS\n\
                 WITH weekly_tactics AS (\n{joined}\n)\n\
                 {select}FROM weekly_tactics\n{grouping}"
            ),
            Dialect::ClickHouse => format!(
                "CREATE OR REPLACE TABLE {output}\n\
                 ENGINE = MergeTree\n\
                 ORDER BY (campaign_start_date, campaign_id)\n\
                 AS\n\
                 {select}FROM (\n{joined}\n) AS weekly_tactics\n{grouping}"
            ),
        }
    }

    /// First `limit` weekly rows in output order. `select` is the column list.
    pub fn preview(&self, select: &str, limit: usize) -> String {
        format!(
            "SELECT {select} FROM {} ORDER BY campaign_start_date, campaign_week, campaign_id LIMIT {limit}",
            self.weekly_output()
        )
    }
}

/// Single-quoted SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
