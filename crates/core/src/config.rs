use crate::tactic::TacticCatalog;
use crate::types::{
    Namespace, CAMPAIGN_RESULTS_TABLE, CAMPAIGN_TACTICS_TABLE, WEEKLY_OUTPUT_TABLE,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root loader configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `MMM_LOADER__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub namespace: NamespaceConfig,
    #[serde(default)]
    pub tables: TableConfig,
    #[serde(default)]
    pub tactics: TacticCatalog,
    /// Derive the pivot columns from the tactic table instead of `tactics`.
    #[serde(default)]
    pub discover_tactics: bool,
    #[serde(default)]
    pub join: JoinMode,
    #[serde(default)]
    pub mode: AggregationMode,
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub clickhouse: ClickHouseConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default = "default_preview_limit")]
    pub preview_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamespaceConfig {
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default = "default_schema")]
    pub schema: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    #[serde(default = "default_campaign_results")]
    pub campaign_results: String,
    #[serde(default = "default_campaign_tactics")]
    pub campaign_tactics: String,
    #[serde(default = "default_weekly_output")]
    pub weekly_output: String,
}

/// How campaign results are joined with their tactic rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    /// Campaigns without tactic rows are dropped.
    #[default]
    Inner,
    /// Campaigns without tactic rows are kept with zero tactic spend.
    Left,
}

/// Where the weekly aggregation is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// The warehouse runs one statement that replaces the output table.
    #[default]
    Pushdown,
    /// Inputs are fetched, aggregated in this process and written back.
    InProcess,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Local,
    #[serde(rename = "clickhouse")]
    ClickHouse,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClickHouseConfig {
    #[serde(default = "default_clickhouse_url")]
    pub url: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

// Default functions
fn default_schema() -> String {
    "default".to_string()
}
fn default_campaign_results() -> String {
    CAMPAIGN_RESULTS_TABLE.to_string()
}
fn default_campaign_tactics() -> String {
    CAMPAIGN_TACTICS_TABLE.to_string()
}
fn default_weekly_output() -> String {
    WEEKLY_OUTPUT_TABLE.to_string()
}
fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_preview_limit() -> usize {
    10
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            catalog: None,
            schema: default_schema(),
        }
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            campaign_results: default_campaign_results(),
            campaign_tactics: default_campaign_tactics(),
            weekly_output: default_weekly_output(),
        }
    }
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: default_clickhouse_url(),
            user: None,
            password: None,
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            namespace: NamespaceConfig::default(),
            tables: TableConfig::default(),
            tactics: TacticCatalog::default(),
            discover_tactics: false,
            join: JoinMode::default(),
            mode: AggregationMode::default(),
            backend: BackendKind::default(),
            clickhouse: ClickHouseConfig::default(),
            local: LocalConfig::default(),
            preview_limit: default_preview_limit(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and an optional config file.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("MMM_LOADER")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("tactics"),
            )
            .build()?;
        config.try_deserialize()
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::new(self.namespace.catalog.as_deref(), &self.namespace.schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_loader_notebook() {
        let config = AppConfig::default();
        assert_eq!(config.namespace().qualify(&config.tables.weekly_output), "default.mmm_weekly_data");
        assert_eq!(config.tactics.len(), 6);
        assert_eq!(config.join, JoinMode::Inner);
        assert_eq!(config.mode, AggregationMode::Pushdown);
        assert_eq!(config.preview_limit, 10);
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
tactics = ["search", "video"]
join = "left"
mode = "in_process"
backend = "clickhouse"

[namespace]
catalog = "main"
schema = "marketing"
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.namespace().qualify("campaign_results"), "main.marketing.campaign_results");
        assert_eq!(config.tactics.iter().collect::<Vec<_>>(), vec!["search", "video"]);
        assert_eq!(config.join, JoinMode::Left);
        assert_eq!(config.mode, AggregationMode::InProcess);
        assert_eq!(config.backend, BackendKind::ClickHouse);
        assert_eq!(config.tables.campaign_tactics, "campaign_tactics");
    }

    #[test]
    fn test_invalid_tactic_in_file_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, r#"tactics = ["Out Of Home"]"#).unwrap();
        assert!(AppConfig::load(Some(file.path())).is_err());
    }
}
