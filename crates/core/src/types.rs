use crate::error::{MmmError, MmmResult};
use crate::tactic::{spend_column, TacticCatalog};
use chrono::NaiveDate;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Default table holding one measured result per campaign.
pub const CAMPAIGN_RESULTS_TABLE: &str = "campaign_results";
/// Default table holding spend per campaign and tactic.
pub const CAMPAIGN_TACTICS_TABLE: &str = "campaign_tactics";
/// Default pivoted output table.
pub const WEEKLY_OUTPUT_TABLE: &str = "mmm_weekly_data";

/// Measured outcome of a single campaign (test vs control experiment).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignResult {
    #[serde(deserialize_with = "campaign_id_text")]
    pub campaign_id: String,
    /// Period label, e.g. `2024-W01`.
    pub campaign_week: String,
    pub campaign_start_date: NaiveDate,
    /// Lift over the control group. May be negative.
    pub incremental_sales: f64,
    pub total_spend: f64,
    pub lift_percent: f64,
    pub iroas: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_sales: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_sales: Option<f64>,
}

/// Spend recorded for one campaign under one tactic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TacticSpend {
    #[serde(deserialize_with = "campaign_id_text")]
    pub campaign_id: String,
    pub tactic: String,
    pub spend_amount: f64,
}

/// Campaign ids stored as integers read as their decimal form.
fn campaign_id_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum CampaignId {
        Text(String),
        Unsigned(u64),
        Signed(i64),
    }

    Ok(match CampaignId::deserialize(deserializer)? {
        CampaignId::Text(id) => id,
        CampaignId::Unsigned(id) => id.to_string(),
        CampaignId::Signed(id) => id.to_string(),
    })
}

/// One pivoted spend column of a [`WeeklyAggregate`].
#[derive(Debug, Clone, PartialEq)]
pub struct TacticSpendColumn {
    pub tactic: String,
    pub amount: f64,
}

/// One output row per (week, start date, campaign).
///
/// `tactic_spend` holds one entry per catalog tactic, in catalog order, so
/// absent tactics are present with an amount of `0.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyAggregate {
    pub campaign_week: String,
    pub campaign_start_date: NaiveDate,
    pub campaign_id: String,
    pub incremental_sales: f64,
    pub tactic_spend: Vec<TacticSpendColumn>,
    pub total_spend: f64,
}

impl WeeklyAggregate {
    /// Output column names for a catalog, in table order.
    pub fn columns(catalog: &TacticCatalog) -> Vec<String> {
        let mut columns = vec![
            "campaign_week".to_string(),
            "campaign_start_date".to_string(),
            "campaign_id".to_string(),
            "incremental_sales".to_string(),
        ];
        columns.extend(catalog.iter().map(spend_column));
        columns.push("total_spend".to_string());
        columns
    }

    pub fn spend_for(&self, tactic: &str) -> Option<f64> {
        self.tactic_spend
            .iter()
            .find(|c| c.tactic == tactic)
            .map(|c| c.amount)
    }

    /// Cell values in the order given by [`WeeklyAggregate::columns`].
    pub fn values(&self) -> Vec<Value> {
        let mut values = vec![
            Value::from(self.campaign_week.clone()),
            Value::from(self.campaign_start_date.to_string()),
            Value::from(self.campaign_id.clone()),
            Value::from(self.incremental_sales),
        ];
        values.extend(self.tactic_spend.iter().map(|c| Value::from(c.amount)));
        values.push(Value::from(self.total_spend));
        values
    }

    /// Flat record keyed by output column name.
    pub fn to_record(&self) -> Map<String, Value> {
        let mut record = Map::new();
        record.insert("campaign_week".into(), self.campaign_week.clone().into());
        record.insert(
            "campaign_start_date".into(),
            self.campaign_start_date.to_string().into(),
        );
        record.insert("campaign_id".into(), self.campaign_id.clone().into());
        record.insert("incremental_sales".into(), self.incremental_sales.into());
        for column in &self.tactic_spend {
            record.insert(spend_column(&column.tactic), column.amount.into());
        }
        record.insert("total_spend".into(), self.total_spend.into());
        record
    }

    /// Rebuild a row from a flat record. Missing spend columns read as 0;
    /// `incremental_sales` and `total_spend` must be present and numeric.
    pub fn from_record(record: &Map<String, Value>, catalog: &TacticCatalog) -> MmmResult<Self> {
        let text = |key: &str| -> MmmResult<String> {
            match record.get(key) {
                Some(Value::String(s)) => Ok(s.clone()),
                Some(Value::Number(n)) => Ok(n.to_string()),
                _ => Err(MmmError::MissingColumn(key.to_string())),
            }
        };
        let spend = |key: &str| record.get(key).and_then(Value::as_f64).unwrap_or(0.0);
        let required = |key: &str| -> MmmResult<f64> {
            record
                .get(key)
                .and_then(Value::as_f64)
                .ok_or_else(|| MmmError::MissingColumn(key.to_string()))
        };

        let raw_date = text("campaign_start_date")?;
        let campaign_start_date = parse_date(&raw_date)?;

        Ok(Self {
            campaign_week: text("campaign_week")?,
            campaign_start_date,
            campaign_id: text("campaign_id")?,
            incremental_sales: required("incremental_sales")?,
            tactic_spend: catalog
                .iter()
                .map(|tactic| TacticSpendColumn {
                    tactic: tactic.to_string(),
                    amount: spend(&spend_column(tactic)),
                })
                .collect(),
            total_spend: required("total_spend")?,
        })
    }
}

impl Serialize for WeeklyAggregate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Entries follow the output column order.
        let mut map = serializer.serialize_map(Some(self.tactic_spend.len() + 5))?;
        map.serialize_entry("campaign_week", &self.campaign_week)?;
        map.serialize_entry("campaign_start_date", &self.campaign_start_date.to_string())?;
        map.serialize_entry("campaign_id", &self.campaign_id)?;
        map.serialize_entry("incremental_sales", &self.incremental_sales)?;
        for column in &self.tactic_spend {
            map.serialize_entry(&spend_column(&column.tactic), &column.amount)?;
        }
        map.serialize_entry("total_spend", &self.total_spend)?;
        map.end()
    }
}

/// Per-tactic totals used to sanity check the tactic table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TacticBreakdown {
    pub tactic: String,
    /// Number of tactic rows (one per campaign).
    pub campaigns: u64,
    /// Sum of spend, rounded to cents.
    pub total_spend: f64,
}

/// Storage namespace tables are read from and written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    #[serde(default)]
    pub catalog: Option<String>,
    pub schema: String,
}

impl Namespace {
    pub fn new(catalog: Option<&str>, schema: &str) -> Self {
        Self {
            catalog: catalog.filter(|c| !c.is_empty()).map(str::to_string),
            schema: schema.to_string(),
        }
    }

    /// Fully qualified table name: `catalog.schema.table` or `schema.table`.
    pub fn qualify(&self, table: &str) -> String {
        match &self.catalog {
            Some(catalog) => format!("{catalog}.{}.{table}", self.schema),
            None => format!("{}.{table}", self.schema),
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.catalog {
            Some(catalog) => write!(f, "{catalog}.{}", self.schema),
            None => write!(f, "{}", self.schema),
        }
    }
}

/// Parse a `YYYY-MM-DD` date as stored by the warehouse.
pub fn parse_date(value: &str) -> MmmResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| MmmError::InvalidDate {
        value: value.to_string(),
        reason: e.to_string(),
    })
}
