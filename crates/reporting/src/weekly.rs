//! Weekly tactic pivot: joins campaign results with their tactic spend and
//! aggregates one row per (week, start date, campaign).

use chrono::NaiveDate;
use mmm_core::config::JoinMode;
use mmm_core::types::{CampaignResult, TacticSpend, TacticSpendColumn, WeeklyAggregate};
use mmm_core::TacticCatalog;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Group key, ordered week → start date → campaign id.
type GroupKey<'a> = (&'a str, NaiveDate, &'a str);

#[derive(Debug)]
struct Accumulator {
    incremental_sales: f64,
    tactic_spend: Vec<f64>,
    total_spend: f64,
}

impl Accumulator {
    fn new(tactics: usize) -> Self {
        Self {
            incremental_sales: 0.0,
            tactic_spend: vec![0.0; tactics],
            total_spend: 0.0,
        }
    }

    /// Fold in one joined (result, tactic) row. `slot` is the catalog column
    /// of the tactic, `None` for tactics outside the catalog or unmatched rows.
    fn add(&mut self, result: &CampaignResult, slot: Option<usize>, spend_amount: f64) {
        self.incremental_sales += result.incremental_sales;
        self.total_spend += result.total_spend;
        if let Some(slot) = slot {
            self.tactic_spend[slot] += spend_amount;
        }
    }
}

/// Pivots tactic spend into one column per catalog tactic.
///
/// Sums run over the joined rows, so a campaign with three tactic rows
/// contributes its `incremental_sales` and `total_spend` three times.
#[derive(Debug, Clone)]
pub struct WeeklyTacticAggregator {
    catalog: TacticCatalog,
    join: JoinMode,
}

impl WeeklyTacticAggregator {
    pub fn new(catalog: TacticCatalog) -> Self {
        Self {
            catalog,
            join: JoinMode::Inner,
        }
    }

    pub fn with_join(mut self, join: JoinMode) -> Self {
        self.join = join;
        self
    }

    pub fn catalog(&self) -> &TacticCatalog {
        &self.catalog
    }

    /// Join, group and pivot. Output is sorted by `campaign_start_date`;
    /// rows sharing a start date stay in week → campaign id order.
    pub fn aggregate(
        &self,
        results: &[CampaignResult],
        spends: &[TacticSpend],
    ) -> Vec<WeeklyAggregate> {
        let mut spends_by_campaign: HashMap<&str, Vec<&TacticSpend>> = HashMap::new();
        for spend in spends {
            spends_by_campaign
                .entry(spend.campaign_id.as_str())
                .or_default()
                .push(spend);
        }

        let mut groups: BTreeMap<GroupKey<'_>, Accumulator> = BTreeMap::new();
        let mut joined_rows = 0usize;

        for result in results {
            let key = (
                result.campaign_week.as_str(),
                result.campaign_start_date,
                result.campaign_id.as_str(),
            );
            match spends_by_campaign.get(result.campaign_id.as_str()) {
                Some(matches) => {
                    let acc = groups
                        .entry(key)
                        .or_insert_with(|| Accumulator::new(self.catalog.len()));
                    for spend in matches {
                        acc.add(result, self.catalog.position(&spend.tactic), spend.spend_amount);
                        joined_rows += 1;
                    }
                }
                None if self.join == JoinMode::Left => {
                    groups
                        .entry(key)
                        .or_insert_with(|| Accumulator::new(self.catalog.len()))
                        .add(result, None, 0.0);
                    joined_rows += 1;
                }
                None => {}
            }
        }

        let mut rows: Vec<WeeklyAggregate> = groups
            .into_iter()
            .map(|((week, start_date, campaign_id), acc)| WeeklyAggregate {
                campaign_week: week.to_string(),
                campaign_start_date: start_date,
                campaign_id: campaign_id.to_string(),
                incremental_sales: acc.incremental_sales,
                tactic_spend: self
                    .catalog
                    .iter()
                    .zip(acc.tactic_spend)
                    .map(|(tactic, amount)| TacticSpendColumn {
                        tactic: tactic.to_string(),
                        amount,
                    })
                    .collect(),
                total_spend: acc.total_spend,
            })
            .collect();

        // Stable, so ties keep the BTreeMap order.
        rows.sort_by_key(|row| row.campaign_start_date);

        debug!(
            campaigns = results.len(),
            tactic_rows = spends.len(),
            joined_rows,
            output_rows = rows.len(),
            "Weekly tactic aggregation complete"
        );
        rows
    }
}

/// Inner-join aggregation over a fixed tactic list.
pub fn aggregate(
    results: &[CampaignResult],
    spends: &[TacticSpend],
    catalog: &TacticCatalog,
) -> Vec<WeeklyAggregate> {
    WeeklyTacticAggregator::new(catalog.clone()).aggregate(results, spends)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn result(id: &str, week: &str, start: NaiveDate, sales: f64, total: f64) -> CampaignResult {
        CampaignResult {
            campaign_id: id.to_string(),
            campaign_week: week.to_string(),
            campaign_start_date: start,
            incremental_sales: sales,
            total_spend: total,
            lift_percent: 0.0,
            iroas: 0.0,
            test_sales: None,
            control_sales: None,
        }
    }

    fn spend(id: &str, tactic: &str, amount: f64) -> TacticSpend {
        TacticSpend {
            campaign_id: id.to_string(),
            tactic: tactic.to_string(),
            spend_amount: amount,
        }
    }

    /// Two campaigns, three tactics each.
    fn fixture() -> (Vec<CampaignResult>, Vec<TacticSpend>) {
        let results = vec![
            result("C2", "2024-W02", date(2024, 1, 8), 20.0, 900.0),
            result("C1", "2024-W01", date(2024, 1, 1), 10.0, 600.0),
        ];
        let spends = vec![
            spend("C1", "video", 100.0),
            spend("C1", "search", 50.0),
            spend("C1", "social", 25.0),
            spend("C2", "audio", 300.0),
            spend("C2", "display", 200.0),
            spend("C2", "connected_tv", 400.0),
        ];
        (results, spends)
    }

    #[test]
    fn test_empty_tactics_yield_no_rows() {
        let (results, _) = fixture();
        let rows = aggregate(&results, &[], &TacticCatalog::default());
        assert!(rows.is_empty());
    }

    #[test]
    fn test_fixture_sums() {
        let (results, spends) = fixture();
        let rows = aggregate(&results, &spends, &TacticCatalog::default());
        assert_eq!(rows.len(), 2);

        let c1 = &rows[0];
        assert_eq!(c1.campaign_id, "C1");
        // Three joined rows per campaign.
        assert_eq!(c1.incremental_sales, 30.0);
        assert_eq!(c1.total_spend, 1800.0);
        assert_eq!(c1.spend_for("video"), Some(100.0));
        assert_eq!(c1.spend_for("search"), Some(50.0));
        assert_eq!(c1.spend_for("social"), Some(25.0));

        let c2 = &rows[1];
        assert_eq!(c2.incremental_sales, 60.0);
        assert_eq!(c2.total_spend, 2700.0);
        assert_eq!(c2.spend_for("connected_tv"), Some(400.0));
    }

    #[test]
    fn test_absent_tactic_is_zero() {
        let (results, spends) = fixture();
        let rows = aggregate(&results, &spends, &TacticCatalog::default());
        let c1 = rows.iter().find(|r| r.campaign_id == "C1").unwrap();
        assert_eq!(c1.spend_for("display"), Some(0.0));
        assert_eq!(c1.spend_for("audio"), Some(0.0));
        assert_eq!(c1.tactic_spend.len(), 6);
    }

    #[test]
    fn test_example_campaign_row() {
        let results = vec![result("C1", "2024-W01", date(2024, 1, 1), 15.0, 150.0)];
        let spends = vec![spend("C1", "video", 100.0), spend("C1", "search", 50.0)];

        let rows = aggregate(&results, &spends, &TacticCatalog::default());
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.campaign_week, "2024-W01");
        assert_eq!(row.campaign_start_date, date(2024, 1, 1));
        assert_eq!(row.incremental_sales, 30.0);
        assert_eq!(row.spend_for("video"), Some(100.0));
        assert_eq!(row.spend_for("search"), Some(50.0));
        assert_eq!(row.spend_for("display"), Some(0.0));
        assert_eq!(row.spend_for("connected_tv"), Some(0.0));
    }

    #[test]
    fn test_sorted_by_start_date() {
        let results = vec![
            result("C3", "2024-W03", date(2024, 1, 15), 1.0, 1.0),
            result("C1", "2024-W01", date(2024, 1, 1), 1.0, 1.0),
            result("C4", "2024-W01", date(2024, 1, 1), 1.0, 1.0),
            result("C2", "2024-W02", date(2024, 1, 8), 1.0, 1.0),
        ];
        let spends: Vec<TacticSpend> = ["C1", "C2", "C3", "C4"]
            .iter()
            .map(|id| spend(id, "search", 5.0))
            .collect();

        let rows = aggregate(&results, &spends, &TacticCatalog::default());
        assert!(rows
            .windows(2)
            .all(|w| w[0].campaign_start_date <= w[1].campaign_start_date));
        let ids: Vec<&str> = rows.iter().map(|r| r.campaign_id.as_str()).collect();
        assert_eq!(ids, vec!["C1", "C4", "C2", "C3"]);
    }

    #[test]
    fn test_unmatched_rows_are_dropped() {
        let results = vec![
            result("C1", "2024-W01", date(2024, 1, 1), 5.0, 10.0),
            result("C9", "2024-W01", date(2024, 1, 1), 7.0, 10.0),
        ];
        let spends = vec![spend("C1", "video", 10.0), spend("ORPHAN", "video", 999.0)];

        let rows = aggregate(&results, &spends, &TacticCatalog::default());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].campaign_id, "C1");
        assert_eq!(rows[0].spend_for("video"), Some(10.0));
    }

    #[test]
    fn test_unknown_tactic_counts_toward_totals_only() {
        let results = vec![result("C1", "2024-W01", date(2024, 1, 1), 5.0, 100.0)];
        let spends = vec![spend("C1", "video", 10.0), spend("C1", "podcast", 40.0)];

        let rows = aggregate(&results, &spends, &TacticCatalog::default());
        let row = &rows[0];
        assert_eq!(row.spend_for("podcast"), None);
        assert_eq!(row.tactic_spend.iter().map(|c| c.amount).sum::<f64>(), 10.0);
        assert_eq!(row.incremental_sales, 10.0);
        assert_eq!(row.total_spend, 200.0);
    }

    #[test]
    fn test_repeated_tactic_rows_are_summed() {
        let results = vec![result("C1", "2024-W01", date(2024, 1, 1), -2.5, 10.0)];
        let spends = vec![spend("C1", "video", 10.0), spend("C1", "video", 15.0)];

        let rows = aggregate(&results, &spends, &TacticCatalog::default());
        assert_eq!(rows[0].spend_for("video"), Some(25.0));
        assert_eq!(rows[0].incremental_sales, -5.0);
    }

    #[test]
    fn test_left_join_keeps_campaigns_without_tactics() {
        let results = vec![
            result("C1", "2024-W01", date(2024, 1, 1), 5.0, 100.0),
            result("C2", "2024-W01", date(2024, 1, 1), 7.0, 80.0),
        ];
        let spends = vec![spend("C1", "video", 10.0), spend("C1", "search", 20.0)];

        let aggregator =
            WeeklyTacticAggregator::new(TacticCatalog::default()).with_join(JoinMode::Left);
        let rows = aggregator.aggregate(&results, &spends);
        assert_eq!(rows.len(), 2);

        let c2 = rows.iter().find(|r| r.campaign_id == "C2").unwrap();
        assert_eq!(c2.incremental_sales, 7.0);
        assert_eq!(c2.total_spend, 80.0);
        assert!(c2.tactic_spend.iter().all(|c| c.amount == 0.0));

        let c1 = rows.iter().find(|r| r.campaign_id == "C1").unwrap();
        assert_eq!(c1.total_spend, 200.0);
    }

    #[test]
    fn test_idempotent() {
        let (results, spends) = fixture();
        let aggregator = WeeklyTacticAggregator::new(TacticCatalog::default());
        assert_eq!(
            aggregator.aggregate(&results, &spends),
            aggregator.aggregate(&results, &spends)
        );

        let mut reversed = results.clone();
        reversed.reverse();
        assert_eq!(
            aggregator.aggregate(&reversed, &spends),
            aggregator.aggregate(&results, &spends)
        );
    }

    #[test]
    fn test_custom_catalog_order() {
        let (results, spends) = fixture();
        let catalog = TacticCatalog::new(["search", "video"]).unwrap();
        let rows = aggregate(&results, &spends, &catalog);

        let tactics: Vec<&str> = rows[0].tactic_spend.iter().map(|c| c.tactic.as_str()).collect();
        assert_eq!(tactics, vec!["search", "video"]);
        assert_eq!(rows[1].tactic_spend.iter().map(|c| c.amount).sum::<f64>(), 0.0);
    }
}
