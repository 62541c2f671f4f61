//! Sample MMM input data: weekly test/control campaign results with tactic
//! spend, seasonal effects and diminishing returns per tactic.

use crate::breakdown::round_cents;
use chrono::{Datelike, Duration, NaiveDate};
use mmm_core::types::{CampaignResult, TacticSpend};
use mmm_core::{MmmError, MmmResult, TacticCatalog};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

/// Exponent of the spend response curve. Below 1, so every extra dollar
/// buys less lift than the previous one.
const RESPONSE_EXPONENT: f64 = 0.7;
/// Probability that a campaign measures a negative lift.
const NEGATIVE_LIFT_PROBABILITY: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct SampleDataConfig {
    pub weeks: u32,
    pub campaigns_per_week: u32,
    /// First week; moved back to its Monday.
    pub start: NaiveDate,
    pub seed: u64,
    pub tactics: TacticCatalog,
}

impl Default for SampleDataConfig {
    fn default() -> Self {
        Self {
            weeks: 52,
            campaigns_per_week: 4,
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN),
            seed: 42,
            tactics: TacticCatalog::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleData {
    pub results: Vec<CampaignResult>,
    pub spends: Vec<TacticSpend>,
}

/// Spend range and response coefficient per tactic.
fn tactic_profile(tactic: &str) -> (f64, f64, f64) {
    match tactic {
        "video" => (5_000.0, 20_000.0, 9.0),
        "audio" => (1_000.0, 5_000.0, 6.0),
        "display" => (2_000.0, 8_000.0, 4.5),
        "search" => (3_000.0, 12_000.0, 12.0),
        "social" => (2_000.0, 10_000.0, 7.0),
        "connected_tv" => (8_000.0, 25_000.0, 8.0),
        _ => (1_000.0, 10_000.0, 5.0),
    }
}

/// Demand multiplier for an ISO week number.
pub fn seasonality(iso_week: u32) -> f64 {
    match iso_week {
        47..=52 => 1.35, // holidays
        23..=35 => 1.15, // summer
        _ => 1.0,
    }
}

/// ISO week label such as `2024-W01`.
pub fn week_label(date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

/// Fails with [`MmmError::InvalidDate`] when a campaign week falls outside
/// the representable date range.
pub fn generate(config: &SampleDataConfig) -> MmmResult<SampleData> {
    let out_of_range = |offset: Duration| MmmError::InvalidDate {
        value: format!("{} {:+} days", config.start, offset.num_days()),
        reason: "outside the supported date range".to_string(),
    };
    let mut rng = StdRng::seed_from_u64(config.seed);
    let back_to_monday = Duration::days(-(config.start.weekday().num_days_from_monday() as i64));
    let first_monday = config
        .start
        .checked_add_signed(back_to_monday)
        .ok_or_else(|| out_of_range(back_to_monday))?;
    let tactics: Vec<&str> = config.tactics.iter().collect();

    let mut results = Vec::new();
    let mut spends = Vec::new();

    for week in 0..config.weeks {
        let offset = Duration::weeks(week as i64);
        let start_date = first_monday
            .checked_add_signed(offset)
            .ok_or_else(|| out_of_range(back_to_monday + offset))?;
        let label = week_label(start_date);
        let season = seasonality(start_date.iso_week().week());

        for slot in 0..config.campaigns_per_week {
            let campaign_id = format!("CMP-{:03}-{:02}", week + 1, slot + 1);

            let mut chosen: Vec<&str> = tactics
                .iter()
                .copied()
                .filter(|_| rng.gen_bool(0.6))
                .collect();
            if chosen.is_empty() && !tactics.is_empty() {
                chosen.push(tactics[rng.gen_range(0..tactics.len())]);
            }

            let mut tracked_spend = 0.0;
            let mut response = 0.0;
            for tactic in chosen {
                let (low, high, coefficient) = tactic_profile(tactic);
                let amount = round_cents(rng.gen_range(low..high) * season);
                tracked_spend += amount;
                response += coefficient * amount.powf(RESPONSE_EXPONENT);
                spends.push(TacticSpend {
                    campaign_id: campaign_id.clone(),
                    tactic: tactic.to_string(),
                    spend_amount: amount,
                });
            }

            // Untracked spend keeps total_spend at or above the tactic sum.
            let total_spend = round_cents(tracked_spend * (1.0 + rng.gen_range(0.0..0.08)));
            let control_sales = round_cents(rng.gen_range(50_000.0..150_000.0) * season);
            let incremental_sales = if rng.gen_bool(NEGATIVE_LIFT_PROBABILITY) {
                round_cents(-control_sales * rng.gen_range(0.0..0.05))
            } else {
                round_cents(response * season * rng.gen_range(0.8..1.2))
            };
            let test_sales = round_cents(control_sales + incremental_sales);

            let lift_percent = round_cents(incremental_sales / control_sales * 100.0);
            let iroas = if total_spend > 0.0 {
                (incremental_sales / total_spend * 10_000.0).round() / 10_000.0
            } else {
                0.0
            };

            results.push(CampaignResult {
                campaign_id,
                campaign_week: label.clone(),
                campaign_start_date: start_date,
                incremental_sales,
                total_spend,
                lift_percent,
                iroas,
                test_sales: Some(test_sales),
                control_sales: Some(control_sales),
            });
        }
    }

    info!(
        campaigns = results.len(),
        tactic_rows = spends.len(),
        seed = config.seed,
        "Generated sample MMM data"
    );
    Ok(SampleData { results, spends })
}
