//! Per-tactic spend breakdown used to sanity check the tactic table.

use mmm_core::types::{TacticBreakdown, TacticSpend};
use std::collections::BTreeMap;

/// Count rows and total spend per tactic, largest spend first.
pub fn tactic_breakdown(spends: &[TacticSpend]) -> Vec<TacticBreakdown> {
    let mut totals: BTreeMap<&str, (u64, f64)> = BTreeMap::new();
    for spend in spends {
        let entry = totals.entry(spend.tactic.as_str()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += spend.spend_amount;
    }

    let mut rows: Vec<TacticBreakdown> = totals
        .into_iter()
        .map(|(tactic, (campaigns, total))| TacticBreakdown {
            tactic: tactic.to_string(),
            campaigns,
            total_spend: round_cents(total),
        })
        .collect();

    // Ties keep the alphabetical order from the BTreeMap.
    rows.sort_by(|a, b| b.total_spend.total_cmp(&a.total_spend));
    rows
}

pub(crate) fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
