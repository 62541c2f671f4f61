//! Rendering of loader output: text tables for the terminal, CSV and JSON.

use mmm_core::types::{TacticBreakdown, WeeklyAggregate};
use mmm_core::TacticCatalog;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Table,
    Csv,
    Json,
}

/// Render weekly rows in the requested format.
pub fn render_weekly(
    rows: &[WeeklyAggregate],
    catalog: &TacticCatalog,
    format: ExportFormat,
) -> Result<String, serde_json::Error> {
    let columns = WeeklyAggregate::columns(catalog);
    let cells: Vec<Vec<Value>> = rows.iter().map(WeeklyAggregate::values).collect();
    match format {
        ExportFormat::Table => Ok(render_table(&columns, &cells)),
        ExportFormat::Csv => Ok(render_csv(&columns, &cells)),
        ExportFormat::Json => serde_json::to_string_pretty(rows),
    }
}

pub fn render_breakdown(rows: &[TacticBreakdown]) -> String {
    let columns = ["tactic", "campaigns", "total_spend"].map(String::from);
    let cells: Vec<Vec<Value>> = rows
        .iter()
        .map(|r| {
            vec![
                Value::from(r.tactic.clone()),
                Value::from(r.campaigns),
                Value::from(r.total_spend),
            ]
        })
        .collect();
    render_table(&columns, &cells)
}

/// Fixed-width text table with a header rule. Numbers are right aligned.
pub fn render_table(columns: &[String], rows: &[Vec<Value>]) -> String {
    let rendered: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(display_cell).collect())
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    for row in &rendered {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.len());
            }
        }
    }

    let mut out = String::new();
    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{c:<w$}"))
        .collect();
    out.push_str(header.join(" | ").trim_end());
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&rule.join("-+-"));
    out.push('\n');

    for (row, raw) in rendered.iter().zip(rows) {
        let cells: Vec<String> = row
            .iter()
            .zip(raw)
            .zip(&widths)
            .map(|((cell, value), w)| {
                if value.is_number() {
                    format!("{cell:>w$}")
                } else {
                    format!("{cell:<w$}")
                }
            })
            .collect();
        out.push_str(cells.join(" | ").trim_end());
        out.push('\n');
    }
    out
}

pub fn render_csv(columns: &[String], rows: &[Vec<Value>]) -> String {
    let mut csv = columns.join(",");
    csv.push('\n');
    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .map(|v| match v {
                Value::String(s) if s.contains([',', '"', '\n']) => {
                    format!("\"{}\"", s.replace('"', "\"\""))
                }
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect();
        csv.push_str(&cells.join(","));
        csv.push('\n');
    }
    csv
}

fn display_cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format!("{f:.2}"),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}
