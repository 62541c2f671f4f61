//! Tactic categories pivoted into spend columns.

use crate::error::{MmmError, MmmResult};
use crate::types::TacticSpend;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Tactics pivoted when nothing else is configured.
pub const DEFAULT_TACTICS: [&str; 6] = ["video", "audio", "display", "search", "social", "connected_tv"];

/// Output column holding the spend of one tactic.
pub fn spend_column(tactic: &str) -> String {
    format!("{tactic}_spend")
}

/// Ordered, duplicate-free list of tactic labels.
///
/// Labels are restricted to `[a-z0-9_]` because each one becomes part of a
/// column identifier in the output table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct TacticCatalog {
    tactics: Vec<String>,
}

impl TacticCatalog {
    pub fn new<I, S>(tactics: I) -> MmmResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = BTreeSet::new();
        let mut ordered = Vec::new();
        for tactic in tactics {
            let tactic = tactic.into();
            validate_label(&tactic)?;
            if seen.insert(tactic.clone()) {
                ordered.push(tactic);
            }
        }
        Ok(Self { tactics: ordered })
    }

    /// Derive the catalog from the distinct tactic values present in the data,
    /// sorted ascending.
    pub fn discover(spends: &[TacticSpend]) -> MmmResult<Self> {
        let distinct: BTreeSet<&str> = spends.iter().map(|s| s.tactic.as_str()).collect();
        Self::new(distinct)
    }

    pub fn contains(&self, tactic: &str) -> bool {
        self.position(tactic).is_some()
    }

    /// Column index of a tactic within the catalog.
    pub fn position(&self, tactic: &str) -> Option<usize> {
        self.tactics.iter().position(|t| t == tactic)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tactics.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tactics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tactics.is_empty()
    }
}

impl Default for TacticCatalog {
    fn default() -> Self {
        Self {
            tactics: DEFAULT_TACTICS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl TryFrom<Vec<String>> for TacticCatalog {
    type Error = MmmError;

    fn try_from(tactics: Vec<String>) -> MmmResult<Self> {
        Self::new(tactics)
    }
}

impl From<TacticCatalog> for Vec<String> {
    fn from(catalog: TacticCatalog) -> Self {
        catalog.tactics
    }
}

fn validate_label(tactic: &str) -> MmmResult<()> {
    let valid = !tactic.is_empty()
        && tactic
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(MmmError::InvalidTactic(tactic.to_string()))
    }
}
