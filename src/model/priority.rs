//! Per-region priority tables
//!
//! Each region maps entry names (leagues or sports) to a ranking score and
//! visibility flags. The listing renders entries by descending score.
//! `hideOthers` turns the table into an allow-list: anything the backend
//! schedules that is not listed here is suppressed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::defaults::default_priorities;
use super::document::ConfigurationDocument;
use super::lenient;
use super::ModelError;

/// Regions with built-in default tables
pub const SUPPORTED_REGIONS: [&str; 2] = ["US", "UK"];

/// Region whose defaults are used when a region has none of its own
pub const FALLBACK_REGION: &str = "US";

/// Score given to entries added by the operator
const NEW_ENTRY_SCORE: i64 = 50;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorityEntry {
    #[serde(default, deserialize_with = "lenient::score")]
    pub score: i64,
    #[serde(rename = "isLeague", default, deserialize_with = "lenient::boolean")]
    pub is_league: bool,
    #[serde(rename = "hasLink", default, deserialize_with = "lenient::boolean")]
    pub has_link: bool,
    #[serde(rename = "isHidden", default, deserialize_with = "lenient::boolean")]
    pub is_hidden: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PriorityEntry {
    pub fn new(score: i64, is_league: bool, has_link: bool) -> Self {
        Self {
            score,
            is_league,
            has_link,
            is_hidden: false,
            extra: Map::new(),
        }
    }

    /// Structured form of a legacy bare-number entry
    pub fn from_score(score: i64) -> Self {
        Self::new(score, false, false)
    }
}

/// One region's table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorityTable {
    #[serde(rename = "hideOthers", default, deserialize_with = "lenient::boolean")]
    pub hide_others: bool,
    #[serde(flatten)]
    pub entries: BTreeMap<String, PriorityEntry>,
}

/// Borrowed view of an entry for ranked listings
#[derive(Debug, Clone, Serialize)]
pub struct RankedEntry<'a> {
    pub name: &'a str,
    #[serde(flatten)]
    pub entry: &'a PriorityEntry,
}

/// Partial update of an entry's fields
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriorityUpdate {
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(rename = "isLeague", default)]
    pub is_league: Option<bool>,
    #[serde(rename = "hasLink", default)]
    pub has_link: Option<bool>,
    #[serde(rename = "isHidden", default)]
    pub is_hidden: Option<bool>,
}

impl PriorityTable {
    /// Entries sorted by descending score, ties broken by name
    pub fn ranked(&self) -> Vec<RankedEntry<'_>> {
        let mut ranked: Vec<RankedEntry<'_>> = self
            .entries
            .iter()
            .map(|(name, entry)| RankedEntry { name, entry })
            .collect();
        ranked.sort_by(|a, b| {
            b.entry
                .score
                .cmp(&a.entry.score)
                .then_with(|| a.name.cmp(b.name))
        });
        ranked
    }
}

/// Heuristic used when an operator adds an entry by name
pub fn guess_is_league(name: &str) -> bool {
    let lower = name.to_lowercase();
    ["league", "nba", "nfl"]
        .iter()
        .any(|needle| lower.contains(needle))
}

impl ConfigurationDocument {
    pub fn priority_table(&self, region: &str) -> Option<&PriorityTable> {
        self.sport_priorities.get(region)
    }

    /// Add an entry with the default score; the region table is created if
    /// the region is new
    pub fn add_priority(&mut self, region: &str, name: &str) -> Result<PriorityEntry, ModelError> {
        let name = name.trim();
        if region.trim().is_empty() || name.is_empty() {
            return Err(ModelError::InvalidInput(
                "region and entry name are required".to_string(),
            ));
        }

        let table = self.sport_priorities.entry(region.to_string()).or_default();
        if table.entries.contains_key(name) {
            return Err(ModelError::DuplicateEntry {
                region: region.to_string(),
                name: name.to_string(),
            });
        }

        let entry = PriorityEntry::new(NEW_ENTRY_SCORE, guess_is_league(name), false);
        table.entries.insert(name.to_string(), entry.clone());
        Ok(entry)
    }

    pub fn update_priority(
        &mut self,
        region: &str,
        name: &str,
        update: &PriorityUpdate,
    ) -> Result<PriorityEntry, ModelError> {
        let entry = self
            .sport_priorities
            .get_mut(region)
            .and_then(|table| table.entries.get_mut(name))
            .ok_or_else(|| ModelError::EntryNotFound {
                region: region.to_string(),
                name: name.to_string(),
            })?;

        if let Some(score) = update.score {
            entry.score = score;
        }
        if let Some(is_league) = update.is_league {
            entry.is_league = is_league;
        }
        if let Some(has_link) = update.has_link {
            entry.has_link = has_link;
        }
        if let Some(is_hidden) = update.is_hidden {
            entry.is_hidden = is_hidden;
        }

        Ok(entry.clone())
    }

    pub fn remove_priority(
        &mut self,
        region: &str,
        name: &str,
        confirmed: bool,
    ) -> Result<PriorityEntry, ModelError> {
        if !confirmed {
            return Err(ModelError::ConfirmationRequired(format!(
                "remove {} from {} priorities",
                name, region
            )));
        }

        self.sport_priorities
            .get_mut(region)
            .and_then(|table| table.entries.remove(name))
            .ok_or_else(|| ModelError::EntryNotFound {
                region: region.to_string(),
                name: name.to_string(),
            })
    }

    pub fn set_hide_others(&mut self, region: &str, hide_others: bool) {
        self.sport_priorities
            .entry(region.to_string())
            .or_default()
            .hide_others = hide_others;
    }

    /// Replace a region's table with its built-in defaults
    ///
    /// Regions without defaults receive the fallback region's table. The
    /// previous table is discarded, so the operator must confirm.
    pub fn reset_priorities(&mut self, region: &str, confirmed: bool) -> Result<(), ModelError> {
        if !confirmed {
            return Err(ModelError::ConfirmationRequired(format!(
                "reset {} priorities to defaults",
                region
            )));
        }

        let defaults = default_priorities(region)
            .or_else(|| default_priorities(FALLBACK_REGION))
            .unwrap_or_default();
        self.sport_priorities.insert(region.to_string(), defaults);
        tracing::info!(region = %region, "Priority table reset to defaults");
        Ok(())
    }
}
