//! Committed generation runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::plan::{Caption, DatedItem};

/// A planned day together with its accepted caption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunItem {
    pub item: DatedItem,
    pub caption: Caption,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedKind {
    /// Analyzer failed; a placeholder record was used.
    Analysis,
    /// Planner output was unusable; the naive one-asset-per-day plan was used.
    Plan,
    /// Writer failed; a placeholder caption was used.
    Caption,
    /// Illustrator failed; the day has no graphic.
    Illustration,
    /// Reviewer failed; quality gating was skipped.
    Review,
}

impl std::fmt::Display for DegradedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DegradedKind::Analysis => write!(f, "analysis"),
            DegradedKind::Plan => write!(f, "plan"),
            DegradedKind::Caption => write!(f, "caption"),
            DegradedKind::Illustration => write!(f, "illustration"),
            DegradedKind::Review => write!(f, "review"),
        }
    }
}

/// Something that fell back during generation and may need a human look.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedItem {
    pub kind: DegradedKind,
    pub day_number: Option<u32>,
    pub asset_id: Option<Uuid>,
    pub reason: String,
}

/// One immutable, numbered output of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRun {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub run_number: u32,
    pub items: Vec<RunItem>,
    pub degraded: Vec<DegradedItem>,
    pub created_at: DateTime<Utc>,
}

impl GenerationRun {
    /// Highest day number in the run, if it has any items.
    #[must_use]
    pub fn last_day(&self) -> Option<u32> {
        self.items.iter().map(|i| i.item.day_number).max()
    }
}
