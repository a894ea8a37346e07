//! Plan entries, captions, and planner constraints.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where the campaign is in its story arc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativePhase {
    #[default]
    Introduction,
    BuildUp,
    Launch,
    Sustain,
}

impl std::fmt::Display for NarrativePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NarrativePhase::Introduction => write!(f, "introduction"),
            NarrativePhase::BuildUp => write!(f, "build_up"),
            NarrativePhase::Launch => write!(f, "launch"),
            NarrativePhase::Sustain => write!(f, "sustain"),
        }
    }
}

impl std::str::FromStr for NarrativePhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "introduction" | "intro" => Ok(NarrativePhase::Introduction),
            "build_up" | "buildup" => Ok(NarrativePhase::BuildUp),
            "launch" => Ok(NarrativePhase::Launch),
            "sustain" => Ok(NarrativePhase::Sustain),
            other => Err(format!("unknown narrative phase: {other}")),
        }
    }
}

/// Inputs to the planner besides the analyses themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanConstraints {
    pub target_days: usize,
    /// First day number the plan may use.
    pub start_day: u32,
    pub phase: NarrativePhase,
    /// Digest of earlier runs for continuity.
    pub history: String,
    /// Review feedback; only set when re-planning.
    pub feedback: Option<String>,
    pub notes: Option<String>,
    /// Set on the single retry after the planner referenced unknown assets.
    pub strict: bool,
}

impl PlanConstraints {
    #[must_use]
    pub fn new(target_days: usize, start_day: u32, phase: NarrativePhase) -> Self {
        Self {
            target_days,
            start_day,
            phase,
            history: String::new(),
            feedback: None,
            notes: None,
            strict: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookCta {
    pub hook: String,
    pub cta: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphicRequest {
    pub concept: String,
}

/// One day's planned content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatedItem {
    pub day_number: u32,
    /// May be empty for graphic-only days.
    pub asset_ids: Vec<Uuid>,
    pub seed: String,
    pub rationale: String,
    /// Target time of day, `HH:MM`.
    pub post_time: String,
    pub hook_cta: Option<HookCta>,
    pub graphic: Option<GraphicRequest>,
    /// Blob key of the generated graphic, once illustrated.
    pub graphic_blob_key: Option<String>,
}

impl DatedItem {
    #[must_use]
    pub fn new(day_number: u32, asset_ids: Vec<Uuid>, seed: impl Into<String>) -> Self {
        Self {
            day_number,
            asset_ids,
            seed: seed.into(),
            rationale: String::new(),
            post_time: "12:00".to_string(),
            hook_cta: None,
            graphic: None,
            graphic_blob_key: None,
        }
    }
}

/// Caption text bound to one day of the in-progress run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caption {
    pub day_number: u32,
    pub text: String,
    pub is_placeholder: bool,
}

impl Caption {
    #[must_use]
    pub fn new(day_number: u32, text: impl Into<String>) -> Self {
        Self {
            day_number,
            text: text.into(),
            is_placeholder: false,
        }
    }

    /// Stand-in caption for a day whose write call failed.
    #[must_use]
    pub fn placeholder(item: &DatedItem) -> Self {
        Self {
            day_number: item.day_number,
            text: format!(
                "[Dag {}] generation failed (seed: {})",
                item.day_number, item.seed
            ),
            is_placeholder: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_round_trips_through_display_and_from_str() {
        for phase in [
            NarrativePhase::Introduction,
            NarrativePhase::BuildUp,
            NarrativePhase::Launch,
            NarrativePhase::Sustain,
        ] {
            assert_eq!(phase.to_string().parse::<NarrativePhase>().unwrap(), phase);
        }
        assert_eq!(
            "build-up".parse::<NarrativePhase>().unwrap(),
            NarrativePhase::BuildUp
        );
        assert!("finale".parse::<NarrativePhase>().is_err());
    }

    #[test]
    fn placeholder_caption_mentions_day_and_seed() {
        let item = DatedItem::new(7, vec![], "Behind the scenes at the roastery");
        let caption = Caption::placeholder(&item);
        assert!(caption.is_placeholder);
        assert!(caption.text.starts_with("[Dag 7] generation failed"));
        assert!(caption.text.contains("Behind the scenes at the roastery"));
    }

    #[test]
    fn dated_item_deserializes_without_optional_fields() {
        let json = serde_json::json!({
            "day_number": 3,
            "asset_ids": [],
            "seed": "Quote card",
            "rationale": "Graphic-only day",
            "post_time": "18:30",
            "hook_cta": null,
            "graphic": {"concept": "Bold quote on cream background"},
            "graphic_blob_key": null
        });
        let item: DatedItem = serde_json::from_value(json).unwrap();
        assert!(item.asset_ids.is_empty());
        assert_eq!(item.graphic.unwrap().concept, "Bold quote on cream background");
    }
}
