//! Request and result types shared by every capability provider.

use feedplan_core::{AnalysisRecord, Caption, DatedItem, PlanConstraints, StyleProfile};
use serde::Serialize;
use uuid::Uuid;

/// The AI-backed operations the pipeline calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Analyze,
    Plan,
    Write,
    Review,
    Illustrate,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::Analyze,
        Capability::Plan,
        Capability::Write,
        Capability::Review,
        Capability::Illustrate,
    ];

    /// Path segment of the provider endpoint.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Analyze => "analyze",
            Capability::Plan => "plan",
            Capability::Write => "write",
            Capability::Review => "review",
            Capability::Illustrate => "illustrate",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token counts reported by the provider for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub prompt_units: u64,
    pub completion_units: u64,
}

impl Usage {
    #[must_use]
    pub fn new(prompt_units: u64, completion_units: u64) -> Self {
        Self {
            prompt_units,
            completion_units,
        }
    }
}

/// A capability result together with what it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Metered<T> {
    pub value: T,
    pub usage: Usage,
}

impl<T> Metered<T> {
    pub fn new(value: T, usage: Usage) -> Self {
        Self { value, usage }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeRequest<'a> {
    pub asset_id: Uuid,
    pub campaign_id: Uuid,
    /// Handle of the image bytes in the blob store.
    pub blob_key: &'a str,
    pub fingerprint: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanRequest<'a> {
    pub analyses: &'a [AnalysisRecord],
    pub constraints: &'a PlanConstraints,
    pub style: &'a StyleProfile,
}

#[derive(Debug, Clone, Serialize)]
pub struct WriteRequest<'a> {
    pub item: &'a DatedItem,
    /// Descriptions of the assets the item uses, in item order.
    pub image_context: Vec<&'a str>,
    /// Accepted caption of the preceding day, for tonal continuity.
    pub previous_caption: Option<&'a str>,
    pub style: &'a StyleProfile,
    /// Reviewer feedback; only set during a rewrite.
    pub rewrite_feedback: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewRequest<'a> {
    pub items: &'a [DatedItem],
    pub captions: &'a [Caption],
    pub style: &'a StyleProfile,
}

#[derive(Debug, Clone, Serialize)]
pub struct IllustrateRequest<'a> {
    pub day_number: u32,
    pub concept: &'a str,
    pub style: &'a StyleProfile,
}
