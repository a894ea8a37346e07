//! Stage names and the progress callback boundary.

use serde::Serialize;
use tokio::sync::mpsc;

/// Where the orchestrator is. Recorded in order in the outcome's stage trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Analyzing,
    Planning,
    Writing,
    Illustrating,
    Reviewing,
    Rewrite,
    ReReview,
    RePlanning,
    ReWriting,
    FinalReview,
    Accept,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Analyzing => "ANALYZING",
            Stage::Planning => "PLANNING",
            Stage::Writing => "WRITING",
            Stage::Illustrating => "ILLUSTRATING",
            Stage::Reviewing => "REVIEWING",
            Stage::Rewrite => "REWRITE",
            Stage::ReReview => "RE-REVIEW",
            Stage::RePlanning => "RE-PLANNING",
            Stage::ReWriting => "RE-WRITING",
            Stage::FinalReview => "FINAL-REVIEW",
            Stage::Accept => "ACCEPT",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub stage: Stage,
    /// Items finished so far within the stage; 0 on a stage transition.
    pub current: usize,
    pub total: usize,
    pub message: String,
}

/// Receives progress at each stage transition and each analyzed or written item.
///
/// Called from inside the pipeline's futures, so implementations must return
/// quickly and never block.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Forwards events to an unbounded channel, e.g. for a renderer task.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, event: ProgressEvent) {
        // A closed receiver just means nobody is watching any more.
        let _ = self.tx.send(event);
    }
}
