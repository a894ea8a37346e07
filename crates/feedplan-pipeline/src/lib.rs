//! Content-generation pipeline: analysis reuse, planning, sequential
//! captioning, the quality-gated review loop, and run commits.

pub mod cache;
mod context;
pub mod error;
pub mod gate;
pub mod history;
pub mod illustrate;
pub mod locks;
pub mod orchestrator;
mod planning;
pub mod progress;
mod writing;

pub use cache::{AnalysisCache, CacheOutcome};
pub use error::PipelineError;
pub use gate::{Decision, QualityPolicy, ReviewState};
pub use history::history_digest;
pub use illustrate::graphic_blob_key;
pub use locks::{CampaignGuard, CampaignLocks};
pub use orchestrator::{GenerationOutcome, GenerationRequest, Orchestrator, RunControl};
pub use progress::{ChannelProgress, NoopProgress, ProgressEvent, ProgressSink, Stage};
