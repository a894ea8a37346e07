//! Domain types and configuration shared by every feedplan crate.

pub mod app_config;
pub mod assets;
pub mod config;
pub mod plan;
pub mod review;
pub mod runs;
pub mod style;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use assets::{fingerprint, AnalysisRecord, Asset, PLACEHOLDER_DESCRIPTION};
pub use config::{load_app_config, load_app_config_from_env};
pub use plan::{Caption, DatedItem, GraphicRequest, HookCta, NarrativePhase, PlanConstraints};
pub use review::{ReviewIssue, ReviewReport, Severity};
pub use runs::{DegradedItem, DegradedKind, GenerationRun, RunItem};
pub use style::{is_clock_time, load_style, StyleProfile};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read style file {path}: {source}")]
    StyleFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse style file: {0}")]
    StyleFileParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),
}
