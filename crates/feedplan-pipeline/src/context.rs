//! Borrowed collaborators shared by every stage of one generation.

use feedplan_core::StyleProfile;
use feedplan_db::PipelineStore;
use feedplan_gateway::{CapabilityProvider, ResilientInvoker};
use tokio_util::sync::CancellationToken;

use crate::progress::{ProgressEvent, ProgressSink, Stage};

#[derive(Clone, Copy)]
pub(crate) struct StageContext<'a> {
    pub store: &'a dyn PipelineStore,
    pub provider: &'a dyn CapabilityProvider,
    pub invoker: &'a ResilientInvoker,
    pub style: &'a StyleProfile,
    pub progress: &'a dyn ProgressSink,
    pub cancel: &'a CancellationToken,
}

impl StageContext<'_> {
    pub fn report(&self, stage: Stage, current: usize, total: usize, message: impl Into<String>) {
        self.progress.report(ProgressEvent {
            stage,
            current,
            total,
            message: message.into(),
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
