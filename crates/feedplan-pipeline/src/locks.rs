//! Rejects overlapping generations for the same campaign within one process.
//!
//! Other processes are kept out by the store's campaign lease
//! (`PipelineStore::try_lock_campaign`), taken right after this guard.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

use crate::error::PipelineError;

#[derive(Debug, Clone, Default)]
pub struct CampaignLocks {
    active: Arc<Mutex<HashSet<Uuid>>>,
}

impl CampaignLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `campaign_id` busy until the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::CampaignBusy`] if a guard for the campaign is
    /// still alive.
    pub fn try_acquire(&self, campaign_id: Uuid) -> Result<CampaignGuard, PipelineError> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(campaign_id) {
            return Err(PipelineError::CampaignBusy(campaign_id));
        }
        Ok(CampaignGuard {
            campaign_id,
            active: Arc::clone(&self.active),
        })
    }

    #[must_use]
    pub fn is_busy(&self, campaign_id: Uuid) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&campaign_id)
    }
}

#[derive(Debug)]
pub struct CampaignGuard {
    campaign_id: Uuid,
    active: Arc<Mutex<HashSet<Uuid>>>,
}

impl Drop for CampaignGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.campaign_id);
    }
}
