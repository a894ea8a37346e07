use async_trait::async_trait;
use feedplan_core::{AnalysisRecord, Asset, Caption, DatedItem, ReviewReport};

use crate::error::CapabilityError;
use crate::types::{IllustrateRequest, Metered, PlanRequest, ReviewRequest, WriteRequest};

/// A backend for the five AI capabilities.
///
/// Implementations report failures as [`CapabilityError`] values and must not
/// retry internally; retrying and usage accounting belong to
/// [`ResilientInvoker`](crate::ResilientInvoker).
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Describes one asset. The returned record is bound to the asset's
    /// current fingerprint.
    async fn analyze(&self, asset: &Asset) -> Result<Metered<AnalysisRecord>, CapabilityError>;

    /// Groups analyses into dated items. Day numbers in the result are
    /// provisional; the caller renumbers them.
    async fn plan(&self, request: &PlanRequest<'_>)
        -> Result<Metered<Vec<DatedItem>>, CapabilityError>;

    async fn write(&self, request: &WriteRequest<'_>) -> Result<Metered<Caption>, CapabilityError>;

    async fn review(
        &self,
        request: &ReviewRequest<'_>,
    ) -> Result<Metered<ReviewReport>, CapabilityError>;

    /// Returns encoded image bytes.
    async fn illustrate(
        &self,
        request: &IllustrateRequest<'_>,
    ) -> Result<Metered<Vec<u8>>, CapabilityError>;
}
