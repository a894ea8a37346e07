use feedplan_db::DbError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("campaign {0} already has a generation in progress")]
    CampaignBusy(Uuid),

    #[error("invalid generation request: {0}")]
    InvalidRequest(String),

    #[error("campaign {0} has nothing to plan: no unconsumed or selected assets")]
    NothingToPlan(Uuid),

    #[error("generation cancelled")]
    Cancelled,

    #[error("asset {asset_id} does not belong to campaign {campaign_id}")]
    UnknownAsset { campaign_id: Uuid, asset_id: Uuid },

    #[error("persistence failure: {0}")]
    Persistence(#[from] DbError),
}
