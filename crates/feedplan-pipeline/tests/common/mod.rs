//! Scripted capability provider and fixtures shared by the scenario tests.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use feedplan_core::{
    AnalysisRecord, Asset, Caption, DatedItem, ReviewIssue, ReviewReport, Severity, StyleProfile,
};
use feedplan_db::{MemoryStore, PipelineStore};
use feedplan_gateway::{
    Capability, CapabilityError, CapabilityProvider, IllustrateRequest, Metered, PlanRequest,
    ResilientInvoker, ReviewRequest, Usage, WriteRequest,
};
use feedplan_pipeline::Orchestrator;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One recorded provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Analyze(Uuid),
    Plan {
        asset_ids: Vec<Uuid>,
        strict: bool,
        feedback: Option<String>,
        history: String,
    },
    Write {
        day: u32,
        seed: String,
        previous: Option<String>,
        rewrite: bool,
    },
    Review {
        days: Vec<u32>,
    },
    Illustrate(u32),
}

#[derive(Default)]
pub struct Script {
    /// Assets whose analysis times out.
    pub analyze_timeouts: HashSet<Uuid>,
    /// Planner answers, consumed in order; a default plan once exhausted.
    pub plans: VecDeque<Result<Vec<DatedItem>, CapabilityError>>,
    /// Every write call fails.
    pub fail_writes: bool,
    /// Reviewer answers, consumed in order; score 100 once exhausted.
    pub reviews: VecDeque<Result<ReviewReport, CapabilityError>>,
    /// Provisional day numbers whose illustration fails.
    pub fail_illustrations: HashSet<u32>,
    /// Cancels the token once this many write calls have been made.
    pub cancel_after_writes: Option<(usize, CancellationToken)>,
}

#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<Script>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedProvider {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn analyze_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Analyze(_)))
            .count()
    }

    pub fn plan_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Plan { .. }))
            .collect()
    }

    pub fn write_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Write { .. }))
            .collect()
    }

    pub fn review_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Review { .. }))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn usage() -> Usage {
    Usage::new(100, 10)
}

#[async_trait]
impl CapabilityProvider for ScriptedProvider {
    async fn analyze(&self, asset: &Asset) -> Result<Metered<AnalysisRecord>, CapabilityError> {
        self.record(Call::Analyze(asset.id));
        if self.script.lock().unwrap().analyze_timeouts.contains(&asset.id) {
            return Err(CapabilityError::Timeout {
                capability: Capability::Analyze,
                after_secs: 120,
            });
        }
        let record = AnalysisRecord {
            asset_id: asset.id,
            campaign_id: asset.campaign_id,
            fingerprint: asset.fingerprint.clone(),
            description: format!("A detailed photo description of {}", asset.blob_key),
            mood: Some("warm".to_string()),
            strategic_fit: Some("product".to_string()),
            is_placeholder: false,
            created_at: Utc::now(),
        };
        Ok(Metered::new(record, usage()))
    }

    async fn plan(
        &self,
        request: &PlanRequest<'_>,
    ) -> Result<Metered<Vec<DatedItem>>, CapabilityError> {
        self.record(Call::Plan {
            asset_ids: request.analyses.iter().map(|a| a.asset_id).collect(),
            strict: request.constraints.strict,
            feedback: request.constraints.feedback.clone(),
            history: request.constraints.history.clone(),
        });
        let scripted = self.script.lock().unwrap().plans.pop_front();
        match scripted {
            Some(Ok(items)) => Ok(Metered::new(items, usage())),
            Some(Err(e)) => Err(e),
            None => Ok(Metered::new(
                request
                    .analyses
                    .iter()
                    .zip(1u32..)
                    .map(|(a, day)| DatedItem::new(day, vec![a.asset_id], format!("seed {day}")))
                    .collect(),
                usage(),
            )),
        }
    }

    async fn write(&self, request: &WriteRequest<'_>) -> Result<Metered<Caption>, CapabilityError> {
        let rewrite = request.rewrite_feedback.is_some();
        self.record(Call::Write {
            day: request.item.day_number,
            seed: request.item.seed.clone(),
            previous: request.previous_caption.map(str::to_string),
            rewrite,
        });

        let writes = self.write_calls().len();
        let (fail, cancel) = {
            let script = self.script.lock().unwrap();
            let cancel = script
                .cancel_after_writes
                .as_ref()
                .filter(|(n, _)| writes >= *n)
                .map(|(_, token)| token.clone());
            (script.fail_writes, cancel)
        };
        if let Some(token) = cancel {
            token.cancel();
        }
        if fail {
            return Err(CapabilityError::Unavailable {
                capability: Capability::Write,
                reason: "writer offline".to_string(),
            });
        }

        let prefix = if rewrite { "rewritten" } else { "caption for" };
        Ok(Metered::new(
            Caption::new(
                request.item.day_number,
                format!("{prefix} {}", request.item.seed),
            ),
            usage(),
        ))
    }

    async fn review(
        &self,
        request: &ReviewRequest<'_>,
    ) -> Result<Metered<ReviewReport>, CapabilityError> {
        self.record(Call::Review {
            days: request.captions.iter().map(|c| c.day_number).collect(),
        });
        let scripted = self.script.lock().unwrap().reviews.pop_front();
        match scripted {
            Some(Ok(report)) => Ok(Metered::new(report, usage())),
            Some(Err(e)) => Err(e),
            None => Ok(Metered::new(report(100, vec![]), usage())),
        }
    }

    async fn illustrate(
        &self,
        request: &IllustrateRequest<'_>,
    ) -> Result<Metered<Vec<u8>>, CapabilityError> {
        self.record(Call::Illustrate(request.day_number));
        if self
            .script
            .lock()
            .unwrap()
            .fail_illustrations
            .contains(&request.day_number)
        {
            return Err(CapabilityError::Unavailable {
                capability: Capability::Illustrate,
                reason: "image model refused".to_string(),
            });
        }
        Ok(Metered::new(
            format!("png:{}", request.concept).into_bytes(),
            usage(),
        ))
    }
}

pub fn report(score: u8, issues: Vec<ReviewIssue>) -> ReviewReport {
    ReviewReport {
        score,
        issues,
        summary: format!("scored {score}"),
    }
}

pub fn issue(day_number: u32, severity: Severity) -> ReviewIssue {
    ReviewIssue {
        day_number,
        severity,
        category: "tone".to_string(),
        message: format!("day {day_number} is off-brand"),
    }
}

pub fn style() -> StyleProfile {
    StyleProfile {
        brand_name: "Koffiebar Noord".to_string(),
        voice: "warm, informal".to_string(),
        language: "nl".to_string(),
        hashtags: vec!["#koffie".to_string()],
        default_post_time: "09:00".to_string(),
        notes: None,
    }
}

pub async fn seed_assets(store: &MemoryStore, campaign_id: Uuid, count: usize) -> Vec<Asset> {
    let mut assets = Vec::with_capacity(count);
    for i in 0..count {
        let asset = Asset::new(campaign_id, format!("img-{i}.jpg"), format!("bytes-{i}").as_bytes());
        store.put_asset(&asset).await.unwrap();
        assets.push(asset);
    }
    assets
}

pub fn orchestrator(store: &Arc<MemoryStore>, provider: &Arc<ScriptedProvider>) -> Orchestrator {
    let store: Arc<dyn PipelineStore> = store.clone();
    let provider: Arc<dyn CapabilityProvider> = provider.clone();
    Orchestrator::new(store, provider, style())
        .with_invoker(ResilientInvoker::new(3, 0, Duration::from_secs(5)))
}
