//! HTTP/JSON capability provider.
//!
//! Every capability is a `POST {base}/v1/{capability}` with the request struct
//! as JSON body. Text capabilities answer with an envelope
//!
//! ```json
//! { "output": <object | array | string>, "usage": { "prompt_tokens": 0, "completion_tokens": 0 } }
//! ```
//!
//! where a string `output` is raw model text that still has to go through
//! [`parse_structured_output`]. The illustrate endpoint answers with the image
//! bytes and reports usage in `x-usage-*` headers.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use feedplan_core::{
    is_clock_time, AnalysisRecord, Asset, Caption, DatedItem, GraphicRequest, HookCta,
    ReviewIssue, ReviewReport, Severity,
};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CapabilityError, ParseError};
use crate::provider::CapabilityProvider;
use crate::structured::parse_structured_output;
use crate::types::{
    AnalyzeRequest, Capability, IllustrateRequest, Metered, PlanRequest, ReviewRequest, Usage,
    WriteRequest,
};

/// Marker some providers put in the body instead of answering 429.
const RESOURCE_EXHAUSTED: &str = "RESOURCE_EXHAUSTED";

/// Longest error body echoed into an error message.
const MAX_ERROR_SNIPPET: usize = 200;

/// Client for an HTTP capability provider.
#[derive(Debug, Clone)]
pub struct HttpCapabilityClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl HttpCapabilityClient {
    /// Creates a client for the provider at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Http`] if the `reqwest::Client` cannot be
    /// built, or [`CapabilityError::InvalidEndpoint`] if `base_url` does not parse.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, CapabilityError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("feedplan/0.1 (content-pipeline)")
            .build()?;

        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised)
            .map_err(|e| CapabilityError::InvalidEndpoint(format!("'{base_url}': {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_key,
            timeout_secs,
        })
    }

    /// Client for a provider without authentication, e.g. a wiremock server.
    ///
    /// # Errors
    ///
    /// Same as [`HttpCapabilityClient::new`].
    pub fn with_base_url(base_url: &str, timeout_secs: u64) -> Result<Self, CapabilityError> {
        Self::new(base_url, None, timeout_secs)
    }

    fn endpoint(&self, capability: Capability) -> Result<Url, CapabilityError> {
        self.base_url
            .join(&format!("v1/{}", capability.as_str()))
            .map_err(|e| CapabilityError::InvalidEndpoint(format!("{capability}: {e}")))
    }

    /// Sends the request and returns the successful response, mapping
    /// transport and status failures onto [`CapabilityError`].
    async fn send<B: Serialize + ?Sized>(
        &self,
        capability: Capability,
        body: &B,
    ) -> Result<reqwest::Response, CapabilityError> {
        let mut request = self.client.post(self.endpoint(capability)?).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(capability, &e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after_ms = retry_after_ms(response.headers());
        let text = response.text().await.unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS || text.contains(RESOURCE_EXHAUSTED) {
            return Err(CapabilityError::RateLimited {
                capability,
                retry_after_ms,
            });
        }

        Err(CapabilityError::Unavailable {
            capability,
            reason: format!("HTTP {status}: {}", snippet(&text)),
        })
    }

    fn transport_error(&self, capability: Capability, err: &reqwest::Error) -> CapabilityError {
        if err.is_timeout() {
            CapabilityError::Timeout {
                capability,
                after_secs: self.timeout_secs,
            }
        } else {
            CapabilityError::Unavailable {
                capability,
                reason: err.to_string(),
            }
        }
    }

    /// Posts a JSON request and returns the envelope's raw `output`.
    async fn call_raw<B>(
        &self,
        capability: Capability,
        body: &B,
    ) -> Result<Metered<serde_json::Value>, CapabilityError>
    where
        B: Serialize + ?Sized,
    {
        let text = self
            .send(capability, body)
            .await?
            .text()
            .await
            .map_err(|e| self.transport_error(capability, &e))?;

        let envelope: Envelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            // A 200 carrying a quota error is still a rate limit.
            Err(_) if text.contains(RESOURCE_EXHAUSTED) => {
                return Err(CapabilityError::RateLimited {
                    capability,
                    retry_after_ms: None,
                })
            }
            Err(e) => {
                return Err(CapabilityError::Malformed {
                    capability,
                    source: ParseError::Shape(e),
                })
            }
        };

        Ok(Metered::new(envelope.output, envelope.usage.into()))
    }

    /// Like [`Self::call_raw`], decoding `output` into `W`.
    async fn call<B, W>(&self, capability: Capability, body: &B) -> Result<Metered<W>, CapabilityError>
    where
        B: Serialize + ?Sized,
        W: DeserializeOwned,
    {
        let raw = self.call_raw(capability, body).await?;
        let value = decode_output::<W>(raw.value)
            .map_err(|source| CapabilityError::Malformed { capability, source })?;
        Ok(Metered::new(value, raw.usage))
    }
}

#[async_trait]
impl CapabilityProvider for HttpCapabilityClient {
    async fn analyze(&self, asset: &Asset) -> Result<Metered<AnalysisRecord>, CapabilityError> {
        let request = AnalyzeRequest {
            asset_id: asset.id,
            campaign_id: asset.campaign_id,
            blob_key: &asset.blob_key,
            fingerprint: &asset.fingerprint,
        };
        let wire: Metered<WireAnalysis> = self.call(Capability::Analyze, &request).await?;
        let record = wire.value.into_record(asset);
        if record.description.trim().is_empty() {
            return Err(CapabilityError::Malformed {
                capability: Capability::Analyze,
                source: ParseError::Empty,
            });
        }
        Ok(Metered::new(record, wire.usage))
    }

    async fn plan(
        &self,
        request: &PlanRequest<'_>,
    ) -> Result<Metered<Vec<DatedItem>>, CapabilityError> {
        let wire: Metered<WirePlan> = self.call(Capability::Plan, request).await?;
        let items = wire
            .value
            .into_items()
            .into_iter()
            .enumerate()
            .map(|(index, item)| item.into_dated_item(index, request))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Metered::new(items, wire.usage))
    }

    async fn write(&self, request: &WriteRequest<'_>) -> Result<Metered<Caption>, CapabilityError> {
        let wire = self.call_raw(Capability::Write, request).await?;
        let text = caption_text(wire.value).map_err(|source| CapabilityError::Malformed {
            capability: Capability::Write,
            source,
        })?;
        Ok(Metered::new(
            Caption::new(request.item.day_number, text),
            wire.usage,
        ))
    }

    async fn review(
        &self,
        request: &ReviewRequest<'_>,
    ) -> Result<Metered<ReviewReport>, CapabilityError> {
        let wire: Metered<WireReview> = self.call(Capability::Review, request).await?;
        Ok(Metered::new(wire.value.into_report(), wire.usage))
    }

    async fn illustrate(
        &self,
        request: &IllustrateRequest<'_>,
    ) -> Result<Metered<Vec<u8>>, CapabilityError> {
        let capability = Capability::Illustrate;
        let response = self.send(capability, request).await?;
        let usage = Usage::new(
            header_u64(response.headers(), "x-usage-prompt-tokens"),
            header_u64(response.headers(), "x-usage-completion-tokens"),
        );
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(capability, &e))?;
        if bytes.is_empty() {
            return Err(CapabilityError::Malformed {
                capability,
                source: ParseError::Empty,
            });
        }
        Ok(Metered::new(bytes.to_vec(), usage))
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope {
    output: serde_json::Value,
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default, alias = "input_tokens")]
    prompt_tokens: u64,
    #[serde(default, alias = "output_tokens")]
    completion_tokens: u64,
}

impl From<WireUsage> for Usage {
    fn from(wire: WireUsage) -> Self {
        Usage::new(wire.prompt_tokens, wire.completion_tokens)
    }
}

#[derive(Debug, Deserialize)]
struct WireAnalysis {
    #[serde(alias = "content", alias = "summary")]
    description: String,
    #[serde(default)]
    mood: Option<String>,
    #[serde(default, alias = "fit", alias = "strategic")]
    strategic_fit: Option<String>,
}

impl WireAnalysis {
    fn into_record(self, asset: &Asset) -> AnalysisRecord {
        AnalysisRecord {
            asset_id: asset.id,
            campaign_id: asset.campaign_id,
            fingerprint: asset.fingerprint.clone(),
            description: self.description.trim().to_string(),
            mood: non_empty(self.mood),
            strategic_fit: non_empty(self.strategic_fit),
            is_placeholder: false,
            created_at: Utc::now(),
        }
    }
}

/// Planners answer with either a bare array or an object wrapping one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WirePlan {
    Items(Vec<WirePlanItem>),
    Wrapped {
        #[serde(alias = "days", alias = "posts", alias = "plan")]
        items: Vec<WirePlanItem>,
    },
}

impl WirePlan {
    fn into_items(self) -> Vec<WirePlanItem> {
        match self {
            WirePlan::Items(items) | WirePlan::Wrapped { items } => items,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WirePlanItem {
    #[serde(default, alias = "day")]
    day_number: Option<u32>,
    #[serde(default, alias = "assets", alias = "image_ids")]
    asset_ids: Vec<String>,
    #[serde(alias = "premise", alias = "theme")]
    seed: String,
    #[serde(default, alias = "reason")]
    rationale: String,
    #[serde(default, alias = "time")]
    post_time: Option<String>,
    #[serde(default)]
    hook: Option<String>,
    #[serde(default)]
    cta: Option<String>,
    #[serde(default, alias = "graphic", alias = "graphic_request")]
    graphic_concept: Option<String>,
}

impl WirePlanItem {
    fn into_dated_item(
        self,
        index: usize,
        request: &PlanRequest<'_>,
    ) -> Result<DatedItem, CapabilityError> {
        let asset_ids = self
            .asset_ids
            .iter()
            .map(|raw| {
                Uuid::parse_str(raw.trim()).map_err(|_| CapabilityError::Invalid {
                    capability: Capability::Plan,
                    reason: format!("asset id '{raw}' is not a UUID"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let fallback_day = request
            .constraints
            .start_day
            .saturating_add(u32::try_from(index).unwrap_or(u32::MAX));

        let post_time = self
            .post_time
            .map(|t| t.trim().to_string())
            .filter(|t| is_clock_time(t))
            .unwrap_or_else(|| request.style.default_post_time.clone());

        let hook_cta = match (non_empty(self.hook), non_empty(self.cta)) {
            (Some(hook), Some(cta)) => Some(HookCta { hook, cta }),
            _ => None,
        };

        Ok(DatedItem {
            day_number: self.day_number.unwrap_or(fallback_day),
            asset_ids,
            seed: self.seed.trim().to_string(),
            rationale: self.rationale.trim().to_string(),
            post_time,
            hook_cta,
            graphic: non_empty(self.graphic_concept).map(|concept| GraphicRequest { concept }),
            graphic_blob_key: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireReview {
    #[serde(alias = "overall_score", alias = "quality_score")]
    score: f64,
    #[serde(default)]
    issues: Vec<WireIssue>,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Deserialize)]
struct WireIssue {
    #[serde(alias = "day")]
    day_number: u32,
    #[serde(default)]
    severity: String,
    #[serde(default, alias = "type")]
    category: String,
    #[serde(default, alias = "description")]
    message: String,
}

impl WireReview {
    fn into_report(self) -> ReviewReport {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let score = if self.score.is_finite() {
            self.score.clamp(0.0, 100.0).round() as u8
        } else {
            0
        };
        ReviewReport {
            score,
            issues: self
                .issues
                .into_iter()
                .map(|issue| ReviewIssue {
                    day_number: issue.day_number,
                    severity: parse_severity(&issue.severity),
                    category: issue.category,
                    message: issue.message,
                })
                .collect(),
            summary: self.summary,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireCaption {
    #[serde(alias = "text", alias = "caption", alias = "body")]
    caption: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn decode_output<W: DeserializeOwned>(output: serde_json::Value) -> Result<W, ParseError> {
    match output {
        serde_json::Value::String(raw) => parse_structured_output(&raw),
        serde_json::Value::Null => Err(ParseError::Empty),
        other => serde_json::from_value(other).map_err(ParseError::Shape),
    }
}

/// Writers may answer with plain prose or with a `{ "caption": ... }` object.
fn caption_text(output: serde_json::Value) -> Result<String, ParseError> {
    let text = match output {
        serde_json::Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.starts_with('{') || trimmed.starts_with("```") {
                parse_structured_output::<WireCaption>(trimmed)
                    .map_or_else(|_| trimmed.to_string(), |w| w.caption)
            } else {
                trimmed.to_string()
            }
        }
        serde_json::Value::Null => return Err(ParseError::Empty),
        other => serde_json::from_value::<WireCaption>(other)
            .map_err(ParseError::Shape)?
            .caption,
    };

    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(text)
}

fn parse_severity(raw: &str) -> Severity {
    match raw.trim().to_lowercase().as_str() {
        "high" | "critical" | "major" | "severe" => Severity::High,
        "medium" | "moderate" => Severity::Medium,
        _ => Severity::Low,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs.saturating_mul(1_000))
}

fn header_u64(headers: &HeaderMap, name: &str) -> u64 {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

fn snippet(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(MAX_ERROR_SNIPPET) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
