//! Integration tests for `HttpCapabilityClient` using wiremock HTTP mocks.

use std::time::Duration;

use feedplan_core::{
    Asset, Caption, DatedItem, NarrativePhase, PlanConstraints, Severity, StyleProfile,
};
use feedplan_gateway::{
    Capability, CapabilityError, CapabilityProvider, ErrorKind, HttpCapabilityClient,
    IllustrateRequest, PlanRequest, ResilientInvoker, ReviewRequest, WriteRequest,
};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(base_url: &str) -> HttpCapabilityClient {
    HttpCapabilityClient::with_base_url(base_url, 30)
        .expect("client construction should not fail")
}

fn style() -> StyleProfile {
    StyleProfile {
        brand_name: "Koffiebar Noord".to_string(),
        voice: "warm, informal, a little cheeky".to_string(),
        language: "nl".to_string(),
        hashtags: vec!["#koffie".to_string()],
        default_post_time: "09:00".to_string(),
        notes: None,
    }
}

fn envelope(output: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "output": output,
        "usage": {"prompt_tokens": 120, "completion_tokens": 45}
    })
}

#[tokio::test]
async fn analyze_returns_record_bound_to_asset() {
    let server = MockServer::start().await;
    let asset = Asset::new(Uuid::new_v4(), "campaign/a.jpg", b"jpeg-bytes");

    Mock::given(method("POST"))
        .and(path("/v1/analyze"))
        .and(body_partial_json(serde_json::json!({"blob_key": "campaign/a.jpg"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(serde_json::json!(
            "```json\n{\"content\": \"Barista pouring a rosetta in soft window light\", \"mood\": \"calm\", \"fit\": \"craft\"}\n```"
        ))))
        .expect(1)
        .mount(&server)
        .await;

    let result = test_client(&server.uri()).analyze(&asset).await.unwrap();

    assert_eq!(result.value.asset_id, asset.id);
    assert_eq!(result.value.fingerprint, asset.fingerprint);
    assert_eq!(result.value.mood.as_deref(), Some("calm"));
    assert_eq!(result.value.strategic_fit.as_deref(), Some("craft"));
    assert!(result.value.is_valid());
    assert_eq!(result.usage.prompt_units, 120);
    assert_eq!(result.usage.completion_units, 45);
}

#[tokio::test]
async fn plan_normalizes_wrapped_items() {
    let server = MockServer::start().await;
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/v1/plan"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(serde_json::json!({
            "days": [
                {"day": 1, "assets": [a.to_string(), b.to_string()], "premise": "Opening", "time": "08:15",
                 "hook": "question", "cta": "visit"},
                {"day": 2, "assets": [], "premise": "Quote card", "graphic": "Bold quote"}
            ]
        }))))
        .mount(&server)
        .await;

    let style = style();
    let constraints = PlanConstraints::new(2, 1, NarrativePhase::Launch);
    let request = PlanRequest {
        analyses: &[],
        constraints: &constraints,
        style: &style,
    };
    let items = test_client(&server.uri()).plan(&request).await.unwrap().value;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].asset_ids, vec![a, b]);
    assert_eq!(items[0].post_time, "08:15");
    assert_eq!(items[0].hook_cta.as_ref().unwrap().cta, "visit");
    assert!(items[1].asset_ids.is_empty());
    assert_eq!(items[1].post_time, "09:00");
    assert_eq!(items[1].graphic.as_ref().unwrap().concept, "Bold quote");
}

#[tokio::test]
async fn write_accepts_plain_prose() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/write"))
        .and(body_partial_json(serde_json::json!({"previous_caption": "Gisteren: open!"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(serde_json::json!(
            "  Vandaag proeven we de nieuwe blend. Kom langs! #koffie  "
        ))))
        .mount(&server)
        .await;

    let style = style();
    let item = DatedItem::new(4, vec![], "Tasting day");
    let request = WriteRequest {
        item: &item,
        image_context: vec![],
        previous_caption: Some("Gisteren: open!"),
        style: &style,
        rewrite_feedback: None,
    };
    let caption = test_client(&server.uri()).write(&request).await.unwrap().value;

    assert_eq!(caption.day_number, 4);
    assert_eq!(caption.text, "Vandaag proeven we de nieuwe blend. Kom langs! #koffie");
    assert!(!caption.is_placeholder);
}

#[tokio::test]
async fn review_clamps_fractional_scores() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/review"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(serde_json::json!({
            "overall_score": 44.6,
            "issues": [{"day": 1, "severity": "HIGH", "category": "tone", "message": "too formal"}],
            "summary": "Day 1 misses the voice"
        }))))
        .mount(&server)
        .await;

    let style = style();
    let items = vec![DatedItem::new(1, vec![], "Opening")];
    let captions = vec![Caption::new(1, "Geachte klant")];
    let request = ReviewRequest {
        items: &items,
        captions: &captions,
        style: &style,
    };
    let report = test_client(&server.uri()).review(&request).await.unwrap().value;

    assert_eq!(report.score, 45);
    assert_eq!(report.issues[0].severity, Severity::High);
    assert_eq!(report.summary, "Day 1 misses the voice");
}

#[tokio::test]
async fn illustrate_returns_raw_bytes_and_header_usage() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/illustrate"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .insert_header("x-usage-prompt-tokens", "30")
                .set_body_bytes(vec![0x89, b'P', b'N', b'G']),
        )
        .mount(&server)
        .await;

    let style = style();
    let request = IllustrateRequest {
        day_number: 2,
        concept: "Bold quote",
        style: &style,
    };
    let image = test_client(&server.uri()).illustrate(&request).await.unwrap();

    assert_eq!(image.value, vec![0x89, b'P', b'N', b'G']);
    assert_eq!(image.usage.prompt_units, 30);
    assert_eq!(image.usage.completion_units, 0);
}

#[tokio::test]
async fn status_429_is_rate_limited_with_retry_after() {
    let server = MockServer::start().await;
    let asset = Asset::new(Uuid::new_v4(), "a.jpg", b"x");

    Mock::given(method("POST"))
        .and(path("/v1/analyze"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let err = test_client(&server.uri()).analyze(&asset).await.unwrap_err();
    assert!(matches!(
        err,
        CapabilityError::RateLimited {
            retry_after_ms: Some(7_000),
            ..
        }
    ));
}

#[tokio::test]
async fn resource_exhausted_body_is_rate_limited() {
    let server = MockServer::start().await;
    let asset = Asset::new(Uuid::new_v4(), "a.jpg", b"x");

    Mock::given(method("POST"))
        .and(path("/v1/analyze"))
        .respond_with(ResponseTemplate::new(503).set_body_string(
            r#"{"error": {"status": "RESOURCE_EXHAUSTED", "message": "quota"}}"#,
        ))
        .mount(&server)
        .await;

    let err = test_client(&server.uri()).analyze(&asset).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimited);
}

#[tokio::test]
async fn auth_failure_is_unavailable() {
    let server = MockServer::start().await;
    let asset = Asset::new(Uuid::new_v4(), "a.jpg", b"x");

    Mock::given(method("POST"))
        .and(path("/v1/analyze"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let err = test_client(&server.uri()).analyze(&asset).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CapabilityUnavailable);
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn prose_analysis_is_malformed() {
    let server = MockServer::start().await;
    let asset = Asset::new(Uuid::new_v4(), "a.jpg", b"x");

    Mock::given(method("POST"))
        .and(path("/v1/analyze"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(serde_json::json!(
            "I'm sorry, I cannot see the image."
        ))))
        .mount(&server)
        .await;

    let err = test_client(&server.uri()).analyze(&asset).await.unwrap_err();
    assert!(matches!(err, CapabilityError::Malformed { .. }));
}

#[tokio::test]
async fn api_key_is_sent_as_bearer_token() {
    let server = MockServer::start().await;
    let asset = Asset::new(Uuid::new_v4(), "a.jpg", b"x");

    Mock::given(method("POST"))
        .and(path("/v1/analyze"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(serde_json::json!({
            "description": "Close-up of freshly roasted beans on a tray"
        }))))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpCapabilityClient::new(&server.uri(), Some("s3cret".to_string()), 30).unwrap();
    assert!(client.analyze(&asset).await.is_ok());
}

#[tokio::test]
async fn slow_provider_times_out() {
    let server = MockServer::start().await;
    let asset = Asset::new(Uuid::new_v4(), "a.jpg", b"x");

    Mock::given(method("POST"))
        .and(path("/v1/analyze"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(3))
                .set_body_json(envelope(serde_json::json!({"description": "late"}))),
        )
        .mount(&server)
        .await;

    let err = HttpCapabilityClient::with_base_url(&server.uri(), 1)
        .unwrap()
        .analyze(&asset)
        .await
        .unwrap_err();
    assert!(matches!(err, CapabilityError::Timeout { .. }));
}

#[tokio::test]
async fn invoker_retries_until_provider_recovers() {
    let server = MockServer::start().await;
    let asset = Asset::new(Uuid::new_v4(), "a.jpg", b"x");

    Mock::given(method("POST"))
        .and(path("/v1/analyze"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/analyze"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(serde_json::json!({
            "description": "Latte art heart on a wooden counter"
        }))))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let invoker = ResilientInvoker::new(3, 0, Duration::from_secs(10));
    let record = invoker
        .invoke(Capability::Analyze, || client.analyze(&asset))
        .await
        .unwrap();

    assert_eq!(record.asset_id, asset.id);
    let totals = invoker.ledger().snapshot().for_capability(Capability::Analyze);
    assert_eq!(totals.calls, 1);
    assert_eq!(totals.prompt_units, 120);
}
