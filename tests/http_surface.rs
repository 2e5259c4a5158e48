//! HTTP surface tests: status codes, headers, and SSE framing for the
//! `/generate`, `/resume`, and `/status` routes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use genstream::constants::{RESUMABLE_CHANNEL_ID_HEADER, STREAM_ID_HEADER};
use genstream::error::StreamError;
use genstream::generator::{GenerationSource, NullSink, ScriptedSource, SourceFactory};
use genstream::http::{router, AppState, DuplicateResponse, StatusResponse};
use genstream::orchestrator::{GenerationOrchestrator, OrchestratorConfig};
use genstream::registry::memory::InMemoryRegistry;
use genstream::transport::ResumableChannels;
use genstream::types::{Frame, GenerationEvent, JobKey, JobStatus, Usage};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

/// Builds sources from request params:
/// `{"partials": [...], "final": ...}` for a scripted run,
/// `{"fail": true}` for an upstream failure after the partials,
/// `{"hang": true}` for a job that stalls after the partials,
/// `{"reject": true}` for a factory-level rejection.
struct TestFactory;

impl SourceFactory for TestFactory {
    fn create(
        &self,
        _key: &JobKey,
        params: &Value,
    ) -> Result<Box<dyn GenerationSource>, StreamError> {
        if params["reject"] == json!(true) {
            return Err(StreamError::Upstream {
                message: "unknown model".to_string(),
            });
        }

        let mut events: Vec<Result<GenerationEvent, StreamError>> = params["partials"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|p| Ok(GenerationEvent::Partial(p)))
            .collect();
        if params["hang"] == json!(true) {
            return Ok(Box::new(HangingSource {
                events: events.into_iter(),
            }));
        }
        if params["fail"] == json!(true) {
            events.push(Err(StreamError::Upstream {
                message: "model timeout".to_string(),
            }));
        } else {
            events.push(Ok(GenerationEvent::Final {
                payload: params["final"].clone(),
                usage: Usage::default(),
            }));
        }
        Ok(Box::new(ScriptedSource::new(events)))
    }
}

/// Emits its scripted prefix, then stalls forever.
struct HangingSource {
    events: std::vec::IntoIter<Result<GenerationEvent, StreamError>>,
}

#[async_trait]
impl GenerationSource for HangingSource {
    async fn next_event(&mut self) -> Option<Result<GenerationEvent, StreamError>> {
        match self.events.next() {
            Some(event) => Some(event),
            None => futures::future::pending().await,
        }
    }
}

fn app() -> (Router, Arc<GenerationOrchestrator>) {
    let orchestrator = Arc::new(
        GenerationOrchestrator::new(
            Arc::new(InMemoryRegistry::new()),
            Arc::new(ResumableChannels::new()),
            Arc::new(NullSink),
        )
        .with_config(OrchestratorConfig::default().with_throttle_interval(Duration::ZERO)),
    );
    let state = AppState::new(Arc::clone(&orchestrator), Arc::new(TestFactory));
    (router(state), orchestrator)
}

fn generate_request(owner: &str, module: &str, params: Value) -> Request<Body> {
    let body = json!({
        "ownerId": owner,
        "moduleKey": module,
        "params": params,
    });
    Request::builder()
        .method("POST")
        .uri("/generate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn sse_frames(body: Body) -> Vec<Frame> {
    let bytes = body.collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    text.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

#[tokio::test]
async fn generate_streams_frames_and_returns_ids() {
    let (app, _) = app();
    let response = app
        .oneshot(generate_request(
            "owner-1",
            "summary",
            json!({"partials": ["A", "AB"], "final": "ABC"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    assert!(response.headers().contains_key(STREAM_ID_HEADER));
    assert!(response.headers().contains_key(RESUMABLE_CHANNEL_ID_HEADER));

    let frames = sse_frames(response.into_body()).await;
    assert_eq!(
        frames,
        vec![
            Frame::Partial {
                module_key: "summary".to_string(),
                payload: json!("A"),
            },
            Frame::Partial {
                module_key: "summary".to_string(),
                payload: json!("AB"),
            },
            Frame::Complete {
                module_key: "summary".to_string(),
                payload: json!("ABC"),
            },
        ]
    );
}

#[tokio::test]
async fn duplicate_generate_returns_conflict_with_existing_ids() {
    let (app, _) = app();
    let first = app
        .clone()
        .oneshot(generate_request("owner-1", "summary", json!({"hang": true})))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let stream_id = first
        .headers()
        .get(STREAM_ID_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let channel_id = first
        .headers()
        .get(RESUMABLE_CHANNEL_ID_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let second = app
        .oneshot(generate_request("owner-1", "summary", json!({"hang": true})))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(
        second
            .headers()
            .get(STREAM_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap(),
        stream_id
    );
    assert_eq!(
        second
            .headers()
            .get(RESUMABLE_CHANNEL_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap(),
        channel_id
    );

    let bytes = second.into_body().collect().await.unwrap().to_bytes();
    let dup: DuplicateResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(dup.error, "duplicate_job");
    assert_eq!(dup.stream_id, stream_id);
    assert_eq!(dup.resumable_channel_id.as_deref(), Some(channel_id.as_str()));
}

#[tokio::test]
async fn factory_rejection_maps_to_bad_gateway() {
    let (app, _) = app();
    let response = app
        .oneshot(generate_request("owner-1", "summary", json!({"reject": true})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn resume_unknown_stream_returns_no_content() {
    let (app, _) = app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/resume?streamId=nothing-here")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn resume_replays_the_completed_transcript() {
    let (app, _) = app();
    let first = app
        .clone()
        .oneshot(generate_request(
            "owner-1",
            "summary",
            json!({"partials": ["A", "AB"], "final": "AB"}),
        ))
        .await
        .unwrap();
    let stream_id = first
        .headers()
        .get(STREAM_ID_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let live = sse_frames(first.into_body()).await;

    let resumed = app
        .oneshot(
            Request::builder()
                .uri(format!("/resume?streamId={stream_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resumed.status(), StatusCode::OK);
    let replay = sse_frames(resumed.into_body()).await;
    assert_eq!(replay, live);
}

#[tokio::test]
async fn resume_of_failed_job_with_expired_channel_sends_one_error_frame() {
    let (app, orchestrator) = app();
    let first = app
        .clone()
        .oneshot(generate_request("owner-1", "summary", json!({"fail": true})))
        .await
        .unwrap();
    let stream_id = first
        .headers()
        .get(STREAM_ID_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let channel_id = first
        .headers()
        .get(RESUMABLE_CHANNEL_ID_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    sse_frames(first.into_body()).await;

    // Simulate channel expiry ahead of the retention sweep.
    orchestrator.channels().remove(&channel_id);

    let resumed = app
        .oneshot(
            Request::builder()
                .uri(format!("/resume?streamId={stream_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resumed.status(), StatusCode::OK);
    let frames = sse_frames(resumed.into_body()).await;
    assert_eq!(frames.len(), 1);
    assert!(matches!(frames[0], Frame::Error { .. }));
}

#[tokio::test]
async fn resume_of_active_job_with_expired_channel_serves_buffered_snapshot() {
    let (app, orchestrator) = app();
    let first = app
        .clone()
        .oneshot(generate_request(
            "owner-1",
            "summary",
            json!({"partials": ["A", "AB"], "hang": true}),
        ))
        .await
        .unwrap();
    let stream_id = first
        .headers()
        .get(STREAM_ID_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let channel_id = first
        .headers()
        .get(RESUMABLE_CHANNEL_ID_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    // Wait for the job to buffer its latest partial before dropping the
    // channel out from under it.
    let key = JobKey::new("owner-1", "summary");
    let mut buffered = None;
    for _ in 0..200 {
        let record = orchestrator.registry().get(&key).await.unwrap().unwrap();
        if record.buffered_content == Some(json!("AB")) {
            buffered = record.buffered_content;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(buffered, Some(json!("AB")));

    orchestrator.channels().remove(&channel_id);

    let resumed = app
        .oneshot(
            Request::builder()
                .uri(format!("/resume?streamId={stream_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resumed.status(), StatusCode::OK);
    let frames = sse_frames(resumed.into_body()).await;
    assert_eq!(
        frames,
        vec![Frame::Partial {
            module_key: "summary".to_string(),
            payload: json!("AB"),
        }]
    );
}

#[tokio::test]
async fn resume_of_completed_job_with_expired_channel_returns_no_content() {
    let (app, orchestrator) = app();
    let first = app
        .clone()
        .oneshot(generate_request(
            "owner-1",
            "summary",
            json!({"final": "done"}),
        ))
        .await
        .unwrap();
    let stream_id = first
        .headers()
        .get(STREAM_ID_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let channel_id = first
        .headers()
        .get(RESUMABLE_CHANNEL_ID_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    sse_frames(first.into_body()).await;

    orchestrator.channels().remove(&channel_id);

    let resumed = app
        .oneshot(
            Request::builder()
                .uri(format!("/resume?streamId={stream_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resumed.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn status_reports_terminal_record_without_buffer() {
    let (app, _) = app();
    let first = app
        .clone()
        .oneshot(generate_request(
            "owner-1",
            "summary",
            json!({"partials": ["A"], "final": "AB"}),
        ))
        .await
        .unwrap();
    let stream_id = first
        .headers()
        .get(STREAM_ID_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    sse_frames(first.into_body()).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/status?ownerId=owner-1&moduleKey=summary")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let snapshot: StatusResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.stream_id, stream_id);
    assert!(snapshot.buffered_content.is_none());
}

#[tokio::test]
async fn status_for_unknown_key_returns_not_found() {
    let (app, _) = app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/status?ownerId=nobody&moduleKey=nothing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
