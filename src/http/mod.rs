//! Illustrative HTTP surface over the streaming core.
//!
//! Three routes on an axum [`Router`]:
//!
//! - `POST /generate` starts a job and streams its frames as SSE, with
//!   the minted ids in `X-Stream-Id` / `X-Resumable-Channel-Id` response
//!   headers. A duplicate request gets `409` with the existing job's ids.
//! - `GET /resume?streamId=...` replays the full transcript and follows
//!   live. An active job whose channel has expired gets a single frame
//!   with the buffered snapshot; `204` when there is nothing to resume.
//! - `GET /status?ownerId=...&moduleKey=...` returns a JSON snapshot of
//!   the job record.
//!
//! One SSE `data:` line per frame, JSON-encoded. All state is injected
//! through [`AppState`]; there are no ambient singletons.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header::HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_stream::StreamExt;

use crate::constants::{RESUMABLE_CHANNEL_ID_HEADER, STREAM_ID_HEADER};
use crate::error::StreamError;
use crate::generator::{identity_extractor, Extractor, SourceFactory};
use crate::orchestrator::{GenerationOrchestrator, JobHandle};
use crate::types::{Frame, JobKey, JobStatus};

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<GenerationOrchestrator>,
    sources: Arc<dyn SourceFactory>,
    extractor: Extractor,
}

impl AppState {
    /// Creates handler state with the identity extractor.
    pub fn new(orchestrator: Arc<GenerationOrchestrator>, sources: Arc<dyn SourceFactory>) -> Self {
        Self {
            orchestrator,
            sources,
            extractor: identity_extractor(),
        }
    }

    /// Sets the extraction function applied to upstream partials.
    pub fn with_extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = extractor;
        self
    }
}

/// Builds the router over prepared state.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use genstream::generator::{NullSink, ScriptedSource, SourceFactory};
/// use genstream::http::{router, AppState};
/// use genstream::orchestrator::GenerationOrchestrator;
/// use genstream::registry::memory::InMemoryRegistry;
/// use genstream::transport::ResumableChannels;
///
/// struct EmptyFactory;
/// impl SourceFactory for EmptyFactory {
///     fn create(
///         &self,
///         _key: &genstream::types::JobKey,
///         _params: &serde_json::Value,
///     ) -> Result<Box<dyn genstream::generator::GenerationSource>, genstream::error::StreamError>
///     {
///         Ok(Box::new(ScriptedSource::new(Vec::new())))
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let orchestrator = Arc::new(GenerationOrchestrator::new(
///     Arc::new(InMemoryRegistry::new()),
///     Arc::new(ResumableChannels::new()),
///     Arc::new(NullSink),
/// ));
/// let app = router(AppState::new(orchestrator, Arc::new(EmptyFactory)));
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
/// axum::serve(listener, app).await.unwrap();
/// # }
/// ```
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/generate", post(generate))
        .route("/resume", get(resume))
        .route("/status", get(status))
        .with_state(state)
}

/// Body of `POST /generate`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Identifier of the owning user or session.
    pub owner_id: String,
    /// Generation target within the owner's scope.
    pub module_key: String,
    /// Opaque parameters handed to the source factory.
    #[serde(default)]
    pub params: Value,
}

/// `409` body when an active job already owns the key.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateResponse {
    /// Always `"duplicate_job"`.
    pub error: String,
    /// Stream id of the existing job, usable with `GET /resume`.
    pub stream_id: String,
    /// Channel id of the existing job, if still bound.
    pub resumable_channel_id: Option<String>,
}

/// `GET /status` snapshot.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Lifecycle status of the record.
    pub status: JobStatus,
    /// Stream id of the job that owns the key.
    pub stream_id: String,
    /// When the job was accepted.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Last buffered partial payload; only present while active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffered_content: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResumeQuery {
    stream_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusQuery {
    owner_id: String,
    module_key: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    let key = JobKey::new(request.owner_id, request.module_key);
    let source = match state.sources.create(&key, &request.params) {
        Ok(source) => source,
        Err(err) => {
            tracing::error!(key = %key, error = %err, "source factory rejected request");
            return error_response(StatusCode::BAD_GATEWAY, err.frame_message());
        }
    };

    match state
        .orchestrator
        .start(key, source, Arc::clone(&state.extractor))
        .await
    {
        Ok(handle) => frames_response(handle),
        Err(StreamError::DuplicateJob {
            stream_id,
            resumable_channel_id,
            ..
        }) => {
            let mut response = (
                StatusCode::CONFLICT,
                Json(DuplicateResponse {
                    error: "duplicate_job".to_string(),
                    stream_id: stream_id.clone(),
                    resumable_channel_id: resumable_channel_id.clone(),
                }),
            )
                .into_response();
            insert_id_headers(&mut response, &stream_id, resumable_channel_id.as_deref());
            response
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to start generation");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.frame_message())
        }
    }
}

fn frames_response(handle: JobHandle) -> Response {
    let stream = handle.frames.map(|frame| Event::default().json_data(&frame));
    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response();
    insert_id_headers(
        &mut response,
        &handle.stream_id,
        Some(&handle.resumable_channel_id),
    );
    response
}

/// Stamps the job ids onto a response. The ids are UUIDs, always valid
/// header values.
fn insert_id_headers(response: &mut Response, stream_id: &str, channel_id: Option<&str>) {
    if let Ok(value) = HeaderValue::from_str(stream_id) {
        response.headers_mut().insert(STREAM_ID_HEADER, value);
    }
    if let Some(channel_id) = channel_id {
        if let Ok(value) = HeaderValue::from_str(channel_id) {
            response
                .headers_mut()
                .insert(RESUMABLE_CHANNEL_ID_HEADER, value);
        }
    }
}

async fn resume(State(state): State<AppState>, Query(query): Query<ResumeQuery>) -> Response {
    let record = match state
        .orchestrator
        .registry()
        .find_by_stream_id(&query.stream_id)
        .await
    {
        Ok(Some(record)) => record,
        Ok(None) => {
            tracing::debug!(stream_id = %query.stream_id, "no record to resume");
            return StatusCode::NO_CONTENT.into_response();
        }
        Err(err) => {
            tracing::error!(error = %err, "resume lookup failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.frame_message());
        }
    };

    let channel_id = record.resumable_channel_id.as_deref().unwrap_or_default();
    match state.orchestrator.channels().resume(channel_id) {
        Ok(frames) => {
            let stream = frames.map(|frame| Event::default().json_data(&frame));
            return Sse::new(stream)
                .keep_alive(KeepAlive::default())
                .into_response();
        }
        Err(err) if err.is_benign() => {
            tracing::debug!(
                stream_id = %query.stream_id,
                error = %err,
                "channel expired; reconciling from job record"
            );
        }
        Err(err) => {
            tracing::error!(stream_id = %query.stream_id, error = %err, "resume failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.frame_message());
        }
    }

    // Channel expired; the record decides what the client is still owed.
    // A job that died in error owes a terminal frame. An active job (in
    // this or another process) serves its buffered snapshot, so a cold
    // resume still gets the latest partial. A completed-and-delivered
    // job has nothing left.
    match record.status {
        JobStatus::Error => single_frame_response(&Frame::Error {
            module_key: record.module_key,
            error: "generation failed; restart to retry".to_string(),
        }),
        JobStatus::Active => match record.buffered_content {
            Some(payload) => single_frame_response(&Frame::Partial {
                module_key: record.module_key,
                payload,
            }),
            None => StatusCode::NO_CONTENT.into_response(),
        },
        _ => StatusCode::NO_CONTENT.into_response(),
    }
}

fn single_frame_response(frame: &Frame) -> Response {
    let stream = tokio_stream::once(Event::default().json_data(frame));
    Sse::new(stream).into_response()
}

async fn status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>, Response> {
    let key = JobKey::new(query.owner_id, query.module_key);
    match state.orchestrator.registry().get(&key).await {
        Ok(Some(record)) => {
            let buffered_content = if record.is_active() {
                record.buffered_content
            } else {
                None
            };
            Ok(Json(StatusResponse {
                status: record.status,
                stream_id: record.stream_id,
                created_at: record.created_at,
                buffered_content,
            }))
        }
        Ok(None) => Err(error_response(StatusCode::NOT_FOUND, "no job for key")),
        Err(err) => {
            tracing::error!(key = %key, error = %err, "status lookup failed");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                err.frame_message(),
            ))
        }
    }
}
