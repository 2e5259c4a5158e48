//! Seams to the black-box generation backend.
//!
//! The crate never talks to a model or tool provider directly. A job
//! consumes a [`GenerationSource`] (an async sequence of
//! [`GenerationEvent`]s), extracts client-facing payloads from partials
//! with an [`Extractor`], and hands the final payload to a
//! [`ContentSink`]. All three are injected; [`SourceFactory`] builds a
//! source per accepted request at the HTTP boundary.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StreamError;
use crate::types::{GenerationEvent, JobKey};

/// Module-specific extraction of the client-facing payload from an
/// upstream partial snapshot.
///
/// Pure and cheap; called once per upstream partial, before throttling.
pub type Extractor = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Extractor that passes upstream snapshots through unchanged.
pub fn identity_extractor() -> Extractor {
    Arc::new(|payload: &Value| payload.clone())
}

/// Async sequence of events produced by one upstream generation.
///
/// Consumed by exactly one job task, hence `&mut self` and no `Sync`
/// bound. Yields `None` when the upstream stream ends; a well-behaved
/// source yields a [`GenerationEvent::Final`] before that, and a stream
/// ending without one is treated as an upstream failure.
#[async_trait]
pub trait GenerationSource: Send {
    /// Pulls the next upstream event.
    async fn next_event(&mut self) -> Option<Result<GenerationEvent, StreamError>>;
}

/// Builds a [`GenerationSource`] for an accepted generation request.
pub trait SourceFactory: Send + Sync {
    /// Creates a source for `key` with caller-supplied parameters.
    ///
    /// # Errors
    ///
    /// [`StreamError::Upstream`] when the backend rejects the request
    /// outright (bad parameters, unavailable model).
    fn create(&self, key: &JobKey, params: &Value)
        -> Result<Box<dyn GenerationSource>, StreamError>;
}

/// Destination for the final generated payload.
///
/// Persisting happens after the upstream `Final` event and before the
/// `Complete` frame is published, so a client that sees `Complete` can
/// rely on the content being durable.
#[async_trait]
pub trait ContentSink: Send + Sync {
    /// Persists the final payload for `key`.
    ///
    /// # Errors
    ///
    /// [`StreamError::Persistence`] when the save fails; the job then
    /// terminates with an `Error` frame.
    async fn persist(&self, key: &JobKey, payload: &Value) -> Result<(), StreamError>;
}

/// Sink that logs the final payload and discards it.
///
/// For tests and deployments where durability is handled outside this
/// service.
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl ContentSink for NullSink {
    async fn persist(&self, key: &JobKey, _payload: &Value) -> Result<(), StreamError> {
        tracing::debug!(key = %key, "discarding final payload (null sink)");
        Ok(())
    }
}

/// Source that replays a fixed sequence of events.
///
/// # Examples
///
/// ```
/// use genstream::generator::{GenerationSource, ScriptedSource};
/// use genstream::types::{GenerationEvent, Usage};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut source = ScriptedSource::new(vec![
///     Ok(GenerationEvent::Partial(json!("A"))),
///     Ok(GenerationEvent::Final {
///         payload: json!("AB"),
///         usage: Usage::default(),
///     }),
/// ]);
/// assert!(source.next_event().await.is_some());
/// assert!(source.next_event().await.is_some());
/// assert!(source.next_event().await.is_none());
/// # }
/// ```
pub struct ScriptedSource {
    events: std::vec::IntoIter<Result<GenerationEvent, StreamError>>,
}

impl ScriptedSource {
    /// Creates a source yielding `events` in order, then ending.
    pub fn new(events: Vec<Result<GenerationEvent, StreamError>>) -> Self {
        Self {
            events: events.into_iter(),
        }
    }
}

#[async_trait]
impl GenerationSource for ScriptedSource {
    async fn next_event(&mut self) -> Option<Result<GenerationEvent, StreamError>> {
        self.events.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn scripted_source_yields_in_order_then_ends() {
        let mut source = ScriptedSource::new(vec![
            Ok(GenerationEvent::Partial(json!("A"))),
            Err(StreamError::Upstream {
                message: "timeout".to_string(),
            }),
        ]);

        match source.next_event().await {
            Some(Ok(GenerationEvent::Partial(p))) => assert_eq!(p, json!("A")),
            other => panic!("expected partial, got: {other:?}"),
        }
        assert!(matches!(
            source.next_event().await,
            Some(Err(StreamError::Upstream { .. }))
        ));
        assert!(source.next_event().await.is_none());
    }

    #[tokio::test]
    async fn null_sink_accepts_any_payload() {
        let sink = NullSink;
        let key = JobKey::new("o", "m");
        sink.persist(&key, &json!({"text": "done"})).await.unwrap();
    }

    #[test]
    fn identity_extractor_passes_through() {
        let extract = identity_extractor();
        let payload = json!({"text": "AB", "n": 2});
        assert_eq!(extract(&payload), payload);
    }
}
