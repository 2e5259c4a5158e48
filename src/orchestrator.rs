//! Job lifecycle driver.
//!
//! [`GenerationOrchestrator::start`] atomically claims the job key,
//! binds a resumable channel, and spawns one tokio task that drives the
//! black-box source to completion: partials flow through the extractor
//! and the throttled emitter into the channel transcript and the
//! registry buffer; the final object is flushed, persisted, and sealed
//! with a `Complete` frame. Every failure path, upstream errors, sink
//! errors, panics, a source that ends without a final object, terminates
//! in exactly one `Error` frame plus a terminal status write.
//!
//! Client disconnects never cancel the task; the only way a running job
//! stops early is being superseded on its key, which it observes as
//! [`StreamError::Superseded`] from the registry and answers by closing
//! its channel without another frame.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use uuid::Uuid;

use crate::constants::{DEFAULT_RETENTION, DEFAULT_THROTTLE_INTERVAL};
use crate::emitter::ThrottledEmitter;
use crate::error::StreamError;
use crate::generator::{ContentSink, Extractor, GenerationSource};
use crate::registry::{StartOutcome, StreamRegistry};
use crate::transport::{ChannelWriter, FrameStream, ResumableChannels};
use crate::types::{
    Frame, GenerationEvent, JobKey, JobRecord, JobStatus, ToolInvocation, ToolState, Usage,
};

/// Tunables for job tasks.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Minimum interval between transmitted partial frames.
    pub throttle_interval: Duration,
    /// How long a channel's transcript stays resumable after the job
    /// reaches a terminal state.
    pub channel_retention: Duration,
}

impl OrchestratorConfig {
    /// Sets the partial-frame throttle interval.
    pub fn with_throttle_interval(mut self, throttle_interval: Duration) -> Self {
        self.throttle_interval = throttle_interval;
        self
    }

    /// Sets the post-terminal channel retention window.
    pub fn with_channel_retention(mut self, channel_retention: Duration) -> Self {
        self.channel_retention = channel_retention;
        self
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
            channel_retention: DEFAULT_RETENTION,
        }
    }
}

/// Everything a caller needs to follow a freshly started job.
#[derive(Debug)]
pub struct JobHandle {
    /// Opaque identifier minted for this job.
    pub stream_id: String,
    /// Channel id for later resume requests.
    pub resumable_channel_id: String,
    /// Live frame stream, opened at the start of the transcript before
    /// generation begins, so the caller misses nothing.
    pub frames: FrameStream,
}

/// Drives generation jobs. Shared as `Arc<GenerationOrchestrator>`
/// between request handlers.
pub struct GenerationOrchestrator {
    registry: Arc<dyn StreamRegistry>,
    channels: Arc<ResumableChannels>,
    sink: Arc<dyn ContentSink>,
    config: OrchestratorConfig,
}

impl GenerationOrchestrator {
    /// Creates an orchestrator over injected collaborators.
    pub fn new(
        registry: Arc<dyn StreamRegistry>,
        channels: Arc<ResumableChannels>,
        sink: Arc<dyn ContentSink>,
    ) -> Self {
        Self {
            registry,
            channels,
            sink,
            config: OrchestratorConfig::default(),
        }
    }

    /// Sets the orchestrator tunables.
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// The shared job registry.
    pub fn registry(&self) -> &Arc<dyn StreamRegistry> {
        &self.registry
    }

    /// The shared channel table.
    pub fn channels(&self) -> &Arc<ResumableChannels> {
        &self.channels
    }

    /// Starts a generation job for `key`.
    ///
    /// Claims the key atomically, creates the resumable channel, spawns
    /// the job task, and returns a [`JobHandle`] whose `frames` stream
    /// begins at the first frame.
    ///
    /// # Errors
    ///
    /// - [`StreamError::DuplicateJob`] when a fresh active job already
    ///   owns the key; the error carries the existing job's ids so the
    ///   caller can resume it instead.
    /// - [`StreamError::Persistence`] when the registry cannot confirm
    ///   uniqueness (fails closed; no task is spawned).
    pub async fn start(
        &self,
        key: JobKey,
        source: Box<dyn GenerationSource>,
        extractor: Extractor,
    ) -> Result<JobHandle, StreamError> {
        let channel_id = Uuid::new_v4().to_string();
        let mut record = JobRecord::new(key);
        record.resumable_channel_id = Some(channel_id.clone());

        let record = match self.registry.try_start(record).await? {
            StartOutcome::Started(record) => record,
            StartOutcome::AlreadyActive(existing) => {
                tracing::debug!(
                    owner_id = %existing.owner_id,
                    module_key = %existing.module_key,
                    stream_id = %existing.stream_id,
                    "rejecting duplicate generation request"
                );
                return Err(StreamError::DuplicateJob {
                    owner_id: existing.owner_id,
                    module_key: existing.module_key,
                    stream_id: existing.stream_id,
                    resumable_channel_id: existing.resumable_channel_id,
                });
            }
        };

        let writer = self.channels.create(&channel_id);
        let frames = self.channels.resume(&channel_id)?;

        let stream_id = record.stream_id.clone();
        tracing::info!(
            owner_id = %record.owner_id,
            module_key = %record.module_key,
            stream_id = %stream_id,
            channel_id = %channel_id,
            "generation job started"
        );

        let task = JobTask {
            registry: Arc::clone(&self.registry),
            sink: Arc::clone(&self.sink),
            writer,
            key: record.key(),
            stream_id: stream_id.clone(),
            emitter: ThrottledEmitter::new(self.config.throttle_interval),
            extractor,
            tools: Vec::new(),
        };
        let channels = Arc::clone(&self.channels);
        let retention = self.config.channel_retention;
        let task_channel_id = channel_id.clone();
        tokio::spawn(async move {
            task.drive(source).await;
            tokio::time::sleep(retention).await;
            channels.remove(&task_channel_id);
        });

        Ok(JobHandle {
            stream_id,
            resumable_channel_id: channel_id,
            frames,
        })
    }
}

/// State owned by one job's tokio task.
struct JobTask {
    registry: Arc<dyn StreamRegistry>,
    sink: Arc<dyn ContentSink>,
    writer: ChannelWriter,
    key: JobKey,
    stream_id: String,
    emitter: ThrottledEmitter,
    extractor: Extractor,
    tools: Vec<ToolInvocation>,
}

impl JobTask {
    /// Runs the source to completion and seals the job, routing every
    /// failure mode through [`fail`](Self::fail).
    async fn drive(mut self, mut source: Box<dyn GenerationSource>) {
        let outcome = std::panic::AssertUnwindSafe(self.run(source.as_mut()))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(StreamError::Superseded)) => {
                tracing::info!(
                    key = %self.key,
                    stream_id = %self.stream_id,
                    "job superseded; stopping without further frames"
                );
                self.writer.close();
            }
            Ok(Err(err)) => self.fail(err).await,
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                tracing::error!(
                    key = %self.key,
                    stream_id = %self.stream_id,
                    panic = %detail,
                    "generation task panicked"
                );
                self.fail(StreamError::Upstream {
                    message: "generation task failed unexpectedly".to_string(),
                })
                .await;
            }
        }
    }

    async fn run(&mut self, source: &mut dyn GenerationSource) -> Result<(), StreamError> {
        while let Some(event) = source.next_event().await {
            match event? {
                GenerationEvent::Partial(snapshot) => {
                    let payload = (self.extractor)(&snapshot);
                    if let Some(payload) = self.emitter.offer(payload) {
                        self.transmit_partial(payload).await?;
                    }
                }
                GenerationEvent::Tool(invocation) => self.note_tool(invocation),
                GenerationEvent::Final { payload, usage } => {
                    return self.finish(payload, usage).await;
                }
            }
        }
        Err(StreamError::Upstream {
            message: "generation ended without a final object".to_string(),
        })
    }

    /// Publishes one partial frame and mirrors it into the registry
    /// buffer. Buffer failures are tolerated; losing ownership is not.
    async fn transmit_partial(&mut self, payload: Value) -> Result<(), StreamError> {
        match self
            .registry
            .update_buffer(&self.key, &self.stream_id, payload.clone())
            .await
        {
            Ok(()) => {}
            Err(StreamError::Superseded) => return Err(StreamError::Superseded),
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "buffer update failed");
            }
        }
        self.writer.publish(Frame::Partial {
            module_key: self.key.module_key.clone(),
            payload,
        });
        Ok(())
    }

    /// Records a tool transition for caller-visible status reporting.
    /// Invocations are transient and never enter the frame protocol.
    fn note_tool(&mut self, invocation: ToolInvocation) {
        tracing::info!(
            key = %self.key,
            tool = %invocation.name,
            state = %invocation.state,
            "tool invocation"
        );
        if invocation.state != ToolState::Requested {
            if let Some(open) = self
                .tools
                .iter_mut()
                .rev()
                .find(|t| t.name == invocation.name && t.state == ToolState::Requested)
            {
                open.state = invocation.state;
                return;
            }
        }
        self.tools.push(invocation);
    }

    /// Flush, persist, seal. `Complete` is only published once the final
    /// payload is durable and the terminal status is recorded.
    async fn finish(&mut self, payload: Value, usage: Usage) -> Result<(), StreamError> {
        if let Some(pending) = self.emitter.flush() {
            self.transmit_partial(pending).await?;
        }
        self.sink.persist(&self.key, &payload).await?;
        self.registry
            .set_status(&self.key, &self.stream_id, JobStatus::Completed)
            .await?;
        self.writer.publish(Frame::Complete {
            module_key: self.key.module_key.clone(),
            payload,
        });
        tracing::info!(
            key = %self.key,
            stream_id = %self.stream_id,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            tool_invocations = self.tools.len(),
            "generation completed"
        );
        Ok(())
    }

    /// Terminal error path: record the status, then publish exactly one
    /// `Error` frame with a client-safe message.
    async fn fail(&self, err: StreamError) {
        tracing::error!(
            key = %self.key,
            stream_id = %self.stream_id,
            error = %err,
            "generation failed"
        );
        match self
            .registry
            .set_status(&self.key, &self.stream_id, JobStatus::Error)
            .await
        {
            Ok(()) => {}
            Err(StreamError::Superseded) => {
                // A newer job owns the key; our error is moot.
                self.writer.close();
                return;
            }
            Err(status_err) => {
                tracing::error!(
                    key = %self.key,
                    error = %status_err,
                    "failed to record terminal error status"
                );
            }
        }
        self.writer.publish(Frame::Error {
            module_key: self.key.module_key.clone(),
            error: err.frame_message(),
        });
    }
}
