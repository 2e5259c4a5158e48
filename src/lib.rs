//! Resumable AI-generation streaming core.
//!
//! `genstream` runs long-lived generation jobs that stream partial results
//! to clients over a throttled frame protocol, survive disconnects, and
//! guarantee at most one active job per `(owner, module)` key.
//!
//! # Overview
//!
//! A job is accepted through [`orchestrator::GenerationOrchestrator::start`],
//! which atomically claims the job key in the [`registry`], binds a
//! resumable channel in the [`transport`], and spawns one task that drives
//! a black-box [`generator::GenerationSource`] to completion. Partial
//! payloads pass through a module-specific extraction function and the
//! [`emitter::ThrottledEmitter`] before being published as `partial`
//! frames; exactly one terminal frame (`complete` or `error`) ends every
//! job. A client that disconnects resumes by channel: the full transcript
//! is replayed from the first frame, then followed live.
//!
//! # Module Organization
//!
//! - [`types`] - Frame protocol, job records, upstream event model
//! - [`emitter`] - Rate-limited, deduplicating partial transmission
//! - [`registry`] - Durable job records over pluggable versioned KV storage
//! - [`transport`] - Per-channel transcript logs and resume streams
//! - [`generator`] - Seams to the black-box model/tool backend
//! - [`orchestrator`] - Job lifecycle driver
//! - [`http`] - Illustrative axum surface (`/generate`, `/resume`, `/status`)
//! - [`error`] - Crate-level error taxonomy
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//! use genstream::generator::{identity_extractor, NullSink, ScriptedSource};
//! use genstream::orchestrator::GenerationOrchestrator;
//! use genstream::registry::memory::InMemoryRegistry;
//! use genstream::transport::ResumableChannels;
//! use genstream::types::{GenerationEvent, JobKey, Usage};
//! use serde_json::json;
//! use tokio_stream::StreamExt;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), genstream::error::StreamError> {
//! let orchestrator = GenerationOrchestrator::new(
//!     Arc::new(InMemoryRegistry::new()),
//!     Arc::new(ResumableChannels::new()),
//!     Arc::new(NullSink),
//! );
//!
//! let source = Box::new(ScriptedSource::new(vec![
//!     Ok(GenerationEvent::Partial(json!("Hel"))),
//!     Ok(GenerationEvent::Final {
//!         payload: json!("Hello"),
//!         usage: Usage::default(),
//!     }),
//! ]));
//!
//! let mut handle = orchestrator
//!     .start(JobKey::new("owner-1", "summary"), source, identity_extractor())
//!     .await?;
//! while let Some(frame) = handle.frames.next().await {
//!     println!("{frame}");
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod constants;
pub mod emitter;
pub mod error;
pub mod generator;
pub mod http;
pub mod orchestrator;
pub mod registry;
pub mod transport;
pub mod types;

pub use emitter::ThrottledEmitter;
pub use error::StreamError;
pub use orchestrator::{GenerationOrchestrator, JobHandle, OrchestratorConfig};
pub use registry::{RegistryConfig, StartOutcome, StreamRegistry};
pub use transport::{ChannelWriter, FrameStream, ResumableChannels};
pub use types::{Frame, JobKey, JobRecord, JobStatus};
