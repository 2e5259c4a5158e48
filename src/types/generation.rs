//! Transient event model for the black-box generation source.
//!
//! The model/tool-calling backend is a black box that yields an ordered,
//! finite, non-restartable sequence of [`GenerationEvent`]s ending in
//! [`GenerationEvent::Final`]. These types never reach the wire; partial
//! payloads do, after extraction and throttling.

use serde_json::Value;
use std::fmt;

/// Token usage metadata reported by the upstream backend with the final
/// object. Logged at completion, not transmitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    /// Tokens consumed by the prompt.
    pub input_tokens: u64,
    /// Tokens produced by the model.
    pub output_tokens: u64,
}

/// Lifecycle of one tool invocation inside a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolState {
    /// The model requested the tool; execution has not finished.
    Requested,
    /// The tool ran and returned a result.
    Succeeded,
    /// The tool ran and failed.
    Failed,
}

impl fmt::Display for ToolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "requested"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A tool call observed during one job.
///
/// Owned exclusively by the orchestrator for the duration of the job and
/// used only for caller-visible status reporting (log lines); tool
/// invocations are not persisted and never enter the frame protocol.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// Tool name as reported by the backend.
    pub name: String,
    /// Input the model supplied to the tool.
    pub input: Value,
    /// Current lifecycle state.
    pub state: ToolState,
}

impl ToolInvocation {
    /// Creates an invocation in the `Requested` state.
    pub fn requested(name: impl Into<String>, input: Value) -> Self {
        Self {
            name: name.into(),
            input,
            state: ToolState::Requested,
        }
    }
}

/// One item yielded by the black-box generation source.
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    /// An in-progress partial object. Passed through the module-specific
    /// extraction function to produce a partial frame payload.
    Partial(Value),
    /// A tool invocation started or changed state.
    Tool(ToolInvocation),
    /// The final object. Exactly one ends every successful sequence; the
    /// source yields nothing after it.
    Final {
        /// The complete payload.
        payload: Value,
        /// Upstream usage metadata.
        usage: Usage,
    },
}
