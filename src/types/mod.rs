//! Wire and domain types for the generation streaming protocol.
//!
//! [`frame`] holds the wire protocol unit; [`job`] holds the job key and
//! persisted record model; [`generation`] holds the transient event model
//! produced by the black-box generation source.

pub mod frame;
pub mod generation;
pub mod job;

pub use frame::Frame;
pub use generation::{GenerationEvent, ToolInvocation, ToolState, Usage};
pub use job::{supersede, JobKey, JobRecord, JobStatus};
