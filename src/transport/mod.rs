//! Resumable frame delivery.
//!
//! The transport keeps a per-channel append-only transcript of every
//! published [`Frame`](crate::types::Frame). Resuming a channel always
//! replays the full transcript from the beginning and then follows live,
//! so a reconnecting client reconstructs the exact frame sequence with no
//! gaps and no reordering, at the cost of re-sending frames it may have
//! already seen. Payloads are full snapshots, so redelivery is idempotent.

pub mod channel;

pub use channel::{ChannelWriter, FrameStream, ResumableChannels};
