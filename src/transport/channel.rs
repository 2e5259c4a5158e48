//! Per-channel transcript log and resume streams.
//!
//! One [`ChannelWriter`] per channel (the job task), any number of
//! concurrent readers. Each reader is driven by its own cursor over the
//! shared append-only log, woken through a [`Notify`], so every reader
//! observes the same prefix-consistent frame sequence regardless of when
//! it attached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::ReceiverStream;

use crate::constants::FRAME_CHANNEL_CAPACITY;
use crate::error::StreamError;
use crate::types::Frame;

/// Stream of frames delivered to one resume reader.
pub type FrameStream = ReceiverStream<Frame>;

#[derive(Debug, Default)]
struct ChannelState {
    /// Append-only transcript. Frames are only ever pushed, never
    /// mutated, so a reader cursor stays valid across lock releases.
    log: RwLock<Vec<Frame>>,
    notify: Notify,
    closed: AtomicBool,
}

/// Table of live resumable channels, keyed by channel id.
///
/// Explicitly constructed and injected; typically held as
/// `Arc<ResumableChannels>` shared between the orchestrator and the HTTP
/// handlers.
///
/// # Examples
///
/// ```
/// use genstream::transport::ResumableChannels;
/// use genstream::types::Frame;
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use tokio_stream::StreamExt;
///
/// let channels = ResumableChannels::new();
/// let writer = channels.create("chan-1");
/// writer.publish(Frame::Complete {
///     module_key: "m".to_string(),
///     payload: json!("done"),
/// });
///
/// let mut stream = channels.resume("chan-1").unwrap();
/// let frame = stream.next().await.unwrap();
/// assert!(frame.is_terminal());
/// assert!(stream.next().await.is_none());
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ResumableChannels {
    channels: DashMap<String, Arc<ChannelState>>,
}

impl ResumableChannels {
    /// Creates an empty channel table.
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Creates a channel and returns its single writer.
    ///
    /// Channel ids are minted by the orchestrator (one per job), so a
    /// collision means a bug upstream; the old channel is replaced and a
    /// warning logged.
    pub fn create(&self, channel_id: &str) -> ChannelWriter {
        let state = Arc::new(ChannelState::default());
        if self
            .channels
            .insert(channel_id.to_string(), Arc::clone(&state))
            .is_some()
        {
            tracing::warn!(channel_id, "replacing existing channel with same id");
        }
        ChannelWriter {
            channel_id: channel_id.to_string(),
            state,
        }
    }

    /// Opens a resume stream over a channel.
    ///
    /// The stream always replays the full transcript from the first frame,
    /// then follows live publications; it ends after the terminal frame.
    ///
    /// # Errors
    ///
    /// [`StreamError::ChannelExpired`] when no channel exists under
    /// `channel_id` (expired or never created). A normal outcome for the
    /// caller to reconcile against the job record, not a failure.
    pub fn resume(&self, channel_id: &str) -> Result<FrameStream, StreamError> {
        let state = match self.channels.get(channel_id) {
            Some(entry) => Arc::clone(entry.value()),
            None => {
                return Err(StreamError::ChannelExpired {
                    channel_id: channel_id.to_string(),
                })
            }
        };
        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut cursor = 0usize;
            loop {
                // Arm the wakeup before draining so a publish between the
                // drain and the await is never missed. `notify_waiters`
                // only reaches enabled waiters.
                let mut notified = std::pin::pin!(state.notify.notified());
                notified.as_mut().enable();

                let batch: Vec<Frame> = {
                    let log = state.log.read();
                    log[cursor..].to_vec()
                };
                cursor += batch.len();
                for frame in batch {
                    if tx.send(frame).await.is_err() {
                        // Reader dropped the stream; nothing left to do.
                        return;
                    }
                }

                if state.closed.load(Ordering::Acquire) {
                    // The terminal frame may have landed between the drain
                    // and the closed check.
                    let remaining: Vec<Frame> = {
                        let log = state.log.read();
                        log[cursor..].to_vec()
                    };
                    for frame in remaining {
                        if tx.send(frame).await.is_err() {
                            return;
                        }
                    }
                    return;
                }

                notified.await;
            }
        });

        Ok(ReceiverStream::new(rx))
    }

    /// Removes a channel. Returns `true` if it existed.
    ///
    /// Readers already attached keep draining their queues; new resumes
    /// observe the channel as expired.
    pub fn remove(&self, channel_id: &str) -> bool {
        self.channels.remove(channel_id).is_some()
    }

    /// Returns `true` if a channel exists under `channel_id`.
    pub fn contains(&self, channel_id: &str) -> bool {
        self.channels.contains_key(channel_id)
    }

    /// Number of live channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns `true` if no channels are live.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Single producer handle for one channel.
#[derive(Debug)]
pub struct ChannelWriter {
    channel_id: String,
    state: Arc<ChannelState>,
}

impl ChannelWriter {
    /// The id of the channel this writer feeds.
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Appends a frame to the transcript and wakes all readers.
    ///
    /// A terminal frame closes the channel; anything published after that
    /// is dropped with a warning (exactly one terminal frame ends every
    /// transcript).
    pub fn publish(&self, frame: Frame) {
        if self.is_closed() {
            tracing::warn!(
                channel_id = %self.channel_id,
                %frame,
                "dropping frame published after channel close"
            );
            return;
        }
        let terminal = frame.is_terminal();
        {
            let mut log = self.state.log.write();
            log.push(frame);
        }
        if terminal {
            self.state.closed.store(true, Ordering::Release);
        }
        self.state.notify.notify_waiters();
    }

    /// Closes the channel without a terminal frame.
    ///
    /// Only used when the job task dies before it can publish one; readers
    /// see the transcript end where it stands.
    pub fn close(&self) {
        self.state.closed.store(true, Ordering::Release);
        self.state.notify.notify_waiters();
    }

    /// Returns `true` once a terminal frame was published or the channel
    /// was closed explicitly.
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;
    use tokio_stream::StreamExt;

    fn partial(text: &str) -> Frame {
        Frame::Partial {
            module_key: "m".to_string(),
            payload: json!(text),
        }
    }

    fn complete(text: &str) -> Frame {
        Frame::Complete {
            module_key: "m".to_string(),
            payload: json!(text),
        }
    }

    async fn collect(mut stream: FrameStream) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = stream.next().await {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn replay_after_completion_delivers_full_transcript() {
        let channels = ResumableChannels::new();
        let writer = channels.create("chan-1");
        writer.publish(partial("A"));
        writer.publish(partial("AB"));
        writer.publish(partial("ABC"));
        writer.publish(complete("ABC"));

        let frames = collect(channels.resume("chan-1").unwrap()).await;
        assert_eq!(
            frames,
            vec![
                partial("A"),
                partial("AB"),
                partial("ABC"),
                complete("ABC")
            ]
        );
    }

    #[tokio::test]
    async fn reader_attached_before_publishing_follows_live() {
        let channels = ResumableChannels::new();
        let writer = channels.create("chan-1");
        let stream = channels.resume("chan-1").unwrap();

        let publisher = tokio::spawn(async move {
            for text in ["A", "AB"] {
                writer.publish(partial(text));
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            writer.publish(complete("AB"));
        });

        let frames = collect(stream).await;
        publisher.await.unwrap();
        assert_eq!(frames, vec![partial("A"), partial("AB"), complete("AB")]);
    }

    #[tokio::test]
    async fn mid_stream_resume_replays_prefix_then_follows() {
        let channels = ResumableChannels::new();
        let writer = channels.create("chan-1");
        writer.publish(partial("A"));
        writer.publish(partial("AB"));

        let stream = channels.resume("chan-1").unwrap();
        writer.publish(complete("ABC"));

        let frames = collect(stream).await;
        assert_eq!(frames, vec![partial("A"), partial("AB"), complete("ABC")]);
    }

    #[tokio::test]
    async fn concurrent_readers_each_get_full_transcript() {
        let channels = ResumableChannels::new();
        let writer = channels.create("chan-1");
        writer.publish(partial("A"));

        let first = channels.resume("chan-1").unwrap();
        let second = channels.resume("chan-1").unwrap();
        writer.publish(complete("AB"));

        let expected = vec![partial("A"), complete("AB")];
        assert_eq!(collect(first).await, expected);
        assert_eq!(collect(second).await, expected);
    }

    #[tokio::test]
    async fn resume_unknown_channel_is_expired() {
        let channels = ResumableChannels::new();
        match channels.resume("nope") {
            Err(StreamError::ChannelExpired { channel_id }) => {
                assert_eq!(channel_id, "nope");
            }
            other => panic!("expected ChannelExpired, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn removed_channel_cannot_be_resumed() {
        let channels = ResumableChannels::new();
        let writer = channels.create("chan-1");
        writer.publish(complete("done"));

        assert!(channels.remove("chan-1"));
        assert!(!channels.remove("chan-1"));
        assert!(channels.resume("chan-1").is_err());
        assert!(channels.is_empty());
    }

    #[tokio::test]
    async fn publish_after_terminal_frame_is_dropped() {
        let channels = ResumableChannels::new();
        let writer = channels.create("chan-1");
        writer.publish(complete("done"));
        assert!(writer.is_closed());

        writer.publish(partial("late"));
        let frames = collect(channels.resume("chan-1").unwrap()).await;
        assert_eq!(frames, vec![complete("done")]);
    }

    #[tokio::test]
    async fn explicit_close_ends_readers_without_terminal_frame() {
        let channels = ResumableChannels::new();
        let writer = channels.create("chan-1");
        writer.publish(partial("A"));
        let stream = channels.resume("chan-1").unwrap();
        writer.close();

        let frames = collect(stream).await;
        assert_eq!(frames, vec![partial("A")]);
    }
}
