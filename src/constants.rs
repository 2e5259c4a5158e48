//! Constants for the streaming wire protocol and registry defaults.

use std::time::Duration;

/// Response header carrying the minted stream identifier for a new job.
pub const STREAM_ID_HEADER: &str = "x-stream-id";

/// Response header carrying the resumable channel identifier bound to a job.
pub const RESUMABLE_CHANNEL_ID_HEADER: &str = "x-resumable-channel-id";

/// Buffer capacity of the per-reader frame queue a resume stream is
/// served from. Small: readers that fall behind apply backpressure to
/// the forwarding task, never to the writer.
pub const FRAME_CHANNEL_CAPACITY: usize = 32;

/// Minimum interval between transmitted partial frames.
///
/// Terminal frames and explicit flushes are never subject to this interval.
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(150);

/// Age past which an `active` record is presumed abandoned and may be
/// superseded by a fresh `try_start`.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(300);

/// How long terminal records are retained before the housekeeping sweep
/// removes them.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60);
