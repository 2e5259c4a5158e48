//! Rate-limited, deduplicating transmission of partial payloads.
//!
//! [`ThrottledEmitter`] decides which candidate partial payloads actually
//! get transmitted, bounding frequency to a minimum interval while
//! guaranteeing the last offered payload is delivered by [`flush`].
//! Terminal frames never pass through the emitter at all: the
//! orchestrator calls `flush` and then publishes `Complete`/`Error`
//! directly, so termination can never be suppressed by payload-equality
//! dedup or by the interval.
//!
//! This is a plain state machine, `{last_sent, last_sent_at, pending}`,
//! with no I/O and no locks. It is only ever driven by the single task
//! running one job.

use serde_json::Value;
use std::time::{Duration, Instant};

use crate::constants::DEFAULT_THROTTLE_INTERVAL;

/// Throttling state machine for one job's partial payloads.
///
/// # Rules
///
/// - A payload identical to the last transmitted one is suppressed and
///   clears any pending payload (the receiver already has this state).
/// - If the interval has elapsed (or nothing was sent yet), the payload
///   transmits immediately.
/// - Otherwise the payload is held as pending, superseding any previously
///   held payload; stale partials are never queued.
/// - [`flush`](Self::flush) transmits the pending payload unconditionally,
///   interval notwithstanding (still suppressing an exact duplicate of the
///   last transmitted payload).
///
/// # Examples
///
/// ```
/// use genstream::emitter::ThrottledEmitter;
/// use serde_json::json;
/// use std::time::Duration;
///
/// let mut emitter = ThrottledEmitter::new(Duration::from_millis(150));
/// assert_eq!(emitter.offer(json!("A")), Some(json!("A"))); // first: sent
/// assert_eq!(emitter.offer(json!("AB")), None);            // held
/// assert_eq!(emitter.offer(json!("ABC")), None);           // supersedes "AB"
/// assert_eq!(emitter.flush(), Some(json!("ABC")));         // flushed
/// assert_eq!(emitter.flush(), None);                       // nothing pending
/// ```
#[derive(Debug)]
pub struct ThrottledEmitter {
    interval: Duration,
    last_sent: Option<Value>,
    last_sent_at: Option<Instant>,
    pending: Option<Value>,
}

impl ThrottledEmitter {
    /// Creates an emitter with the given minimum transmission interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: None,
            last_sent_at: None,
            pending: None,
        }
    }

    /// Offers a candidate partial payload.
    ///
    /// Returns the payload to transmit now, or `None` if it was
    /// suppressed as a duplicate or held as pending.
    pub fn offer(&mut self, payload: Value) -> Option<Value> {
        if self.last_sent.as_ref() == Some(&payload) {
            // Receiver already has exactly this state; drop any older
            // pending payload too, it is staler than what was sent.
            if self.pending.take().is_some() {
                tracing::debug!("pending partial superseded by duplicate of last sent");
            }
            return None;
        }

        if self.interval_elapsed() {
            self.pending = None;
            self.mark_sent(payload.clone());
            Some(payload)
        } else {
            tracing::trace!("holding partial until throttle interval elapses");
            self.pending = Some(payload);
            None
        }
    }

    /// Flushes the pending payload, if any, regardless of the interval.
    ///
    /// Always invoked immediately before the terminal frame so the last
    /// offered partial is never lost.
    pub fn flush(&mut self) -> Option<Value> {
        let payload = self.pending.take()?;
        if self.last_sent.as_ref() == Some(&payload) {
            return None;
        }
        self.mark_sent(payload.clone());
        Some(payload)
    }

    /// Returns `true` if a payload is currently held as pending.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn interval_elapsed(&self) -> bool {
        match self.last_sent_at {
            None => true,
            Some(at) => at.elapsed() >= self.interval,
        }
    }

    fn mark_sent(&mut self, payload: Value) {
        self.last_sent = Some(payload);
        self.last_sent_at = Some(Instant::now());
    }
}

impl Default for ThrottledEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_INTERVAL)
    }
}
