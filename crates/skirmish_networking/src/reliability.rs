//! # Reliability Layer
//!
//! At-least-once delivery on top of a best-effort bus.
//!
//! - [`Outbox`]: critical messages wait here until acknowledged, and are
//!   retransmitted on a bounded exponential backoff
//! - [`Deduplicator`]: one sliding window per sender discards replays
//!
//! Sequence numbers are per sender and start at 1. A sender that runs
//! through all of `u32` starts again at 1 and must rejoin under a new epoch
//! so receivers reset their windows; see [`Outbox::take_wrapped`].

use serde::Deserialize;
use skirmish_shared::{Timestamp, UnitId};
use std::collections::HashMap;
use std::time::Duration;

/// Retransmission and dedup parameters (`[reliability]`).
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReliabilityConfig {
    /// First retransmit delay.
    pub retry_interval_ms: u64,
    /// Multiplier applied after each attempt.
    pub backoff_factor: f64,
    /// Ceiling for the retransmit delay.
    pub max_retry_interval_ms: u64,
    /// Sends (first one included) before a message is abandoned.
    pub max_attempts: u32,
    /// Width of the dedup window in sequences. At most 64.
    pub dedup_window: u32,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 500,
            backoff_factor: 1.5,
            max_retry_interval_ms: 2000,
            max_attempts: 10,
            dedup_window: 64,
        }
    }
}

impl ReliabilityConfig {
    /// Delay before retransmission number `attempt` (1-based).
    #[must_use]
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let ms = (self.retry_interval_ms as f64) * self.backoff_factor.max(1.0).powi(exponent);
        let capped = ms.min(self.max_retry_interval_ms as f64).max(1.0);
        Duration::from_millis(capped as u64)
    }
}

/// A critical message awaiting its ack.
#[derive(Clone, Debug)]
struct PendingMessage {
    sequence: u32,
    topic: String,
    bytes: Vec<u8>,
    attempts: u32,
    next_send: Timestamp,
}

/// Something [`Outbox::due`] wants sent again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Retransmit {
    /// Sequence of the message.
    pub sequence: u32,
    /// Topic to publish on.
    pub topic: String,
    /// Encoded message.
    pub bytes: Vec<u8>,
    /// Send number (2 for the first retransmit).
    pub attempt: u32,
}

/// Outgoing sequence allocator plus retransmit queue.
pub struct Outbox {
    config: ReliabilityConfig,
    next_sequence: u32,
    pending: Vec<PendingMessage>,
    abandoned: u64,
    wrapped: bool,
}

impl Outbox {
    /// Creates an empty outbox.
    #[must_use]
    pub fn new(config: ReliabilityConfig) -> Self {
        Self {
            config,
            next_sequence: 1,
            pending: Vec::with_capacity(16),
            abandoned: 0,
            wrapped: false,
        }
    }

    /// Allocates the next sequence number. Never returns 0.
    pub fn next_sequence(&mut self) -> u32 {
        let seq = self.next_sequence;
        self.next_sequence = self.next_sequence.checked_add(1).unwrap_or_else(|| {
            tracing::warn!("sequence space exhausted, restarting at 1");
            self.wrapped = true;
            1
        });
        seq
    }

    /// Returns true once after the counter went back to 1.
    ///
    /// Receivers see the restarted sequences as stale until told otherwise.
    pub fn take_wrapped(&mut self) -> bool {
        std::mem::take(&mut self.wrapped)
    }

    #[cfg(test)]
    pub(crate) fn skip_to(&mut self, next: u32) {
        self.next_sequence = next.max(1);
    }

    /// Starts tracking a message that was just sent.
    pub fn track(&mut self, now: Timestamp, sequence: u32, topic: &str, bytes: Vec<u8>) {
        self.pending.push(PendingMessage {
            sequence,
            topic: topic.to_string(),
            bytes,
            attempts: 1,
            next_send: now + self.config.retry_delay(1),
        });
    }

    /// Stops retransmitting `sequence`. Returns false if it was not pending.
    pub fn acknowledge(&mut self, sequence: u32) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.sequence != sequence);
        before != self.pending.len()
    }

    /// Whether `sequence` is still waiting for an ack.
    #[must_use]
    pub fn is_pending(&self, sequence: u32) -> bool {
        self.pending.iter().any(|p| p.sequence == sequence)
    }

    /// Messages awaiting an ack.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Messages given up on so far.
    #[must_use]
    pub const fn abandoned(&self) -> u64 {
        self.abandoned
    }

    /// Collects messages whose retransmit timer expired.
    ///
    /// Messages that already used all attempts are dropped with a warning.
    pub fn due(&mut self, now: Timestamp) -> Vec<Retransmit> {
        let config = &self.config;
        let mut out = Vec::new();
        let mut abandoned = 0;

        self.pending.retain_mut(|p| {
            if now < p.next_send {
                return true;
            }
            if p.attempts >= config.max_attempts {
                tracing::warn!(seq = p.sequence, topic = %p.topic, attempts = p.attempts, "critical message abandoned without ack");
                abandoned += 1;
                return false;
            }
            p.attempts += 1;
            p.next_send = now + config.retry_delay(p.attempts);
            out.push(Retransmit {
                sequence: p.sequence,
                topic: p.topic.clone(),
                bytes: p.bytes.clone(),
                attempt: p.attempts,
            });
            true
        });

        self.abandoned += abandoned;
        out
    }

    /// Makes every pending message due at `now` with a fresh attempt budget.
    ///
    /// Called after a reconnect so nothing waits out a long backoff.
    pub fn rearm(&mut self, now: Timestamp) {
        for p in &mut self.pending {
            p.attempts = 1;
            p.next_send = now;
        }
    }

    /// Drops everything pending. Sequence allocation continues.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Outcome of a dedup check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    /// First time seen; process it.
    New,
    /// Inside the window and already seen.
    Duplicate,
    /// Below the window floor.
    Stale,
}

/// Sliding window over one sender's sequences.
///
/// Tracks the highest sequence seen and a bitmap of the ones below it.
#[derive(Clone, Copy, Debug)]
pub struct DedupWindow {
    highest: u32,
    seen: u64,
    width: u32,
}

impl DedupWindow {
    /// Empty window of `width` sequences (clamped to 1..=64).
    #[must_use]
    pub fn new(width: u32) -> Self {
        Self {
            highest: 0,
            seen: 0,
            width: width.clamp(1, 64),
        }
    }

    /// Classifies `sequence` and records it if new.
    pub fn check(&mut self, sequence: u32) -> Freshness {
        if self.highest == 0 || sequence > self.highest {
            let shift = sequence.wrapping_sub(self.highest);
            self.seen = if self.highest == 0 || shift >= 64 {
                0
            } else {
                self.seen << shift
            };
            self.seen |= 1;
            self.highest = sequence;
            return Freshness::New;
        }

        let offset = self.highest - sequence;
        if offset >= self.width {
            return Freshness::Stale;
        }
        let bit = 1u64 << offset;
        if self.seen & bit != 0 {
            Freshness::Duplicate
        } else {
            self.seen |= bit;
            Freshness::New
        }
    }

    /// Forgets everything (the sender restarted).
    pub fn reset(&mut self) {
        self.highest = 0;
        self.seen = 0;
    }

    /// Highest sequence seen.
    #[must_use]
    pub const fn highest(&self) -> u32 {
        self.highest
    }
}

/// Per-sender dedup windows.
pub struct Deduplicator {
    width: u32,
    windows: HashMap<UnitId, DedupWindow>,
}

impl Deduplicator {
    /// Creates an empty deduplicator.
    #[must_use]
    pub fn new(width: u32) -> Self {
        Self {
            width,
            windows: HashMap::new(),
        }
    }

    /// Classifies a `(sender, sequence)` pair.
    pub fn check(&mut self, sender: UnitId, sequence: u32) -> Freshness {
        let width = self.width;
        self.windows
            .entry(sender)
            .or_insert_with(|| DedupWindow::new(width))
            .check(sequence)
    }

    /// Forgets a sender's history, then records `sequence`.
    pub fn restart(&mut self, sender: UnitId, sequence: u32) {
        let width = self.width;
        let window = self.windows.entry(sender).or_insert_with(|| DedupWindow::new(width));
        window.reset();
        window.check(sequence);
    }

    /// Drops a sender.
    pub fn forget(&mut self, sender: UnitId) {
        self.windows.remove(&sender);
    }
}
