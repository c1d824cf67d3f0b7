//! # Participant Nodes
//!
//! Each node owns one transport, one state machine and one session manager,
//! and is driven by calling `tick(now)` from a single thread. Deliveries are
//! consumed in the order the transport yields them, so the state machine
//! sees one total order of events.
//!
//! - [`ArbiterServer`]: adjudicates unit events, broadcasts state
//! - [`UnitClient`]: runs the unit machine, retransmits critical events
//! - [`ConsoleClient`]: read-only [`MatchView`] for the operator display

mod arbiter;
mod console;
mod unit;

pub use arbiter::ArbiterServer;
pub use console::{ConsoleClient, MatchView, UnitView};
pub use unit::UnitClient;

use crate::error::{NetError, NetResult, ProtocolError};
use crate::protocol::{Codec, Envelope, Message, MessageKind};
use crate::reliability::{DedupWindow, Freshness};
use crate::session::{SessionAction, SessionManager};
use crate::transport::Transport;
use skirmish_shared::{Timestamp, UnitId};

/// Per-node counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Messages decoded and accepted.
    pub received: u64,
    /// Messages dropped as undecodable or misaddressed.
    pub malformed: u64,
    /// Messages dropped as replays.
    pub duplicates: u64,
    /// Messages published.
    pub sent: u64,
    /// Publishes that failed.
    pub send_failures: u64,
    /// Critical messages retransmitted.
    pub retransmits: u64,
    /// Resynchronizations requested or performed.
    pub resyncs: u64,
}

/// Transport plus codec for one sender identity.
pub(crate) struct Endpoint<T> {
    transport: T,
    codec: Codec,
    sender: UnitId,
    stats: NodeStats,
}

impl<T: Transport> Endpoint<T> {
    pub(crate) fn new(transport: T, sender: UnitId) -> Self {
        Self {
            transport,
            codec: Codec::new(),
            sender,
            stats: NodeStats::default(),
        }
    }

    pub(crate) fn subscribe_all(&mut self, filters: &[&str]) -> NetResult<()> {
        for filter in filters {
            self.transport.subscribe(filter)?;
        }
        Ok(())
    }

    pub(crate) fn encode(&mut self, sequence: u32, message: &Message) -> NetResult<Vec<u8>> {
        Ok(self.codec.encode(self.sender, sequence, message)?)
    }

    /// Publishes already encoded bytes. Failures are counted and logged.
    pub(crate) fn publish(&mut self, topic: &str, bytes: &[u8]) -> bool {
        match self.transport.publish(topic, bytes) {
            Ok(()) => {
                self.stats.sent += 1;
                true
            }
            Err(e) => {
                self.stats.send_failures += 1;
                tracing::debug!(topic, error = %e, "publish failed");
                false
            }
        }
    }

    /// Encodes and publishes.
    pub(crate) fn send(&mut self, topic: &str, sequence: u32, message: &Message) -> bool {
        match self.encode(sequence, message) {
            Ok(bytes) => self.publish(topic, &bytes),
            Err(e) => {
                tracing::warn!(topic, kind = message.kind().name(), error = %e, "cannot encode message");
                self.stats.send_failures += 1;
                false
            }
        }
    }

    /// Next decodable envelope. Undecodable deliveries are logged and skipped.
    pub(crate) fn receive(&mut self) -> Option<Envelope> {
        loop {
            let delivery = self.transport.poll()?;
            match Codec::decode(&delivery.topic, &delivery.payload) {
                Ok(envelope) => {
                    self.stats.received += 1;
                    return Some(envelope);
                }
                Err(e) => {
                    self.stats.malformed += 1;
                    log_malformed(&delivery.topic, &e);
                }
            }
        }
    }

    /// Runs the session state machine until it settles.
    ///
    /// Returns the actions the caller must react to beyond link handling.
    pub(crate) fn supervise(&mut self, session: &mut SessionManager, now: Timestamp) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        // Disconnected -> Connecting -> Connected -> heartbeat at most.
        for _ in 0..4 {
            let action = session.poll(now, self.transport.is_connected());
            match action {
                SessionAction::Idle => break,
                SessionAction::Reconnect => {
                    if let Err(e) = self.transport.reconnect() {
                        tracing::debug!(error = %e, "reconnect failed");
                        break;
                    }
                }
                SessionAction::Lost { silent_ms } => {
                    tracing::warn!(sender = %self.sender, "{}", NetError::SessionLost { silent_ms });
                    actions.push(action);
                }
                SessionAction::Established | SessionAction::SendHeartbeat => actions.push(action),
            }
            if action == SessionAction::SendHeartbeat {
                break;
            }
        }
        actions
    }

    pub(crate) const fn stats(&self) -> NodeStats {
        self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut NodeStats {
        &mut self.stats
    }

    pub(crate) const fn transport(&self) -> &T {
        &self.transport
    }
}

fn log_malformed(topic: &str, error: &ProtocolError) {
    match error {
        ProtocolError::IdentityMismatch { .. } => tracing::warn!(topic, %error, "spoofed message dropped"),
        _ => tracing::warn!(topic, %error, "malformed message dropped"),
    }
}

/// How a message from the arbiter should be treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FeedCheck {
    /// Process it.
    Accept,
    /// Replay; drop it.
    Duplicate,
    /// The arbiter restarted; state must be resynchronized.
    Restarted,
}

/// Receive-side bookkeeping for the arbiter's stream: dedup plus the
/// broadcast revision used for gap detection.
pub(crate) struct ArbiterFeed {
    window: DedupWindow,
    last_revision: u64,
}

impl ArbiterFeed {
    pub(crate) fn new(width: u32) -> Self {
        Self {
            window: DedupWindow::new(width),
            last_revision: 0,
        }
    }

    pub(crate) fn check(&mut self, kind: MessageKind, sequence: u32) -> FeedCheck {
        match (self.window.check(sequence), kind.is_deduplicated()) {
            (Freshness::New, _) | (Freshness::Duplicate, false) => FeedCheck::Accept,
            (Freshness::Duplicate | Freshness::Stale, true) => FeedCheck::Duplicate,
            (Freshness::Stale, false) => {
                self.window.reset();
                self.window.check(sequence);
                self.last_revision = 0;
                FeedCheck::Restarted
            }
        }
    }

    /// Records a broadcast revision. Errors when revisions were skipped.
    pub(crate) fn observe(&mut self, revision: u64) -> NetResult<()> {
        let expected = self.last_revision + 1;
        let gap = self.last_revision != 0 && revision > expected;
        self.last_revision = self.last_revision.max(revision);
        if gap {
            Err(NetError::SequenceGap {
                sender: UnitId::ARBITER,
                expected,
                received: revision,
            })
        } else {
            Ok(())
        }
    }

    /// Adopts the revision of a full snapshot.
    pub(crate) fn resync(&mut self, revision: u64) {
        self.last_revision = revision;
    }

    pub(crate) const fn last_revision(&self) -> u64 {
        self.last_revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_dedup_by_kind() {
        let mut feed = ArbiterFeed::new(64);
        assert_eq!(feed.check(MessageKind::State, 10), FeedCheck::Accept);
        assert_eq!(feed.check(MessageKind::State, 10), FeedCheck::Duplicate);
        assert_eq!(feed.check(MessageKind::Heartbeat, 11), FeedCheck::Accept);
        assert_eq!(feed.check(MessageKind::Heartbeat, 11), FeedCheck::Accept);
    }

    #[test]
    fn test_feed_detects_restart() {
        let mut feed = ArbiterFeed::new(64);
        feed.check(MessageKind::State, 500);
        feed.observe(40).unwrap();
        assert_eq!(feed.check(MessageKind::Ack, 2), FeedCheck::Duplicate);
        assert_eq!(feed.check(MessageKind::Heartbeat, 3), FeedCheck::Restarted);
        assert_eq!(feed.last_revision(), 0);
        assert_eq!(feed.check(MessageKind::Ack, 4), FeedCheck::Accept);
    }

    #[test]
    fn test_feed_gap() {
        let mut feed = ArbiterFeed::new(64);
        assert!(feed.observe(5).is_ok());
        assert!(feed.observe(6).is_ok());
        assert!(matches!(
            feed.observe(9),
            Err(NetError::SequenceGap { expected: 7, received: 9, .. })
        ));
        assert!(feed.observe(8).is_ok());
        assert_eq!(feed.last_revision(), 9);

        feed.resync(3);
        assert!(feed.observe(4).is_ok());
    }
}
