//! # Session Manager
//!
//! Link supervision shared by every participant.
//!
//! ```text
//!                 reconnect attempt
//!  DISCONNECTED ─────────────────────▶ CONNECTING
//!       ▲                                  │
//!       │ link down / peer silent          │ link up
//!       │                                  ▼
//!       └─────────────────────────────  CONNECTED ──▶ heartbeat every interval
//! ```
//!
//! The manager only decides; the owning node performs the I/O for each
//! [`SessionAction`]. Reconnect attempts back off exponentially up to a
//! bounded interval.

use serde::Deserialize;
use skirmish_shared::Timestamp;
use std::time::Duration;

/// Liveness and reconnect parameters (`[session]`).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Heartbeat period.
    pub heartbeat_interval_ms: u64,
    /// Silence after which a peer is considered gone.
    pub link_timeout_ms: u64,
    /// First reconnect delay.
    pub reconnect_initial_ms: u64,
    /// Reconnect delay ceiling.
    pub reconnect_max_ms: u64,
    /// How long the arbiter keeps a disconnected unit's state.
    pub grace_period_ms: u64,
    /// Period of the full snapshot broadcast.
    pub snapshot_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 1000,
            link_timeout_ms: 3000,
            reconnect_initial_ms: 250,
            reconnect_max_ms: 8000,
            grace_period_ms: 10_000,
            snapshot_interval_ms: 5000,
        }
    }
}

impl SessionConfig {
    /// Heartbeat period.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Peer silence limit.
    #[must_use]
    pub const fn link_timeout(&self) -> Duration {
        Duration::from_millis(self.link_timeout_ms)
    }

    /// Grace period before removal.
    #[must_use]
    pub const fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Snapshot broadcast period.
    #[must_use]
    pub const fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }
}

/// Session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No link; waiting for the next reconnect attempt.
    Disconnected,
    /// Reconnect issued; waiting for the link to come up.
    Connecting,
    /// Link up.
    Connected,
}

/// What the owning node should do now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionAction {
    /// Nothing to do.
    Idle,
    /// Publish a heartbeat.
    SendHeartbeat,
    /// Call `Transport::reconnect`.
    Reconnect,
    /// Just (re)connected: announce and resync.
    Established,
    /// Just lost the link; `silent_ms` since the peer was last heard.
    Lost {
        /// Milliseconds of silence.
        silent_ms: u64,
    },
}

/// Per-participant session state machine.
pub struct SessionManager {
    config: SessionConfig,
    state: SessionState,
    watch_peer: bool,
    last_heard: Timestamp,
    last_heartbeat: Option<Timestamp>,
    next_attempt: Timestamp,
    backoff: Duration,
    attempts: u32,
}

impl SessionManager {
    /// Creates a disconnected manager that will try to connect immediately.
    ///
    /// With `watch_peer`, a silent peer (no [`heard`](Self::heard) for
    /// longer than the link timeout) also counts as a lost link.
    #[must_use]
    pub fn new(config: SessionConfig, watch_peer: bool) -> Self {
        let backoff = Duration::from_millis(config.reconnect_initial_ms);
        Self {
            config,
            state: SessionState::Disconnected,
            watch_peer,
            last_heard: Timestamp::ZERO,
            last_heartbeat: None,
            next_attempt: Timestamp::ZERO,
            backoff,
            attempts: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns true while connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Reconnect attempts since the last successful connection.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Records traffic from the peer.
    pub fn heard(&mut self, now: Timestamp) {
        self.last_heard = self.last_heard.max(now);
    }

    /// Advances the state machine.
    pub fn poll(&mut self, now: Timestamp, link_up: bool) -> SessionAction {
        match self.state {
            SessionState::Connected => {
                let silent = now.saturating_since(self.last_heard);
                if !link_up || (self.watch_peer && silent > self.config.link_timeout()) {
                    return self.lose(now, silent);
                }
                let due = self
                    .last_heartbeat
                    .map_or(true, |at| now.saturating_since(at) >= self.config.heartbeat_interval());
                if due {
                    self.last_heartbeat = Some(now);
                    SessionAction::SendHeartbeat
                } else {
                    SessionAction::Idle
                }
            }
            SessionState::Connecting if link_up => {
                tracing::info!(attempts = self.attempts, "session established");
                self.state = SessionState::Connected;
                self.attempts = 0;
                self.backoff = Duration::from_millis(self.config.reconnect_initial_ms);
                self.last_heard = now;
                self.last_heartbeat = None;
                SessionAction::Established
            }
            SessionState::Connecting | SessionState::Disconnected => {
                if now < self.next_attempt {
                    return SessionAction::Idle;
                }
                self.state = SessionState::Connecting;
                self.attempts += 1;
                self.next_attempt = now + self.backoff;
                tracing::debug!(attempt = self.attempts, backoff_ms = self.backoff.as_millis() as u64, "reconnect attempt");
                self.backoff = (self.backoff * 2).min(Duration::from_millis(self.config.reconnect_max_ms));
                SessionAction::Reconnect
            }
        }
    }

    fn lose(&mut self, now: Timestamp, silent: Duration) -> SessionAction {
        let silent_ms = u64::try_from(silent.as_millis()).unwrap_or(u64::MAX);
        self.state = SessionState::Disconnected;
        self.next_attempt = now;
        self.backoff = Duration::from_millis(self.config.reconnect_initial_ms);
        SessionAction::Lost { silent_ms }
    }
}
