//! # Skirmish Networking
//!
//! Everything between a state machine and the radio link.
//!
//! ## Architecture
//!
//! - **Protocol**: compact binary envelopes (< 1200 bytes) carrying the
//!   sender identity, a per-sender sequence and one typed message
//! - **Transport**: a topic bus with wildcard filters; in-process
//!   ([`LocalBus`]), fault-injecting ([`LossyLink`]) and UDP through a
//!   relay broker ([`UdpBroker`])
//! - **Reliability**: critical unit events are retransmitted with backoff
//!   until the arbiter acknowledges them; receivers drop replays
//! - **Sessions**: heartbeats, reconnect backoff, resync on reconnect
//! - **Nodes**: [`ArbiterServer`], [`UnitClient`] and [`ConsoleClient`]
//!
//! ## Authority Model
//!
//! ```text
//! UNIT                            ARBITER
//!   |                                 |
//!   |--- CAPTURE_COMPLETE (seq 7) --->|
//!   |                                 | <- first valid claim wins
//!   |<-- ACK 7: Confirmed ------------|
//!   |<== arbiter/state (rev 31) ======|  -> every unit and console
//! ```
//!
//! A unit never treats its own report as fact. Possession is whatever the
//! arbiter last said.
//!
//! ## Example
//!
//! ```rust
//! use skirmish_core::Rules;
//! use skirmish_networking::{ArbiterServer, LocalBus, ReliabilityConfig, SessionConfig, UnitClient};
//! use skirmish_shared::{Team, Timestamp, UnitId, UnitIdentity};
//!
//! let bus = LocalBus::new();
//! let reliability = ReliabilityConfig::default();
//! let mut arbiter = ArbiterServer::new(
//!     bus.connect(), Rules::default(), &reliability, SessionConfig::default(), true,
//! ).unwrap();
//! let mut unit = UnitClient::new(
//!     bus.connect(), UnitIdentity::new(UnitId(1), Team::Red),
//!     &Rules::default(), &reliability, SessionConfig::default(),
//! ).unwrap();
//!
//! for step in 0..10 {
//!     let now = Timestamp::from_millis(step * 50);
//!     unit.tick(now);
//!     arbiter.tick(now);
//! }
//! assert!(unit.is_joined());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod node;
pub mod protocol;
pub mod reliability;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use error::{NetError, NetResult, ProtocolError, TransportError};
pub use node::{ArbiterServer, ConsoleClient, MatchView, NodeStats, UnitClient, UnitView};
pub use protocol::{Codec, Envelope, JoinRequest, Message, MessageKind, StateUpdate, Telemetry};
pub use reliability::{Deduplicator, Freshness, Outbox, ReliabilityConfig};
pub use session::{SessionAction, SessionConfig, SessionManager, SessionState};
pub use transport::{
    Delivery, LinkSwitch, LocalBus, LocalLink, LossyLink, NetworkConditions, Transport, TransportStats,
    UdpBroker, UdpLink,
};
