//! # Transport Layer
//!
//! A publish/subscribe bus with named topics. Payloads are opaque bytes;
//! the codec lives one layer up.
//!
//! ## Guarantees
//!
//! - FIFO per publisher per topic
//! - No ordering across topics
//! - Delivery is best effort; reliability is layered on top
//!
//! ## Implementations
//!
//! - [`LocalBus`] / [`LocalLink`]: in-process, for tests and the match simulator
//! - [`LossyLink`]: wraps any link with seeded loss and duplication
//! - [`UdpBroker`] / [`UdpLink`]: relay broker and client over UDP

mod broker;
mod frame;
mod local;
mod lossy;
mod udp;

pub use broker::{BrokerStats, UdpBroker};
pub use frame::{Frame, FrameOp, MAX_FRAME_SIZE};
pub use local::{LinkSwitch, LocalBus, LocalLink};
pub use lossy::{LossyLink, NetworkConditions};
pub use udp::UdpLink;

use crate::error::NetResult;

/// One message delivered to a subscriber.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    /// Concrete topic it was published on.
    pub topic: String,
    /// Raw payload.
    pub payload: Vec<u8>,
}

/// Transport statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Messages sent.
    pub packets_sent: u64,
    /// Messages received.
    pub packets_received: u64,
    /// Bytes sent.
    pub bytes_sent: u64,
    /// Bytes received.
    pub bytes_received: u64,
    /// Send errors.
    pub send_errors: u64,
    /// Receive errors, including undecodable frames.
    pub recv_errors: u64,
    /// Messages dropped (overflow or simulated loss).
    pub dropped: u64,
}

impl TransportStats {
    pub(crate) fn record_send(&mut self, bytes: usize) {
        self.packets_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub(crate) fn record_recv(&mut self, bytes: usize) {
        self.packets_received += 1;
        self.bytes_received += bytes as u64;
    }
}

/// A participant's connection to the bus.
pub trait Transport: Send {
    /// Subscribes to a topic filter (`+` and trailing `#` wildcards).
    ///
    /// # Errors
    ///
    /// Fails if the subscription cannot be sent.
    fn subscribe(&mut self, filter: &str) -> NetResult<()>;

    /// Publishes a payload. Fire-and-forget.
    ///
    /// # Errors
    ///
    /// Fails if the link is down or the send failed.
    fn publish(&mut self, topic: &str, payload: &[u8]) -> NetResult<()>;

    /// Returns the next delivery, if any. Never blocks.
    fn poll(&mut self) -> Option<Delivery>;

    /// Whether the link is believed to be up.
    fn is_connected(&self) -> bool;

    /// Re-establishes the link and re-sends subscriptions.
    ///
    /// # Errors
    ///
    /// Fails if the link is still unavailable.
    fn reconnect(&mut self) -> NetResult<()>;

    /// Counters.
    fn stats(&self) -> TransportStats;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn subscribe(&mut self, filter: &str) -> NetResult<()> {
        (**self).subscribe(filter)
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> NetResult<()> {
        (**self).publish(topic, payload)
    }

    fn poll(&mut self) -> Option<Delivery> {
        (**self).poll()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn reconnect(&mut self) -> NetResult<()> {
        (**self).reconnect()
    }

    fn stats(&self) -> TransportStats {
        (**self).stats()
    }
}
