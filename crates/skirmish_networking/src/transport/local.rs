//! In-process bus.
//!
//! Every [`LocalLink`] owns a bounded crossbeam channel; the bus fans a
//! publish out to the channels of all matching subscribers. A link can be
//! severed and restored through its [`LinkSwitch`] to simulate radio loss.

use super::{Delivery, Transport, TransportStats};
use crate::error::{NetResult, TransportError};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use skirmish_shared::topics::matches;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Per-link inbox capacity.
const INBOX_CAPACITY: usize = 4096;

struct Subscriber {
    link: u64,
    filters: Vec<String>,
    tx: Sender<Delivery>,
    online: Arc<AtomicBool>,
}

/// Shared in-process bus. Cheap to clone.
#[derive(Clone, Default)]
pub struct LocalBus {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
    next_link: Arc<AtomicU64>,
}

impl LocalBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new link.
    #[must_use]
    pub fn connect(&self) -> LocalLink {
        let link = self.next_link.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = bounded(INBOX_CAPACITY);
        let online = Arc::new(AtomicBool::new(true));
        self.subscribers.write().push(Subscriber {
            link,
            filters: Vec::new(),
            tx,
            online: Arc::clone(&online),
        });
        LocalLink {
            bus: self.clone(),
            link,
            rx,
            online,
            stats: TransportStats::default(),
        }
    }

    fn add_filter(&self, link: u64, filter: &str) {
        let mut subscribers = self.subscribers.write();
        if let Some(sub) = subscribers.iter_mut().find(|s| s.link == link) {
            if !sub.filters.iter().any(|f| f == filter) {
                sub.filters.push(filter.to_string());
            }
        }
    }

    /// Fans out a publish. Returns (delivered, dropped).
    fn route(&self, topic: &str, payload: &[u8]) -> (usize, usize) {
        let subscribers = self.subscribers.read();
        let mut delivered = 0;
        let mut dropped = 0;
        for sub in subscribers.iter() {
            if !sub.online.load(Ordering::Acquire) || !sub.filters.iter().any(|f| matches(f, topic)) {
                continue;
            }
            let delivery = Delivery {
                topic: topic.to_string(),
                payload: payload.to_vec(),
            };
            match sub.tx.try_send(delivery) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(link = sub.link, topic, "local inbox full, message dropped");
                    dropped += 1;
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
        (delivered, dropped)
    }

    fn detach(&self, link: u64) {
        self.subscribers.write().retain(|s| s.link != link);
    }
}

/// Handle that takes a link off the air and back.
#[derive(Clone)]
pub struct LinkSwitch(Arc<AtomicBool>);

impl LinkSwitch {
    /// Sets the link state.
    pub fn set_online(&self, online: bool) {
        self.0.store(online, Ordering::Release);
    }

    /// Current state.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// One participant's endpoint on a [`LocalBus`].
pub struct LocalLink {
    bus: LocalBus,
    link: u64,
    rx: Receiver<Delivery>,
    online: Arc<AtomicBool>,
    stats: TransportStats,
}

impl LocalLink {
    /// Handle to sever or restore this link.
    #[must_use]
    pub fn switch(&self) -> LinkSwitch {
        LinkSwitch(Arc::clone(&self.online))
    }
}

impl Transport for LocalLink {
    fn subscribe(&mut self, filter: &str) -> NetResult<()> {
        self.bus.add_filter(self.link, filter);
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> NetResult<()> {
        if !self.is_connected() {
            self.stats.send_errors += 1;
            return Err(TransportError::NotConnected.into());
        }
        let (_, dropped) = self.bus.route(topic, payload);
        self.stats.dropped += dropped as u64;
        self.stats.record_send(payload.len());
        Ok(())
    }

    fn poll(&mut self) -> Option<Delivery> {
        if !self.is_connected() {
            // Whatever was in flight when the link dropped is lost.
            while self.rx.try_recv().is_ok() {
                self.stats.dropped += 1;
            }
            return None;
        }
        let delivery = self.rx.try_recv().ok()?;
        self.stats.record_recv(delivery.payload.len());
        Some(delivery)
    }

    fn is_connected(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    fn reconnect(&mut self) -> NetResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TransportError::NotConnected.into())
        }
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}

impl Drop for LocalLink {
    fn drop(&mut self) {
        self.bus.detach(self.link);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_fanout() {
        let bus = LocalBus::new();
        let mut arbiter = bus.connect();
        let mut unit = bus.connect();
        arbiter.subscribe("unit/+/event").unwrap();

        unit.publish("unit/4/event", b"hello").unwrap();
        unit.publish("unit/4/telemetry", b"ignored").unwrap();

        let got = arbiter.poll().unwrap();
        assert_eq!(got.topic, "unit/4/event");
        assert_eq!(got.payload, b"hello");
        assert!(arbiter.poll().is_none());
        assert!(unit.poll().is_none());
    }

    #[test]
    fn test_fifo_per_publisher() {
        let bus = LocalBus::new();
        let mut rx = bus.connect();
        let mut tx = bus.connect();
        rx.subscribe("arbiter/state").unwrap();
        for i in 0..10u8 {
            tx.publish("arbiter/state", &[i]).unwrap();
        }
        let order: Vec<u8> = std::iter::from_fn(|| rx.poll()).map(|d| d.payload[0]).collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_severed_link() {
        let bus = LocalBus::new();
        let mut rx = bus.connect();
        let mut tx = bus.connect();
        rx.subscribe("arbiter/state").unwrap();
        let switch = rx.switch();

        switch.set_online(false);
        tx.publish("arbiter/state", b"lost").unwrap();
        assert!(rx.poll().is_none());
        assert!(rx.publish("unit/1/event", b"x").is_err());
        assert!(rx.reconnect().is_err());

        switch.set_online(true);
        assert!(rx.reconnect().is_ok());
        tx.publish("arbiter/state", b"back").unwrap();
        assert_eq!(rx.poll().unwrap().payload, b"back");
    }
}
