//! Seeded loss and duplication for at-least-once delivery tests.

use super::{Delivery, Transport, TransportStats};
use crate::error::NetResult;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use std::collections::VecDeque;

/// Simulated link quality, applied in both directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NetworkConditions {
    /// Packet loss percentage (0-100).
    pub loss_percent: u8,
    /// Duplicate packet percentage (0-100).
    pub duplicate_percent: u8,
}

impl NetworkConditions {
    /// No loss, no duplicates.
    pub const PERFECT: Self = Self {
        loss_percent: 0,
        duplicate_percent: 0,
    };

    /// Typical field Wi-Fi.
    pub const FIELD: Self = Self {
        loss_percent: 5,
        duplicate_percent: 2,
    };

    /// Hostile conditions for stress tests.
    pub const HOSTILE: Self = Self {
        loss_percent: 30,
        duplicate_percent: 10,
    };
}

impl Default for NetworkConditions {
    fn default() -> Self {
        Self::PERFECT
    }
}

/// Wraps a transport and drops or repeats messages.
pub struct LossyLink<T> {
    inner: T,
    conditions: NetworkConditions,
    rng: ChaCha8Rng,
    repeats: VecDeque<Delivery>,
    stats: TransportStats,
}

impl<T: Transport> LossyLink<T> {
    /// Wraps `inner`; the same `seed` always yields the same loss pattern.
    #[must_use]
    pub fn new(inner: T, conditions: NetworkConditions, seed: u64) -> Self {
        Self {
            inner,
            conditions,
            rng: ChaCha8Rng::seed_from_u64(seed),
            repeats: VecDeque::new(),
            stats: TransportStats::default(),
        }
    }

    /// Changes conditions on the fly.
    pub fn set_conditions(&mut self, conditions: NetworkConditions) {
        self.conditions = conditions;
    }

    /// The wrapped transport.
    #[must_use]
    pub const fn inner(&self) -> &T {
        &self.inner
    }

    fn roll(&mut self, percent: u8) -> bool {
        percent > 0 && self.rng.gen_range(0..100u8) < percent
    }
}

impl<T: Transport> Transport for LossyLink<T> {
    fn subscribe(&mut self, filter: &str) -> NetResult<()> {
        self.inner.subscribe(filter)
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> NetResult<()> {
        if self.roll(self.conditions.loss_percent) {
            self.stats.dropped += 1;
            tracing::trace!(topic, "simulated outbound loss");
            return Ok(());
        }
        self.inner.publish(topic, payload)?;
        self.stats.record_send(payload.len());
        if self.roll(self.conditions.duplicate_percent) {
            self.inner.publish(topic, payload)?;
            self.stats.record_send(payload.len());
        }
        Ok(())
    }

    fn poll(&mut self) -> Option<Delivery> {
        if let Some(repeat) = self.repeats.pop_front() {
            self.stats.record_recv(repeat.payload.len());
            return Some(repeat);
        }
        loop {
            let delivery = self.inner.poll()?;
            if self.roll(self.conditions.loss_percent) {
                self.stats.dropped += 1;
                continue;
            }
            if self.roll(self.conditions.duplicate_percent) {
                self.repeats.push_back(delivery.clone());
            }
            self.stats.record_recv(delivery.payload.len());
            return Some(delivery);
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn reconnect(&mut self) -> NetResult<()> {
        self.inner.reconnect()
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}
