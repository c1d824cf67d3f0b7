//! # Participant Loop
//!
//! Every Skirmish process runs the same loop:
//!
//! ```text
//! Iteration N:
//! ┌──────────────────────────────────────────────────────────────┐
//! │ 1. POLL SOURCES   sensors push LoopEvents into the queue     │
//! │ 2. DRAIN QUEUE    events handed to the node, oldest first    │
//! │ 3. TICK           link supervision, inbound messages,        │
//! │                   timers, retransmissions                    │
//! │ 4. WAIT           sleep out the rest of the tick interval    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Time comes from an injected [`Clock`], so the same loop runs on a
//! [`ManualClock`](skirmish_shared::ManualClock) in simulations and tests
//! (see [`LoopDriver::run_once`]).

use crate::config::RuntimeConfig;
use crate::events::{EventQueue, EventReceiver, EventSender, LoopEvent};
use skirmish_shared::{Clock, Timestamp};
use std::time::{Duration, Instant};

/// A process-level node driven by [`LoopDriver`].
pub trait Participant {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Lets event sources enqueue what is due at `now`.
    fn poll_sources(&mut self, _now: Timestamp, _out: &EventSender) {}

    /// Consumes one queued event.
    fn handle(&mut self, now: Timestamp, event: LoopEvent);

    /// One loop iteration. Returns messages processed.
    fn tick(&mut self, now: Timestamp) -> usize;

    /// Called once when the loop stops.
    fn shutdown(&mut self, _now: Timestamp) {}
}

/// Loop counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Iterations run.
    pub iterations: u64,
    /// Queue events handled.
    pub events: u64,
    /// Network messages processed.
    pub messages: u64,
    /// Iterations that took longer than the tick interval.
    pub overruns: u64,
}

/// Drives one [`Participant`] from one ordered queue.
pub struct LoopDriver<C> {
    clock: C,
    queue: EventQueue,
    receiver: EventReceiver,
    config: RuntimeConfig,
    stats: LoopStats,
    stopped: bool,
}

impl<C: Clock> LoopDriver<C> {
    /// Creates a driver with an empty queue.
    #[must_use]
    pub fn new(clock: C, config: RuntimeConfig) -> Self {
        let queue = EventQueue::new(config.queue_capacity.max(1));
        let receiver = queue.receiver();
        Self {
            clock,
            queue,
            receiver,
            config,
            stats: LoopStats::default(),
            stopped: false,
        }
    }

    /// Producer handle for callbacks and other threads.
    #[must_use]
    pub fn sender(&self) -> EventSender {
        self.queue.sender()
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Whether a [`LoopEvent::Shutdown`] was consumed.
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Runs a single iteration at the clock's current time.
    ///
    /// Returns `false` once the loop has stopped.
    pub fn run_once<P: Participant>(&mut self, node: &mut P) -> bool {
        if self.stopped {
            return false;
        }
        let now = self.clock.now();
        let sender = self.queue.sender();
        node.poll_sources(now, &sender);

        while let Some(event) = self.receiver.try_recv() {
            self.stats.events += 1;
            if event == LoopEvent::Shutdown {
                tracing::info!(node = node.name(), %now, "shutdown requested");
                node.shutdown(now);
                self.stopped = true;
                return false;
            }
            node.handle(now, event);
        }

        self.stats.messages += node.tick(now) as u64;
        self.stats.iterations += 1;
        true
    }

    /// Runs in real time until shutdown or until `limit` has elapsed.
    pub fn run<P: Participant>(&mut self, node: &mut P, limit: Option<Duration>) -> LoopStats {
        let started = Instant::now();
        let interval = self.config.tick_interval();
        tracing::info!(node = node.name(), interval_ms = self.config.tick_interval_ms, "loop started");

        loop {
            let iteration_start = Instant::now();
            if !self.run_once(node) {
                break;
            }
            if limit.is_some_and(|limit| started.elapsed() >= limit) {
                node.shutdown(self.clock.now());
                self.stopped = true;
                break;
            }

            let spent = iteration_start.elapsed();
            if spent > interval {
                self.stats.overruns += 1;
                tracing::debug!(node = node.name(), spent_ms = spent.as_millis(), "tick overran its interval");
            } else {
                std::thread::sleep(interval - spent);
            }
        }

        tracing::info!(
            node = node.name(),
            iterations = self.stats.iterations,
            messages = self.stats.messages,
            overruns = self.stats.overruns,
            "loop stopped"
        );
        self.stats
    }
}
