//! # Process Event Queue
//!
//! Sensor callbacks, operator controls and the loop timer all feed one
//! bounded queue per process. The loop drains it in order before each tick,
//! so the state machines see a single total order of inputs.
//!
//! ```text
//! ┌──────────────┐
//! │ IR receiver  │──┐
//! └──────────────┘  │    ┌─────────────┐    ┌──────────────┐
//! ┌──────────────┐  ├───>│ EventQueue  │───>│  LoopDriver  │──> node.tick()
//! │ line sensor  │──┤    └─────────────┘    └──────────────┘
//! └──────────────┘  │
//! ┌──────────────┐  │
//! │ QR decoder   │──┘
//! └──────────────┘
//! ```

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use skirmish_core::SensorEvent;

/// Inputs a participant process consumes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopEvent {
    /// A sensor fired on this unit.
    Sensor(SensorEvent),
    /// Fresh battery reading.
    Battery {
        /// Charge, 0..=100.
        percent: u8,
        /// Voltage in millivolts.
        millivolts: u16,
    },
    /// Operator asks the arbiter to start the match.
    StartMatch {
        /// Start even without a unit on each team.
        force: bool,
    },
    /// Operator asks the arbiter to return to the lobby.
    ResetMatch,
    /// Stop the loop.
    Shutdown,
}

/// Bounded multi-producer queue.
pub struct EventQueue {
    sender: Sender<LoopEvent>,
    receiver: Receiver<LoopEvent>,
}

impl EventQueue {
    /// Creates a queue holding at most `capacity` pending events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self { sender, receiver }
    }

    /// Producer handle; clone one per callback source.
    #[must_use]
    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
        }
    }

    /// Consumer handle for the loop.
    #[must_use]
    pub fn receiver(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.receiver.clone(),
        }
    }

    /// Convenience for a paired sender and receiver.
    #[must_use]
    pub fn create_pair(capacity: usize) -> (EventSender, EventReceiver) {
        let queue = Self::new(capacity);
        (queue.sender(), queue.receiver())
    }
}

/// Handle for enqueueing events.
#[derive(Clone)]
pub struct EventSender {
    sender: Sender<LoopEvent>,
}

impl EventSender {
    /// Enqueues without blocking. Returns `false` if the event was dropped.
    #[inline]
    pub fn send(&self, event: LoopEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                tracing::warn!(?event, "event queue full, input dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Enqueues, waiting for room. For inputs that must not be lost.
    #[inline]
    pub fn send_blocking(&self, event: LoopEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// Handle for draining the queue.
#[derive(Clone)]
pub struct EventReceiver {
    receiver: Receiver<LoopEvent>,
}

impl EventReceiver {
    /// Takes everything pending, oldest first.
    #[inline]
    pub fn drain(&self) -> Vec<LoopEvent> {
        self.receiver.try_iter().collect()
    }

    /// Takes one event if any.
    #[inline]
    pub fn try_recv(&self) -> Option<LoopEvent> {
        self.receiver.try_recv().ok()
    }

    /// Pending count.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }
}

/// Enqueues [`LoopEvent::Shutdown`] when the process receives Ctrl-C.
///
/// # Errors
///
/// Fails if the watcher thread or its runtime cannot be created.
pub fn shutdown_on_interrupt(sender: EventSender) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    std::thread::Builder::new()
        .name("interrupt-watch".into())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received");
                    sender.send_blocking(LoopEvent::Shutdown);
                }
            });
        })?;
    Ok(())
}
