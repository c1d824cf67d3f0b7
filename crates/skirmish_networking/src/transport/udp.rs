//! Client side of the UDP relay.
//!
//! Non-blocking std socket, polled from the owning node's loop. Liveness is
//! judged from the broker's answers to our periodic pings.

use super::frame::{Frame, FrameOp, MAX_FRAME_SIZE};
use super::{Delivery, Transport, TransportStats};
use crate::error::{NetResult, TransportError};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

/// How often a ping is sent while polling.
const PING_INTERVAL: Duration = Duration::from_secs(1);

/// UDP connection to a [`UdpBroker`](super::UdpBroker).
pub struct UdpLink {
    socket: UdpSocket,
    broker: SocketAddr,
    filters: Vec<String>,
    recv_buffer: Vec<u8>,
    last_ping: Option<Instant>,
    last_pong: Option<Instant>,
    liveness: Duration,
    stats: TransportStats,
}

impl UdpLink {
    /// Binds a local socket and starts talking to `broker`.
    ///
    /// The link reports connected once the first pong arrives.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Bind`] if the local socket cannot be opened.
    pub fn connect(bind: SocketAddr, broker: SocketAddr, liveness: Duration) -> NetResult<Self> {
        let socket = UdpSocket::bind(bind).map_err(|source| TransportError::Bind {
            addr: bind.to_string(),
            source,
        })?;
        socket.set_nonblocking(true).map_err(TransportError::Io)?;

        let mut link = Self {
            socket,
            broker,
            filters: Vec::new(),
            recv_buffer: vec![0u8; MAX_FRAME_SIZE],
            last_ping: None,
            last_pong: None,
            liveness,
            stats: TransportStats::default(),
        };
        link.ping(Instant::now());
        Ok(link)
    }

    /// Local socket address.
    ///
    /// # Errors
    ///
    /// Propagates the socket error.
    pub fn local_addr(&self) -> NetResult<SocketAddr> {
        Ok(self.socket.local_addr().map_err(TransportError::Io)?)
    }

    fn send_frame(&mut self, frame: &Frame) -> NetResult<()> {
        let bytes = frame.encode()?;
        match self.socket.send_to(&bytes, self.broker) {
            Ok(n) => {
                self.stats.record_send(n);
                Ok(())
            }
            Err(e) => {
                self.stats.send_errors += 1;
                Err(TransportError::Io(e).into())
            }
        }
    }

    fn ping(&mut self, now: Instant) {
        self.last_ping = Some(now);
        if let Err(e) = self.send_frame(&Frame::control(FrameOp::Ping)) {
            tracing::debug!("Ping to broker {} failed: {}", self.broker, e);
        }
    }
}

impl Transport for UdpLink {
    fn subscribe(&mut self, filter: &str) -> NetResult<()> {
        if !self.filters.iter().any(|f| f == filter) {
            self.filters.push(filter.to_string());
        }
        self.send_frame(&Frame {
            op: FrameOp::Subscribe,
            topic: filter.to_string(),
            payload: Vec::new(),
        })
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> NetResult<()> {
        if !self.is_connected() {
            self.stats.send_errors += 1;
            return Err(TransportError::NotConnected.into());
        }
        self.send_frame(&Frame {
            op: FrameOp::Publish,
            topic: topic.to_string(),
            payload: payload.to_vec(),
        })
    }

    fn poll(&mut self) -> Option<Delivery> {
        let now = Instant::now();
        if self.last_ping.map_or(true, |at| now.duration_since(at) >= PING_INTERVAL) {
            self.ping(now);
        }

        loop {
            let (len, from) = match self.socket.recv_from(&mut self.recv_buffer) {
                Ok(received) => received,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return None,
                Err(e) => {
                    self.stats.recv_errors += 1;
                    tracing::debug!("Receive from broker failed: {}", e);
                    return None;
                }
            };
            if from != self.broker {
                continue;
            }
            self.stats.record_recv(len);
            match Frame::decode(&self.recv_buffer[..len]) {
                Ok(frame) => match frame.op {
                    FrameOp::Pong => self.last_pong = Some(now),
                    FrameOp::Deliver => {
                        self.last_pong = Some(now);
                        return Some(Delivery {
                            topic: frame.topic,
                            payload: frame.payload,
                        });
                    }
                    op => tracing::debug!("Ignoring {:?} frame from broker", op),
                },
                Err(e) => {
                    self.stats.recv_errors += 1;
                    tracing::warn!("Bad frame from broker: {}", e);
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.last_pong
            .is_some_and(|at| at.elapsed() < self.liveness)
    }

    fn reconnect(&mut self) -> NetResult<()> {
        tracing::info!("Re-subscribing to broker {}", self.broker);
        let filters = self.filters.clone();
        for filter in &filters {
            self.send_frame(&Frame {
                op: FrameOp::Subscribe,
                topic: filter.clone(),
                payload: Vec::new(),
            })?;
        }
        self.ping(Instant::now());
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}
