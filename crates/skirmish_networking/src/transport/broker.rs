//! # UDP Relay Broker
//!
//! Topic-routing relay for [`UdpLink`](super::UdpLink) clients. It keeps no
//! messages: a publish is forwarded to whoever is subscribed at that moment.
//! Clients that stay silent past the timeout are forgotten and must
//! re-subscribe.

use super::frame::{Frame, FrameOp, MAX_FRAME_SIZE};
use crate::error::{NetResult, TransportError};
use skirmish_shared::topics::matches;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::watch;

/// Broker counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BrokerStats {
    /// Frames received.
    pub frames_in: u64,
    /// Frames sent.
    pub frames_out: u64,
    /// Frames that failed to decode.
    pub bad_frames: u64,
    /// Clients pruned for silence.
    pub pruned: u64,
}

struct ClientEntry {
    filters: Vec<String>,
    last_seen: Instant,
}

/// Routing table. Pure: no sockets.
#[derive(Default)]
struct RelayTable {
    clients: HashMap<SocketAddr, ClientEntry>,
}

impl RelayTable {
    /// Applies one frame and returns the frames to send.
    fn route(&mut self, now: Instant, from: SocketAddr, frame: Frame) -> Vec<(SocketAddr, Frame)> {
        let entry = self.clients.entry(from).or_insert_with(|| {
            tracing::info!("Relay client connected: {}", from);
            ClientEntry {
                filters: Vec::new(),
                last_seen: now,
            }
        });
        entry.last_seen = now;

        match frame.op {
            FrameOp::Subscribe => {
                if !entry.filters.contains(&frame.topic) {
                    tracing::debug!("{} subscribed to {}", from, frame.topic);
                    entry.filters.push(frame.topic);
                }
                Vec::new()
            }
            FrameOp::Ping => vec![(from, Frame::control(FrameOp::Pong))],
            FrameOp::Publish => self
                .clients
                .iter()
                .filter(|(_, client)| client.filters.iter().any(|f| matches(f, &frame.topic)))
                .map(|(addr, _)| {
                    (
                        *addr,
                        Frame {
                            op: FrameOp::Deliver,
                            topic: frame.topic.clone(),
                            payload: frame.payload.clone(),
                        },
                    )
                })
                .collect(),
            FrameOp::Deliver | FrameOp::Pong => {
                tracing::debug!("Ignoring {:?} from client {}", frame.op, from);
                Vec::new()
            }
        }
    }

    /// Forgets clients silent for longer than `timeout`.
    fn prune(&mut self, now: Instant, timeout: Duration) -> usize {
        let before = self.clients.len();
        self.clients.retain(|addr, client| {
            let alive = now.duration_since(client.last_seen) < timeout;
            if !alive {
                tracing::info!("Relay client timed out: {}", addr);
            }
            alive
        });
        before - self.clients.len()
    }
}

/// The relay server.
pub struct UdpBroker {
    socket: UdpSocket,
    table: RelayTable,
    client_timeout: Duration,
    stats: BrokerStats,
}

impl UdpBroker {
    /// Binds the broker socket.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Bind`] if the address is unavailable.
    pub async fn bind(addr: &str, client_timeout: Duration) -> NetResult<Self> {
        let socket = UdpSocket::bind(addr).await.map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        tracing::info!("Relay broker listening on {}", addr);
        Ok(Self {
            socket,
            table: RelayTable::default(),
            client_timeout,
            stats: BrokerStats::default(),
        })
    }

    /// Bound address.
    ///
    /// # Errors
    ///
    /// Propagates the socket error.
    pub fn local_addr(&self) -> NetResult<SocketAddr> {
        Ok(self.socket.local_addr().map_err(TransportError::Io)?)
    }

    /// Counters.
    #[must_use]
    pub const fn stats(&self) -> BrokerStats {
        self.stats
    }

    /// Serves until `shutdown` flips to true or its sender is dropped.
    ///
    /// # Errors
    ///
    /// Never fails once bound; per-datagram errors are logged and counted.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> NetResult<BrokerStats> {
        let mut buffer = vec![0u8; MAX_FRAME_SIZE];
        let mut prune = tokio::time::interval(self.client_timeout / 2);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = prune.tick() => {
                    let removed = self.table.prune(Instant::now(), self.client_timeout);
                    self.stats.pruned += removed as u64;
                }
                received = self.socket.recv_from(&mut buffer) => match received {
                    Ok((len, from)) => self.handle(from, &buffer[..len]).await,
                    Err(e) => tracing::warn!("Broker receive failed: {}", e),
                },
            }
        }

        tracing::info!(
            "Relay broker stopped: {} frames in, {} frames out",
            self.stats.frames_in,
            self.stats.frames_out
        );
        Ok(self.stats)
    }

    async fn handle(&mut self, from: SocketAddr, datagram: &[u8]) {
        self.stats.frames_in += 1;
        let frame = match Frame::decode(datagram) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.bad_frames += 1;
                tracing::warn!("Bad frame from {}: {}", from, e);
                return;
            }
        };
        for (to, out) in self.table.route(Instant::now(), from, frame) {
            let bytes = match out.encode() {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("Cannot encode frame for {}: {}", to, e);
                    continue;
                }
            };
            match self.socket.send_to(&bytes, to).await {
                Ok(_) => self.stats.frames_out += 1,
                Err(e) => tracing::debug!("Send to {} failed: {}", to, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn subscribe(filter: &str) -> Frame {
        Frame {
            op: FrameOp::Subscribe,
            topic: filter.into(),
            payload: Vec::new(),
        }
    }

    fn publish(topic: &str, payload: &[u8]) -> Frame {
        Frame {
            op: FrameOp::Publish,
            topic: topic.into(),
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn test_route_to_matching_subscribers() {
        let mut table = RelayTable::default();
        let now = Instant::now();
        table.route(now, addr(1), subscribe("unit/+/event"));
        table.route(now, addr(2), subscribe("arbiter/state"));

        let out = table.route(now, addr(3), publish("unit/3/event", b"e"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, addr(1));
        assert_eq!(out[0].1.op, FrameOp::Deliver);
        assert_eq!(out[0].1.payload, b"e");
    }

    #[test]
    fn test_ping_pong() {
        let mut table = RelayTable::default();
        let out = table.route(Instant::now(), addr(9), Frame::control(FrameOp::Ping));
        assert_eq!(out, vec![(addr(9), Frame::control(FrameOp::Pong))]);
    }

    #[test]
    fn test_prune_silent_clients() {
        let mut table = RelayTable::default();
        let start = Instant::now();
        table.route(start, addr(1), subscribe("arbiter/state"));
        table.route(start + Duration::from_secs(5), addr(2), subscribe("arbiter/state"));

        let removed = table.prune(start + Duration::from_secs(8), Duration::from_secs(6));
        assert_eq!(removed, 1);

        let out = table.route(start + Duration::from_secs(8), addr(3), publish("arbiter/state", b"s"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, addr(2));
    }

    #[tokio::test]
    async fn test_udp_roundtrip() {
        use crate::transport::{Transport, UdpLink};

        let broker = UdpBroker::bind("127.0.0.1:0", Duration::from_secs(10)).await.unwrap();
        let broker_addr = broker.local_addr().unwrap();
        let (stop, shutdown) = watch::channel(false);
        let server = tokio::spawn(broker.run(shutdown));

        let liveness = Duration::from_secs(3);
        let mut rx = UdpLink::connect(addr(0), broker_addr, liveness).unwrap();
        let mut tx = UdpLink::connect(addr(0), broker_addr, liveness).unwrap();
        rx.subscribe("arbiter/state").unwrap();

        let mut got = None;
        for _ in 0..200 {
            let _ = rx.poll();
            let _ = tx.poll();
            if tx.is_connected() && rx.is_connected() {
                tx.publish("arbiter/state", b"hello").unwrap();
                for _ in 0..100 {
                    if let Some(d) = rx.poll() {
                        got = Some(d);
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let got = got.expect("delivery through broker");
        assert_eq!(got.topic, "arbiter/state");
        assert_eq!(got.payload, b"hello");

        stop.send(true).unwrap();
        let stats = server.await.unwrap().unwrap();
        assert!(stats.frames_out >= 3);
    }
}
