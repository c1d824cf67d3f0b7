//! Relay framing between [`UdpLink`](super::UdpLink) and
//! [`UdpBroker`](super::UdpBroker).
//!
//! ```text
//! ┌────────┬───────────────┬─────────────┬───────────────────┐
//! │ Op (1) │ Topic len (2) │ Topic (var) │ Payload (rest)    │
//! └────────┴───────────────┴─────────────┴───────────────────┘
//! ```

use crate::error::ProtocolError;
use crate::protocol::PayloadReader;
use skirmish_shared::MAX_PACKET_SIZE;

/// Longest topic or filter accepted on the wire.
pub const MAX_TOPIC_LEN: usize = 64;

/// Largest datagram either side will send or accept.
pub const MAX_FRAME_SIZE: usize = MAX_PACKET_SIZE + 3 + MAX_TOPIC_LEN;

/// Frame operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameOp {
    /// Client registers a topic filter. Topic is the filter, no payload.
    Subscribe = 1,
    /// Client publishes to a topic.
    Publish = 2,
    /// Broker forwards a publish to a subscriber.
    Deliver = 3,
    /// Client liveness ping.
    Ping = 4,
    /// Broker answer to [`FrameOp::Ping`].
    Pong = 5,
}

impl FrameOp {
    /// Parses an op code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Subscribe),
            2 => Some(Self::Publish),
            3 => Some(Self::Deliver),
            4 => Some(Self::Ping),
            5 => Some(Self::Pong),
            _ => None,
        }
    }
}

/// One relay datagram.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Operation.
    pub op: FrameOp,
    /// Topic or filter; empty for ping/pong.
    pub topic: String,
    /// Opaque payload.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Builds a control frame with neither topic nor payload.
    #[must_use]
    pub fn control(op: FrameOp) -> Self {
        Self {
            op,
            topic: String::new(),
            payload: Vec::new(),
        }
    }

    /// Serializes the frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::PayloadTooLarge`] if the frame exceeds
    /// [`MAX_FRAME_SIZE`] or the topic exceeds [`MAX_TOPIC_LEN`].
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let topic = self.topic.as_bytes();
        if topic.len() > MAX_TOPIC_LEN {
            return Err(ProtocolError::PayloadTooLarge(topic.len()));
        }
        let total = 3 + topic.len() + self.payload.len();
        if total > MAX_FRAME_SIZE {
            return Err(ProtocolError::PayloadTooLarge(total));
        }
        let mut out = Vec::with_capacity(total);
        out.push(self.op as u8);
        // Bounded by MAX_TOPIC_LEN above.
        out.extend_from_slice(&(topic.len() as u16).to_le_bytes());
        out.extend_from_slice(topic);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Parses a datagram.
    ///
    /// # Errors
    ///
    /// Fails on truncation, an unknown op, an oversized topic, or a
    /// non-UTF-8 topic.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = PayloadReader::new(bytes);
        let code = reader.read_u8()?;
        let op = FrameOp::from_code(code).ok_or(ProtocolError::BadCode { field: "frame op", code })?;
        let topic = reader.read_str("frame topic")?;
        if topic.len() > MAX_TOPIC_LEN {
            return Err(ProtocolError::PayloadTooLarge(topic.len()));
        }
        Ok(Self {
            op,
            topic,
            payload: reader.rest().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_frame() {
        let frame = Frame {
            op: FrameOp::Publish,
            topic: "unit/3/event".into(),
            payload: vec![9, 8, 7],
        };
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes[0], 2);
        assert_eq!(bytes.len(), 3 + 12 + 3);
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_control_frame() {
        let bytes = Frame::control(FrameOp::Ping).encode().unwrap();
        assert_eq!(bytes, vec![4, 0, 0]);
        assert_eq!(Frame::decode(&bytes).unwrap().op, FrameOp::Ping);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(Frame::decode(&[]), Err(ProtocolError::Truncated { .. })));
        assert!(matches!(
            Frame::decode(&[42, 0, 0]),
            Err(ProtocolError::BadCode { field: "frame op", code: 42 })
        ));
        assert!(matches!(Frame::decode(&[2, 10, 0, b'a']), Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn test_topic_limit() {
        let frame = Frame {
            op: FrameOp::Subscribe,
            topic: "x".repeat(MAX_TOPIC_LEN + 1),
            payload: Vec::new(),
        };
        assert!(frame.encode().is_err());
    }
}
