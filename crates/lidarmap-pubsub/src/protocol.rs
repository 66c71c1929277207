//! Binary frame format shared by clients and the broker
//!
//! One frame per binary WebSocket message:
//!
//! ```text
//! [flag: u8][topic_len: u32 BE][topic: UTF-8][payload_len: u32 BE][payload]
//! ```
//!
//! Flags: 1 = subscribe, 2 = unsubscribe, 3 = publish. Subscribe and
//! unsubscribe frames carry an empty payload.

use thiserror::Error;

/// Size of the fixed part of a frame (flag + both length fields)
pub const HEADER_LEN: usize = 1 + 4 + 4;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Frame too short: need at least {need} bytes, got {got}")]
    TooShort { need: usize, got: usize },
    #[error("Unknown frame flag: {0:#04x}")]
    UnknownFlag(u8),
    #[error("Topic is not valid UTF-8")]
    InvalidTopic,
    #[error("{0} unexpected bytes after payload")]
    TrailingBytes(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Flag {
    Subscribe = 0x01,
    Unsubscribe = 0x02,
    Publish = 0x03,
}

impl TryFrom<u8> for Flag {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Flag::Subscribe),
            0x02 => Ok(Flag::Unsubscribe),
            0x03 => Ok(Flag::Publish),
            other => Err(ProtocolError::UnknownFlag(other)),
        }
    }
}

/// A single transport message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub flag: Flag,
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn subscribe(topic: impl Into<String>) -> Self {
        Self {
            flag: Flag::Subscribe,
            topic: topic.into(),
            payload: Vec::new(),
        }
    }

    pub fn unsubscribe(topic: impl Into<String>) -> Self {
        Self {
            flag: Flag::Unsubscribe,
            topic: topic.into(),
            payload: Vec::new(),
        }
    }

    pub fn publish(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            flag: Flag::Publish,
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Length of the encoded frame in bytes
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.topic.len() + self.payload.len()
    }
}

/// Encode a message into a frame.
///
/// Topics and payloads longer than `u32::MAX` bytes cannot be framed; callers
/// never get near that over a WebSocket.
pub fn encode(msg: &Message) -> Vec<u8> {
    let mut buf = Vec::with_capacity(msg.encoded_len());
    buf.push(msg.flag as u8);
    buf.extend_from_slice(&(msg.topic.len() as u32).to_be_bytes());
    buf.extend_from_slice(msg.topic.as_bytes());
    buf.extend_from_slice(&(msg.payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&msg.payload);
    buf
}

/// Decode a frame. The whole slice must be exactly one frame.
pub fn decode(data: &[u8]) -> Result<Message, ProtocolError> {
    let mut reader = FrameReader { data, pos: 0 };

    let flag = Flag::try_from(reader.take(1)?[0])?;
    let topic_len = reader.read_u32()? as usize;
    let topic = std::str::from_utf8(reader.take(topic_len)?)
        .map_err(|_| ProtocolError::InvalidTopic)?
        .to_string();
    let payload_len = reader.read_u32()? as usize;
    let payload = reader.take(payload_len)?.to_vec();

    let rest = data.len() - reader.pos;
    if rest > 0 {
        return Err(ProtocolError::TrailingBytes(rest));
    }

    Ok(Message {
        flag,
        topic,
        payload,
    })
}

struct FrameReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(ProtocolError::TooShort {
                need: self.pos.saturating_add(len),
                got: self.data.len(),
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_layout() {
        let frame = encode(&Message::publish("ab", vec![0xff]));
        assert_eq!(frame, vec![3, 0, 0, 0, 2, b'a', b'b', 0, 0, 0, 1, 0xff]);
    }

    #[test]
    fn subscribe_has_empty_payload() {
        let frame = encode(&Message::subscribe("sensor"));
        assert_eq!(frame.len(), HEADER_LEN + 6);
        assert_eq!(&frame[frame.len() - 4..], &[0, 0, 0, 0]);
        assert_eq!(decode(&frame).unwrap(), Message::subscribe("sensor"));
    }

    #[test]
    fn empty_input() {
        assert_eq!(decode(&[]), Err(ProtocolError::TooShort { need: 1, got: 0 }));
    }

    #[test]
    fn unknown_flag() {
        let mut frame = encode(&Message::publish("t", b"x".to_vec()));
        frame[0] = 9;
        assert_eq!(decode(&frame), Err(ProtocolError::UnknownFlag(9)));
    }

    #[test]
    fn topic_length_past_end() {
        // Declares a 4 GiB topic inside a 9 byte buffer.
        let frame = [3, 0xff, 0xff, 0xff, 0xff, 0, 0, 0, 0];
        assert!(matches!(decode(&frame), Err(ProtocolError::TooShort { .. })));
    }

    #[test]
    fn invalid_utf8_topic() {
        let frame = [1, 0, 0, 0, 2, 0xc3, 0x28, 0, 0, 0, 0];
        assert_eq!(decode(&frame), Err(ProtocolError::InvalidTopic));
    }

    #[test]
    fn trailing_bytes() {
        let mut frame = encode(&Message::unsubscribe("a"));
        frame.extend_from_slice(&[1, 2]);
        assert_eq!(decode(&frame), Err(ProtocolError::TrailingBytes(2)));
    }

    #[test]
    fn binary_payload_survives() {
        let payload: Vec<u8> = (0..=255).collect();
        let msg = Message::publish("lidar/points", payload);
        assert_eq!(decode(&encode(&msg)).unwrap(), msg);
    }
}
