use std::fmt::Write;

use super::codec::WireReader;
use super::protocol::{HEADER_SIZE, MessageType, PacketFlags, PacketHeader, Payload};

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("packet too short: {len} bytes, header needs {}", HEADER_SIZE)]
    TooShort { len: usize },
    #[error("payload size mismatch: header declares {declared} bytes, {actual} received")]
    SizeMismatch { declared: usize, actual: usize },
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),
    #[error("{message_type:?} payload too short: expected {expected} bytes, got {actual}")]
    PayloadTooShort {
        message_type: MessageType,
        expected: usize,
        actual: usize,
    },
    #[error("read of {needed} bytes at offset {offset} runs past the buffer")]
    Truncated { offset: usize, needed: usize },
    #[error("unknown message type {0:#04x}")]
    UnknownMessageType(u8),
    #[error("invalid value {value} for field `{field}`")]
    InvalidField { field: &'static str, value: u64 },
}

/// A validated datagram. `payload` borrows the receive buffer.
#[derive(Debug, Clone, Copy)]
pub struct PacketView<'a> {
    pub header: PacketHeader,
    pub payload: &'a [u8],
}

impl<'a> PacketView<'a> {
    pub fn kind(&self) -> Result<MessageType, PacketError> {
        self.header.kind()
    }

    pub fn decode<P: Payload>(&self) -> Result<P, PacketError> {
        decode_payload(self.payload)
    }
}

pub fn create_packet(
    message_type: u8,
    flags: PacketFlags,
    payload: &[u8],
) -> Result<Vec<u8>, PacketError> {
    let payload_size =
        u16::try_from(payload.len()).map_err(|_| PacketError::PayloadTooLarge(payload.len()))?;

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    PacketHeader {
        message_type,
        flags,
        payload_size,
    }
    .encode(&mut out);
    out.extend_from_slice(payload);
    Ok(out)
}

pub fn encode_message<P: Payload>(payload: &P, flags: PacketFlags) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + P::SIZE);
    PacketHeader::new(P::MESSAGE_TYPE, flags, P::SIZE as u16).encode(&mut out);
    payload.encode(&mut out);
    debug_assert_eq!(out.len(), HEADER_SIZE + P::SIZE);
    out
}

/// Validates `buffer` against the header before exposing the payload.
pub fn parse(buffer: &[u8]) -> Result<PacketView<'_>, PacketError> {
    if buffer.len() < HEADER_SIZE {
        return Err(PacketError::TooShort { len: buffer.len() });
    }

    let header = PacketHeader::decode(&mut WireReader::new(buffer))?;
    let actual = buffer.len() - HEADER_SIZE;
    if header.payload_size as usize != actual {
        return Err(PacketError::SizeMismatch {
            declared: header.payload_size as usize,
            actual,
        });
    }

    Ok(PacketView {
        header,
        payload: &buffer[HEADER_SIZE..],
    })
}

pub fn decode_payload<P: Payload>(bytes: &[u8]) -> Result<P, PacketError> {
    if bytes.len() < P::SIZE {
        return Err(PacketError::PayloadTooShort {
            message_type: P::MESSAGE_TYPE,
            expected: P::SIZE,
            actual: bytes.len(),
        });
    }
    P::decode(&mut WireReader::new(&bytes[..P::SIZE]))
}

pub fn hex_preview(bytes: &[u8], max: usize) -> String {
    let mut out = String::with_capacity(max.min(bytes.len()) * 3 + 3);
    for (i, byte) in bytes.iter().take(max).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02x}", byte);
    }
    if bytes.len() > max {
        out.push_str(" ..");
    }
    out
}
