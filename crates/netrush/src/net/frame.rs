//! NRSH wire framing: the fixed 28-byte big-endian header and its CRC32
//! integrity check.
//!
//! Layout: id(4) version(1) type(1) snapshot_id(4) seq_num(4)
//! timestamp_ms(8) payload_len(2) checksum(4). The checksum is CRC32
//! (IEEE) over the header with the checksum field zeroed, followed by the
//! full payload.

use crate::net::error::ProtocolError;

pub const PROTOCOL_ID: [u8; 4] = *b"NRSH";
pub const PROTOCOL_VERSION: u8 = 1;
pub const HEADER_SIZE: usize = 28;
pub const MAX_DATAGRAM: usize = 1200;
pub const MAX_PAYLOAD: usize = MAX_DATAGRAM - HEADER_SIZE;

const CHECKSUM_OFFSET: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgType {
    Init = 0,
    InitAck = 1,
    Snapshot = 2,
    Event = 3,
    Ack = 4,
    GameOver = 5,
}

impl MsgType {
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(MsgType::Init),
            1 => Some(MsgType::InitAck),
            2 => Some(MsgType::Snapshot),
            3 => Some(MsgType::Event),
            4 => Some(MsgType::Ack),
            5 => Some(MsgType::GameOver),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub msg_type: MsgType,
    pub snapshot_id: u32,
    pub seq_num: u32,
    pub timestamp_ms: u64,
    pub payload_len: u16,
}

impl Header {
    pub fn new(msg_type: MsgType, snapshot_id: u32, seq_num: u32, timestamp_ms: u64) -> Self {
        Self {
            msg_type,
            snapshot_id,
            seq_num,
            timestamp_ms,
            payload_len: 0,
        }
    }
}

fn checksum(header_image: &[u8], payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(header_image);
    hasher.update(payload);
    hasher.finalize()
}

/// Frames `payload` behind `header`, filling in the payload length and
/// checksum. Fails if the payload cannot fit a single datagram.
pub fn encode(header: &Header, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(ProtocolError::OversizedPayload {
            len: payload.len(),
            max: MAX_PAYLOAD,
        });
    }

    let mut buf = vec![0u8; HEADER_SIZE + payload.len()];
    buf[0..4].copy_from_slice(&PROTOCOL_ID);
    buf[4] = PROTOCOL_VERSION;
    buf[5] = header.msg_type as u8;
    buf[6..10].copy_from_slice(&header.snapshot_id.to_be_bytes());
    buf[10..14].copy_from_slice(&header.seq_num.to_be_bytes());
    buf[14..22].copy_from_slice(&header.timestamp_ms.to_be_bytes());
    buf[22..24].copy_from_slice(&(payload.len() as u16).to_be_bytes());
    // checksum bytes stay zero for the digest image
    let crc = checksum(&buf[..HEADER_SIZE], payload);
    buf[CHECKSUM_OFFSET..HEADER_SIZE].copy_from_slice(&crc.to_be_bytes());
    buf[HEADER_SIZE..].copy_from_slice(payload);

    Ok(buf)
}

/// Parses a datagram. Rejects, in order: short input, bad magic, bad
/// version, unknown message type, payload length mismatch, checksum
/// mismatch. The returned slice borrows the payload from `data`.
pub fn decode(data: &[u8]) -> Result<(Header, &[u8]), ProtocolError> {
    if data.len() < HEADER_SIZE {
        return Err(ProtocolError::ShortPacket { len: data.len() });
    }

    let mut magic = [0u8; 4];
    magic.copy_from_slice(&data[0..4]);
    if magic != PROTOCOL_ID {
        return Err(ProtocolError::BadMagic { found: magic });
    }

    if data[4] != PROTOCOL_VERSION {
        return Err(ProtocolError::BadVersion { found: data[4] });
    }

    let msg_type =
        MsgType::from_wire(data[5]).ok_or(ProtocolError::UnknownMsgType { found: data[5] })?;

    let payload_len = u16::from_be_bytes([data[22], data[23]]) as usize;
    let actual_len = data.len() - HEADER_SIZE;
    if payload_len != actual_len {
        return Err(ProtocolError::LengthMismatch {
            header_len: payload_len,
            actual_len,
        });
    }

    let expected = u32::from_be_bytes([data[24], data[25], data[26], data[27]]);
    let mut image = [0u8; HEADER_SIZE];
    image.copy_from_slice(&data[..HEADER_SIZE]);
    image[CHECKSUM_OFFSET..].fill(0);
    let computed = checksum(&image, &data[HEADER_SIZE..]);
    if computed != expected {
        return Err(ProtocolError::ChecksumMismatch { expected, computed });
    }

    let header = Header {
        msg_type,
        snapshot_id: u32::from_be_bytes([data[6], data[7], data[8], data[9]]),
        seq_num: u32::from_be_bytes([data[10], data[11], data[12], data[13]]),
        timestamp_ms: u64::from_be_bytes([
            data[14], data[15], data[16], data[17], data[18], data[19], data[20], data[21],
        ]),
        payload_len: payload_len as u16,
    };

    Ok((header, &data[HEADER_SIZE..]))
}
