use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::net::error::ProtocolError;
use crate::net::frame::{self, Header, MsgType};
use crate::net::payload::{
    self, AckBody, EventBody, GameOverBody, InitAckBody, SnapshotBody,
    DEFAULT_COMPRESSION_THRESHOLD,
};

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_GRID_SIDE: u16 = 20;
pub const DEFAULT_UPDATE_RATE: u32 = 20;
pub const DEFAULT_FULL_EVERY: u32 = 10;
pub const DEFAULT_REDUNDANCY: usize = 2;
pub const DEFAULT_MAX_CLIENTS: usize = 4;

pub const RDT_TIMEOUT: Duration = Duration::from_millis(500);
pub const MAX_RETRIES: u32 = 3;
pub const INIT_RETRY: Duration = Duration::from_millis(500);
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(3);
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(15);
pub const GAME_OVER_REPEATS: u32 = 3;

/// Milliseconds since the Unix epoch, the protocol's timestamp domain.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A decoded payload, one variant per wire message type. INIT carries no
/// body; a repeated INIT from a connected client doubles as the heartbeat.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Init,
    InitAck(InitAckBody),
    Snapshot(SnapshotBody),
    Event(EventBody),
    Ack(AckBody),
    GameOver(GameOverBody),
}

impl Message {
    pub fn msg_type(&self) -> MsgType {
        match self {
            Message::Init => MsgType::Init,
            Message::InitAck(_) => MsgType::InitAck,
            Message::Snapshot(_) => MsgType::Snapshot,
            Message::Event(_) => MsgType::Event,
            Message::Ack(_) => MsgType::Ack,
            Message::GameOver(_) => MsgType::GameOver,
        }
    }

    fn record_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let encoded = match self {
            Message::Init => return Ok(Vec::new()),
            Message::InitAck(body) => serde_json::to_vec(body),
            Message::Snapshot(body) => serde_json::to_vec(body),
            Message::Event(body) => serde_json::to_vec(body),
            Message::Ack(body) => serde_json::to_vec(body),
            Message::GameOver(body) => serde_json::to_vec(body),
        };
        encoded.map_err(|e| ProtocolError::MalformedPayload(e.to_string()))
    }

    /// Full snapshots and GAME_OVER always ship compressed; everything else
    /// rides the size threshold.
    fn force_compress(&self) -> bool {
        match self {
            Message::Snapshot(body) => body.full,
            Message::GameOver(_) => true,
            _ => false,
        }
    }

    fn from_record(msg_type: MsgType, raw: &[u8]) -> Result<Self, ProtocolError> {
        let malformed = |e: serde_json::Error| ProtocolError::MalformedPayload(e.to_string());
        match msg_type {
            MsgType::Init => Ok(Message::Init),
            MsgType::InitAck => serde_json::from_slice(raw).map(Message::InitAck).map_err(malformed),
            MsgType::Snapshot => serde_json::from_slice(raw).map(Message::Snapshot).map_err(malformed),
            MsgType::Event => serde_json::from_slice(raw).map(Message::Event).map_err(malformed),
            MsgType::Ack => serde_json::from_slice(raw).map(Message::Ack).map_err(malformed),
            MsgType::GameOver => serde_json::from_slice(raw).map(Message::GameOver).map_err(malformed),
        }
    }
}

/// One NRSH packet: the header fields a sender controls plus the decoded
/// message. `decode(encode(p)) == p` for every constructible packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub snapshot_id: u32,
    pub seq_num: u32,
    pub timestamp_ms: u64,
    pub message: Message,
}

impl Packet {
    /// Stamps the packet with the current wall clock.
    pub fn new(snapshot_id: u32, seq_num: u32, message: Message) -> Self {
        Self {
            snapshot_id,
            seq_num,
            timestamp_ms: now_ms(),
            message,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        self.encode_with_threshold(DEFAULT_COMPRESSION_THRESHOLD)
    }

    pub fn encode_with_threshold(&self, threshold: usize) -> Result<Vec<u8>, ProtocolError> {
        let raw = self.message.record_bytes()?;
        let body = payload::encode_body(&raw, self.message.force_compress(), threshold)?;
        let header = Header::new(
            self.message.msg_type(),
            self.snapshot_id,
            self.seq_num,
            self.timestamp_ms,
        );
        frame::encode(&header, &body)
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let (header, body) = frame::decode(data)?;
        let raw = payload::decode_body(body)?;
        let message = Message::from_record(header.msg_type, &raw)?;
        Ok(Self {
            snapshot_id: header.snapshot_id,
            seq_num: header.seq_num,
            timestamp_ms: header.timestamp_ms,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::frame::{HEADER_SIZE, MAX_DATAGRAM};
    use crate::net::payload::{RedundantEntry, FLAG_ZLIB};

    fn round_trip(packet: Packet) {
        let bytes = packet.encode().unwrap();
        assert!(bytes.len() <= MAX_DATAGRAM);
        assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn init_round_trips_with_empty_payload() {
        let packet = Packet::new(0, 1, Message::Init);
        let bytes = packet.encode().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn every_record_type_round_trips() {
        round_trip(Packet::new(0, 0, Message::InitAck(InitAckBody { client_id: 3 })));
        round_trip(Packet::new(
            0,
            9,
            Message::Event(EventBody {
                cell: 42,
                client_id: 2,
                ts: 125,
            }),
        ));
        round_trip(Packet::new(0, 9, Message::Ack(AckBody { cell: 42, owner: 1 })));
        round_trip(Packet::new(
            5,
            5,
            Message::Snapshot(SnapshotBody {
                full: false,
                grid: None,
                changes: "2,2,1".into(),
                redundant: vec![
                    RedundantEntry {
                        snapshot_id: 3,
                        changes: String::new(),
                    },
                    RedundantEntry {
                        snapshot_id: 4,
                        changes: "0,1,2".into(),
                    },
                ],
            }),
        ));
        round_trip(Packet::new(
            12,
            12,
            Message::GameOver(GameOverBody {
                winners: vec![2],
                final_grid: "0,0,2;0,1,2;1,0,1;1,1,2".into(),
            }),
        ));
    }

    #[test]
    fn full_snapshot_is_compressed_on_the_wire() {
        let packet = Packet::new(
            0,
            0,
            Message::Snapshot(SnapshotBody {
                full: true,
                grid: Some("0,0,1".into()),
                changes: "0,0,1".into(),
                redundant: Vec::new(),
            }),
        );
        let bytes = packet.encode().unwrap();
        assert_eq!(bytes[HEADER_SIZE], FLAG_ZLIB);
        assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn large_delta_crosses_threshold() {
        let changes: Vec<String> = (0..300).map(|i| format!("{},{},3", i / 20, i % 20)).collect();
        let packet = Packet::new(
            8,
            8,
            Message::Snapshot(SnapshotBody {
                full: false,
                grid: None,
                changes: changes.join(";"),
                redundant: Vec::new(),
            }),
        );
        let bytes = packet.encode().unwrap();
        assert_eq!(bytes[HEADER_SIZE], FLAG_ZLIB);
        assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn tampered_bytes_do_not_decode() {
        let packet = Packet::new(0, 4, Message::Ack(AckBody { cell: 9, owner: 2 }));
        let mut bytes = packet.encode().unwrap();
        bytes[HEADER_SIZE + 1] ^= 0x10;
        assert!(Packet::decode(&bytes).is_err());
    }
}
