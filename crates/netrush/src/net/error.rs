use std::net::SocketAddr;

use crate::net::frame::HEADER_SIZE;

/// Every way a packet or operation can be rejected. Receive-path variants are
/// logged and the packet dropped; they never tear down an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("packet too short: {len} bytes, header needs {HEADER_SIZE}")]
    ShortPacket { len: usize },

    #[error("bad protocol id {found:02x?}")]
    BadMagic { found: [u8; 4] },

    #[error("unsupported protocol version {found}")]
    BadVersion { found: u8 },

    #[error("unknown message type {found}")]
    UnknownMsgType { found: u8 },

    #[error("payload length mismatch: header says {header_len}, {actual_len} bytes follow")]
    LengthMismatch { header_len: usize, actual_len: usize },

    #[error("checksum mismatch: header {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { expected: u32, computed: u32 },

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("payload decompression failed")]
    DecompressionFailed,

    #[error("payload too large: {len} bytes, max {max}")]
    OversizedPayload { len: usize, max: usize },

    #[error("packet from unknown sender {0}")]
    UnknownSender(SocketAddr),

    #[error("server at capacity")]
    CapacityExceeded,

    #[error("retry budget exhausted for event seq {0}")]
    RetryBudgetExhausted(u32),

    #[error("stale snapshot {0}")]
    StaleSnapshot(u32),

    #[error("duplicate snapshot {0}")]
    DuplicateSnapshot(u32),
}
