pub mod grid;
pub mod net;

pub use grid::{Change, ClaimOutcome, Grid, UNCLAIMED};
pub use net::arbiter::{ClaimArbiter, PendingAck, QueuedClaim};
pub use net::connection::{Accepted, ClientRecord, ClientState, GamePhase, SessionTable};
pub use net::endpoint::UdpEndpoint;
pub use net::error::ProtocolError;
pub use net::frame::{Header, MsgType, HEADER_SIZE, MAX_DATAGRAM, MAX_PAYLOAD, PROTOCOL_ID, PROTOCOL_VERSION};
pub use net::payload::{
    format_cells, parse_cells, AckBody, EventBody, GameOverBody, InitAckBody, RedundantEntry,
    SnapshotBody, DEFAULT_COMPRESSION_THRESHOLD,
};
pub use net::protocol::{
    now_ms, Message, Packet, CLIENT_TIMEOUT, DEFAULT_FULL_EVERY, DEFAULT_GRID_SIDE,
    DEFAULT_MAX_CLIENTS, DEFAULT_PORT, DEFAULT_REDUNDANCY, DEFAULT_UPDATE_RATE, GAME_OVER_REPEATS,
    INIT_RETRY, KEEPALIVE_INTERVAL, MAX_RETRIES, RDT_TIMEOUT,
};
pub use net::reliability::{ClaimTable, PendingClaim, RetryRound};
pub use net::replica::{ApplyReport, GridView, BLEND_WINDOW_MS};
pub use net::snapshot::{ChangeLog, SnapshotScheduler};
pub use net::stats::{ClientSample, JitterEstimator, MetricsSink, NetworkStats, NullSink, ServerSample};
