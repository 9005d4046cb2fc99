use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use netrush::{
    now_ms, AckBody, ClaimTable, ClientSample, ClientState, EventBody, GameOverBody, GridView,
    JitterEstimator, Message, MetricsSink, NetworkStats, NullSink, Packet, ProtocolError,
    SnapshotBody, UdpEndpoint, UNCLAIMED,
};

use crate::config::ClientConfig;

/// User-visible signals surfaced by the protocol layer; the driver (or a
/// real renderer) decides how to show them.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Connected { client_id: u32 },
    ClaimResolved { cell: u16, owner: u32 },
    ClaimAbandoned { cell: u16 },
    GameOver { winners: Vec<u32> },
}

pub struct GameClient {
    endpoint: UdpEndpoint,
    config: ClientConfig,
    state: ClientState,
    client_id: Option<u32>,
    view: GridView,
    claims: ClaimTable,
    send_sequence: u32,
    last_init_time: Option<Instant>,
    winners: Option<Vec<u32>>,
    jitter: JitterEstimator,
    metrics: Box<dyn MetricsSink>,
    pending_events: VecDeque<ClientEvent>,
}

impl GameClient {
    pub fn new(config: ClientConfig) -> io::Result<Self> {
        let endpoint = UdpEndpoint::bind("0.0.0.0:0")?;

        Ok(Self {
            endpoint,
            state: ClientState::Disconnected,
            client_id: None,
            view: GridView::new(config.grid_side),
            claims: ClaimTable::new(config.rdt_timeout, config.max_retries),
            send_sequence: 0,
            last_init_time: None,
            winners: None,
            jitter: JitterEstimator::new(),
            metrics: Box::new(NullSink),
            pending_events: VecDeque::new(),
            config,
        })
    }

    pub fn set_metrics_sink(&mut self, sink: Box<dyn MetricsSink>) {
        self.metrics = sink;
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn client_id(&self) -> Option<u32> {
        self.client_id
    }

    pub fn view(&self) -> &GridView {
        &self.view
    }

    pub fn winners(&self) -> Option<&[u32]> {
        self.winners.as_deref()
    }

    pub fn outstanding_claims(&self) -> usize {
        self.claims.len()
    }

    pub fn stats(&self) -> &NetworkStats {
        self.endpoint.stats()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ClientEvent> + '_ {
        self.pending_events.drain(..)
    }

    fn next_seq(&mut self) -> u32 {
        self.send_sequence = self.send_sequence.wrapping_add(1);
        self.send_sequence
    }

    pub fn connect(&mut self, server_addr: SocketAddr) -> io::Result<()> {
        log::info!("connecting to {server_addr}");
        self.endpoint.set_remote(server_addr);
        self.state = ClientState::Connecting;
        self.send_init()
    }

    fn send_init(&mut self) -> io::Result<()> {
        let seq = self.next_seq();
        let packet = Packet::new(0, seq, Message::Init);
        self.endpoint.send(&packet)?;
        self.last_init_time = Some(Instant::now());
        Ok(())
    }

    /// Requests the cell at `(row, col)`. Returns `false` without sending
    /// when the cell is already owned or has a claim in flight.
    pub fn send_claim(&mut self, row: u16, col: u16) -> io::Result<bool> {
        if self.state != ClientState::Playing {
            return Ok(false);
        }
        let Some(client_id) = self.client_id else {
            return Ok(false);
        };
        // out-of-range coordinates fall out here along with owned cells
        if self.view.owner(row, col) != Some(UNCLAIMED) {
            return Ok(false);
        }
        let cell = self.view.grid().index_of(row, col);
        if self.view.is_pending(cell) {
            return Ok(false);
        }

        let body = EventBody {
            cell,
            client_id,
            ts: now_ms(),
        };
        let seq = self.next_seq();
        let packet = Packet::new(0, seq, Message::Event(body));
        self.endpoint.send(&packet)?;

        self.claims.track(seq, body);
        self.view.mark_pending(cell);
        Ok(true)
    }

    /// One pump of the client: drain the socket, then drive the
    /// connection and retransmit clocks.
    pub fn update(&mut self) -> io::Result<()> {
        self.process_network()?;

        match self.state {
            ClientState::Connecting => {
                let due = self
                    .last_init_time
                    .is_none_or(|at| at.elapsed() >= self.config.init_retry);
                if due {
                    self.send_init()?;
                }
            }
            ClientState::Playing => {
                // INIT doubles as the keep-alive once connected
                let due = self
                    .last_init_time
                    .is_none_or(|at| at.elapsed() >= self.config.keepalive);
                if due {
                    self.send_init()?;
                }
                self.process_retransmits()?;
            }
            ClientState::Disconnected | ClientState::GameOver => {}
        }

        Ok(())
    }

    fn process_retransmits(&mut self) -> io::Result<()> {
        let round = self.claims.tick(Instant::now());

        for claim in round.resend {
            log::debug!(
                "retransmitting claim seq {} (attempt {})",
                claim.seq_num,
                claim.retries
            );
            let packet = Packet::new(0, claim.seq_num, Message::Event(claim.body));
            self.endpoint.send(&packet)?;
        }

        for claim in round.expired {
            log::warn!("{}", ProtocolError::RetryBudgetExhausted(claim.seq_num));
            self.view.clear_pending(claim.body.cell);
            self.pending_events.push_back(ClientEvent::ClaimAbandoned {
                cell: claim.body.cell,
            });
        }

        Ok(())
    }

    fn process_network(&mut self) -> io::Result<()> {
        let packets = self.endpoint.recv_batch()?;
        for (packet, _addr, wire_len) in packets {
            self.handle_packet(packet, wire_len);
        }
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet, wire_len: usize) {
        match packet.message {
            Message::InitAck(body) => self.handle_init_ack(body.client_id),
            Message::Ack(body) => self.handle_ack(packet.seq_num, body),
            Message::Snapshot(ref body) => {
                self.handle_snapshot(packet.snapshot_id, packet.timestamp_ms, body, wire_len)
            }
            Message::GameOver(ref body) => self.handle_game_over(packet.snapshot_id, body),
            other => {
                log::debug!("unexpected {:?} from server", other.msg_type());
            }
        }
    }

    fn handle_init_ack(&mut self, client_id: u32) {
        match self.state {
            ClientState::Connecting => {
                log::info!("connected as client {client_id}");
                self.client_id = Some(client_id);
                self.state = ClientState::Playing;
                self.pending_events
                    .push_back(ClientEvent::Connected { client_id });
            }
            // keep-alive echo
            ClientState::Playing => {}
            _ => log::debug!("INIT_ACK in state {:?}", self.state),
        }
    }

    fn handle_ack(&mut self, seq_num: u32, body: AckBody) {
        match self.claims.acknowledge(seq_num) {
            Some(_) => {
                self.pending_events.push_back(ClientEvent::ClaimResolved {
                    cell: body.cell,
                    owner: body.owner,
                });
            }
            None => log::debug!("duplicate ACK for seq {seq_num}"),
        }
        // the resolved owner is authoritative either way
        self.view.confirm_claim(body.cell, body.owner, now_ms());
    }

    fn handle_snapshot(
        &mut self,
        snapshot_id: u32,
        server_timestamp_ms: u64,
        body: &SnapshotBody,
        wire_len: usize,
    ) {
        let recv_time_ms = now_ms();

        match self.view.apply_snapshot(snapshot_id, body, recv_time_ms) {
            Ok(report) if report.stale => {
                log::debug!("{}", ProtocolError::StaleSnapshot(snapshot_id));
            }
            Ok(_) => {}
            Err(e @ ProtocolError::DuplicateSnapshot(_)) => {
                log::debug!("{e}");
                return;
            }
            Err(e) => {
                log::warn!("snapshot {snapshot_id} rejected: {e}");
                return;
            }
        }

        let inter_arrival_ms = self.jitter.observe(recv_time_ms);
        self.metrics.client_sample(&ClientSample {
            client_id: self.client_id.unwrap_or(0),
            snapshot_id,
            server_timestamp_ms,
            recv_time_ms,
            latency_ms: recv_time_ms as i64 - server_timestamp_ms as i64,
            inter_arrival_ms,
            jitter_ms: self.jitter.jitter_ms(),
            bytes: wire_len,
        });
    }

    fn handle_game_over(&mut self, snapshot_id: u32, body: &GameOverBody) {
        if self.state == ClientState::GameOver {
            log::debug!("{}", ProtocolError::DuplicateSnapshot(snapshot_id));
            return;
        }

        match body.final_cells() {
            Ok(cells) => self.view.clamp_to_final(&cells, now_ms()),
            Err(e) => {
                log::warn!("GAME_OVER final grid rejected: {e}");
                return;
            }
        }

        log::info!("game over, winners: {:?}", body.winners);
        self.winners = Some(body.winners.clone());
        self.state = ClientState::GameOver;
        self.pending_events.push_back(ClientEvent::GameOver {
            winners: body.winners.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_client_starts_disconnected() {
        let client = GameClient::new(ClientConfig::default()).unwrap();
        assert_eq!(client.state(), ClientState::Disconnected);
        assert_eq!(client.client_id(), None);
        assert_eq!(client.outstanding_claims(), 0);
    }

    #[test]
    fn claims_require_playing_state() {
        let mut client = GameClient::new(ClientConfig::default()).unwrap();
        assert!(!client.send_claim(0, 0).unwrap());
    }
}
