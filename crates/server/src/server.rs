use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use netrush::{
    format_cells, now_ms, ClaimArbiter, GameOverBody, GamePhase, Grid, InitAckBody, Message,
    MetricsSink, NetworkStats, NullSink, Packet, ProtocolError, QueuedClaim, ServerSample,
    SessionTable, SnapshotScheduler, UdpEndpoint, GAME_OVER_REPEATS,
};

use crate::config::ServerConfig;
use crate::events::ServerEvent;

/// GAME_OVER packets still owed, sent one round per tick so the three
/// copies land ~one tick period apart.
#[derive(Debug)]
struct GameOverBroadcast {
    snapshot_id: u32,
    body: GameOverBody,
    rounds_left: u32,
}

pub struct GameServer {
    endpoint: UdpEndpoint,
    sessions: SessionTable,
    grid: Grid,
    arbiter: ClaimArbiter,
    scheduler: SnapshotScheduler,
    phase: GamePhase,
    config: ServerConfig,
    tick_duration: Duration,
    last_tick_time: Instant,
    accumulator: Duration,
    running: Arc<AtomicBool>,
    start_time: Instant,
    pending_events: VecDeque<ServerEvent>,
    metrics: Box<dyn MetricsSink>,
    game_over: Option<GameOverBroadcast>,
    last_snapshot_id: u32,
    ticks_in_window: u32,
    window_started: Instant,
    measured_hz: f64,
}

impl GameServer {
    pub fn new(bind_addr: &str, config: ServerConfig) -> io::Result<Self> {
        let mut endpoint = UdpEndpoint::bind(bind_addr)?;
        endpoint.set_compression_threshold(config.compression_threshold);
        let tick_duration = Duration::from_secs_f64(1.0 / config.update_rate as f64);

        Ok(Self {
            endpoint,
            sessions: SessionTable::new(config.max_clients, config.client_timeout),
            grid: Grid::new(config.grid_side),
            arbiter: ClaimArbiter::new(),
            scheduler: SnapshotScheduler::new(config.full_every, config.redundancy),
            phase: GamePhase::Idle,
            tick_duration,
            last_tick_time: Instant::now(),
            accumulator: Duration::ZERO,
            running: Arc::new(AtomicBool::new(true)),
            start_time: Instant::now(),
            pending_events: VecDeque::new(),
            metrics: Box::new(NullSink),
            game_over: None,
            last_snapshot_id: 0,
            ticks_in_window: 0,
            window_started: Instant::now(),
            measured_hz: 0.0,
            config,
        })
    }

    pub fn set_metrics_sink(&mut self, sink: Box<dyn MetricsSink>) {
        self.metrics = sink;
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn run(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            self.tick_once();
            for event in self.pending_events.drain(..) {
                log::debug!("{event:?}");
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        log::info!("server stopped");
    }

    pub fn tick_once(&mut self) {
        let now = Instant::now();
        let delta = now - self.last_tick_time;
        self.last_tick_time = now;
        self.accumulator += delta;

        if let Err(e) = self.process_network() {
            self.pending_events.push_back(ServerEvent::Error {
                message: format!("network error: {e}"),
            });
        }

        while self.accumulator >= self.tick_duration {
            self.accumulator -= self.tick_duration;
            self.tick();
        }
    }

    fn tick(&mut self) {
        match self.phase {
            GamePhase::Idle => {}
            GamePhase::Running => self.run_tick(),
            GamePhase::GameOver => self.game_over_tick(),
        }
    }

    fn process_network(&mut self) -> io::Result<()> {
        let packets = self.endpoint.recv_batch()?;
        for (packet, addr, _len) in packets {
            self.handle_packet(packet, addr);
        }
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet.message {
            Message::Init => self.handle_init(addr),
            Message::Event(body) => {
                if self.phase != GamePhase::Running {
                    log::debug!("event from {addr} outside a running game");
                    return;
                }
                if let Some(record) = self.sessions.get_by_addr_mut(&addr) {
                    record.touch();
                } else {
                    log::debug!("{}", ProtocolError::UnknownSender(addr));
                }
                self.arbiter.enqueue(QueuedClaim {
                    addr,
                    seq_num: packet.seq_num,
                    body,
                });
            }
            other => {
                log::debug!("unexpected {:?} from {addr}", other.msg_type());
            }
        }
    }

    fn handle_init(&mut self, addr: SocketAddr) {
        let accepted = match self.sessions.accept(addr) {
            Ok(accepted) => accepted,
            Err(e) => {
                // the client times out its retries on its own
                log::warn!("INIT from {addr} rejected: {e}");
                self.pending_events
                    .push_back(ServerEvent::ConnectionDenied { addr });
                return;
            }
        };

        if !accepted.existing {
            log::info!("client {} joined from {addr}", accepted.client_id);
            self.pending_events.push_back(ServerEvent::ClientConnected {
                client_id: accepted.client_id,
                addr,
            });
        }

        if self.phase == GamePhase::Idle {
            log::info!("first client accepted, game running");
            self.phase = GamePhase::Running;
        }

        let record = self
            .sessions
            .get_mut(accepted.client_id)
            .expect("accepted session exists");
        let seq = record.next_seq();
        let ack = Packet::new(
            0,
            seq,
            Message::InitAck(InitAckBody {
                client_id: accepted.client_id,
            }),
        );
        if let Err(e) = self.endpoint.send_to(&ack, addr) {
            self.pending_events.push_back(ServerEvent::Error {
                message: format!("failed to send INIT_ACK to {addr}: {e}"),
            });
        }
    }

    fn run_tick(&mut self) {
        let (acks, changes) = self.arbiter.resolve_tick(&mut self.grid, &mut self.sessions);

        for ack in acks {
            let packet = Packet::new(0, ack.seq_num, Message::Ack(ack.body));
            if let Err(e) = self.endpoint.send_to(&packet, ack.addr) {
                self.pending_events.push_back(ServerEvent::Error {
                    message: format!("failed to send ACK to {}: {e}", ack.addr),
                });
            }
        }

        self.scheduler.record_changes(changes);
        self.broadcast_snapshot();

        for client_id in self.sessions.prune_stale() {
            log::info!("client {client_id} timed out");
            self.pending_events
                .push_back(ServerEvent::ClientTimedOut { client_id });
        }

        self.sample_metrics();

        if self.grid.is_complete() {
            self.enter_game_over();
        }
    }

    fn broadcast_snapshot(&mut self) {
        let (snapshot_id, body) = self.scheduler.build(&self.grid);
        self.last_snapshot_id = snapshot_id;

        let mut errors = Vec::new();
        for record in self.sessions.iter_mut() {
            let seq = record.next_seq();
            let packet = Packet::new(snapshot_id, seq, Message::Snapshot(body.clone()));
            if let Err(e) = self.endpoint.send_to(&packet, record.addr) {
                errors.push(format!("failed to send snapshot to {}: {e}", record.addr));
            }
        }
        for message in errors {
            self.pending_events.push_back(ServerEvent::Error { message });
        }
    }

    fn enter_game_over(&mut self) {
        let winners = self.grid.winners();
        log::info!("game over, winners: {winners:?}");
        self.pending_events.push_back(ServerEvent::GameOver {
            winners: winners.clone(),
        });

        self.phase = GamePhase::GameOver;
        self.game_over = Some(GameOverBroadcast {
            snapshot_id: self.last_snapshot_id,
            body: GameOverBody {
                winners,
                final_grid: format_cells(&self.grid.claimed_cells()),
            },
            rounds_left: GAME_OVER_REPEATS,
        });

        // first of the three copies goes out this tick
        self.game_over_tick();
    }

    fn game_over_tick(&mut self) {
        let Some(broadcast) = self.game_over.as_mut() else {
            return;
        };
        if broadcast.rounds_left == 0 {
            return;
        }
        broadcast.rounds_left -= 1;
        let finished = broadcast.rounds_left == 0;
        let snapshot_id = broadcast.snapshot_id;
        let body = broadcast.body.clone();

        let mut errors = Vec::new();
        for record in self.sessions.iter_mut() {
            let seq = record.next_seq();
            let packet = Packet::new(snapshot_id, seq, Message::GameOver(body.clone()));
            if let Err(e) = self.endpoint.send_to(&packet, record.addr) {
                errors.push(format!("failed to send GAME_OVER to {}: {e}", record.addr));
            }
        }
        for message in errors {
            self.pending_events.push_back(ServerEvent::Error { message });
        }

        if finished {
            let stats = self.endpoint.stats();
            log::info!(
                "final stats: {} packets sent, {} received, {} bytes sent",
                stats.packets_sent,
                stats.packets_received,
                stats.bytes_sent
            );
            self.running.store(false, Ordering::SeqCst);
        }
    }

    fn sample_metrics(&mut self) {
        self.ticks_in_window += 1;
        let elapsed = self.window_started.elapsed();
        if elapsed >= Duration::from_secs(1) {
            self.measured_hz = self.ticks_in_window as f64 / elapsed.as_secs_f64();
            self.ticks_in_window = 0;
            self.window_started = Instant::now();
        }

        let stats = self.endpoint.stats();
        self.metrics.server_sample(&ServerSample {
            log_time_ms: now_ms(),
            snapshot_id: self.last_snapshot_id,
            seq: self.last_snapshot_id,
            clients: self.sessions.len(),
            bytes_sent_total: stats.bytes_sent,
            packets_sent: stats.packets_sent,
            packets_received: stats.packets_received,
            update_hz: self.measured_hz,
        });
    }

    pub fn stats(&self) -> ServerStats {
        let claimed = self.grid.counts().values().sum();
        ServerStats {
            phase: self.phase,
            snapshot_id: self.last_snapshot_id,
            clients: self.sessions.len(),
            max_clients: self.config.max_clients,
            claimed_cells: claimed,
            total_cells: self.grid.cell_count(),
            update_hz: self.measured_hz,
            uptime_secs: self.start_time.elapsed().as_secs(),
            network: self.endpoint.stats().clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerStats {
    pub phase: GamePhase,
    pub snapshot_id: u32,
    pub clients: usize,
    pub max_clients: usize,
    pub claimed_cells: usize,
    pub total_cells: usize,
    pub update_hz: f64,
    pub uptime_secs: u64,
    pub network: NetworkStats,
}
