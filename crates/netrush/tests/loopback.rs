//! End-to-end protocol scenarios over real UDP sockets on loopback, with
//! the server side driven by the library pieces a server composes.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use netrush::{
    format_cells, ClaimArbiter, ClaimTable, ClientState, EventBody, GameOverBody, Grid, GridView,
    InitAckBody, Message, Packet, QueuedClaim, SessionTable, SnapshotScheduler, UdpEndpoint,
};

static PORT_COUNTER: AtomicU16 = AtomicU16::new(43000);

fn next_port() -> u16 {
    PORT_COUNTER.fetch_add(10, Ordering::SeqCst)
}

fn bind(port: u16) -> UdpEndpoint {
    UdpEndpoint::bind(format!("127.0.0.1:{port}")).unwrap()
}

fn wait_for_packets(
    endpoint: &mut UdpEndpoint,
    timeout_ms: u64,
) -> Option<Vec<(Packet, SocketAddr, usize)>> {
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(timeout_ms) {
        let received = endpoint.recv_batch().unwrap();
        if !received.is_empty() {
            return Some(received);
        }
        thread::sleep(Duration::from_millis(1));
    }
    None
}

struct TestServer {
    endpoint: UdpEndpoint,
    sessions: SessionTable,
    grid: Grid,
    arbiter: ClaimArbiter,
    scheduler: SnapshotScheduler,
}

impl TestServer {
    fn new(port: u16, grid_side: u16) -> Self {
        Self {
            endpoint: bind(port),
            sessions: SessionTable::new(4, Duration::from_secs(15)),
            grid: Grid::new(grid_side),
            arbiter: ClaimArbiter::new(),
            scheduler: SnapshotScheduler::new(10, 2),
        }
    }

    fn addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    /// Pulls queued datagrams, answering INITs and queueing EVENTs.
    fn pump(&mut self) {
        for (packet, addr, _) in self.endpoint.recv_batch().unwrap() {
            match packet.message {
                Message::Init => {
                    let accepted = self.sessions.accept(addr).unwrap();
                    let record = self.sessions.get_mut(accepted.client_id).unwrap();
                    let seq = record.next_seq();
                    let ack = Packet::new(
                        0,
                        seq,
                        Message::InitAck(InitAckBody {
                            client_id: accepted.client_id,
                        }),
                    );
                    self.endpoint.send_to(&ack, addr).unwrap();
                }
                Message::Event(body) => {
                    self.arbiter.enqueue(QueuedClaim {
                        addr,
                        seq_num: packet.seq_num,
                        body,
                    });
                }
                _ => {}
            }
        }
    }

    /// One scheduler tick: resolve claims, send ACKs, broadcast a snapshot.
    fn tick(&mut self) -> u32 {
        let (acks, changes) = self.arbiter.resolve_tick(&mut self.grid, &mut self.sessions);
        for ack in acks {
            let packet = Packet::new(0, ack.seq_num, Message::Ack(ack.body));
            self.endpoint.send_to(&packet, ack.addr).unwrap();
        }

        self.scheduler.record_changes(changes);
        let (snapshot_id, body) = self.scheduler.build(&self.grid);

        let targets: Vec<SocketAddr> = self.sessions.iter().map(|r| r.addr).collect();
        for addr in targets {
            let record = self.sessions.get_by_addr_mut(&addr).unwrap();
            let seq = record.next_seq();
            let packet = Packet::new(snapshot_id, seq, Message::Snapshot(body.clone()));
            self.endpoint.send_to(&packet, addr).unwrap();
        }

        snapshot_id
    }
}

#[test]
fn handshake_then_empty_full_snapshot() {
    let port = next_port();
    let mut server = TestServer::new(port, 20);
    let mut client = bind(port + 1);
    client.set_remote(server.addr());

    // INIT with the client's first sequence number
    client.send(&Packet::new(0, 1, Message::Init)).unwrap();

    let start = Instant::now();
    while server.sessions.is_empty() && start.elapsed() < Duration::from_millis(500) {
        server.pump();
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(server.sessions.len(), 1);

    let received = wait_for_packets(&mut client, 500).expect("no INIT_ACK");
    let (packet, _, _) = &received[0];
    let Message::InitAck(ack) = &packet.message else {
        panic!("expected INIT_ACK, got {:?}", packet.message);
    };
    assert_eq!(ack.client_id, 1);

    let snapshot_id = server.tick();
    assert_eq!(snapshot_id, 0);

    let received = wait_for_packets(&mut client, 500).expect("no snapshot");
    let (packet, _, _) = &received[0];
    let Message::Snapshot(body) = &packet.message else {
        panic!("expected SNAPSHOT, got {:?}", packet.message);
    };
    assert_eq!(packet.snapshot_id, 0);
    assert!(body.full);
    assert_eq!(body.grid.as_deref(), Some(""));

    let mut view = GridView::new(20);
    view.apply_snapshot(packet.snapshot_id, body, 0).unwrap();
    assert!(view.grid().claimed_cells().is_empty());
}

#[test]
fn single_claim_is_acked_and_snapshotted() {
    let port = next_port();
    let mut server = TestServer::new(port, 20);
    let mut client = bind(port + 1);
    client.set_remote(server.addr());

    client.send(&Packet::new(0, 1, Message::Init)).unwrap();
    wait_until(|| {
        server.pump();
        !server.sessions.is_empty()
    });
    let _ = wait_for_packets(&mut client, 500).expect("no INIT_ACK");

    let mut claims = ClaimTable::new(Duration::from_millis(500), 3);
    let mut view = GridView::new(20);

    let body = EventBody {
        cell: 42, // (2, 2)
        client_id: 1,
        ts: 125,
    };
    client.send(&Packet::new(0, 2, Message::Event(body))).unwrap();
    claims.track(2, body);
    view.mark_pending(42);

    wait_until(|| {
        server.pump();
        !server.arbiter.is_empty()
    });
    server.tick();

    let mut saw_ack = false;
    let mut saw_change = false;
    let deadline = Instant::now() + Duration::from_millis(500);
    while Instant::now() < deadline && !(saw_ack && saw_change) {
        for (packet, _, _) in client.recv_batch().unwrap() {
            match &packet.message {
                Message::Ack(ack) => {
                    assert_eq!(ack.owner, 1);
                    assert_eq!(packet.seq_num, 2);
                    assert!(claims.acknowledge(packet.seq_num).is_some());
                    view.confirm_claim(ack.cell, ack.owner, 200);
                    saw_ack = true;
                }
                Message::Snapshot(body) => {
                    if body.changes == "2,2,1" {
                        saw_change = true;
                    }
                    let _ = view.apply_snapshot(packet.snapshot_id, body, 200);
                }
                _ => {}
            }
        }
        thread::sleep(Duration::from_millis(1));
    }

    assert!(saw_ack, "no ACK for the claim");
    assert!(saw_change, "no snapshot carrying the change");
    assert!(claims.is_empty());
    assert_eq!(view.owner(2, 2), Some(1));
    assert_eq!(view.grid().claimed_cells().len(), 1);
    assert_eq!(server.grid.owner(2, 2), Some(1));
}

#[test]
fn contention_resolves_to_first_arrival() {
    let port = next_port();
    let mut server = TestServer::new(port, 20);
    let mut client1 = bind(port + 1);
    let mut client2 = bind(port + 2);
    client1.set_remote(server.addr());
    client2.set_remote(server.addr());

    // join in order so client ids are deterministic
    client1.send(&Packet::new(0, 1, Message::Init)).unwrap();
    wait_until(|| {
        server.pump();
        server.sessions.len() == 1
    });
    client2.send(&Packet::new(0, 1, Message::Init)).unwrap();
    wait_until(|| {
        server.pump();
        server.sessions.len() == 2
    });
    let _ = wait_for_packets(&mut client1, 500).expect("no INIT_ACK for client 1");
    let _ = wait_for_packets(&mut client2, 500).expect("no INIT_ACK for client 2");

    let cell = 5 * 20 + 5;

    // client 2's packet reaches the server first despite the later stamp
    client2
        .send(&Packet::new(
            0,
            2,
            Message::Event(EventBody {
                cell,
                client_id: 2,
                ts: 205,
            }),
        ))
        .unwrap();
    wait_until(|| {
        server.pump();
        !server.arbiter.is_empty()
    });
    server.tick();

    client1
        .send(&Packet::new(
            0,
            2,
            Message::Event(EventBody {
                cell,
                client_id: 1,
                ts: 200,
            }),
        ))
        .unwrap();
    wait_until(|| {
        server.pump();
        !server.arbiter.is_empty()
    });
    server.tick();

    assert_eq!(server.grid.owner(5, 5), Some(2));

    let owner_seen_by = |client: &mut UdpEndpoint| -> u32 {
        let deadline = Instant::now() + Duration::from_millis(500);
        while Instant::now() < deadline {
            for (packet, _, _) in client.recv_batch().unwrap() {
                if let Message::Ack(ack) = &packet.message {
                    return ack.owner;
                }
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("no ACK observed");
    };

    assert_eq!(owner_seen_by(&mut client2), 2);
    assert_eq!(owner_seen_by(&mut client1), 2);
}

#[test]
fn retransmits_stop_after_ack_and_grid_updates_once() {
    let port = next_port();
    let mut server = TestServer::new(port, 20);
    let mut client = bind(port + 1);
    client.set_remote(server.addr());

    client.send(&Packet::new(0, 1, Message::Init)).unwrap();
    wait_until(|| {
        server.pump();
        !server.sessions.is_empty()
    });
    let _ = wait_for_packets(&mut client, 500).expect("no INIT_ACK");

    let timeout = Duration::from_millis(50);
    let mut claims = ClaimTable::new(timeout, 3);
    let body = EventBody {
        cell: 7,
        client_id: 1,
        ts: 100,
    };

    // first send plus two simulated-timeout retransmits, the server's ACKs
    // for the first two attempts "lost" by simply not draining them yet
    client.send(&Packet::new(0, 7, Message::Event(body))).unwrap();
    claims.track(7, body);

    let mut now = Instant::now();
    for _ in 0..2 {
        now += timeout + Duration::from_millis(1);
        let round = claims.tick(now);
        assert_eq!(round.resend.len(), 1);
        let claim = &round.resend[0];
        client
            .send(&Packet::new(0, claim.seq_num, Message::Event(claim.body)))
            .unwrap();
    }

    wait_until(|| {
        server.pump();
        server.arbiter.len() >= 3
    });
    server.tick();
    assert_eq!(server.grid.owner(0, 7), Some(1));

    // exactly one terminal ACK from the client's perspective
    let mut terminal_acks = 0;
    let deadline = Instant::now() + Duration::from_millis(500);
    while Instant::now() < deadline {
        for (packet, _, _) in client.recv_batch().unwrap() {
            if let Message::Ack(_) = &packet.message {
                if let Some(claim) = claims.acknowledge(packet.seq_num) {
                    assert_eq!(claim.retries, 2);
                    terminal_acks += 1;
                }
            }
        }
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(terminal_acks, 1);
    assert!(claims.is_empty());
}

#[test]
fn game_over_triplicate_lands_once() {
    let port = next_port();
    let mut server_endpoint = bind(port);
    let mut client = bind(port + 1);
    client.set_remote(server_endpoint.local_addr());
    let client_addr = client.local_addr();

    let mut grid = Grid::new(2);
    grid.claim(0, 0, 1);
    grid.claim(0, 1, 1);
    grid.claim(1, 0, 2);
    grid.claim(1, 1, 2);
    assert!(grid.is_complete());

    let body = GameOverBody {
        winners: grid.winners(),
        final_grid: format_cells(&grid.claimed_cells()),
    };

    // three copies, same snapshot id, fresh sequence numbers
    for seq in 10..13 {
        let packet = Packet::new(30, seq, Message::GameOver(body.clone()));
        server_endpoint.send_to(&packet, client_addr).unwrap();
    }

    let mut view = GridView::new(2);
    let mut state = ClientState::Playing;
    let mut transitions = 0;
    let mut winner_sets = Vec::new();
    let mut seen_game_over: Option<u32> = None;

    let deadline = Instant::now() + Duration::from_millis(500);
    while Instant::now() < deadline {
        for (packet, _, _) in client.recv_batch().unwrap() {
            if let Message::GameOver(over) = &packet.message {
                if seen_game_over == Some(packet.snapshot_id) {
                    continue;
                }
                seen_game_over = Some(packet.snapshot_id);
                view.clamp_to_final(&over.final_cells().unwrap(), 0);
                state = ClientState::GameOver;
                transitions += 1;
                winner_sets.push(over.winners.clone());
            }
        }
        thread::sleep(Duration::from_millis(1));
    }

    assert_eq!(state, ClientState::GameOver);
    assert_eq!(transitions, 1);
    assert_eq!(winner_sets, vec![vec![1, 2]]);
    assert!(view.grid().is_complete());
}

fn wait_until<F: FnMut() -> bool>(mut condition: F) {
    let deadline = Instant::now() + Duration::from_millis(500);
    while Instant::now() < deadline {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("condition not reached in time");
}
