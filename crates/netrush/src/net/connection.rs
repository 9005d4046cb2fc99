use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::net::error::ProtocolError;

/// How many recently-ACKed event sequence numbers each session remembers
/// for idempotent ACK replay.
const ACK_HISTORY_SIZE: usize = 64;

/// Client-side connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Playing,
    GameOver,
}

/// Server-side game lifecycle. `Idle → Running` on the first accepted
/// INIT; `Running → GameOver` when every cell is owned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    Idle,
    Running,
    GameOver,
}

/// What `SessionTable::accept` decided for an INIT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub client_id: u32,
    /// True when the address already had a session (heartbeat or INIT_ACK
    /// loss); the cached id is re-issued.
    pub existing: bool,
}

/// One connected client as the server sees it.
#[derive(Debug)]
pub struct ClientRecord {
    pub addr: SocketAddr,
    pub client_id: u32,
    pub last_seen: Instant,
    send_sequence: u32,
    acked_events: VecDeque<u32>,
}

impl ClientRecord {
    fn new(addr: SocketAddr, client_id: u32) -> Self {
        Self {
            addr,
            client_id,
            last_seen: Instant::now(),
            send_sequence: 0,
            acked_events: VecDeque::with_capacity(ACK_HISTORY_SIZE),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }

    /// Next per-client sequence number, starting at 1.
    pub fn next_seq(&mut self) -> u32 {
        self.send_sequence = self.send_sequence.wrapping_add(1);
        self.send_sequence
    }

    pub fn note_acked(&mut self, seq_num: u32) {
        if self.acked_events.contains(&seq_num) {
            return;
        }
        if self.acked_events.len() >= ACK_HISTORY_SIZE {
            self.acked_events.pop_front();
        }
        self.acked_events.push_back(seq_num);
    }

    pub fn was_acked(&self, seq_num: u32) -> bool {
        self.acked_events.contains(&seq_num)
    }
}

/// Per-client records keyed by id with an address index, the server's side
/// of the connection state. Ids are handed out monotonically from 1 and
/// never reused within a game.
#[derive(Debug)]
pub struct SessionTable {
    by_addr: HashMap<SocketAddr, u32>,
    clients: HashMap<u32, ClientRecord>,
    next_client_id: u32,
    max_clients: usize,
    timeout: Duration,
}

impl SessionTable {
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            by_addr: HashMap::new(),
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
        }
    }

    /// Handles an INIT (or heartbeat) from `addr`. Idempotent: a known
    /// address refreshes `last_seen` and gets its cached id back. A new
    /// address beyond the capacity bound is rejected.
    pub fn accept(&mut self, addr: SocketAddr) -> Result<Accepted, ProtocolError> {
        if let Some(&client_id) = self.by_addr.get(&addr) {
            if let Some(record) = self.clients.get_mut(&client_id) {
                record.touch();
            }
            return Ok(Accepted {
                client_id,
                existing: true,
            });
        }

        if self.clients.len() >= self.max_clients {
            return Err(ProtocolError::CapacityExceeded);
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        self.clients.insert(client_id, ClientRecord::new(addr, client_id));
        self.by_addr.insert(addr, client_id);

        Ok(Accepted {
            client_id,
            existing: false,
        })
    }

    pub fn get(&self, client_id: u32) -> Option<&ClientRecord> {
        self.clients.get(&client_id)
    }

    pub fn get_mut(&mut self, client_id: u32) -> Option<&mut ClientRecord> {
        self.clients.get_mut(&client_id)
    }

    pub fn get_by_addr(&self, addr: &SocketAddr) -> Option<&ClientRecord> {
        self.by_addr.get(addr).and_then(|id| self.clients.get(id))
    }

    pub fn get_by_addr_mut(&mut self, addr: &SocketAddr) -> Option<&mut ClientRecord> {
        if let Some(&id) = self.by_addr.get(addr) {
            self.clients.get_mut(&id)
        } else {
            None
        }
    }

    pub fn remove(&mut self, client_id: u32) -> Option<ClientRecord> {
        if let Some(record) = self.clients.remove(&client_id) {
            self.by_addr.remove(&record.addr);
            Some(record)
        } else {
            None
        }
    }

    /// Drops every session that has gone quiet past the timeout. Claimed
    /// cells are untouched; ownership is immutable once set.
    pub fn prune_stale(&mut self) -> Vec<u32> {
        let stale: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, record)| record.is_stale(self.timeout))
            .map(|(&id, _)| id)
            .collect();

        for id in &stale {
            self.remove(*id);
        }

        stale
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientRecord> {
        self.clients.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ClientRecord> {
        self.clients.values_mut()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn table() -> SessionTable {
        SessionTable::new(4, Duration::from_secs(15))
    }

    #[test]
    fn ids_are_monotonic_from_one() {
        let mut sessions = table();
        assert_eq!(sessions.accept(addr(1000)).unwrap().client_id, 1);
        assert_eq!(sessions.accept(addr(1001)).unwrap().client_id, 2);
        assert_eq!(sessions.accept(addr(1002)).unwrap().client_id, 3);
    }

    #[test]
    fn accept_is_idempotent_per_address() {
        let mut sessions = table();
        let first = sessions.accept(addr(1000)).unwrap();
        assert!(!first.existing);

        let again = sessions.accept(addr(1000)).unwrap();
        assert!(again.existing);
        assert_eq!(again.client_id, first.client_id);
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn capacity_bound_is_enforced() {
        let mut sessions = table();
        for port in 0..4 {
            sessions.accept(addr(2000 + port)).unwrap();
        }
        assert_eq!(
            sessions.accept(addr(2100)).unwrap_err(),
            ProtocolError::CapacityExceeded
        );
        // known addresses still get through at capacity
        assert!(sessions.accept(addr(2000)).unwrap().existing);
    }

    #[test]
    fn removed_ids_are_not_reused() {
        let mut sessions = table();
        sessions.accept(addr(1000)).unwrap();
        sessions.remove(1);
        assert_eq!(sessions.accept(addr(1001)).unwrap().client_id, 2);
    }

    #[test]
    fn prune_drops_quiet_sessions() {
        let mut sessions = SessionTable::new(4, Duration::from_millis(0));
        sessions.accept(addr(1000)).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(sessions.prune_stale(), vec![1]);
        assert!(sessions.is_empty());
    }

    #[test]
    fn per_client_sequence_starts_at_one() {
        let mut sessions = table();
        let id = sessions.accept(addr(1000)).unwrap().client_id;
        let record = sessions.get_mut(id).unwrap();
        assert_eq!(record.next_seq(), 1);
        assert_eq!(record.next_seq(), 2);
    }

    #[test]
    fn ack_history_is_bounded() {
        let mut record = ClientRecord::new(addr(1000), 1);
        for seq in 0..(ACK_HISTORY_SIZE as u32 + 10) {
            record.note_acked(seq);
        }
        assert!(!record.was_acked(0));
        assert!(record.was_acked(ACK_HISTORY_SIZE as u32 + 9));
    }
}
