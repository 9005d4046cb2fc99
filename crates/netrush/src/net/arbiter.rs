//! Authoritative conflict resolution for cell claims.
//!
//! EVENTs queue as they arrive and are resolved once per scheduler tick in
//! dequeue order: server-receive order decides contention, within a tick
//! and across ticks alike. The payload `(ts_ms, client_id)` pair is only a
//! tiebreak for claims whose arrival order is indistinguishable, and the
//! single receive queue totally orders arrivals, so it never has to fire.
//! First claim wins forever: every later claimant is ACKed with the
//! established owner.

use std::collections::VecDeque;
use std::net::SocketAddr;

use crate::grid::{Change, Grid};
use crate::net::connection::SessionTable;
use crate::net::error::ProtocolError;
use crate::net::payload::{AckBody, EventBody};

/// An EVENT waiting for the next tick, with its sender and wire sequence.
#[derive(Debug, Clone)]
pub struct QueuedClaim {
    pub addr: SocketAddr,
    pub seq_num: u32,
    pub body: EventBody,
}

/// An ACK the server owes after resolution. `seq_num` echoes the event's
/// own sequence so retransmitted events map onto the same ACK.
#[derive(Debug, Clone)]
pub struct PendingAck {
    pub addr: SocketAddr,
    pub seq_num: u32,
    pub body: AckBody,
}

#[derive(Debug, Default)]
pub struct ClaimArbiter {
    queue: VecDeque<QueuedClaim>,
}

impl ClaimArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, claim: QueuedClaim) {
        self.queue.push_back(claim);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drains and resolves the tick's batch against the authoritative
    /// grid, strictly in receive order. Returns the ACKs to send and the
    /// changes newly applied (in the order they were applied), for the
    /// snapshot change log.
    pub fn resolve_tick(
        &mut self,
        grid: &mut Grid,
        sessions: &mut SessionTable,
    ) -> (Vec<PendingAck>, Vec<Change>) {
        let mut acks = Vec::with_capacity(self.queue.len());
        let mut changes = Vec::new();

        while let Some(claim) = self.queue.pop_front() {
            let Some(record) = sessions.get_by_addr_mut(&claim.addr) else {
                log::warn!("{}", ProtocolError::UnknownSender(claim.addr));
                continue;
            };
            if record.client_id != claim.body.client_id {
                log::warn!(
                    "claim for client {} from {} registered as client {}",
                    claim.body.client_id,
                    claim.addr,
                    record.client_id
                );
                continue;
            }

            let Some((row, col)) = grid.coords_of(claim.body.cell) else {
                log::warn!(
                    "client {} claimed out-of-range cell {}",
                    claim.body.client_id,
                    claim.body.cell
                );
                continue;
            };

            record.touch();

            // A replayed event skips resolution; the owner is already
            // settled and the ACK just repeats it.
            let owner = if record.was_acked(claim.seq_num) {
                grid.owner(row, col).unwrap_or(crate::grid::UNCLAIMED)
            } else {
                let outcome = grid.claim(row, col, claim.body.client_id);
                if outcome.newly_claimed {
                    changes.push(Change::new(row, col, outcome.owner));
                }
                record.note_acked(claim.seq_num);
                outcome.owner
            };

            acks.push(PendingAck {
                addr: claim.addr,
                seq_num: claim.seq_num,
                body: AckBody {
                    cell: claim.body.cell,
                    owner,
                },
            });
        }

        (acks, changes)
    }
}
