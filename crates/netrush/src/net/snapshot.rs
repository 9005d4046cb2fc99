//! The server's snapshot production: the per-snapshot change log and the
//! full/delta/redundancy scheduling policy.

use std::collections::VecDeque;

use crate::grid::{Change, Grid};
use crate::net::payload::{format_cells, RedundantEntry, SnapshotBody};

/// Recent snapshots' change lists, kept just long enough to populate the
/// redundancy tail. Older entries are discarded as the scheduler moves on.
#[derive(Debug)]
pub struct ChangeLog {
    entries: VecDeque<(u32, Vec<Change>)>,
    keep: usize,
}

impl ChangeLog {
    pub fn new(keep: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(keep + 1),
            keep: keep.max(1),
        }
    }

    pub fn push(&mut self, snapshot_id: u32, changes: Vec<Change>) {
        while self.entries.len() >= self.keep {
            self.entries.pop_front();
        }
        self.entries.push_back((snapshot_id, changes));
    }

    /// The last `k` snapshots strictly before `upto`, oldest first.
    pub fn tail_before(&self, upto: u32, k: usize) -> Vec<(u32, &[Change])> {
        let mut tail: Vec<(u32, &[Change])> = self
            .entries
            .iter()
            .filter(|(id, _)| *id < upto)
            .map(|(id, changes)| (*id, changes.as_slice()))
            .collect();
        if tail.len() > k {
            tail.drain(..tail.len() - k);
        }
        tail
    }
}

/// Produces the snapshot stream: monotonically increasing ids from 0, a
/// full frame every `full_every` snapshots (so the very first is full),
/// and a K-deep redundancy tail on every frame.
#[derive(Debug)]
pub struct SnapshotScheduler {
    next_id: u32,
    full_every: u32,
    redundancy: usize,
    pending: Vec<Change>,
    log: ChangeLog,
}

impl SnapshotScheduler {
    pub fn new(full_every: u32, redundancy: usize) -> Self {
        Self {
            next_id: 0,
            full_every: full_every.max(1),
            redundancy,
            pending: Vec::new(),
            log: ChangeLog::new(redundancy + 1),
        }
    }

    /// Id the next call to [`build`](Self::build) will use.
    pub fn next_snapshot_id(&self) -> u32 {
        self.next_id
    }

    pub fn record_change(&mut self, change: Change) {
        self.pending.push(change);
    }

    pub fn record_changes<I: IntoIterator<Item = Change>>(&mut self, changes: I) {
        self.pending.extend(changes);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Cuts the next snapshot: drains pending changes, decides full vs
    /// delta, attaches the redundancy tail and advances the id.
    pub fn build(&mut self, grid: &Grid) -> (u32, SnapshotBody) {
        let id = self.next_id;
        self.next_id += 1;

        let full = id % self.full_every == 0;
        let changes: Vec<Change> = self.pending.drain(..).collect();

        let redundant = self
            .log
            .tail_before(id, self.redundancy)
            .into_iter()
            .map(|(snapshot_id, cells)| RedundantEntry {
                snapshot_id,
                changes: format_cells(cells),
            })
            .collect();

        let body = SnapshotBody {
            full,
            grid: full.then(|| format_cells(&grid.claimed_cells())),
            changes: format_cells(&changes),
            redundant,
        };

        self.log.push(id, changes);

        (id, body)
    }
}
