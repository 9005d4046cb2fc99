//! The client's replica of the grid: snapshot reassembly plus the state the
//! renderer reads (pending overlay, per-cell change times).
//!
//! Reassembly tolerates duplicated, reordered and lost snapshots because
//! cell transitions are monotonic: replaying change lists in any order
//! converges to the same grid.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::grid::{Change, Grid, UNCLAIMED};
use crate::net::error::ProtocolError;
use crate::net::payload::SnapshotBody;

/// How long the renderer blends a cell from its old color to its new one.
pub const BLEND_WINDOW_MS: u64 = 200;

/// How many applied snapshot ids are remembered for duplicate rejection.
const APPLIED_RING_SIZE: usize = 256;

/// What applying one snapshot did, for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyReport {
    pub full: bool,
    /// Delta predates the latest full frame; its own changes were skipped.
    pub stale: bool,
    /// Cells that actually transitioned, redundant entries included.
    pub new_cells: usize,
}

#[derive(Debug)]
pub struct GridView {
    grid: Grid,
    applied: VecDeque<u32>,
    latest_full_id: Option<u32>,
    max_applied_id: Option<u32>,
    changed_at: HashMap<u16, u64>,
    pending: HashSet<u16>,
}

impl GridView {
    pub fn new(side: u16) -> Self {
        Self {
            grid: Grid::new(side),
            applied: VecDeque::with_capacity(APPLIED_RING_SIZE),
            latest_full_id: None,
            max_applied_id: None,
            changed_at: HashMap::new(),
            pending: HashSet::new(),
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn owner(&self, row: u16, col: u16) -> Option<u32> {
        self.grid.owner(row, col)
    }

    pub fn latest_full_id(&self) -> Option<u32> {
        self.latest_full_id
    }

    /// When the cell last transitioned, for the renderer's color blend.
    pub fn changed_at(&self, row: u16, col: u16) -> Option<u64> {
        self.changed_at.get(&self.grid.index_of(row, col)).copied()
    }

    /// Marks a cell as claimed-but-unconfirmed; rendered distinct from any
    /// confirmed owner.
    pub fn mark_pending(&mut self, cell: u16) {
        self.pending.insert(cell);
    }

    /// Reverts a pending mark, falling back to the last confirmed state.
    pub fn clear_pending(&mut self, cell: u16) {
        self.pending.remove(&cell);
    }

    pub fn is_pending(&self, cell: u16) -> bool {
        self.pending.contains(&cell)
    }

    /// Settles a cell from an ACK: the resolved owner is authoritative and
    /// the pending overlay drops.
    pub fn confirm_claim(&mut self, cell: u16, owner: u32, now_ms: u64) {
        self.pending.remove(&cell);
        if let Some((row, col)) = self.grid.coords_of(cell) {
            if owner != UNCLAIMED && self.grid.apply(Change::new(row, col, owner)) {
                self.changed_at.insert(cell, now_ms);
            }
        }
    }

    /// Applies SNAPSHOT `snapshot_id` per the reassembly algorithm:
    /// duplicates are rejected, fulls replace the grid and reset the
    /// baseline, deltas and redundancy entries apply first-claim-wins.
    pub fn apply_snapshot(
        &mut self,
        snapshot_id: u32,
        body: &SnapshotBody,
        now_ms: u64,
    ) -> Result<ApplyReport, ProtocolError> {
        if self.was_applied(snapshot_id) {
            return Err(ProtocolError::DuplicateSnapshot(snapshot_id));
        }

        let mut report = ApplyReport {
            full: body.full,
            stale: false,
            new_cells: 0,
        };

        if body.full {
            let cells = body.grid_cells()?;
            // only the newest-seen full may replace the grid wholesale; a
            // late full merges so already-applied newer claims survive
            if self.max_applied_id.is_some_and(|max| snapshot_id < max) {
                for change in cells {
                    report.new_cells += self.apply_change(change, now_ms) as usize;
                }
            } else {
                report.new_cells += self.replace_grid(&cells, now_ms);
            }
            if self.latest_full_id.map_or(true, |full| snapshot_id > full) {
                self.latest_full_id = Some(snapshot_id);
            }
            self.mark_applied(snapshot_id);
            // by construction redundant ids precede the full; tolerate
            // anything newer anyway
            self.apply_redundant(body, Some(snapshot_id), now_ms, &mut report)?;
            return Ok(report);
        }

        let fresh = self.latest_full_id.map_or(true, |full| snapshot_id > full);
        if fresh {
            for change in body.change_cells()? {
                report.new_cells += self.apply_change(change, now_ms) as usize;
            }
        } else {
            report.stale = true;
        }

        self.apply_redundant(body, self.latest_full_id, now_ms, &mut report)?;
        self.mark_applied(snapshot_id);

        Ok(report)
    }

    /// Clamps the replica to GAME_OVER's final grid.
    pub fn clamp_to_final(&mut self, cells: &[Change], now_ms: u64) {
        self.replace_grid(cells, now_ms);
        self.pending.clear();
    }

    fn apply_redundant(
        &mut self,
        body: &SnapshotBody,
        floor: Option<u32>,
        now_ms: u64,
        report: &mut ApplyReport,
    ) -> Result<(), ProtocolError> {
        for entry in &body.redundant {
            if self.was_applied(entry.snapshot_id) {
                continue;
            }
            if let Some(floor) = floor {
                if entry.snapshot_id <= floor {
                    continue;
                }
            }
            for change in entry.changes()? {
                report.new_cells += self.apply_change(change, now_ms) as usize;
            }
            self.mark_applied(entry.snapshot_id);
        }
        Ok(())
    }

    fn apply_change(&mut self, change: Change, now_ms: u64) -> bool {
        if self.grid.apply(change) {
            let cell = self.grid.index_of(change.row, change.col);
            self.changed_at.insert(cell, now_ms);
            self.pending.remove(&cell);
            true
        } else {
            false
        }
    }

    fn replace_grid(&mut self, cells: &[Change], now_ms: u64) -> usize {
        let mut fresh = Grid::new(self.grid.side());
        let mut transitioned = 0;
        for &change in cells {
            if !fresh.apply(change) {
                continue;
            }
            if self.grid.owner(change.row, change.col) != Some(change.owner) {
                let cell = self.grid.index_of(change.row, change.col);
                self.changed_at.insert(cell, now_ms);
                self.pending.remove(&cell);
                transitioned += 1;
            }
        }
        self.grid = fresh;
        transitioned
    }

    fn was_applied(&self, snapshot_id: u32) -> bool {
        self.applied.contains(&snapshot_id)
    }

    fn mark_applied(&mut self, snapshot_id: u32) {
        if self.max_applied_id.map_or(true, |max| snapshot_id > max) {
            self.max_applied_id = Some(snapshot_id);
        }
        if self.applied.contains(&snapshot_id) {
            return;
        }
        if self.applied.len() >= APPLIED_RING_SIZE {
            self.applied.pop_front();
        }
        self.applied.push_back(snapshot_id);
    }
}
