//! Client-side reliability for EVENTs: the outstanding-claim table and its
//! retransmit clock. EVENT is the only message with per-message delivery
//! guarantees; retransmits reuse the original sequence number and body so
//! the server's ACK replay stays idempotent.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::net::payload::EventBody;

/// One unacknowledged claim.
#[derive(Debug, Clone)]
pub struct PendingClaim {
    pub seq_num: u32,
    pub body: EventBody,
    pub sent_at: Instant,
    pub retries: u32,
}

/// What one retransmit pass decided: claims to resend now, and claims that
/// burned their whole retry budget and were dropped.
#[derive(Debug, Default)]
pub struct RetryRound {
    pub resend: Vec<PendingClaim>,
    pub expired: Vec<PendingClaim>,
}

#[derive(Debug)]
pub struct ClaimTable {
    outstanding: HashMap<u32, PendingClaim>,
    timeout: Duration,
    max_retries: u32,
}

impl ClaimTable {
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            outstanding: HashMap::new(),
            timeout,
            max_retries,
        }
    }

    pub fn track(&mut self, seq_num: u32, body: EventBody) {
        self.outstanding.insert(
            seq_num,
            PendingClaim {
                seq_num,
                body,
                sent_at: Instant::now(),
                retries: 0,
            },
        );
    }

    /// Retires the entry matching an ACK. `None` for unknown or already
    /// retired sequences (duplicate ACKs).
    pub fn acknowledge(&mut self, seq_num: u32) -> Option<PendingClaim> {
        self.outstanding.remove(&seq_num)
    }

    /// Advances the retransmit clock to `now`. Entries past the timeout
    /// either retransmit (bumping their retry count) or, once the budget
    /// is spent, retire as expired.
    pub fn tick(&mut self, now: Instant) -> RetryRound {
        let mut round = RetryRound::default();

        let due: Vec<u32> = self
            .outstanding
            .iter()
            .filter(|(_, claim)| now.duration_since(claim.sent_at) > self.timeout)
            .map(|(&seq, _)| seq)
            .collect();

        for seq in due {
            let claim = self.outstanding.get_mut(&seq).expect("seq collected above");
            if claim.retries >= self.max_retries {
                round.expired.push(self.outstanding.remove(&seq).expect("present"));
            } else {
                claim.retries += 1;
                claim.sent_at = now;
                round.resend.push(claim.clone());
            }
        }

        round
    }

    pub fn contains(&self, seq_num: u32) -> bool {
        self.outstanding.contains_key(&seq_num)
    }

    pub fn len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }
}
