use serde::Serialize;

/// Byte and packet counters kept by a [`UdpEndpoint`](crate::UdpEndpoint).
#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// One row of the server metrics stream, emitted once per scheduler tick.
#[derive(Debug, Clone, Serialize)]
pub struct ServerSample {
    pub log_time_ms: u64,
    pub snapshot_id: u32,
    pub seq: u32,
    pub clients: usize,
    pub bytes_sent_total: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub update_hz: f64,
}

/// One row of the client metrics stream, emitted per received snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ClientSample {
    pub client_id: u32,
    pub snapshot_id: u32,
    pub server_timestamp_ms: u64,
    pub recv_time_ms: u64,
    pub latency_ms: i64,
    pub inter_arrival_ms: Option<u64>,
    pub jitter_ms: f64,
    pub bytes: usize,
}

/// Where metric records go. The CSV writers live in the binaries; the
/// protocol core only emits records.
pub trait MetricsSink {
    fn server_sample(&mut self, _sample: &ServerSample) {}
    fn client_sample(&mut self, _sample: &ClientSample) {}
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl MetricsSink for NullSink {}

/// Exponentially smoothed inter-arrival jitter, the deviation of each gap
/// from the smoothed mean gap (smoothing factor 0.1).
#[derive(Debug, Default)]
pub struct JitterEstimator {
    last_recv_ms: Option<u64>,
    mean_gap_ms: Option<f64>,
    jitter_ms: f64,
}

impl JitterEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one arrival time, returning the inter-arrival gap when there
    /// was a previous arrival.
    pub fn observe(&mut self, recv_ms: u64) -> Option<u64> {
        let inter = self.last_recv_ms.map(|last| recv_ms.saturating_sub(last));
        if let Some(gap) = inter {
            let gap = gap as f64;
            match self.mean_gap_ms {
                Some(mean) => {
                    self.jitter_ms = 0.9 * self.jitter_ms + 0.1 * (gap - mean).abs();
                    self.mean_gap_ms = Some(0.9 * mean + 0.1 * gap);
                }
                None => self.mean_gap_ms = Some(gap),
            }
        }
        self.last_recv_ms = Some(recv_ms);
        inter
    }

    pub fn jitter_ms(&self) -> f64 {
        self.jitter_ms
    }
}
