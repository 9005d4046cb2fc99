use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use netrush::{ClientSample, MetricsSink};

const HEADER: &str =
    "client_id,snapshot_id,server_timestamp_ms,recv_time_ms,latency_ms,inter_arrival_ms,jitter_ms,bytes";

/// CSV sink for the client metrics stream, one row per received snapshot.
pub struct CsvMetricsSink {
    writer: BufWriter<File>,
}

impl CsvMetricsSink {
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "{HEADER}")?;
        Ok(Self { writer })
    }
}

impl MetricsSink for CsvMetricsSink {
    fn client_sample(&mut self, sample: &ClientSample) {
        let inter = sample
            .inter_arrival_ms
            .map(|v| v.to_string())
            .unwrap_or_default();
        let row = format!(
            "{},{},{},{},{},{},{:.2},{}",
            sample.client_id,
            sample.snapshot_id,
            sample.server_timestamp_ms,
            sample.recv_time_ms,
            sample.latency_ms,
            inter,
            sample.jitter_ms,
            sample.bytes,
        );
        if writeln!(self.writer, "{row}").and_then(|_| self.writer.flush()).is_err() {
            log::warn!("failed to write client metrics row");
        }
    }
}
