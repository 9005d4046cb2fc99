use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use netrush::{MetricsSink, ServerSample};

const HEADER: &str =
    "log_time_ms,snapshot_id,seq,clients,bytes_sent_total,packets_sent,packets_received,update_hz";

/// CSV sink for the server metrics stream, one row per scheduler tick.
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
    fn server_sample(&mut self, sample: &ServerSample) {
        let row = format!(
            "{},{},{},{},{},{},{},{:.2}",
            sample.log_time_ms,
            sample.snapshot_id,
            sample.seq,
            sample.clients,
            sample.bytes_sent_total,
            sample.packets_sent,
            sample.packets_received,
            sample.update_hz,
        );
        if writeln!(self.writer, "{row}").and_then(|_| self.writer.flush()).is_err() {
            log::warn!("failed to write server metrics row");
        }
    }
}
