// src/logging.rs
//
// Diagnostics and training telemetry.
// - init:         tracing subscriber on stderr, filtered by RUST_LOG / -v
// - TrainingSink: trait used by the trainer, one record per episode
// - NoopSink:     discards all records
// - FileSink:     writes one JSON line per episode

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};

use crate::rl::runner::EpisodeRecord;

/// Install the global subscriber. `verbosity` 0 honours RUST_LOG (default
/// `warn`), 1 = info, 2 = debug, 3+ = trace. Calling twice is harmless.
pub fn init(verbosity: u8) {
    let filter = match verbosity {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .try_init();
}

/// Abstract sink for per-episode training telemetry.
pub trait TrainingSink {
    fn log_episode(&mut self, record: &EpisodeRecord);

    fn flush(&mut self) {}
}

/// Sink that discards all records.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl TrainingSink for NoopSink {
    fn log_episode(&mut self, _record: &EpisodeRecord) {}
}

/// JSONL file sink.
pub struct FileSink {
    writer: BufWriter<File>,
    failed: bool,
}

impl FileSink {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            failed: false,
        })
    }
}

impl TrainingSink for FileSink {
    fn log_episode(&mut self, record: &EpisodeRecord) {
        if self.failed {
            return;
        }
        // Telemetry failures must not abort training; warn once and stop.
        let result = serde_json::to_string(record)
            .map_err(io::Error::from)
            .and_then(|line| writeln!(self.writer, "{line}"));
        if let Err(e) = result {
            warn!(error = %e, "training telemetry disabled after write failure");
            self.failed = true;
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!(error = %e, "failed to flush training telemetry");
        }
    }
}

/// Collects records in memory (tests and summaries).
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub records: Vec<EpisodeRecord>,
}

impl TrainingSink for MemorySink {
    fn log_episode(&mut self, record: &EpisodeRecord) {
        self.records.push(record.clone());
    }
}
