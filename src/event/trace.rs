//! NDJSON Trace Writer
//!
//! Writes one run's events to `{trace_dir}/{run_id}.ndjson` for post-mortem
//! inspection.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::Result;
use crate::event::{Event, EventLog};
use crate::storage::validate_run_id;

/// Trace directory name under the storage root
pub const TRACE_DIR: &str = ".traces";

pub struct TraceWriter {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl TraceWriter {
    /// Create (or truncate) the trace file of a run
    pub fn new(trace_dir: &Path, run_id: &str) -> Result<Self> {
        // Run ids become file names
        validate_run_id(run_id)?;

        fs::create_dir_all(trace_dir)?;
        let path = trace_dir.join(format!("{}.ndjson", run_id));
        let file = File::create(&path)?;

        tracing::debug!(path = %path.display(), "Created trace file");

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    pub fn write_event(&self, event: &Event) -> Result<()> {
        let json = serde_json::to_string(event)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", json)?;
        Ok(())
    }

    /// Write every event of `run_id` from the log, then flush
    pub fn write_run(&self, event_log: &EventLog, run_id: &str) -> Result<usize> {
        let events = event_log.filter_run(run_id);
        for event in &events {
            self.write_event(event)?;
        }
        self.writer.lock().flush()?;
        Ok(events.len())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read a trace file back into events
pub fn read_trace(path: &Path) -> Result<Vec<Event>> {
    let reader = BufReader::new(File::open(path)?);
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        events.push(serde_json::from_str(&line)?);
    }
    Ok(events)
}
